//! Utilities for exercising a [`BtsSession`](bts::BtsSession) without a
//! radio.
//!
//! [`SimulatedPeripheral`] speaks the peer side of the Block Transfer
//! Service: it reassembles blocks the host writes, serves blocks the host
//! reads and can be told to misbehave. [`RecordingLink`] is a dumb link that
//! replays scripted reads and records every write for byte-exact assertions.
//!
//! ```rust
//! use bts::BtsConfig;
//! use bts_testing::{PeripheralBuilder, open_session};
//!
//! # async fn example() {
//! let (peripheral, mut session) = open_session(PeripheralBuilder::default(), BtsConfig::default())
//!     .await
//!     .unwrap();
//! session.write(vec![1_u8; 45]).await.unwrap();
//! assert_eq!(peripheral.received_blocks()[0].data.len(), 45);
//! # }
//! ```

pub mod logging;
pub mod peripheral;
pub mod recording;

pub use logging::{LoggerHandle, logger};
pub use peripheral::{PeripheralBuilder, ReceivedBlock, SimulatedPeripheral, open_session};
pub use recording::{RecordedWrite, RecordingLink};
