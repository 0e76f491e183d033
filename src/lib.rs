#![doc(html_root_url = "https://docs.rs/bts/latest")]
//! Public API for the `bts` library.
//!
//! This crate implements the Block Transfer Service, a small protocol that
//! moves blocks larger than one BLE attribute value across a pair of GATT
//! characteristics. Blocks are announced with a setup packet, fragmented
//! under peer-driven flow control and reassembled on the other side.
//!
//! The native BLE stack is injected through [`GattLink`] and a bounded
//! notification queue, so the protocol runs unchanged against real hardware
//! or a simulated peripheral.

pub mod config;
pub mod error;
pub mod link;
pub mod metrics;
pub mod packet;
pub mod session;
pub mod transfer;

pub use config::{BtsConfig, FragmentSource};
pub use error::{CharacteristicRole, Result, TransferError};
pub use link::{
    GattLink,
    Handle,
    LinkError,
    Notification,
    NotificationQueueError,
    NotificationReceiver,
    NotificationSender,
    WriteKind,
    notification_channel,
};
pub use packet::{FragmentIndex, Packet, PacketError, PacketType};
pub use session::{BtsSession, BtsSessionBuilder, ReadCharacteristic};
