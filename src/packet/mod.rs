//! Packet codec for the Block Transfer Service.
//!
//! This module is pure and stateless: it translates between typed
//! [`Packet`] values and the bytes carried by a single characteristic read,
//! write or notification. The transfer engines in [`crate::transfer`] are the
//! only stateful consumers.

pub mod codec;
pub mod error;
pub mod fields;
pub mod index;
pub mod kind;

pub use codec::{FRAGMENT_HEADER_LEN, Packet};
pub use error::PacketError;
pub use fields::{MAX_FIELD_WIDTH, MAX_U24, decode_fields};
pub use index::{END_OF_TRANSFER, FragmentIndex, join_counter, split_counter};
pub use kind::PacketType;
