//! Canonical error types for block transfers.
//!
//! [`TransferError`] is the single surface returned by
//! [`BtsSession`](crate::BtsSession) operations. Every variant is terminal for
//! the transfer in progress; callers restart failed transfers from scratch.

use std::time::Duration;

use derive_more::Display;
use thiserror::Error;

use crate::{
    link::LinkError,
    packet::{FragmentIndex, PacketError, PacketType},
};

/// Characteristic a session cannot operate without.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CharacteristicRole {
    /// Host-to-peer characteristic carrying setup, request and payload writes.
    #[display("write")]
    Write,
    /// Peer-to-host characteristic carrying setup reads and notifications.
    #[display("read")]
    Read,
}

/// Errors that abort a session setup or a single block transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A packet could not be decoded or encoded.
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] PacketError),
    /// A packet arrived that is not valid in the current transfer state.
    #[error("unexpected {found} packet, expected {expected}")]
    UnexpectedPacket {
        expected: &'static str,
        found: PacketType,
    },
    /// The peer referenced a fragment outside the announced block.
    #[error("fragment {index} outside block of {count} fragments")]
    FragmentOutOfRange { index: FragmentIndex, count: u16 },
    /// The session was built without a required characteristic.
    #[error("missing {0} characteristic")]
    MissingCharacteristic(CharacteristicRole),
    /// The session was built without a notification receiver.
    #[error("missing notification receiver")]
    MissingNotifications,
    /// The last fragment arrived while earlier slots were still empty.
    #[error("incomplete transfer: {missing} of {total} fragments missing")]
    IncompleteTransfer { missing: usize, total: usize },
    /// A suspension point exceeded its deadline.
    #[error("timed out after {waited:?} waiting for {waiting_for}")]
    TransferTimeout {
        waited: Duration,
        waiting_for: &'static str,
    },
    /// The block cannot be described by the 24-bit length fields or the
    /// 16-bit fragment counter.
    #[error("block of {len} bytes exceeds the transfer limit of {limit} bytes")]
    BlockTooLarge { len: usize, limit: usize },
    /// The notification producer was dropped.
    #[error("notification channel closed")]
    NotificationsClosed,
    /// The GATT collaborator failed.
    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

impl TransferError {
    pub(crate) fn unexpected(expected: &'static str, found: PacketType) -> Self {
        Self::UnexpectedPacket { expected, found }
    }

    /// Short label used for structured logging and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPacket(_) => "malformed_packet",
            Self::UnexpectedPacket { .. } => "unexpected_packet",
            Self::FragmentOutOfRange { .. } => "fragment_out_of_range",
            Self::MissingCharacteristic(_) => "missing_characteristic",
            Self::MissingNotifications => "missing_notifications",
            Self::IncompleteTransfer { .. } => "incomplete_transfer",
            Self::TransferTimeout { .. } => "transfer_timeout",
            Self::BlockTooLarge { .. } => "block_too_large",
            Self::NotificationsClosed => "notifications_closed",
            Self::Link(_) => "link",
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = TransferError> = std::result::Result<T, E>;
