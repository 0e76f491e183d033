//! Errors raised while encoding or decoding BTS packets.

use thiserror::Error;

/// Failures of the packet codec.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The packet ended before all declared header fields were read.
    #[error("packet truncated: header needs {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    /// The type nibble does not name a known packet kind.
    #[error("unknown packet type {0:#x}")]
    UnknownType(u8),
    /// A value does not fit the fixed width of its field.
    #[error("value {value} does not fit a {width}-byte field")]
    FieldOverflow { value: u32, width: usize },
    /// A field pattern declares a width the codec cannot read.
    #[error("field width {width} exceeds 4 bytes")]
    FieldWidth { width: usize },
}
