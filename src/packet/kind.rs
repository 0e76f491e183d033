//! Packet type codes carried in the high nibble of every BTS packet.

use derive_more::Display;

use super::PacketError;

/// Kind of a BTS packet, encoded as the high nibble of byte 0.
///
/// # Examples
///
/// ```
/// use bts::packet::PacketType;
///
/// assert_eq!(PacketType::from_header_byte(0x63), Ok(PacketType::ReadRequest));
/// assert_eq!(PacketType::WritePayloadLast.code(), 0x3);
/// ```
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Host announces an outbound block: length, offset and fragment count.
    #[display("WRITE_SETUP")]
    WriteSetup = 0x0,
    /// Peer grants a window of outbound fragments.
    #[display("WRITE_REQUEST")]
    WriteRequest = 0x1,
    /// Outbound fragment with more to follow.
    #[display("WRITE_PAYLOAD_MORE")]
    WritePayloadMore = 0x2,
    /// Final outbound fragment of the block.
    #[display("WRITE_PAYLOAD_LAST")]
    WritePayloadLast = 0x3,
    /// Outbound block small enough to travel in a single packet.
    #[display("WRITE_DIRECT")]
    WriteDirect = 0x4,
    /// Peer announces an inbound block: fragment count and length.
    #[display("READ_SETUP")]
    ReadSetup = 0x5,
    /// Host asks the peer for a window of inbound fragments.
    #[display("READ_REQUEST")]
    ReadRequest = 0x6,
    /// Inbound fragment with more to follow.
    #[display("READ_PAYLOAD_MORE")]
    ReadPayloadMore = 0x7,
    /// Final inbound fragment of the block.
    #[display("READ_PAYLOAD_LAST")]
    ReadPayloadLast = 0x8,
    /// Inbound block carried whole in a single packet.
    #[display("READ_DIRECT")]
    ReadDirect = 0x9,
    /// Unsolicited peer notification.
    #[display("NOTIFY")]
    Notify = 0xA,
}

impl PacketType {
    /// Return the numeric code placed in the high nibble.
    #[must_use]
    pub const fn code(self) -> u8 { self as u8 }

    /// Map a 4-bit code to its packet type.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::UnknownType`] for codes `0xB..=0xF`.
    pub const fn from_code(code: u8) -> Result<Self, PacketError> {
        Ok(match code {
            0x0 => Self::WriteSetup,
            0x1 => Self::WriteRequest,
            0x2 => Self::WritePayloadMore,
            0x3 => Self::WritePayloadLast,
            0x4 => Self::WriteDirect,
            0x5 => Self::ReadSetup,
            0x6 => Self::ReadRequest,
            0x7 => Self::ReadPayloadMore,
            0x8 => Self::ReadPayloadLast,
            0x9 => Self::ReadDirect,
            0xA => Self::Notify,
            other => return Err(PacketError::UnknownType(other)),
        })
    }

    /// Extract the packet type from the first byte of a packet.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::UnknownType`] when the high nibble is not a
    /// known code.
    pub const fn from_header_byte(byte: u8) -> Result<Self, PacketError> {
        Self::from_code(byte >> 4)
    }

    /// Build byte 0 of a packet from this type and a 4-bit counter nibble.
    #[must_use]
    pub const fn header_byte(self, low_nibble: u8) -> u8 {
        (self.code() << 4) | (low_nibble & 0x0F)
    }
}
