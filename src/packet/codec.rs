//! Typed packets and their wire encoding.
//!
//! The layout of each kind is fixed: byte 0 carries the type code in its high
//! nibble and the low four bits of a counter in its low nibble, followed by
//! little-endian fields and finally the payload.
//!
//! | Kind                  | Fields after byte 0                        | Payload |
//! |-----------------------|--------------------------------------------|---------|
//! | `WRITE_SETUP`         | length u24, offset u24, fragment count u24 | no      |
//! | `WRITE_REQUEST`       | start high bits u16, count u16             | no      |
//! | `WRITE_PAYLOAD_*`     | index high bits u16                        | yes     |
//! | `WRITE_DIRECT`        | none                                       | yes     |
//! | `READ_SETUP`          | count high bits u16, length u24            | no      |
//! | `READ_REQUEST`        | start high bits u16, count u16             | no      |
//! | `READ_PAYLOAD_*`      | index high bits u16                        | yes     |
//! | `READ_DIRECT`         | none                                       | yes     |
//! | `NOTIFY`              | none                                       | yes     |

use bytes::Bytes;

use super::{
    FragmentIndex,
    PacketError,
    PacketType,
    fields::{FieldWriter, decode_fields},
    index::{join_counter, split_counter},
};

/// Bytes occupied by the header of a payload fragment.
pub const FRAGMENT_HEADER_LEN: usize = 3;

const SETUP_WRITE_PATTERN: &[usize] = &[1, 3, 3, 3];
const SETUP_READ_PATTERN: &[usize] = &[1, 2, 3];
const REQUEST_PATTERN: &[usize] = &[1, 2, 2];
const FRAGMENT_PATTERN: &[usize] = &[1, 2];
const DIRECT_PATTERN: &[usize] = &[1];

/// A decoded BTS packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// Announces an outbound block.
    WriteSetup {
        length: u32,
        offset: u32,
        fragment_count: u32,
    },
    /// Grants `count` outbound fragments starting at `start`.
    WriteRequest { start: FragmentIndex, count: u16 },
    /// One outbound fragment.
    WritePayload {
        index: FragmentIndex,
        last: bool,
        payload: Bytes,
    },
    /// A whole outbound block in one packet.
    WriteDirect { payload: Bytes },
    /// Announces an inbound block.
    ReadSetup { fragment_count: u16, length: u32 },
    /// Requests `count` inbound fragments starting at `start`.
    ReadRequest { start: FragmentIndex, count: u16 },
    /// One inbound fragment.
    ReadPayload {
        index: FragmentIndex,
        last: bool,
        payload: Bytes,
    },
    /// A whole inbound block in one packet.
    ReadDirect { payload: Bytes },
    /// Unsolicited notification from the peer.
    Notify { payload: Bytes },
}

impl Packet {
    /// Return the wire type of this packet.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::WriteSetup { .. } => PacketType::WriteSetup,
            Self::WriteRequest { .. } => PacketType::WriteRequest,
            Self::WritePayload { last: false, .. } => PacketType::WritePayloadMore,
            Self::WritePayload { last: true, .. } => PacketType::WritePayloadLast,
            Self::WriteDirect { .. } => PacketType::WriteDirect,
            Self::ReadSetup { .. } => PacketType::ReadSetup,
            Self::ReadRequest { .. } => PacketType::ReadRequest,
            Self::ReadPayload { last: false, .. } => PacketType::ReadPayloadMore,
            Self::ReadPayload { last: true, .. } => PacketType::ReadPayloadLast,
            Self::ReadDirect { .. } => PacketType::ReadDirect,
            Self::Notify { .. } => PacketType::Notify,
        }
    }

    /// Serialise the packet into its wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::FieldOverflow`] when a length, offset or count
    /// does not fit its 24-bit field.
    ///
    /// # Examples
    ///
    /// ```
    /// use bts::packet::{FragmentIndex, Packet};
    ///
    /// let request = Packet::ReadRequest {
    ///     start: FragmentIndex::new(0xFFFF),
    ///     count: 1,
    /// };
    /// assert_eq!(request.encode().unwrap().as_ref(), &[0x6F, 0xFF, 0x0F, 0x01, 0x00]);
    /// ```
    pub fn encode(&self) -> Result<Bytes, PacketError> {
        let kind = self.packet_type();
        let bytes = match self {
            Self::WriteSetup {
                length,
                offset,
                fragment_count,
            } => FieldWriter::with_capacity(10)
                .byte(kind.header_byte(0))
                .u24(*length)?
                .u24(*offset)?
                .u24(*fragment_count)?
                .finish(),
            Self::WriteRequest { start, count } | Self::ReadRequest { start, count } => {
                let (low, high) = start.split();
                FieldWriter::with_capacity(5)
                    .byte(kind.header_byte(low))
                    .u16(high)
                    .u16(*count)
                    .finish()
            }
            Self::WritePayload { index, payload, .. } | Self::ReadPayload { index, payload, .. } => {
                let (low, high) = index.split();
                FieldWriter::with_capacity(FRAGMENT_HEADER_LEN + payload.len())
                    .byte(kind.header_byte(low))
                    .u16(high)
                    .payload(payload)
                    .finish()
            }
            Self::ReadSetup {
                fragment_count,
                length,
            } => {
                let (low, high) = split_counter(*fragment_count);
                FieldWriter::with_capacity(6)
                    .byte(kind.header_byte(low))
                    .u16(high)
                    .u24(*length)?
                    .finish()
            }
            Self::WriteDirect { payload }
            | Self::ReadDirect { payload }
            | Self::Notify { payload } => FieldWriter::with_capacity(1 + payload.len())
                .byte(kind.header_byte(0))
                .payload(payload)
                .finish(),
        };
        Ok(Bytes::from(bytes))
    }

    /// Parse wire bytes into a packet.
    ///
    /// Payloads borrow from `data` without copying.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] when `data` is shorter than the
    /// header its type declares, or [`PacketError::UnknownType`] when the type
    /// nibble is not a known code.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use bts::packet::{FragmentIndex, Packet};
    ///
    /// let packet = Packet::decode(Bytes::from_static(&[0x1A, 0x00, 0x00, 0x03, 0x00])).unwrap();
    /// assert_eq!(
    ///     packet,
    ///     Packet::WriteRequest {
    ///         start: FragmentIndex::new(10),
    ///         count: 3,
    ///     }
    /// );
    /// ```
    pub fn decode(data: Bytes) -> Result<Self, PacketError> {
        let Some(&header) = data.first() else {
            return Err(PacketError::Truncated {
                needed: 1,
                actual: 0,
            });
        };
        let kind = PacketType::from_header_byte(header)?;
        let low = header & 0x0F;

        let pattern = match kind {
            PacketType::WriteSetup => SETUP_WRITE_PATTERN,
            PacketType::ReadSetup => SETUP_READ_PATTERN,
            PacketType::WriteRequest | PacketType::ReadRequest => REQUEST_PATTERN,
            PacketType::WritePayloadMore
            | PacketType::WritePayloadLast
            | PacketType::ReadPayloadMore
            | PacketType::ReadPayloadLast => FRAGMENT_PATTERN,
            PacketType::WriteDirect | PacketType::ReadDirect | PacketType::Notify => {
                DIRECT_PATTERN
            }
        };
        let (fields, rest) = decode_fields(&data, pattern)?;
        let payload = data.slice(data.len() - rest.len()..);

        Ok(match kind {
            PacketType::WriteSetup => Self::WriteSetup {
                length: fields[1],
                offset: fields[2],
                fragment_count: fields[3],
            },
            PacketType::ReadSetup => Self::ReadSetup {
                fragment_count: join_counter(low, narrow(fields[1])),
                length: fields[2],
            },
            PacketType::WriteRequest => Self::WriteRequest {
                start: FragmentIndex::join(low, narrow(fields[1])),
                count: narrow(fields[2]),
            },
            PacketType::ReadRequest => Self::ReadRequest {
                start: FragmentIndex::join(low, narrow(fields[1])),
                count: narrow(fields[2]),
            },
            PacketType::WritePayloadMore | PacketType::WritePayloadLast => Self::WritePayload {
                index: FragmentIndex::join(low, narrow(fields[1])),
                last: kind == PacketType::WritePayloadLast,
                payload,
            },
            PacketType::ReadPayloadMore | PacketType::ReadPayloadLast => Self::ReadPayload {
                index: FragmentIndex::join(low, narrow(fields[1])),
                last: kind == PacketType::ReadPayloadLast,
                payload,
            },
            PacketType::WriteDirect => Self::WriteDirect { payload },
            PacketType::ReadDirect => Self::ReadDirect { payload },
            PacketType::Notify => Self::Notify { payload },
        })
    }
}

/// Narrow a two-byte field value; `decode_fields` never yields more than 16
/// bits for a width of two.
fn narrow(value: u32) -> u16 { u16::try_from(value).unwrap_or(u16::MAX) }
