//! Fixed-width little-endian field helpers.
//!
//! Every BTS packet is a run of fixed-width unsigned integers followed by a
//! free-form payload. [`decode_fields`] consumes such a run according to a
//! width pattern; [`FieldWriter`] produces one.

use super::PacketError;

/// Widest integer field the codec understands.
pub const MAX_FIELD_WIDTH: usize = 4;

/// Read `pattern.len()` little-endian unsigned fields from `data`.
///
/// Each entry of `pattern` is a field width in bytes (0 to 4); a zero-width
/// field reads as `0`. Fields are consumed left to right; the bytes left over
/// are returned as the payload.
///
/// # Errors
///
/// Returns [`PacketError::FieldWidth`] when a width exceeds
/// [`MAX_FIELD_WIDTH`], and [`PacketError::Truncated`] when `data` is shorter
/// than the sum of the declared widths.
///
/// # Examples
///
/// ```
/// use bts::packet::decode_fields;
///
/// let (fields, payload) = decode_fields(&[0x02, 0x2D, 0x00, 0x00, 0xAA], &[1, 3]).unwrap();
/// assert_eq!(fields, vec![0x02, 45]);
/// assert_eq!(payload, &[0xAA]);
/// ```
pub fn decode_fields<'a>(
    data: &'a [u8],
    pattern: &[usize],
) -> Result<(Vec<u32>, &'a [u8]), PacketError> {
    if let Some(&width) = pattern.iter().find(|&&width| width > MAX_FIELD_WIDTH) {
        return Err(PacketError::FieldWidth { width });
    }
    let needed: usize = pattern.iter().sum();
    if data.len() < needed {
        return Err(PacketError::Truncated {
            needed,
            actual: data.len(),
        });
    }

    let mut fields = Vec::with_capacity(pattern.len());
    let mut rest = data;
    for &width in pattern {
        let (field, tail) = rest.split_at(width);
        fields.push(read_le(field));
        rest = tail;
    }
    Ok((fields, rest))
}

fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0_u32, |acc, &byte| (acc << 8) | u32::from(byte))
}

/// Append-only builder for packet bytes.
#[derive(Debug)]
pub(crate) struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn byte(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    pub(crate) fn u16(mut self, value: u16) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a 24-bit little-endian field.
    pub(crate) fn u24(mut self, value: u32) -> Result<Self, PacketError> {
        if value > MAX_U24 {
            return Err(PacketError::FieldOverflow { value, width: 3 });
        }
        self.buf.extend_from_slice(&value.to_le_bytes()[..3]);
        Ok(self)
    }

    pub(crate) fn payload(mut self, payload: &[u8]) -> Self {
        self.buf.extend_from_slice(payload);
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> { self.buf }
}

/// Largest value a 24-bit length, offset or count field can carry.
pub const MAX_U24: u32 = 0x00FF_FFFF;
