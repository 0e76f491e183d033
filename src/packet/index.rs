//! Sixteen-bit fragment counters split across the header byte and an
//! extension field.
//!
//! Provides [`FragmentIndex`], a type-safe wrapper around `u16`, and the
//! helpers that split a counter into its low nibble and high bits and join
//! them back together.

use derive_more::{Display, From};

/// Index reserved by `READ_REQUEST` to tell the peer the transfer is over.
pub const END_OF_TRANSFER: FragmentIndex = FragmentIndex(0xFFFF);

/// Largest value representable by the 12-bit extension of a counter.
pub const MAX_HIGH_BITS: u16 = 0x0FFF;

/// Zero-based ordinal describing a fragment's position within its block.
///
/// # Examples
///
/// ```
/// use bts::packet::FragmentIndex;
///
/// let index = FragmentIndex::new(0x1234);
/// assert_eq!(index.split(), (0x4, 0x123));
/// assert_eq!(FragmentIndex::join(0x4, 0x123), index);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("{_0}")]
pub struct FragmentIndex(u16);

impl FragmentIndex {
    /// Construct an index from a `u16` value.
    #[must_use]
    pub const fn new(value: u16) -> Self { Self(value) }

    /// Return the first valid fragment index.
    #[must_use]
    pub const fn zero() -> Self { Self(0) }

    /// Return the underlying numeric value.
    #[must_use]
    pub const fn get(self) -> u16 { self.0 }

    /// Increment the index, returning `None` on overflow.
    #[must_use]
    pub fn checked_increment(self) -> Option<Self> { self.0.checked_add(1).map(Self) }

    /// Split the index into the header nibble and the 12-bit extension.
    #[must_use]
    pub const fn split(self) -> (u8, u16) { split_counter(self.0) }

    /// Rebuild an index from the header nibble and the extension field.
    #[must_use]
    pub const fn join(low_nibble: u8, high_bits: u16) -> Self {
        Self(join_counter(low_nibble, high_bits))
    }

    /// Return the index as a slot position in a fragment table.
    #[must_use]
    pub const fn as_usize(self) -> usize { self.0 as usize }
}

impl From<FragmentIndex> for u16 {
    fn from(value: FragmentIndex) -> Self { value.0 }
}

/// Split a 16-bit counter into `(low_nibble, high_bits)`.
#[must_use]
pub const fn split_counter(value: u16) -> (u8, u16) {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "masked to four bits before the cast"
    )]
    let low = (value & 0x000F) as u8;
    (low, value >> 4)
}

/// Rebuild a 16-bit counter as `(high_bits << 4) | low_nibble`.
///
/// Bits above the low nibble of `low_nibble` and above the twelfth bit of
/// `high_bits` are ignored.
#[must_use]
pub const fn join_counter(low_nibble: u8, high_bits: u16) -> u16 {
    ((high_bits & MAX_HIGH_BITS) << 4) | (low_nibble & 0x0F) as u16
}
