//! Slot table collecting inbound fragments by index.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::{
    error::{Result, TransferError},
    packet::FragmentIndex,
};

/// Fixed-size table holding one optional payload per fragment index.
///
/// Fragments may arrive in any order; a repeated index replaces the earlier
/// payload.
#[derive(Debug)]
pub struct FragmentTable {
    slots: Vec<Option<Bytes>>,
    filled: usize,
}

impl FragmentTable {
    /// Allocate `fragment_count` empty slots.
    #[must_use]
    pub fn new(fragment_count: u16) -> Self {
        Self {
            slots: vec![None; usize::from(fragment_count)],
            filled: 0,
        }
    }

    /// Number of slots in the table.
    #[must_use]
    pub fn len(&self) -> usize { self.slots.len() }

    /// Report whether the table has no slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// Number of slots still empty.
    #[must_use]
    pub fn missing(&self) -> usize { self.slots.len() - self.filled }

    /// Store `payload` at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::FragmentOutOfRange`] when `index` has no slot.
    pub fn insert(&mut self, index: FragmentIndex, payload: Bytes) -> Result<()> {
        let count = u16::try_from(self.slots.len()).unwrap_or(u16::MAX);
        let Some(slot) = self.slots.get_mut(index.as_usize()) else {
            return Err(TransferError::FragmentOutOfRange { index, count });
        };
        if slot.replace(payload).is_some() {
            trace!(index = index.get(), "replacing duplicate fragment");
        } else {
            self.filled += 1;
        }
        Ok(())
    }

    /// Concatenate every slot in index order.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::IncompleteTransfer`] if any slot is empty.
    pub fn assemble(self) -> Result<Bytes> {
        if self.filled != self.slots.len() {
            return Err(TransferError::IncompleteTransfer {
                missing: self.missing(),
                total: self.slots.len(),
            });
        }
        let total = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut block = BytesMut::with_capacity(total);
        for payload in self.slots.into_iter().flatten() {
            block.extend_from_slice(&payload);
        }
        Ok(block.freeze())
    }
}
