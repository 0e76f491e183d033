//! Outbound (host to peer) block transfers.
//!
//! The host announces the block with `WRITE_SETUP`, then waits for the peer
//! to grant a window of fragments with `WRITE_REQUEST`. Fragments in the
//! window are written without response, paced by the session's rate limiter,
//! and the final fragment of the block is tagged `WRITE_PAYLOAD_LAST`. Empty
//! blocks skip the exchange and travel as a single `WRITE_DIRECT`.

use std::num::NonZeroUsize;

use bytes::Bytes;
use tracing::{debug, trace};

use super::TransferIo;
use crate::{
    error::{Result, TransferError},
    link::{GattLink, WriteKind},
    metrics::{self, Direction},
    packet::{FragmentIndex, MAX_U24, Packet, PacketType},
};

/// Most fragments a block may span; indices must fit the 16-bit counter.
pub const MAX_FRAGMENT_COUNT: usize = u16::MAX as usize;

/// Position of a [`WriteTransfer`] in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteState {
    /// Nothing has been sent yet.
    Idle,
    /// `WRITE_SETUP` was produced; the peer has not granted a window yet.
    SetupSent,
    /// The previous window is exhausted; waiting for the next grant.
    AwaitingRequest,
    /// Emitting fragments of the current window.
    SendingFragments {
        next: FragmentIndex,
        remaining_in_window: u16,
    },
    /// The last fragment (or the direct packet) was produced.
    Done,
}

/// State machine for one outbound block.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use bytes::Bytes;
/// use bts::{
///     packet::{FragmentIndex, Packet},
///     transfer::{WriteState, WriteTransfer},
/// };
///
/// let size = NonZeroUsize::new(20).unwrap();
/// let mut transfer = WriteTransfer::new(Bytes::from(vec![7_u8; 45]), 0, size).unwrap();
/// assert_eq!(
///     transfer.start(),
///     Packet::WriteSetup { length: 45, offset: 0, fragment_count: 3 }
/// );
/// transfer
///     .on_request(Packet::WriteRequest { start: FragmentIndex::zero(), count: 3 })
///     .unwrap();
/// let sizes: Vec<_> = std::iter::from_fn(|| transfer.next_fragment())
///     .map(|packet| match packet {
///         Packet::WritePayload { payload, last, .. } => (payload.len(), last),
///         other => panic!("unexpected {other:?}"),
///     })
///     .collect();
/// assert_eq!(sizes, vec![(20, false), (20, false), (5, true)]);
/// assert_eq!(transfer.state(), WriteState::Done);
/// ```
#[derive(Debug)]
pub struct WriteTransfer {
    block: Bytes,
    offset: u32,
    fragment_size: usize,
    fragment_count: u16,
    state: WriteState,
}

impl WriteTransfer {
    /// Prepare an outbound transfer of `block` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::BlockTooLarge`] when the block length or the
    /// offset exceeds the 24-bit wire fields, or when the block would need
    /// more fragments than the 16-bit counter can address.
    pub fn new(block: Bytes, offset: u32, fragment_size: NonZeroUsize) -> Result<Self> {
        let fragment_size = fragment_size.get();
        let limit = (MAX_U24 as usize).min(MAX_FRAGMENT_COUNT.saturating_mul(fragment_size));
        if block.len() > limit || offset > MAX_U24 {
            return Err(TransferError::BlockTooLarge {
                len: block.len(),
                limit,
            });
        }
        let fragment_count = u16::try_from(block.len().div_ceil(fragment_size)).map_err(|_| {
            TransferError::BlockTooLarge {
                len: block.len(),
                limit,
            }
        })?;
        Ok(Self {
            block,
            offset,
            fragment_size,
            fragment_count,
            state: WriteState::Idle,
        })
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> WriteState { self.state }

    /// Number of fragments the block spans; zero for an empty block.
    #[must_use]
    pub const fn fragment_count(&self) -> u16 { self.fragment_count }

    /// Report whether nothing remains to be sent.
    #[must_use]
    pub const fn is_done(&self) -> bool { matches!(self.state, WriteState::Done) }

    /// Produce the opening packet.
    ///
    /// Empty blocks yield `WRITE_DIRECT` and complete immediately; all other
    /// blocks yield `WRITE_SETUP`.
    pub fn start(&mut self) -> Packet {
        debug_assert_eq!(self.state, WriteState::Idle, "transfer already started");
        if self.fragment_count == 0 {
            self.state = WriteState::Done;
            return Packet::WriteDirect {
                payload: Bytes::new(),
            };
        }
        self.state = WriteState::SetupSent;
        Packet::WriteSetup {
            length: u32::try_from(self.block.len()).unwrap_or(MAX_U24),
            offset: self.offset,
            fragment_count: u32::from(self.fragment_count),
        }
    }

    /// Accept the peer's window grant.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnexpectedPacket`] if `packet` is not a
    /// `WRITE_REQUEST` or arrives while no grant is expected, and
    /// [`TransferError::FragmentOutOfRange`] if the window starts past the
    /// end of the block or grants no fragments.
    pub fn on_request(&mut self, packet: Packet) -> Result<()> {
        let awaiting = matches!(
            self.state,
            WriteState::SetupSent | WriteState::AwaitingRequest
        );
        let Packet::WriteRequest { start, count } = packet else {
            return Err(TransferError::unexpected(
                "WRITE_REQUEST",
                packet.packet_type(),
            ));
        };
        if !awaiting {
            return Err(TransferError::unexpected(
                "no further packets",
                PacketType::WriteRequest,
            ));
        }
        if start.get() >= self.fragment_count || count == 0 {
            return Err(TransferError::FragmentOutOfRange {
                index: start,
                count: self.fragment_count,
            });
        }
        debug!(start = start.get(), count, "peer granted write window");
        self.state = WriteState::SendingFragments {
            next: start,
            remaining_in_window: count,
        };
        Ok(())
    }

    /// Produce the next fragment of the current window.
    ///
    /// Returns `None` once the window is exhausted or the block is complete.
    pub fn next_fragment(&mut self) -> Option<Packet> {
        let WriteState::SendingFragments {
            next,
            remaining_in_window,
        } = self.state
        else {
            return None;
        };

        let start = next.as_usize() * self.fragment_size;
        let end = (start + self.fragment_size).min(self.block.len());
        let following = next
            .checked_increment()
            .filter(|index| index.get() < self.fragment_count);
        let last = following.is_none();

        self.state = match following {
            None => WriteState::Done,
            Some(_) if remaining_in_window == 1 => WriteState::AwaitingRequest,
            Some(index) => WriteState::SendingFragments {
                next: index,
                remaining_in_window: remaining_in_window - 1,
            },
        };

        trace!(index = next.get(), len = end - start, last, "write fragment");
        Some(Packet::WritePayload {
            index: next,
            last,
            payload: self.block.slice(start..end),
        })
    }
}

/// Drive `transfer` to completion over `io`.
pub(crate) async fn run<L: GattLink>(
    io: &mut TransferIo<'_, L>,
    mut transfer: WriteTransfer,
) -> Result<()> {
    let opening = transfer.start();
    io.send(&opening, WriteKind::WithResponse).await?;

    while !transfer.is_done() {
        let request = io.next_notification("WRITE_REQUEST").await?;
        transfer.on_request(request)?;
        while let Some(fragment) = transfer.next_fragment() {
            io.pace().await;
            io.send(&fragment, WriteKind::WithoutResponse).await?;
            metrics::inc_fragments(Direction::Outbound);
        }
    }
    Ok(())
}
