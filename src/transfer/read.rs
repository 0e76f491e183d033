//! Inbound (peer to host) block transfers.
//!
//! The host reads the read characteristic. A `READ_DIRECT` value is the whole
//! block. A `READ_SETUP` value announces a fragmented block: the host
//! requests every fragment with one `READ_REQUEST`, files each payload in a
//! [`FragmentTable`] until `READ_PAYLOAD_LAST` arrives, tells the peer the
//! transfer is over with the sentinel request and reassembles the table.
//! Missing fragments are reported rather than re-requested.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{FragmentStatus, FragmentTable, TransferIo};
use crate::{
    config::FragmentSource,
    error::{Result, TransferError},
    link::{GattLink, WriteKind},
    metrics::{self, Direction},
    packet::{END_OF_TRANSFER, FragmentIndex, Packet},
};

/// Position of a [`ReadTransfer`] in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// Waiting for the initial `READ_SETUP` or `READ_DIRECT` value.
    AwaitingSetup,
    /// Fragments have been requested and are being collected.
    Receiving { fragment_count: u16 },
    /// The block is complete (or `READ_PAYLOAD_LAST` was seen).
    Done,
}

/// What the driver does after the initial value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadStep {
    /// The block is already complete.
    Complete(Bytes),
    /// Send this request and start collecting fragments.
    Request(Packet),
}

/// State machine for one inbound block.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use bts::{
///     packet::{FragmentIndex, Packet},
///     transfer::{FragmentStatus, ReadStep, ReadTransfer},
/// };
///
/// let mut transfer = ReadTransfer::new();
/// let step = transfer
///     .on_initial(Packet::ReadSetup { fragment_count: 2, length: 5 })
///     .unwrap();
/// assert_eq!(
///     step,
///     ReadStep::Request(Packet::ReadRequest { start: FragmentIndex::zero(), count: 2 })
/// );
/// let last = Packet::ReadPayload {
///     index: FragmentIndex::new(1),
///     last: true,
///     payload: Bytes::from_static(b"lo"),
/// };
/// let first = Packet::ReadPayload {
///     index: FragmentIndex::zero(),
///     last: false,
///     payload: Bytes::from_static(b"hel"),
/// };
/// assert_eq!(transfer.on_fragment(first).unwrap(), FragmentStatus::Incomplete);
/// assert_eq!(transfer.on_fragment(last).unwrap(), FragmentStatus::Complete);
/// assert_eq!(transfer.finish().unwrap(), Bytes::from_static(b"hello"));
/// ```
#[derive(Debug)]
pub struct ReadTransfer {
    state: ReadState,
    table: FragmentTable,
    announced_length: Option<u32>,
}

impl Default for ReadTransfer {
    fn default() -> Self { Self::new() }
}

impl ReadTransfer {
    /// Start a transfer waiting for the initial value.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReadState::AwaitingSetup,
            table: FragmentTable::new(0),
            announced_length: None,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> ReadState { self.state }

    /// The request telling the peer the transfer is over.
    #[must_use]
    pub const fn end_of_transfer() -> Packet {
        Packet::ReadRequest {
            start: END_OF_TRANSFER,
            count: 1,
        }
    }

    /// Interpret the initial value of the read characteristic.
    ///
    /// A setup announcing zero fragments completes with an empty block and
    /// requests nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnexpectedPacket`] unless `packet` is
    /// `READ_SETUP` or `READ_DIRECT` and the transfer is awaiting it.
    pub fn on_initial(&mut self, packet: Packet) -> Result<ReadStep> {
        if self.state != ReadState::AwaitingSetup {
            return Err(TransferError::unexpected(
                "READ_PAYLOAD",
                packet.packet_type(),
            ));
        }
        match packet {
            Packet::ReadDirect { payload } => {
                debug!(len = payload.len(), "peer sent block directly");
                self.state = ReadState::Done;
                Ok(ReadStep::Complete(payload))
            }
            Packet::ReadSetup {
                fragment_count: 0,
                length,
            } => {
                debug!(length, "peer announced an empty fragmented block");
                self.state = ReadState::Done;
                Ok(ReadStep::Complete(Bytes::new()))
            }
            Packet::ReadSetup {
                fragment_count,
                length,
            } => {
                debug!(fragment_count, length, "peer announced fragmented block");
                self.table = FragmentTable::new(fragment_count);
                self.announced_length = Some(length);
                self.state = ReadState::Receiving { fragment_count };
                Ok(ReadStep::Request(Packet::ReadRequest {
                    start: FragmentIndex::zero(),
                    count: fragment_count,
                }))
            }
            other => Err(TransferError::unexpected(
                "READ_SETUP or READ_DIRECT",
                other.packet_type(),
            )),
        }
    }

    /// File an inbound fragment.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnexpectedPacket`] for anything other than a
    /// payload fragment while receiving, and
    /// [`TransferError::FragmentOutOfRange`] for an index past the announced
    /// fragment count.
    pub fn on_fragment(&mut self, packet: Packet) -> Result<FragmentStatus> {
        let ReadState::Receiving { .. } = self.state else {
            return Err(TransferError::unexpected(
                "no further packets",
                packet.packet_type(),
            ));
        };
        let Packet::ReadPayload {
            index,
            last,
            payload,
        } = packet
        else {
            return Err(TransferError::unexpected(
                "READ_PAYLOAD",
                packet.packet_type(),
            ));
        };

        trace!(index = index.get(), len = payload.len(), last, "read fragment");
        self.table.insert(index, payload)?;
        if last {
            self.state = ReadState::Done;
            Ok(FragmentStatus::Complete)
        } else {
            Ok(FragmentStatus::Incomplete)
        }
    }

    /// Number of distinct fragments filed so far.
    #[must_use]
    pub fn fragments_received(&self) -> usize { self.table.len() - self.table.missing() }

    /// Reassemble the collected fragments.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::IncompleteTransfer`] when any fragment is
    /// missing.
    pub fn finish(self) -> Result<Bytes> {
        let missing = self.table.missing();
        if missing > 0 {
            warn!(
                missing,
                total = self.table.len(),
                "read finished with missing fragments"
            );
        }
        let block = self.table.assemble()?;
        if let Some(length) = self.announced_length.filter(|&len| len as usize != block.len()) {
            warn!(
                announced = length,
                received = block.len(),
                "block length differs from setup"
            );
        }
        Ok(block)
    }
}

/// Drive a read to completion over `io`.
///
/// Fragment collection shares one deadline that only moves forward when a
/// new fragment is filed, so a peer repeating fragments or a polled value
/// that never changes still times out.
pub(crate) async fn run<L: GattLink>(io: &mut TransferIo<'_, L>) -> Result<Bytes> {
    let mut transfer = ReadTransfer::new();
    let initial = io.read_packet("READ_SETUP").await?;
    let request = match transfer.on_initial(initial)? {
        ReadStep::Complete(block) => return Ok(block),
        ReadStep::Request(request) => request,
    };
    io.send(&request, WriteKind::WithResponse).await?;

    let mut deadline = io.deadline();
    loop {
        let packet = match io.config.fragment_source() {
            FragmentSource::Notification => {
                io.notification_until(deadline, "READ_PAYLOAD").await?
            }
            FragmentSource::Poll => io.read_packet_until(deadline, "READ_PAYLOAD").await?,
        };
        let before = transfer.fragments_received();
        let status = transfer.on_fragment(packet)?;
        metrics::inc_fragments(Direction::Inbound);
        if status == FragmentStatus::Complete {
            break;
        }
        if transfer.fragments_received() > before {
            deadline = io.deadline();
        }
    }

    io.send(&ReadTransfer::end_of_transfer(), WriteKind::WithResponse)
        .await?;
    transfer.finish()
}
