//! A simulated peer implementing the device side of the Block Transfer
//! Service.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use bts::{
    BtsConfig,
    BtsSession,
    FragmentIndex,
    FragmentSource,
    GattLink,
    Handle,
    LinkError,
    Notification,
    NotificationSender,
    Packet,
    TransferError,
    WriteKind,
    notification_channel,
};
use bytes::{Bytes, BytesMut};

/// Value handle of the simulated write characteristic.
pub const WRITE_HANDLE: Handle = 0x0012;
/// Value handle of the simulated read characteristic.
pub const READ_HANDLE: Handle = 0x0015;
/// Handle of the read characteristic's configuration descriptor.
pub const CCCD_HANDLE: Handle = 0x0016;

/// A block the host finished writing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedBlock {
    /// Offset announced in `WRITE_SETUP`; zero for direct writes.
    pub offset: u32,
    /// Reassembled block bytes.
    pub data: Bytes,
}

/// Configures a [`SimulatedPeripheral`].
#[derive(Clone, Debug)]
pub struct PeripheralBuilder {
    window: u16,
    fragment_size: usize,
    fragment_source: FragmentSource,
    offered: Bytes,
    drop_fragment: Option<u16>,
    withhold_last: bool,
    setup_reply: Option<Packet>,
    direct: bool,
}

impl Default for PeripheralBuilder {
    fn default() -> Self {
        Self {
            window: u16::MAX,
            fragment_size: 20,
            fragment_source: FragmentSource::Notification,
            offered: Bytes::new(),
            drop_fragment: None,
            withhold_last: false,
            setup_reply: None,
            direct: false,
        }
    }
}

impl PeripheralBuilder {
    /// Grant at most `window` fragments per `WRITE_REQUEST`.
    #[must_use]
    pub fn window(mut self, window: u16) -> Self {
        self.window = window.max(1);
        self
    }

    /// Split offered blocks into fragments of `size` bytes.
    #[must_use]
    pub fn fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size.max(1);
        self
    }

    /// Deliver read fragments as notifications or through polled reads.
    #[must_use]
    pub fn fragment_source(mut self, source: FragmentSource) -> Self {
        self.fragment_source = source;
        self
    }

    /// Block served to the host's next read.
    #[must_use]
    pub fn offer(mut self, block: impl Into<Bytes>) -> Self {
        self.offered = block.into();
        self
    }

    /// Serve offered blocks as `READ_DIRECT` regardless of size.
    #[must_use]
    pub fn serve_directly(mut self) -> Self {
        self.direct = true;
        self
    }

    /// Never deliver the read fragment at `index`.
    #[must_use]
    pub fn drop_fragment(mut self, index: u16) -> Self {
        self.drop_fragment = Some(index);
        self
    }

    /// Never deliver the final read fragment.
    #[must_use]
    pub fn withhold_last_fragment(mut self) -> Self {
        self.withhold_last = true;
        self
    }

    /// Answer `WRITE_SETUP` with `packet` instead of a `WRITE_REQUEST`.
    #[must_use]
    pub fn reply_to_setup_with(mut self, packet: Packet) -> Self {
        self.setup_reply = Some(packet);
        self
    }

    /// Create the peripheral, notifying the host through `notify`.
    #[must_use]
    pub fn build(self, notify: NotificationSender) -> Arc<SimulatedPeripheral> {
        Arc::new(SimulatedPeripheral {
            notify,
            state: Mutex::new(PeerState {
                offered: self.offered.clone(),
                ..PeerState::default()
            }),
            options: self,
        })
    }
}

#[derive(Debug)]
struct Inbound {
    offset: u32,
    fragment_count: u16,
    slots: Vec<Option<Bytes>>,
    window_left: u16,
}

#[derive(Debug, Default)]
struct PeerState {
    cccd: Option<Bytes>,
    written: Vec<Packet>,
    inbound: Option<Inbound>,
    received: Vec<ReceivedBlock>,
    offered: Bytes,
    polled: VecDeque<Bytes>,
    finished_reads: usize,
}

/// In-memory BTS peer implementing [`GattLink`].
#[derive(Debug)]
pub struct SimulatedPeripheral {
    notify: NotificationSender,
    state: Mutex<PeerState>,
    options: PeripheralBuilder,
}

impl SimulatedPeripheral {
    fn state(&self) -> MutexGuard<'_, PeerState> { self.state.lock().expect("peer state poisoned") }

    /// Blocks the host has finished writing, oldest first.
    #[must_use]
    pub fn received_blocks(&self) -> Vec<ReceivedBlock> { self.state().received.clone() }

    /// Every packet the host wrote to the write characteristic.
    #[must_use]
    pub fn written_packets(&self) -> Vec<Packet> { self.state().written.clone() }

    /// Raw value last written to the configuration descriptor.
    #[must_use]
    pub fn cccd_value(&self) -> Option<Bytes> { self.state().cccd.clone() }

    /// Number of sentinel `READ_REQUEST`s the host sent.
    #[must_use]
    pub fn finished_reads(&self) -> usize { self.state().finished_reads }

    /// Replace the block served to the host's next read.
    pub fn offer(&self, block: impl Into<Bytes>) { self.state().offered = block.into(); }

    fn encode(packet: &Packet) -> Bytes { packet.encode().expect("peer packet encodes") }

    fn notification(packet: &Packet) -> Notification { Notification::new(READ_HANDLE, Self::encode(packet)) }

    fn current_value(&self) -> Bytes {
        let mut state = self.state();
        if let Some(value) = state.polled.pop_front() {
            return value;
        }
        let offered = state.offered.clone();
        if offered.is_empty() || self.options.direct {
            return Self::encode(&Packet::ReadDirect { payload: offered });
        }
        let fragment_count = u16::try_from(offered.len().div_ceil(self.options.fragment_size))
            .expect("offered block fits the fragment counter");
        Self::encode(&Packet::ReadSetup {
            fragment_count,
            length: u32::try_from(offered.len()).expect("offered block fits 24 bits"),
        })
    }

    /// Handle one host write, returning the notifications to deliver.
    fn on_write(&self, packet: Packet) -> Vec<Notification> {
        let mut state = self.state();
        state.written.push(packet.clone());
        match packet {
            Packet::WriteDirect { payload } => {
                state.received.push(ReceivedBlock {
                    offset: 0,
                    data: payload,
                });
                Vec::new()
            }
            Packet::WriteSetup {
                offset,
                fragment_count,
                ..
            } => {
                if let Some(reply) = &self.options.setup_reply {
                    return vec![Self::notification(reply)];
                }
                let fragment_count = u16::try_from(fragment_count).expect("count fits u16");
                let window = self.options.window.min(fragment_count);
                state.inbound = Some(Inbound {
                    offset,
                    fragment_count,
                    slots: vec![None; usize::from(fragment_count)],
                    window_left: window,
                });
                vec![Self::notification(&Packet::WriteRequest {
                    start: FragmentIndex::zero(),
                    count: window,
                })]
            }
            Packet::WritePayload {
                index,
                last,
                payload,
            } => self.on_write_fragment(&mut state, index, last, payload),
            Packet::ReadRequest { start, count } => {
                if start == bts::packet::END_OF_TRANSFER {
                    state.finished_reads += 1;
                    return Vec::new();
                }
                let fragments = self.read_fragments(&state.offered, start, count);
                match self.options.fragment_source {
                    FragmentSource::Notification => fragments.iter().map(Self::notification).collect(),
                    FragmentSource::Poll => {
                        state.polled.extend(fragments.iter().map(Self::encode));
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        }
    }

    fn on_write_fragment(
        &self,
        state: &mut PeerState,
        index: FragmentIndex,
        last: bool,
        payload: Bytes,
    ) -> Vec<Notification> {
        let Some(inbound) = state.inbound.as_mut() else {
            return Vec::new();
        };
        if let Some(slot) = inbound.slots.get_mut(index.as_usize()) {
            *slot = Some(payload);
        }
        if last {
            let mut data = BytesMut::new();
            for slot in inbound.slots.iter().flatten() {
                data.extend_from_slice(slot);
            }
            let offset = inbound.offset;
            state.inbound = None;
            state.received.push(ReceivedBlock {
                offset,
                data: data.freeze(),
            });
            return Vec::new();
        }
        inbound.window_left = inbound.window_left.saturating_sub(1);
        if inbound.window_left > 0 {
            return Vec::new();
        }
        let next = index.get() + 1;
        let window = self.options.window.min(inbound.fragment_count - next);
        inbound.window_left = window;
        vec![Self::notification(&Packet::WriteRequest {
            start: FragmentIndex::new(next),
            count: window,
        })]
    }

    fn read_fragments(&self, block: &Bytes, start: FragmentIndex, count: u16) -> Vec<Packet> {
        let size = self.options.fragment_size;
        let total = block.len().div_ceil(size);
        let first = start.as_usize();
        let end = (first + usize::from(count)).min(total);
        (first..end)
            .filter(|&index| Some(index) != self.options.drop_fragment.map(usize::from))
            .filter(|&index| !(self.options.withhold_last && index + 1 == total))
            .map(|index| Packet::ReadPayload {
                index: FragmentIndex::new(u16::try_from(index).expect("index fits u16")),
                last: index + 1 == total,
                payload: block.slice(index * size..((index + 1) * size).min(block.len())),
            })
            .collect()
    }
}

#[async_trait]
impl GattLink for SimulatedPeripheral {
    async fn read(&self, handle: Handle) -> Result<Bytes, LinkError> {
        if handle != READ_HANDLE {
            return Err(LinkError::UnknownHandle(handle));
        }
        Ok(self.current_value())
    }

    async fn write(&self, handle: Handle, data: Bytes, _kind: WriteKind) -> Result<(), LinkError> {
        match handle {
            CCCD_HANDLE => {
                self.state().cccd = Some(data);
                Ok(())
            }
            WRITE_HANDLE => {
                let packet = Packet::decode(data).map_err(|err| LinkError::Other(Box::new(err)))?;
                let notifications = self.on_write(packet);
                if notifications.is_empty() {
                    return Ok(());
                }
                let notify = self.notify.clone();
                tokio::spawn(async move {
                    for notification in notifications {
                        if notify.send(notification).await.is_err() {
                            break;
                        }
                    }
                });
                Ok(())
            }
            other => Err(LinkError::UnknownHandle(other)),
        }
    }
}

/// Build a peripheral from `builder` and open a session against it.
///
/// # Errors
///
/// Propagates any error from [`BtsSessionBuilder::open`](bts::BtsSessionBuilder::open).
pub async fn open_session(
    builder: PeripheralBuilder,
    config: BtsConfig,
) -> Result<(Arc<SimulatedPeripheral>, BtsSession<Arc<SimulatedPeripheral>>), TransferError> {
    let (notify_tx, notify_rx) = notification_channel(config.notification_capacity().get());
    let peripheral = builder.build(notify_tx);
    let session = BtsSession::builder(Arc::clone(&peripheral))
        .write_characteristic(WRITE_HANDLE)
        .read_characteristic(READ_HANDLE, CCCD_HANDLE)
        .notifications(notify_rx)
        .config(config)
        .open()
        .await?;
    Ok((peripheral, session))
}
