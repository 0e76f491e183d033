//! Block transfer engines.
//!
//! Each direction is split into a pure state machine ([`WriteTransfer`],
//! [`ReadTransfer`]) that decides which packet comes next, and a small async
//! driver that moves those packets over a [`GattLink`]. The state machines
//! never touch the transport, so their legal transitions are tested in
//! isolation.

pub mod read;
pub mod table;
pub mod write;

use std::time::Duration;

use bytes::Bytes;
use leaky_bucket::RateLimiter;
use tokio::time::Instant;
use tracing::trace;

pub use read::{ReadState, ReadStep, ReadTransfer};
pub use table::FragmentTable;
pub use write::{WriteState, WriteTransfer};

use crate::{
    config::BtsConfig,
    error::{Result, TransferError},
    link::{GattLink, Handle, NotificationReceiver, Received, WriteKind},
    packet::Packet,
};

/// Result of feeding an inbound fragment to a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentStatus {
    /// More fragments are expected.
    Incomplete,
    /// The fragment marked the end of the block.
    Complete,
}

/// Borrowed view of a session used by the drivers for one transfer.
pub(crate) struct TransferIo<'a, L> {
    pub(crate) link: &'a L,
    pub(crate) write_handle: Handle,
    pub(crate) read_handle: Handle,
    pub(crate) notifications: &'a mut NotificationReceiver,
    pub(crate) config: &'a BtsConfig,
    pub(crate) pacer: Option<&'a RateLimiter>,
}

impl<L: GattLink> TransferIo<'_, L> {
    /// Deadline for a wait starting now.
    pub(crate) fn deadline(&self) -> Instant { Instant::now() + self.config.response_timeout() }

    /// Encode and write `packet` to the write characteristic.
    ///
    /// The write must complete within the response timeout.
    pub(crate) async fn send(&self, packet: &Packet, kind: WriteKind) -> Result<()> {
        let bytes = packet.encode()?;
        trace!(
            packet = %packet.packet_type(),
            len = bytes.len(),
            "sending packet"
        );
        write_within(
            self.link,
            self.write_handle,
            bytes,
            kind,
            self.config.response_timeout(),
        )
        .await
    }

    /// Wait for the paced slot of the next outbound fragment.
    pub(crate) async fn pace(&self) {
        if let Some(pacer) = self.pacer {
            pacer.acquire(1).await;
        }
    }

    /// Wait for the next notification on the read characteristic and decode it.
    pub(crate) async fn next_notification(&mut self, waiting_for: &'static str) -> Result<Packet> {
        let deadline = self.deadline();
        self.notification_until(deadline, waiting_for).await
    }

    /// Like [`next_notification`](Self::next_notification), bounded by an
    /// explicit `deadline`.
    pub(crate) async fn notification_until(
        &mut self,
        deadline: Instant,
        waiting_for: &'static str,
    ) -> Result<Packet> {
        match self.notifications.recv_until(self.read_handle, deadline).await {
            Received::Value(data) => decode(data),
            Received::TimedOut => Err(timed_out(self.config.response_timeout(), waiting_for)),
            Received::Closed => Err(TransferError::NotificationsClosed),
        }
    }

    /// Read the read characteristic's current value and decode it.
    pub(crate) async fn read_packet(&self, waiting_for: &'static str) -> Result<Packet> {
        self.read_packet_until(self.deadline(), waiting_for).await
    }

    /// Like [`read_packet`](Self::read_packet), bounded by an explicit
    /// `deadline`.
    pub(crate) async fn read_packet_until(
        &self,
        deadline: Instant,
        waiting_for: &'static str,
    ) -> Result<Packet> {
        let timeout = self.config.response_timeout();
        if Instant::now() >= deadline {
            return Err(timed_out(timeout, waiting_for));
        }
        let data = tokio::time::timeout_at(deadline, self.link.read(self.read_handle))
            .await
            .map_err(|_| timed_out(timeout, waiting_for))??;
        decode(data)
    }
}

/// Write `data` to `handle`, giving up after `timeout`.
pub(crate) async fn write_within<L: GattLink>(
    link: &L,
    handle: Handle,
    data: Bytes,
    kind: WriteKind,
    timeout: Duration,
) -> Result<()> {
    tokio::time::timeout(timeout, link.write(handle, data, kind))
        .await
        .map_err(|_| timed_out(timeout, WRITE_RESPONSE))??;
    Ok(())
}

/// What a timed-out write was waiting for.
pub(crate) const WRITE_RESPONSE: &str = "write response";

fn decode(data: Bytes) -> Result<Packet> {
    let packet = Packet::decode(data)?;
    trace!(packet = %packet.packet_type(), "received packet");
    Ok(packet)
}

fn timed_out(waited: Duration, waiting_for: &'static str) -> TransferError {
    TransferError::TransferTimeout {
        waited,
        waiting_for,
    }
}

#[cfg(test)]
mod tests;
