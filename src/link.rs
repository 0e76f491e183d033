//! Capability interface to the GATT collaborator.
//!
//! The native BLE stack is out of reach of this crate. Sessions talk to it
//! through [`GattLink`] for attribute reads and writes, and receive
//! notifications through a bounded channel created by
//! [`notification_channel`]. The collaborator keeps the
//! [`NotificationSender`]; the session owns the [`NotificationReceiver`].
//! Nothing is overwritten when notifications arrive faster than they are
//! consumed: producers wait for capacity instead.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::Instant,
};
use tracing::debug;

/// ATT attribute handle.
pub type Handle = u16;

/// Whether a write waits for the peer's ATT response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    /// ATT Write Request; completes once the peer acknowledges.
    WithResponse,
    /// ATT Write Command; completes once the packet is queued.
    WithoutResponse,
}

/// Errors reported by the GATT collaborator.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No attribute exists at the given handle.
    #[error("no attribute at handle {0:#06x}")]
    UnknownHandle(Handle),
    /// The link to the peer was lost.
    #[error("link disconnected")]
    Disconnected,
    /// The platform stack reported an I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// Any other collaborator failure.
    #[error("link failure")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Single-attribute I/O against a connected peer.
///
/// Each call corresponds to exactly one transport-level packet.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Read the current value of the attribute at `handle`.
    async fn read(&self, handle: Handle) -> Result<Bytes, LinkError>;

    /// Write `data` to the attribute at `handle`.
    async fn write(&self, handle: Handle, data: Bytes, kind: WriteKind) -> Result<(), LinkError>;
}

#[async_trait]
impl<L: GattLink + ?Sized> GattLink for std::sync::Arc<L> {
    async fn read(&self, handle: Handle) -> Result<Bytes, LinkError> { (**self).read(handle).await }

    async fn write(&self, handle: Handle, data: Bytes, kind: WriteKind) -> Result<(), LinkError> {
        (**self).write(handle, data, kind).await
    }
}

/// A value pushed by the peer on a subscribed characteristic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Value handle of the notifying characteristic.
    pub handle: Handle,
    /// Notified value.
    pub data: Bytes,
}

impl Notification {
    /// Construct a notification for `handle`.
    #[must_use]
    pub fn new(handle: Handle, data: impl Into<Bytes>) -> Self {
        Self {
            handle,
            data: data.into(),
        }
    }
}

/// Errors returned by [`NotificationSender::try_send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationQueueError {
    /// The queue is at capacity.
    #[error("notification queue full")]
    Full,
    /// The session dropped its receiver.
    #[error("notification queue closed")]
    Closed,
}

/// Producer half of a session's notification queue.
#[derive(Clone, Debug)]
pub struct NotificationSender(mpsc::Sender<Notification>);

impl NotificationSender {
    /// Queue a notification, waiting for capacity when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationQueueError::Closed`] if the receiver was dropped.
    pub async fn send(&self, notification: Notification) -> Result<(), NotificationQueueError> {
        self.0
            .send(notification)
            .await
            .map_err(|_| NotificationQueueError::Closed)
    }

    /// Queue a notification without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationQueueError::Full`] when the queue has no spare
    /// capacity, or [`NotificationQueueError::Closed`] if the receiver was
    /// dropped.
    pub fn try_send(&self, notification: Notification) -> Result<(), NotificationQueueError> {
        self.0.try_send(notification).map_err(|err| match err {
            TrySendError::Full(_) => NotificationQueueError::Full,
            TrySendError::Closed(_) => NotificationQueueError::Closed,
        })
    }
}

/// Outcome of waiting for a notification.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Received {
    Value(Bytes),
    TimedOut,
    Closed,
}

/// Consumer half of a session's notification queue.
#[derive(Debug)]
pub struct NotificationReceiver(mpsc::Receiver<Notification>);

impl NotificationReceiver {
    /// Wait until `deadline` for the next notification on `handle`.
    ///
    /// Notifications for other handles are discarded. The deadline is checked
    /// before every receive, so a flood of unrelated notifications cannot
    /// extend the wait.
    pub(crate) async fn recv_until(&mut self, handle: Handle, deadline: Instant) -> Received {
        loop {
            if Instant::now() >= deadline {
                return Received::TimedOut;
            }
            match tokio::time::timeout_at(deadline, self.0.recv()).await {
                Err(_) => return Received::TimedOut,
                Ok(None) => return Received::Closed,
                Ok(Some(notification)) if notification.handle == handle => {
                    return Received::Value(notification.data);
                }
                Ok(Some(notification)) => {
                    debug!(
                        handle = notification.handle,
                        expected = handle,
                        "ignoring notification for unrelated handle"
                    );
                }
            }
        }
    }

    /// Discard every queued notification, returning how many were dropped.
    pub(crate) fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.0.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Create a bounded notification queue holding up to `capacity` entries.
///
/// # Panics
///
/// Panics if `capacity` is zero.
///
/// # Examples
///
/// ```
/// use bts::link::{Notification, notification_channel};
///
/// let (tx, _rx) = notification_channel(4);
/// tx.try_send(Notification::new(0x0010, vec![0x10, 0x00, 0x00, 0x01, 0x00]))
///     .expect("queue has capacity");
/// ```
#[must_use]
pub fn notification_channel(capacity: usize) -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotificationSender(tx), NotificationReceiver(rx))
}
