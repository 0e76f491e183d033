//! Block Transfer Service session.
//!
//! A [`BtsSession`] binds the write characteristic, the read characteristic
//! and its notification queue into one object exposing `write` and `read`.
//! Both operations take `&mut self`, so at most one transfer is in flight
//! per session.

use std::time::Duration;

use bytes::Bytes;
use leaky_bucket::RateLimiter;
use tracing::{Instrument, debug, debug_span, warn};

use crate::{
    config::BtsConfig,
    error::{CharacteristicRole, Result, TransferError},
    link::{GattLink, Handle, NotificationReceiver, WriteKind},
    metrics::{self, Direction},
    transfer::{TransferIo, WriteTransfer, read, write, write_within},
};

/// Client Characteristic Configuration value enabling notifications.
pub const ENABLE_NOTIFICATIONS: u16 = 0x0001;

/// Handles of the characteristic the peer notifies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadCharacteristic {
    /// Value handle of the read characteristic.
    pub value: Handle,
    /// Handle of its Client Characteristic Configuration descriptor.
    pub cccd: Handle,
}

/// Builder for [`BtsSession`].
///
/// # Examples
///
/// ```no_run
/// # async fn open(link: impl bts::GattLink) -> Result<(), bts::TransferError> {
/// use bts::{BtsConfig, BtsSession, link::notification_channel};
///
/// let config = BtsConfig::default();
/// let (notify_tx, notify_rx) = notification_channel(config.notification_capacity().get());
/// // Hand `notify_tx` to the GATT collaborator.
/// # drop(notify_tx);
/// let mut session = BtsSession::builder(link)
///     .write_characteristic(0x0012)
///     .read_characteristic(0x0015, 0x0016)
///     .notifications(notify_rx)
///     .config(config)
///     .open()
///     .await?;
/// session.write(&b"hello"[..]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BtsSessionBuilder<L> {
    link: L,
    write: Option<Handle>,
    read: Option<ReadCharacteristic>,
    notifications: Option<NotificationReceiver>,
    config: BtsConfig,
}

impl<L: GattLink> BtsSessionBuilder<L> {
    /// Set the value handle of the write characteristic.
    #[must_use]
    pub fn write_characteristic(mut self, value: Handle) -> Self {
        self.write = Some(value);
        self
    }

    /// Set the value and descriptor handles of the read characteristic.
    #[must_use]
    pub fn read_characteristic(mut self, value: Handle, cccd: Handle) -> Self {
        self.read = Some(ReadCharacteristic { value, cccd });
        self
    }

    /// Attach the receiving half of the notification queue.
    #[must_use]
    pub fn notifications(mut self, receiver: NotificationReceiver) -> Self {
        self.notifications = Some(receiver);
        self
    }

    /// Replace the default configuration.
    #[must_use]
    pub fn config(mut self, config: BtsConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the characteristics and enable notifications on the read
    /// characteristic.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MissingCharacteristic`] when either
    /// characteristic was not supplied, [`TransferError::MissingNotifications`]
    /// without a notification receiver, [`TransferError::Link`] if the
    /// descriptor write fails and [`TransferError::TransferTimeout`] if it is
    /// not acknowledged within the response timeout.
    pub async fn open(self) -> Result<BtsSession<L>> {
        let write_handle = self
            .write
            .ok_or(TransferError::MissingCharacteristic(CharacteristicRole::Write))?;
        let read = self
            .read
            .ok_or(TransferError::MissingCharacteristic(CharacteristicRole::Read))?;
        let notifications = self
            .notifications
            .ok_or(TransferError::MissingNotifications)?;

        write_within(
            &self.link,
            read.cccd,
            Bytes::copy_from_slice(&ENABLE_NOTIFICATIONS.to_le_bytes()),
            WriteKind::WithResponse,
            self.config.response_timeout(),
        )
        .await?;
        debug!(
            write_handle,
            read_handle = read.value,
            cccd = read.cccd,
            "opened block transfer session"
        );

        Ok(BtsSession {
            link: self.link,
            write_handle,
            read,
            notifications,
            pacer: build_pacer(self.config.fragment_delay()),
            config: self.config,
        })
    }
}

fn build_pacer(delay: Duration) -> Option<RateLimiter> {
    (!delay.is_zero()).then(|| {
        RateLimiter::builder()
            .initial(1)
            .refill(1)
            .interval(delay)
            .max(1)
            .build()
    })
}

/// A Block Transfer Service endpoint bound to one peer.
///
/// The default configuration carries 20 payload bytes per fragment, so each
/// fragment packet is 23 bytes including its header. On a link limited to
/// the default ATT MTU of 23, size fragments with
/// [`BtsConfig::for_att_mtu`] so every packet fits one attribute value:
///
/// ```
/// use bts::BtsConfig;
///
/// let config = BtsConfig::for_att_mtu(23).expect("default MTU fits a fragment");
/// assert_eq!(config.fragment_size().get() + bts::packet::FRAGMENT_HEADER_LEN, 20);
/// ```
pub struct BtsSession<L> {
    link: L,
    write_handle: Handle,
    read: ReadCharacteristic,
    notifications: NotificationReceiver,
    config: BtsConfig,
    pacer: Option<RateLimiter>,
}

impl<L: std::fmt::Debug> std::fmt::Debug for BtsSession<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtsSession")
            .field("link", &self.link)
            .field("write_handle", &self.write_handle)
            .field("read", &self.read)
            .field("config", &self.config)
            .field("paced", &self.pacer.is_some())
            .finish_non_exhaustive()
    }
}

impl<L: GattLink> BtsSession<L> {
    /// Start building a session over `link`.
    #[must_use]
    pub fn builder(link: L) -> BtsSessionBuilder<L> {
        BtsSessionBuilder {
            link,
            write: None,
            read: None,
            notifications: None,
            config: BtsConfig::default(),
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &BtsConfig { &self.config }

    /// Value handle of the write characteristic.
    #[must_use]
    pub const fn write_handle(&self) -> Handle { self.write_handle }

    /// Handles of the read characteristic.
    #[must_use]
    pub const fn read_characteristic(&self) -> ReadCharacteristic { self.read }

    /// Borrow the underlying link.
    #[must_use]
    pub const fn link(&self) -> &L { &self.link }

    /// Consume the session, returning the underlying link.
    #[must_use]
    pub fn into_link(self) -> L { self.link }

    /// Send `block` to the peer at offset zero.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] if the peer misbehaves, a deadline passes
    /// or the link fails. The transfer is abandoned; nothing is retried.
    pub async fn write(&mut self, block: impl Into<Bytes>) -> Result<()> {
        self.write_at(block, 0).await
    }

    /// Send `block` to the peer, announcing it at `offset`.
    ///
    /// # Errors
    ///
    /// As for [`write`](Self::write); additionally
    /// [`TransferError::BlockTooLarge`] when the block or offset exceeds the
    /// wire limits.
    pub async fn write_at(&mut self, block: impl Into<Bytes>, offset: u32) -> Result<()> {
        let block = block.into();
        let span = debug_span!(
            "bts.write",
            handle = self.write_handle,
            len = block.len(),
            offset
        );
        let transfer = WriteTransfer::new(block, offset, self.config.fragment_size());
        async move {
            let transfer = transfer?;
            self.discard_stale_notifications();
            let mut io = self.io();
            write::run(&mut io, transfer).await
        }
        .instrument(span)
        .await
        .inspect(|()| metrics::inc_transfers(Direction::Outbound))
        .inspect_err(|err| report_failure(Direction::Outbound, err))
    }

    /// Fetch the block currently offered by the peer.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] if the peer misbehaves, fragments are
    /// missing, a deadline passes or the link fails.
    pub async fn read(&mut self) -> Result<Bytes> {
        let span = debug_span!("bts.read", handle = self.read.value);
        async move {
            self.discard_stale_notifications();
            let mut io = self.io();
            read::run(&mut io).await
        }
        .instrument(span)
        .await
        .inspect(|block| {
            debug!(len = block.len(), "read complete");
            metrics::inc_transfers(Direction::Inbound);
        })
        .inspect_err(|err| report_failure(Direction::Inbound, err))
    }

    fn io(&mut self) -> TransferIo<'_, L> {
        TransferIo {
            link: &self.link,
            write_handle: self.write_handle,
            read_handle: self.read.value,
            notifications: &mut self.notifications,
            config: &self.config,
            pacer: self.pacer.as_ref(),
        }
    }

    fn discard_stale_notifications(&mut self) {
        let dropped = self.notifications.drain();
        if dropped > 0 {
            warn!(dropped, "discarded stale notifications before transfer");
        }
    }
}

fn report_failure(direction: Direction, err: &TransferError) {
    warn!(
        direction = direction.as_str(),
        kind = err.kind(),
        error = %err,
        "block transfer failed"
    );
    metrics::inc_transfer_errors(direction, err.kind());
}
