//! Session configuration.
//!
//! [`BtsConfig`] bounds fragment sizes, paces outbound fragments and sets the
//! deadline applied to every point where a transfer waits on the peer.

use std::{num::NonZeroUsize, time::Duration};

use crate::packet::FRAGMENT_HEADER_LEN;

/// Payload bytes carried by each fragment unless configured otherwise.
pub const DEFAULT_FRAGMENT_SIZE: NonZeroUsize = NonZeroUsize::new(20).expect("non-zero");
/// Delay between consecutive write-without-response fragments.
pub const DEFAULT_FRAGMENT_DELAY: Duration = Duration::from_millis(10);
/// Deadline for each wait on the peer.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Capacity of the notification queue suggested for new sessions.
pub const DEFAULT_NOTIFICATION_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).expect("non-zero");

/// ATT header bytes preceding an attribute value in a single PDU.
const ATT_HEADER_LEN: usize = 3;

/// Where inbound payload fragments are collected from during a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FragmentSource {
    /// The peer pushes fragments as notifications on the read characteristic.
    #[default]
    Notification,
    /// The host polls the read characteristic for each fragment.
    Poll,
}

/// Tunables for a [`BtsSession`](crate::BtsSession).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bts::{BtsConfig, FragmentSource};
///
/// let config = BtsConfig::default()
///     .with_response_timeout(Duration::from_secs(2))
///     .with_fragment_source(FragmentSource::Poll);
/// assert_eq!(config.fragment_size().get(), 20);
/// assert_eq!(config.response_timeout(), Duration::from_secs(2));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BtsConfig {
    fragment_size: NonZeroUsize,
    fragment_delay: Duration,
    response_timeout: Duration,
    notification_capacity: NonZeroUsize,
    fragment_source: FragmentSource,
}

impl Default for BtsConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            fragment_delay: DEFAULT_FRAGMENT_DELAY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            fragment_source: FragmentSource::Notification,
        }
    }
}

impl BtsConfig {
    /// Derive a configuration whose fragments fill one ATT PDU.
    ///
    /// Returns `None` when `att_mtu` cannot hold the ATT header, the fragment
    /// header and at least one payload byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use bts::BtsConfig;
    ///
    /// let config = BtsConfig::for_att_mtu(23).expect("default MTU fits");
    /// assert_eq!(config.fragment_size().get(), 17);
    /// assert!(BtsConfig::for_att_mtu(6).is_none());
    /// ```
    #[must_use]
    pub fn for_att_mtu(att_mtu: usize) -> Option<Self> {
        let available = att_mtu.checked_sub(ATT_HEADER_LEN + FRAGMENT_HEADER_LEN)?;
        Some(Self::default().with_fragment_size(NonZeroUsize::new(available)?))
    }

    /// Set the number of payload bytes carried by each fragment.
    #[must_use]
    pub fn with_fragment_size(mut self, size: NonZeroUsize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Set the delay between consecutive outbound fragments.
    ///
    /// A zero delay disables pacing.
    #[must_use]
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Set the deadline applied to each wait on the peer.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the notification queue capacity reported by
    /// [`notification_capacity`](Self::notification_capacity).
    #[must_use]
    pub fn with_notification_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Choose how inbound payload fragments are collected.
    #[must_use]
    pub fn with_fragment_source(mut self, source: FragmentSource) -> Self {
        self.fragment_source = source;
        self
    }

    /// Payload bytes carried by each fragment.
    #[must_use]
    pub const fn fragment_size(&self) -> NonZeroUsize { self.fragment_size }

    /// Delay between consecutive outbound fragments.
    #[must_use]
    pub const fn fragment_delay(&self) -> Duration { self.fragment_delay }

    /// Deadline applied to each wait on the peer.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration { self.response_timeout }

    /// Capacity to use when creating the session's notification queue.
    #[must_use]
    pub const fn notification_capacity(&self) -> NonZeroUsize { self.notification_capacity }

    /// How inbound payload fragments are collected.
    #[must_use]
    pub const fn fragment_source(&self) -> FragmentSource { self.fragment_source }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(23, Some(17))]
    #[case(247, Some(241))]
    #[case(7, Some(1))]
    #[case(6, None)]
    #[case(0, None)]
    fn fragment_size_follows_att_mtu(#[case] mtu: usize, #[case] expected: Option<usize>) {
        assert_eq!(
            BtsConfig::for_att_mtu(mtu).map(|config| config.fragment_size().get()),
            expected
        );
    }

    #[test]
    fn defaults_match_documented_constants() {
        let config = BtsConfig::default();
        assert_eq!(config.fragment_size(), DEFAULT_FRAGMENT_SIZE);
        assert_eq!(config.fragment_delay(), DEFAULT_FRAGMENT_DELAY);
        assert_eq!(config.response_timeout(), DEFAULT_RESPONSE_TIMEOUT);
        assert_eq!(config.notification_capacity(), DEFAULT_NOTIFICATION_CAPACITY);
        assert_eq!(config.fragment_source(), FragmentSource::Notification);
    }
}
