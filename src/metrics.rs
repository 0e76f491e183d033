//! Metric helpers for `bts`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking fragments moved over the link.
pub const FRAGMENTS_TOTAL: &str = "bts_fragments_total";
/// Name of the counter tracking completed block transfers.
pub const TRANSFERS_TOTAL: &str = "bts_transfers_total";
/// Name of the counter tracking failed block transfers.
pub const TRANSFER_ERRORS_TOTAL: &str = "bts_transfer_errors_total";

/// Direction of a transfer relative to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Peer to host.
    Inbound,
    /// Host to peer.
    Outbound,
}

impl Direction {
    /// Label value used for the `direction` metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record one fragment moved in `direction`.
pub fn inc_fragments(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAGMENTS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a completed transfer in `direction`.
pub fn inc_transfers(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(TRANSFERS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a failed transfer, labelled with the error kind.
pub fn inc_transfer_errors(direction: Direction, kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(
        TRANSFER_ERRORS_TOTAL,
        "direction" => direction.as_str(),
        "kind" => kind
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, kind);
}
