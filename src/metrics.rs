//! Metric helpers for `ranlink`.
//!
//! Defines metric names and small helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Every helper compiles to a
//! no-op when the `metrics` feature is disabled, so call sites stay
//! unconditional.

/// Name of the gauge tracking live stream connections.
pub const CONNECTIONS_ACTIVE: &str = "ranlink_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "ranlink_frames_processed_total";
/// Name of the counter tracking reconnect attempts.
pub const RECONNECTS_TOTAL: &str = "ranlink_reconnects_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "ranlink_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Inbound frames received from the network.
    Inbound,
    /// Outbound frames sent to the network.
    Outbound,
}

impl Direction {
    #[cfg(feature = "metrics")]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a reconnect attempt.
pub fn inc_reconnects() {
    #[cfg(feature = "metrics")]
    metrics::counter!(RECONNECTS_TOTAL).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    metrics::counter!(ERRORS_TOTAL).increment(1);
}
