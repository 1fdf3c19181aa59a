//! Heartbeat watchdog.
//!
//! The transmitter sends `<Heartbeat interval="N" />` every N seconds. A
//! half-open TCP connection can look healthy indefinitely, so liveness is
//! judged only by whether the next heartbeat arrives in time. The watchdog
//! never touches the socket; it reports, and the listener decides.
//!
//! Until the first heartbeat arrives there is nothing to measure against and
//! the link is considered alive.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tokio::time::Instant;
//! use lrsn_client::protocol::Message;
//! use lrsn_client::watchdog::{HeartbeatWatchdog, Liveness};
//!
//! let mut watchdog = HeartbeatWatchdog::new();
//! let t0 = Instant::now();
//! assert_eq!(watchdog.check(t0), Liveness::Alive);
//!
//! let heartbeat = Message::new("Heartbeat").with_attr("interval", "10");
//! watchdog.observe(&heartbeat, t0).unwrap();
//!
//! assert_eq!(watchdog.check(t0 + Duration::from_secs(9)), Liveness::Alive);
//! assert!(watchdog.check(t0 + Duration::from_secs(10)).is_expired());
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::{attrs, Message, MessageKind};

/// Result of a watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A heartbeat is not yet overdue (or none has been seen).
    Alive,
    /// No heartbeat within the declared interval.
    Expired {
        /// Interval declared by the last heartbeat.
        interval: Duration,
        /// Time since the last heartbeat.
        silence: Duration,
    },
}

impl Liveness {
    /// Whether the link is considered dead.
    #[inline]
    pub fn is_expired(&self) -> bool {
        matches!(self, Liveness::Expired { .. })
    }
}

/// Tracks heartbeat arrival.
///
/// `interval` and `last_seen` are always set together, so "received any"
/// is simply `last_seen.is_some()`.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatWatchdog {
    interval: Option<Duration>,
    last_seen: Option<Instant>,
}

impl HeartbeatWatchdog {
    /// Create a watchdog that has seen no heartbeat yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message. Only `Heartbeat` messages change state.
    ///
    /// Returns `true` if the message was a heartbeat.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a heartbeat lacks a valid integer
    /// `interval`; the previous state is left untouched.
    pub fn observe(&mut self, message: &Message, now: Instant) -> Result<bool> {
        if message.kind() != MessageKind::Heartbeat {
            return Ok(false);
        }

        let seconds: u64 = message.attr_parse(attrs::INTERVAL)?;
        self.interval = Some(Duration::from_secs(seconds));
        self.last_seen = Some(now);
        Ok(true)
    }

    /// Check liveness at `now`.
    pub fn check(&self, now: Instant) -> Liveness {
        match (self.interval, self.last_seen) {
            (Some(interval), Some(last_seen)) => {
                let silence = now.saturating_duration_since(last_seen);
                if silence >= interval {
                    Liveness::Expired { interval, silence }
                } else {
                    Liveness::Alive
                }
            }
            _ => Liveness::Alive,
        }
    }

    /// Time left before the watchdog expires, or `None` before the first
    /// heartbeat or when the deadline is too far out to represent.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let deadline = self.last_seen?.checked_add(self.interval?)?;
        Some(deadline.saturating_duration_since(now))
    }

    /// Whether any heartbeat has been observed.
    #[inline]
    pub fn received_any(&self) -> bool {
        self.last_seen.is_some()
    }

    /// Interval declared by the most recent heartbeat.
    #[inline]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Arrival time of the most recent heartbeat.
    #[inline]
    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(interval: &str) -> Message {
        Message::new("Heartbeat").with_attr("interval", interval)
    }

    #[test]
    fn test_alive_before_first_heartbeat() {
        let watchdog = HeartbeatWatchdog::new();
        let now = Instant::now();

        assert!(!watchdog.received_any());
        assert_eq!(watchdog.check(now), Liveness::Alive);
        assert_eq!(watchdog.check(now + Duration::from_secs(3600)), Liveness::Alive);
        assert_eq!(watchdog.remaining(now), None);
    }

    #[test]
    fn test_alive_within_interval() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();

        assert!(watchdog.observe(&heartbeat("10"), t0).unwrap());
        assert!(watchdog.received_any());

        assert_eq!(watchdog.check(t0), Liveness::Alive);
        assert_eq!(
            watchdog.check(t0 + Duration::from_millis(9_999)),
            Liveness::Alive
        );
    }

    #[test]
    fn test_expired_at_and_after_interval() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();
        watchdog.observe(&heartbeat("10"), t0).unwrap();

        assert_eq!(
            watchdog.check(t0 + Duration::from_secs(10)),
            Liveness::Expired {
                interval: Duration::from_secs(10),
                silence: Duration::from_secs(10),
            }
        );
        assert!(watchdog.check(t0 + Duration::from_secs(11)).is_expired());
    }

    #[test]
    fn test_new_heartbeat_resets_window() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();
        watchdog.observe(&heartbeat("10"), t0).unwrap();
        watchdog
            .observe(&heartbeat("10"), t0 + Duration::from_secs(8))
            .unwrap();

        assert_eq!(watchdog.check(t0 + Duration::from_secs(15)), Liveness::Alive);
        assert!(watchdog.check(t0 + Duration::from_secs(18)).is_expired());
    }

    #[test]
    fn test_interval_follows_latest_heartbeat() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();
        watchdog.observe(&heartbeat("30"), t0).unwrap();
        watchdog.observe(&heartbeat("5"), t0).unwrap();

        assert_eq!(watchdog.interval(), Some(Duration::from_secs(5)));
        assert!(watchdog.check(t0 + Duration::from_secs(6)).is_expired());
    }

    #[test]
    fn test_other_messages_ignored() {
        let mut watchdog = HeartbeatWatchdog::new();
        let now = Instant::now();

        let status = Message::new("PageRequestStatus").with_attr("id", "1");
        assert!(!watchdog.observe(&status, now).unwrap());
        assert!(!watchdog.received_any());
    }

    #[test]
    fn test_invalid_interval_is_error_and_keeps_state() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();
        watchdog.observe(&heartbeat("10"), t0).unwrap();

        assert!(watchdog.observe(&heartbeat("ten"), t0 + Duration::from_secs(5)).is_err());
        assert!(watchdog.observe(&Message::new("Heartbeat"), t0).is_err());

        assert_eq!(watchdog.last_seen(), Some(t0));
        assert_eq!(watchdog.interval(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_remaining() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();
        watchdog.observe(&heartbeat("10"), t0).unwrap();

        assert_eq!(
            watchdog.remaining(t0 + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert_eq!(
            watchdog.remaining(t0 + Duration::from_secs(12)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let mut watchdog = HeartbeatWatchdog::new();
        let t0 = Instant::now();
        watchdog
            .observe(&heartbeat("18446744073709551615"), t0)
            .unwrap();

        assert!(watchdog.received_any());
        assert_eq!(watchdog.remaining(t0), None);
        assert_eq!(
            watchdog.check(t0 + Duration::from_secs(3600)),
            Liveness::Alive
        );
    }
}
