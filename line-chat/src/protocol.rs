//! Wire-level constants shared by the hub and the peer.
//!
//! Every message on the wire is a single UTF-8 line terminated by `\n`.
//! The hub adds two synthetic notifications of its own, built by
//! [`joined_notice`] and [`left_notice`].

use std::time::Duration;

/// Session identifier assigned by the hub, starting at 1.
pub type SessionId = u64;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;

/// How long the hub may take to start listening before it gives up.
pub const LISTEN_TIMEOUT: Duration = Duration::from_millis(1_000);

/// How long a single peer connect attempt may stay pending.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Delays between peer reconnect attempts. The last entry repeats forever.
pub const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_millis(500),
    Duration::from_millis(1_000),
    Duration::from_millis(2_000),
    Duration::from_millis(5_000),
    Duration::from_millis(10_000),
];

pub fn joined_notice(id: SessionId) -> String {
    format!("{id} has joined")
}

pub fn left_notice(id: SessionId) -> String {
    format!("{id} has left")
}
