//! Connection lifecycle of the peer.
//!
//! [`ConnectionManager`] only tracks state and the backoff position; the
//! driver in [`crate::peer`] owns the socket and the timers and calls one
//! transition per transport event.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::protocol::BACKOFF_SCHEDULE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {event} while {state}")]
pub struct TransitionError {
    pub state: ConnectionState,
    pub event: &'static str,
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    retry_index: usize,
    schedule: &'static [Duration],
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_schedule(&BACKOFF_SCHEDULE)
    }

    /// Uses a custom backoff schedule. An empty schedule retries immediately.
    pub fn with_schedule(schedule: &'static [Duration]) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_index: 0,
            schedule,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn retry_index(&self) -> usize {
        self.retry_index
    }

    /// `Disconnected -> Connecting`. Returns the 1-based attempt number.
    pub fn begin_connect(&mut self) -> Result<usize, TransitionError> {
        self.expect(ConnectionState::Disconnected, "begin connecting")?;
        self.state = ConnectionState::Connecting;
        Ok(self.retry_index + 1)
    }

    /// `Connecting -> Connected`. Resets the backoff.
    pub fn connected(&mut self) -> Result<(), TransitionError> {
        self.expect(ConnectionState::Connecting, "complete a connect")?;
        self.state = ConnectionState::Connected;
        self.retry_index = 0;
        Ok(())
    }

    /// `Connecting | Connected -> Disconnected`. Returns how long to wait
    /// before the next attempt and advances the backoff.
    pub fn closed(&mut self) -> Result<Duration, TransitionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(TransitionError {
                state: self.state,
                event: "close",
            });
        }
        self.state = ConnectionState::Disconnected;

        let delay = self
            .schedule
            .get(self.retry_index)
            .copied()
            .unwrap_or_default();
        self.retry_index = (self.retry_index + 1).min(self.schedule.len().saturating_sub(1));
        Ok(delay)
    }

    /// Whether a firing connect timer should destroy the socket.
    pub fn connect_timed_out(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    fn expect(&self, state: ConnectionState, event: &'static str) -> Result<(), TransitionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(TransitionError {
                state: self.state,
                event,
            })
        }
    }
}
