use std::collections::VecDeque;

/// Outgoing lines waiting for the hub, delivered strictly in order.
///
/// Only the head is ever written, and only one write is outstanding at a
/// time. The queue survives reconnects; a message leaves it only once its
/// write has completed.
#[derive(Debug, Default)]
pub struct SendQueue {
    messages: VecDeque<String>,
    in_flight: bool,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, line: impl Into<String>) {
        self.messages.push_back(line.into());
    }

    /// One drain step.
    ///
    /// Returns the head and marks it in flight, or `None` without touching
    /// anything when a write is outstanding, the queue is empty, or the
    /// transport is not `ready`.
    pub fn begin_send(&mut self, ready: bool) -> Option<&str> {
        if self.in_flight || !ready {
            return None;
        }
        let head = self.messages.front()?;
        self.in_flight = true;
        Some(head)
    }

    /// The in-flight write finished; drops the head.
    pub fn complete(&mut self) -> Option<String> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        self.messages.pop_front()
    }

    /// The in-flight write failed; the head stays for the next drain.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }

    /// The socket carrying the in-flight write went away before it finished.
    pub fn detach(&mut self) {
        self.in_flight = false;
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
