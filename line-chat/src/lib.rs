//! Newline-delimited TCP chat that runs as either a hub or a peer.
//!
//! The hub accepts any number of connections and relays every line it
//! receives to all of them, announcing arrivals and departures. The peer keeps
//! one connection to a hub alive, reconnecting on a fixed backoff schedule, and
//! delivers what the user types in order, even across reconnects.
//!
//! - [`cli`] parses flags and environment defaults.
//! - [`protocol`] holds the wire constants and timing shared by both roles.
//! - [`framing`] splits a byte stream into lines.
//! - [`hub`] owns the session registry and the broadcast fan-out.
//! - [`connection`] is the peer's connection state machine and backoff.
//! - [`send_queue`] orders outgoing lines with one write in flight.
//! - [`transport`] runs a single outbound socket as a task.
//! - [`peer`] is the event loop tying the last three together.
//! - [`input`], [`console`] and [`client`] make up the terminal front end.
//! - [`logging`] installs the `tracing` subscriber.

pub mod cli;
pub mod client;
pub mod connection;
pub mod console;
pub mod framing;
pub mod hub;
pub mod input;
pub mod logging;
pub mod peer;
pub mod protocol;
pub mod send_queue;
pub mod transport;
