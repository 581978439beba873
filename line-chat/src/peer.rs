//! The peer's event loop.
//!
//! [`Peer`] owns the connection state machine, the send queue, the framer and
//! the one live [`SocketHandle`]. Socket tasks and timers only post
//! [`PeerEvent`]s back to it, so all of that state is touched from a single
//! task and needs no locking.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::{select, sync::mpsc, task::AbortHandle};
use tracing::{Instrument, debug, info, warn};

use crate::{
    connection::ConnectionManager,
    framing::{LineFramer, encode_line},
    protocol::{BACKOFF_SCHEDULE, CONNECT_TIMEOUT},
    send_queue::SendQueue,
    transport::{Generation, SocketEvent, SocketHandle},
};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub schedule: &'static [Duration],
}

impl PeerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
            schedule: &BACKOFF_SCHEDULE,
        }
    }
}

#[derive(Debug)]
pub enum PeerCommand {
    Submit(String),
    /// Stop once every queued line has been written.
    Finish,
    Quit,
}

/// Cloneable front door to a running [`Peer`].
#[derive(Debug, Clone)]
pub struct PeerHandle {
    commands: mpsc::UnboundedSender<PeerCommand>,
}

impl PeerHandle {
    /// Queues a line for the hub. It is kept across reconnects until sent.
    pub fn submit(&self, line: impl Into<String>) -> Result<()> {
        self.commands
            .send(PeerCommand::Submit(line.into()))
            .map_err(|_| anyhow!("peer has stopped"))
    }

    /// Lets the peer deliver what is queued, reconnecting if it has to, and
    /// then stop.
    pub fn finish(&self) {
        let _ = self.commands.send(PeerCommand::Finish);
    }

    /// Stops the peer now; unsent lines are dropped.
    pub fn quit(&self) {
        let _ = self.commands.send(PeerCommand::Quit);
    }
}

#[derive(Debug)]
enum PeerEvent {
    Socket {
        generation: Generation,
        event: SocketEvent,
    },
    ConnectTimeout {
        generation: Generation,
    },
    RetryDue,
}

/// A pending timer; dropping it cancels the timer.
struct Timer {
    abort: AbortHandle,
    delay: Duration,
}

impl Timer {
    fn start(delay: Duration, events: mpsc::UnboundedSender<PeerEvent>, event: PeerEvent) -> Self {
        let task = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(event);
            }
            .in_current_span(),
        );
        Self {
            abort: task.abort_handle(),
            delay,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

pub struct Peer {
    config: PeerConfig,
    manager: ConnectionManager,
    queue: SendQueue,
    framer: LineFramer,
    socket: Option<SocketHandle>,
    last_generation: Generation,
    connect_timer: Option<Timer>,
    retry_timer: Option<Timer>,
    commands: mpsc::UnboundedReceiver<PeerCommand>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: mpsc::UnboundedReceiver<PeerEvent>,
    display: mpsc::UnboundedSender<String>,
    finishing: bool,
}

impl Peer {
    /// Builds a peer that will deliver every line broadcast by the hub to
    /// `display`.
    pub fn new(config: PeerConfig, display: mpsc::UnboundedSender<String>) -> (Self, PeerHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::with_schedule(config.schedule);
        let peer = Self {
            config,
            manager,
            queue: SendQueue::new(),
            framer: LineFramer::new(),
            socket: None,
            last_generation: 0,
            connect_timer: None,
            retry_timer: None,
            commands,
            events_tx,
            events_rx,
            display,
            finishing: false,
        };
        (peer, PeerHandle { commands: commands_tx })
    }

    /// Connects and keeps reconnecting until told to quit or every
    /// [`PeerHandle`] is dropped.
    pub async fn run(mut self) {
        self.connect();

        while !(self.finishing && self.queue.is_empty()) {
            select! {
                command = self.commands.recv(), if !self.finishing => match command {
                    Some(PeerCommand::Submit(line)) => self.submit(line),
                    Some(PeerCommand::Finish) => {
                        debug!(unsent = self.queue.len(), "finishing");
                        self.finishing = true;
                    }
                    Some(PeerCommand::Quit) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        info!(unsent = self.queue.len(), "peer stopped");
    }

    fn submit(&mut self, line: String) {
        self.queue.submit(line);
        debug!(queued = self.queue.len(), "message queued");
        self.drain();
    }

    fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Socket { generation, event } => {
                if self.is_current(generation) {
                    self.on_socket_event(event);
                } else {
                    debug!(generation, ?event, "ignoring event from a replaced socket");
                }
            }
            PeerEvent::ConnectTimeout { generation } => {
                if self.is_current(generation) {
                    self.on_connect_timeout();
                }
            }
            PeerEvent::RetryDue => {
                if let Some(timer) = self.retry_timer.take() {
                    debug!(waited_ms = timer.delay.as_millis() as u64, "retry due");
                }
                self.connect();
            }
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Connected => self.on_connected(),
            SocketEvent::Data(chunk) => self.on_data(&chunk),
            SocketEvent::Error(err) => warn!(error = %err, "socket error"),
            SocketEvent::WriteComplete(Ok(())) => self.on_write_complete(),
            SocketEvent::WriteComplete(Err(err)) => {
                warn!(error = %err, "send failed; message stays queued");
                self.queue.fail();
            }
            SocketEvent::Closed { had_error } => self.on_closed(had_error),
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.generation() == generation)
    }

    fn connect(&mut self) {
        let attempt = match self.manager.begin_connect() {
            Ok(attempt) => attempt,
            Err(err) => {
                debug!(error = %err, "connect skipped");
                return;
            }
        };
        info!(
            host = %self.config.host,
            port = self.config.port,
            attempt,
            "connecting to hub"
        );

        self.last_generation += 1;
        let generation = self.last_generation;
        let events = self.events_tx.clone();
        self.framer.clear();
        self.socket = Some(SocketHandle::connect(
            generation,
            self.config.host.clone(),
            self.config.port,
            move |event| {
                let _ = events.send(PeerEvent::Socket { generation, event });
            },
        ));
        self.connect_timer = Some(Timer::start(
            self.config.connect_timeout,
            self.events_tx.clone(),
            PeerEvent::ConnectTimeout { generation },
        ));
    }

    fn on_connected(&mut self) {
        self.connect_timer = None;
        if let Err(err) = self.manager.connected() {
            warn!(error = %err, "unexpected connect event");
            return;
        }
        info!("connected to hub");
        self.drain();
    }

    fn on_data(&mut self, chunk: &[u8]) {
        for line in self.framer.feed(chunk) {
            debug!(message = ?line, "broadcast received");
            let _ = self.display.send(line);
        }
    }

    fn on_write_complete(&mut self) {
        if let Some(sent) = self.queue.complete() {
            debug!(message = ?sent, "message sent");
        }
        self.drain();
    }

    fn on_connect_timeout(&mut self) {
        self.connect_timer = None;
        if !self.manager.connect_timed_out() {
            return;
        }
        warn!(
            timeout_ms = self.config.connect_timeout.as_millis() as u64,
            "connect timed out"
        );
        self.destroy_socket();
    }

    // Dropping the handle is what closes the socket, so destroy and close
    // share one path.
    fn destroy_socket(&mut self) {
        self.on_closed(true);
    }

    fn on_closed(&mut self, had_error: bool) {
        self.socket = None;
        self.connect_timer = None;
        self.queue.detach();

        match self.manager.closed() {
            Ok(delay) => {
                info!(
                    had_error,
                    retry_ms = delay.as_millis() as u64,
                    "connection closed; retrying"
                );
                self.retry_timer = Some(Timer::start(
                    delay,
                    self.events_tx.clone(),
                    PeerEvent::RetryDue,
                ));
            }
            Err(err) => debug!(error = %err, "close ignored"),
        }
    }

    /// Sends the head of the queue if nothing is in flight and the hub is
    /// reachable. Safe to call at any time.
    fn drain(&mut self) {
        let ready = self.manager.is_connected() && self.socket.is_some();
        let Some(head) = self.queue.begin_send(ready) else {
            return;
        };
        let bytes = encode_line(head);

        let written = self
            .socket
            .as_ref()
            .is_some_and(|socket| socket.write(bytes));
        if !written {
            self.queue.detach();
        }
    }
}
