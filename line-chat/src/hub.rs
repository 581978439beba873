use std::{collections::HashMap, future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    select,
    sync::mpsc,
    time::{Instant, sleep, timeout},
};
use tracing::{Instrument, debug, info, warn};

use crate::{
    framing::{LineFramer, encode_line},
    protocol::{LISTEN_TIMEOUT, SessionId, joined_notice, left_notice},
};

const READ_BUFFER_SIZE: usize = 4096;

/// How long accepting pauses after the process runs out of resources.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Fatal hub failures. Any of these ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    #[error("listener was not ready within {0:?}")]
    ListenTimeout(Duration),
    #[error("listener is no longer listening: {0}")]
    ListenerClosed(#[source] io::Error),
}

/// Write side of a session as seen by the registry.
pub type Outbox = mpsc::UnboundedSender<Arc<[u8]>>;

pub struct Hub {
    listener: TcpListener,
    registry: Registry,
}

impl Hub {
    /// Binds the listening socket, giving up after [`LISTEN_TIMEOUT`].
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, HubError> {
        match timeout(LISTEN_TIMEOUT, TcpListener::bind(addr)).await {
            Ok(Ok(listener)) => Ok(Self::new(listener)),
            Ok(Err(err)) => Err(HubError::Bind(err)),
            Err(_) => Err(HubError::ListenTimeout(LISTEN_TIMEOUT)),
        }
    }

    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Registry::new(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and relays until `shutdown` resolves or the listener fails.
    ///
    /// The registry lives on this loop; session tasks only talk to it through
    /// the event channel. Accept errors other than a dead listener are logged
    /// and, when they signal resource exhaustion, pause accepting for
    /// [`ACCEPT_BACKOFF`] while existing sessions keep being served.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), HubError>
    where
        F: Future<Output = ()>,
    {
        let Hub {
            listener,
            mut registry,
        } = self;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        tokio::pin!(shutdown);
        let resume = sleep(Duration::ZERO);
        tokio::pin!(resume);
        let mut paused = false;

        loop {
            select! {
                _ = &mut shutdown => {
                    info!(sessions = registry.len(), "hub shutting down");
                    break;
                }
                accept_result = listener.accept(), if !paused => {
                    if handle_accept_result(accept_result, &mut registry, &events_tx)?
                        == AcceptOutcome::Pause
                    {
                        resume.as_mut().reset(Instant::now() + ACCEPT_BACKOFF);
                        paused = true;
                    }
                }
                () = &mut resume, if paused => {
                    debug!("resuming accept");
                    paused = false;
                }
                Some(event) = events_rx.recv() => {
                    registry.handle(event);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<(), HubError> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptOutcome {
    Continue,
    Pause,
}

fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    registry: &mut Registry,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<AcceptOutcome, HubError> {
    let err = match result {
        Ok((stream, peer)) => {
            let (outbox, inbox) = mpsc::unbounded_channel();
            let id = registry.accept(outbox);
            debug!(session = id, %peer, "accepted connection");
            spawn_session(id, stream, inbox, events.clone());
            return Ok(AcceptOutcome::Continue);
        }
        Err(err) => err,
    };

    match classify_accept_error(&err) {
        AcceptError::Transient => {
            warn!(error = %err, "failed to accept connection");
            Ok(AcceptOutcome::Continue)
        }
        AcceptError::Exhausted => {
            warn!(
                error = %err,
                pause_ms = ACCEPT_BACKOFF.as_millis() as u64,
                "cannot accept connections; pausing"
            );
            Ok(AcceptOutcome::Pause)
        }
        AcceptError::ListenerGone => Err(HubError::ListenerClosed(err)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptError {
    /// Concerns one half-open connection; the next accept may succeed.
    Transient,
    /// Out of descriptors, buffers or memory (EMFILE, ENFILE, ENOBUFS, ENOMEM
    /// and anything else unrecognised).
    Exhausted,
    /// The socket is no longer a listening socket.
    ListenerGone,
}

fn classify_accept_error(err: &io::Error) -> AcceptError {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptError::Transient,
        io::ErrorKind::InvalidInput => AcceptError::ListenerGone,
        _ => AcceptError::Exhausted,
    }
}

#[derive(Debug)]
enum SessionEvent {
    Data { id: SessionId, chunk: Vec<u8> },
    Closed { id: SessionId, had_error: bool },
}

fn spawn_session(
    id: SessionId,
    stream: TcpStream,
    inbox: mpsc::UnboundedReceiver<Arc<[u8]>>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    tokio::spawn(
        async move {
            // `None` means the registry already dropped this session.
            if let Some(had_error) = run_session(id, stream, inbox, &events).await {
                let _ = events.send(SessionEvent::Closed { id, had_error });
            }
        }
        .in_current_span(),
    );
}

async fn run_session(
    id: SessionId,
    stream: TcpStream,
    mut inbox: mpsc::UnboundedReceiver<Arc<[u8]>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Option<bool> {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Some(false),
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    if events.send(SessionEvent::Data { id, chunk }).is_err() {
                        return None;
                    }
                }
                Err(err) => {
                    warn!(session = id, error = %err, "session transport error");
                    return Some(true);
                }
            },
            outgoing = inbox.recv() => match outgoing {
                Some(line) => {
                    if let Err(err) = writer.write_all(&line).await {
                        warn!(session = id, error = %err, "session transport error");
                        return Some(true);
                    }
                }
                None => return None,
            },
        }
    }
}

struct Session {
    outbox: Outbox,
    framer: LineFramer,
}

/// Live sessions keyed by id, plus the id counter. Ids are never reused.
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
    last_id: SessionId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and announces it to everyone, itself included.
    pub fn accept(&mut self, outbox: Outbox) -> SessionId {
        self.last_id += 1;
        let id = self.last_id;
        self.sessions.insert(
            id,
            Session {
                outbox,
                framer: LineFramer::new(),
            },
        );
        info!(session = id, "session joined");
        self.broadcast(&joined_notice(id));
        id
    }

    /// Frames `chunk` for session `id` and relays every completed line.
    pub fn on_data(&mut self, id: SessionId, chunk: &[u8]) {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!(session = id, "data for unknown session");
            return;
        };
        let lines: Vec<String> = session.framer.feed(chunk).collect();
        for line in lines {
            self.broadcast(&line);
        }
    }

    /// Queues `text` plus a newline to every session. Returns the recipient count.
    pub fn broadcast(&self, text: &str) -> usize {
        info!(
            recipients = self.sessions.len(),
            len = text.len(),
            message = ?text,
            "broadcasting"
        );
        let line: Arc<[u8]> = encode_line(text).into();
        for (id, session) in &self.sessions {
            if session.outbox.send(Arc::clone(&line)).is_err() {
                debug!(session = id, "outbox closed before session removal");
            }
        }
        self.sessions.len()
    }

    pub fn close(&mut self, id: SessionId, had_error: bool) {
        if self.sessions.remove(&id).is_none() {
            return;
        }
        info!(session = id, had_error, "session closed");
        self.broadcast(&left_notice(id));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Data { id, chunk } => self.on_data(id, &chunk),
            SessionEvent::Closed { id, had_error } => self.close(id, had_error),
        }
    }
}
