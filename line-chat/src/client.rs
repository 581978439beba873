//! Terminal front end of the peer.
//!
//! On a terminal, key events from crossterm drive the [`LineEditor`]. With
//! piped stdin every line is taken as entered. Either way submitted lines go
//! to the [`Peer`] and whatever the hub broadcasts is printed.

use std::io;

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream},
    terminal,
};
use futures::StreamExt;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select,
    sync::mpsc,
};
use tracing::{Instrument, debug, warn};

use crate::{
    cli::Config,
    console::Console,
    input::{EditorEvent, LineEditor, parse_line},
    logging::LogLevel,
    peer::{Peer, PeerConfig, PeerHandle},
};

/// Why input stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Ctrl-C, Ctrl-D or `/exit`: leave right away.
    Exit,
    /// Piped stdin ran out: deliver what is queued, then leave.
    EndOfInput,
}

/// Runs the peer until the user exits, or until piped stdin ends and every
/// submitted line has reached the hub.
pub async fn run(config: Config, console: Console, mut log_level: Option<LogLevel>) -> Result<()> {
    let (display_tx, mut display_rx) = mpsc::unbounded_channel();
    let (peer, handle) = Peer::new(PeerConfig::new(config.host, config.port), display_tx);
    let mut peer_task = tokio::spawn(peer.run().in_current_span());

    let mut front = FrontEnd {
        handle: &handle,
        console: &console,
        log_level: log_level.as_mut(),
        display: &mut display_rx,
    };
    let ending = if console.is_interactive() {
        front.run_terminal().await?
    } else {
        front.run_piped().await
    };

    match ending {
        Ending::Exit => handle.quit(),
        Ending::EndOfInput => handle.finish(),
    }

    // Broadcasts keep arriving while the peer drains its queue.
    loop {
        select! {
            result = &mut peer_task => {
                if let Err(err) = result {
                    warn!(error = %err, "peer task ended abnormally");
                }
                break;
            }
            Some(line) = display_rx.recv() => console.print(&line),
        }
    }
    while let Ok(line) = display_rx.try_recv() {
        console.print(&line);
    }

    console.finish();
    Ok(())
}

struct FrontEnd<'a> {
    handle: &'a PeerHandle,
    console: &'a Console,
    log_level: Option<&'a mut LogLevel>,
    display: &'a mut mpsc::UnboundedReceiver<String>,
}

impl FrontEnd<'_> {
    async fn run_terminal(&mut self) -> Result<Ending> {
        let _raw_mode = RawMode::enable().context("failed to enable raw terminal mode")?;
        let mut events = EventStream::new();
        let mut editor = LineEditor::new();
        self.console.set_input("");

        loop {
            select! {
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        let Some(event) = editor.handle_key(key) else {
                            continue;
                        };
                        if !self.apply(event) {
                            return Ok(Ending::Exit);
                        }
                        self.console.set_input(editor.buffer());
                    }
                    Some(Ok(Event::Resize(..))) => self.console.set_input(editor.buffer()),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err).context("failed to read terminal input"),
                    None => return Ok(Ending::Exit),
                },
                Some(line) = self.display.recv() => self.console.print(&line),
            }
        }
    }

    async fn run_piped(&mut self) -> Ending {
        let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');

        loop {
            select! {
                segment = lines.next_segment() => match segment {
                    Ok(Some(bytes)) => {
                        let line = String::from_utf8_lossy(&bytes);
                        let Some(event) = parse_line(&line) else {
                            continue;
                        };
                        if !self.apply(event) {
                            return Ending::Exit;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        return Ending::EndOfInput;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to read stdin");
                        return Ending::EndOfInput;
                    }
                },
                Some(line) = self.display.recv() => self.console.print(&line),
            }
        }
    }

    /// Acts on one editor event. Returns `false` when input should stop.
    fn apply(&mut self, event: EditorEvent) -> bool {
        match event {
            EditorEvent::Submit(line) => {
                if let Err(err) = self.handle.submit(line) {
                    warn!(error = %err, "dropping message");
                    return false;
                }
            }
            EditorEvent::Edited => {}
            EditorEvent::Debug(enabled) => match self.log_level.as_deref_mut() {
                Some(level) => match level.set_debug(enabled) {
                    Ok(enabled) => self.console.print(&format!("debug logging: {enabled}")),
                    Err(err) => warn!(error = %err, "failed to change log level"),
                },
                None => self.console.print("debug logging is unavailable"),
            },
            EditorEvent::Exit => return false,
        }
        true
    }
}

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
