//! One outbound TCP connection of the peer, run as its own task.
//!
//! The task reports everything that happens to the socket through a callback
//! and never touches peer state. Dropping the [`SocketHandle`] aborts the task
//! and closes the socket.

use std::io;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    select,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::Instrument;

const READ_BUFFER_SIZE: usize = 4096;

/// Distinguishes successive sockets so late events from a replaced one can
/// be ignored.
pub type Generation = u64;

#[derive(Debug)]
pub enum SocketEvent {
    Connected,
    Data(Vec<u8>),
    Error(io::Error),
    WriteComplete(io::Result<()>),
    /// Always the last event of a socket, unless the handle was dropped first.
    Closed { had_error: bool },
}

#[derive(Debug)]
pub struct SocketHandle {
    generation: Generation,
    writes: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl SocketHandle {
    /// Starts connecting to `host:port` in the background.
    pub fn connect<F>(generation: Generation, host: String, port: u16, on_event: F) -> Self
    where
        F: Fn(SocketEvent) + Send + Sync + 'static,
    {
        let (writes, pending) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(host, port, pending, on_event).in_current_span());
        Self {
            generation,
            writes,
            task,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Hands `bytes` to the socket task. The outcome arrives later as
    /// [`SocketEvent::WriteComplete`]. Returns `false` if the task is gone.
    pub fn write(&self, bytes: Vec<u8>) -> bool {
        self.writes.send(bytes).is_ok()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_socket<F>(
    host: String,
    port: u16,
    mut pending: mpsc::UnboundedReceiver<Vec<u8>>,
    on_event: F,
) where
    F: Fn(SocketEvent),
{
    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(err) => {
            on_event(SocketEvent::Error(err));
            on_event(SocketEvent::Closed { had_error: true });
            return;
        }
    };
    on_event(SocketEvent::Connected);

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let had_error = loop {
        select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break false,
                Ok(n) => on_event(SocketEvent::Data(buf[..n].to_vec())),
                Err(err) => {
                    on_event(SocketEvent::Error(err));
                    break true;
                }
            },
            Some(bytes) = pending.recv() => {
                let result = writer.write_all(&bytes).await;
                let failed = result.is_err();
                on_event(SocketEvent::WriteComplete(result));
                if failed {
                    break true;
                }
            }
        }
    };

    on_event(SocketEvent::Closed { had_error });
}
