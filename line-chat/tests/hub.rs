use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use line_chat::hub::{Hub, HubError};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct RunningHub {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), HubError>>,
}

impl RunningHub {
    async fn start() -> Result<Self> {
        let hub = Hub::bind("127.0.0.1:0").await?;
        let addr = hub.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(hub.run_until(async move {
            let _ = shutdown_rx.await;
        }));
        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task.await??;
        Ok(())
    }
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    async fn expect_line(&mut self, expected: &str) -> Result<()> {
        let line = timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .with_context(|| format!("timed out waiting for {expected:?}"))??
            .with_context(|| format!("stream closed while waiting for {expected:?}"))?;
        assert_eq!(line, expected);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[tokio::test]
async fn sessions_receive_joins_messages_and_leaves() -> Result<()> {
    let hub = RunningHub::start().await?;

    let mut alice = TestClient::connect(hub.addr).await?;
    alice.expect_line("1 has joined").await?;

    let mut bob = TestClient::connect(hub.addr).await?;
    bob.expect_line("2 has joined").await?;
    alice.expect_line("2 has joined").await?;

    // Split across writes; the hub relays it only once the newline arrives.
    bob.send(b"hello ").await?;
    bob.send(b"alice\n").await?;
    alice.expect_line("hello alice").await?;
    bob.expect_line("hello alice").await?;

    drop(bob);
    alice.expect_line("2 has left").await?;

    hub.stop().await
}

#[tokio::test]
async fn every_session_gets_every_line() -> Result<()> {
    let hub = RunningHub::start().await?;

    let mut clients: Vec<TestClient> = Vec::new();
    for id in 1..=3 {
        let mut client = TestClient::connect(hub.addr).await?;
        client.expect_line(&format!("{id} has joined")).await?;
        for earlier in &mut clients {
            earlier.expect_line(&format!("{id} has joined")).await?;
        }
        clients.push(client);
    }

    clients[1].send(b"from two\nand again\n").await?;
    for client in &mut clients {
        client.expect_line("from two").await?;
        client.expect_line("and again").await?;
    }

    hub.stop().await
}

#[tokio::test]
async fn ids_are_never_reused() -> Result<()> {
    let hub = RunningHub::start().await?;

    let mut first = TestClient::connect(hub.addr).await?;
    first.expect_line("1 has joined").await?;
    drop(first);

    let mut second = TestClient::connect(hub.addr).await?;
    second.expect_line("2 has joined").await?;

    hub.stop().await
}

#[tokio::test]
async fn hubs_in_one_process_are_independent() -> Result<()> {
    let one = RunningHub::start().await?;
    let two = RunningHub::start().await?;

    let mut a = TestClient::connect(one.addr).await?;
    a.expect_line("1 has joined").await?;
    let mut b = TestClient::connect(two.addr).await?;
    b.expect_line("1 has joined").await?;

    a.send(b"only on one\n").await?;
    a.expect_line("only on one").await?;
    b.send(b"only on two\n").await?;
    b.expect_line("only on two").await?;

    one.stop().await?;
    two.stop().await
}

#[tokio::test]
async fn bind_failure_is_reported() -> Result<()> {
    let taken = TcpListener::bind("127.0.0.1:0").await?;
    let addr = taken.local_addr()?;

    let result = Hub::bind(addr).await;
    assert!(matches!(result, Err(HubError::Bind(_))));
    Ok(())
}
