//! Connection module - one framed peer
//!
//! A connection runs three tasks: a reader that parses frames into a bounded
//! inbound channel, a writer that drains the outbound queue, and a keepalive
//! that pings the peer. Any received frame renews the read deadline; each
//! write has its own deadline. Closing is idempotent and wakes every task.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::protocol::{encode, parse_command, Command, ParsedCommand, Pong, ProtocolError};
use crate::types::{PlayerId, COMMAND_QUEUE_SIZE, CONN_TIMEOUT_SECS, PING_INTERVAL_SECS, PLAYER_UNKNOWN};

/// Command delivered from a connection, tagged with the sender's player id.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub source: PlayerId,
    pub command: Command,
}

#[derive(Debug)]
struct ConnInner {
    peer: String,
    player: AtomicI32,
    terminated: AtomicBool,
    out_tx: mpsc::UnboundedSender<Command>,
    close_tx: watch::Sender<bool>,
}

/// Cloneable handle to a live connection
#[derive(Debug, Clone)]
pub struct ConnHandle {
    inner: Arc<ConnInner>,
}

impl ConnHandle {
    /// Split `stream` and start the reader, writer and keepalive tasks.
    ///
    /// Must be called inside a tokio runtime. The receiver ends once the
    /// connection closes.
    pub fn spawn<S>(stream: S, peer: impl Into<String>) -> (ConnHandle, mpsc::Receiver<InboundCommand>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Command>();
        let (in_tx, in_rx) = mpsc::channel::<InboundCommand>(COMMAND_QUEUE_SIZE);
        let (close_tx, _) = watch::channel(false);

        let handle = ConnHandle {
            inner: Arc::new(ConnInner {
                peer: peer.into(),
                player: AtomicI32::new(PLAYER_UNKNOWN),
                terminated: AtomicBool::new(false),
                out_tx,
                close_tx,
            }),
        };

        let (reader, writer) = tokio::io::split(stream);

        tokio::spawn(read_loop(handle.clone(), handle.closed(), BufReader::new(reader), in_tx));
        tokio::spawn(write_loop(handle.clone(), handle.closed(), writer, out_rx));
        tokio::spawn(keepalive_loop(handle.clone(), handle.closed()));

        (handle, in_rx)
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Player id stamped on inbound commands
    pub fn player(&self) -> PlayerId {
        self.inner.player.load(Ordering::Acquire)
    }

    pub fn set_player(&self, player: PlayerId) {
        self.inner.player.store(player, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    /// Queue a command. No-op after close.
    pub fn write(&self, command: Command) {
        if self.is_terminated() {
            return;
        }
        let _ = self.inner.out_tx.send(command);
    }

    pub fn close(&self) {
        if self.inner.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(peer = %self.inner.peer, "closing connection");
        self.inner.close_tx.send_replace(true);
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.inner.close_tx.subscribe()
    }
}

async fn read_loop<R>(
    handle: ConnHandle,
    mut closed: watch::Receiver<bool>,
    mut reader: BufReader<R>,
    in_tx: mpsc::Sender<InboundCommand>,
) where
    R: AsyncRead + Unpin,
{
    let deadline = Duration::from_secs(CONN_TIMEOUT_SECS);
    let mut line = String::new();

    loop {
        if handle.is_terminated() {
            break;
        }
        line.clear();
        let read = tokio::select! {
            _ = closed.changed() => break,
            read = timeout(deadline, reader.read_line(&mut line)) => read,
        };

        match read {
            Err(_) => {
                debug!(peer = %handle.peer(), "read deadline exceeded");
                break;
            }
            Ok(Err(e)) => {
                debug!(peer = %handle.peer(), error = %e, "read failed");
                break;
            }
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {}
        }

        let frame = line.trim();
        if frame.is_empty() {
            continue;
        }

        let command = match parse_command(frame) {
            Ok(ParsedCommand::Command(command)) => command,
            Ok(ParsedCommand::Unknown(tag)) => {
                warn!(peer = %handle.peer(), tag, "ignoring unknown command");
                continue;
            }
            Err(e @ ProtocolError::Envelope(_)) => {
                warn!(peer = %handle.peer(), error = %e, "dropping frame");
                continue;
            }
            Err(e @ ProtocolError::Payload { .. }) => {
                warn!(peer = %handle.peer(), error = %e, "closing connection");
                break;
            }
        };

        match command {
            Command::Ping(ping) => {
                trace!(peer = %handle.peer(), "ping");
                handle.write(Command::Pong(Pong {
                    message: ping.message,
                }));
            }
            Command::Pong(_) => trace!(peer = %handle.peer(), "pong"),
            command => {
                let inbound = InboundCommand {
                    source: handle.player(),
                    command,
                };
                if in_tx.send(inbound).await.is_err() {
                    break;
                }
            }
        }
    }

    handle.close();
}

async fn write_loop<W>(
    handle: ConnHandle,
    mut closed: watch::Receiver<bool>,
    mut writer: W,
    mut out_rx: mpsc::UnboundedReceiver<Command>,
) where
    W: AsyncWrite + Unpin,
{
    let deadline = Duration::from_secs(CONN_TIMEOUT_SECS);

    loop {
        let command = tokio::select! {
            _ = closed.changed() => break,
            command = out_rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let line = match encode(&command) {
            Ok(line) => line,
            Err(e) => {
                warn!(peer = %handle.peer(), kind = %command.kind(), error = %e, "failed to encode");
                continue;
            }
        };

        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        match timeout(deadline, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(peer = %handle.peer(), error = %e, "write failed");
                break;
            }
            Err(_) => {
                debug!(peer = %handle.peer(), "write deadline exceeded");
                break;
            }
        }
    }

    handle.close();
    let _ = writer.shutdown().await;
}

async fn keepalive_loop(handle: ConnHandle, mut closed: watch::Receiver<bool>) {
    let period = Duration::from_secs(PING_INTERVAL_SECS);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = closed.changed() => break,
            _ = ticker.tick() => handle.write(Command::Ping(Default::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_ping_is_answered_and_not_forwarded() {
        let (local, remote) = duplex(4096);
        let (_handle, mut inbound) = ConnHandle::spawn(local, "test");

        let (r, mut w) = tokio::io::split(remote);
        let mut r = BufReader::new(r);
        w.write_all(b"{\"cmd\":2,\"data\":{\"Message\":\"hi\"}}\n").await.unwrap();
        w.write_all(b"{\"cmd\":5,\"data\":{\"Message\":\"hello\"}}\n").await.unwrap();

        let mut line = String::new();
        r.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), r#"{"cmd":3,"data":{"Message":"hi"}}"#);

        let got = inbound.recv().await.unwrap();
        assert_eq!(got.source, PLAYER_UNKNOWN);
        assert!(matches!(got.command, Command::Message(ref m) if m.message == "hello"));
    }

    #[tokio::test]
    async fn test_source_is_stamped_after_join() {
        let (local, remote) = duplex(4096);
        let (handle, mut inbound) = ConnHandle::spawn(local, "test");
        handle.set_player(4);

        let (_r, mut w) = tokio::io::split(remote);
        w.write_all(b"{\"cmd\":13,\"data\":{\"Lines\":2}}\n").await.unwrap();
        assert_eq!(inbound.recv().await.unwrap().source, 4);
    }

    #[tokio::test]
    async fn test_bad_payload_closes() {
        let (local, remote) = duplex(4096);
        let (handle, mut inbound) = ConnHandle::spawn(local, "test");

        let (_r, mut w) = tokio::io::split(remote);
        w.write_all(b"garbage\n").await.unwrap();
        w.write_all(b"{\"cmd\":10,\"data\":{\"Seed\":\"x\"}}\n").await.unwrap();

        assert!(inbound.recv().await.is_none());
        assert!(handle.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_hits_read_deadline() {
        let (local, _remote) = duplex(4096);
        let started = tokio::time::Instant::now();
        let (handle, mut inbound) = ConnHandle::spawn(local, "test");

        assert!(inbound.recv().await.is_none());
        assert!(handle.is_terminated());
        assert!(started.elapsed() >= Duration::from_secs(CONN_TIMEOUT_SECS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_renew_read_deadline() {
        let (local, remote) = duplex(4096);
        let (handle, mut inbound) = ConnHandle::spawn(local, "test");

        let (_r, mut w) = tokio::io::split(remote);
        let writer = tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_secs(CONN_TIMEOUT_SECS - 5)).await;
                w.write_all(b"{\"cmd\":13,\"data\":{\"Lines\":1}}\n").await.unwrap();
            }
            w
        });

        for _ in 0..4 {
            assert!(inbound.recv().await.is_some());
        }
        assert!(!handle.is_terminated());
        let _w = writer.await.unwrap();
        handle.close();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_silences_writes() {
        let (local, _remote) = duplex(4096);
        let (handle, mut inbound) = ConnHandle::spawn(local, "test");
        handle.close();
        handle.close();
        handle.write(Command::Disconnect);
        assert!(handle.is_terminated());
        assert!(inbound.recv().await.is_none());
    }
}
