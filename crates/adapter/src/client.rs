//! Client side: dial the server and join a match

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use netris_game::protocol::{Command, JoinGame};
use netris_game::{ConnHandle, Game, InboundCommand};
use netris_types::PLAYER_HOST;

use crate::config::Endpoint;

pub const CONNECT_ATTEMPTS: u32 = 25;
pub const CONNECT_RETRY_MS: u64 = 250;

async fn dial(endpoint: &Endpoint) -> io::Result<(ConnHandle, mpsc::Receiver<InboundCommand>)> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| addr.clone());
            Ok(ConnHandle::spawn(stream, peer))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            Ok(ConnHandle::spawn(stream, path.display().to_string()))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported here",
        )),
    }
}

/// Connect to `address`, retrying while the server comes up.
pub async fn connect(address: &str) -> anyhow::Result<(ConnHandle, mpsc::Receiver<InboundCommand>)> {
    let endpoint = Endpoint::parse(address);
    let mut attempt = 1;
    loop {
        match dial(&endpoint).await {
            Ok(conn) => {
                info!(endpoint = %endpoint, "connected");
                return Ok(conn);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!(endpoint = %endpoint, attempt, error = %e, "connect failed, retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(CONNECT_RETRY_MS)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to connect to {}", endpoint));
            }
        }
    }
}

/// Ask the server for a seat and wait until the match starts.
///
/// System messages received before then go to `messages`. The returned
/// game keeps applying server commands in the background.
pub async fn join_game(
    conn: ConnHandle,
    mut inbound: mpsc::Receiver<InboundCommand>,
    name: &str,
    game_id: i32,
    rank: i32,
    messages: Option<mpsc::UnboundedSender<String>>,
) -> anyhow::Result<Arc<Game>> {
    conn.write(Command::JoinGame(JoinGame {
        name: name.to_string(),
        game_id,
        ..Default::default()
    }));

    let mut game: Option<Arc<Game>> = None;
    while let Some(InboundCommand { command, .. }) = inbound.recv().await {
        let Some(g) = game.clone() else {
            match command {
                Command::Message(message) => {
                    info!("* {}", message.message);
                    if let Some(tx) = &messages {
                        let _ = tx.send(format!("* {}", message.message));
                    }
                }
                Command::JoinGame(join) => {
                    debug!(player = join.player_id, "seat assigned");
                    game = Some(Game::new_client(rank, join.player_id, conn.clone(), messages.clone())?);
                }
                other => warn!(kind = %other.kind(), "unexpected command while joining"),
            }
            continue;
        };

        match command {
            Command::StartGame(_) => {
                g.handle_command(InboundCommand {
                    source: PLAYER_HOST,
                    command,
                });
                tokio::spawn(Arc::clone(&g).handle_read_commands(inbound));
                return Ok(g);
            }
            command => g.handle_command(InboundCommand {
                source: PLAYER_HOST,
                command,
            }),
        }
    }

    conn.close();
    anyhow::bail!("connection closed before the game started")
}
