//! Match server
//!
//! Accepts connections on TCP and Unix sockets, waits for each one to send
//! `JoinGame`, places the player in a match and relays their commands to it.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use anyhow::Context;
use tracing::{debug, info, trace, warn};

use netris_core::MinoError;
use netris_game::protocol::{create_message, Command, JoinGame};
use netris_game::{sanitize_nickname, ConnHandle, Game, InboundCommand, Player};
use netris_types::{PlayerId, AUTO_START_DELAY_MS, GAME_LOCAL, PLAYER_HOST};

use crate::config::{Endpoint, ServerConfig};

/// Pause after an accept error that is not tied to a single connection
pub const ACCEPT_BACKOFF_MS: u64 = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of running matches
#[derive(Debug)]
pub struct Server {
    rank: i32,
    games: Mutex<BTreeMap<i32, Arc<Game>>>,
}

impl Server {
    pub fn new(rank: i32) -> Self {
        Self {
            rank,
            games: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn game(&self, id: i32) -> Option<Arc<Game>> {
        lock(&self.games).get(&id).cloned()
    }

    pub fn game_ids(&self) -> Vec<i32> {
        lock(&self.games).keys().copied().collect()
    }

    fn new_game_locked(&self, games: &mut BTreeMap<i32, Arc<Game>>) -> Result<Arc<Game>, MinoError> {
        let id = (1..).find(|id| !games.contains_key(id)).unwrap_or(i32::MAX);
        let game = Game::new_host(id, self.rank, None)?;
        games.insert(id, Arc::clone(&game));
        info!(game = id, "new game");
        Ok(game)
    }

    /// Place `player` in a match and return it with the assigned player id.
    ///
    /// `GAME_LOCAL` always opens a private match. Otherwise the requested
    /// match is used when live and public, then any open public one, then a
    /// new one.
    pub fn find_game(&self, game_id: i32, player: Player) -> Result<(Arc<Game>, PlayerId), MinoError> {
        let (game, id) = {
            let mut games = lock(&self.games);
            let game = if game_id == GAME_LOCAL {
                let game = self.new_game_locked(&mut games)?;
                game.set_local(true);
                game
            } else if let Some(game) = games
                .get(&game_id)
                .filter(|g| !g.is_terminated() && !g.is_local())
            {
                Arc::clone(game)
            } else {
                games.retain(|_, g| !g.is_terminated());
                match games.values().find(|g| !g.is_local()) {
                    Some(game) => Arc::clone(game),
                    None => self.new_game_locked(&mut games)?,
                }
            };
            let id = game.add_player(player);
            (game, id)
        };

        if game.is_local() {
            game.start(0);
        } else if game.player_count() > 1 {
            if game.begin_auto_start() {
                let game = Arc::clone(&game);
                tokio::spawn(async move {
                    game.write_message("Starting game...");
                    tokio::time::sleep(Duration::from_millis(AUTO_START_DELAY_MS)).await;
                    game.start(0);
                });
            }
        } else if !game.is_started() {
            game.write_to(
                id,
                create_message(PLAYER_HOST, "Waiting for at least two players to join..."),
            );
        }

        Ok((game, id))
    }

    /// Serve one connection until it closes.
    pub fn accept<S>(self: &Arc<Self>, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        info!(peer = %peer, "incoming connection");
        let (conn, inbound) = ConnHandle::spawn(stream, peer);
        tokio::spawn(Arc::clone(self).handle_connection(conn, inbound));
    }

    async fn handle_connection(self: Arc<Self>, conn: ConnHandle, mut inbound: mpsc::Receiver<InboundCommand>) {
        let Some(join) = wait_for_join(&mut inbound).await else {
            debug!(peer = %conn.peer(), "closed before joining");
            conn.close();
            return;
        };

        let player = Player::new(&sanitize_nickname(&join.name), Some(conn.clone()));
        let (game, id) = match self.find_game(join.game_id, player) {
            Ok(found) => found,
            Err(e) => {
                warn!(peer = %conn.peer(), error = %e, "failed to create game");
                conn.close();
                return;
            }
        };
        info!(peer = %conn.peer(), game = game.id(), player = id, "player joined");

        handle_game_commands(&game, &mut inbound).await;

        game.remove_player(id);
        conn.close();
        info!(peer = %conn.peer(), game = game.id(), player = id, "player disconnected");
    }
}

async fn wait_for_join(inbound: &mut mpsc::Receiver<InboundCommand>) -> Option<JoinGame> {
    while let Some(InboundCommand { command, .. }) = inbound.recv().await {
        match command {
            Command::JoinGame(join) => return Some(join),
            other => debug!(kind = %other.kind(), "ignoring command before join"),
        }
    }
    None
}

async fn handle_game_commands(game: &Game, inbound: &mut mpsc::Receiver<InboundCommand>) {
    while let Some(InboundCommand { source, command }) = inbound.recv().await {
        let kind = command.kind();
        if kind.is_chatty() {
            trace!(game = game.id(), source, %kind, "received");
        } else {
            debug!(game = game.id(), source, %kind, "received");
        }

        match command {
            Command::Message(message) => game.relay_message(source, &message.message),
            Command::Nickname(nick) => game.rename_player(source, &nick.nickname),
            Command::UpdateMatrix(update) => game.mirror_matrix(source, &update),
            Command::GameOver(_) => game.knock_out(source),
            Command::SendGarbage(garbage) => {
                game.send_garbage(source, garbage.lines);
            }
            Command::QuitGame(_) => break,
            other => debug!(game = game.id(), kind = %other.kind(), "ignoring command"),
        }
    }
}

/// Errors that only cost the connection being accepted
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

/// Hand every accepted stream to `server`. Accept errors are logged and
/// never end the loop; errors such as running out of descriptors back off.
async fn accept_loop<S, F, Fut>(server: Arc<Server>, mut accept: F) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<(S, String)>>,
{
    loop {
        match accept().await {
            Ok((stream, peer)) => server.accept(stream, peer),
            Err(e) if is_connection_error(&e) => debug!(error = %e, "accept aborted"),
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
            }
        }
    }
}

async fn accept_tcp(server: Arc<Server>, listener: TcpListener) -> anyhow::Result<()> {
    let listener = &listener;
    accept_loop(server, move || async move {
        let (socket, addr) = listener.accept().await?;
        Ok::<_, io::Error>((socket, addr.to_string()))
    })
    .await
}

#[cfg(unix)]
async fn accept_unix(server: Arc<Server>, listener: tokio::net::UnixListener) -> anyhow::Result<()> {
    let listener = &listener;
    accept_loop(server, move || async move {
        let (socket, _) = listener.accept().await?;
        Ok::<_, io::Error>((socket, "unix".to_string()))
    })
    .await
}

/// Bind a Unix socket, replacing a leftover socket file nobody listens on.
#[cfg(unix)]
async fn bind_unix(path: &std::path::Path) -> anyhow::Result<tokio::net::UnixListener> {
    if path.exists() {
        if tokio::net::UnixStream::connect(path).await.is_ok() {
            anyhow::bail!("socket {} is already in use", path.display());
        }
        debug!(path = %path.display(), "removing stale socket");
        std::fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
    tokio::net::UnixListener::bind(path).with_context(|| format!("failed to bind {}", path.display()))
}

/// Run the server until a listener fails.
///
/// `ready_tx` receives the bound TCP address once listening, which lets
/// tests bind port 0.
pub async fn run_server(config: ServerConfig, ready_tx: Option<oneshot::Sender<SocketAddr>>) -> anyhow::Result<()> {
    config.validate()?;

    let server = Arc::new(Server::new(config.rank));
    let mut listeners = JoinSet::new();
    let mut ready_tx = ready_tx;

    for endpoint in config.endpoints() {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(&addr).await?;
                let bound = listener.local_addr()?;
                info!(address = %bound, "listening on tcp");
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(bound);
                }
                listeners.spawn(accept_tcp(Arc::clone(&server), listener));
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let listener = bind_unix(&path).await?;
                info!(path = %path.display(), "listening on unix socket");
                listeners.spawn(accept_unix(Arc::clone(&server), listener));
            }
            #[cfg(not(unix))]
            Endpoint::Unix(path) => {
                anyhow::bail!("unix sockets are not supported here: {}", path.display());
            }
        }
    }

    while let Some(result) = listeners.join_next().await {
        result??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use netris_types::CONN_TIMEOUT_SECS;

    #[tokio::test]
    async fn test_find_game_fills_open_game_first() {
        let server = Server::new(4);
        let (a, ida) = server.find_game(0, Player::new("ann", None)).unwrap();
        let (b, idb) = server.find_game(0, Player::new("bob", None)).unwrap();

        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 1);
        assert_eq!((ida, idb), (1, 2));
        assert_eq!(server.game_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_local_game_is_private_and_started() {
        let server = Server::new(4);
        let (public, _) = server.find_game(0, Player::new("ann", None)).unwrap();
        let (local, _) = server.find_game(GAME_LOCAL, Player::new("bob", None)).unwrap();

        assert_ne!(public.id(), local.id());
        assert!(local.is_local());
        assert!(local.is_started());

        // A third player goes to the public game, not the local one
        let (joined, _) = server.find_game(0, Player::new("cid", None)).unwrap();
        assert_eq!(joined.id(), public.id());

        public.terminate();
        local.terminate();
    }

    #[tokio::test]
    async fn test_local_game_cannot_be_joined_by_id() {
        let server = Server::new(4);
        let (local, _) = server.find_game(GAME_LOCAL, Player::new("ann", None)).unwrap();
        let (joined, id) = server.find_game(local.id(), Player::new("bob", None)).unwrap();

        assert!(!Arc::ptr_eq(&local, &joined));
        assert!(!joined.is_local());
        assert_eq!(id, 1);
        assert_eq!(local.player_count(), 1);

        local.terminate();
        joined.terminate();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_errors_do_not_stop_listener() {
        let server = Arc::new(Server::new(4));
        let (local, remote) = duplex(4096);
        let mut script: VecDeque<io::Result<(DuplexStream, String)>> = VecDeque::from(vec![
            Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
            Err(io::Error::new(io::ErrorKind::Other, "too many open files")),
            Ok((local, "dup".to_string())),
        ]);
        let listener = tokio::spawn(accept_loop(Arc::clone(&server), move || {
            let next = script.pop_front();
            async move {
                match next {
                    Some(result) => result,
                    None => std::future::pending().await,
                }
            }
        }));

        let (r, mut w) = tokio::io::split(remote);
        let mut r = BufReader::new(r);
        w.write_all(b"{\"cmd\":7,\"data\":{\"Name\":\"ann\",\"GameID\":0}}\n")
            .await
            .unwrap();
        let mut line = String::new();
        r.read_line(&mut line).await.unwrap();
        assert!(line.starts_with(r#"{"cmd":7"#), "{}", line);

        assert!(!listener.is_finished());
        assert_eq!(server.game_ids(), vec![1]);
        listener.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_player_is_dropped_after_deadline() {
        let server = Arc::new(Server::new(4));
        let (ann_local, ann_remote) = duplex(1 << 16);
        let (bob_local, bob_remote) = duplex(1 << 16);
        let joined_at = tokio::time::Instant::now();
        server.accept(ann_local, "ann".to_string());
        server.accept(bob_local, "bob".to_string());

        let (ann_r, mut ann_w) = tokio::io::split(ann_remote);
        ann_w
            .write_all(b"{\"cmd\":7,\"data\":{\"Name\":\"ann\",\"GameID\":0}}\n")
            .await
            .unwrap();
        // Ann keeps reading but never writes again
        let ann_reader = tokio::spawn(async move {
            let mut lines = BufReader::new(ann_r).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });
        tokio::task::yield_now().await;

        let (bob_r, mut bob_w) = tokio::io::split(bob_remote);
        bob_w
            .write_all(b"{\"cmd\":7,\"data\":{\"Name\":\"bob\",\"GameID\":0}}\n")
            .await
            .unwrap();
        let bob_pinger = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(10)).await;
                if bob_w.write_all(b"{\"cmd\":2,\"data\":{}}\n").await.is_err() {
                    break;
                }
            }
        });

        let mut lines = BufReader::new(bob_r).lines();
        loop {
            let line = lines.next_line().await.unwrap().expect("bob stays connected");
            if line.contains("ann has left the game") {
                break;
            }
        }
        assert!(joined_at.elapsed() >= Duration::from_secs(CONN_TIMEOUT_SECS));

        let game = server.game(1).unwrap();
        assert_eq!(game.player_ids(), vec![2]);
        assert!(!game.is_terminated());

        bob_pinger.abort();
        ann_reader.abort();
        game.terminate();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_unix_replaces_stale_socket() {
        let path = std::env::temp_dir().join(format!("netris-stale-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);

        // A std listener leaves its file behind when dropped
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let live = bind_unix(&path).await.unwrap();
        assert!(bind_unix(&path).await.is_err());

        drop(live);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_terminated_games_are_replaced() {
        let server = Server::new(4);
        let (first, id) = server.find_game(0, Player::new("ann", None)).unwrap();
        first.remove_player(id);
        assert!(first.is_terminated());

        let (second, _) = server.find_game(1, Player::new("bob", None)).unwrap();
        assert!(!second.is_terminated());
        assert_eq!(second.id(), 1);
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
