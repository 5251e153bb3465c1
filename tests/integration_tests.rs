//! Integration tests for the client-side match loop

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

use netris::game::protocol::{Command, GameOver, ReceiveGarbage, StartGame};
use netris::game::{create_roster, ConnHandle, Game, InboundCommand};
use netris::types::{GameAction, PlayerId, PLAYER_HOST};

fn from_host(command: Command) -> InboundCommand {
    InboundCommand {
        source: PLAYER_HOST,
        command,
    }
}

/// Client game for player 1 wired to an in-memory peer.
fn client() -> (Arc<Game>, DuplexStream) {
    let (local, remote) = duplex(1 << 20);
    let (conn, _inbound) = ConnHandle::spawn(local, "test");
    let game = Game::new_client(4, 1, conn, None).unwrap();
    game.handle_command(from_host(create_roster([(1, "ann"), (2, "bob")])));
    (game, remote)
}

fn start(game: &Arc<Game>, seed: i64) {
    game.handle_command(from_host(Command::StartGame(StartGame {
        seed,
        started: false,
    })));
}

fn is_over(game: &Game, id: PlayerId) -> bool {
    game.matrix(id).unwrap().lock().unwrap().is_game_over()
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_stack_without_input() {
    let (a, _ra) = client();
    let (b, _rb) = client();
    start(&a, 4242);
    start(&b, 4242);

    tokio::time::sleep(Duration::from_secs(20)).await;

    let sa = a.matrix(1).unwrap().lock().unwrap().snapshot();
    let sb = b.matrix(1).unwrap().lock().unwrap().snapshot();
    assert!(!sa.cells.is_empty(), "at least one piece should have locked");
    assert_eq!(sa, sb);

    a.terminate();
    b.terminate();
}

#[tokio::test]
async fn test_roster_updates_add_rename_remove() {
    let (game, _remote) = client();
    assert_eq!(game.player_ids(), vec![1, 2]);

    game.handle_command(from_host(create_roster([(1, "ann"), (2, "bobby"), (3, "cid")])));
    assert_eq!(game.player_name(2).as_deref(), Some("bobby"));
    assert_eq!(game.player_ids(), vec![1, 2, 3]);

    game.handle_command(from_host(create_roster([(1, "ann"), (3, "cid")])));
    assert_eq!(game.player_ids(), vec![1, 3]);
    game.terminate();
}

#[tokio::test]
async fn test_hard_drop_locks_and_spawns() {
    let (game, _remote) = client();
    start(&game, 9);

    game.process_action(GameAction::HardDrop);
    let matrix = game.matrix(1).unwrap();
    let m = matrix.lock().unwrap();
    assert!(!m.snapshot().cells.is_empty());
    assert!(m.piece().is_some());
    drop(m);
    game.terminate();
}

#[tokio::test]
async fn test_received_garbage_is_pending() {
    let (game, _remote) = client();
    start(&game, 9);

    game.handle_command(from_host(Command::ReceiveGarbage(ReceiveGarbage { lines: 3 })));
    assert_eq!(game.matrix(1).unwrap().lock().unwrap().pending_garbage(), 3);
    game.terminate();
}

#[tokio::test]
async fn test_knockout_and_winner() {
    let (game, _remote) = client();
    start(&game, 9);

    game.handle_command(from_host(Command::GameOver(GameOver {
        player: 2,
        winner: String::new(),
    })));
    assert!(is_over(&game, 2));
    assert!(!is_over(&game, 1));
    assert!(!game.is_game_over());

    game.handle_command(from_host(Command::GameOver(GameOver {
        player: 0,
        winner: "ann".into(),
    })));
    assert!(game.is_game_over());
    assert!(is_over(&game, 1));
    game.terminate();
}

#[tokio::test]
async fn test_late_joiner_sits_out() {
    let (game, _remote) = client();
    game.handle_command(from_host(Command::StartGame(StartGame {
        seed: 9,
        started: true,
    })));
    assert!(game.is_started());
    assert!(is_over(&game, 1));
    game.terminate();
}

#[tokio::test(start_paused = true)]
async fn test_client_sends_its_board() {
    let (game, remote) = client();
    start(&game, 9);

    let (r, _w) = tokio::io::split(remote);
    let mut lines = BufReader::new(r).lines();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .expect("expected a frame");
    let v: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(v["cmd"], 12);
    assert!(v["data"]["Matrixes"]["0"].is_object());
    game.terminate();
}
