//! Netris match orchestration
//!
//! Wire protocol, framed connections, players and the [`Game`] that ties
//! them together on either end of a connection.

pub mod conn;
pub mod event;
pub mod game;
pub mod player;
pub mod protocol;

pub use netris_types as types;

pub use conn::{ConnHandle, InboundCommand};
pub use event::GameEvent;
pub use game::{Game, GameState, TIE};
pub use player::{sanitize_nickname, Player, ANONYMOUS};
pub use protocol::{
    create_message, create_roster, encode, parse_command, Command, CommandKind, ParsedCommand,
    ProtocolError,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock ignoring poison; a panicked loop must not wedge the match.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
