//! Player module - a match participant and nickname rules

use netris_core::{Matrix, SharedMatrix};

use crate::conn::ConnHandle;
use crate::protocol::Command;
use crate::types::{PlayerId, MAX_NICKNAME_LEN, PLAYER_UNKNOWN};

/// Placeholder used when a nickname sanitizes to nothing
pub const ANONYMOUS: &str = "Anonymous";

/// A participant. Mirrors of remote players on a client have no connection.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub matrix: SharedMatrix,
    pub preview: SharedMatrix,

    conn: Option<ConnHandle>,

    pub(crate) pending_garbage: u32,
    pub(crate) total_garbage_sent: u32,
    pub(crate) total_garbage_received: u32,
}

impl Player {
    pub fn new(name: &str, conn: Option<ConnHandle>) -> Self {
        Self {
            id: PLAYER_UNKNOWN,
            name: sanitize_nickname(name),
            score: 0,
            matrix: Matrix::standard().shared(),
            preview: Matrix::preview(1).shared(),
            conn,
            pending_garbage: 0,
            total_garbage_sent: 0,
            total_garbage_received: 0,
        }
    }

    pub fn conn(&self) -> Option<&ConnHandle> {
        self.conn.as_ref()
    }

    pub fn write(&self, command: Command) {
        if let Some(conn) = &self.conn {
            conn.write(command);
        }
    }

    /// Local mirrors never terminate
    pub fn is_terminated(&self) -> bool {
        self.conn.as_ref().is_some_and(ConnHandle::is_terminated)
    }

    pub fn garbage_sent(&self) -> u32 {
        self.total_garbage_sent
    }

    pub fn garbage_received(&self) -> u32 {
        self.total_garbage_received
    }

    pub fn pending_garbage(&self) -> u32 {
        self.pending_garbage
    }
}

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-!@#$%^&*+=,./".contains(c)
}

/// Keep only `[a-zA-Z0-9_-!@#$%^&*+=,./]`, at most ten characters.
pub fn sanitize_nickname(nick: &str) -> String {
    let clean: String = nick.chars().filter(|&c| allowed(c)).take(MAX_NICKNAME_LEN).collect();
    if clean.is_empty() {
        ANONYMOUS.to_string()
    } else {
        clean
    }
}
