//! In-process events consumed by the game's event handler

use netris_core::MatrixEvent;

use crate::types::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Chat line typed by the local player
    Message(String),
    /// Nickname change requested by the local player
    Nickname(String),
    /// The local matrix could not continue
    GameOver,
    /// Surplus garbage after cancellation
    SendGarbage(u32),
    Score { player: PlayerId, score: u32 },
}

impl GameEvent {
    /// Map a matrix side effect. `Moved` only restarts the fall timer and has no event.
    pub fn from_matrix(player: PlayerId, event: MatrixEvent) -> Option<Self> {
        match event {
            MatrixEvent::Moved => None,
            MatrixEvent::SendGarbage(lines) => Some(GameEvent::SendGarbage(lines)),
            MatrixEvent::Score(score) => Some(GameEvent::Score { player, score }),
            MatrixEvent::GameOver => Some(GameEvent::GameOver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_matrix() {
        assert_eq!(GameEvent::from_matrix(2, MatrixEvent::Moved), None);
        assert_eq!(
            GameEvent::from_matrix(2, MatrixEvent::Score(300)),
            Some(GameEvent::Score { player: 2, score: 300 })
        );
        assert_eq!(
            GameEvent::from_matrix(2, MatrixEvent::SendGarbage(4)),
            Some(GameEvent::SendGarbage(4))
        );
    }
}
