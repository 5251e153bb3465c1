//! Core types module - shared data structures and constants
//!
//! This module defines the fundamental types used throughout the engine.
//! Everything here is plain data: lattice points, cell blocks, player actions
//! and the timing constants shared by the simulation and the network layer.
//!
//! # Matrix Dimensions
//!
//! Standard playfield dimensions:
//!
//! - **Width**: 10 columns (indexed 0-9)
//! - **Height**: 20 visible rows (indexed 0-19, row 0 is the floor)
//! - **Buffer**: 4 hidden rows above the visible area where pieces spawn
//!
//! # Timing Constants
//!
//! Timing values are in milliseconds:
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `FALL_TIME_MS` | 850 | Gravity interval for the local piece |
//! | `UPDATE_DURATION_MS` | 850 | Matrix broadcast interval |
//! | `LOCK_DELAY_MS` | 500 | Settle delay before a landed piece locks |
//! | `LOCK_WATCHDOG_MS` | 100 | Lock-delay polling interval |
//! | `GARBAGE_DELAY_MS` | 1500 | Delay before staged garbage becomes eligible |
//! | `GARBAGE_INTERVAL_MS` | 500 | Garbage intake and distribution interval |
//! | `COMBO_BASE_MS` | 2400 | Base combo window |
//! | `AUTO_START_DELAY_MS` | 2000 | Countdown before a match auto-starts |
//!
//! # Examples
//!
//! ```
//! use netris_types::{Block, GameAction, Point, BOARD_WIDTH};
//!
//! let p = Point::new(1, 2);
//! assert_eq!(p.rotate90(), Point::new(2, -1));
//!
//! assert_eq!(Block::SolidRed.ghost(), Block::GhostRed);
//! assert_eq!(GameAction::from_str("hardDrop"), Some(GameAction::HardDrop));
//! assert_eq!(BOARD_WIDTH, 10);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Matrix width in cells (10 columns)
pub const BOARD_WIDTH: usize = 10;

/// Visible matrix height in cells (20 rows)
pub const BOARD_HEIGHT: usize = 20;

/// Hidden rows above the visible area
pub const BOARD_BUFFER: usize = 4;

/// Rank of the classic tetromino set
pub const DEFAULT_RANK: i32 = 4;

/// Gravity interval for the local piece
pub const FALL_TIME_MS: u64 = 850;

/// Interval between matrix snapshots on the wire
pub const UPDATE_DURATION_MS: u64 = 850;

/// Settle delay before a landed piece locks
pub const LOCK_DELAY_MS: u64 = 500;

/// Lock-delay watchdog polling interval
pub const LOCK_WATCHDOG_MS: u64 = 100;

/// Maximum number of lock timer resets per piece (15)
pub const LOCK_RESET_LIMIT: u32 = 15;

/// Delay before newly staged garbage may be inserted
pub const GARBAGE_DELAY_MS: u64 = 1500;

/// Garbage intake (client) and distribution (host) interval
pub const GARBAGE_INTERVAL_MS: u64 = 500;

/// Base combo window, halved for every combo step
pub const COMBO_BASE_MS: u64 = 2400;

/// Per-line combo window extension, halved for every combo step
pub const COMBO_BONUS_MS: u64 = 1200;

/// Landings older than this are ignored when computing speed
pub const SPEED_WINDOW_SECS: u64 = 120;

/// Countdown between enough players joining and the match starting
pub const AUTO_START_DELAY_MS: u64 = 2000;

/// Cooldown polled after a match ends before restarting it
pub const RESTART_DELAY_SECS: u64 = 7;

/// Bounded inbound command queue per connection
pub const COMMAND_QUEUE_SIZE: usize = 10;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 1984;

/// Read/write deadline for a connection
pub const CONN_TIMEOUT_SECS: u64 = 30;

/// Keepalive ping interval
pub const PING_INTERVAL_SECS: u64 = 7;

/// Maximum nickname length after sanitization
pub const MAX_NICKNAME_LEN: usize = 10;

/// Player identifier. Ids handed out by a game start at 1.
pub type PlayerId = i32;

/// Sender id used for messages originating from the host
pub const PLAYER_HOST: PlayerId = -1;

/// Placeholder id for a player that has not joined a game yet
pub const PLAYER_UNKNOWN: PlayerId = 0;

/// Game id requesting a private practice match
pub const GAME_LOCAL: i32 = -1;

/// Integer lattice coordinate. Y grows upward; row 0 is the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Y")]
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn rotate90(self) -> Self {
        Self::new(self.y, -self.x)
    }

    pub fn rotate180(self) -> Self {
        Self::new(-self.x, -self.y)
    }

    pub fn rotate270(self) -> Self {
        Self::new(-self.y, self.x)
    }

    pub fn reflect(self) -> Self {
        Self::new(-self.x, self.y)
    }

    /// The four 4-connected neighbours
    pub fn neighborhood(self) -> [Point; 4] {
        [
            Self::new(self.x - 1, self.y),
            Self::new(self.x, self.y - 1),
            Self::new(self.x + 1, self.y),
            Self::new(self.x, self.y + 1),
        ]
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Cell content. Ordinals are stable on the wire.
///
/// Every solid tint has a ghost counterpart used for the landing preview and
/// for frozen boards after a knockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Block {
    #[default]
    None = 0,
    Garbage = 1,
    GhostBlue = 2,
    GhostCyan = 3,
    GhostRed = 4,
    GhostYellow = 5,
    GhostMagenta = 6,
    GhostGreen = 7,
    GhostOrange = 8,
    SolidBlue = 9,
    SolidCyan = 10,
    SolidRed = 11,
    SolidYellow = 12,
    SolidMagenta = 13,
    SolidGreen = 14,
    SolidOrange = 15,
}

impl Block {
    const ALL: [Block; 16] = [
        Block::None,
        Block::Garbage,
        Block::GhostBlue,
        Block::GhostCyan,
        Block::GhostRed,
        Block::GhostYellow,
        Block::GhostMagenta,
        Block::GhostGreen,
        Block::GhostOrange,
        Block::SolidBlue,
        Block::SolidCyan,
        Block::SolidRed,
        Block::SolidYellow,
        Block::SolidMagenta,
        Block::SolidGreen,
        Block::SolidOrange,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_empty(self) -> bool {
        self == Block::None
    }

    pub fn is_ghost(self) -> bool {
        (Block::GhostBlue as u8..=Block::GhostOrange as u8).contains(&(self as u8))
    }

    pub fn is_solid(self) -> bool {
        self as u8 >= Block::SolidBlue as u8
    }

    /// Ghost tint for a solid block; other blocks are returned unchanged.
    pub fn ghost(self) -> Self {
        if self.is_solid() {
            Self::ALL[(self as u8 - 7) as usize]
        } else {
            self
        }
    }

    /// Terminal glyph
    pub fn rune(self) -> char {
        match self {
            Block::None => ' ',
            b if b.is_ghost() => '▓',
            _ => '█',
        }
    }
}

impl Serialize for Block {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        Block::from_u8(v).ok_or_else(|| serde::de::Error::custom(format!("invalid block {}", v)))
    }
}

/// Kind of matrix. Only standard matrices spawn and simulate pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatrixType {
    #[default]
    Standard,
    Preview,
    Custom,
}

impl MatrixType {
    pub fn as_u8(self) -> u8 {
        match self {
            MatrixType::Standard => 0,
            MatrixType::Preview => 1,
            MatrixType::Custom => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MatrixType::Standard),
            1 => Some(MatrixType::Preview),
            2 => Some(MatrixType::Custom),
            _ => None,
        }
    }
}

impl Serialize for MatrixType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for MatrixType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        MatrixType::from_u8(v)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid matrix type {}", v)))
    }
}

/// Rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

/// Player input applied to the local matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    MoveLeft,
    MoveRight,
    SoftDrop,
    HardDrop,
    RotateCw,
    RotateCcw,
}

impl GameAction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "moveleft" => Some(GameAction::MoveLeft),
            "moveright" => Some(GameAction::MoveRight),
            "softdrop" => Some(GameAction::SoftDrop),
            "harddrop" => Some(GameAction::HardDrop),
            "rotatecw" => Some(GameAction::RotateCw),
            "rotateccw" => Some(GameAction::RotateCcw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameAction::MoveLeft => "moveLeft",
            GameAction::MoveRight => "moveRight",
            GameAction::SoftDrop => "softDrop",
            GameAction::HardDrop => "hardDrop",
            GameAction::RotateCw => "rotateCw",
            GameAction::RotateCcw => "rotateCcw",
        }
    }
}
