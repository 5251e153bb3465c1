//! Piece module - falling piece, pivot rotation and lock-delay bookkeeping
//!
//! Rotation does not use per-state shape tables. Each 90 degree step moves
//! the current shape to the origin and rotates it about a pivot taken from a
//! small per-type table, indexed by the rotation state being left. Leaving
//! state 3 clockwise (or state 1 counter-clockwise) restores the spawn shape,
//! which keeps four same-direction steps closed.
//!
//! The kick search is the fixed offset list [`KICK_OFFSETS`], tried in order.

use std::time::{Duration, Instant};

use crate::mino::{
    Mino, TETROMINO_I, TETROMINO_J, TETROMINO_L, TETROMINO_O, TETROMINO_S, TETROMINO_T,
    TETROMINO_Z,
};
use crate::types::{Block, Direction, Point, LOCK_DELAY_MS, LOCK_RESET_LIMIT};

/// Number of rotation states
pub const ROTATION_STATES: i32 = 4;

/// Placement offsets tried after a rotation, first fit wins
pub const KICK_OFFSETS: [Point; 8] = [
    Point::new(0, 0),
    Point::new(-1, 0),
    Point::new(1, 0),
    Point::new(0, -1),
    Point::new(-1, -1),
    Point::new(1, -1),
    Point::new(-2, 0),
    Point::new(2, 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceType {
    I,
    O,
    J,
    L,
    S,
    T,
    Z,
}

impl PieceType {
    /// Classify a shape. Shapes outside the tetromino set fall back to `I`.
    pub fn of(mino: &Mino) -> Option<Self> {
        let canonical = mino.canonical().to_string();
        [
            (TETROMINO_I, PieceType::I),
            (TETROMINO_O, PieceType::O),
            (TETROMINO_J, PieceType::J),
            (TETROMINO_L, PieceType::L),
            (TETROMINO_S, PieceType::S),
            (TETROMINO_T, PieceType::T),
            (TETROMINO_Z, PieceType::Z),
        ]
        .into_iter()
        .find(|(shape, _)| Mino::from(*shape).to_string() == canonical)
        .map(|(_, kind)| kind)
    }

    /// (solid, ghost) tints
    pub fn blocks(kind: Option<Self>) -> (Block, Block) {
        match kind {
            Some(PieceType::I) => (Block::SolidCyan, Block::GhostCyan),
            Some(PieceType::J) => (Block::SolidBlue, Block::GhostBlue),
            Some(PieceType::L) => (Block::SolidOrange, Block::GhostOrange),
            Some(PieceType::S) => (Block::SolidGreen, Block::GhostGreen),
            Some(PieceType::T) => (Block::SolidMagenta, Block::GhostMagenta),
            Some(PieceType::Z) => (Block::SolidRed, Block::GhostRed),
            Some(PieceType::O) | None => (Block::SolidYellow, Block::GhostYellow),
        }
    }

    fn pivots(self, direction: Direction) -> &'static [Point; 4] {
        match (self, direction) {
            (PieceType::I, Direction::Clockwise) => &I_PIVOTS_CW,
            (PieceType::I, Direction::CounterClockwise) => &I_PIVOTS_CCW,
            (PieceType::O, Direction::Clockwise) => &O_PIVOTS_CW,
            (PieceType::O, Direction::CounterClockwise) => &O_PIVOTS_CCW,
            (PieceType::T, Direction::CounterClockwise) => &T_PIVOTS_CCW,
            (_, Direction::Clockwise) => &JLSTZ_PIVOTS_CW,
            (_, Direction::CounterClockwise) => &JLSZ_PIVOTS_CCW,
        }
    }
}

const I_PIVOTS_CW: [Point; 4] = [
    Point::new(1, -2),
    Point::new(-1, 0),
    Point::new(1, -1),
    Point::new(0, 0),
];
const I_PIVOTS_CCW: [Point; 4] = [
    Point::new(2, 1),
    Point::new(-1, 0),
    Point::new(2, 2),
    Point::new(1, 3),
];
const O_PIVOTS_CW: [Point; 4] = [Point::new(1, 0); 4];
const O_PIVOTS_CCW: [Point; 4] = [Point::new(0, 1); 4];
const JLSTZ_PIVOTS_CW: [Point; 4] = [
    Point::new(1, -1),
    Point::new(0, 0),
    Point::new(1, 0),
    Point::new(1, 0),
];
const JLSZ_PIVOTS_CCW: [Point; 4] = [
    Point::new(1, 1),
    Point::new(0, 0),
    Point::new(1, 2),
    Point::new(1, 2),
];
const T_PIVOTS_CCW: [Point; 4] = [
    Point::new(1, 1),
    Point::new(0, 2),
    Point::new(1, 2),
    Point::new(1, 2),
];

/// A falling piece. Cells are `mino` translated by `point`.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub point: Point,
    pub mino: Mino,
    pub ghost: Block,
    pub solid: Block,
    pub rotation: i32,

    original: Mino,
    kind: Option<PieceType>,
    resets: u32,
    last_reset: Option<Instant>,
    landing_since: Option<Instant>,
    landed: bool,
}

impl Piece {
    pub fn new(mino: Mino, point: Point) -> Self {
        let kind = PieceType::of(&mino);
        let (solid, ghost) = PieceType::blocks(kind);
        Self {
            point,
            original: mino.clone(),
            mino,
            ghost,
            solid,
            rotation: 0,
            kind,
            resets: 0,
            last_reset: None,
            landing_since: None,
            landed: false,
        }
    }

    /// Recognized tetromino type, `None` for other shapes
    pub fn kind(&self) -> Option<PieceType> {
        self.kind
    }

    /// Absolute cells when placed at `at`
    pub fn cells_at(&self, at: Point) -> impl Iterator<Item = Point> + '_ {
        self.mino.points().iter().map(move |p| p.offset(at.x, at.y))
    }

    /// Shape after `rotations` quarter turns, without modifying the piece.
    pub fn rotate(&self, rotations: u32, direction: Direction) -> Mino {
        if rotations == 0 {
            return self.mino.clone();
        }

        let pivots = self.kind.unwrap_or(PieceType::I).pivots(direction);
        let mut rotated = self.mino.origin();
        for j in 0..rotations as i32 {
            let pivot = match direction {
                Direction::Clockwise => self.rotation + j,
                Direction::CounterClockwise => self.rotation - j,
            }
            .rem_euclid(ROTATION_STATES);

            let restores = match direction {
                Direction::Clockwise => pivot == 3,
                Direction::CounterClockwise => pivot == 1,
            };
            if restores {
                rotated = self.original.clone();
                continue;
            }

            let Point { x: px, y: py } = pivots[pivot as usize];
            let points = rotated
                .points()
                .iter()
                .map(|p| match direction {
                    Direction::Clockwise => Point::new(p.y - py, -(p.x - px)),
                    Direction::CounterClockwise => Point::new(-(p.y - py), p.x - px),
                })
                .collect();
            rotated = Mino::new(points);
        }
        rotated
    }

    /// Advance the rotation index after an accepted rotation
    pub fn apply_rotation(&mut self, rotations: u32, direction: Direction) {
        let delta = match direction {
            Direction::Clockwise => rotations as i32,
            Direction::CounterClockwise => -(rotations as i32),
        };
        self.rotation = (self.rotation + delta).rem_euclid(ROTATION_STATES);
    }

    /// Restart the lock timer while landing, at most [`LOCK_RESET_LIMIT`] times
    pub fn apply_reset(&mut self, now: Instant) {
        if self.landing_since.is_none() || self.resets >= LOCK_RESET_LIMIT {
            return;
        }
        self.resets += 1;
        self.last_reset = Some(now);
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn is_landing(&self) -> bool {
        self.landing_since.is_some()
    }

    pub fn is_landed(&self) -> bool {
        self.landed
    }

    pub(crate) fn begin_landing(&mut self, now: Instant) {
        self.landing_since = Some(now);
    }

    pub(crate) fn cancel_landing(&mut self) {
        self.landing_since = None;
    }

    pub(crate) fn mark_landed(&mut self) {
        self.landed = true;
    }

    /// Whether the settle delay has run out at `now`
    pub fn lock_delay_expired(&self, now: Instant) -> bool {
        let delay = Duration::from_millis(LOCK_DELAY_MS);
        let Some(since) = self.landing_since else {
            return false;
        };
        if self.resets > 0 {
            if let Some(last) = self.last_reset {
                if now.saturating_duration_since(last) < delay {
                    return false;
                }
            }
        }
        now.saturating_duration_since(since) >= delay
    }
}
