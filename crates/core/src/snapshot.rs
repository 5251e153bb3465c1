//! Wire form of a matrix
//!
//! Cells travel as a sparse map keyed by `y * width + x`. Timers, the bag,
//! the overlay and pending garbage stay local to the owning process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mino::Mino;
use crate::piece::Piece;
use crate::types::{Block, MatrixType, Point};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PieceSnapshot {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Y")]
    pub y: i32,
    pub mino: Mino,
    pub ghost: Block,
    pub solid: Block,
    pub rotation: i32,
}

impl PieceSnapshot {
    /// Whether every cell lies inside a `width` x `rows` grid
    pub fn within(&self, width: usize, rows: usize) -> bool {
        let (width, rows) = (width as i32, rows as i32);
        !self.mino.is_empty()
            && self.mino.points().iter().all(|p| {
                match (self.x.checked_add(p.x), self.y.checked_add(p.y)) {
                    (Some(x), Some(y)) => (0..width).contains(&x) && (0..rows).contains(&y),
                    _ => false,
                }
            })
    }
}

impl From<&Piece> for PieceSnapshot {
    fn from(value: &Piece) -> Self {
        Self {
            x: value.point.x,
            y: value.point.y,
            mino: value.mino.clone(),
            ghost: value.ghost,
            solid: value.solid,
            rotation: value.rotation,
        }
    }
}

impl From<&PieceSnapshot> for Piece {
    fn from(value: &PieceSnapshot) -> Self {
        let mut piece = Piece::new(value.mino.clone(), Point::new(value.x, value.y));
        piece.ghost = value.ghost;
        piece.solid = value.solid;
        piece.rotation = value.rotation;
        piece
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MatrixSnapshot {
    #[serde(rename = "M")]
    pub cells: BTreeMap<usize, Block>,
    #[serde(rename = "P")]
    pub piece: Option<PieceSnapshot>,
    pub player_name: String,
    #[serde(rename = "Type")]
    pub matrix_type: MatrixType,
    pub combo: u32,
    pub lines_cleared: u32,
    pub garbage_sent: u32,
    pub garbage_received: u32,
    pub speed: u32,
    pub game_over: bool,
}
