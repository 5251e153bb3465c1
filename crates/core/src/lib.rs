//! Core simulation - shapes, randomizer and per-player board
//!
//! Everything in this crate is synchronous and free of I/O. Time enters only
//! through explicit [`std::time::Instant`] arguments, so a board driven with
//! the same seed and the same clock readings always ends in the same state.
//!
//! # Module Structure
//!
//! - [`mino`]: polyomino shapes and canonical forms
//! - [`generate`]: free polyomino enumeration for a rank
//! - [`rng`]: seeded LCG used by the bag
//! - [`bag`]: fair piece randomizer plus garbage-hole generator
//! - [`piece`]: falling piece, pivot rotation, lock-delay bookkeeping
//! - [`matrix`]: the board, line clears, combo and garbage economy
//! - [`scoring`]: line score and combo bonus tables
//! - [`snapshot`]: serializable board form sent over the wire
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use netris_core::{generate, Bag, Matrix};
//!
//! let minos = generate(4).unwrap();
//! let mut matrix = Matrix::standard();
//! matrix.attach_bag(Arc::new(Bag::new(42, &minos, matrix.width())));
//! assert!(matrix.take_piece());
//!
//! matrix.hard_drop_piece(Instant::now());
//! assert!(!matrix.is_game_over());
//! ```

pub mod bag;
pub mod generate;
pub mod matrix;
pub mod mino;
pub mod piece;
pub mod rng;
pub mod scoring;
pub mod snapshot;

pub use netris_types as types;

pub use bag::Bag;
pub use generate::{generate, MinoError};
pub use matrix::{Matrix, MatrixError, MatrixEvent, SharedMatrix};
pub use mino::Mino;
pub use piece::{Piece, PieceType};
pub use rng::SimpleRng;
pub use scoring::{combo_bonus, garbage_for_clear, line_score};
pub use snapshot::{MatrixSnapshot, PieceSnapshot};
