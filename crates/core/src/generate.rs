//! Free polyomino enumeration
//!
//! Minos of rank n are grown from every mino of rank n-1 by adding each
//! neighbouring cell, canonicalizing and dropping duplicates. Reflections are
//! kept distinct, so rank 4 yields the seven familiar tetrominoes.

use std::collections::HashSet;

use thiserror::Error;

use crate::mino::{Mino, MONOMINO};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinoError {
    #[error("invalid rank {0}")]
    InvalidRank(i32),
}

/// Generate all canonical minos of the given rank, in first-seen order.
pub fn generate(rank: i32) -> Result<Vec<Mino>, MinoError> {
    match rank {
        r if r < 0 => Err(MinoError::InvalidRank(r)),
        0 => Ok(Vec::new()),
        1 => Ok(vec![Mino::from(MONOMINO)]),
        _ => {
            let smaller = generate(rank - 1)?;

            let mut found = HashSet::new();
            let mut minos = Vec::new();
            for mino in &smaller {
                for grown in mino.new_minos() {
                    if found.insert(grown.to_string()) {
                        minos.push(grown);
                    }
                }
            }
            Ok(minos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_rank_rejected() {
        assert_eq!(generate(-1), Err(MinoError::InvalidRank(-1)));
    }

    #[test]
    fn test_rank_zero_is_empty() {
        assert!(generate(0).unwrap().is_empty());
    }

    #[test]
    fn test_generated_minos_have_rank_cells() {
        for rank in 1..=5 {
            for m in generate(rank).unwrap() {
                assert_eq!(m.len(), rank as usize);
                assert_eq!(m.origin(), m);
            }
        }
    }
}
