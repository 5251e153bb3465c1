//! Bag module - fair piece randomizer generalized to any rank
//!
//! Each shuffle holds every mino of the rank exactly once. The bag reshuffles
//! right after its last mino is taken, so any window aligned to the set size
//! contains each mino once. Garbage holes come from a second generator seeded
//! the same way, so piece order never depends on how much garbage was drawn.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::mino::Mino;
use crate::rng::SimpleRng;

#[derive(Debug)]
struct BagState {
    minos: Vec<Mino>,
    index: usize,
    rng: SimpleRng,
    garbage_rng: SimpleRng,
}

impl BagState {
    fn shuffle(&mut self) {
        let mut minos = std::mem::take(&mut self.minos);
        self.rng.shuffle(&mut minos);
        self.minos = minos;
    }
}

/// Shared between a player's matrix and preview.
#[derive(Debug)]
pub struct Bag {
    seed: i64,
    width: usize,
    state: Mutex<BagState>,
}

impl Bag {
    pub fn new(seed: i64, minos: &[Mino], width: usize) -> Self {
        let mut state = BagState {
            minos: minos.to_vec(),
            index: 0,
            rng: SimpleRng::new(seed),
            garbage_rng: SimpleRng::new(seed),
        };
        state.shuffle();

        Self {
            seed,
            width,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BagState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.lock().minos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().minos.is_empty()
    }

    /// Consume the next mino. `None` only for an empty mino set.
    pub fn take(&self) -> Option<Mino> {
        let mut state = self.lock();
        let mino = state.minos.get(state.index).cloned()?;
        if state.index + 1 >= state.minos.len() {
            state.shuffle();
            state.index = 0;
        } else {
            state.index += 1;
        }
        Some(mino)
    }

    /// Peek at the next mino without consuming it
    pub fn next(&self) -> Option<Mino> {
        let state = self.lock();
        state.minos.get(state.index).cloned()
    }

    /// Column for the hole of the next garbage line
    pub fn garbage_hole(&self) -> usize {
        self.lock().garbage_rng.next_range(self.width as u32) as usize
    }
}
