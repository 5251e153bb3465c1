//! Netris (workspace facade crate).
//!
//! Re-exports the member crates under one roof: `netris::{types,core,game,adapter}`.

pub use netris_adapter as adapter;
pub use netris_core as core;
pub use netris_game as game;
pub use netris_types as types;
