//! Adapter module - network entry points
//!
//! The server accepts connections over TCP or Unix sockets and seats players
//! in matches; the client dials a server and joins one.
//!
//! # Protocol Overview
//!
//! Frames are newline-delimited JSON envelopes with an integer command tag:
//!
//! ```text
//! Client -> Server: {"cmd":7,"data":{"Name":"ann","GameID":0,"PlayerID":0}}
//! Server -> Client: {"cmd":7,"data":{"Name":"","GameID":0,"PlayerID":1}}
//! Server -> Client: {"cmd":9,"data":{"Players":{"1":"ann"}}}
//! Server -> Client: {"cmd":5,"data":{"Player":-1,"Message":"Waiting for at least two players to join..."}}
//! ```
//!
//! # Environment Variables
//!
//! - `NETRIS_LISTEN_TCP`: TCP listen address (default: "127.0.0.1:1984")
//! - `NETRIS_LISTEN_SOCKET`: Unix socket path (default: none)
//! - `NETRIS_RANK`: cells per piece (default: 4)
//!
//! # Testing
//!
//! ```bash
//! nc 127.0.0.1 1984
//! {"cmd":7,"data":{"Name":"test","GameID":-1}}
//! ```

pub mod client;
pub mod config;
pub mod server;

pub use netris_core as core;
pub use netris_game as game;
pub use netris_types as types;

pub use client::{connect, join_game};
pub use config::{ConfigError, Endpoint, ServerConfig};
pub use server::{run_server, Server};
