//! Server configuration and listen address parsing

use std::path::PathBuf;

use thiserror::Error;

use netris_core::{generate, MinoError};
use netris_types::{DEFAULT_PORT, DEFAULT_RANK};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no listen address configured")]
    NoListener,
    #[error(transparent)]
    Rank(#[from] MinoError),
}

/// Where to listen or dial
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl Endpoint {
    /// Paths (anything with a slash) are Unix sockets. TCP addresses without
    /// a port get the default one; a bare `:port` binds every interface.
    pub fn parse(address: &str) -> Self {
        if address.contains('/') || address.contains('\\') {
            return Endpoint::Unix(PathBuf::from(address));
        }

        let mut address = address.to_string();
        if !address.contains(':') {
            address = format!("{}:{}", address, DEFAULT_PORT);
        }
        if address.starts_with(':') {
            address = format!("0.0.0.0{}", address);
        }
        Endpoint::Tcp(address)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_tcp: Option<String>,
    pub listen_socket: Option<String>,
    pub rank: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_tcp: Some(format!("127.0.0.1:{}", DEFAULT_PORT)),
            listen_socket: None,
            rank: DEFAULT_RANK,
        }
    }
}

impl ServerConfig {
    /// Read `NETRIS_LISTEN_TCP`, `NETRIS_LISTEN_SOCKET` and `NETRIS_RANK`,
    /// falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();
        let non_empty = |var: &str| {
            env::var(var)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let listen_tcp = non_empty("NETRIS_LISTEN_TCP").or(defaults.listen_tcp);
        let listen_socket = non_empty("NETRIS_LISTEN_SOCKET").or(defaults.listen_socket);
        let rank = non_empty("NETRIS_RANK")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rank);

        Self {
            listen_tcp,
            listen_socket,
            rank,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_tcp.is_none() && self.listen_socket.is_none() {
            return Err(ConfigError::NoListener);
        }
        if generate(self.rank)?.is_empty() {
            return Err(MinoError::InvalidRank(self.rank).into());
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.listen_tcp
            .iter()
            .map(|a| Endpoint::parse(a))
            .chain(self.listen_socket.iter().map(|p| Endpoint::Unix(PathBuf::from(p))))
            .collect()
    }
}
