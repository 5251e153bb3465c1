//! Netris match server (default binary).
//!
//! Listens on TCP and/or a Unix socket and hosts matches until killed.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

use netris::adapter::{run_server, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "netris-server", version, about = "Multiplayer falling-block puzzle server")]
struct Args {
    /// TCP address to listen on; a bare host gets port 1984
    #[arg(long)]
    listen_tcp: Option<String>,

    /// Unix socket path to listen on
    #[arg(long)]
    listen_socket: Option<String>,

    /// Cells per piece
    #[arg(long)]
    rank: Option<i32>,

    /// Log game events and commands
    #[arg(long)]
    debug: bool,

    /// Also log keepalive and board traffic
    #[arg(long)]
    verbose: bool,
}

impl Args {
    /// Flags override the environment, which overrides the defaults.
    fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(addr) = &self.listen_tcp {
            config.listen_tcp = Some(addr.clone());
        }
        if let Some(path) = &self.listen_socket {
            config.listen_socket = Some(path.clone());
        }
        if let Some(rank) = self.rank {
            config.rank = rank;
        }
        config
    }

    fn level(&self) -> Level {
        if self.verbose {
            Level::TRACE
        } else if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(args.level()))
        .init();

    let config = args.config();
    info!(?config, "starting netris-server");
    run_server(config, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from(["netris-server", "--listen-tcp", ":4000", "--rank", "5", "--debug"]);
        let config = args.config();
        assert_eq!(config.listen_tcp.as_deref(), Some(":4000"));
        assert_eq!(config.rank, 5);
        assert_eq!(args.level(), Level::DEBUG);
    }

    #[test]
    fn test_verbose_wins() {
        let args = Args::parse_from(["netris-server", "--debug", "--verbose"]);
        assert_eq!(args.level(), Level::TRACE);
    }
}
