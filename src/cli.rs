// ===================================================================================================
// Command-line argument parsing
// ===================================================================================================
//
// Argument parsing lives here, separate from the async command bodies in main.rs, so the
// parsed structure can be unit-tested and reused without pulling in a tokio runtime.
// ===================================================================================================

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "swarm-core")]
pub struct Cli {
    /// Path to a SwarmConfig TOML file (defaults applied for anything it omits)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a node: bind the HTTP API, run heartbeat/sweep timers, serve until interrupted
    Serve {
        /// Override the configured bind address (host:port)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print this node's identity, or fetch a remote node's via GET /identity
    Identity {
        /// Base URL of a remote node to query instead of printing the local identity
        #[arg(long)]
        remote: Option<String>,
    },
    /// List known peers, optionally against a remote node's own view
    Peers {
        #[arg(long)]
        remote: Option<String>,
    },
    /// Delegate one task to a running node and print the result
    Distribute {
        /// Base URL of the node to delegate through
        #[arg(long)]
        node: String,
        /// Task text to delegate
        task: String,
        /// Session id to attribute the delegation to
        #[arg(long, default_value = "cli-session")]
        session_id: String,
        /// Skip the real transport call and print what would be sent
        #[arg(long)]
        dry_run: bool,
    },
}
