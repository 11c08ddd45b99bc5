//! Oracle - Personal Knowledge Memory Server
//!
//! One binary, four modes:
//! - `oracle` / `oracle mcp` — the stdio tool server (default)
//! - `oracle server` — the HTTP/JSON API with instance lock + PID file
//! - `oracle index` — one full re-index of the markdown corpus
//! - `oracle ensure-server` — probe the HTTP server, auto-start if absent

mod ensure;
mod http;
mod protocol;
mod server;
mod state;
mod tools;

use std::io;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use oracle_core::Config;

use crate::protocol::stdio::StdioTransport;
use crate::server::ToolServer;
use crate::state::Oracle;

/// Oracle - hybrid retrieval over your knowledge corpus
#[derive(Parser)]
#[command(name = "oracle")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Knowledge memory server: stdio tool protocol + HTTP API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (single live instance per data dir)
    Server,

    /// Start the stdio tool server (the default when no subcommand is given)
    Mcp,

    /// Run one indexing pass to completion and exit
    Index,

    /// Start the HTTP server if not already alive; exit 0 iff healthy
    EnsureServer {
        /// Only report whether a server is alive, never start one
        #[arg(long)]
        status: bool,

        /// Print progress details
        #[arg(long)]
        verbose: bool,
    },
}

fn init_logging() {
    // stderr only: stdout belongs to the JSON-RPC framing in mcp mode
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

fn init_oracle(config: Config) -> Arc<Oracle> {
    match Oracle::init(config) {
        Ok(oracle) => Arc::new(oracle),
        Err(e) => {
            error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env();

    match cli.command {
        Some(Commands::Server) => {
            let oracle = init_oracle(config);
            if let Err(e) = http::serve(oracle).await {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Index) => {
            let oracle = init_oracle(config);
            match oracle.indexer().run().await {
                Ok(report) => {
                    println!(
                        "Indexed {} documents ({} vector-indexed{}) in {} ms",
                        report.documents,
                        report.vector_indexed,
                        if report.vector_ok { "" } else { ", vector backend degraded" },
                        report.duration_ms
                    );
                }
                Err(e) => {
                    error!("Indexing failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::EnsureServer { status, verbose }) => {
            let code = ensure::ensure_server(&config, status, verbose).await;
            std::process::exit(code);
        }
        Some(Commands::Mcp) | None => {
            let oracle = init_oracle(config);
            info!("Oracle tool server v{} starting on stdio", env!("CARGO_PKG_VERSION"));

            // Warm the embedding child before stdio is owned by the protocol
            oracle.vector.prewarm().await;

            let server = ToolServer::new(oracle);
            let transport = StdioTransport::new();
            if let Err(e) = transport.run(server).await {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
            info!("Oracle tool server shutting down");
        }
    }
}
