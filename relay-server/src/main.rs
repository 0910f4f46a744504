use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use relay_core::{Config, Orchestrator};

mod client;
mod routes;

#[derive(Parser)]
#[command(name = "relay-server", about = "Streaming chat relay", version)]
struct Cli {
    /// Path to a JSON or TOML config file; env vars still supply secrets.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8787")]
        addr: SocketAddr,
    },
    /// Send one message to a running server and print the reply.
    Chat {
        message: String,
        #[arg(long)]
        personality: Option<String>,
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,
    },
    /// Like `chat`, but streams the reply chunk by chunk.
    ChatStream {
        message: String,
        #[arg(long)]
        personality: Option<String>,
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { addr } => {
            let config = load_config(cli.config.as_deref())?;
            serve(addr, &config).await
        }
        Command::Chat {
            message,
            personality,
            url,
        } => client::chat_once(url.trim_end_matches('/'), &message, personality.as_deref()).await,
        Command::ChatStream {
            message,
            personality,
            url,
        } => {
            client::chat_streaming(url.trim_end_matches('/'), &message, personality.as_deref())
                .await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::from_path(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(Config::from_env()),
    }
}

async fn serve(addr: SocketAddr, config: &Config) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::from_config(config)?);
    let app = routes::router(orchestrator);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutting down");
}
