use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tictactoe_lobby::http::{router, AppState};
use tictactoe_lobby::sqlite_store::SqliteIdentityStore;
use tictactoe_lobby::{EngineConfig, IdentityStore, Mailbox, MemoryIdentityStore, SessionManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tic-tac-toe lobby: matchmaking and timed games behind an HTTP chat adapter
#[derive(Parser, Debug)]
#[command(name = "tictactoe-lobby")]
#[command(version)]
struct Cli {
    /// TOML file with timing overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// SQLite file for player identities. Kept in memory when omitted.
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let identity: Arc<dyn IdentityStore> = match &cli.db {
        Some(path) => Arc::new(SqliteIdentityStore::open(path).with_context(|| format!("opening {}", path))?),
        None => Arc::new(MemoryIdentityStore::new()),
    };

    let mailbox = Arc::new(Mailbox::new());
    let manager = SessionManager::new(config, mailbox.clone(), identity);
    let app = router(AppState { manager, mailbox });

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(
        addr = %cli.bind,
        turn_limit_secs = config.turn_limit_secs,
        challenge_timeout_secs = config.challenge_timeout_secs,
        "tic-tac-toe lobby listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
