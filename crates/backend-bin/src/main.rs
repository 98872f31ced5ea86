use clap::Parser;
use mafia_backend_lib::{config::Settings, records::MemoryRecords, router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mafia-backend", about = "Party-game REST + realtime backend")]
struct Args {
    /// Path to the config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::load_from(&args.config)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let records = Arc::new(MemoryRecords::new());
    let state = AppState::new(records, settings);

    let app = router::create_router(state.clone());

    let addr = state.settings.bind_addr;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, deployment = ?state.settings.deployment, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
