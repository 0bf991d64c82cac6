use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use archivist::api::server;
use archivist::archive::client::HttpArchiveClient;
use archivist::config::{self, Settings};
use archivist::db::sqlite::open_database;
use archivist::reasoning::client::HttpReasoningClient;
use archivist::scheduler::poller;
use archivist::state::AppState;

/// Request timeout for archive calls (downloads included).
const ARCHIVE_TIMEOUT_SECS: u64 = 60;
/// Reasoning calls read whole documents; give them room.
const REASONING_TIMEOUT_SECS: u64 = 300;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("archivist starting v{}", config::APP_VERSION);

    if let Err(e) = run() {
        tracing::error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Synchronous setup happens before the async runtime exists: the
    // collaborator clients are blocking and live on the poller thread.
    let settings = Settings::from_env()?;

    let conn = open_database(&settings.db_path())?;
    let archive = Arc::new(HttpArchiveClient::new(
        &settings.archive_url,
        &settings.archive_token,
        ARCHIVE_TIMEOUT_SECS,
    ));
    let reasoning = Arc::new(HttpReasoningClient::new(
        &settings.reasoning_base_url,
        &settings.reasoning_api_key,
        settings.max_answer_tokens,
        REASONING_TIMEOUT_SECS,
    )?);

    let state = Arc::new(AppState::new(settings, archive, reasoning, conn));

    // Eager cache load; without it nothing resolves.
    state.refresh_cache()?;

    let poller_handle = poller::start(state.clone());

    // The async runtime only carries the HTTP surface.
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let api = server::start(state.clone()).await?;
        tracing::info!(addr = %api.addr, "ready");

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting down");
        api.shutdown().await;
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    poller_handle.shutdown();
    Ok(())
}
