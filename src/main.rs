//! Scouting dashboard binary entrypoint.
//! Boots the Axum HTTP server, the config watcher and the workbook downloader.

use anyhow::Context;
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

use scout_dashboard::{
    assistant::LocalModel,
    auth::SessionStore,
    config::start_hot_reload_thread,
    ingest::{spawn_periodic_download, ShareLinkSource, WorkbookSource},
    init_tracing, router, AppState, ConfigHandle,
};

const ENV_PORT: &str = "SCOUT_PORT";
const ENV_DATA_DIR: &str = "SCOUT_DATA_DIR";
const ENV_STATIC_DIR: &str = "SCOUT_STATIC_DIR";
const ENV_SESSION_SECRET: &str = "SCOUT_SESSION_SECRET";
const CONFIG_POLL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = ConfigHandle::from_env();
    start_hot_reload_thread(config.clone(), CONFIG_POLL);
    let cfg = config.snapshot();

    let data_dir = env::var(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let static_dir = env::var(ENV_STATIC_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("static"));

    let sessions = match env::var(ENV_SESSION_SECRET) {
        Ok(secret) if !secret.is_empty() => SessionStore::with_secret(secret.as_bytes()),
        _ => {
            info!(target: "auth", "no session secret set, remember-me cookies end with this process");
            SessionStore::new()
        }
    };

    let mut state = AppState::new(config.clone(), data_dir)
        .with_static_dir(static_dir)
        .with_sessions(sessions)
        .with_model(LocalModel::from_settings(&cfg.ai));

    if cfg.server.scanner_device {
        info!(target: "ingest", "scanner device, workbook is never downloaded");
    } else {
        let source: Arc<dyn WorkbookSource> = Arc::new(ShareLinkSource::from_config(config.clone())?);
        state = state.with_source(source.clone());
        if cfg.server.excel_url.trim().is_empty() {
            warn!(target: "ingest", "server.excel_url is empty, downloads will fail until it is set");
        }
        spawn_periodic_download(config.clone(), source, state.workbook_path());
    }

    let port = env::var(ENV_PORT)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(cfg.server.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, game = %cfg.game_name, require_login = cfg.server.require_login, "scout dashboard listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("http server")?;
    Ok(())
}
