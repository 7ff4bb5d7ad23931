// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lists;
pub mod metrics;
pub mod monitor;
pub mod scouting;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::{ConfigHandle, GameConfig};
pub use crate::error::ApiError;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Env var switching log output to JSON lines (`1`).
pub const ENV_LOG_JSON: &str = "SCOUT_LOG_JSON";

/// Installs the global subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scout_dashboard=info,warn"));
    let json = std::env::var(ENV_LOG_JSON).is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
