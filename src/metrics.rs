use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::warn;

pub const HTTP_REQUESTS: &str = "http_requests_total";
pub const WORKBOOK_DOWNLOADS: &str = "workbook_downloads_total";
pub const WORKBOOK_DOWNLOAD_ERRORS: &str = "workbook_download_errors_total";
pub const WORKBOOK_LAST_DOWNLOAD: &str = "workbook_last_download_ts";
pub const ASSISTANT_QUERIES: &str = "assistant_queries_total";
pub const CONFIG_RELOADS: &str = "config_reloads_total";

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the Prometheus recorder once per process; later calls share it.
    pub fn init() -> Self {
        let handle = HANDLE
            .get_or_init(|| {
                let handle = match PrometheusBuilder::new().install_recorder() {
                    Ok(h) => h,
                    Err(e) => {
                        // another recorder is already global; render an empty local one
                        warn!(target: "api", error = %e, "prometheus recorder not installed");
                        PrometheusBuilder::new().build_recorder().handle()
                    }
                };
                describe_counter!(HTTP_REQUESTS, "HTTP requests served");
                describe_counter!(WORKBOOK_DOWNLOADS, "Successful workbook downloads");
                describe_counter!(WORKBOOK_DOWNLOAD_ERRORS, "Failed workbook downloads");
                describe_gauge!(WORKBOOK_LAST_DOWNLOAD, "Unix time of the last successful download");
                describe_counter!(ASSISTANT_QUERIES, "Questions answered by the assistant");
                describe_counter!(CONFIG_RELOADS, "Game config reloads from disk");
                handle
            })
            .clone();
        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
