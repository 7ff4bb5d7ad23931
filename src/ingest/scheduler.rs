use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ConfigHandle;

use super::{download_once, WorkbookSource};

/// Re-download the workbook every `server.data_refresh_interval` seconds.
///
/// Scanner devices never download; `None` is returned and nothing is spawned.
/// The interval and the scanner flag are re-read from the config on every
/// tick, so hot-reloaded values apply without a restart.
pub fn spawn_periodic_download(
    config: ConfigHandle,
    source: Arc<dyn WorkbookSource>,
    dest: PathBuf,
) -> Option<JoinHandle<()>> {
    if config.snapshot().server.scanner_device {
        info!(target: "ingest", "scanner device, periodic download disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        loop {
            let server = config.snapshot().server;
            if !server.scanner_device {
                if let Err(e) = download_once(source.as_ref(), &dest).await {
                    warn!(target: "ingest", error = %e, source = %source.describe(), "workbook download failed, retrying next tick");
                }
            }
            tokio::time::sleep(Duration::from_secs(server.data_refresh_interval.max(1))).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::ingest::testing::StaticSource;

    fn config(scanner: bool) -> ConfigHandle {
        let mut cfg = GameConfig::default();
        cfg.server.scanner_device = scanner;
        cfg.server.data_refresh_interval = 1;
        ConfigHandle::with_config("unused.js", cfg)
    }

    #[tokio::test]
    async fn scanner_devices_do_not_download() {
        let dir = tempfile::tempdir().unwrap();
        let src = Arc::new(StaticSource::new(b"data"));
        let handle = spawn_periodic_download(config(true), src.clone(), dir.path().join("wb.xlsx"));
        assert!(handle.is_none());
        assert_eq!(src.calls(), 0);
    }

    #[tokio::test]
    async fn downloads_immediately_then_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("wb.xlsx");
        let src = Arc::new(StaticSource::new(b"data"));
        let handle = spawn_periodic_download(config(false), src.clone(), dest.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        assert!(src.calls() >= 2);
        assert!(dest.exists());
    }
}
