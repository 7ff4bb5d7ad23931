//! Workbook download from a cloud share link.
//!
//! Share links answer with an HTML viewer page; the direct file URL sits in
//! an inline script as `"FileGetUrl":"…"`. The workbook is fetched from there
//! and swapped into place atomically so readers never see a partial file.

pub mod scheduler;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, gauge};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fs, path::Path, time::Duration};
use tracing::info;

use crate::{
    config::ConfigHandle,
    metrics::{WORKBOOK_DOWNLOADS, WORKBOOK_DOWNLOAD_ERRORS, WORKBOOK_LAST_DOWNLOAD},
};

pub use scheduler::spawn_periodic_download;

static RE_FILE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"FileGetUrl"\s*:\s*"([^"]+)""#).expect("file url regex"));

/// Zip local-file header; every `.xlsx` starts with it.
const XLSX_MAGIC: &[u8] = b"PK\x03\x04";

/// Direct download URL embedded in a share page, if any.
pub fn extract_file_url(html: &str) -> Option<String> {
    let raw = RE_FILE_URL.captures(html)?.get(1)?.as_str();
    let unescaped = raw.replace("\\u0026", "&").replace("\\/", "/");
    let decoded = html_escape::decode_html_entities(&unescaped).into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

/// Anything that can produce the raw bytes of the scouting workbook.
#[async_trait]
pub trait WorkbookSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;

    fn describe(&self) -> String {
        "workbook source".to_string()
    }
}

enum Target {
    Fixed(String),
    /// `server.excel_url`, read at fetch time so edits apply without restart.
    Config(ConfigHandle),
}

pub struct ShareLinkSource {
    target: Target,
    http: reqwest::Client,
}

impl ShareLinkSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_target(Target::Fixed(url.into()))
    }

    pub fn from_config(config: ConfigHandle) -> Result<Self> {
        Self::with_target(Target::Config(config))
    }

    fn with_target(target: Target) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("scout-dashboard/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building http client")?;
        Ok(Self { target, http })
    }

    fn url(&self) -> String {
        match &self.target {
            Target::Fixed(u) => u.clone(),
            Target::Config(c) => c.snapshot().server.excel_url,
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl WorkbookSource for ShareLinkSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        let url = self.url();
        if url.trim().is_empty() {
            return Err(anyhow!("server.excel_url is not configured"));
        }

        let page = self.get_bytes(&url).await?;
        // Some links redirect straight to the file.
        if page.starts_with(XLSX_MAGIC) {
            return Ok(page);
        }

        let html = String::from_utf8_lossy(&page);
        let file_url = extract_file_url(&html)
            .ok_or_else(|| anyhow!("failed to find the Excel file URL in the share page"))?;
        self.get_bytes(&file_url).await
    }

    fn describe(&self) -> String {
        self.url()
    }
}

async fn fetch_into(source: &dyn WorkbookSource, dest: &Path) -> Result<usize> {
    let bytes = source.fetch().await?;
    if bytes.is_empty() {
        return Err(anyhow!("downloaded workbook is empty"));
    }
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = dest.with_extension("xlsx.part");
    fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, dest).with_context(|| format!("replacing {}", dest.display()))?;
    Ok(bytes.len())
}

/// Download once and replace `dest`. Returns the number of bytes written.
pub async fn download_once(source: &dyn WorkbookSource, dest: &Path) -> Result<usize> {
    let result = fetch_into(source, dest).await;
    match &result {
        Ok(len) => {
            counter!(WORKBOOK_DOWNLOADS).increment(1);
            gauge!(WORKBOOK_LAST_DOWNLOAD).set(chrono::Utc::now().timestamp() as f64);
            info!(target: "ingest", bytes = *len, dest = %dest.display(), "downloaded workbook");
        }
        Err(_) => counter!(WORKBOOK_DOWNLOAD_ERRORS).increment(1),
    }
    result
}

/// Download only when `dest` does not exist yet. Returns true when a download happened.
pub async fn ensure_workbook(source: &dyn WorkbookSource, dest: &Path) -> Result<bool> {
    if dest.exists() {
        return Ok(false);
    }
    download_once(source, dest).await.map(|_| true)
}
