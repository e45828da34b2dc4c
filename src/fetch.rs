//! Guide downloads over HTTP(S)
//! Supports both plain XML and gzip-compressed (.xml.gz) bodies

use crate::error::{EpgError, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Anything that can turn a URL into feed text
pub trait Fetch: Sync {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: concat!("epg-merge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Blocking fetcher backed by a ureq agent
pub struct HttpFetcher {
    agent: ureq::Agent,
    config: DownloadConfig,
}

impl HttpFetcher {
    pub fn new(config: DownloadConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .max_idle_connections(4)
            .max_idle_connections_per_host(2)
            .build()
            .new_agent();
        Self { agent, config }
    }

    fn fail(url: &str, reason: impl Into<String>) -> EpgError {
        EpgError::Fetch { url: url.to_string(), reason: reason.into() }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        info!("Downloading {}", url);
        let response = self
            .agent
            .get(url)
            .header("User-Agent", &self.config.user_agent)
            .call()
            .map_err(|e| Self::fail(url, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::fail(url, format!("HTTP error: {}", status)));
        }

        let mut body = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| Self::fail(url, format!("Read failed: {}", e)))?;

        decode_body(&body).map_err(|e| Self::fail(url, format!("Gzip decode failed: {}", e)))
    }
}

/// Turn a raw body into text, inflating it first if it carries the gzip magic (1f 8b)
pub fn decode_body(bytes: &[u8]) -> std::io::Result<String> {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut inflated = Vec::with_capacity(bytes.len() * 8);
        GzDecoder::new(bytes).read_to_end(&mut inflated)?;
        Ok(String::from_utf8_lossy(&inflated).into_owned())
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Fetch every URL using up to `jobs` worker threads.
///
/// Results always come back in the order of `urls`, whatever order the
/// downloads finish in.
pub fn fetch_all<F: Fetch + ?Sized>(fetcher: &F, urls: &[&str], jobs: usize) -> Vec<Result<String>> {
    let jobs = jobs.clamp(1, urls.len().max(1));
    if jobs == 1 {
        return urls.iter().map(|url| fetcher.fetch(url)).collect();
    }

    let next = AtomicUsize::new(0);
    let done: Mutex<Vec<(usize, Result<String>)>> = Mutex::new(Vec::with_capacity(urls.len()));

    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                let Some(url) = urls.get(idx) else { break };
                let result = fetcher.fetch(url);
                if let Ok(mut guard) = done.lock() {
                    guard.push((idx, result));
                }
            });
        }
    });

    let mut done = done.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    done.sort_by_key(|(idx, _)| *idx);
    done.into_iter().map(|(_, result)| result).collect()
}
