use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transport::CurlOptions;

/// Backoff between reissues of a failed range request (`[retry]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 30_000,
        }
    }
}

/// Configuration loaded from `~/.config/sdm/config.toml`. CLI flags override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdmConfig {
    /// Concurrent range requests per download.
    pub threads: usize,
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Consecutive failures tolerated per task; absent means retry forever.
    pub max_retries: Option<u32>,
    /// Pause before retrying a failed disk write.
    pub write_retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    /// Proxy URL passed to libcurl (e.g. `http://127.0.0.1:8080`).
    pub proxy: Option<String>,
    /// Kept last so the table serializes after the plain keys.
    pub retry: RetryConfig,
}

impl Default for SdmConfig {
    fn default() -> Self {
        Self {
            threads: 32,
            chunk_size: 1024 * 1024,
            max_retries: None,
            write_retry_delay_ms: 1000,
            connect_timeout_secs: 30,
            proxy: None,
            retry: RetryConfig::default(),
        }
    }
}

impl SdmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn curl_options(&self) -> CurlOptions {
        CurlOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..CurlOptions::default()
        }
    }

    pub fn write_retry_delay(&self) -> Duration {
        Duration::from_millis(self.write_retry_delay_ms)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SdmConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<SdmConfig> {
    if !path.exists() {
        let default_cfg = SdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SdmConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
