//! Configuration file parser for `config/config.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown sections are ignored by serde, though we log a warning when the
//! file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which address family leads the combined `all` playlists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredProtocol {
    Ipv4,
    Ipv6,
    /// Keep the classifier's order untouched.
    Both,
}

/// Top-level application configuration.
///
/// All sections use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub main: MainConfig,
    pub paths: PathsConfig,
    pub fetcher: FetcherConfig,
    pub tester: TesterConfig,
    pub matcher: MatcherConfig,
    pub performance: PerformanceConfig,
    pub exporter: ExporterConfig,
    pub url_filter: UrlFilterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    pub output_dir: PathBuf,
    pub preferred_protocol: PreferredProtocol,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            preferred_protocol: PreferredProtocol::Ipv6,
        }
    }
}

/// Input and report file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Source list, one playlist URL per line.
    pub sources: PathBuf,
    pub template: PathBuf,
    pub whitelist: PathBuf,
    pub blacklist: PathBuf,
    pub failed_urls: PathBuf,
    pub uncategorized: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: PathBuf::from("config/urls.txt"),
            template: PathBuf::from("config/templates.txt"),
            whitelist: PathBuf::from("config/whitelist.txt"),
            blacklist: PathBuf::from("config/blacklist.txt"),
            failed_urls: PathBuf::from("config/failed_urls.txt"),
            uncategorized: PathBuf::from("config/uncategorized_channels.txt"),
        }
    }
}

/// Source fetching limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_secs: f64,
    pub concurrency: usize,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Backoff before retry `n` is `retry_base_secs + n` seconds.
    pub retry_base_secs: f64,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15.0,
            concurrency: 5,
            retries: 2,
            retry_base_secs: 1.0,
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs_f64(self.retry_base_secs.max(0.0))
    }
}

/// Stream speed test limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    pub timeout_secs: f64,
    pub concurrency: usize,
    pub max_attempts: u32,
    /// Minimum throughput in KB/s for a stream to count as online.
    pub min_download_speed: f64,
    pub retry_delay_ms: u64,
    pub chunk_size: usize,
    pub chunk_pause_ms: u64,
    /// Log every probe outcome at info/warn level.
    pub enable_logging: bool,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            concurrency: 4,
            max_attempts: 3,
            min_download_speed: 0.01,
            retry_delay_ms: 1000,
            chunk_size: 500,
            chunk_pause_ms: 100,
            enable_logging: false,
        }
    }
}

impl TesterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Trim, collapse whitespace and turn `_`/`-` into spaces before matching.
    pub clean_names: bool,
    /// Trace every classification decision at debug level.
    pub debug: bool,
    /// Probe and export channels that matched no template category.
    pub keep_uncategorized: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            clean_names: true,
            debug: false,
            keep_uncategorized: false,
        }
    }
}

/// Batch classification tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub batch_threshold: usize,
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 1000,
            batch_size: 2000,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub epg_url: String,
    /// Logo URL template; `{name}` is replaced by the percent-encoded channel name.
    pub logo_url: String,
    pub m3u_filename: String,
    pub txt_filename: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            epg_url: "http://epg.51zmt.top:8000/cc.xml.gz".to_string(),
            logo_url: String::new(),
            m3u_filename: "all.m3u".to_string(),
            txt_filename: "all.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UrlFilterConfig {
    /// Query parameters stripped from every parsed stream URL.
    pub remove_params: Vec<String>,
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_SECTIONS: [&'static str; 8] = [
        "main",
        "paths",
        "fetcher",
        "tester",
        "matcher",
        "performance",
        "exporter",
        "url_filter",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown sections → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_SECTIONS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown section in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            output_dir = %config.main.output_dir.display(),
            fetch_concurrency = config.fetcher.concurrency,
            probe_concurrency = config.tester.concurrency,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
