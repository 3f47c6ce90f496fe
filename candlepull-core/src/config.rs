//! Download configuration: instrument universe and run settings.
//!
//! Stored as TOML. Every setting except the instrument list has a default, so
//! a minimal file is just a list of `[[instruments]]` tables.

use crate::data::download::DownloadOptions;
use crate::data::iss::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use crate::domain::{Instrument, Venue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Years outside this range are rejected at load time.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1990..=2100;

/// Complete configuration for one download run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between periods within one worker, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Candle interval code passed to the source.
    #[serde(default = "default_interval")]
    pub interval: u32,

    /// A page with fewer rows than this ends pagination.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub cancel_on_failure: bool,

    /// Per-request timeout. Unset means no timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    pub instruments: Vec<Instrument>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("moex_data")
}

fn default_concurrency() -> usize {
    4
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_interval() -> u32 {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const MOEX_SHARES: [&str; 4] = ["SBER", "GAZP", "LKOH", "GMKN"];

const MOEX_FUTURES: [&str; 30] = [
    "Si", "BR", "RI", "SR", "GZ", "LK", "MX", "GD", "RN", "VB", "MG", "SN", "NL", "MT", "GM", "TT",
    "PL", "CH", "YN", "AL", "ME", "FV", "PO", "PH", "TN", "AF", "NV", "PK", "RU", "HY",
];

impl DownloadConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in MOEX universe: four blue-chip shares from 2010 and thirty
    /// futures roots from 2016, through 2026.
    pub fn default_moex() -> Self {
        let shares = MOEX_SHARES
            .iter()
            .map(|t| Instrument::equity(*t, Venue::moex_shares(), 2010, 2026));
        let futures = MOEX_FUTURES
            .iter()
            .map(|t| Instrument::derivative(*t, Venue::moex_futures(), 2016, 2026));

        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            interval: default_interval(),
            page_size: default_page_size(),
            base_url: default_base_url(),
            cancel_on_failure: false,
            request_timeout_secs: None,
            instruments: shares.chain(futures).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("no instruments configured".into()));
        }

        let mut seen = HashSet::new();
        for inst in &self.instruments {
            if inst.ticker.trim().is_empty() {
                return Err(ConfigError::Invalid("instrument with empty ticker".into()));
            }
            if !seen.insert(inst.ticker.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instrument '{}'",
                    inst.ticker
                )));
            }
            if inst.year_start > inst.year_end {
                return Err(ConfigError::Invalid(format!(
                    "{}: year_start {} is after year_end {}",
                    inst.ticker, inst.year_start, inst.year_end
                )));
            }
            if !YEAR_RANGE.contains(&inst.year_start) || !YEAR_RANGE.contains(&inst.year_end) {
                return Err(ConfigError::Invalid(format!(
                    "{}: years must fall within {}..={}",
                    inst.ticker,
                    YEAR_RANGE.start(),
                    YEAR_RANGE.end()
                )));
            }
        }
        Ok(())
    }

    /// Keep only the listed tickers. An empty filter keeps everything.
    pub fn retain_tickers(&mut self, only: &[String]) -> Result<(), ConfigError> {
        if only.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = only
            .iter()
            .find(|t| !self.instruments.iter().any(|i| &i.ticker == *t))
        {
            return Err(ConfigError::Invalid(format!("unknown instrument '{unknown}'")));
        }
        self.instruments.retain(|i| only.contains(&i.ticker));
        Ok(())
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            concurrency: self.concurrency,
            request_delay: Duration::from_millis(self.request_delay_ms),
            interval: self.interval,
            cancel_on_failure: self.cancel_on_failure,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
