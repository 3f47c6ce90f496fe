//! Candle source trait, progress observer, and structured error types.
//!
//! The CandleSource trait abstracts over where candles come from (the ISS
//! endpoint in production, scripted sources in tests) so the orchestrator can
//! be exercised without a network.

use crate::domain::{Candle, Period, Venue};
use chrono::NaiveDate;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for fetch and persistence operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Coarse error class, used for reporting and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    Filesystem,
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::Network(_) | DataError::HttpStatus { .. } => ErrorKind::Network,
            DataError::Parse(_) => ErrorKind::Parse,
            DataError::Filesystem { .. } => ErrorKind::Filesystem,
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DataError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Everything needed to request one period of candles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleQuery {
    pub venue: Venue,
    pub ticker: String,
    pub from: NaiveDate,
    pub till: NaiveDate,
    pub interval: u32,
}

impl CandleQuery {
    pub fn for_period(venue: &Venue, period: &Period, interval: u32) -> Self {
        Self {
            venue: venue.clone(),
            ticker: period.ticker.clone(),
            from: period.start,
            till: period.end,
            interval,
        }
    }
}

/// Trait for candle sources.
///
/// `fetch` returns every candle of the query window, in source order.
pub trait CandleSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch(&self, query: &CandleQuery) -> Result<Vec<Candle>, DataError>;
}

/// Progress callback for multi-instrument downloads.
pub trait DownloadProgress: Send + Sync {
    /// Called when a worker picks up an instrument.
    fn on_start(&self, instrument: &str, periods: usize);

    /// Called after a period's candles were appended to the output file.
    fn on_period_written(&self, instrument: &str, period: &Period, records: usize);

    /// Called when the source returned no candles for a period.
    fn on_period_empty(&self, instrument: &str, period: &Period);

    /// Called when a worker reaches a terminal state.
    fn on_finish(&self, instrument: &str, result: &Result<usize, String>);
}

/// Progress reporter that emits `tracing` events.
pub struct TracingProgress;

impl DownloadProgress for TracingProgress {
    fn on_start(&self, instrument: &str, periods: usize) {
        tracing::info!(instrument, periods, "starting download");
    }

    fn on_period_written(&self, instrument: &str, period: &Period, records: usize) {
        tracing::info!(
            instrument,
            ticker = %period.ticker,
            from = %period.start,
            till = %period.end,
            records,
            "wrote period"
        );
    }

    fn on_period_empty(&self, instrument: &str, period: &Period) {
        tracing::info!(
            instrument,
            ticker = %period.ticker,
            from = %period.start,
            till = %period.end,
            "no data for period"
        );
    }

    fn on_finish(&self, instrument: &str, result: &Result<usize, String>) {
        match result {
            Ok(records) => tracing::info!(instrument, records, "instrument complete"),
            Err(e) => tracing::warn!(instrument, error = %e, "instrument failed"),
        }
    }
}

/// Progress reporter that drops every event.
pub struct SilentProgress;

impl DownloadProgress for SilentProgress {
    fn on_start(&self, _instrument: &str, _periods: usize) {}
    fn on_period_written(&self, _instrument: &str, _period: &Period, _records: usize) {}
    fn on_period_empty(&self, _instrument: &str, _period: &Period) {}
    fn on_finish(&self, _instrument: &str, _result: &Result<usize, String>) {}
}
