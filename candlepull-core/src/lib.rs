//! candlepull core: historical candle download pipeline.
//!
//! This crate contains the fetch-partition-write pipeline:
//! - Domain types (candles, instruments, venues, periods)
//! - Date-range partitioning (calendar months, quarterly futures rolls)
//! - Paginated ISS client with column-name-indexed CSV parsing
//! - Per-instrument flat-file output with append or replace semantics
//! - Bounded-concurrency orchestration across instruments
//! - TOML run configuration

pub mod config;
pub mod data;
pub mod domain;

pub use config::{ConfigError, DownloadConfig};
