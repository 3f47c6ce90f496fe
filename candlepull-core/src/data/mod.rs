//! Data acquisition and persistence

pub mod download;
pub mod iss;
pub mod partition;
pub mod provider;
pub mod sink;

pub use download::{
    download_instruments, DownloadOptions, DownloadSummary, InstrumentReport, Operation, RunError,
    WorkerError, WorkerOutcome, WorkerStats,
};
pub use iss::{IssClient, ReqwestTransport, Transport};
pub use partition::{contract_ticker, partition, periods_for, third_friday};
pub use provider::{
    CandleQuery, CandleSource, DataError, DownloadProgress, ErrorKind, SilentProgress,
    TracingProgress,
};
pub use sink::{OutputSink, SeriesFile, HEADER};
