//! Download orchestrator: one worker per instrument on a bounded thread pool.
//!
//! Each worker walks its instrument's periods in chronological order:
//! fetch → append (when non-empty) → throttle sleep. The first error ends that
//! worker; siblings keep going unless `cancel_on_failure` is set, in which case
//! they stop before their next period.

use super::partition::periods_for;
use super::provider::{CandleQuery, CandleSource, DataError, DownloadProgress};
use super::sink::OutputSink;
use crate::domain::{Instrument, Period};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Knobs for one download run.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum number of instruments processed at once.
    pub concurrency: usize,
    /// Pause after every period, fetched or empty.
    pub request_delay: Duration,
    /// Candle interval passed to the source (1 = one minute).
    pub interval: u32,
    /// Stop remaining workers once any worker has failed.
    pub cancel_on_failure: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_delay: Duration::from_millis(100),
            interval: 1,
            cancel_on_failure: false,
        }
    }
}

/// The step a worker was on when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Prepare,
    Fetch,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Prepare => f.write_str("prepare output"),
            Operation::Fetch => f.write_str("fetch"),
            Operation::Write => f.write_str("write"),
        }
    }
}

/// A worker failure, with the instrument, period and step it happened in.
#[derive(Debug, Error)]
#[error("{instrument}: {operation}{} failed: {source}", describe_period(.period))]
pub struct WorkerError {
    pub instrument: String,
    pub period: Option<Period>,
    pub operation: Operation,
    #[source]
    pub source: DataError,
}

fn describe_period(period: &Option<Period>) -> String {
    match period {
        Some(p) => format!(" {p}"),
        None => String::new(),
    }
}

/// Errors that prevent a run from starting at all.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Per-worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub periods_written: usize,
    pub periods_empty: usize,
    pub records: usize,
}

/// Terminal state of one instrument worker.
#[derive(Debug)]
pub enum WorkerOutcome {
    Completed(WorkerStats),
    /// Periods written before the failure stay on disk and are counted.
    Failed(WorkerError, WorkerStats),
    /// Stopped before its next period because a sibling failed.
    Cancelled(WorkerStats),
}

/// One instrument's result within a run.
#[derive(Debug)]
pub struct InstrumentReport {
    pub instrument: String,
    pub outcome: WorkerOutcome,
}

/// Summary of a batch download, in instrument order.
#[derive(Debug)]
pub struct DownloadSummary {
    pub reports: Vec<InstrumentReport>,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, WorkerOutcome::Completed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, WorkerOutcome::Failed(..)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, WorkerOutcome::Cancelled(_)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }

    /// Candles written across every worker, including partial runs.
    pub fn records_written(&self) -> usize {
        self.reports
            .iter()
            .map(|r| match &r.outcome {
                WorkerOutcome::Completed(s)
                | WorkerOutcome::Failed(_, s)
                | WorkerOutcome::Cancelled(s) => s.records,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerError> {
        self.reports.iter().filter_map(|r| match &r.outcome {
            WorkerOutcome::Failed(e, _) => Some(e),
            _ => None,
        })
    }

    /// The run's error: the first failed worker in instrument order.
    pub fn first_failure(&self) -> Option<&WorkerError> {
        self.failures().next()
    }

    /// `Ok(self)` when no worker failed, otherwise the first failure.
    pub fn into_result(mut self) -> Result<Self, WorkerError> {
        let failed_at = self
            .reports
            .iter()
            .position(|r| matches!(r.outcome, WorkerOutcome::Failed(..)));
        match failed_at {
            Some(idx) => match self.reports.swap_remove(idx).outcome {
                WorkerOutcome::Failed(e, _) => Err(e),
                _ => unreachable!("position matched a failed outcome"),
            },
            None => Ok(self),
        }
    }

    fn count(&self, pred: impl Fn(&WorkerOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Download every instrument on a private pool of `options.concurrency` threads.
///
/// Blocks until every worker has reached a terminal state. Periods starting
/// after `today` are not requested.
pub fn download_instruments(
    source: &dyn CandleSource,
    sink: &OutputSink,
    instruments: &[Instrument],
    today: NaiveDate,
    options: &DownloadOptions,
    progress: &dyn DownloadProgress,
) -> Result<DownloadSummary, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.max(1))
        .thread_name(|i| format!("candlepull-worker-{i}"))
        .build()?;

    let cancelled = AtomicBool::new(false);
    let worker = Worker {
        source,
        sink,
        options,
        progress,
        cancelled: &cancelled,
    };

    tracing::info!(
        source = source.name(),
        instruments = instruments.len(),
        concurrency = options.concurrency,
        "starting download run"
    );

    let reports: Vec<InstrumentReport> = pool.install(|| {
        instruments
            .par_iter()
            .map(|instrument| InstrumentReport {
                instrument: instrument.ticker.clone(),
                outcome: worker.run(instrument, today),
            })
            .collect()
    });

    Ok(DownloadSummary { reports })
}

struct Worker<'a> {
    source: &'a dyn CandleSource,
    sink: &'a OutputSink,
    options: &'a DownloadOptions,
    progress: &'a dyn DownloadProgress,
    cancelled: &'a AtomicBool,
}

impl Worker<'_> {
    fn run(&self, instrument: &Instrument, today: NaiveDate) -> WorkerOutcome {
        let periods = periods_for(instrument, today);
        self.progress.on_start(&instrument.ticker, periods.len());

        let mut stats = WorkerStats::default();
        let outcome = match self.drive(instrument, &periods, &mut stats) {
            Ok(false) => WorkerOutcome::Completed(stats),
            Ok(true) => WorkerOutcome::Cancelled(stats),
            Err(e) => {
                if self.options.cancel_on_failure {
                    self.cancelled.store(true, Ordering::SeqCst);
                }
                WorkerOutcome::Failed(e, stats)
            }
        };

        let result = match &outcome {
            WorkerOutcome::Completed(stats) => Ok(stats.records),
            WorkerOutcome::Failed(e, _) => Err(e.to_string()),
            WorkerOutcome::Cancelled(_) => Err("cancelled after sibling failure".to_string()),
        };
        self.progress.on_finish(&instrument.ticker, &result);

        outcome
    }

    /// Returns whether the worker stopped early on cancellation.
    fn drive(
        &self,
        instrument: &Instrument,
        periods: &[Period],
        stats: &mut WorkerStats,
    ) -> Result<bool, WorkerError> {
        let id = instrument.ticker.as_str();
        let fail = |period: Option<&Period>, operation, source| WorkerError {
            instrument: id.to_string(),
            period: period.cloned(),
            operation,
            source,
        };

        // A Replace reset must not run for a worker that will never fetch.
        if self.is_cancelled() {
            tracing::info!(instrument = id, "skipping after sibling failure");
            return Ok(true);
        }

        let mut series = self
            .sink
            .ensure_ready(id, instrument.class.reset_policy())
            .map_err(|e| fail(None, Operation::Prepare, e))?;

        for period in periods {
            if self.is_cancelled() {
                tracing::info!(instrument = id, "stopping after sibling failure");
                return Ok(true);
            }

            let query = CandleQuery::for_period(&instrument.venue, period, self.options.interval);
            let candles = self
                .source
                .fetch(&query)
                .map_err(|e| fail(Some(period), Operation::Fetch, e))?;

            if candles.is_empty() {
                stats.periods_empty += 1;
                self.progress.on_period_empty(id, period);
            } else {
                series
                    .append(&candles)
                    .map_err(|e| fail(Some(period), Operation::Write, e))?;
                stats.periods_written += 1;
                stats.records += candles.len();
                self.progress.on_period_written(id, period, candles.len());
            }

            if !self.options.request_delay.is_zero() {
                std::thread::sleep(self.options.request_delay);
            }
        }

        Ok(false)
    }

    fn is_cancelled(&self) -> bool {
        self.options.cancel_on_failure && self.cancelled.load(Ordering::SeqCst)
    }
}
