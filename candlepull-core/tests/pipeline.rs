//! Integration tests for the download pipeline: partition → ISS client →
//! output sink, driven by the orchestrator against a scripted transport.

use candlepull_core::data::{
    download_instruments, DataError, DownloadOptions, DownloadSummary, ErrorKind, IssClient,
    Operation, OutputSink, SilentProgress, Transport, WorkerOutcome, HEADER,
};
use candlepull_core::domain::{Instrument, Venue};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers every request from a closure and records the URLs it saw.
struct ScriptedTransport<F> {
    respond: F,
    urls: Mutex<Vec<String>>,
}

impl<F> ScriptedTransport<F>
where
    F: Fn(&str) -> Result<String, DataError> + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            urls: Mutex::new(Vec::new()),
        }
    }

    fn urls_for(&self, ticker: &str) -> Vec<String> {
        let needle = format!("/securities/{ticker}/");
        self.urls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(&needle))
            .cloned()
            .collect()
    }
}

impl<F> Transport for ScriptedTransport<F>
where
    F: Fn(&str) -> Result<String, DataError> + Send + Sync,
{
    fn get(&self, url: &str) -> Result<String, DataError> {
        self.urls.lock().unwrap().push(url.to_string());
        (self.respond)(url)
    }
}

fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
    let key = format!("{name}=");
    url.split(|c: char| c == '?' || c == '&')
        .find_map(|part| part.strip_prefix(key.as_str()))
        .unwrap()
}

fn ticker_of(url: &str) -> &str {
    url.split("/securities/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap()
}

/// Three one-minute candles on the period's first day; a malformed volume for
/// any ticker starting with "BAD".
fn three_candles(url: &str) -> Result<String, DataError> {
    let from = query_param(url, "from");
    let volume = if ticker_of(url).starts_with("BAD") {
        "12x"
    } else {
        "10"
    };
    let mut body = String::from("candles\n\nopen;close;high;low;value;volume;begin;end\n");
    for minute in 0..3 {
        body.push_str(&format!(
            "100.5;101;101.25;100;1000;{volume};{from} 10:0{minute}:00;{from} 10:0{minute}:59\n"
        ));
    }
    Ok(body)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn options(concurrency: usize) -> DownloadOptions {
    DownloadOptions {
        concurrency,
        request_delay: Duration::ZERO,
        interval: 1,
        cancel_on_failure: false,
    }
}

fn shares(ticker: &str) -> Instrument {
    Instrument::equity(ticker, Venue::moex_shares(), 2024, 2024)
}

fn run<F>(
    client: &IssClient<ScriptedTransport<F>>,
    sink: &OutputSink,
    instruments: &[Instrument],
    today: NaiveDate,
    options: &DownloadOptions,
) -> DownloadSummary
where
    F: Fn(&str) -> Result<String, DataError> + Send + Sync,
{
    download_instruments(client, sink, instruments, today, options, &SilentProgress).unwrap()
}

fn read_lines(sink: &OutputSink, id: &str) -> Vec<String> {
    std::fs::read_to_string(sink.file_path(id))
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn equities_are_written_month_by_month() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));

    let summary = run(&client, &sink, &[shares("SBER")], date(2024, 3, 20), &options(4));

    assert!(summary.all_succeeded());
    assert_eq!(summary.records_written(), 9);

    let lines = read_lines(&sink, "SBER");
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines[1], "20240101,10:00:00,100.5,101.25,100,101,10");
    assert_eq!(lines[4], "20240201,10:00:00,100.5,101.25,100,101,10");
    assert_eq!(lines.len(), 10);
}

#[test]
fn periods_are_requested_in_chronological_order() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));

    run(
        &client,
        &sink,
        &[shares("SBER"), shares("GAZP")],
        date(2024, 12, 31),
        &options(2),
    );

    let froms: Vec<String> = client
        .transport()
        .urls_for("SBER")
        .iter()
        .map(|u| query_param(u, "from").to_string())
        .collect();
    assert_eq!(froms.len(), 12);
    let mut sorted = froms.clone();
    sorted.sort();
    assert_eq!(froms, sorted);
}

#[test]
fn malformed_cell_fails_only_its_own_instrument() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));
    let instruments = [shares("SBER"), shares("BADX"), shares("GAZP")];

    let summary = run(&client, &sink, &instruments, date(2024, 2, 15), &options(4));

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);

    let failure = summary.first_failure().unwrap();
    assert_eq!(failure.instrument, "BADX");
    assert_eq!(failure.operation, Operation::Fetch);
    assert_eq!(failure.source.kind(), ErrorKind::Parse);
    assert_eq!(failure.period.as_ref().unwrap().start, date(2024, 1, 1));

    // Siblings wrote both months; the failing worker wrote nothing past its header.
    assert_eq!(read_lines(&sink, "SBER").len(), 7);
    assert_eq!(read_lines(&sink, "GAZP").len(), 7);
    assert_eq!(read_lines(&sink, "BADX"), vec![HEADER.to_string()]);

    let err = summary.into_result().unwrap_err();
    assert_eq!(err.instrument, "BADX");
}

#[test]
fn network_failure_is_wrapped_with_context() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(|url: &str| {
        Err(DataError::HttpStatus {
            status: 502,
            url: url.to_string(),
        })
    }));

    let summary = run(&client, &sink, &[shares("LKOH")], date(2024, 6, 1), &options(1));

    let err = summary.first_failure().unwrap();
    assert_eq!(err.source.kind(), ErrorKind::Network);
    let message = err.to_string();
    assert!(message.starts_with("LKOH: fetch LKOH 2024-01-01..2024-01-31 failed"), "{message}");
    // No retry: one request, then the worker stops.
    assert_eq!(client.transport().urls_for("LKOH").len(), 1);
}

#[test]
fn derivative_rerun_replaces_previous_series() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));
    let si = [Instrument::derivative("Si", Venue::moex_futures(), 2024, 2025)];
    let today = date(2024, 4, 1);

    run(&client, &sink, &si, today, &options(1));
    let first = read_lines(&sink, "Si");

    std::fs::write(
        sink.file_path("Si"),
        format!("{}\n19990101,00:00:00,1,1,1,1,1\n", first.join("\n")),
    )
    .unwrap();
    run(&client, &sink, &si, today, &options(1));
    let second = read_lines(&sink, "Si");

    assert_eq!(first, second);
    assert_eq!(second.len(), 1 + 2 * 3);
    assert!(second.iter().all(|l| !l.starts_with("1999")));

    let tickers: Vec<String> = client
        .transport()
        .urls_for("SiH4")
        .into_iter()
        .chain(client.transport().urls_for("SiM4"))
        .collect();
    assert_eq!(tickers.len(), 4);
}

#[test]
fn equity_rerun_appends_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));
    let sber = [shares("SBER")];
    let today = date(2024, 1, 15);

    run(&client, &sink, &sber, today, &options(1));
    run(&client, &sink, &sber, today, &options(1));

    let lines = read_lines(&sink, "SBER");
    assert_eq!(lines.iter().filter(|l| l.as_str() == HEADER).count(), 1);
    assert_eq!(lines.len(), 1 + 2 * 3);
    assert_eq!(lines[1], lines[4]);
}

#[test]
fn siblings_keep_running_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));
    let instruments = [shares("BADX"), shares("SBER")];

    let summary = run(&client, &sink, &instruments, date(2024, 3, 1), &options(1));

    assert!(matches!(summary.reports[0].outcome, WorkerOutcome::Failed(..)));
    assert!(matches!(summary.reports[1].outcome, WorkerOutcome::Completed(_)));
}

#[test]
fn cancel_on_failure_stops_later_instruments() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));
    let instruments = [shares("BADX"), shares("SBER")];
    let opts = DownloadOptions {
        cancel_on_failure: true,
        ..options(1)
    };

    let summary = run(&client, &sink, &instruments, date(2024, 3, 1), &opts);

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.cancelled(), 1);
    match &summary.reports[1].outcome {
        WorkerOutcome::Cancelled(stats) => assert_eq!(stats.records, 0),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(client.transport().urls_for("SBER").is_empty());
}

#[test]
fn concurrency_cap_bounds_in_flight_fetches() {
    let in_flight = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(|url: &str| {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(10));
        in_flight.fetch_sub(1, Ordering::SeqCst);
        three_candles(url)
    }));
    let instruments: Vec<Instrument> = ["A1", "A2", "A3", "A4", "A5", "A6"]
        .into_iter()
        .map(shares)
        .collect();

    let summary = run(&client, &sink, &instruments, date(2024, 2, 1), &options(2));

    assert!(summary.all_succeeded());
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn cancelled_derivative_keeps_its_previous_series() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(three_candles));
    let previous = format!("{HEADER}\n20230101,10:00:00,1,1,1,1,1\n");
    std::fs::write(sink.file_path("Si"), &previous).unwrap();

    let instruments = [
        shares("BADX"),
        Instrument::derivative("Si", Venue::moex_futures(), 2024, 2025),
    ];
    let opts = DownloadOptions {
        cancel_on_failure: true,
        ..options(1)
    };

    let summary = run(&client, &sink, &instruments, date(2024, 4, 1), &opts);

    assert!(matches!(summary.reports[1].outcome, WorkerOutcome::Cancelled(_)));
    assert_eq!(std::fs::read_to_string(sink.file_path("Si")).unwrap(), previous);
    assert!(client.transport().urls_for("SiH4").is_empty());
}

#[test]
fn failed_worker_counts_periods_written_before_the_failure() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path());
    let client = IssClient::new(ScriptedTransport::new(|url: &str| {
        if query_param(url, "from") == "2024-02-01" {
            Err(DataError::Network("connection reset".into()))
        } else {
            three_candles(url)
        }
    }));

    let summary = run(&client, &sink, &[shares("VTBR")], date(2024, 3, 1), &options(1));

    match &summary.reports[0].outcome {
        WorkerOutcome::Failed(err, stats) => {
            assert_eq!(err.period.as_ref().unwrap().start, date(2024, 2, 1));
            assert_eq!(stats.periods_written, 1);
            assert_eq!(stats.records, 3);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(summary.records_written(), 3);
    assert_eq!(read_lines(&sink, "VTBR").len(), 1 + 3);
}
