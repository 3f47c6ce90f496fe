//! MOEX ISS candle client.
//!
//! Fetches candles from the `candles.csv` endpoint, following the `start` row
//! offset until a short page signals the end of the series. Each page is
//! semicolon-delimited: a block banner line, a column-name line, then data
//! rows. Columns are located by name on every page because the source does
//! not promise a stable order.

use super::provider::{CandleQuery, CandleSource, DataError};
use crate::domain::Candle;
use chrono::NaiveDateTime;
use csv::StringRecord;
use std::collections::HashMap;
use std::time::Duration;

/// Default ISS root.
pub const DEFAULT_BASE_URL: &str = "https://iss.moex.com/iss";

/// The source returns at most this many rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 500;

const BEGIN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single blocking GET returning the response body.
///
/// Implementations report connection failures as [`DataError::Network`] and
/// non-success status codes as [`DataError::HttpStatus`].
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<String, DataError>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build a client. `timeout` of `None` leaves requests unbounded.
    pub fn new(timeout: Option<Duration>) -> Result<Self, DataError> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("candlepull/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DataError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<String, DataError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::Network(format!("GET {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.text()
            .map_err(|e| DataError::Network(format!("reading body of {url}: {e}")))
    }
}

/// Paginating candle client for the ISS endpoint.
pub struct IssClient<T = ReqwestTransport> {
    transport: T,
    base_url: String,
    page_size: usize,
}

impl<T: Transport> IssClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Rows-per-page threshold; a page with fewer rows ends pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the candles URL for one page of a query.
    pub fn candles_url(&self, query: &CandleQuery, start: usize) -> String {
        format!(
            "{}/engines/{}/markets/{}/boards/{}/securities/{}/candles.csv\
             ?from={}&till={}&interval={}&start={start}",
            self.base_url,
            query.venue.engine,
            query.venue.market,
            query.venue.board,
            query.ticker,
            query.from.format("%Y-%m-%d"),
            query.till.format("%Y-%m-%d"),
            query.interval,
        )
    }

    /// Fetch every page of a query and concatenate the candles in request order.
    pub fn fetch_all(&self, query: &CandleQuery) -> Result<Vec<Candle>, DataError> {
        let mut candles = Vec::new();
        let mut start = 0;

        loop {
            let url = self.candles_url(query, start);
            tracing::debug!(%url, ticker = %query.ticker, start, "requesting page");

            let body = self.transport.get(&url)?;
            let page = parse_page(&body).map_err(|e| {
                DataError::Parse(format!("{} at offset {start}: {e}", query.ticker))
            })?;

            let rows = page.len();
            candles.extend(page);

            if rows < self.page_size {
                break;
            }
            start += rows;
        }

        Ok(candles)
    }
}

impl<T: Transport> CandleSource for IssClient<T> {
    fn name(&self) -> &str {
        "moex_iss"
    }

    fn fetch(&self, query: &CandleQuery) -> Result<Vec<Candle>, DataError> {
        self.fetch_all(query)
    }
}

/// Positions of the candle fields within one page's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnIndex {
    begin: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl ColumnIndex {
    fn from_header(header: &StringRecord) -> Result<Self, String> {
        let by_name: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name, idx))
            .collect();
        let lookup = |name: &str| {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| format!("missing column '{name}'"))
        };

        Ok(Self {
            begin: lookup("begin")?,
            open: lookup("open")?,
            high: lookup("high")?,
            low: lookup("low")?,
            close: lookup("close")?,
            volume: lookup("volume")?,
        })
    }

    fn decode(&self, row: &StringRecord, line: usize) -> Result<Candle, String> {
        let cell = |idx: usize, name: &str| {
            row.get(idx)
                .ok_or_else(|| format!("row {line}: no '{name}' cell"))
        };
        let price = |idx: usize, name: &str| -> Result<f64, String> {
            let raw = cell(idx, name)?;
            raw.parse::<f64>()
                .map_err(|e| format!("row {line}: bad {name} '{raw}': {e}"))
        };

        let raw_begin = cell(self.begin, "begin")?;
        let begin = NaiveDateTime::parse_from_str(raw_begin, BEGIN_FORMAT)
            .map_err(|e| format!("row {line}: bad begin '{raw_begin}': {e}"))?;

        let open = price(self.open, "open")?;
        let high = price(self.high, "high")?;
        let low = price(self.low, "low")?;
        let close = price(self.close, "close")?;

        let raw_volume = cell(self.volume, "volume")?;
        let volume = raw_volume
            .parse::<u64>()
            .map_err(|e| format!("row {line}: bad volume '{raw_volume}': {e}"))?;

        Ok(Candle {
            begin,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Parse one response page. The first record is the block banner and is
/// skipped; the second names the columns. Blank lines are ignored.
fn parse_page(body: &str) -> Result<Vec<Candle>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut records = reader.records();

    records
        .next()
        .ok_or("empty response")?
        .map_err(|e| format!("unreadable banner: {e}"))?;

    let header = records
        .next()
        .ok_or("response has no column header")?
        .map_err(|e| format!("unreadable column header: {e}"))?;
    let columns = ColumnIndex::from_header(&header)?;

    let mut candles = Vec::new();
    for (line, record) in records.enumerate() {
        let record = record.map_err(|e| format!("row {}: {e}", line + 1))?;
        candles.push(columns.decode(&record, line + 1)?);
    }
    Ok(candles)
}
