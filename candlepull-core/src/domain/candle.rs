//! Candle: the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV candle for a single ticker and interval.
///
/// The timestamp is the interval's `begin` as reported by the source, with no
/// timezone attached. Prices are not validated; candles are kept in the order
/// the source returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub begin: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// Render as one output row: `YYYYMMDD,HH:MM:SS,open,high,low,close,volume`.
    ///
    /// `f64` display gives the shortest representation that round-trips.
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.begin.format("%Y%m%d"),
            self.begin.format("%H:%M:%S"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}
