use chrono::NaiveDate;
use std::fmt;

/// One fetch unit: the ticker to query and the `from`/`till` dates sent to
/// the source. Both bounds are passed through as-is; the source treats them
/// as inclusive days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}..{}", self.ticker, self.start, self.end)
    }
}
