use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange venue: the engine/market/board triple used to address a security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub engine: String,
    pub market: String,
    pub board: String,
}

impl Venue {
    pub fn new(
        engine: impl Into<String>,
        market: impl Into<String>,
        board: impl Into<String>,
    ) -> Self {
        Self {
            engine: engine.into(),
            market: market.into(),
            board: board.into(),
        }
    }

    /// Spot shares main board.
    pub fn moex_shares() -> Self {
        Self::new("stock", "shares", "TQBR")
    }

    /// Futures board.
    pub fn moex_futures() -> Self {
        Self::new("futures", "forts", "RFUD")
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.engine, self.market, self.board)
    }
}

/// Instrument class. Selects the partition strategy, contract naming, and
/// the output reset policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// Spot equity, queried month by month under its own ticker.
    Equity,
    /// Expiring futures root, queried per quarterly roll period under the
    /// synthesized contract ticker.
    Derivative,
}

/// What happens to an existing output file when a worker starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Keep existing content and append after it.
    Append,
    /// Delete the file and start a fresh series.
    Replace,
}

impl InstrumentClass {
    pub fn reset_policy(self) -> ResetPolicy {
        match self {
            InstrumentClass::Equity => ResetPolicy::Append,
            InstrumentClass::Derivative => ResetPolicy::Replace,
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentClass::Equity => f.write_str("equity"),
            InstrumentClass::Derivative => f.write_str("derivative"),
        }
    }
}

/// An instrument to download: ticker (or futures root), venue, class, and the
/// year range its periods are drawn from.
///
/// For equities `year_end` is inclusive; for derivatives it is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub class: InstrumentClass,
    #[serde(flatten)]
    pub venue: Venue,
    pub year_start: i32,
    pub year_end: i32,
}

impl Instrument {
    pub fn equity(
        ticker: impl Into<String>,
        venue: Venue,
        year_start: i32,
        year_end: i32,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            class: InstrumentClass::Equity,
            venue,
            year_start,
            year_end,
        }
    }

    pub fn derivative(
        root: impl Into<String>,
        venue: Venue,
        year_start: i32,
        year_end: i32,
    ) -> Self {
        Self {
            ticker: root.into(),
            class: InstrumentClass::Derivative,
            venue,
            year_start,
            year_end,
        }
    }
}
