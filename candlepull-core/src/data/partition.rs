//! Date-range partitioning: turns an instrument's year range into the ordered
//! list of query periods.
//!
//! - Equities: one period per calendar month, `[first day, last day]`.
//! - Derivatives: one period per quarterly contract (H, M, U, Z), running from
//!   the day before the previous contract's third-Friday expiry to two days
//!   before this contract's expiry.
//!
//! Periods that would start after `today` are never emitted.

use crate::domain::{Instrument, InstrumentClass, Period};
use chrono::{Datelike, Days, Months, NaiveDate};

/// Quarterly expiry codes and their months, in roll order.
pub const QUARTER_CODES: [(char, u32); 4] = [('H', 3), ('M', 6), ('U', 9), ('Z', 12)];

/// Periods for an instrument, using its own class, ticker and year range.
pub fn periods_for(instrument: &Instrument, today: NaiveDate) -> Vec<Period> {
    partition(
        instrument.class,
        &instrument.ticker,
        instrument.year_start,
        instrument.year_end,
        today,
    )
}

/// Ordered, non-overlapping query periods for `ticker`.
///
/// `year_end` is inclusive for equities and exclusive for derivatives.
pub fn partition(
    class: InstrumentClass,
    ticker: &str,
    year_start: i32,
    year_end: i32,
    today: NaiveDate,
) -> Vec<Period> {
    match class {
        InstrumentClass::Equity => monthly_periods(ticker, year_start, year_end, today),
        InstrumentClass::Derivative => quarterly_roll_periods(ticker, year_start, year_end, today),
    }
}

/// One period per calendar month of `[year_start, year_end]`.
pub fn monthly_periods(
    ticker: &str,
    year_start: i32,
    year_end: i32,
    today: NaiveDate,
) -> Vec<Period> {
    let mut periods = Vec::new();
    for year in year_start..=year_end {
        for month in 1..=12 {
            let Some((start, end)) = month_bounds(year, month) else {
                continue;
            };
            if start > today {
                continue;
            }
            periods.push(Period::new(ticker, start, end));
        }
    }
    periods
}

/// One period per quarterly contract of every year in `[year_start, year_end)`.
pub fn quarterly_roll_periods(
    root: &str,
    year_start: i32,
    year_end: i32,
    today: NaiveDate,
) -> Vec<Period> {
    let mut periods = Vec::new();
    for year in year_start..year_end {
        for (code, month) in QUARTER_CODES {
            let Some((start, end)) = roll_bounds(year, month) else {
                continue;
            };
            if start > today {
                continue;
            }
            periods.push(Period::new(contract_ticker(root, code, year), start, end));
        }
    }
    periods
}

/// Contract ticker: root, expiry code, last digit of the year (`Si`, `H`, 2024 → `SiH4`).
pub fn contract_ticker(root: &str, code: char, year: i32) -> String {
    format!("{root}{code}{}", year.rem_euclid(10))
}

/// Third Friday of the month: the first Friday on or after the 15th.
pub fn third_friday(year: i32, month: u32) -> Option<NaiveDate> {
    let fifteenth = NaiveDate::from_ymd_opt(year, month, 15)?;
    let weekday = fifteenth.weekday().num_days_from_sunday();
    let days_to_friday = (5 + 7 - weekday) % 7;
    fifteenth.checked_add_days(Days::new(u64::from(days_to_friday)))
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

fn roll_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let (prev_year, prev_month) = if month == 3 {
        (year - 1, 12)
    } else {
        (year, month - 3)
    };
    let start = third_friday(prev_year, prev_month)?.checked_sub_days(Days::new(1))?;
    let end = third_friday(year, month)?.checked_sub_days(Days::new(2))?;
    Some((start, end))
}
