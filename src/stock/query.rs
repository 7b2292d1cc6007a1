// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Turning validated tool arguments into a history query.

use chrono::NaiveDate;

use crate::mcp::{Arguments, ToolError};

/// Period used when the caller gives neither a period nor a full date range.
pub const DEFAULT_PERIOD: &str = "1mo";
/// Bar interval used when the caller gives none.
pub const DEFAULT_INTERVAL: &str = "1d";

/// Periods Yahoo accepts as a `range`.
pub const VALID_PERIODS: &[&str] = &[
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

/// Bar sizes Yahoo accepts as an `interval`.
pub const VALID_INTERVALS: &[&str] = &[
    "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk", "1mo", "3mo",
];

/// Which slice of history to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRange {
    /// A relative period ending now, e.g. `1mo`.
    Period(String),
    /// An explicit range; `end` is exclusive.
    Dates {
        /// First day included.
        start: NaiveDate,
        /// First day excluded.
        end: NaiveDate,
    },
}

/// A fully resolved request for price history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Ticker symbol, e.g. `AAPL` or `7203.T`.
    pub ticker: String,
    /// Period or date range.
    pub range: HistoryRange,
    /// Bar size, e.g. `1d`.
    pub interval: String,
}

impl HistoryQuery {
    /// Applies the precedence rules: a complete `start_date`/`end_date`
    /// pair wins over `period`; a lone date is ignored.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidParams` failure for an empty ticker, an unknown
    /// period or interval, or a start date after the end date.
    pub fn from_arguments(args: &Arguments) -> Result<Self, ToolError> {
        let ticker = args.get_str("ticker").map(str::trim).unwrap_or_default();
        if ticker.is_empty() {
            return Err(ToolError::invalid_params(
                "Ticker symbol ('ticker') is required.",
            ));
        }

        let interval = args.get_str("interval").unwrap_or(DEFAULT_INTERVAL);
        if !VALID_INTERVALS.contains(&interval) {
            return Err(ToolError::invalid_params(format!(
                "Invalid interval '{interval}'. Use one of: {}",
                VALID_INTERVALS.join(", ")
            )));
        }

        let range = match (args.get_date("start_date"), args.get_date("end_date")) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(ToolError::invalid_params(format!(
                        "start_date ({start}) must not be after end_date ({end})."
                    )));
                }
                HistoryRange::Dates { start, end }
            }
            _ => {
                let period = args.get_str("period").unwrap_or(DEFAULT_PERIOD);
                if !VALID_PERIODS.contains(&period) {
                    return Err(ToolError::invalid_params(format!(
                        "Invalid period '{period}'. Use one of: {}",
                        VALID_PERIODS.join(", ")
                    )));
                }
                HistoryRange::Period(period.to_string())
            }
        };

        Ok(Self {
            ticker: ticker.to_string(),
            range,
            interval: interval.to_string(),
        })
    }
}
