// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Yahoo Finance chart API client.
mod client;
/// Price history model.
mod history;
/// Argument resolution for history requests.
mod query;
/// The `get_stock_info` tool.
mod tool;

pub use client::{FetchError, HistorySource, YahooClient};
pub use history::{Bar, PriceHistory, TIMESTAMP_FORMAT};
pub use query::{
    DEFAULT_INTERVAL, DEFAULT_PERIOD, HistoryQuery, HistoryRange, VALID_INTERVALS, VALID_PERIODS,
};
pub use tool::{StockInfoTool, TOOL_NAME};
