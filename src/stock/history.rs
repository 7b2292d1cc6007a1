// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Price history rows and their JSON rendering.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value, json};

/// Row key format: exchange-local time with numeric offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// One bar of the series.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Bar open time in the exchange's offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Opening price.
    pub open: f64,
    /// High.
    pub high: f64,
    /// Low.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Shares traded.
    pub volume: u64,
    /// Cash dividend paid on this bar, or 0.
    pub dividends: f64,
    /// Split ratio effective on this bar, or 0.
    pub stock_splits: f64,
}

impl Bar {
    fn to_json(&self) -> Value {
        json!({
            "Open": self.open,
            "High": self.high,
            "Low": self.low,
            "Close": self.close,
            "Volume": self.volume,
            "Dividends": self.dividends,
            "Stock Splits": self.stock_splits,
        })
    }
}

/// A time-ordered series of bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    bars: Vec<Bar>,
}

impl PriceHistory {
    /// Wraps bars, sorting them by time.
    #[must_use]
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self { bars }
    }

    /// The bars, oldest first.
    #[must_use]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether the series has no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Renders the series as an object keyed by timestamp.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let rows: Map<String, Value> = self
            .bars
            .iter()
            .map(|bar| (bar.timestamp.format(TIMESTAMP_FORMAT).to_string(), bar.to_json()))
            .collect();
        Value::Object(rows)
    }

    /// [`Self::to_json`] as a compact string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json())
    }
}
