// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The `get_stock_info` tool.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::client::HistorySource;
use super::query::{DEFAULT_INTERVAL, DEFAULT_PERIOD, HistoryQuery};
use crate::mcp::{ArgValue, Arguments, FieldKind, FieldSpec, InputSchema, ToolDescriptor, ToolError, ToolHandler};

/// Name under which the tool is advertised.
pub const TOOL_NAME: &str = "get_stock_info";

/// Fetches price history for one ticker.
pub struct StockInfoTool {
    source: Arc<dyn HistorySource>,
}

impl StockInfoTool {
    /// Creates the tool on top of a history source.
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self { source }
    }

    /// The advertised name, description and input schema.
    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        let schema = InputSchema::new()
            .field(
                FieldSpec::new(
                    "ticker",
                    FieldKind::String,
                    "Ticker symbol (e.g. AAPL, 7203.T)",
                )
                .required(),
            )
            .field(
                FieldSpec::new(
                    "period",
                    FieldKind::String,
                    "Period to fetch (e.g. 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)",
                )
                .with_default(ArgValue::from(DEFAULT_PERIOD)),
            )
            .field(
                FieldSpec::new(
                    "interval",
                    FieldKind::String,
                    "Bar interval (e.g. 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo)",
                )
                .with_default(ArgValue::from(DEFAULT_INTERVAL)),
            )
            .field(FieldSpec::new(
                "start_date",
                FieldKind::Date,
                "Start date (YYYY-MM-DD). Used together with end_date instead of period.",
            ))
            .field(FieldSpec::new(
                "end_date",
                FieldKind::Date,
                "End date (YYYY-MM-DD), exclusive. Used together with start_date instead of period.",
            ));

        ToolDescriptor::new(
            TOOL_NAME,
            "Fetch the price history for a ticker symbol.",
            schema,
        )
    }
}

#[async_trait]
impl ToolHandler for StockInfoTool {
    async fn call(&self, arguments: Arguments) -> Result<String> {
        let query = HistoryQuery::from_arguments(&arguments)?;
        debug!("Fetching history: {:?}", query);

        let history = self.source.history(&query).await.map_err(|e| {
            ToolError::internal(format!("Failed to fetch data for {}: {e}", query.ticker))
        })?;

        if history.is_empty() {
            info!("No data for {}", query.ticker);
            return Ok(format!(
                "No data found for ticker {} with the specified parameters.",
                query.ticker
            ));
        }

        info!("Fetched {} bars for {}", history.len(), query.ticker);
        history
            .to_json_string()
            .map_err(|e| {
                ToolError::internal(format!("Failed to serialize data for {}: {e}", query.ticker))
                    .into()
            })
    }
}
