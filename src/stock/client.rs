// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Yahoo Finance chart API client.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use reqwest::{Client, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::history::{Bar, PriceHistory};
use super::query::{HistoryQuery, HistoryRange};
use crate::config::Config;

/// Failures talking to the data source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status with a body we could not interpret.
    #[error("upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Leading part of the body.
        body: String,
    },

    /// Yahoo answered with an error object.
    #[error("{code}: {description}")]
    Upstream {
        /// Yahoo's error code, e.g. `Bad Request`.
        code: String,
        /// Yahoo's explanation.
        description: String,
    },

    /// The body was not the expected JSON.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Anything that can produce price history for a query.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetches the bars for `query`. An unknown symbol or an empty window
    /// yields an empty history rather than an error.
    async fn history(&self, query: &HistoryQuery) -> Result<PriceHistory, FetchError>;
}

/// Client for `GET /v8/finance/chart/{symbol}`.
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    base_url: Url,
}

impl YahooClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or user agent is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid base_url: {}", config.base_url))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&config.user_agent).context("Invalid user_agent")?,
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn chart_url(&self, ticker: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        Ok(url)
    }
}

/// Query string for a history request.
fn query_params(query: &HistoryQuery) -> Vec<(&'static str, String)> {
    let mut params = match &query.range {
        HistoryRange::Period(period) => vec![("range", period.clone())],
        HistoryRange::Dates { start, end } => vec![
            ("period1", midnight_utc(*start).to_string()),
            ("period2", midnight_utc(*end).to_string()),
        ],
    };
    params.push(("interval", query.interval.clone()));
    params.push(("events", "div,splits".to_string()));
    params.push(("includePrePost", "false".to_string()));
    params
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[async_trait]
impl HistorySource for YahooClient {
    async fn history(&self, query: &HistoryQuery) -> Result<PriceHistory, FetchError> {
        let url = self.chart_url(&query.ticker)?;
        let params = query_params(query);
        debug!(url = %url, ?params, "GET chart");

        let response = self.client.get(url).query(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ChartEnvelope>(&body) {
            Ok(envelope) => envelope.into_history(),
            Err(_) if !status.is_success() => Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
    #[serde(default)]
    events: Events,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Events {
    #[serde(default)]
    dividends: HashMap<String, Dividend>,
    #[serde(default)]
    splits: HashMap<String, Split>,
}

#[derive(Debug, Deserialize)]
struct Dividend {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct Split {
    numerator: f64,
    denominator: f64,
    date: i64,
}

impl ChartEnvelope {
    fn into_history(self) -> Result<PriceHistory, FetchError> {
        if let Some(error) = self.chart.error {
            // Unknown or delisted symbols are "no data", not a failure.
            if error.code == "Not Found" || error.description.contains("No data found") {
                return Ok(PriceHistory::default());
            }
            return Err(FetchError::Upstream {
                code: error.code,
                description: error.description,
            });
        }

        Ok(self
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(ChartResult::into_history)
            .unwrap_or_default())
    }
}

impl ChartResult {
    fn into_history(self) -> PriceHistory {
        let offset = FixedOffset::east_opt(self.meta.gmtoffset).unwrap_or_else(|| Utc.fix());
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = self
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|a| a.adjclose)
            .unwrap_or_default();

        let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

        let mut stamps = Vec::with_capacity(self.timestamp.len());
        let mut bars = Vec::with_capacity(self.timestamp.len());
        for (i, &ts) in self.timestamp.iter().enumerate() {
            let Some(close) = at(&quote.close, i) else {
                continue;
            };
            let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
                continue;
            };

            // Back-adjust OHLC for splits and dividends like yfinance's auto_adjust.
            let (ratio, close) = match at(&adjclose, i) {
                Some(adj) if close != 0.0 => (adj / close, adj),
                _ => (1.0, close),
            };

            stamps.push(ts);
            bars.push(Bar {
                timestamp: timestamp.with_timezone(&offset),
                open: at(&quote.open, i).map_or(f64::NAN, |v| v * ratio),
                high: at(&quote.high, i).map_or(f64::NAN, |v| v * ratio),
                low: at(&quote.low, i).map_or(f64::NAN, |v| v * ratio),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
                dividends: 0.0,
                stock_splits: 0.0,
            });
        }

        // Events land on the last bar that opened at or before them.
        let slot = |date: i64| stamps.partition_point(|&t| t <= date).checked_sub(1);
        for dividend in self.events.dividends.values() {
            if let Some(i) = slot(dividend.date) {
                bars[i].dividends += dividend.amount;
            }
        }
        for split in self.events.splits.values() {
            if let Some(i) = slot(split.date)
                && split.denominator != 0.0
            {
                bars[i].stock_splits = split.numerator / split.denominator;
            }
        }

        PriceHistory::new(bars)
    }
}
