// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! yfinance-mcp serves Yahoo Finance price history to AI assistants over
//! MCP (Model Context Protocol).
//!
//! The server speaks JSON-RPC 2.0 on stdin/stdout and exposes a single
//! tool, `get_stock_info`, which returns the price history of a ticker.

use std::sync::Arc;

use anyhow::Result;

/// Configuration handling.
pub mod config;
/// MCP server implementation and type definitions.
pub mod mcp;
/// Stock data source and the tools built on it.
pub mod stock;

use crate::config::Config;
use crate::mcp::McpServer;
use crate::stock::{StockInfoTool, YahooClient};

/// Builds the server with every tool registered against the live data source.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built from `config`.
pub fn build_server(config: &Config) -> Result<McpServer> {
    let client = YahooClient::new(config)?;

    let mut server = McpServer::new()
        .with_shutdown_grace(config.shutdown_grace())
        .with_version(env!("YFINANCE_MCP_VERSION"));
    let tool = StockInfoTool::new(Arc::new(client));
    server.register_tool(StockInfoTool::descriptor(), Arc::new(tool))?;

    Ok(server)
}
