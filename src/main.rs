// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! yfinance-mcp server and CLI.
//!
//! Runs as an MCP server on stdin/stdout by default. The `tools` and `call`
//! subcommands exercise the same tools from a shell.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yfinance_mcp::build_server;
use yfinance_mcp::config::Config;
use yfinance_mcp::mcp::{ListToolsResult, Request, RequestId, Transport, cancel_on};

/// How long runtime teardown may wait on a blocked stdin read.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

/// Command-line arguments for yfinance-mcp.
#[derive(Parser, Debug)]
#[command(name = "yfinance-mcp")]
#[command(about = "MCP server exposing Yahoo Finance price history")]
#[command(version = env!("YFINANCE_MCP_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Subcommands supported by yfinance-mcp.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server (default if no subcommand given).
    Serve,

    /// Print the advertised tools as JSON.
    Tools,

    /// Invoke one tool and print the JSON-RPC response.
    Call {
        /// Tool name, e.g. `get_stock_info`.
        name: String,

        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

fn main() -> Result<()> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = Config::load(args.config.clone())?;
    init_tracing(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async {
        match args.command {
            None | Some(Command::Serve) => run_server(&config).await,
            Some(Command::Tools) => run_tools(&config),
            Some(Command::Call { name, args }) => run_call(&config, &name, &args).await,
        }
    });

    // The stdin reader thread may still be parked on a read.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

/// Logs go to stderr; stdout carries protocol frames only.
fn init_tracing(config: &Config) -> Result<()> {
    let mut filter = EnvFilter::from_default_env().add_directive("yfinance_mcp=info".parse()?);
    if let Some(level) = &config.log_level {
        filter = filter.add_directive(
            level
                .parse()
                .with_context(|| format!("Invalid log_level: {level}"))?,
        );
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Runs the MCP server until stdin closes or a termination signal arrives.
///
/// # Errors
///
/// Returns an error if the server cannot be built or stdio fails.
async fn run_server(config: &Config) -> Result<()> {
    let server = build_server(config)?;
    info!(
        "Serving {} tool(s) against {}",
        server.registry().len(),
        config.base_url
    );

    let shutdown = CancellationToken::new();
    let signals = cancel_on(&shutdown, shutdown_signal());

    let mut transport = Transport::stdio();
    let result = server.run(&mut transport, shutdown).await;

    signals.abort();
    result
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
///
/// The SIGTERM handler is installed before this returns, so a signal that
/// arrives once the session is running is never missed.
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    let terminate = {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate());
        async move {
            match &mut term {
                Ok(term) => {
                    term.recv().await;
                }
                Err(e) => {
                    warn!("SIGTERM handler unavailable: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    async move {
        tokio::select! {
            () = signal_or_pending("Ctrl-C", tokio::signal::ctrl_c()) => {}
            () = terminate => {}
        }
        info!("Received shutdown signal");
    }
}

/// Waits for a signal listener; a listener that fails to install never fires.
async fn signal_or_pending<F, E>(name: &str, listener: F)
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(e) = listener.await {
        warn!("{} handler unavailable: {}", name, e);
        std::future::pending::<()>().await;
    }
}

/// Prints the `tools/list` result.
///
/// # Errors
///
/// Returns an error if the server cannot be built.
fn run_tools(config: &Config) -> Result<()> {
    let server = build_server(config)?;
    let tools = ListToolsResult {
        tools: server
            .registry()
            .list()
            .iter()
            .map(yfinance_mcp::mcp::ToolDescriptor::to_tool)
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

/// Calls one tool through the dispatcher and prints the response.
///
/// Exits non-zero if the call fails.
///
/// # Errors
///
/// Returns an error if `args` is not JSON or the call fails.
async fn run_call(config: &Config, name: &str, args: &str) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(args).with_context(|| format!("Invalid --args JSON: {args}"))?;

    let server = build_server(config)?;
    let request = Request::new(
        RequestId::Number(1),
        "tools/call",
        Some(serde_json::json!({ "name": name, "arguments": arguments })),
    );
    let response = server.handle_request(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Some(error) = &response.error {
        anyhow::bail!("{} ({})", error.message, error.code);
    }
    Ok(())
}
