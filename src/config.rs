/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix for environment overrides (`YFINANCE_MCP_BASE_URL`, ...).
pub const ENV_PREFIX: &str = "YFINANCE_MCP";

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Server settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the Yahoo Finance API (default: query1.finance.yahoo.com)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent upstream; Yahoo rejects requests without one
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Seconds an in-flight call may run after a shutdown signal (default: 5)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,

    /// Extra tracing directive, e.g. "yfinance_mcp=debug"
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_shutdown_grace() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            shutdown_grace: default_shutdown_grace(),
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is unreadable or a value has the
    /// wrong type.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let user_file = dirs::config_dir()
            .map(|dir| dir.join("yfinance-mcp").join("config.toml"))
            .filter(|path| path.exists());

        Self::build(user_file, explicit_file, None)
    }

    /// Layers defaults, the user file, an explicit file and the environment.
    ///
    /// `env` replaces the process environment when given, so callers can
    /// test overrides without mutating global state.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized.
    pub fn build(
        user_file: Option<PathBuf>,
        explicit_file: Option<PathBuf>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("request_timeout", default_request_timeout())?
            .set_default("shutdown_grace", default_shutdown_grace())?;

        // 2. User config directory (~/.config/yfinance-mcp/config.toml)
        if let Some(path) = user_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 3. Explicit file
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Environment (YFINANCE_MCP_BASE_URL, YFINANCE_MCP_REQUEST_TIMEOUT, ...)
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config = builder
            .build()
            .context("Failed to build configuration")?;

        config.try_deserialize().context("Failed to deserialize configuration")
    }

    /// Upstream request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}
