// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Error codes and typed tool failures.
mod error;
/// Schema registry of advertised tools.
mod registry;
/// Typed input schemas and argument validation.
mod schema;
/// MCP server implementation over stdin/stdout.
mod server;
/// Newline-delimited JSON framing.
mod transport;
/// MCP type definitions and JSON-RPC messages.
mod types;

pub use error::{ErrorCode, ToolError};
pub use registry::{RegistryError, SchemaRegistry, ToolDescriptor};
pub use schema::{ArgValue, Arguments, DATE_FORMAT, FieldKind, FieldSpec, InputSchema, ValidationError};
pub use server::{DEFAULT_SHUTDOWN_GRACE, McpServer, SERVER_NAME, ToolHandler, cancel_on};
pub use transport::{Incoming, Transport, decode};
pub use types::*;
