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

//! MCP (Model Context Protocol) type definitions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ErrorCode, ToolError};

/// Protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// The frame was not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// The frame was not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method was not found.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// The parameters were invalid.
pub const INVALID_PARAMS: i64 = -32602;
/// An internal error occurred.
pub const INTERNAL_ERROR: i64 = -32603;

/// A JSON-RPC call that expects exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlates the response with this call.
    pub id: RequestId,
    /// e.g. `tools/call`.
    pub method: String,
    /// Method-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Builds a request with the given id, method and params.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC message without an `id`; never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(
    dead_code,
    reason = "Fields required by JSON-RPC protocol but not all are read"
)]
pub struct Notification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// e.g. `notifications/initialized`.
    pub method: String,
    /// Method-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Request correlation id: a number or a string, echoed back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// `"id": 7`
    Number(i64),
    /// `"id": "abc"`
    String(String),
    /// `"id": null`, only used to answer a request whose id was unusable.
    Null,
}

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_991.0;

impl RequestId {
    /// Recovers an id from an arbitrary JSON value, if it has the right shape.
    ///
    /// Integral floats (`1.0`) are accepted as numbers; `null`, fractions and
    /// other types are not.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT)
                        .map(float_to_id)
                })
                .map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// The id as it appears on the wire.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Null => Value::Null,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "callers pass integral values within the exact f64 range"
)]
fn float_to_id(f: f64) -> i64 {
    f as i64
}

/// Exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Copied from the request.
    pub id: RequestId,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// A success response carrying `result`.
    ///
    /// # Errors
    ///
    /// Fails if `result` does not serialize to JSON.
    pub fn success(id: RequestId, result: impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    /// A failure response.
    pub fn error(id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ResponseError {
                code: code.code(),
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Whether this response carries an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<(RequestId, ToolError)> for Response {
    fn from((id, err): (RequestId, ToolError)) -> Self {
        Self::error(id, err.code, err.message)
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Wire code, see [`ErrorCode`].
    pub code: i64,
    /// Diagnostic shown to the client.
    pub message: String,
    /// Unused by this server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Params of `initialize`. Only logged.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(
    dead_code,
    reason = "Fields required by MCP protocol but not all are read"
)]
pub struct InitializeParams {
    /// Version the client speaks.
    pub protocol_version: String,
    /// Client capabilities, ignored.
    #[serde(default)]
    pub capabilities: Value,
    /// Who is connecting.
    pub client_info: ClientInfo,
}

/// `clientInfo` from `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version, if sent.
    #[serde(default)]
    pub version: Option<String>,
}

/// Result of `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Always [`PROTOCOL_VERSION`].
    pub protocol_version: String,
    /// What the server offers.
    pub capabilities: ServerCapabilities,
    /// Name and build version.
    pub server_info: ServerInfo,
    /// Free-form usage hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Capabilities advertised on `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Present: the server has tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Present: `resources/list` is answered (with nothing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
}

/// The `tools` capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// The tool set is fixed, so never set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// The `resources` capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Whether clients may subscribe to resource updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the server emits list-changed notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// `serverInfo` in the `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Always [`SERVER_NAME`](super::SERVER_NAME).
    pub name: String,
    /// Build version from `git describe`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One entry of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Name used in `tools/call`.
    pub name: String,
    /// Shown to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// In registration order.
    pub tools: Vec<Tool>,
}

/// A resource entry for resources/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// The resource URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A parameterised resource entry for resources/templates/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// RFC 6570 URI template.
    pub uri_template: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resources produced by the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// resources/list response result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// The list of resources.
    pub resources: Vec<Resource>,
}

/// resources/templates/list response result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    /// The list of resource templates.
    pub resource_templates: Vec<ResourceTemplate>,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    /// Registered tool name.
    pub name: String,
    /// Raw arguments, validated against the tool's schema later.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Result of a successful `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// A single text block for every tool here.
    pub content: Vec<ToolContent>,
    /// Failures travel as JSON-RPC errors, so never set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// A content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToolContent {
    /// `{"type": "text", "text": ...}`
    Text {
        /// The payload.
        text: String,
    },
}

impl CallToolResult {
    /// Wraps `text` in one text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: None,
        }
    }
}

/// The request kinds this server understands, decoded from method + params.
#[derive(Debug, Clone)]
pub enum ClientRequest {
    /// `initialize` handshake.
    Initialize(Option<InitializeParams>),
    /// `ping`.
    Ping,
    /// `tools/list`.
    ListTools,
    /// `resources/list`.
    ListResources,
    /// `resources/templates/list`.
    ListResourceTemplates,
    /// `tools/call`.
    CallTool(CallToolParams),
    /// Anything else.
    Unknown(String),
}

impl ClientRequest {
    /// Resolves a method name and its params into a request kind.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidParams` failure when the params do not match the
    /// shape the method expects.
    pub fn parse(method: &str, params: Option<Value>) -> Result<Self, ToolError> {
        Ok(match method {
            "initialize" => Self::Initialize(decode_params(method, params)?),
            "ping" => Self::Ping,
            "tools/list" => Self::ListTools,
            "resources/list" => Self::ListResources,
            "resources/templates/list" => Self::ListResourceTemplates,
            "tools/call" => Self::CallTool(
                decode_params(method, params)?
                    .ok_or_else(|| ToolError::invalid_params("Missing tools/call params"))?,
            ),
            other => Self::Unknown(other.to_string()),
        })
    }
}

fn decode_params<T: DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> Result<Option<T>, ToolError> {
    params
        .filter(|p| !p.is_null())
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ToolError::invalid_params(format!("Invalid {method} params: {e}")))
}
