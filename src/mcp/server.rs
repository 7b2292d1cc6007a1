//! MCP server implementation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use super::error::{ErrorCode, ToolError};
use super::registry::{RegistryError, SchemaRegistry, ToolDescriptor};
use super::schema::Arguments;
use super::transport::{Incoming, Transport};
use super::types::{
    CallToolParams, CallToolResult, ClientRequest, InitializeParams, InitializeResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, Notification,
    PROTOCOL_VERSION, Request, RequestId, ResourcesCapability, Response, ServerCapabilities,
    ServerInfo, ToolsCapability,
};

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "yfinance-mcp";

/// Default time an in-flight call gets to finish after shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Behavior behind one registered tool.
///
/// Arguments arrive already validated against the tool's schema. A handler
/// that wants a specific error code returns a [`ToolError`] (wrapped in
/// `anyhow::Error`); any other error is reported as an internal error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool and returns the text payload.
    async fn call(&self, arguments: Arguments) -> Result<String>;
}

/// MCP server: a schema registry plus the handler bound to each tool.
///
/// Holds no per-session state, so one instance can answer any number of
/// requests in sequence.
pub struct McpServer {
    registry: SchemaRegistry,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    shutdown_grace: Duration,
    version: String,
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServer {
    /// A server with no tools.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SchemaRegistry::new(),
            handlers: HashMap::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets how long an in-flight call may run after shutdown is requested.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the version reported in `serverInfo`.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Registers a tool and binds its handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is already taken.
    pub fn register_tool(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        let name = descriptor.name().to_string();
        self.registry.register(descriptor)?;
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// The registered tool descriptors.
    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Runs a session until the input closes or `shutdown` is cancelled.
    ///
    /// Requests are handled one at a time and each response is written
    /// before the next frame is read. On shutdown an in-flight call gets the
    /// configured grace period; if it does not finish, its request is
    /// answered with an internal error and the session ends.
    ///
    /// # Errors
    ///
    /// Returns an error only if the streams themselves fail.
    pub async fn run<R, W>(
        &self,
        transport: &mut Transport<R, W>,
        shutdown: CancellationToken,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server starting, waiting for requests on stdin");

        loop {
            let incoming = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("MCP server shutting down (signal)");
                    break;
                }
                frame = transport.recv() => frame?,
            };

            let Some(incoming) = incoming else {
                info!("MCP server shutting down (stdin closed)");
                break;
            };

            match incoming {
                Incoming::Request(request) => {
                    let response = self.handle_until_shutdown(request, &shutdown).await;
                    transport.send(&response).await?;
                }
                Incoming::Notification(notification) => {
                    Self::handle_notification(&notification);
                }
                Incoming::Malformed {
                    id: Some(id),
                    code,
                    message,
                } => {
                    warn!("Rejecting malformed request {:?}: {}", id, message);
                    transport.send(&Response::error(id, code, message)).await?;
                }
                Incoming::Malformed {
                    id: None, message, ..
                } => {
                    warn!("Dropping undecodable frame: {}", message);
                }
            }
        }

        transport.close().await
    }

    /// Handles a request, bounded by the grace period once shutdown starts.
    async fn handle_until_shutdown(
        &self,
        request: Request,
        shutdown: &CancellationToken,
    ) -> Response {
        let id = request.id.clone();
        let work = self.handle_request(request);
        tokio::pin!(work);

        tokio::select! {
            response = &mut work => response,
            () = shutdown.cancelled() => {
                info!(
                    "Shutdown requested with request {:?} in flight, waiting up to {:?}",
                    id, self.shutdown_grace
                );
                if let Ok(response) = tokio::time::timeout(self.shutdown_grace, &mut work).await {
                    response
                } else {
                    warn!("Abandoning request {:?} after grace period", id);
                    Response::error(
                        id,
                        ErrorCode::InternalError,
                        "Request abandoned: server is shutting down",
                    )
                }
            }
        }
    }

    /// Maps one request to its response. Never fails.
    pub async fn handle_request(&self, request: Request) -> Response {
        debug!("Handling request: {} (id={:?})", request.method, request.id);
        let id = request.id;

        let kind = match ClientRequest::parse(&request.method, request.params) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Bad params for {}: {}", request.method, e);
                return (id, e).into();
            }
        };

        match kind {
            ClientRequest::Initialize(params) => reply(id, Ok(self.initialize(params.as_ref()))),
            ClientRequest::Ping => reply(id, Ok(serde_json::json!({}))),
            ClientRequest::ListTools => reply(id, Ok(self.list_tools())),
            ClientRequest::ListResources => reply(id, Ok(ListResourcesResult::default())),
            ClientRequest::ListResourceTemplates => {
                reply(id, Ok(ListResourceTemplatesResult::default()))
            }
            ClientRequest::CallTool(params) => reply(id, self.call_tool(params).await),
            ClientRequest::Unknown(method) => {
                warn!("Unknown method: {}", method);
                Response::error(
                    id,
                    ErrorCode::MethodNotFound,
                    format!("Unknown method: {method}"),
                )
            }
        }
    }

    fn handle_notification(notification: &Notification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("MCP client initialized"),
            "notifications/cancelled" => debug!("Request cancelled"),
            other => debug!("Ignoring unknown notification: {}", other),
        }
    }

    fn initialize(&self, params: Option<&InitializeParams>) -> InitializeResult {
        if let Some(params) = params {
            info!(
                "MCP client connecting: {} v{}",
                params.client_info.name,
                params.client_info.version.as_deref().unwrap_or("unknown")
            );
            info!("Protocol version: {}", params.protocol_version);
        }

        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                resources: Some(ResourcesCapability {
                    subscribe: None,
                    list_changed: None,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(self.version.clone()),
            },
            instructions: None,
        }
    }

    fn list_tools(&self) -> ListToolsResult {
        let tools: Vec<_> = self
            .registry
            .list()
            .iter()
            .map(ToolDescriptor::to_tool)
            .collect();
        debug!("Listing {} tools", tools.len());
        ListToolsResult { tools }
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, ToolError> {
        let name = params.name;
        debug!("Calling tool: {}", name);

        let Some(descriptor) = self.registry.lookup(&name) else {
            warn!("Tool '{}' not found.", name);
            return Err(ToolError::method_not_found(format!(
                "Tool '{name}' not found."
            )));
        };

        let arguments = descriptor
            .input_schema()
            .validate(params.arguments.as_ref())
            .map_err(|e| {
                warn!("Rejected arguments for {}: {}", name, e);
                ToolError::invalid_params(e.to_string())
            })?;

        let handler = self
            .handlers
            .get(&name)
            .cloned()
            .ok_or_else(|| ToolError::internal(format!("{name}: no handler bound")))?;

        // Own task so a panic stays contained and dropping the future aborts it.
        let task = AbortOnDropHandle::new(tokio::spawn(async move { handler.call(arguments).await }));

        match task.await {
            Ok(Ok(text)) => Ok(CallToolResult::text(text)),
            Ok(Err(err)) => {
                let failure = classify_failure(&name, err);
                error!("Tool call {} failed: {} ({})", name, failure.message, failure.code);
                Err(failure)
            }
            Err(join) => {
                let detail = if join.is_panic() {
                    panic_message(join.into_panic())
                } else {
                    "task was cancelled".to_string()
                };
                error!("Tool call {} panicked: {}", name, detail);
                Err(ToolError::internal(format!("{name}: {detail}")))
            }
        }
    }
}

/// Converts a handler error into the failure reported to the client.
fn classify_failure(name: &str, err: anyhow::Error) -> ToolError {
    match err.downcast::<ToolError>() {
        Ok(typed) => typed,
        Err(other) => {
            let detail = format!("{other:#}");
            let detail = if detail.trim().is_empty() {
                "unknown error".to_string()
            } else {
                detail
            };
            ToolError::internal(format!("{name}: {detail}"))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}

fn reply<T: Serialize>(id: RequestId, result: Result<T, ToolError>) -> Response {
    match result {
        Ok(value) => Response::success(id.clone(), value).unwrap_or_else(|e| {
            error!("Failed to serialize result: {}", e);
            Response::error(
                id,
                ErrorCode::InternalError,
                format!("Failed to serialize result: {e}"),
            )
        }),
        Err(e) => (id, e).into(),
    }
}

/// Runs `future` as a session's shutdown trigger: when it resolves, `token`
/// is cancelled.
pub fn cancel_on<F>(token: &CancellationToken, future: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = token.clone();
    tokio::spawn(async move {
        future.await;
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::schema::{ArgValue, FieldKind, FieldSpec, InputSchema};
    use crate::mcp::types::{ListToolsResult, ToolContent};
    use anyhow::{Context, anyhow, bail};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every call and answers with a fixed outcome.
    struct Recorder {
        calls: AtomicUsize,
        seen: Mutex<Vec<Arguments>>,
        outcome: fn() -> Result<String>,
    }

    impl Recorder {
        fn new(outcome: fn() -> Result<String>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                outcome,
            })
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolHandler for Recorder {
        async fn call(&self, arguments: Arguments) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(arguments);
            }
            (self.outcome)()
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolHandler for Panics {
        #[allow(clippy::panic, reason = "exercising panic containment")]
        async fn call(&self, _arguments: Arguments) -> Result<String> {
            panic!("handler exploded");
        }
    }

    struct Sleeps(Duration);

    #[async_trait]
    impl ToolHandler for Sleeps {
        async fn call(&self, _arguments: Arguments) -> Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("slept".to_string())
        }
    }

    fn quote_schema() -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::new("ticker", FieldKind::String, "Symbol").required())
            .field(
                FieldSpec::new("period", FieldKind::String, "Range")
                    .with_default(ArgValue::from("1mo")),
            )
            .field(FieldSpec::new("start_date", FieldKind::Date, "Start"))
    }

    fn server_with(handler: Arc<dyn ToolHandler>) -> Result<McpServer> {
        let mut server = McpServer::new();
        server.register_tool(ToolDescriptor::new("quote", "Quote", quote_schema()), handler)?;
        Ok(server)
    }

    fn call(id: i64, name: &str, arguments: Value) -> Request {
        Request::new(
            RequestId::Number(id),
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
    }

    fn error_code(response: &Response) -> Option<i64> {
        response.error.as_ref().map(|e| e.code)
    }

    #[tokio::test]
    async fn test_initialize_advertises_tools_and_resources() -> Result<()> {
        let server = McpServer::new().with_version("9.9.9");
        let response = server
            .handle_request(Request::new(
                RequestId::Number(1),
                "initialize",
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "test-client", "version": "1.0.0" }
                })),
            ))
            .await;

        let result = response.result.context("missing result")?;
        let result: InitializeResult = serde_json::from_value(result)?;
        assert_eq!(result.server_info.name, SERVER_NAME);
        assert_eq!(result.server_info.version.as_deref(), Some("9.9.9"));
        assert!(result.capabilities.tools.is_some());
        assert!(result.capabilities.resources.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_tools_in_registration_order() -> Result<()> {
        let mut server = McpServer::new();
        for name in ["b_tool", "a_tool", "c_tool"] {
            server.register_tool(
                ToolDescriptor::new(name, "t", InputSchema::new()),
                Recorder::new(|| Ok(String::new())),
            )?;
        }

        let response = server
            .handle_request(Request::new(RequestId::Number(2), "tools/list", None))
            .await;
        let result: ListToolsResult =
            serde_json::from_value(response.result.context("missing result")?)?;
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["b_tool", "a_tool", "c_tool"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() -> Result<()> {
        let mut server = server_with(Recorder::new(|| Ok(String::new())))?;
        let err = server.register_tool(
            ToolDescriptor::new("quote", "again", InputSchema::new()),
            Recorder::new(|| Ok(String::new())),
        );
        assert!(matches!(err, Err(RegistryError::DuplicateName(_))));
        assert_eq!(server.registry().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resources_are_empty() -> Result<()> {
        let server = McpServer::new();

        let response = server
            .handle_request(Request::new(RequestId::Number(3), "resources/list", None))
            .await;
        assert_eq!(response.result, Some(json!({ "resources": [] })));

        let response = server
            .handle_request(Request::new(
                RequestId::Number(4),
                "resources/templates/list",
                None,
            ))
            .await;
        assert_eq!(response.result, Some(json!({ "resourceTemplates": [] })));
        Ok(())
    }

    #[tokio::test]
    async fn test_success_wraps_payload_in_text_block() -> Result<()> {
        let handler = Recorder::new(|| Ok("P".to_string()));
        let server = server_with(handler.clone())?;

        let response = server.handle_request(call(5, "quote", json!({ "ticker": "AAPL" }))).await;
        let result: CallToolResult =
            serde_json::from_value(response.result.context("missing result")?)?;
        assert_eq!(
            result.content,
            vec![ToolContent::Text {
                text: "P".to_string()
            }]
        );
        assert!(result.is_error.is_none());

        let seen = handler.seen.lock().map_err(|_| anyhow!("poisoned"))?;
        assert_eq!(seen[0].get_str("ticker"), Some("AAPL"));
        assert_eq!(seen[0].get_str("period"), Some("1mo"), "default applied");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_then_session_continues() -> Result<()> {
        let server = server_with(Recorder::new(|| Ok("ok".to_string())))?;

        let response = server.handle_request(call(6, "nope", json!({}))).await;
        assert_eq!(error_code(&response), Some(ErrorCode::MethodNotFound.code()));
        let message = response.error.map(|e| e.message).unwrap_or_default();
        assert_eq!(message, "Tool 'nope' not found.");

        let response = server.handle_request(call(7, "quote", json!({ "ticker": "X" }))).await;
        assert!(!response.is_error());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_required_never_invokes_handler() -> Result<()> {
        let handler = Recorder::new(|| Ok("ok".to_string()));
        let server = server_with(handler.clone())?;

        let response = server.handle_request(call(8, "quote", json!({ "period": "5d" }))).await;
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidParams.code()));
        assert_eq!(handler.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_date_never_invokes_handler() -> Result<()> {
        let handler = Recorder::new(|| Ok("ok".to_string()));
        let server = server_with(handler.clone())?;

        let response = server
            .handle_request(call(9, "quote", json!({ "ticker": "AAPL", "start_date": "2024-13-01" })))
            .await;
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidParams.code()));
        assert_eq!(handler.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_typed_failure_passes_through() -> Result<()> {
        let server = server_with(Recorder::new(|| {
            Err(ToolError::invalid_params("period 'forever' is not supported").into())
        }))?;

        let response = server.handle_request(call(10, "quote", json!({ "ticker": "A" }))).await;
        let err = response.error.context("expected error")?;
        assert_eq!(err.code, ErrorCode::InvalidParams.code());
        assert_eq!(err.message, "period 'forever' is not supported");
        Ok(())
    }

    #[tokio::test]
    async fn test_untyped_failure_becomes_internal_error() -> Result<()> {
        let server = server_with(Recorder::new(|| Err(anyhow!("connection reset"))))?;

        let response = server.handle_request(call(11, "quote", json!({ "ticker": "A" }))).await;
        let err = response.error.context("expected error")?;
        assert_eq!(err.code, ErrorCode::InternalError.code());
        assert!(err.message.starts_with("quote: "), "{}", err.message);
        assert!(err.message.contains("connection reset"));
        Ok(())
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() -> Result<()> {
        let server = server_with(Arc::new(Panics))?;

        let response = server.handle_request(call(12, "quote", json!({ "ticker": "A" }))).await;
        let err = response.error.context("expected error")?;
        assert_eq!(err.code, ErrorCode::InternalError.code());
        assert!(err.message.contains("quote"));
        assert!(err.message.contains("handler exploded"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_method() -> Result<()> {
        let server = McpServer::new();
        let response = server
            .handle_request(Request::new(RequestId::Number(13), "prompts/list", None))
            .await;
        assert_eq!(error_code(&response), Some(ErrorCode::MethodNotFound.code()));
        Ok(())
    }

    #[tokio::test]
    async fn test_ping() {
        let server = McpServer::new();
        let response = server
            .handle_request(Request::new(RequestId::Number(14), "ping", None))
            .await;
        assert_eq!(response.result, Some(json!({})));
    }

    #[test]
    fn test_classify_empty_message_gets_placeholder() {
        let failure = classify_failure("quote", anyhow!(""));
        assert_eq!(failure.code, ErrorCode::InternalError);
        assert_eq!(failure.message, "quote: unknown error");
    }

    async fn run_session(server: &McpServer, input: &str) -> Result<Vec<Value>> {
        run_session_bytes(server, input.as_bytes()).await
    }

    async fn run_session_bytes(server: &McpServer, input: &[u8]) -> Result<Vec<Value>> {
        let mut transport = Transport::new(input, Vec::new());
        server.run(&mut transport, CancellationToken::new()).await?;
        let out = String::from_utf8(transport.into_writer())?;
        out.lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[tokio::test]
    async fn test_session_answers_in_order_and_skips_notifications() -> Result<()> {
        let server = server_with(Recorder::new(|| Ok("ok".to_string())))?;
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t"}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"missing"}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"quote","arguments":{"ticker":"A"}}}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#,
        ]
        .join("\n");

        let responses = run_session(&server, &input).await?;
        let ids: Vec<&Value> = responses.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, [&json!(1), &json!(2), &json!(3), &json!(4)]);
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[2]["result"]["content"][0]["text"], "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_session_survives_malformed_frames() -> Result<()> {
        let server = McpServer::new();
        let input = [
            "this is not json",
            r#"{"jsonrpc":"2.0","id":"bad","method":42}"#,
            r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#,
        ]
        .join("\n");

        let responses = run_session(&server, &input).await?;
        assert_eq!(responses.len(), 2, "garbage without an id is dropped");
        assert_eq!(responses[0]["id"], "bad");
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(responses[1]["id"], 5);
        assert!(responses[1].get("result").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_session_answers_invalid_utf8_request() -> Result<()> {
        let server = server_with(Recorder::new(|| Ok("ok".to_string())))?;
        let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"tools/call\",\"params\":{\"name\":\"quote\",\"arguments\":{\"ticker\":\"\xff\"}}}\n{\"jsonrpc\":\"2.0\",\"id\":8,\"method\":\"ping\"}\n";

        let responses = run_session_bytes(&server, input).await?;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 7);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_session_answers_unusable_ids() -> Result<()> {
        let server = McpServer::new();
        let input = [
            r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","id":1.0,"method":"ping"}"#,
        ]
        .join("\n");

        let responses = run_session(&server, &input).await?;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"], json!({}));
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_while_idle_ends_session() -> Result<()> {
        let server = McpServer::new();
        let (_client, server_io) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server_io);
        let mut transport = Transport::new(tokio::io::BufReader::new(read_half), write_half);

        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), server.run(&mut transport, token))
            .await
            .context("session did not stop on shutdown")??;
        Ok(())
    }

    async fn session_with_shutdown(handler_time: Duration, grace: Duration) -> Result<Value> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

        let server = server_with(Arc::new(Sleeps(handler_time)))?.with_shutdown_grace(grace);
        let (client, server_io) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server_io);
        let mut transport = Transport::new(tokio::io::BufReader::new(read_half), write_half);

        let (client_read, mut client_write) = tokio::io::split(client);
        let frame = serde_json::to_string(&call(1, "quote", json!({ "ticker": "A" })))?;
        client_write.write_all(format!("{frame}\n").as_bytes()).await?;

        let token = CancellationToken::new();
        cancel_on(&token, tokio::time::sleep(Duration::from_millis(50)));

        tokio::time::timeout(Duration::from_secs(10), server.run(&mut transport, token))
            .await
            .context("session did not stop on shutdown")??;

        let mut line = String::new();
        tokio::io::BufReader::new(client_read).read_line(&mut line).await?;
        Ok(serde_json::from_str(&line)?)
    }

    #[tokio::test]
    async fn test_in_flight_call_finishes_within_grace() -> Result<()> {
        let response =
            session_with_shutdown(Duration::from_millis(200), Duration::from_secs(5)).await?;
        assert_eq!(response["result"]["content"][0]["text"], "slept");
        Ok(())
    }

    #[tokio::test]
    async fn test_in_flight_call_abandoned_after_grace() -> Result<()> {
        let response =
            session_with_shutdown(Duration::from_secs(60), Duration::from_millis(50)).await?;
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], -32603);
        let message = response["error"]["message"].as_str().unwrap_or_default();
        if !message.contains("shutting down") {
            bail!("unexpected message: {message}");
        }
        Ok(())
    }
}
