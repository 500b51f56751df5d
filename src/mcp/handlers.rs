//! Request and notification handlers, one per JSON-RPC method.
//!
//! Each handler declares the single method it serves. The dispatcher indexes
//! the registered handlers by that name once at startup and routes by exact
//! string match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{McpError, ToolError};
use crate::mcp::capability::{
    PromptChain, ResourceChain, Tool, ToolCall, ToolCallResult, ToolChain,
};
use crate::mcp::protocol::{MCP_PROTOCOL_VERSION, SERVER_NAME};

/// Default limit for a single tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-kind capability flags advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCapabilities {
    /// Whether the list can change during the session.
    pub list_changed: bool,
}

/// Resource capability flags advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether the resource list can change during the session.
    pub list_changed: bool,
    /// Whether clients may subscribe to resource updates.
    pub subscribe: bool,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Prompt-related capabilities.
    pub prompts: ListCapabilities,
    /// Tool-related capabilities.
    pub tools: ListCapabilities,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Answers `initialize` with a fixed payload.
///
/// The payload depends only on construction-time values, so repeated
/// `initialize` requests get identical answers.
#[derive(Debug, Clone)]
pub struct InitializeHandler {
    info: ServerInfo,
    protocol_version: String,
    capabilities: ServerCapabilities,
}

impl InitializeHandler {
    /// Creates a handler announcing the given identity and protocol version.
    #[must_use]
    pub fn new(info: ServerInfo, protocol_version: impl Into<String>) -> Self {
        Self {
            info,
            protocol_version: protocol_version.into(),
            capabilities: ServerCapabilities::default(),
        }
    }

    fn handle(&self, params: Option<&Value>) -> Result<Value, McpError> {
        if let Some(params) = params {
            let params: InitializeParams = decode(params, "initialize")?;
            if let Some(client) = &params.client_info {
                info!(
                    client = %client.name,
                    client_version = client.version.as_deref().unwrap_or("unknown"),
                    requested_version = params.protocol_version.as_deref().unwrap_or("none"),
                    "Client initialising"
                );
            }
        }

        Ok(json!({
            "protocolVersion": self.protocol_version,
            "capabilities": self.capabilities,
            "serverInfo": self.info,
        }))
    }
}

impl Default for InitializeHandler {
    fn default() -> Self {
        Self::new(ServerInfo::default(), MCP_PROTOCOL_VERSION)
    }
}

/// Resolves and runs tools for `tools/call`.
pub struct ToolCallHandler {
    tools: Arc<ToolChain>,
    timeout: Duration,
}

impl ToolCallHandler {
    /// Creates a handler over `tools`, limiting each call to `timeout`.
    #[must_use]
    pub const fn new(tools: Arc<ToolChain>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    async fn handle(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let call: ToolCall = decode_required(params, "tools/call")?;
        let tool = self.tools.find(&call.name)?;

        let result = self.execute(tool, call).await;
        serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            McpError::internal("failed to serialise result")
        })
    }

    /// Runs the tool on the blocking pool.
    ///
    /// Every failure mode, including a panic inside the tool or running past
    /// the time limit, comes back as an `isError` result. A call that runs
    /// past the limit is asked to stop through [`Tool::cancel`].
    async fn execute(&self, tool: Arc<dyn Tool>, call: ToolCall) -> ToolCallResult {
        let name = call.name.clone();
        debug!(tool = %name, "Calling tool");

        let running = Arc::clone(&tool);
        let task = tokio::task::spawn_blocking(move || running.call(&call));

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ToolError::Panicked {
                tool: name.clone(),
                message: panic_message(join_error),
            }),
            Err(_) => {
                tool.cancel();
                Err(ToolError::Timeout {
                    tool: name.clone(),
                    limit: self.timeout,
                })
            }
        };

        match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(tool = %name, error = %err, "Tool call failed");
                err.into()
            }
        }
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return "task was cancelled".to_string();
    }
    let payload = join_error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Params of `prompts/get`.
#[derive(Debug, Deserialize)]
struct PromptGetParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

/// Params of `resources/read`.
#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    uri: String,
}

/// A handler for one request method.
pub enum RequestHandler {
    /// `initialize`
    Initialize(InitializeHandler),
    /// `ping`
    Ping,
    /// `prompts/list`
    PromptList(Arc<PromptChain>),
    /// `prompts/get`
    PromptGet(Arc<PromptChain>),
    /// `resources/list`
    ResourceList(Arc<ResourceChain>),
    /// `resources/read`
    ResourceRead(Arc<ResourceChain>),
    /// `tools/list`
    ToolList(Arc<ToolChain>),
    /// `tools/call`
    ToolCall(ToolCallHandler),
}

impl RequestHandler {
    /// The method this handler serves.
    #[must_use]
    pub const fn supported_method(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::Ping => "ping",
            Self::PromptList(_) => "prompts/list",
            Self::PromptGet(_) => "prompts/get",
            Self::ResourceList(_) => "resources/list",
            Self::ResourceRead(_) => "resources/read",
            Self::ToolList(_) => "tools/list",
            Self::ToolCall(_) => "tools/call",
        }
    }

    /// Returns `true` if this handler serves `method`.
    #[must_use]
    pub fn supports(&self, method: &str) -> bool {
        self.supported_method() == method
    }

    /// Produces the `result` value for a request.
    ///
    /// # Errors
    ///
    /// Returns an [`McpError`] for undecodable params or names that do not
    /// resolve. Tool failures are not errors here; see [`ToolCallHandler`].
    pub async fn handle(&self, params: Option<&Value>) -> Result<Value, McpError> {
        match self {
            Self::Initialize(handler) => handler.handle(params),
            Self::Ping => Ok(json!({})),
            Self::PromptList(prompts) => Ok(json!({ "prompts": prompts.list() })),
            Self::PromptGet(prompts) => {
                let params: PromptGetParams = decode_required(params, "prompts/get")?;
                let prompt = prompts.find(&params.name)?;

                let metadata = prompt.metadata();
                if let Some(missing) = metadata
                    .arguments
                    .iter()
                    .find(|arg| arg.required && !params.arguments.contains_key(&arg.name))
                {
                    return Err(McpError::invalid_params(format!(
                        "Missing required argument: {}",
                        missing.name
                    )));
                }

                to_value(&prompt.get(&params.arguments)?)
            }
            Self::ResourceList(resources) => Ok(json!({ "resources": resources.list() })),
            Self::ResourceRead(resources) => {
                let params: ResourceReadParams = decode_required(params, "resources/read")?;
                let contents = resources.find(&params.uri)?.read()?;
                Ok(json!({ "contents": [contents] }))
            }
            Self::ToolList(tools) => Ok(json!({ "tools": tools.list() })),
            Self::ToolCall(handler) => handler.handle(params).await,
        }
    }
}

/// A handler for one notification method.
///
/// Notification methods are matched without their `notifications/` prefix,
/// so `notifications/initialized` and `initialized` reach the same handler.
pub enum NotificationHandler {
    /// Handshake completion; flips the shared flag.
    Initialized(Arc<AtomicBool>),
}

impl NotificationHandler {
    /// The method this handler serves.
    #[must_use]
    pub const fn supported_method(&self) -> &'static str {
        match self {
            Self::Initialized(_) => "initialized",
        }
    }

    /// Returns `true` if this handler serves `method`.
    #[must_use]
    pub fn supports(&self, method: &str) -> bool {
        self.supported_method() == method
    }

    /// Performs the notification's side effect.
    pub fn handle(&self, _params: Option<&Value>) {
        match self {
            Self::Initialized(flag) => {
                if !flag.swap(true, Ordering::SeqCst) {
                    info!("Client handshake complete");
                }
            }
        }
    }
}

/// The capability chains a server exposes.
#[derive(Clone)]
pub struct Capabilities {
    /// Prompt chain.
    pub prompts: Arc<PromptChain>,
    /// Resource chain.
    pub resources: Arc<ResourceChain>,
    /// Tool chain.
    pub tools: Arc<ToolChain>,
}

/// Builds the full MCP request handler set.
#[must_use]
pub fn request_handlers(
    initialize: InitializeHandler,
    capabilities: &Capabilities,
    tool_timeout: Duration,
) -> Vec<RequestHandler> {
    vec![
        RequestHandler::Initialize(initialize),
        RequestHandler::Ping,
        RequestHandler::PromptList(Arc::clone(&capabilities.prompts)),
        RequestHandler::PromptGet(Arc::clone(&capabilities.prompts)),
        RequestHandler::ResourceList(Arc::clone(&capabilities.resources)),
        RequestHandler::ResourceRead(Arc::clone(&capabilities.resources)),
        RequestHandler::ToolCall(ToolCallHandler::new(
            Arc::clone(&capabilities.tools),
            tool_timeout,
        )),
        RequestHandler::ToolList(Arc::clone(&capabilities.tools)),
    ]
}

/// Builds the notification handler set, sharing `initialized`.
#[must_use]
pub fn notification_handlers(initialized: &Arc<AtomicBool>) -> Vec<NotificationHandler> {
    vec![NotificationHandler::Initialized(Arc::clone(initialized))]
}

fn decode<T: DeserializeOwned>(params: &Value, method: &str) -> Result<T, McpError> {
    serde_json::from_value(params.clone())
        .map_err(|e| McpError::invalid_params(format!("Invalid {method} params: {e}")))
}

fn decode_required<T: DeserializeOwned>(
    params: Option<&Value>,
    method: &str,
) -> Result<T, McpError> {
    let params =
        params.ok_or_else(|| McpError::invalid_params(format!("Missing params for {method}")))?;
    decode(params, method)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityKind;
    use crate::logging::LogSink;
    use crate::mcp::capability::{
        Identifiable, Prompt, PromptArgument, PromptMessage, PromptMetadata, PromptResult,
        Resource, ResourceContents, ResourceMetadata, ToolMetadata,
    };

    struct Echo;

    impl Identifiable for Echo {
        fn identifier(&self) -> &str {
            "echo"
        }
    }

    impl Tool for Echo {
        fn metadata(&self) -> ToolMetadata {
            ToolMetadata {
                name: "echo".into(),
                title: None,
                description: None,
                input_schema: json!({"type": "object"}),
                output_schema: None,
                annotations: None,
            }
        }

        fn call(&self, call: &ToolCall) -> Result<ToolCallResult, ToolError> {
            match call.str_arg("text") {
                Some("panic") => panic!("echo exploded"),
                Some("sleep") => {
                    std::thread::sleep(Duration::from_millis(500));
                    Ok(ToolCallResult::text("late"))
                }
                Some(text) => Ok(ToolCallResult::text(text)),
                None => Err(ToolError::InvalidArguments("text is required".into())),
            }
        }
    }

    struct Greeting;

    impl Identifiable for Greeting {
        fn identifier(&self) -> &str {
            "greeting"
        }
    }

    impl Prompt for Greeting {
        fn metadata(&self) -> PromptMetadata {
            PromptMetadata {
                name: "greeting".into(),
                description: Some("Say hello".into()),
                arguments: vec![PromptArgument {
                    name: "who".into(),
                    description: None,
                    required: true,
                }],
            }
        }

        fn get(&self, arguments: &Map<String, Value>) -> Result<PromptResult, McpError> {
            let who = arguments.get("who").and_then(Value::as_str).unwrap_or("?");
            Ok(PromptResult {
                description: None,
                messages: vec![PromptMessage::user(format!("Hello, {who}"))],
            })
        }
    }

    struct Readme;

    impl Identifiable for Readme {
        fn identifier(&self) -> &str {
            "file:///README"
        }
    }

    impl Resource for Readme {
        fn metadata(&self) -> ResourceMetadata {
            ResourceMetadata {
                uri: "file:///README".into(),
                name: "readme".into(),
                description: None,
                mime_type: Some("text/plain".into()),
            }
        }

        fn read(&self) -> Result<ResourceContents, McpError> {
            Ok(ResourceContents {
                uri: "file:///README".into(),
                mime_type: Some("text/plain".into()),
                text: "read me".into(),
            })
        }
    }

    fn capabilities() -> Capabilities {
        let sink = LogSink::new("test");
        Capabilities {
            prompts: Arc::new(PromptChain::new(
                CapabilityKind::Prompt,
                vec![Box::new(Greeting)],
                &sink,
            )),
            resources: Arc::new(ResourceChain::new(
                CapabilityKind::Resource,
                vec![Box::new(Readme)],
                &sink,
            )),
            tools: Arc::new(ToolChain::new(CapabilityKind::Tool, vec![Box::new(Echo)], &sink)),
        }
    }

    fn handler(method: &str, timeout: Duration) -> RequestHandler {
        request_handlers(InitializeHandler::default(), &capabilities(), timeout)
            .into_iter()
            .find(|h| h.supports(method))
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_payload() {
        let result = handler("initialize", DEFAULT_TOOL_TIMEOUT)
            .handle(Some(&json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            })))
            .await
            .unwrap();

        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["capabilities"]["prompts"]["listChanged"], false);
        assert_eq!(result["capabilities"]["resources"]["subscribe"], false);
    }

    #[tokio::test]
    async fn initialize_rejects_malformed_params() {
        let err = handler("initialize", DEFAULT_TOOL_TIMEOUT)
            .handle(Some(&json!({"clientInfo": 5})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn ping_is_empty() {
        let result = handler("ping", DEFAULT_TOOL_TIMEOUT)
            .handle(None)
            .await
            .unwrap();
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn tool_call_success() {
        let result = handler("tools/call", DEFAULT_TOOL_TIMEOUT)
            .handle(Some(&json!({"name": "echo", "arguments": {"text": "hi"}})))
            .await
            .unwrap();
        assert_eq!(result["content"], "hi");
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn tool_call_unknown_tool_is_protocol_error() {
        let err = handler("tools/call", DEFAULT_TOOL_TIMEOUT)
            .handle(Some(&json!({"name": "nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotFound { .. }));
    }

    #[tokio::test]
    async fn tool_call_missing_params() {
        let err = handler("tools/call", DEFAULT_TOOL_TIMEOUT)
            .handle(None)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_content() {
        let result = handler("tools/call", DEFAULT_TOOL_TIMEOUT)
            .handle(Some(&json!({"name": "echo", "arguments": {}})))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"], "text is required");
    }

    #[tokio::test]
    async fn tool_panic_becomes_error_content() {
        let result = handler("tools/call", DEFAULT_TOOL_TIMEOUT)
            .handle(Some(&json!({"name": "echo", "arguments": {"text": "panic"}})))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"].as_str().unwrap().contains("echo exploded"));
    }

    #[tokio::test]
    async fn tool_timeout_becomes_error_content() {
        let result = handler("tools/call", Duration::from_millis(20))
            .handle(Some(&json!({"name": "echo", "arguments": {"text": "sleep"}})))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"], "Tool 'echo' timed out after 20ms");
    }

    /// Spins until cancelled.
    struct Spin {
        stop: Arc<AtomicBool>,
    }

    impl Identifiable for Spin {
        fn identifier(&self) -> &str {
            "spin"
        }
    }

    impl Tool for Spin {
        fn metadata(&self) -> ToolMetadata {
            ToolMetadata {
                name: "spin".into(),
                title: None,
                description: None,
                input_schema: json!({"type": "object"}),
                output_schema: None,
                annotations: None,
            }
        }

        fn call(&self, _call: &ToolCall) -> Result<ToolCallResult, ToolError> {
            while !self.stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(ToolCallResult::text("stopped"))
        }

        fn cancel(&self) {
            self.stop.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn tool_timeout_cancels_the_call() {
        let stop = Arc::new(AtomicBool::new(false));
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(Spin {
            stop: Arc::clone(&stop),
        })];
        let chain = ToolChain::new(CapabilityKind::Tool, tools, &LogSink::new("tools"));
        let handler = ToolCallHandler::new(Arc::new(chain), Duration::from_millis(50));

        let result = handler
            .handle(Some(&json!({"name": "spin"})))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"], "Tool 'spin' timed out after 50ms");
        assert!(stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn prompts_list_and_get() {
        let list = handler("prompts/list", DEFAULT_TOOL_TIMEOUT)
            .handle(None)
            .await
            .unwrap();
        assert_eq!(list["prompts"][0]["name"], "greeting");
        assert_eq!(list["prompts"][0]["arguments"][0]["required"], true);

        let get = handler("prompts/get", DEFAULT_TOOL_TIMEOUT);
        let result = get
            .handle(Some(&json!({"name": "greeting", "arguments": {"who": "Ada"}})))
            .await
            .unwrap();
        assert_eq!(result["messages"][0]["content"]["text"], "Hello, Ada");

        let err = get
            .handle(Some(&json!({"name": "greeting"})))
            .await
            .unwrap_err();
        assert_eq!(err, McpError::invalid_params("Missing required argument: who"));

        let err = get
            .handle(Some(&json!({"name": "farewell"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotFound { .. }));
    }

    #[tokio::test]
    async fn resources_list_and_read() {
        let list = handler("resources/list", DEFAULT_TOOL_TIMEOUT)
            .handle(None)
            .await
            .unwrap();
        assert_eq!(list["resources"][0]["uri"], "file:///README");
        assert_eq!(list["resources"][0]["mimeType"], "text/plain");

        let read = handler("resources/read", DEFAULT_TOOL_TIMEOUT);
        let result = read
            .handle(Some(&json!({"uri": "file:///README"})))
            .await
            .unwrap();
        assert_eq!(result["contents"][0]["text"], "read me");

        let err = read
            .handle(Some(&json!({"uri": "file:///missing"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotFound { .. }));
    }

    #[test]
    fn initialized_flips_flag_once() {
        let flag = Arc::new(AtomicBool::new(false));
        let handlers = notification_handlers(&flag);
        assert!(handlers[0].supports("initialized"));

        handlers[0].handle(None);
        handlers[0].handle(None);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn every_handler_declares_a_distinct_method() {
        let handlers =
            request_handlers(InitializeHandler::default(), &capabilities(), DEFAULT_TOOL_TIMEOUT);
        let mut methods: Vec<_> = handlers.iter().map(RequestHandler::supported_method).collect();
        methods.sort_unstable();
        methods.dedup();
        assert_eq!(methods.len(), handlers.len());
    }
}
