//! Capability chains: the tools, resources and prompts a server exposes.
//!
//! A [`Chain`] is an ordered list of items of one kind plus a name index
//! built once at construction. Listing walks the items in registration order;
//! lookup goes through the index. Names are expected to be unique but this
//! is not enforced: the first item registered under a name wins and later
//! duplicates are unreachable by lookup (they are still listed).
//!
//! Chains are immutable after construction and shared behind `Arc`, so
//! handlers read them without locking.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CapabilityKind, McpError, ToolError};
use crate::logging::LogSink;

/// An item that can be looked up in a chain.
pub trait Identifiable: Send + Sync {
    /// The stable lookup key: the name for tools and prompts, the URI for
    /// resources.
    fn identifier(&self) -> &str;

    /// Receives the logging sink when the item is registered in a chain.
    ///
    /// Items that log override this and keep the sink; the default ignores it.
    fn bind_log_sink(&mut self, _sink: LogSink) {}
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Behavioural hints about a tool, shown to clients at listing time.
///
/// These are advisory. Nothing in the dispatcher enforces them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The tool does not modify its environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// Repeating a call with the same arguments has no additional effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// The tool may perform destructive updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// The tool interacts with an open world of external entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    /// Unique tool name.
    pub name: String,
    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// JSON Schema for the tool's structured output, if it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Behavioural hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

/// The decoded params of a `tools/call` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Returns a string argument, if present.
    #[must_use]
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// The kind of payload carried in [`ToolCallResult::content`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain or structured text.
    #[default]
    Text,
}

/// Result of a tool call.
///
/// `is_error` reports that the tool itself failed. The result still travels
/// as a normal response so the client can show the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: String,
    /// What kind of payload `content` is.
    pub content_type: ContentType,
    /// MIME type of `content`.
    pub mime_type: String,
    /// Whether the tool call resulted in an error.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            content_type: ContentType::Text,
            mime_type: "text/plain".to_string(),
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }

    /// Overrides the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

impl From<ToolError> for ToolCallResult {
    fn from(err: ToolError) -> Self {
        Self::error(err.to_string())
    }
}

/// A callable tool.
pub trait Tool: Identifiable {
    /// Describes the tool for `tools/list`.
    fn metadata(&self) -> ToolMetadata;

    /// Executes a resolved call.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the tool fails. The caller reports it as
    /// `isError: true` content, not as a protocol error.
    fn call(&self, call: &ToolCall) -> Result<ToolCallResult, ToolError>;

    /// Asks an in-flight [`call`](Tool::call) to stop early.
    ///
    /// Invoked from another thread when a call runs past its time limit.
    /// Tools that cannot be interrupted keep the default, which does nothing.
    fn cancel(&self) {}
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A resource entry for the `resources/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Resource URI, the lookup key.
    pub uri: String,
    /// Short name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the contents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The contents returned by `resources/read`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// URI of the resource that was read.
    pub uri: String,
    /// MIME type of `text`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// The contents.
    pub text: String,
}

/// A readable resource.
pub trait Resource: Identifiable {
    /// Describes the resource for `resources/list`.
    fn metadata(&self) -> ResourceMetadata;

    /// Reads the current contents.
    ///
    /// # Errors
    ///
    /// Returns an [`McpError`] if the contents cannot be produced.
    fn read(&self) -> Result<ResourceContents, McpError>;
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// One argument a prompt accepts.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// A prompt entry for the `prompts/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMetadata {
    /// Prompt name, the lookup key.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accepted arguments.
    pub arguments: Vec<PromptArgument>,
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The user.
    User,
    /// The assistant.
    Assistant,
}

/// Content of a prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    /// Who says it.
    pub role: Role,
    /// What is said.
    pub content: PromptContent,
}

impl PromptMessage {
    /// Creates a user text message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: PromptContent::Text { text: text.into() },
        }
    }
}

/// The result of `prompts/get`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptResult {
    /// Description of the rendered prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages.
    pub messages: Vec<PromptMessage>,
}

/// A prompt template.
pub trait Prompt: Identifiable {
    /// Describes the prompt for `prompts/list`.
    fn metadata(&self) -> PromptMetadata;

    /// Renders the prompt with the given arguments.
    ///
    /// Required arguments are checked by the handler before this is called.
    ///
    /// # Errors
    ///
    /// Returns an [`McpError`] if rendering fails.
    fn get(&self, arguments: &Map<String, Value>) -> Result<PromptResult, McpError>;
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// An ordered registry of capability items of one kind.
pub struct Chain<T: ?Sized> {
    kind: CapabilityKind,
    items: Vec<Arc<T>>,
    index: HashMap<String, usize>,
}

/// The tool chain.
pub type ToolChain = Chain<dyn Tool>;
/// The resource chain.
pub type ResourceChain = Chain<dyn Resource>;
/// The prompt chain.
pub type PromptChain = Chain<dyn Prompt>;

impl<T: ?Sized + Identifiable> Chain<T> {
    /// Builds a chain, binding `sink` to every item.
    ///
    /// Each item gets a sink scoped to its identifier.
    #[must_use]
    pub fn new(kind: CapabilityKind, items: Vec<Box<T>>, sink: &LogSink) -> Self {
        let mut chain = Self::empty(kind);

        for mut item in items {
            let scoped = sink.scoped(item.identifier());
            item.bind_log_sink(scoped);

            let position = chain.items.len();
            let key = item.identifier().to_string();
            if chain.index.contains_key(&key) {
                tracing::warn!(
                    kind = %kind,
                    identifier = %key,
                    "Duplicate capability registered; later entry is unreachable"
                );
            } else {
                chain.index.insert(key, position);
            }
            chain.items.push(Arc::from(item));
        }

        chain
    }

    /// Creates a chain with no items.
    #[must_use]
    pub fn empty(kind: CapabilityKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Which kind of capability this chain holds.
    #[must_use]
    pub const fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Number of registered items, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates items in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }

    /// Resolves an item by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NotFound`] if no item has that identifier.
    pub fn find(&self, identifier: &str) -> Result<Arc<T>, McpError> {
        self.index
            .get(identifier)
            .map(|&i| Arc::clone(&self.items[i]))
            .ok_or_else(|| McpError::NotFound {
                kind: self.kind,
                identifier: identifier.to_string(),
            })
    }
}

impl Chain<dyn Tool> {
    /// Metadata for every tool, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolMetadata> {
        self.items.iter().map(|t| t.metadata()).collect()
    }
}

impl Chain<dyn Resource> {
    /// Metadata for every resource, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceMetadata> {
        self.items.iter().map(|r| r.metadata()).collect()
    }
}

impl Chain<dyn Prompt> {
    /// Metadata for every prompt, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<PromptMetadata> {
        self.items.iter().map(|p| p.metadata()).collect()
    }
}
