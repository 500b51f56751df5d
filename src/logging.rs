//! Logging sink handed to capability items.
//!
//! Tools, resources and prompts do not get a logger passed on every call.
//! Instead, a chain binds one [`LogSink`] to each item when it is built, and
//! the item keeps it for the lifetime of the process.
//!
//! A sink accepts a level, a message template with `{placeholder}` markers and
//! a structured context map. Placeholders are filled from the context and the
//! result is emitted as a `tracing` event, so it lands wherever the process's
//! subscriber writes (stderr, text or JSON).

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::Level;

/// Structured context attached to a log message.
pub type LogContext = Map<String, Value>;

/// A named handle that forwards templated messages to `tracing`.
#[derive(Debug, Clone)]
pub struct LogSink {
    component: Arc<str>,
}

impl LogSink {
    /// Creates a sink whose events carry the given component name.
    #[must_use]
    pub fn new(component: &str) -> Self {
        Self {
            component: Arc::from(component),
        }
    }

    /// Returns the component name attached to every event.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Returns a sink for a sub-component, e.g. `tools.execute_sql`.
    #[must_use]
    pub fn scoped(&self, name: &str) -> Self {
        Self::new(&format!("{}.{name}", self.component))
    }

    /// Emits a message at the given level.
    pub fn log(&self, level: Level, template: &str, context: &LogContext) {
        let message = interpolate(template, context);
        let component = &*self.component;
        let context = Value::Object(context.clone());

        match level {
            Level::ERROR => tracing::error!(component, %context, "{message}"),
            Level::WARN => tracing::warn!(component, %context, "{message}"),
            Level::INFO => tracing::info!(component, %context, "{message}"),
            Level::DEBUG => tracing::debug!(component, %context, "{message}"),
            _ => tracing::trace!(component, %context, "{message}"),
        }
    }

    /// Emits an error-level message.
    pub fn error(&self, template: &str, context: &LogContext) {
        self.log(Level::ERROR, template, context);
    }

    /// Emits a warn-level message.
    pub fn warn(&self, template: &str, context: &LogContext) {
        self.log(Level::WARN, template, context);
    }

    /// Emits an info-level message.
    pub fn info(&self, template: &str, context: &LogContext) {
        self.log(Level::INFO, template, context);
    }

    /// Emits a debug-level message.
    pub fn debug(&self, template: &str, context: &LogContext) {
        self.log(Level::DEBUG, template, context);
    }
}

/// Replaces `{key}` markers in `template` with values from `context`.
///
/// Strings are inserted without quotes, numbers and booleans verbatim, `null`
/// as an empty string. Arrays and objects become `[array]` and `[object]`.
/// Markers with no matching key are left as they are. The template is
/// scanned once, so markers inside inserted values are not expanded.
#[must_use]
pub fn interpolate(template: &str, context: &LogContext) -> String {
    if !template.contains('{') || context.is_empty() {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let lookup = after
            .find('}')
            .and_then(|close| context.get(&after[..close]).map(|value| (close, value)));
        match lookup {
            Some((close, value)) => {
                push_value(&mut out, value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Array(_) => out.push_str("[array]"),
        Value::Object(_) => out.push_str("[object]"),
    }
}

/// Builds a [`LogContext`] from key/value pairs.
///
/// ```
/// use query_server_mcp::log_context;
///
/// let ctx = log_context! { "sql" => "SELECT 1", "count" => 1 };
/// assert_eq!(ctx["count"], 1);
/// ```
#[macro_export]
macro_rules! log_context {
    () => { $crate::logging::LogContext::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut ctx = $crate::logging::LogContext::new();
        $( ctx.insert(($key).to_string(), ::serde_json::json!($value)); )+
        ctx
    }};
}
