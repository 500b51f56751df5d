//! JSON-RPC dispatcher: raw frame in, response frame (or nothing) out.
//!
//! Each frame moves through `received -> decoded -> routed -> handled ->
//! encoded`. A failure at any stage short-circuits to an error response for
//! that message alone. Notifications never produce output, not even on
//! failure.
//!
//! The dispatcher keeps no per-message state. The only thing it remembers
//! between frames is whether the client has sent `initialized`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::mcp::handlers::{
    notification_handlers, request_handlers, Capabilities, InitializeHandler,
    NotificationHandler, RequestHandler,
};
use crate::mcp::protocol::{
    parse_frame, ErrorCode, IncomingFrame, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingFrame, OutgoingMessage,
};

/// Maximum bytes per JSON-RPC frame (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Prefix MCP puts on notification method names.
const NOTIFICATION_PREFIX: &str = "notifications/";

/// Routes decoded messages to handlers by method name.
pub struct JsonRpcDispatcher {
    requests: HashMap<&'static str, RequestHandler>,
    notifications: HashMap<&'static str, NotificationHandler>,
    initialized: Arc<AtomicBool>,
    max_message_bytes: usize,
}

impl JsonRpcDispatcher {
    /// Creates a dispatcher over explicit handler lists.
    ///
    /// If two handlers declare the same method the first one wins.
    #[must_use]
    pub fn new(
        request_handlers: Vec<RequestHandler>,
        notification_handlers: Vec<NotificationHandler>,
        initialized: Arc<AtomicBool>,
    ) -> Self {
        let mut requests = HashMap::new();
        for handler in request_handlers {
            let method = handler.supported_method();
            if requests.contains_key(method) {
                warn!(method, "Duplicate request handler ignored");
                continue;
            }
            requests.insert(method, handler);
        }

        let mut notifications = HashMap::new();
        for handler in notification_handlers {
            let method = handler.supported_method();
            if notifications.contains_key(method) {
                warn!(method, "Duplicate notification handler ignored");
                continue;
            }
            notifications.insert(method, handler);
        }

        Self {
            requests,
            notifications,
            initialized,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Creates a dispatcher with the full MCP handler set.
    #[must_use]
    pub fn build(
        initialize: InitializeHandler,
        capabilities: &Capabilities,
        tool_timeout: Duration,
    ) -> Self {
        let initialized = Arc::new(AtomicBool::new(false));
        Self::new(
            request_handlers(initialize, capabilities, tool_timeout),
            notification_handlers(&initialized),
            initialized,
        )
    }

    /// Sets the largest frame accepted before decoding.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    /// Returns `true` once the client has sent `initialized`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handles one raw input frame.
    ///
    /// Returns the frame to write back, or `None` when nothing should be
    /// written (blank lines, notifications, batches of only notifications).
    pub async fn dispatch_frame(&self, raw: &[u8]) -> Option<OutgoingFrame> {
        if raw.len() > self.max_message_bytes {
            warn!(
                bytes = raw.len(),
                limit = self.max_message_bytes,
                "Message too large"
            );
            return Some(OutgoingFrame::Single(
                JsonRpcError::new(
                    None,
                    JsonRpcErrorData::with_message(
                        ErrorCode::InvalidRequest,
                        format!(
                            "Message too large: {} bytes (limit {})",
                            raw.len(),
                            self.max_message_bytes
                        ),
                    ),
                )
                .into(),
            ));
        }

        let Ok(text) = std::str::from_utf8(raw) else {
            warn!("Dropping frame that is not valid UTF-8");
            return Some(OutgoingFrame::Single(JsonRpcError::parse_error().into()));
        };

        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match parse_frame(text) {
            Ok(IncomingFrame::Single(message)) => {
                self.dispatch(message).await.map(OutgoingFrame::Single)
            }
            Ok(IncomingFrame::Batch(items)) => {
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    let response = match item {
                        Ok(message) => self.dispatch(message).await,
                        Err(error) => Some(error.into()),
                    };
                    responses.extend(response);
                }

                if responses.is_empty() {
                    None
                } else {
                    Some(OutgoingFrame::Batch(responses))
                }
            }
            Err(error) => {
                debug!(code = error.error.code, "Failed to decode frame");
                Some(OutgoingFrame::Single(error.into()))
            }
        }
    }

    /// Routes one decoded message.
    ///
    /// Requests always produce a response; notifications never do.
    pub async fn dispatch(&self, message: IncomingMessage) -> Option<OutgoingMessage> {
        match message {
            IncomingMessage::Request(req) => Some(self.handle_request(req).await),
            IncomingMessage::Notification(notif) => {
                self.handle_notification(&notif);
                None
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&self, req: JsonRpcRequest) -> OutgoingMessage {
        debug!(id = %req.id, method = %req.method, "Handling request");

        let Some(handler) = self.requests.get(req.method.as_str()) else {
            return JsonRpcError::method_not_found(req.id, &req.method).into();
        };

        if handler.supported_method() == "tools/call" && !self.is_initialized() {
            warn!(id = %req.id, "tools/call received before the initialized notification");
        }

        match handler.handle(req.params.as_ref()).await {
            Ok(result) => JsonRpcResponse::success(req.id, result).into(),
            Err(error) => {
                debug!(id = %req.id, method = %req.method, error = %error, "Request failed");
                JsonRpcError::new(Some(req.id), error.into()).into()
            }
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&self, notif: &JsonRpcNotification) {
        let method = notif
            .method
            .strip_prefix(NOTIFICATION_PREFIX)
            .unwrap_or(&notif.method);

        match self.notifications.get(method) {
            Some(handler) => handler.handle(notif.params.as_ref()),
            None => debug!(method = %notif.method, "Ignoring unhandled notification"),
        }
    }
}
