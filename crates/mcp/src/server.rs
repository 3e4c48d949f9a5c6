use mac_bridge_core::{ConfigStore, DispatchError, Dispatcher};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::transport::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};

const SERVER_NAME: &str = "mac-bridge";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol state machine shared by the stdio and HTTP front-ends.
pub struct McpServer {
    dispatcher: Dispatcher,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_dispatcher(Dispatcher::new(store))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handles one JSON-RPC message. Returns `None` for notifications.
    pub async fn handle_request(&self, input: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable message");
                let resp = JsonRpcResponse::error(None, PARSE_ERROR, "Parse error");
                return Some(resp.encode());
            }
        };

        if request.is_notification() {
            if matches!(
                request.method.as_str(),
                "initialized" | "notifications/initialized"
            ) {
                self.initialized.store(true, Ordering::SeqCst);
            }
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&request),
            "tools/list" => self.handle_tools_list(&request),
            "tools/call" => self.handle_tools_call(&request).await,
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            _ => JsonRpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };

        Some(response.encode())
    }

    fn handle_initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            request.id.clone(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    fn handle_tools_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let tools = self.dispatcher.definitions();
        JsonRpcResponse::success(request.id.clone(), json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let params = match &request.params {
            Some(p) => p,
            None => {
                return JsonRpcResponse::error(request.id.clone(), INVALID_PARAMS, "Missing params")
            }
        };

        let name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => {
                return JsonRpcResponse::error(
                    request.id.clone(),
                    INVALID_PARAMS,
                    "Missing tool name",
                )
            }
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match self.dispatcher.dispatch(name, arguments).await {
            Ok(text) => JsonRpcResponse::success(
                request.id.clone(),
                json!({
                    "content": [{
                        "type": "text",
                        "text": text
                    }]
                }),
            ),
            Err(DispatchError::UnknownTool(tool)) => JsonRpcResponse::error(
                request.id.clone(),
                INVALID_PARAMS,
                format!("Unknown tool: {}", tool),
            ),
        }
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new(ConfigStore::default())
    }
}
