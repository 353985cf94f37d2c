//! JSON-RPC 2.0 / MCP dispatch for a single POSTed message.
//!
//! A message with an `id` (any of string, number or null) is a request and
//! always gets an envelope back. A message without one is a notification:
//! it runs, and its outcome is only logged.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

use crate::error::{AgentError, Result};
use crate::state::AppState;
use crate::tools;

pub const JSONRPC_VERSION: &str = "2.0";
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
    Null,
}

impl RequestId {
    fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Number(n) => Some(RequestId::Number(n)),
            Value::String(s) => Some(RequestId::String(s)),
            Value::Null => Some(RequestId::Null),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// `None` marks a notification.
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl From<&AgentError> for RpcError {
    fn from(e: &AgentError) -> Self {
        Self {
            code: e.code(),
            message: e.client_message(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, err: &AgentError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }
}

/// Handle one raw message. Returns `None` for notifications.
pub async fn handle_message(state: &AppState, body: &[u8]) -> Option<RpcResponse> {
    let req = match parse_request(body) {
        Ok(req) => req,
        Err((id, err)) => {
            debug!(error = %err, "rejected malformed message");
            return Some(RpcResponse::failure(id, &err));
        }
    };

    let outcome = guard_panics(&req.method, dispatch(state, &req)).await;

    match req.id {
        None => {
            if let Err(e) = outcome {
                debug!(method = %req.method, error = %e, "notification failed");
            }
            None
        }
        Some(id) => Some(match outcome {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => {
                if matches!(e, AgentError::Internal) {
                    error!(method = %req.method, "internal error");
                }
                RpcResponse::failure(id, &e)
            }
        }),
    }
}

/// Run a handler, turning a panic into `AgentError::Internal`. The panic
/// text is logged and never reaches the client.
async fn guard_panics<F>(method: &str, handler: F) -> Result<Value>
where
    F: Future<Output = Result<Value>>,
{
    AssertUnwindSafe(handler)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(method, panic = %detail, "dispatch panicked");
            Err(AgentError::Internal)
        })
}

/// Structural validation. Errors carry the id to answer with (null when none
/// could be recovered).
pub fn parse_request(body: &[u8]) -> std::result::Result<RpcRequest, (RequestId, AgentError)> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| (RequestId::Null, AgentError::Parse))?;
    let Value::Object(mut obj) = value else {
        return Err((
            RequestId::Null,
            AgentError::InvalidRequest("expected a single JSON object".into()),
        ));
    };

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => match RequestId::from_value(raw) {
            Some(id) => Some(id),
            None => {
                return Err((
                    RequestId::Null,
                    AgentError::InvalidRequest("id must be a string, number or null".into()),
                ))
            }
        },
    };
    let reply_id = id.clone().unwrap_or(RequestId::Null);
    let invalid = |msg: &str| (reply_id.clone(), AgentError::InvalidRequest(msg.to_string()));

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        _ => return Err(invalid("jsonrpc must be \"2.0\"")),
    }
    let method = match obj.remove("method") {
        Some(Value::String(m)) => m,
        _ => return Err(invalid("method must be a string")),
    };
    let params = match obj.remove("params") {
        None => Value::Null,
        Some(p @ (Value::Null | Value::Object(_) | Value::Array(_))) => p,
        Some(_) => return Err(invalid("params must be an object or an array")),
    };

    Ok(RpcRequest { id, method, params })
}

async fn dispatch(state: &AppState, req: &RpcRequest) -> Result<Value> {
    match req.method.as_str() {
        "initialize" => Ok(initialize(&req.params)),
        "initialized" | "notifications/initialized" | "ping" => Ok(json!({})),
        "tools/list" => {
            let tools = serde_json::to_value(tools::list()).map_err(|_| AgentError::Internal)?;
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => call_tool(state, &req.params).await,
        other => match tools::lookup_legacy(other) {
            Some(op) => tools::run(op, &req.params, state).await,
            None => Err(AgentError::MethodNotFound(other.to_string())),
        },
    }
}

fn initialize(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

async fn call_tool(state: &AppState, params: &Value) -> Result<Value> {
    let obj: &Map<String, Value> = params
        .as_object()
        .ok_or_else(|| AgentError::InvalidParams("tools/call expects an object".into()))?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidParams("tool name must be a string".into()))?;
    let args = obj.get("arguments").unwrap_or(&Value::Null);

    let payload = tools::invoke(name, args, state).await?;
    let text = serde_json::to_string(&payload).map_err(|e| {
        error!(tool = name, error = %e, "failed to encode tool result");
        AgentError::Internal
    })?;
    Ok(json!({ "content": [{ "type": "text", "text": text }] }))
}
