//! Error taxonomy shared by the JSON-RPC dispatcher and the REST facade.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const PROCESS_NOT_FOUND: i32 = -32001;
pub const MONITORING_ALREADY_STARTED: i32 = -32002;
pub const MONITORING_NOT_STARTED: i32 = -32003;
pub const SYSTEM_COMMAND_FAILED: i32 = -32004;
pub const PERMISSION_DENIED: i32 = -32005;

/// Every failure a client can observe.
///
/// `Display` is what goes to clients, so variants carry only short labels
/// (a method name, a resource such as `"process list"`). OS error text and
/// command lines are logged where the failure happens and never stored here.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Parse error")]
    Parse,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error")]
    Internal,

    #[error("Process with PID {0} not found")]
    ProcessNotFound(u32),
    #[error("Monitoring already started")]
    MonitoringAlreadyStarted,
    #[error("Monitoring not started")]
    MonitoringNotStarted,
    #[error("Failed to collect {resource}")]
    SystemCommandFailed { resource: &'static str },
    #[error("Permission denied while collecting {resource}")]
    PermissionDenied { resource: &'static str },
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    pub fn code(&self) -> i32 {
        match self {
            AgentError::Parse => PARSE_ERROR,
            AgentError::InvalidRequest(_) => INVALID_REQUEST,
            AgentError::MethodNotFound(_) => METHOD_NOT_FOUND,
            AgentError::InvalidParams(_) => INVALID_PARAMS,
            AgentError::Internal => INTERNAL_ERROR,
            AgentError::ProcessNotFound(_) => PROCESS_NOT_FOUND,
            AgentError::MonitoringAlreadyStarted => MONITORING_ALREADY_STARTED,
            AgentError::MonitoringNotStarted => MONITORING_NOT_STARTED,
            AgentError::SystemCommandFailed { .. } => SYSTEM_COMMAND_FAILED,
            AgentError::PermissionDenied { .. } => PERMISSION_DENIED,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AgentError::Parse | AgentError::InvalidRequest(_) | AgentError::InvalidParams(_) => {
                StatusCode::BAD_REQUEST
            }
            AgentError::MethodNotFound(_) | AgentError::ProcessNotFound(_) => StatusCode::NOT_FOUND,
            AgentError::MonitoringAlreadyStarted | AgentError::MonitoringNotStarted => {
                StatusCode::CONFLICT
            }
            AgentError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AgentError::Internal | AgentError::SystemCommandFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn client_message(&self) -> String {
        self.to_string()
    }

    /// Map a failure to spawn an OS utility; the caller logs the io error.
    pub fn from_spawn(err: &std::io::Error, resource: &'static str) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            AgentError::PermissionDenied { resource }
        } else {
            AgentError::SystemCommandFailed { resource }
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.client_message(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        let cases = [
            (AgentError::Parse, -32700, 400),
            (AgentError::InvalidRequest("x".into()), -32600, 400),
            (AgentError::MethodNotFound("x".into()), -32601, 404),
            (AgentError::InvalidParams("x".into()), -32602, 400),
            (AgentError::Internal, -32603, 500),
            (AgentError::ProcessNotFound(7), -32001, 404),
            (AgentError::MonitoringAlreadyStarted, -32002, 409),
            (AgentError::MonitoringNotStarted, -32003, 409),
            (AgentError::SystemCommandFailed { resource: "disks" }, -32004, 500),
            (AgentError::PermissionDenied { resource: "disks" }, -32005, 403),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code, "{err:?}");
            assert_eq!(err.status().as_u16(), status, "{err:?}");
        }
    }

    #[test]
    fn spawn_errors_map_by_kind() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(AgentError::from_spawn(&denied, "process list").code(), PERMISSION_DENIED);
        assert_eq!(AgentError::from_spawn(&missing, "process list").code(), SYSTEM_COMMAND_FAILED);
    }

    #[test]
    fn messages_carry_only_labels() {
        let msg = AgentError::SystemCommandFailed { resource: "disk usage" }.client_message();
        assert_eq!(msg, "Failed to collect disk usage");
        assert_eq!(AgentError::Internal.client_message(), "Internal error");
    }
}
