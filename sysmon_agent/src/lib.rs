//! sysmon_agent: host telemetry over a REST facade and MCP (JSON-RPC 2.0).

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod parse;
pub mod rpc;
pub mod sampler;
pub mod state;
pub mod tools;
pub mod types;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use state::AppState;
