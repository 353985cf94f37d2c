//! MCP tool registry: a static name -> operation table with descriptors and
//! the legacy direct-method aliases.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::error;

use crate::error::{AgentError, Result};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolOp {
    SystemInfo,
    CpuInfo,
    MemoryInfo,
    DiskInfo,
    NetworkInfo,
    Processes,
    ProcessByPid,
    SystemMetrics,
    StartMonitoring,
    StopMonitoring,
    MonitoringStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

struct Tool {
    op: ToolOp,
    legacy: &'static str,
    descriptor: ToolDescriptor,
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn tool(op: ToolOp, name: &'static str, legacy: &'static str, description: &'static str) -> Tool {
    tool_with_schema(op, name, legacy, description, no_args())
}

fn tool_with_schema(
    op: ToolOp,
    name: &'static str,
    legacy: &'static str,
    description: &'static str,
    input_schema: Value,
) -> Tool {
    Tool {
        op,
        legacy,
        descriptor: ToolDescriptor {
            name,
            description,
            input_schema,
        },
    }
}

static TOOLS: Lazy<Vec<Tool>> = Lazy::new(|| {
    vec![
        tool(
            ToolOp::SystemInfo,
            "get_system_info",
            "getSystemInfo",
            "Hostname, operating system, kernel version, uptime and boot time",
        ),
        tool(
            ToolOp::CpuInfo,
            "get_cpu_info",
            "getCPUInfo",
            "CPU model, frequency, core count, current usage and temperature",
        ),
        tool(
            ToolOp::MemoryInfo,
            "get_memory_info",
            "getMemoryInfo",
            "Physical memory and swap usage in bytes",
        ),
        tool(
            ToolOp::DiskInfo,
            "get_disk_info",
            "getDiskInfo",
            "Capacity and usage of every mounted filesystem",
        ),
        tool(
            ToolOp::NetworkInfo,
            "get_network_info",
            "getNetworkInfo",
            "Network interfaces with addresses and cumulative traffic counters",
        ),
        tool_with_schema(
            ToolOp::Processes,
            "get_processes",
            "getProcesses",
            "Running processes ordered by CPU usage, highest first",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Return at most this many processes"
                    }
                }
            }),
        ),
        tool_with_schema(
            ToolOp::ProcessByPid,
            "get_process_by_pid",
            "getProcessByPID",
            "Details of a single process",
            json!({
                "type": "object",
                "properties": {
                    "pid": { "type": "integer", "minimum": 0, "description": "Process id" }
                },
                "required": ["pid"]
            }),
        ),
        tool(
            ToolOp::SystemMetrics,
            "get_system_metrics",
            "getSystemMetrics",
            "Full snapshot: system, CPU, memory, disks, networks and processes",
        ),
        tool(
            ToolOp::StartMonitoring,
            "start_monitoring",
            "startMonitoring",
            "Start periodic background sampling of system metrics",
        ),
        tool(
            ToolOp::StopMonitoring,
            "stop_monitoring",
            "stopMonitoring",
            "Stop periodic background sampling",
        ),
        tool(
            ToolOp::MonitoringStatus,
            "get_monitoring_status",
            "getMonitoringStatus",
            "State of the monitoring session and its latest sample",
        ),
    ]
});

static BY_NAME: Lazy<HashMap<&'static str, ToolOp>> =
    Lazy::new(|| TOOLS.iter().map(|t| (t.descriptor.name, t.op)).collect());

static BY_LEGACY: Lazy<HashMap<&'static str, ToolOp>> =
    Lazy::new(|| TOOLS.iter().map(|t| (t.legacy, t.op)).collect());

/// Descriptors in registry order, as advertised by `tools/list`.
pub fn list() -> Vec<&'static ToolDescriptor> {
    TOOLS.iter().map(|t| &t.descriptor).collect()
}

pub fn lookup(name: &str) -> Option<ToolOp> {
    BY_NAME.get(name).copied()
}

pub fn lookup_legacy(method: &str) -> Option<ToolOp> {
    BY_LEGACY.get(method).copied()
}

pub async fn invoke(name: &str, args: &Value, state: &AppState) -> Result<Value> {
    let op = lookup(name).ok_or_else(|| AgentError::MethodNotFound(name.to_string()))?;
    run(op, args, state).await
}

pub async fn run(op: ToolOp, args: &Value, state: &AppState) -> Result<Value> {
    let args = arguments(args)?;
    let c = &state.collector;
    match op {
        ToolOp::SystemInfo => to_value(c.collect_system().await?),
        ToolOp::CpuInfo => to_value(c.collect_cpu().await?),
        ToolOp::MemoryInfo => to_value(c.collect_memory().await?),
        ToolOp::DiskInfo => to_value(c.collect_disks().await?),
        ToolOp::NetworkInfo => to_value(c.collect_networks().await?),
        ToolOp::Processes => {
            let limit = limit_arg(args)?;
            let mut procs = c.collect_processes().await?;
            if let Some(n) = limit {
                procs.truncate(n);
            }
            to_value(procs)
        }
        ToolOp::ProcessByPid => {
            let pid = pid_arg(args)?;
            to_value(c.collect_process(pid).await?)
        }
        ToolOp::SystemMetrics => to_value(c.collect_metrics().await?),
        ToolOp::StartMonitoring => to_value(state.monitor.start().await?),
        ToolOp::StopMonitoring => to_value(state.monitor.stop().await?),
        ToolOp::MonitoringStatus => to_value(state.monitor.status().await),
    }
}

fn to_value<T: Serialize>(payload: T) -> Result<Value> {
    serde_json::to_value(payload).map_err(|e| {
        error!(error = %e, "failed to serialize tool payload");
        AgentError::Internal
    })
}

fn arguments(args: &Value) -> Result<Option<&Map<String, Value>>> {
    match args {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(AgentError::InvalidParams("arguments must be an object".into())),
    }
}

fn pid_arg(args: Option<&Map<String, Value>>) -> Result<u32> {
    let raw = args
        .and_then(|m| m.get("pid"))
        .ok_or_else(|| AgentError::InvalidParams("missing required argument: pid".into()))?;
    raw.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            AgentError::InvalidParams("pid must be a non-negative 32-bit integer".into())
        })
}

fn limit_arg(args: Option<&Map<String, Value>>) -> Result<Option<usize>> {
    match args.and_then(|m| m.get("limit")) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| AgentError::InvalidParams("limit must be a positive integer".into()))
            .and_then(check_limit)
            .map(Some),
    }
}

/// Shared with the REST `?limit=` query.
pub fn check_limit(n: u64) -> Result<usize> {
    if n == 0 {
        return Err(AgentError::InvalidParams("limit must be a positive integer".into()));
    }
    Ok(usize::try_from(n).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{INVALID_PARAMS, METHOD_NOT_FOUND};

    #[test]
    fn registry_order_and_aliases() {
        let names: Vec<_> = list().iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 11);
        assert_eq!(names[0], "get_system_info");
        assert_eq!(names[10], "get_monitoring_status");
        assert_eq!(lookup("get_process_by_pid"), Some(ToolOp::ProcessByPid));
        assert_eq!(lookup_legacy("getCPUInfo"), Some(ToolOp::CpuInfo));
        assert_eq!(lookup_legacy("stopMonitoring"), Some(ToolOp::StopMonitoring));
        assert_eq!(lookup("getCPUInfo"), None);
        assert_eq!(lookup_legacy("get_cpu_info"), None);
    }

    #[test]
    fn descriptors_serialize_with_input_schema() {
        let v = serde_json::to_value(list()).unwrap();
        let pid_tool = &v[6];
        assert_eq!(pid_tool["name"], "get_process_by_pid");
        assert_eq!(pid_tool["inputSchema"]["required"], json!(["pid"]));
        assert!(v[0]["inputSchema"].is_object());
    }

    #[test]
    fn pid_validation() {
        let ok = json!({ "pid": 42 });
        assert_eq!(pid_arg(ok.as_object()).unwrap(), 42);
        let bad_args = [
            json!({}),
            json!({ "pid": "42" }),
            json!({ "pid": -1 }),
            json!({ "pid": 1.5 }),
            json!({ "pid": 5_000_000_000u64 }),
        ];
        for bad in bad_args {
            let err = pid_arg(bad.as_object()).unwrap_err();
            assert_eq!(err.code(), INVALID_PARAMS, "{bad}");
        }
        assert_eq!(pid_arg(None).unwrap_err().code(), INVALID_PARAMS);
    }

    #[test]
    fn limit_validation() {
        assert_eq!(limit_arg(None).unwrap(), None);
        assert_eq!(limit_arg(json!({ "limit": null }).as_object()).unwrap(), None);
        assert_eq!(limit_arg(json!({ "limit": 3 }).as_object()).unwrap(), Some(3));
        for bad in [json!({ "limit": 0 }), json!({ "limit": -2 }), json!({ "limit": "3" })] {
            assert_eq!(limit_arg(bad.as_object()).unwrap_err().code(), INVALID_PARAMS);
        }
    }

    #[test]
    fn non_object_arguments_rejected() {
        assert!(arguments(&Value::Null).unwrap().is_none());
        assert_eq!(arguments(&json!([1])).unwrap_err().code(), INVALID_PARAMS);
        assert_eq!(arguments(&json!("x")).unwrap_err().code(), INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let state = AppState::new(Default::default());
        let err = invoke("reboot_host", &Value::Null, &state).await.unwrap_err();
        assert_eq!(err.code(), METHOD_NOT_FOUND);
    }
}
