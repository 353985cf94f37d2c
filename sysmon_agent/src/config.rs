//! Agent configuration: `SYSMON_AGENT_*` environment variables plus `--port`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 57996;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 5_000;
const MIN_SAMPLE_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Period of the continuous-monitoring sampler.
    pub sample_interval: Duration,
    /// Probe hardware sensors for CPU temperature.
    pub temperature: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
            temperature: true,
        }
    }
}

impl AgentConfig {
    /// Environment first, then `--port`/`-p` from the command line.
    pub fn load<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut cfg = Self::from_lookup(|key| std::env::var(key).ok());
        cfg.port = parse_port(args, cfg.port);
        cfg
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SYSMON_AGENT_BIND") {
            match v.parse::<IpAddr>() {
                Ok(ip) => cfg.bind = ip,
                Err(_) => warn!(value = %v, "ignoring invalid SYSMON_AGENT_BIND"),
            }
        }
        if let Some(v) = lookup("SYSMON_AGENT_PORT") {
            match v.parse::<u16>() {
                Ok(p) => cfg.port = p,
                Err(_) => warn!(value = %v, "ignoring invalid SYSMON_AGENT_PORT"),
            }
        }
        if let Some(v) = lookup("SYSMON_AGENT_SAMPLE_INTERVAL_MS") {
            match v.parse::<u64>() {
                Ok(ms) if ms >= MIN_SAMPLE_INTERVAL_MS => {
                    cfg.sample_interval = Duration::from_millis(ms)
                }
                _ => warn!(value = %v, "ignoring invalid SYSMON_AGENT_SAMPLE_INTERVAL_MS"),
            }
        }
        if let Some(v) = lookup("SYSMON_AGENT_TEMP") {
            cfg.temperature = v != "0";
        }
        cfg
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}
