//! Host data collection using sysinfo plus the `ps`/`df` utilities.
//!
//! Every call reads the OS again; the only thing kept between calls is the
//! sysinfo `System` handle, which CPU usage needs to compute deltas.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::IpAddr;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, NetworkData, Networks, Pid,
    ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System, Users,
};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::parse::{parse_ps_row, percent};
use crate::types::{
    CpuInfo, DiskInfo, MemoryInfo, NetworkInfo, ProcessInfo, SystemInfo, SystemMetrics,
};

const PS_COLUMNS: &str = "pid=,user=,pcpu=,pmem=,rss=,stat=,etime=,pri=,args=";

pub struct Collector {
    sys: Mutex<System>,
    temperature: bool,
}

impl Collector {
    pub fn new(temperature: bool) -> Self {
        // First refresh happens here so the next CPU read has a baseline.
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        Self {
            sys: Mutex::new(System::new_with_specifics(refresh_kind)),
            temperature,
        }
    }

    pub async fn collect_system(&self) -> Result<SystemInfo> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .or_else(System::host_name)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                warn!("hostname could not be determined");
                AgentError::SystemCommandFailed { resource: "hostname" }
            })?;

        let uptime = System::uptime();
        let boot_time = i64::try_from(System::boot_time())
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() - chrono::Duration::seconds(uptime as i64));

        Ok(SystemInfo {
            hostname,
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
            uptime,
            boot_time,
        })
    }

    pub async fn collect_cpu(&self) -> Result<CpuInfo> {
        let mut info = {
            let mut sys = self.sys.lock().await;
            sys.refresh_cpu_all();
            let cpus = sys.cpus();
            let first = cpus.first().ok_or_else(|| {
                warn!("sysinfo reported no CPUs");
                AgentError::SystemCommandFailed { resource: "cpu info" }
            })?;
            let brand = first.brand().trim();
            CpuInfo {
                name: if brand.is_empty() {
                    first.name().to_string()
                } else {
                    brand.to_string()
                },
                brand: first.vendor_id().to_string(),
                frequency: first.frequency(),
                cores: cpus.len() as u32,
                usage_percent: sys.global_cpu_usage().clamp(0.0, 100.0),
                temperature: None,
            }
        };
        if self.temperature {
            info.temperature = best_cpu_temp(&Components::new_with_refreshed_list());
        }
        Ok(info)
    }

    pub async fn collect_memory(&self) -> Result<MemoryInfo> {
        let mut sys = self.sys.lock().await;
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            warn!("sysinfo reported zero total memory");
            return Err(AgentError::SystemCommandFailed { resource: "memory info" });
        }
        let available = sys.available_memory().min(total);
        let used = total - available;
        // keep used + free <= total even when the OS counters race
        let free = sys.free_memory().min(total - used);

        let swap_total = sys.total_swap();
        let swap_free = sys.free_swap().min(swap_total);
        let swap_used = swap_total - swap_free;

        Ok(MemoryInfo {
            total,
            used,
            free,
            available,
            swap_total,
            swap_used,
            swap_free,
            usage_percent: percent(used, total),
            swap_usage_percent: percent(swap_used, swap_total),
        })
    }

    pub async fn collect_disks(&self) -> Result<Vec<DiskInfo>> {
        let disks = match df_disks().await? {
            Some(disks) => disks,
            None => disks_from_sysinfo(),
        };
        Ok(dedupe_mounts(disks))
    }

    pub async fn collect_networks(&self) -> Result<Vec<NetworkInfo>> {
        let networks = Networks::new_with_refreshed_list();
        let mut list: Vec<NetworkInfo> = networks
            .iter()
            .map(|(name, data)| network_info(name, data))
            .collect();
        list.sort_by(|a, b| a.interface.cmp(&b.interface));
        Ok(list)
    }

    /// All processes, highest CPU first (ties by ascending pid).
    pub async fn collect_processes(&self) -> Result<Vec<ProcessInfo>> {
        let mut procs = match ps_processes(&["-eo", PS_COLUMNS]).await? {
            Some(procs) => procs,
            None => self.processes_from_sysinfo(None).await,
        };
        if procs.is_empty() {
            warn!("process enumeration returned no rows");
            return Err(AgentError::SystemCommandFailed { resource: "process list" });
        }
        sort_processes(&mut procs);
        Ok(procs)
    }

    pub async fn collect_process(&self, pid: u32) -> Result<ProcessInfo> {
        let pid_arg = pid.to_string();
        let procs = match ps_processes(&["-p", pid_arg.as_str(), "-o", PS_COLUMNS]).await? {
            Some(procs) => procs,
            None => self.processes_from_sysinfo(Some(pid)).await,
        };
        procs
            .into_iter()
            .find(|p| p.pid == pid)
            .ok_or(AgentError::ProcessNotFound(pid))
    }

    pub async fn collect_metrics(&self) -> Result<SystemMetrics> {
        Ok(SystemMetrics {
            timestamp: Utc::now(),
            system_info: self.collect_system().await?,
            cpu_info: self.collect_cpu().await?,
            memory_info: self.collect_memory().await?,
            disks: self.collect_disks().await?,
            networks: self.collect_networks().await?,
            processes: self.collect_processes().await?,
        })
    }

    // Used when `ps` is not installed. sysinfo has no scheduling priority.
    async fn processes_from_sysinfo(&self, only: Option<u32>) -> Vec<ProcessInfo> {
        let mut sys = self.sys.lock().await;
        let pids = only.map(|pid| [Pid::from_u32(pid)]);
        let which = match &pids {
            Some(p) => ProcessesToUpdate::Some(p),
            None => ProcessesToUpdate::All,
        };
        sys.refresh_processes_specifics(
            which,
            true,
            ProcessRefreshKind::everything().without_tasks(),
        );
        sys.refresh_memory();

        let users = Users::new_with_refreshed_list();
        let total_mem = sys.total_memory();
        sys.processes()
            .values()
            .filter(|p| only.map_or(true, |pid| p.pid().as_u32() == pid))
            .map(|p| {
                let command = p
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                let name = p.name().to_string_lossy().into_owned();
                ProcessInfo {
                    pid: p.pid().as_u32(),
                    command: if command.is_empty() { name.clone() } else { command },
                    name,
                    cpu_usage: p.cpu_usage(),
                    memory_usage: p.memory(),
                    memory_usage_percent: percent(p.memory(), total_mem),
                    status: p.status().to_string(),
                    start_time: i64::try_from(p.start_time())
                        .ok()
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                    user: p
                        .user_id()
                        .and_then(|uid| users.get_user_by_id(uid))
                        .map(|u| u.name().to_string()),
                    priority: None,
                }
            })
            .collect()
    }
}

pub fn sort_processes(procs: &mut [ProcessInfo]) {
    procs.sort_by(|a, b| {
        b.cpu_usage
            .total_cmp(&a.cpu_usage)
            .then_with(|| a.pid.cmp(&b.pid))
    });
}

fn best_cpu_temp(components: &Components) -> Option<f32> {
    components
        .iter()
        .filter(|c| {
            let label = c.label().to_lowercase();
            label.contains("cpu")
                || label.contains("package")
                || label.contains("tctl")
                || label.contains("tdie")
        })
        .filter_map(|c| c.temperature())
        .filter(|t| t.is_finite())
        .max_by(|a, b| a.total_cmp(b))
}

fn network_info(name: &str, data: &NetworkData) -> NetworkInfo {
    let addrs: Vec<IpAddr> = data.ip_networks().iter().map(|n| n.addr).collect();
    let ip_address = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.to_string());
    let mac = data.mac_address();
    NetworkInfo {
        interface: name.to_string(),
        ip_address,
        mac_address: (mac.0 != [0u8; 6]).then(|| mac.to_string()),
        bytes_received: data.total_received(),
        bytes_transmitted: data.total_transmitted(),
        packets_received: data.total_packets_received(),
        packets_transmitted: data.total_packets_transmitted(),
        errors_received: data.total_errors_on_received(),
        errors_transmitted: data.total_errors_on_transmitted(),
    }
}

fn disks_from_sysinfo() -> Vec<DiskInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|d| {
            let total = d.total_space();
            let free = d.available_space().min(total);
            let used = total - free;
            DiskInfo {
                name: d.name().to_string_lossy().into_owned(),
                mount_point: d.mount_point().to_string_lossy().into_owned(),
                file_system: d.file_system().to_string_lossy().into_owned(),
                total_space: total,
                used_space: used,
                free_space: free,
                usage_percent: percent(used, total),
            }
        })
        .collect()
}

// One record per mount point; the first one reported wins.
fn dedupe_mounts(disks: Vec<DiskInfo>) -> Vec<DiskInfo> {
    let mut seen = HashSet::new();
    let mut out: Vec<DiskInfo> = disks
        .into_iter()
        .filter(|d| seen.insert(d.mount_point.clone()))
        .collect();
    out.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    out
}

struct CommandOutput {
    success: bool,
    stdout: String,
}

/// Run an OS utility. `Ok(None)` means it is not installed and the caller
/// should fall back to sysinfo.
async fn run_utility(
    program: &str,
    args: &[&str],
    resource: &'static str,
) -> Result<Option<CommandOutput>> {
    // kill_on_drop: an aborted sampler must not leave the child running
    match Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(out) => Ok(Some(CommandOutput {
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(program, "utility not found, falling back to sysinfo");
            Ok(None)
        }
        Err(e) => {
            warn!(program, error = %e, "failed to run utility");
            Err(AgentError::from_spawn(&e, resource))
        }
    }
}

#[cfg(unix)]
async fn ps_processes(args: &[&str]) -> Result<Option<Vec<ProcessInfo>>> {
    let Some(out) = run_utility("ps", args, "process list").await? else {
        return Ok(None);
    };
    if !out.success {
        // `ps -p` exits non-zero when the pid does not exist
        debug!(?args, "ps exited with failure status");
    }
    ps_rows(&out.stdout, Utc::now()).map(Some)
}

// Malformed rows are skipped; the listing fails only when no row parses.
#[cfg(any(unix, test))]
fn ps_rows(stdout: &str, now: DateTime<Utc>) -> Result<Vec<ProcessInfo>> {
    let rows: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    let procs: Vec<ProcessInfo> = rows
        .iter()
        .filter_map(|l| {
            parse_ps_row(l, now)
                .map_err(|e| warn!(error = %e, "skipping malformed ps row"))
                .ok()
        })
        .collect();
    if procs.is_empty() && !rows.is_empty() {
        warn!(rows = rows.len(), "no ps row could be parsed");
        return Err(AgentError::SystemCommandFailed { resource: "process list" });
    }
    Ok(procs)
}

#[cfg(not(unix))]
async fn ps_processes(_args: &[&str]) -> Result<Option<Vec<ProcessInfo>>> {
    Ok(None)
}

#[cfg(target_os = "linux")]
async fn df_disks() -> Result<Option<Vec<DiskInfo>>> {
    let args = ["-H", "--output=source,fstype,size,used,avail,target"];
    let Some(out) = run_utility("df", &args, "disk usage").await? else {
        return Ok(None);
    };
    df_rows(&out.stdout, out.success).map(Some)
}

// Skips the header and malformed rows; fails only when nothing usable is left.
#[cfg(any(target_os = "linux", test))]
fn df_rows(stdout: &str, success: bool) -> Result<Vec<DiskInfo>> {
    use crate::parse::parse_df_row;

    let rows: Vec<&str> = stdout
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .collect();
    // df exits non-zero when a single mount is unreadable but still lists the rest
    if rows.is_empty() && !success {
        warn!("df produced no rows");
        return Err(AgentError::SystemCommandFailed { resource: "disk usage" });
    }
    let disks: Vec<DiskInfo> = rows
        .iter()
        .filter_map(|l| {
            parse_df_row(l)
                .map_err(|e| warn!(error = %e, "skipping malformed df row"))
                .ok()
        })
        .collect();
    if disks.is_empty() && !rows.is_empty() {
        warn!(rows = rows.len(), "no df row could be parsed");
        return Err(AgentError::SystemCommandFailed { resource: "disk usage" });
    }
    Ok(disks)
}

#[cfg(not(target_os = "linux"))]
async fn df_disks() -> Result<Option<Vec<DiskInfo>>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: u32, cpu: f32) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: format!("p{pid}"),
            command: String::new(),
            cpu_usage: cpu,
            memory_usage: 0,
            memory_usage_percent: 0.0,
            status: "S".into(),
            start_time: None,
            user: None,
            priority: None,
        }
    }

    #[test]
    fn processes_sorted_by_cpu_then_pid() {
        let mut v = vec![proc(30, 1.0), proc(10, 5.0), proc(20, 1.0), proc(5, 0.0)];
        sort_processes(&mut v);
        let order: Vec<u32> = v.iter().map(|p| p.pid).collect();
        assert_eq!(order, vec![10, 20, 30, 5]);
    }

    #[test]
    fn duplicate_mounts_keep_first() {
        let disk = |name: &str, mount: &str| DiskInfo {
            name: name.into(),
            mount_point: mount.into(),
            file_system: "ext4".into(),
            total_space: 1,
            used_space: 0,
            free_space: 1,
            usage_percent: 0.0,
        };
        let out = dedupe_mounts(vec![disk("b", "/home"), disk("a", "/"), disk("c", "/home")]);
        let names: Vec<&str> = out.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn df_skips_malformed_rows() {
        let stdout = "\
Filesystem       Type        Size  Used Avail Mounted on
/dev/sda1        ext4        100G   40G   60G /
host:/my share   fuse.sshfs  1,0T  250G  750G /mnt/share
tmpfs            tmpfs       2,1G     0  2,1G /dev/shm
";
        let disks = df_rows(stdout, true).unwrap();
        let mounts: Vec<&str> = disks.iter().map(|d| d.mount_point.as_str()).collect();
        assert_eq!(mounts, vec!["/", "/dev/shm"]);
    }

    #[test]
    fn df_fails_only_when_nothing_parses() {
        let header = "Filesystem Type Size Used Avail Mounted on\n";
        assert!(df_rows(&format!("{header}garbage row\n"), true).is_err());
        assert!(df_rows("", false).is_err());
        assert!(df_rows(header, true).unwrap().is_empty());
    }

    #[test]
    fn ps_skips_malformed_rows() {
        let stdout = "\
    1 root      0.0  0.1  11000 Ss   10:00  19 /sbin/init
  abc root      0.0  0.0      0 S    00:01  19 broken
   42 alice     3.5  1.2  20480 R    01:02  19 /usr/bin/python3 app.py
";
        let procs = ps_rows(stdout, Utc::now()).unwrap();
        let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![1, 42]);
        assert!(ps_rows("not a ps row\n", Utc::now()).is_err());
        assert!(ps_rows("", Utc::now()).unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_utility_call_kills_child() {
        use std::time::Duration;

        let pid_file = std::env::temp_dir().join(format!(
            "sysmon_agent_child_{}_{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let script = "echo $$ > \"$1\"; exec sleep 30";
        let path = pid_file.to_string_lossy().into_owned();
        let args = ["-c", script, "sh", path.as_str()];
        let call = run_utility("sh", &args, "test");
        assert!(tokio::time::timeout(Duration::from_millis(300), call)
            .await
            .is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let _ = std::fs::remove_file(&pid_file);
        let stat = format!("/proc/{}/stat", pid.trim());
        let mut gone = false;
        for _ in 0..40 {
            // a killed but unreaped child shows up as a zombie
            match std::fs::read_to_string(&stat) {
                Err(_) => gone = true,
                Ok(s) => {
                    let state = s.rsplit(')').next().unwrap_or("");
                    gone = state.trim_start().starts_with('Z');
                }
            }
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "child {} still running", pid.trim());
    }
}
