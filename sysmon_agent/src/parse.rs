//! Text parsers for OS utility output (`ps`, `df`).
//! Nothing outside this module looks at raw command output.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::types::{DiskInfo, ProcessInfo};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {input:?}: {reason}")]
pub struct ParseError {
    pub input: String,
    pub reason: &'static str,
}

impl ParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Parse a number that may use either `.` or `,` as the decimal separator.
fn parse_decimal(s: &str) -> Result<f64, ParseError> {
    let t = s.trim();
    if t.is_empty() {
        return Err(ParseError::new(s, "empty number"));
    }
    t.replace(',', ".")
        .parse::<f64>()
        .map_err(|_| ParseError::new(s, "not a number"))
}

/// Convert a size field such as `4,6G`, `10M`, `1.5TB` or `512` into bytes.
///
/// Suffixes are SI (powers of 1000), matching `df -H`. An unknown suffix is
/// read as plain bytes. Only an unparseable leading number is an error.
pub fn parse_size(s: &str) -> Result<f64, ParseError> {
    let t = s.trim();
    let split = t
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(t.len());
    let (number, suffix) = t.split_at(split);
    if number.is_empty() {
        return Err(ParseError::new(s, "missing numeric portion"));
    }
    let value = parse_decimal(number).map_err(|e| ParseError::new(s, e.reason))?;

    let suffix = suffix.trim().to_ascii_uppercase();
    let unit = suffix
        .strip_suffix('B')
        .filter(|u| !u.is_empty())
        .unwrap_or(suffix.as_str());
    let multiplier = match unit {
        "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => 1.0,
    };
    Ok(value * multiplier)
}

/// Convert a `ps` elapsed-time field (`MM:SS`, `HH:MM:SS` or `D-HH:MM:SS`)
/// into whole seconds. Field width is not enforced.
pub fn parse_elapsed(s: &str) -> Result<u64, ParseError> {
    let t = s.trim();
    let (days, clock) = match t.split_once('-') {
        Some((d, rest)) => (Some(parse_segment(s, d)?), rest),
        None => (None, t),
    };

    let segments = clock
        .split(':')
        .map(|seg| parse_segment(s, seg))
        .collect::<Result<Vec<u64>, _>>()?;

    let (h, m, sec) = match (days, segments.as_slice()) {
        (None, [m, sec]) => (0, *m, *sec),
        (_, [h, m, sec]) => (*h, *m, *sec),
        (Some(_), [_, _]) => return Err(ParseError::new(s, "day prefix needs HH:MM:SS")),
        _ => return Err(ParseError::new(s, "expected 2 or 3 time segments")),
    };
    days.unwrap_or(0)
        .checked_mul(86_400)
        .and_then(|d| h.checked_mul(3_600).and_then(|h| d.checked_add(h)))
        .and_then(|t| m.checked_mul(60).and_then(|m| t.checked_add(m)))
        .and_then(|t| t.checked_add(sec))
        .ok_or_else(|| ParseError::new(s, "time value out of range"))
}

fn parse_segment(input: &str, seg: &str) -> Result<u64, ParseError> {
    if seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new(input, "non-numeric time segment"));
    }
    seg.parse::<u64>()
        .map_err(|_| ParseError::new(input, "time segment out of range"))
}

/// Round a percentage to two decimals and clamp it into `0..=100`.
pub fn percent(part: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let raw = (part as f64 / total as f64) * 100.0;
    ((raw * 100.0).round() / 100.0).clamp(0.0, 100.0) as f32
}

/// One row of `ps -o pid=,user=,pcpu=,pmem=,rss=,stat=,etime=,pri=,args=`.
///
/// `rss` is in KiB. `args` is the tail of the line and may contain spaces.
pub fn parse_ps_row(line: &str, now: DateTime<Utc>) -> Result<ProcessInfo, ParseError> {
    let mut fields = line.split_whitespace();
    let mut next = |what: &'static str| fields.next().ok_or_else(|| ParseError::new(line, what));

    let pid = next("missing pid")?
        .parse::<u32>()
        .map_err(|_| ParseError::new(line, "invalid pid"))?;
    let user = next("missing user")?;
    let cpu_usage = parse_decimal(next("missing pcpu")?)? as f32;
    let memory_usage_percent = parse_decimal(next("missing pmem")?)? as f32;
    let rss_kib = next("missing rss")?
        .parse::<u64>()
        .map_err(|_| ParseError::new(line, "invalid rss"))?;
    let status = next("missing stat")?;
    let etime = next("missing etime")?;
    let pri = next("missing pri")?;
    let command = fields.collect::<Vec<_>>().join(" ");

    let start_time = parse_elapsed(etime)
        .ok()
        .and_then(|secs| i64::try_from(secs).ok())
        .map(|secs| now - Duration::seconds(secs));
    let user = match user {
        "-" | "?" => None,
        u => Some(u.to_string()),
    };

    Ok(ProcessInfo {
        pid,
        name: process_name(&command),
        command,
        cpu_usage,
        memory_usage: rss_kib.saturating_mul(1024),
        memory_usage_percent,
        status: status.to_string(),
        start_time,
        user,
        priority: pri.parse::<i32>().ok(),
    })
}

// "/usr/bin/python3 -m http.server" -> "python3", "[kworker/0:1]" -> "kworker/0:1"
fn process_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or("");
    if let Some(inner) = first.strip_prefix('[') {
        return command
            .trim_start_matches('[')
            .split(']')
            .next()
            .unwrap_or(inner)
            .to_string();
    }
    first.rsplit('/').next().unwrap_or(first).to_string()
}

/// One data row of `df -H --output=source,fstype,size,used,avail,target`.
pub fn parse_df_row(line: &str) -> Result<DiskInfo, ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(ParseError::new(line, "expected 6 columns"));
    }
    // df prints "-" for sizes a filesystem does not report
    let bytes = |s: &str| match s {
        "-" => Ok(0),
        _ => parse_size(s).map(|v| v.round() as u64),
    };
    let total_space = bytes(fields[2])?;
    let used_space = bytes(fields[3])?;
    let free_space = bytes(fields[4])?;

    Ok(DiskInfo {
        name: fields[0].to_string(),
        file_system: fields[1].to_string(),
        mount_point: fields[5..].join(" "),
        total_space,
        used_space,
        free_space,
        usage_percent: percent(used_space, total_space),
    })
}
