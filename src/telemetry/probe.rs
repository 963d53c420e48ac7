//! Local health numbers for the status report.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::warn;

pub const CMD_ERROR: &str = "CmdError";
pub const CMD_MISSING: &str = "CmdMissing";
pub const NOT_AVAILABLE: &str = "N/A";
pub const ERROR: &str = "Error";

pub const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// A number, or the sentinel explaining why there is none.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Reading<T> {
    Value(T),
    Missing(String),
}

impl<T> Reading<T> {
    fn missing(sentinel: &str) -> Self {
        Self::Missing(sentinel.to_string())
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => v.fmt(f),
            Reading::Missing(s) => f.write_str(s),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub board_id: String,
    pub ip: String,
    pub temp_c: Reading<f64>,
    pub mem_usage_str: String,
    pub uptime_h: Reading<u64>,
    pub timestamp: String,
}

/// Where the probe looks; overridable for tests.
#[derive(Debug, Clone)]
pub struct ProbePaths {
    pub thermal_zone: PathBuf,
    pub uptime: PathBuf,
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self {
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            uptime: PathBuf::from("/proc/uptime"),
        }
    }
}

enum Run {
    Output(String),
    Failed,
    Missing,
}

fn run(program: &str, args: &[&str]) -> Run {
    match Command::new(program).args(args).output() {
        Ok(out) if out.status.success() => Run::Output(String::from_utf8_lossy(&out.stdout).to_string()),
        Ok(out) => {
            warn!("'{} {}' returned {}", program, args.join(" "), out.status);
            Run::Failed
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("'{}' not found in PATH", program);
            Run::Missing
        }
        Err(e) => {
            warn!("could not run {}: {}", program, e);
            Run::Failed
        }
    }
}

/// First IPv4 line with a broadcast address, text before the prefix length.
pub fn parse_ip_addr(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("inet ") && line.contains("brd"))
        .and_then(|line| line.split("inet ").nth(1))
        .and_then(|rest| rest.split('/').next())
        .map(|ip| ip.trim().to_string())
}

pub fn ip_address(iface: &str) -> String {
    match run("ip", &["addr", "show", iface]) {
        Run::Output(out) => parse_ip_addr(&out).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        Run::Failed => CMD_ERROR.to_string(),
        Run::Missing => CMD_MISSING.to_string(),
    }
}

pub fn cpu_temperature(path: &Path) -> Reading<f64> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Reading::missing(NOT_AVAILABLE),
        Err(e) => {
            warn!("reading {:?}: {}", path, e);
            return Reading::missing(ERROR);
        }
    };
    match text.trim().parse::<i64>() {
        Ok(milli_c) => Reading::Value((milli_c as f64 / 100.0).round() / 10.0),
        Err(_) => Reading::missing(ERROR),
    }
}

/// `<used>M/<total>M` from GNU or BusyBox `free -m` output.
pub fn parse_free(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() < 2 {
        return None;
    }
    if lines[1].starts_with("Mem:") {
        let parts: Vec<&str> = lines[1].split_whitespace().collect();
        if parts.len() >= 3 {
            return Some(format!("{}M/{}M", parts[2], parts[1]));
        }
        return None;
    }
    if lines[0].contains("Mem:") && lines[1].contains("Swap:") {
        let parts: Vec<&str> = lines[0].split_whitespace().collect();
        if parts.len() >= 4 && parts[0] == "Mem:" {
            let total_kb: f64 = parts[1].parse().ok()?;
            let used_kb: f64 = parts[2].parse().ok()?;
            return Some(format!(
                "{}M/{}M",
                (used_kb / 1024.0).round(),
                (total_kb / 1024.0).round()
            ));
        }
    }
    None
}

pub fn memory_usage() -> String {
    match run("free", &["-m"]) {
        Run::Output(out) => parse_free(&out).unwrap_or_else(|| {
            warn!("could not parse 'free -m' output");
            NOT_AVAILABLE.to_string()
        }),
        Run::Failed => CMD_ERROR.to_string(),
        Run::Missing => CMD_MISSING.to_string(),
    }
}

pub fn uptime_hours(path: &Path) -> Reading<u64> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Reading::missing(NOT_AVAILABLE),
        Err(_) => return Reading::missing(ERROR),
    };
    match text.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()) {
        Some(seconds) => Reading::Value((seconds / 3600.0) as u64),
        None => Reading::missing(ERROR),
    }
}

pub fn collect(board_id: &str, iface: &str, paths: &ProbePaths) -> StatusReport {
    StatusReport {
        board_id: board_id.to_string(),
        ip: ip_address(iface),
        temp_c: cpu_temperature(&paths.thermal_zone),
        mem_usage_str: memory_usage(),
        uptime_h: uptime_hours(&paths.uptime),
        timestamp: Local::now().format(TIMESTAMP_FMT).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("foxconsole-probe-{}-{}", tag, std::process::id()));
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn ip_from_ip_addr_output() {
        let out = "2: eth0: <BROADCAST,MULTICAST,UP> mtu 1500\n    link/ether 02:11:22:33:44:55 brd ff:ff:ff:ff:ff:ff\n    inet 192.168.50.31/24 brd 192.168.50.255 scope global eth0\n    inet6 fe80::1/64 scope link\n";
        assert_eq!(parse_ip_addr(out).as_deref(), Some("192.168.50.31"));
        assert_eq!(parse_ip_addr("    inet 127.0.0.1/8 scope host lo\n"), None);
    }

    #[test]
    fn gnu_free_output() {
        let out = "               total        used        free      shared  buff/cache   available\nMem:             960         120         840           0         200         800\nSwap:              0           0           0\n";
        assert_eq!(parse_free(out).as_deref(), Some("120M/960M"));
    }

    #[test]
    fn busybox_free_output_is_in_kib() {
        let out = "Mem: 83480 34360 49120 0 4940 25000\nSwap: 0 0 0\n";
        assert_eq!(parse_free(out).as_deref(), Some("34M/82M"));
        assert_eq!(parse_free("nonsense\n"), None);
    }

    #[test]
    fn temperature_in_tenths() {
        let path = temp_file("temp", "48312\n");
        assert_eq!(cpu_temperature(&path), Reading::Value(48.3));
        fs::write(&path, "hot").unwrap();
        assert_eq!(cpu_temperature(&path), Reading::Missing(ERROR.to_string()));
        let _ = fs::remove_file(&path);
        assert_eq!(cpu_temperature(&path), Reading::Missing(NOT_AVAILABLE.to_string()));
    }

    #[test]
    fn uptime_truncates_to_hours() {
        let path = temp_file("uptime", "7199.99 12000.00\n");
        assert_eq!(uptime_hours(&path), Reading::Value(1));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn readings_serialize_as_number_or_string() {
        let report = StatusReport {
            board_id: "luckfox-200".to_string(),
            ip: NOT_AVAILABLE.to_string(),
            temp_c: Reading::Value(45.5),
            mem_usage_str: "44M/246M".to_string(),
            uptime_h: Reading::Missing(NOT_AVAILABLE.to_string()),
            timestamp: "2024-05-01 12:34:56".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["temp_c"], serde_json::json!(45.5));
        assert_eq!(json["uptime_h"], serde_json::json!("N/A"));
        let back: StatusReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
