//! Reboot the target, log in over its console, grab one camera frame, copy it
//! over scp and convert it to JPEG, keeping a report of every step.

use crate::{
    camera::{capture_image, cleanup_image, manage_services, verify_capture, ServiceAction},
    config::{FoxConfig, TransferSettings},
    error::{FoxError, FoxResult},
    terminal::{login, logout, open_port, send_reboot, target_ip, Credentials, SerialLink},
    transfer::{convert_to_jpeg, scp_from_target},
    utils::sync_flag::interrupted,
};
use chrono::Local;
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

const REPORT_TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
    Important,
    Success,
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportLevel::Info => "INFO",
            ReportLevel::Warning => "WARNING",
            ReportLevel::Error => "ERROR",
            ReportLevel::Important => "IMPORTANT",
            ReportLevel::Success => "SUCCESS",
        };
        f.write_str(name)
    }
}

pub struct ReportEntry {
    pub timestamp: String,
    pub level: ReportLevel,
    pub message: String,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] [capture] {}", self.timestamp, self.level, self.message)
    }
}

/// Every step of a capture run, kept in memory and appended to the report
/// file when the run ends.
#[derive(Default)]
pub struct SessionReport {
    entries: Vec<ReportEntry>,
}

impl SessionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, level: ReportLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ReportLevel::Error => error!("{}", message),
            ReportLevel::Warning => warn!("{}", message),
            _ => info!("[{}] {}", level, message),
        }
        self.entries.push(ReportEntry {
            timestamp: Local::now().format(REPORT_TIME_FMT).to_string(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(ReportLevel::Info, message)
    }
    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(ReportLevel::Warning, message)
    }
    pub fn error(&mut self, message: impl Into<String>) {
        self.log(ReportLevel::Error, message)
    }
    pub fn important(&mut self, message: impl Into<String>) {
        self.log(ReportLevel::Important, message)
    }
    pub fn success(&mut self, message: impl Into<String>) {
        self.log(ReportLevel::Success, message)
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Appends the framed report. Nothing is written for an empty session.
    pub fn append_to(&self, path: &Path) -> FoxResult<()> {
        let first = match self.entries.first() {
            Some(first) => first,
            None => return Ok(()),
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "\n--- New Session Started: {} ---", first.timestamp)?;
        for entry in self.entries.iter() {
            writeln!(file, "{}", entry)?;
        }
        writeln!(file, "--- Session Ended: {} ---", Local::now().format(REPORT_TIME_FMT))?;
        info!("session report appended to {:?}", path);
        Ok(())
    }
}

/// Local destinations for one capture, unique down to the microsecond.
pub struct CapturePaths {
    pub raw: PathBuf,
    pub jpg: PathBuf,
}

impl CapturePaths {
    pub fn unique(transfer: &TransferSettings) -> Self {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        Self {
            raw: transfer.output_dir.join(format!("{}{}.yuv", transfer.raw_prefix, stamp)),
            jpg: transfer.output_dir.join(format!("{}{}.jpg", transfer.jpg_prefix, stamp)),
        }
    }
}

fn open_console(cfg: &FoxConfig) -> FoxResult<Box<dyn serialport::SerialPort>> {
    open_port(&cfg.serial.port_name, cfg.serial.baud_rate, cfg.serial.read_timeout())
}

pub fn reboot_over<L: SerialLink + ?Sized>(link: &mut L, cfg: &FoxConfig, report: &mut SessionReport) -> FoxResult<()> {
    let creds = Credentials::from(&cfg.target);
    if let Err(e) = login(link, &creds, cfg.serial.login_timeout()) {
        report.error(format!("Login failed for reboot trigger: {}", e));
        return Err(e);
    }
    report.info("Sending 'reboot' command to target...");
    send_reboot(link)?;
    report.success("Reboot command sent.");
    Ok(())
}

pub fn trigger_reboot(cfg: &FoxConfig, report: &mut SessionReport) -> FoxResult<()> {
    report.info("Attempting to trigger reboot on target...");
    let mut port = open_console(cfg).map_err(|e| {
        report.error(format!("Serial connection failed for reboot trigger: {}", e));
        e
    })?;
    reboot_over(&mut port, cfg, report)
}

fn capture_steps<L: SerialLink + ?Sized>(
    link: &mut L,
    cfg: &FoxConfig,
    paths: &CapturePaths,
    report: &mut SessionReport,
) -> FoxResult<()> {
    let prompts = &cfg.target.shell_prompts;
    let command_timeout = cfg.serial.command_timeout();

    report.info("Attempting login...");
    login(link, &Credentials::from(&cfg.target), cfg.serial.login_timeout()).map_err(|e| {
        report.error(format!("Fatal: login to target failed: {}", e));
        e
    })?;
    report.info("Successfully logged into target.");

    let services = &cfg.target.services_to_stop;
    report.info(format!("Attempting to stop services: {:?}...", services));
    match manage_services(link, prompts, services, ServiceAction::Stop, command_timeout) {
        Ok(true) => report.info(format!("Services {:?} stop command(s) sent.", services)),
        Ok(false) => report.warning(format!("Could not reliably stop services {:?}. Continuing...", services)),
        Err(e) => report.warning(format!("Stopping services failed: {}. Continuing...", e)),
    }

    report.info("Retrieving target IP address...");
    let ip = target_ip(link, prompts, &cfg.target.network_interface, command_timeout).map_err(|e| {
        report.error(format!("Fatal: could not retrieve target IP address: {}", e));
        e
    })?;
    report.info(format!("Target IP address: {}", ip));

    report.info("Configuring camera and capturing image on target...");
    capture_image(link, prompts, &cfg.camera).map_err(|e| {
        report.error(format!("Failed to configure or capture image on target: {}", e));
        e
    })?;

    let remote_size = verify_capture(link, prompts, &cfg.camera.target_image_path, command_timeout).map_err(|e| {
        report.error(format!("Image verification failed on target: {}", e));
        e
    })?;
    report.info(format!("Image successfully verified on target. Size: {} bytes.", remote_size));

    report.info("Transferring image via SCP...");
    let scp_timeout = Duration::from_secs(cfg.transfer.scp_timeout_s);
    let local_size = scp_from_target(
        &ip,
        &cfg.target.username,
        &cfg.camera.target_image_path,
        &paths.raw,
        scp_timeout,
    )
    .map_err(|e| {
        report.error(format!("SCP image transfer failed: {}", e));
        e
    })?;
    report.info(format!("Image successfully transferred via SCP to {:?}.", paths.raw));

    report.info("Processing local image (FFmpeg)...");
    convert_to_jpeg(
        &paths.raw,
        &paths.jpg,
        cfg.camera.width,
        cfg.camera.height,
        &cfg.camera.pixel_format,
        local_size,
        Duration::from_secs(cfg.transfer.ffmpeg_timeout_s),
    )
    .map_err(|e| {
        report.error(format!("Local image processing (FFmpeg) failed: {}", e));
        e
    })?;
    report.success(format!("Local image successfully processed. Final JPG: {:?}", paths.jpg));
    Ok(())
}

/// Runs the capture steps on an open console. The remote file is removed and
/// the session logged out whatever the outcome.
pub fn capture_over<L: SerialLink + ?Sized>(
    link: &mut L,
    cfg: &FoxConfig,
    paths: &CapturePaths,
    report: &mut SessionReport,
) -> FoxResult<()> {
    let outcome = capture_steps(link, cfg, paths, report);

    report.info("Cleaning up target and disconnecting from capture session...");
    if let Err(e) = cleanup_image(
        link,
        &cfg.target.shell_prompts,
        &cfg.camera.target_image_path,
        cfg.serial.cleanup_timeout(),
    ) {
        report.warning(format!("Deletion status unknown for {}: {}", cfg.camera.target_image_path, e));
    }
    logout(link, &Credentials::from(&cfg.target), cfg.serial.command_timeout());
    outcome
}

pub fn run_capture(cfg: &FoxConfig, report: &mut SessionReport) -> FoxResult<PathBuf> {
    report.info("Starting capture sequence...");
    let paths = CapturePaths::unique(&cfg.transfer);
    report.info(format!("Local raw path: {:?}", paths.raw));
    report.info(format!("Local JPG path: {:?}", paths.jpg));

    report.info("Attempting serial connection...");
    let mut port = open_console(cfg).map_err(|e| {
        report.error(format!("Fatal: could not establish serial connection: {}", e));
        e
    })?;
    capture_over(&mut port, cfg, &paths, report)?;
    Ok(paths.jpg)
}

/// Sleeps in one-second steps so Ctrl-C cuts the wait short.
fn wait_for_reboot(seconds: u64) -> FoxResult<()> {
    for _ in 0..seconds {
        if interrupted() {
            return Err(FoxError::Local("interrupted while waiting for reboot".to_string()));
        }
        thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}

/// Full run: optional reboot, capture, banner, report file.
pub fn run(cfg: &FoxConfig, reboot: bool) -> FoxResult<()> {
    let mut report = SessionReport::new();
    let report_path = cfg.transfer.session_report_file.clone();
    report.important("Automated capture process starting...");

    if reboot {
        if let Err(e) = trigger_reboot(cfg, &mut report) {
            report.error("Failed to send reboot command. Cannot proceed.");
            report.append_to(&report_path)?;
            return Err(e);
        }
        report.important(format!("Waiting {} seconds for target to reboot...", cfg.target.reboot_wait_s));
        if let Err(e) = wait_for_reboot(cfg.target.reboot_wait_s) {
            report.error(e.to_string());
            report.append_to(&report_path)?;
            return Err(e);
        }
        report.important("Wait complete. Attempting capture sequence...");
    }

    let started = Instant::now();
    let outcome = run_capture(cfg, &mut report);
    let elapsed = started.elapsed();

    match &outcome {
        Ok(_) => {
            report.success("Overall process finished successfully.");
            println!("\n>>> IMAGE CAPTURE SUCCEEDED <<<\n");
        }
        Err(_) => {
            report.error("Overall process FAILED.");
            println!("\n>>> IMAGE CAPTURE FAILED <<<\n");
        }
    }
    report.info(format!("Capture sequence execution time: {:.2} seconds.", elapsed.as_secs_f64()));
    if let Err(e) = report.append_to(&report_path) {
        error!("error writing session report: {}", e);
    }
    outcome.map(|_| ())
}

/// Logs in and prints the target's address on the configured interface.
pub fn print_target_ip(cfg: &FoxConfig) -> FoxResult<()> {
    let mut port = open_console(cfg)?;
    login(&mut port, &Credentials::from(&cfg.target), cfg.serial.login_timeout())?;
    let ip = target_ip(
        &mut port,
        &cfg.target.shell_prompts,
        &cfg.target.network_interface,
        cfg.serial.command_timeout(),
    )?;
    println!("{}", ip);
    logout(&mut port, &Credentials::from(&cfg.target), cfg.serial.command_timeout());
    Ok(())
}
