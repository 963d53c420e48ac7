use crate::error::{FoxError, FoxResult};
use std::{
    fs::{self, OpenOptions},
    io::{Read, Write},
    path::Path,
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

const EXIT_POLL: Duration = Duration::from_millis(50);

pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn log_streams(&self, tool: &str) {
        debug!("{} stdout: {}", tool, self.stdout.trim());
        debug!("{} stderr: {}", tool, self.stderr.trim());
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut stream) = stream {
            let mut bytes = vec![];
            let _ = stream.read_to_end(&mut bytes);
            text = String::from_utf8_lossy(&bytes).to_string();
        }
        text
    })
}

/// Runs `command` to completion, killing it once `timeout` passes.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> FoxResult<CommandOutput> {
    debug!("running {:?}", command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| FoxError::Local(format!("could not start {:?}: {}", command.get_program(), e)))?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FoxError::Timeout(format!(
                "{:?} still running after {:?}",
                command.get_program(),
                timeout
            )));
        }
        thread::sleep(EXIT_POLL);
    };

    Ok(CommandOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

pub fn scp_from_target(ip: &str, user: &str, remote: &str, local: &Path, timeout: Duration) -> FoxResult<u64> {
    info!("scp {}@{}:{} -> {:?}", user, ip, remote, local);
    if let Some(dir) = local.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let mut scp = Command::new("scp");
    scp.args(["-o", "StrictHostKeyChecking=no"])
        .args(["-o", "UserKnownHostsFile=/dev/null"])
        .args(["-o", "ConnectTimeout=10"])
        .arg(format!("{}@{}:{}", user, ip, remote))
        .arg(local);
    let output = run_with_timeout(&mut scp, timeout)?;

    if !output.status.success() {
        error!("scp failed with {}", output.status);
        output.log_streams("scp");
        return Err(FoxError::Local(format!("scp exited with {}", output.status)));
    }
    if !non_empty_file(local) {
        output.log_streams("scp");
        return Err(FoxError::Local(format!("scp succeeded but {:?} is missing or empty", local)));
    }
    let size = fs::metadata(local)?.len();
    info!("scp done, {} bytes", size);
    Ok(size)
}

/// Bytes ffmpeg expects for an NV12 frame: full Y plane, UV plane of ceil(h/2) rows.
pub fn nv12_frame_size(width: u64, height: u64) -> u64 {
    width * height + width * ((height + 1) / 2)
}

/// Zero-fills a short capture up to `expected` bytes.
pub fn pad_raw_image(path: &Path, actual: u64, expected: u64) -> FoxResult<()> {
    if actual < expected {
        let padding = (expected - actual) as usize;
        info!("padding {:?} with {} zero bytes", path, padding);
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(&vec![0u8; padding])?;
    } else if actual > expected {
        warn!(
            "{:?} is {} bytes, larger than the {} expected; converting anyway",
            path, actual, expected
        );
    }
    Ok(())
}

pub fn ffmpeg_command(raw: &Path, jpg: &Path, width: u32, height: u32, pixel_format: &str) -> Command {
    let mut ffmpeg = Command::new("ffmpeg");
    ffmpeg
        .args(["-y", "-f", "rawvideo", "-pix_fmt"])
        .arg(pixel_format.to_lowercase())
        .arg("-s")
        .arg(format!("{}x{}", width, height))
        .arg("-i")
        .arg(raw)
        .args(["-frames:v", "1", "-q:v", "2"])
        .arg(jpg);
    ffmpeg
}

pub fn convert_to_jpeg(
    raw: &Path,
    jpg: &Path,
    width: u32,
    height: u32,
    pixel_format: &str,
    actual_size: u64,
    timeout: Duration,
) -> FoxResult<()> {
    if !raw.exists() || actual_size == 0 {
        return Err(FoxError::Local(format!("{:?} is missing or empty", raw)));
    }
    let expected = nv12_frame_size(width as u64, height as u64);
    debug!("raw {} bytes, ffmpeg expects {}", actual_size, expected);
    pad_raw_image(raw, actual_size, expected)?;

    let output = run_with_timeout(&mut ffmpeg_command(raw, jpg, width, height, pixel_format), timeout)?;
    if !output.status.success() {
        error!("ffmpeg failed with {}", output.status);
        output.log_streams("ffmpeg");
        return Err(FoxError::Local(format!("ffmpeg exited with {}", output.status)));
    }
    if !non_empty_file(jpg) {
        output.log_streams("ffmpeg");
        return Err(FoxError::Local(format!("ffmpeg succeeded but {:?} is missing or empty", jpg)));
    }
    info!("converted to {:?}", jpg);
    Ok(())
}
