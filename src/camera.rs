use crate::{
    config::CameraSettings,
    error::{FoxError, FoxResult},
    terminal::{send_command, strip_ansi, SerialLink},
};
use std::{fmt, thread, time::Duration};
use tracing::{debug, error, info, warn};

const BETWEEN_SERVICES: Duration = Duration::from_millis(200);
const AFTER_CAPTURE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Start,
}

impl ServiceAction {
    fn command(self, service: &str) -> String {
        match self {
            ServiceAction::Stop => format!("killall {} || true", service),
            ServiceAction::Start => format!("{} &", service),
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Start => write!(f, "start"),
        }
    }
}

/// Returns false when any service command did not get a prompt back.
pub fn manage_services<L: SerialLink + ?Sized>(
    link: &mut L,
    prompts: &[String],
    services: &[String],
    action: ServiceAction,
    timeout: Duration,
) -> FoxResult<bool> {
    let mut all_ok = true;
    for service in services {
        let command = action.command(service);
        info!("{} service {:?}: {}", action, service, command);
        match send_command(link, &command, prompts, timeout) {
            Ok(output) => debug!("{} {:?} output: {}", action, service, output),
            Err(FoxError::Timeout(msg)) => {
                warn!("no clear response after trying to {} {:?}: {}", action, service, msg);
                all_ok = false;
            }
            Err(e) => return Err(e),
        }
        thread::sleep(BETWEEN_SERVICES);
    }
    Ok(all_ok)
}

pub fn capture_command(camera: &CameraSettings) -> String {
    format!(
        "v4l2-ctl --device={} --set-fmt-video=width={},height={},pixelformat={} --stream-mmap --stream-count=1 --stream-to={}",
        camera.device_node, camera.width, camera.height, camera.pixel_format, camera.target_image_path
    )
}

/// Grabs one frame into `camera.target_image_path` on the target.
pub fn capture_image<L: SerialLink + ?Sized>(
    link: &mut L,
    prompts: &[String],
    camera: &CameraSettings,
) -> FoxResult<()> {
    info!("capturing {} to {}", camera.device_node, camera.target_image_path);
    let timeout = camera.capture_timeout();
    let output = send_command(link, &capture_command(camera), prompts, timeout).map_err(|e| {
        error!("no response after v4l2-ctl: {}", e);
        FoxError::Remote(format!("capture command failed: {}", e))
    })?;
    debug!("v4l2-ctl output: {}", output);
    thread::sleep(AFTER_CAPTURE);
    Ok(())
}

/// Size in bytes of `path` as listed by `ls -l`, or an error when it is
/// missing, empty or unparseable.
pub fn parse_ls_size(listing: &str, path: &str) -> FoxResult<u64> {
    let cleaned = strip_ansi(listing);
    if cleaned.contains("No such file or directory") || cleaned.contains("cannot access") {
        return Err(FoxError::Remote(format!("{} not found on target", path)));
    }
    if cleaned.trim().is_empty() {
        return Err(FoxError::Remote(format!("empty listing for {}", path)));
    }

    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(FoxError::Remote(format!(
            "unexpected ls output ({} fields): {:?}",
            parts.len(),
            cleaned
        )));
    }
    let size = |field: &str| -> FoxResult<u64> {
        field
            .parse::<u64>()
            .map_err(|e| FoxError::Remote(format!("bad size {:?}: {}", field, e)))
    };

    if parts.last() == Some(&path) {
        let bytes = size(parts[4])?;
        if bytes == 0 {
            return Err(FoxError::Remote(format!("{} exists but is empty", path)));
        }
        return Ok(bytes);
    }

    warn!("listing does not end with {}: {:?}", path, parts);
    // -rw-r--r-- 1 root root 48480 May 7 10:00 /tmp/csi_capture.yuv ...
    if parts.len() > 8 && parts.contains(&path) {
        if let Ok(bytes) = size(parts[4]) {
            if bytes > 0 {
                warn!("found {} in listing but not last, size {}", path, bytes);
                return Ok(bytes);
            }
        }
    }
    Err(FoxError::Remote(format!("could not read size of {}", path)))
}

pub fn verify_capture<L: SerialLink + ?Sized>(
    link: &mut L,
    prompts: &[String],
    path: &str,
    timeout: Duration,
) -> FoxResult<u64> {
    info!("verifying {} on target", path);
    let listing = send_command(link, &format!("ls -l --color=never {}", path), prompts, timeout)?;
    let bytes = parse_ls_size(&listing, path)?;
    info!("{} verified, {} bytes", path, bytes);
    Ok(bytes)
}

pub fn cleanup_image<L: SerialLink + ?Sized>(
    link: &mut L,
    prompts: &[String],
    path: &str,
    timeout: Duration,
) -> FoxResult<()> {
    info!("deleting {} on target", path);
    send_command(link, &format!("rm -f {}", path), prompts, timeout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/tmp/csi_capture.yuv";

    #[test]
    fn size_from_regular_listing() {
        let ls = "-rw-r--r--    1 root     root         48600 Jan  1 00:01 /tmp/csi_capture.yuv";
        assert_eq!(parse_ls_size(ls, PATH).unwrap(), 48600);
    }

    #[test]
    fn coloured_listing_is_cleaned() {
        let ls = "-rw-r--r-- 1 root root 10 May 7 10:00 \u{1b}[0;0m/tmp/csi_capture.yuv\u{1b}[0m";
        assert_eq!(parse_ls_size(ls, PATH).unwrap(), 10);
    }

    #[test]
    fn missing_and_empty_files_are_rejected() {
        let missing = "ls: /tmp/csi_capture.yuv: No such file or directory";
        assert!(parse_ls_size(missing, PATH).is_err());
        let empty = "-rw-r--r-- 1 root root 0 May 7 10:00 /tmp/csi_capture.yuv";
        assert!(parse_ls_size(empty, PATH).is_err());
        assert!(parse_ls_size("  ", PATH).is_err());
        assert!(parse_ls_size("a b c", PATH).is_err());
    }

    #[test]
    fn path_not_last_needs_a_full_listing() {
        let trailing = "-rw-r--r-- 1 root root 512 May 7 10:00 /tmp/csi_capture.yuv extra";
        assert_eq!(parse_ls_size(trailing, PATH).unwrap(), 512);
        let short = "-rw-r--r-- 1 root root 512 /tmp/csi_capture.yuv extra";
        assert!(parse_ls_size(short, PATH).is_err());
    }

    #[test]
    fn capture_command_matches_v4l2_syntax() {
        let cmd = capture_command(&CameraSettings::default());
        assert_eq!(
            cmd,
            "v4l2-ctl --device=/dev/video15 --set-fmt-video=width=240,height=135,pixelformat=NV12 --stream-mmap --stream-count=1 --stream-to=/tmp/csi_capture.yuv"
        );
    }
}
