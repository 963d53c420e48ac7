use super::link::SerialLink;
use crate::error::{FoxError, FoxResult};
use std::{
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

const EXPECT_POLL: Duration = Duration::from_millis(20);
const COMMAND_POLL: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 1024;

fn first_prompt_in<'a>(buffer: &str, prompts: &'a [String]) -> Option<&'a str> {
    prompts
        .iter()
        .find(|p| !p.is_empty() && buffer.contains(p.as_str()))
        .map(String::as_str)
}

/// The longest prompt the buffer ends with, so `"[root@luckfox ~]# "` wins over `"# "`.
fn trailing_prompt<'a>(buffer: &str, prompts: &'a [String]) -> Option<&'a str> {
    prompts
        .iter()
        .filter(|p| !p.is_empty() && buffer.ends_with(p.as_str()))
        .max_by_key(|p| p.len())
        .map(String::as_str)
}

fn last_prompt_anywhere(buffer: &str, prompts: &[String]) -> Option<usize> {
    prompts
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(|p| buffer.rfind(p.as_str()))
        .max()
}

/// Reads until any of `prompts` shows up in what was received (starting with
/// `initial`) and returns everything read so far.
pub fn expect_prompt<L: SerialLink + ?Sized>(
    link: &mut L,
    prompts: &[String],
    timeout: Duration,
    initial: &str,
) -> FoxResult<String> {
    if first_prompt_in(initial, prompts).is_some() {
        return Ok(initial.to_string());
    }

    // decoded as a whole each time so characters split across reads survive
    let mut raw = initial.as_bytes().to_vec();
    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; READ_CHUNK];
    while Instant::now() < deadline {
        let count = link.read_chunk(&mut chunk)?;
        if count > 0 {
            raw.extend_from_slice(&chunk[..count]);
            let buffer = String::from_utf8_lossy(&raw);
            if let Some(prompt) = first_prompt_in(&buffer, prompts) {
                debug!("found prompt {:?}", prompt);
                return Ok(buffer.into_owned());
            }
        } else {
            thread::sleep(EXPECT_POLL);
        }
    }
    Err(FoxError::Timeout(format!(
        "none of {:?} within {:?}, got {:?}",
        prompts,
        timeout,
        String::from_utf8_lossy(&raw)
    )))
}

/// Runs one shell command and returns its output with echo and prompt removed.
pub fn send_command<L: SerialLink + ?Sized>(
    link: &mut L,
    command: &str,
    prompts: &[String],
    timeout: Duration,
) -> FoxResult<String> {
    let mut line = command.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }
    link.clear_input()?;
    debug!("sending {:?}", command.trim_end());
    link.send(line.as_bytes())?;

    let deadline = Instant::now() + timeout;
    let mut raw = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let count = link.read_chunk(&mut chunk)?;
        raw.extend_from_slice(&chunk[..count]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(prompt) = trailing_prompt(&text, prompts) {
            let body = &text[..text.len() - prompt.len()];
            return Ok(clean_output(body, command));
        }
        if Instant::now() >= deadline {
            break;
        }
        if count == 0 {
            thread::sleep(COMMAND_POLL);
        }
    }

    let text = String::from_utf8_lossy(&raw);
    match last_prompt_anywhere(&text, prompts) {
        Some(idx) => {
            warn!("{:?}: prompt not at end of output, using last one seen", command.trim_end());
            Ok(clean_output(&text[..idx], command))
        }
        None => Err(FoxError::Timeout(format!(
            "no prompt after {:?} within {:?}, got {:?}",
            command.trim_end(),
            timeout,
            text
        ))),
    }
}

fn clean_output(body: &str, command: &str) -> String {
    let body = body.replace("\r\n", "\n");
    let body = match body.split_once('\n') {
        Some((first, rest)) if first.trim() == command.trim() => rest.to_string(),
        None if body.trim() == command.trim() => String::new(),
        _ => body,
    };
    body.trim().to_string()
}

/// Drops `ESC [ ... m` colour sequences.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' && chars.peek() == Some(&'[') {
            let mut lookahead = chars.clone();
            lookahead.next();
            let mut consumed = 1;
            let mut terminated = false;
            for next in lookahead {
                consumed += 1;
                if next == 'm' {
                    terminated = true;
                    break;
                }
                if !(next.is_ascii_digit() || next == ';') {
                    break;
                }
            }
            if terminated {
                for _ in 0..consumed {
                    chars.next();
                }
                continue;
            }
        }
        out.push(ch);
    }
    out
}
