use crate::{config::AutoReply, utils::ring_buf_queue::WriteQueue};
use chrono::Utc;
use std::sync::mpsc::Sender;
use tracing::info;

pub const DATE_TIME_FMT: &str = "%y-%m-%d %H:%M:%S%.3f";
const CONSOLE_TIME_FMT: &str = "%M:%S%.3f";

/// Received text with these triggers queues the matching reply back to the port.
pub struct AutoResponder {
    replies: Vec<AutoReply>,
    window: String,
    window_chars: usize,
    queue: WriteQueue,
}

impl AutoResponder {
    pub fn new(replies: Vec<AutoReply>, queue: WriteQueue) -> Self {
        let window_chars = replies
            .iter()
            .map(|r| r.trigger.chars().count())
            .max()
            .unwrap_or(0);
        Self {
            replies,
            window: String::new(),
            window_chars,
            queue,
        }
    }

    /// Triggers may straddle two reads, so the tail of the previous chunk is kept.
    fn feed(&mut self, text: &str) -> usize {
        if self.replies.is_empty() {
            return 0;
        }
        let tail_start = self.window.len();
        self.window.push_str(text);
        let mut fired = 0;
        for reply in self.replies.iter() {
            if reply.trigger.is_empty() {
                continue;
            }
            // only count matches that end inside the new text
            let hit = self
                .window
                .match_indices(&reply.trigger)
                .any(|(i, m)| i + m.len() > tail_start);
            if hit {
                info!("auto reply to {:?}", reply.trigger);
                self.queue.push(reply.reply.as_bytes());
                fired += 1;
            }
        }
        let keep = self.window_chars.saturating_sub(1);
        let total = self.window.chars().count();
        if total > keep {
            self.window = self.window.chars().skip(total - keep).collect();
        }
        fired
    }
}

/// Splits a byte stream into lines for the terminal and the transcript.
/// Lines longer than `line_width` are wrapped at the last space; continuation
/// pieces carry `' '` instead of `'|'` after the timestamp.
pub struct LinePrinter {
    console_timestamp: String,
    log_timestamp: String,
    buffer: String,
    prefix: String,
    complete: char,
    last_char: Option<char>,
    line_width: usize,
    echo: bool,
    line_sender: Sender<String>,
    responder: Option<AutoResponder>,
}

impl LinePrinter {
    fn timestamp_now(&mut self) {
        let now = Utc::now();
        self.log_timestamp = now.format(DATE_TIME_FMT).to_string();
        self.console_timestamp = now.format(CONSOLE_TIME_FMT).to_string();
    }
}

macro_rules! send_split {
    ($self: ident, $line: expr) => {
        $self.timestamp_now();
        if $self.echo {
            println!(
                "{} {} {} {}",
                $self.prefix, $self.console_timestamp, $self.complete, $line
            );
        }
        let _ = $self.line_sender.send(format!(
            "{} {} {} {}",
            $self.prefix, $self.log_timestamp, $self.complete, $line
        ));
    };
}

impl LinePrinter {
    pub fn new(prefix: String, line_width: usize, line_sender: Sender<String>) -> Self {
        let mut line_printer = Self {
            prefix,
            log_timestamp: String::new(),
            console_timestamp: String::new(),
            buffer: String::new(),
            complete: '|',
            line_width: line_width.max(1),
            last_char: None,
            echo: true,
            line_sender,
            responder: None,
        };
        line_printer.timestamp_now();
        line_printer
    }

    pub fn with_responder(mut self, responder: AutoResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn push_str(&mut self, text: &str) {
        for ch in text.chars() {
            if let '\r' | '\n' = ch {
                let last_char = self.last_char;
                self.last_char = Some(ch);
                // CRLF and LFCR are a single break
                if let Some(last_char) = last_char {
                    if last_char != ch {
                        self.last_char = None;
                        continue;
                    }
                }
                send_split!(self, &self.buffer);
                self.complete = '|';
                self.buffer.clear();
            } else {
                if self.buffer.chars().count() >= self.line_width {
                    let last_space_idx = self.buffer.rfind(' ');
                    if let Some(idx) = last_space_idx.filter(|idx| *idx > 0) {
                        send_split!(self, &self.buffer[..idx]);
                        self.buffer = self.buffer[idx..].to_string();
                        self.complete = ' ';
                    }
                }
                self.buffer.push(ch);
                self.last_char = None;
            }
        }

        if let Some(responder) = self.responder.as_mut() {
            responder.feed(text);
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.push_str(&String::from_utf8_lossy(bytes))
    }

    /// Emits whatever partial line is buffered.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            send_split!(self, &self.buffer);
            self.buffer.clear();
            self.complete = '|';
        }
    }
}
