use super::link::SerialLink;
use crate::error::{FoxError, FoxResult};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

struct Rule {
    trigger: String,
    reply: Vec<u8>,
    once: bool,
}

#[derive(Default)]
struct MockState {
    inbound: VecDeque<u8>,
    rules: Vec<Rule>,
    sent: Vec<u8>,
    max_chunk: Option<usize>,
    fail_sends: bool,
}

/// Scripted stand-in for a serial port. Clones share state, so a test can keep
/// one handle to inspect what was sent while the code under test owns another.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bytes readable right away.
    pub fn push_inbound(&self, text: &str) {
        self.state().inbound.extend(text.as_bytes());
    }

    /// Queues `reply` the first time a send contains `trigger`.
    pub fn reply_once(&self, trigger: &str, reply: &str) {
        self.add_rule(trigger, reply, true);
    }

    /// Queues `reply` every time a send contains `trigger`.
    pub fn reply_always(&self, trigger: &str, reply: &str) {
        self.add_rule(trigger, reply, false);
    }

    fn add_rule(&self, trigger: &str, reply: &str, once: bool) {
        self.state().rules.push(Rule {
            trigger: trigger.to_string(),
            reply: reply.as_bytes().to_vec(),
            once,
        });
    }

    /// Limits how many bytes one read returns, to exercise reassembly.
    pub fn set_max_chunk(&self, max_chunk: usize) {
        self.state().max_chunk = Some(max_chunk.max(1));
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.state().sent).to_string()
    }
}

impl SerialLink for MockLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> FoxResult<usize> {
        let mut state = self.state();
        let limit = state.max_chunk.unwrap_or(buf.len()).min(buf.len());
        let mut count = 0;
        while count < limit {
            match state.inbound.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    fn send(&mut self, bytes: &[u8]) -> FoxResult<()> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(FoxError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock link closed",
            )));
        }
        state.sent.extend_from_slice(bytes);
        let text = String::from_utf8_lossy(bytes).to_string();
        if let Some(idx) = state.rules.iter().position(|r| text.contains(&r.trigger)) {
            let reply = state.rules[idx].reply.clone();
            if state.rules[idx].once {
                state.rules.remove(idx);
            }
            state.inbound.extend(reply);
        }
        Ok(())
    }

    fn clear_input(&mut self) -> FoxResult<()> {
        self.state().inbound.clear();
        Ok(())
    }

    fn clear_output(&mut self) -> FoxResult<()> {
        Ok(())
    }

    fn bytes_waiting(&mut self) -> FoxResult<usize> {
        Ok(self.state().inbound.len())
    }
}
