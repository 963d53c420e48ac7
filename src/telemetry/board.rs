//! Rack status panel: listens to every board's status topic and renders one
//! line per board.

use super::{disconnect, open_client, wait_for_connack};
use crate::{
    config::MqttSettings,
    display::TextPanel,
    error::{FoxError, FoxResult},
    utils::sync_flag::{interrupted, pause},
};
use rumqttc::{Client, ConnectReturnCode, Event, Packet, QoS};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

pub const TITLE: &str = "LuckFox Rack Status:";
pub const WAITING: &str = "Waiting for data...";
const CLIENT_ID: &str = "foxconsole-status-board";
const EVENT_POLL: Duration = Duration::from_millis(200);

struct BoardState {
    payload: Map<String, Value>,
    received: Instant,
}

/// Latest report per board, keyed by board id so iteration is sorted.
#[derive(Default)]
pub struct RackStatus {
    boards: BTreeMap<String, BoardState>,
}

/// Last `-` segment when it is all digits, else the first three characters.
pub fn short_id(board_id: &str) -> String {
    let mut parts = board_id.rsplit('-');
    let last = parts.next().unwrap_or_default();
    let has_dash = parts.next().is_some();
    if has_dash && !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
        last.to_string()
    } else {
        board_id.chars().take(3).collect()
    }
}

/// `HH:MM` out of `YYYY-MM-DD HH:MM:SS`.
pub fn hh_mm(timestamp: Option<&Value>) -> String {
    timestamp
        .and_then(Value::as_str)
        .and_then(|ts| ts.split(' ').nth(1))
        .map(|time| time.chars().take(5).collect())
        .unwrap_or_else(|| "??:??".to_string())
}

fn field_text(payload: &Map<String, Value>, key: &str, default: &str) -> String {
    match payload.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Used MiB without its unit: `"44M/246M"` gives `"44"`.
pub fn memory_used(mem_usage: &str) -> String {
    let used = match mem_usage.split_once('/') {
        Some((used, _)) => used,
        None => "?M",
    };
    used.strip_suffix('M').unwrap_or(used).to_string()
}

impl RackStatus {
    /// Stores a report. Payloads that are not JSON objects are logged and dropped.
    pub fn ingest(&mut self, topic: &str, payload: &[u8], now: Instant) -> bool {
        let payload = match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(
                    "non-JSON message on {}: {}",
                    topic,
                    String::from_utf8_lossy(payload)
                );
                return false;
            }
        };
        let board_id = match payload.get("board_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => topic.split('/').nth(1).unwrap_or(topic).to_string(),
        };
        debug!("status from {}", board_id);
        self.boards.insert(board_id, BoardState { payload, received: now });
        true
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    pub fn render(&self, now: Instant, stale_after: Duration, max_lines: usize) -> Vec<String> {
        let mut lines = vec![TITLE.to_string()];
        if self.boards.is_empty() {
            lines.push(WAITING.to_string());
            return lines;
        }
        for (board_id, state) in self.boards.iter().take(max_lines) {
            let id = short_id(board_id);
            let time = hh_mm(state.payload.get("timestamp"));
            if now.saturating_duration_since(state.received) > stale_after {
                lines.push(format!("{}: STALE - {}", id, time));
                continue;
            }
            let temp = field_text(&state.payload, "temp_c", "??");
            let mem = memory_used(&field_text(&state.payload, "mem_usage_str", "??/??M"));
            let uptime = field_text(&state.payload, "uptime_h", "??");
            lines.push(format!("{} T:{} M:{} U:{}h {}", id, temp, mem, uptime, time));
        }
        lines
    }
}

fn subscribe(client: &Client, settings: &MqttSettings) -> FoxResult<()> {
    client
        .subscribe(settings.status_topic_filter.as_str(), QoS::AtMostOnce)
        .map_err(|e| FoxError::Mqtt(format!("subscribe {}: {}", settings.status_topic_filter, e)))?;
    info!("subscribed to {}", settings.status_topic_filter);
    Ok(())
}

fn redraw(rack: &RackStatus, panel: &mut dyn TextPanel, settings: &MqttSettings) {
    let lines = rack.render(
        Instant::now(),
        Duration::from_secs(settings.stale_after_s),
        settings.max_board_lines,
    );
    if let Err(e) = panel.show(&lines) {
        warn!("{}", e);
    }
}

pub fn run(settings: &MqttSettings, panel: &mut dyn TextPanel) -> FoxResult<()> {
    info!("status board starting, broker {}:{}", settings.broker_host, settings.broker_port);
    let mut rack = RackStatus::default();
    let (client, mut connection) = open_client(settings, CLIENT_ID);
    wait_for_connack(&mut connection, Duration::from_secs(settings.connect_wait_s))?;
    subscribe(&client, settings)?;
    redraw(&rack, panel, settings);

    while !interrupted() {
        match connection.recv_timeout(EVENT_POLL) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) if ack.code == ConnectReturnCode::Success => {
                info!("reconnected");
                subscribe(&client, settings)?;
            }
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                if rack.ingest(&publish.topic, &publish.payload, Instant::now()) {
                    redraw(&rack, panel, settings);
                }
            }
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(e)) => {
                warn!("disconnected from broker: {}", e);
                if !pause(Duration::from_secs(settings.retry_delay_s)) {
                    break;
                }
            }
        }
    }

    info!("status board stopping");
    disconnect(&client, &mut connection);
    if let Err(e) = panel.clear() {
        warn!("{}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESH: &str = r#"{"board_id": "luckfox-200", "ip": "192.168.50.31", "temp_c": 45.2,
        "mem_usage_str": "44M/246M", "uptime_h": 12, "timestamp": "2024-05-01 09:07:55"}"#;

    #[test]
    fn short_ids() {
        assert_eq!(short_id("luckfox-200"), "200");
        assert_eq!(short_id("200"), "200");
        assert_eq!(short_id("luckfox-abc"), "luc");
        assert_eq!(short_id("rack-"), "rac");
    }

    #[test]
    fn times_and_memory() {
        assert_eq!(hh_mm(Some(&Value::from("2024-05-01 09:07:55"))), "09:07");
        assert_eq!(hh_mm(Some(&Value::from("garbage"))), "??:??");
        assert_eq!(hh_mm(None), "??:??");
        assert_eq!(memory_used("44M/246M"), "44");
        assert_eq!(memory_used("CmdError"), "?");
    }

    #[test]
    fn waiting_until_first_report() {
        let rack = RackStatus::default();
        assert_eq!(rack.render(Instant::now(), Duration::from_secs(90), 4), vec![TITLE, WAITING]);
    }

    #[test]
    fn fresh_and_stale_lines() {
        let t0 = Instant::now();
        let mut rack = RackStatus::default();
        assert!(rack.ingest("luckfox/luckfox-200/status", FRESH.as_bytes(), t0));
        assert!(rack.ingest(
            "luckfox/luckfox-201/status",
            br#"{"temp_c": "N/A", "timestamp": "2024-05-01 09:00:00"}"#,
            t0 + Duration::from_secs(60),
        ));
        let lines = rack.render(t0 + Duration::from_secs(100), Duration::from_secs(90), 4);
        assert_eq!(
            lines,
            vec![
                TITLE.to_string(),
                "200: STALE - 09:07".to_string(),
                "201 T:N/A M:?? U:??h 09:00".to_string(),
            ]
        );
        let lines = rack.render(t0, Duration::from_secs(90), 4);
        assert_eq!(lines[1], "200 T:45.2 M:44 U:12h 09:07");
    }

    #[test]
    fn garbage_is_ignored_and_lines_are_capped() {
        let t0 = Instant::now();
        let mut rack = RackStatus::default();
        assert!(!rack.ingest("luckfox/x/status", b"not json", t0));
        assert!(!rack.ingest("luckfox/x/status", b"42", t0));
        for n in 0..6 {
            let payload = format!(r#"{{"board_id": "luckfox-{}"}}"#, 100 + n);
            rack.ingest("luckfox/ignored/status", payload.as_bytes(), t0);
        }
        assert_eq!(rack.len(), 6);
        assert_eq!(rack.render(t0, Duration::from_secs(90), 4).len(), 5);
    }
}
