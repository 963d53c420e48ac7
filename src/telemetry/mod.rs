//! Board health over MQTT: every board publishes a status report, one board
//! with a panel shows the rack.

pub mod board;
pub mod probe;
pub mod reporter;

use crate::{
    config::MqttSettings,
    error::{FoxError, FoxResult},
    utils::sync_flag::{interrupted, pause},
};
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Outgoing, Packet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL: Duration = Duration::from_millis(200);
const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);

pub fn status_topic(board_id: &str) -> String {
    format!("luckfox/{}/status", board_id)
}

pub fn open_client(settings: &MqttSettings, client_id: &str) -> (Client, Connection) {
    let mut options = MqttOptions::new(client_id, settings.broker_host.as_str(), settings.broker_port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_s));
    Client::new(options, REQUEST_CAPACITY)
}

/// Drives the event loop until the broker accepts us or `wait` runs out.
pub fn wait_for_connack(connection: &mut Connection, wait: Duration) -> FoxResult<()> {
    let deadline = Instant::now() + wait;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(FoxError::Timeout(format!("no CONNACK within {:?}", wait)));
        }
        if interrupted() {
            return Err(FoxError::Mqtt("interrupted while connecting".to_string()));
        }
        match connection.recv_timeout((deadline - now).min(POLL)) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(FoxError::Mqtt(format!("broker refused the connection: {:?}", ack.code)));
            }
            Ok(Ok(event)) => debug!("mqtt {:?}", event),
            Ok(Err(e)) => return Err(FoxError::Mqtt(e.to_string())),
            Err(_) => {}
        }
    }
}

/// Fixed number of attempts with a pause in between.
pub fn connect_with_retries(connection: &mut Connection, settings: &MqttSettings) -> FoxResult<()> {
    let attempts = settings.max_connect_attempts.max(1);
    for attempt in 1..=attempts {
        info!(
            "connecting to {}:{} (attempt {}/{})",
            settings.broker_host, settings.broker_port, attempt, attempts
        );
        match wait_for_connack(connection, Duration::from_secs(settings.connect_wait_s)) {
            Ok(()) => {
                info!("connected on attempt {}", attempt);
                return Ok(());
            }
            Err(e) => warn!("connection attempt {} failed: {}", attempt, e),
        }
        if attempt < attempts {
            println!("Will retry connection in {} seconds...", settings.retry_delay_s);
            if !pause(Duration::from_secs(settings.retry_delay_s)) {
                return Err(FoxError::Mqtt("interrupted while connecting".to_string()));
            }
        }
    }
    Err(FoxError::Mqtt(format!(
        "failed to connect to {} after {} attempts",
        settings.broker_host, attempts
    )))
}

/// Sends DISCONNECT and polls until it has gone out.
pub fn disconnect(client: &Client, connection: &mut Connection) {
    if let Err(e) = client.disconnect() {
        warn!("disconnect request failed: {}", e);
        return;
    }
    let deadline = Instant::now() + DISCONNECT_FLUSH;
    while Instant::now() < deadline {
        match connection.recv_timeout(POLL) {
            Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) | Ok(Err(_)) => break,
            Ok(Ok(_)) | Err(_) => {}
        }
    }
    info!("disconnected from broker");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_per_board() {
        assert_eq!(status_topic("luckfox-200"), "luckfox/luckfox-200/status");
    }

    #[test]
    fn unreachable_broker_times_out() {
        let settings = MqttSettings {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1,
            ..MqttSettings::default()
        };
        let (_client, mut connection) = open_client(&settings, "foxconsole-test");
        assert!(wait_for_connack(&mut connection, Duration::from_millis(300)).is_err());
    }
}
