use super::{
    connect_with_retries, disconnect, open_client,
    probe::{collect, ProbePaths, TIMESTAMP_FMT},
    status_topic,
};
use crate::{
    config::MqttSettings,
    error::{FoxError, FoxResult},
    utils::sync_flag::{interrupted, new_sync_flag, pause, SyncFlagVictim},
};
use chrono::Local;
use rumqttc::{Connection, ConnectReturnCode, Event, Packet, QoS};
use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error, info, warn};

pub const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";
const EVENT_POLL: Duration = Duration::from_millis(200);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Configured id, else the host name, else `luckfox-unknown-<n>`.
pub fn resolve_board_id(configured: Option<&str>, hostname_path: &Path) -> String {
    if let Some(id) = configured.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    match fs::read_to_string(hostname_path) {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            let epoch = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            format!("luckfox-unknown-{}", epoch % 10000)
        }
    }
}

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FMT).to_string()
}

/// Keeps the connection polled and tracks whether it is up. Hands the
/// connection back when stopped so the caller can disconnect cleanly.
fn spawn_event_loop(
    mut connection: Connection,
    connected: Arc<AtomicBool>,
    victim: SyncFlagVictim,
) -> FoxResult<thread::JoinHandle<Connection>> {
    let handle = thread::Builder::new().name("mqtt events".to_string()).spawn(move || {
        while victim.is_alive() {
            match connection.recv_timeout(EVENT_POLL) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    let up = ack.code == ConnectReturnCode::Success;
                    connected.store(up, Ordering::SeqCst);
                    info!("[{}] broker {}", now_stamp(), if up { "connected" } else { "refused" });
                }
                Ok(Ok(Event::Incoming(Packet::PubAck(ack)))) => debug!("publish {} acknowledged", ack.pkid),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    if connected.swap(false, Ordering::SeqCst) {
                        warn!("[{}] disconnected from broker: {}", now_stamp(), e);
                    }
                    thread::sleep(RECONNECT_BACKOFF);
                }
                Err(_) => {}
            }
        }
        connection
    })?;
    Ok(handle)
}

pub fn run(settings: &MqttSettings) -> FoxResult<()> {
    let board_id = resolve_board_id(settings.board_id.as_deref(), Path::new(HOSTNAME_PATH));
    let topic = status_topic(&board_id);
    println!("--- Starting Reporter with BOARD_ID: {} ---", board_id);

    let (client, mut connection) = open_client(settings, &format!("{}-reporter", board_id));
    connect_with_retries(&mut connection, settings)?;

    let connected = Arc::new(AtomicBool::new(true));
    let (victim, assassin) = new_sync_flag();
    let events = spawn_event_loop(connection, Arc::clone(&connected), victim)?;

    let interval = Duration::from_secs(settings.report_interval_s);
    let paths = ProbePaths::default();
    while !interrupted() {
        if !connected.load(Ordering::SeqCst) {
            warn!("[{}] not connected to broker, skipping this report", now_stamp());
            if !pause(interval / 2) {
                break;
            }
            continue;
        }

        let report = collect(&board_id, &settings.network_interface, &paths);
        let payload = serde_json::to_string(&report)?;
        match client.publish(topic.as_str(), QoS::AtLeastOnce, false, payload) {
            Ok(()) => println!(
                "[{}] Data for {} queued for publish to {}.",
                report.timestamp, board_id, topic
            ),
            Err(e) => error!("[{}] FAILED to publish for {}: {}", report.timestamp, board_id, e),
        }
        if !pause(interval) {
            break;
        }
    }

    println!("[{}] Shutting down reporter for {}...", now_stamp(), board_id);
    assassin.kill_victim();
    let mut connection = events
        .join()
        .map_err(|_| FoxError::Mqtt("event thread panicked".to_string()))?;
    if connected.load(Ordering::SeqCst) {
        disconnect(&client, &mut connection);
    }
    println!("[{}] Reporter for {} fully stopped.", now_stamp(), board_id);
    Ok(())
}
