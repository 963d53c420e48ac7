use crate::{
    config::LoopbackSettings,
    error::{FoxError, FoxResult},
    terminal::{open_port, SerialLink},
};
use std::{
    thread,
    time::{Duration, Instant},
};
use tracing::{info, warn};

const PORT_TIMEOUT: Duration = Duration::from_secs(1);
const BEFORE_SEND: Duration = Duration::from_millis(200);
const EXTRA_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
pub struct LoopbackOutcome {
    pub sent: Vec<u8>,
    pub received: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LoopbackOutcome {
    pub fn matched(&self) -> bool {
        self.sent == self.received
    }
}

/// Reads up to `wanted` bytes, giving up once `timeout` passes.
pub fn read_up_to<L: SerialLink + ?Sized>(link: &mut L, wanted: usize, timeout: Duration) -> FoxResult<Vec<u8>> {
    let mut received = Vec::with_capacity(wanted);
    let mut chunk = vec![0u8; wanted.max(1)];
    let deadline = Instant::now() + timeout;
    while received.len() < wanted && Instant::now() < deadline {
        let count = link.read_chunk(&mut chunk[..wanted - received.len()])?;
        if count == 0 {
            thread::sleep(Duration::from_millis(10));
        }
        received.extend_from_slice(&chunk[..count]);
    }
    Ok(received)
}

pub fn loopback_over<L: SerialLink + ?Sized>(link: &mut L, payload: &[u8], delay: Duration) -> FoxResult<LoopbackOutcome> {
    link.clear_all()?;
    thread::sleep(BEFORE_SEND);

    info!("sending {} bytes: {:?}", payload.len(), String::from_utf8_lossy(payload));
    link.send(payload)?;
    thread::sleep(delay);

    let received = read_up_to(link, payload.len(), PORT_TIMEOUT)?;
    info!("received {} bytes: {:?}", received.len(), String::from_utf8_lossy(&received));

    let mut extra = vec![];
    if received != payload {
        thread::sleep(EXTRA_WAIT);
        let waiting = link.bytes_waiting()?;
        extra = read_up_to(link, if waiting == 0 { 100 } else { waiting }, EXTRA_WAIT)?;
    }
    Ok(LoopbackOutcome {
        sent: payload.to_vec(),
        received,
        extra,
    })
}

pub fn run_loopback(settings: &LoopbackSettings) -> FoxResult<()> {
    println!("--- UART loopback on {} at {} baud ---", settings.port_name, settings.baud_rate);
    let mut port = open_port(&settings.port_name, settings.baud_rate, PORT_TIMEOUT)?;
    let outcome = loopback_over(
        &mut port,
        settings.payload.as_bytes(),
        Duration::from_millis(settings.delay_ms),
    )?;
    if outcome.matched() {
        println!("*** SUCCESS: received data matches sent data ***");
        return Ok(());
    }
    println!("*** ERROR: received data does NOT match sent data ***");
    println!("Sent    : {:?}", String::from_utf8_lossy(&outcome.sent));
    println!("Received: {:?}", String::from_utf8_lossy(&outcome.received));
    if !outcome.extra.is_empty() {
        warn!("extra data received: {:?}", String::from_utf8_lossy(&outcome.extra));
    }
    Err(FoxError::Remote("loopback mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::MockLink;

    #[test]
    fn echoed_payload_matches() {
        let mut link = MockLink::new();
        link.set_max_chunk(2);
        link.reply_always("GNL", "GNL\r\n");
        let outcome = loopback_over(&mut link, b"GNL\r\n", Duration::from_millis(1)).unwrap();
        assert!(outcome.matched());
        assert!(outcome.extra.is_empty());
    }

    #[test]
    fn garbled_payload_reports_extra_bytes() {
        let mut link = MockLink::new();
        link.reply_always("GNL", "GXL\r\n??");
        let outcome = loopback_over(&mut link, b"GNL\r\n", Duration::from_millis(1)).unwrap();
        assert!(!outcome.matched());
        assert_eq!(outcome.received, b"GXL\r\n");
        assert_eq!(outcome.extra, b"??");
    }

    #[test]
    fn every_waiting_byte_is_reported() {
        let mut link = MockLink::new();
        let noise = "x".repeat(150);
        link.reply_always("GNL", &format!("GXL\r\n{}", noise));
        let outcome = loopback_over(&mut link, b"GNL\r\n", Duration::from_millis(1)).unwrap();
        assert_eq!(outcome.extra, noise.as_bytes());
    }
}
