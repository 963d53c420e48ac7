//! Setra balance on RS-232: weight readout on a panel, tare, and mass-versus-time
//! recording for evaporation runs.

use crate::{
    config::BalanceSettings,
    display::TextPanel,
    error::FoxResult,
    terminal::{open_port, SerialLink},
    utils::sync_flag::interrupted,
};
use std::{
    fs::{self, File},
    io::{self, BufRead, BufWriter, Write},
    path::Path,
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

pub const CMD_QUERY: &[u8] = b"#";
pub const CMD_TARE: &[u8] = b"$t";
const TERMINATOR: &[u8] = b"\r\n";
const TARE_SETTLE: Duration = Duration::from_millis(200);
const OPEN_SETTLE: Duration = Duration::from_millis(500);
const LOOP_SLEEP: Duration = Duration::from_millis(100);
const LEGEND: &str = "T=Tare R=Rec S=Stop Q=Quit";

/// Query and tare go out raw; anything else is terminated with CR.
pub fn frame_command(command: &[u8]) -> Vec<u8> {
    let mut framed = command.to_vec();
    if command != CMD_QUERY && command != CMD_TARE {
        framed.push(b'\r');
    }
    framed
}

/// `"+ 12.345 g"` and `"-0.5 g"` both parse; a lone sign joins the next token.
pub fn parse_weight(response: &str) -> Option<f64> {
    let mut parts = response.split_whitespace();
    let first = parts.next()?;
    let value = match (first, parts.next()) {
        ("+" | "-", Some(second)) => format!("{}{}", first, second),
        _ => first.to_string(),
    };
    value.parse().ok()
}

/// Collects bytes until `terminator` or `timeout`, whichever comes first.
pub fn read_until<L: SerialLink + ?Sized>(link: &mut L, terminator: &[u8], timeout: Duration) -> FoxResult<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut response = vec![];
    let mut byte = [0u8; 1];
    while Instant::now() < deadline {
        if link.read_chunk(&mut byte)? == 0 {
            thread::sleep(Duration::from_millis(10));
            continue;
        }
        response.push(byte[0]);
        if response.ends_with(terminator) {
            break;
        }
    }
    Ok(response)
}

/// `None` for any failure: write error, silence, or an unparsable answer.
pub fn query_weight<L: SerialLink + ?Sized>(link: &mut L, timeout: Duration) -> Option<f64> {
    fn exchange<L: SerialLink + ?Sized>(link: &mut L, timeout: Duration) -> FoxResult<Vec<u8>> {
        link.clear_input()?;
        link.send(&frame_command(CMD_QUERY))?;
        read_until(link, TERMINATOR, timeout)
    }
    let response = match exchange(link, timeout) {
        Ok(response) => response,
        Err(e) => {
            warn!("weight query failed: {}", e);
            return None;
        }
    };
    if response.is_empty() {
        return None;
    }
    let text: String = response.iter().filter(|b| b.is_ascii()).map(|b| *b as char).collect();
    debug!("balance said {:?}", text.trim());
    parse_weight(text.trim())
}

pub fn tare<L: SerialLink + ?Sized>(link: &mut L) -> FoxResult<()> {
    link.clear_input()?;
    link.send(&frame_command(CMD_TARE))?;
    thread::sleep(TARE_SETTLE);
    let waiting = link.bytes_waiting()?;
    let mut junk = vec![0u8; if waiting == 0 { 100 } else { waiting }];
    let discarded = link.read_chunk(&mut junk)?;
    if discarded > 0 {
        debug!("discarded {} bytes after tare", discarded);
    }
    Ok(())
}

/// Mass against seconds since `start`.
#[derive(Debug, Default)]
pub struct Recorder {
    started: Option<Instant>,
    samples: Vec<(f64, f64)>,
}

impl Recorder {
    pub fn start(&mut self, now: Instant) {
        self.samples.clear();
        self.started = Some(now);
    }

    pub fn is_recording(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Option<f64> {
        self.started.map(|started| now.duration_since(started).as_secs_f64())
    }

    pub fn sample(&mut self, elapsed_s: f64, grams: f64) {
        self.samples.push((elapsed_s, grams));
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::from("seconds,grams\n");
        for (seconds, grams) in &self.samples {
            csv.push_str(&format!("{:.2},{:.4}\n", seconds, grams));
        }
        csv
    }

    pub fn write_csv(&self, path: &Path) -> FoxResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(self.to_csv().as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

pub fn panel_lines(weight: Option<f64>, recording: bool) -> Vec<String> {
    vec![
        format!("Setra Wt:{}", if recording { "*" } else { "" }),
        match weight {
            Some(grams) => format!("{:>8.3} g", grams),
            None => "---.--- g".to_string(),
        },
        LEGEND.to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceCommand {
    Tare,
    Record,
    Stop,
    Quit,
    Unknown(String),
}

impl BalanceCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim().to_lowercase();
        Some(match line.as_str() {
            "" => return None,
            "t" => Self::Tare,
            "r" => Self::Record,
            "s" => Self::Stop,
            "q" => Self::Quit,
            _ => Self::Unknown(line),
        })
    }
}

pub struct BalanceSession<'a, L: SerialLink> {
    link: L,
    panel: &'a mut dyn TextPanel,
    recorder: Recorder,
    current: Option<f64>,
    last_update: Option<Instant>,
    response_timeout: Duration,
    update_interval: Duration,
    record_file: &'a Path,
}

impl<'a, L: SerialLink> BalanceSession<'a, L> {
    pub fn new(link: L, panel: &'a mut dyn TextPanel, settings: &'a BalanceSettings) -> Self {
        Self {
            link,
            panel,
            recorder: Recorder::default(),
            current: None,
            last_update: None,
            response_timeout: settings.response_timeout(),
            update_interval: Duration::from_millis(settings.update_interval_ms),
            record_file: &settings.record_file,
        }
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    fn redraw(&mut self) {
        let lines = panel_lines(self.current, self.recorder.is_recording());
        if let Err(e) = self.panel.show(&lines) {
            warn!("{}", e);
        }
    }

    fn refresh(&mut self, now: Instant) {
        self.current = query_weight(&mut self.link, self.response_timeout);
        self.redraw();
        self.last_update = Some(now);
    }

    fn save_recording(&self) {
        if self.recorder.samples().is_empty() {
            println!("No data recorded, nothing saved.");
            return;
        }
        match self.recorder.write_csv(self.record_file) {
            Ok(()) => println!(
                "Saved {} points to {:?}",
                self.recorder.samples().len(),
                self.record_file
            ),
            Err(e) => error!("could not save recording: {}", e),
        }
    }

    /// False once the user asked to quit.
    pub fn handle(&mut self, command: BalanceCommand, now: Instant) -> bool {
        match command {
            BalanceCommand::Quit => {
                println!("Quit command received.");
                return false;
            }
            BalanceCommand::Tare => {
                println!("Sending Tare command...");
                match tare(&mut self.link) {
                    Ok(()) => println!("Tare command sent."),
                    Err(e) => warn!("tare failed: {}", e),
                }
                self.refresh(now);
            }
            BalanceCommand::Record if self.recorder.is_recording() => println!("Already recording."),
            BalanceCommand::Record => {
                println!("*** Starting Recording ***");
                self.recorder.start(now);
                self.refresh(now);
            }
            BalanceCommand::Stop if self.recorder.is_recording() => {
                println!("*** Stopping Recording ***");
                self.recorder.stop();
                self.redraw();
                self.save_recording();
            }
            BalanceCommand::Stop => println!("Not currently recording."),
            BalanceCommand::Unknown(line) => println!("Unknown command: '{}'. Use T, R, S, or Q.", line),
        }
        true
    }

    /// Queries once per update interval; records the last good weight.
    pub fn tick(&mut self, now: Instant) {
        if self
            .last_update
            .map_or(false, |last| now.duration_since(last) < self.update_interval)
        {
            return;
        }
        let weight = query_weight(&mut self.link, self.response_timeout);
        if weight != self.current || self.last_update.is_none() {
            self.current = weight;
            self.redraw();
        }
        if let (Some(elapsed), Some(grams)) = (self.recorder.elapsed(now), self.current) {
            self.recorder.sample(elapsed, grams);
        }
        self.last_update = Some(now);
    }

    /// Saves an unfinished recording.
    pub fn finish(mut self) {
        if self.recorder.is_recording() && !self.recorder.samples().is_empty() {
            println!("Saving recorded data from the unfinished run...");
            self.save_recording();
            self.recorder.stop();
        }
        if let Err(e) = self.panel.clear() {
            warn!("{}", e);
        }
    }
}

/// Sends each line until the reader ends or the receiver is gone.
fn forward_lines<R: BufRead>(reader: R, tx: Sender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn spawn_stdin_reader() -> FoxResult<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("balance stdin".to_string())
        .spawn(move || forward_lines(io::stdin().lock(), tx))?;
    Ok(rx)
}

pub fn run(settings: &BalanceSettings, panel: &mut dyn TextPanel) -> FoxResult<()> {
    println!("Initializing port {} at {} 8N1...", settings.port_name, settings.baud_rate);
    let mut port = open_port(
        &settings.port_name,
        settings.baud_rate,
        Duration::from_millis(settings.read_timeout_ms),
    )?;
    thread::sleep(OPEN_SETTLE);
    port.clear_all()?;
    info!("balance port {} open", settings.port_name);

    let commands = spawn_stdin_reader()?;
    println!("Commands: T=Tare, R=Record, S=Stop, Q=Quit (press Enter after the command)");

    let mut session = BalanceSession::new(port, panel, settings);
    while !interrupted() {
        match commands.try_recv() {
            Ok(line) => {
                if let Some(command) = BalanceCommand::parse(&line) {
                    if !session.handle(command, Instant::now()) {
                        break;
                    }
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }
        session.tick(Instant::now());
        thread::sleep(LOOP_SLEEP);
    }
    session.finish();
    println!("Serial port {} closed.", settings.port_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{display::ConsolePanel, terminal::MockLink};

    fn settings(tag: &str) -> BalanceSettings {
        BalanceSettings {
            response_timeout_s: 0.05,
            update_interval_ms: 1000,
            record_file: std::env::temp_dir().join(format!("foxconsole-balance-{}-{}.csv", tag, std::process::id())),
            ..BalanceSettings::default()
        }
    }

    #[test]
    fn commands_are_framed() {
        assert_eq!(frame_command(CMD_QUERY), b"#");
        assert_eq!(frame_command(CMD_TARE), b"$t");
        assert_eq!(frame_command(b"P"), b"P\r");
    }

    #[test]
    fn weights_parse_with_detached_signs() {
        assert_eq!(parse_weight("+ 12.345 g"), Some(12.345));
        assert_eq!(parse_weight("- 0.500 g"), Some(-0.5));
        assert_eq!(parse_weight("3.2 g"), Some(3.2));
        assert_eq!(parse_weight("+"), None);
        assert_eq!(parse_weight("ERR"), None);
        assert_eq!(parse_weight(""), None);
    }

    #[test]
    fn query_reads_to_crlf() {
        let mut link = MockLink::new();
        link.push_inbound("stale");
        link.set_max_chunk(3);
        link.reply_always("#", "+ 1.250 g\r\nnext");
        assert_eq!(query_weight(&mut link, Duration::from_millis(200)), Some(1.25));
        assert_eq!(link.sent_text(), "#");
    }

    #[test]
    fn silent_balance_gives_none() {
        let mut link = MockLink::new();
        assert_eq!(query_weight(&mut link, Duration::from_millis(30)), None);
        link.fail_sends(true);
        assert_eq!(query_weight(&mut link, Duration::from_millis(30)), None);
    }

    #[test]
    fn panel_shows_weight_or_dashes() {
        assert_eq!(panel_lines(Some(1.5), true), vec!["Setra Wt:*", "   1.500 g", LEGEND]);
        assert_eq!(panel_lines(None, false)[1], "---.--- g");
    }

    #[test]
    fn command_parsing() {
        assert_eq!(BalanceCommand::parse(" T\n"), Some(BalanceCommand::Tare));
        assert_eq!(BalanceCommand::parse(""), None);
        assert_eq!(BalanceCommand::parse("x"), Some(BalanceCommand::Unknown("x".into())));
    }

    #[test]
    fn recorder_writes_csv() {
        let mut recorder = Recorder::default();
        let t0 = Instant::now();
        recorder.start(t0);
        recorder.sample(0.0, 10.0);
        recorder.sample(1.5, 9.875);
        recorder.stop();
        assert!(!recorder.is_recording());
        assert_eq!(recorder.to_csv(), "seconds,grams\n0.00,10.0000\n1.50,9.8750\n");
    }

    #[test]
    fn session_records_once_per_interval_and_saves_on_stop() {
        let settings = settings("session");
        let link = MockLink::new();
        link.reply_always("#", "+ 2.000 g\r\n");
        let mut panel = ConsolePanel::default();
        let t0 = Instant::now();
        {
            let mut session = BalanceSession::new(link.clone(), &mut panel, &settings);
            assert!(session.handle(BalanceCommand::Record, t0));
            session.tick(t0 + Duration::from_millis(500));
            session.tick(t0 + Duration::from_millis(1000));
            session.tick(t0 + Duration::from_millis(2100));
            assert_eq!(session.recorder().samples().len(), 2);
            assert_eq!(session.current(), Some(2.0));
            assert!(session.handle(BalanceCommand::Stop, t0 + Duration::from_secs(3)));
            assert!(!session.handle(BalanceCommand::Quit, t0 + Duration::from_secs(3)));
            session.finish();
        }
        let csv = fs::read_to_string(&settings.record_file).unwrap();
        assert!(csv.starts_with("seconds,grams\n1.00,2.0000\n"));
        let _ = fs::remove_file(&settings.record_file);
    }

    #[test]
    fn tare_sends_raw_command_and_drains() {
        let mut link = MockLink::new();
        link.reply_once("$t", "OK\r\n");
        tare(&mut link).unwrap();
        assert_eq!(link.sent_text(), "$t");
        assert_eq!(link.bytes_waiting().unwrap(), 0);
    }

    #[test]
    fn typed_lines_reach_the_session() {
        let (tx, rx) = mpsc::channel();
        forward_lines(io::Cursor::new("t\nr\n\nq\n"), tx);
        let lines: Vec<String> = rx.try_iter().collect();
        assert_eq!(lines, vec!["t", "r", "", "q"]);
    }

    #[test]
    fn forwarding_stops_when_nobody_listens() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        forward_lines(io::Cursor::new("t\nq\n"), tx);
    }
}
