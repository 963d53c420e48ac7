//! Direction of a shadow moving across eight photoresistors behind the mux.

use super::mux::{MuxAdc, CHANNELS};
use crate::{
    config::AdcSettings,
    error::{FoxError, FoxResult},
    gpio::OutputLine,
    utils::sync_flag::{interrupted, pause},
};
use std::{
    fmt,
    io::{self, Write},
    time::Duration,
};
use tracing::{info, warn};

/// One voltage per mux channel.
pub trait ChannelSampler {
    fn sample_voltage(&mut self, channel: u8, settle: Duration) -> FoxResult<f64>;
}

impl<L: OutputLine> ChannelSampler for MuxAdc<L> {
    fn sample_voltage(&mut self, channel: u8, settle: Duration) -> FoxResult<f64> {
        Ok(self.sample(channel, settle)?.voltage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Right,
    Left,
    Still,
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Movement::Right => "RIGHT >>",
            Movement::Left => "<< LEFT",
            Movement::Still => "---",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanResult {
    pub position: Option<f64>,
    pub movement: Movement,
}

pub struct MotionDetector {
    background: [f64; CHANNELS as usize],
    threshold: f64,
    tolerance: f64,
    previous: Option<f64>,
}

/// Reads every channel with twice the settle delay. All eight must succeed.
pub fn calibrate<S: ChannelSampler>(sampler: &mut S, settle: Duration) -> FoxResult<[f64; CHANNELS as usize]> {
    println!("--- Starting background calibration ---");
    let mut background = [0.0; CHANNELS as usize];
    let mut failed = 0;
    for channel in 0..CHANNELS {
        match sampler.sample_voltage(channel, settle * 2) {
            Ok(voltage) => {
                println!("Channel {}: {:.3}V", channel, voltage);
                background[channel as usize] = voltage;
            }
            Err(e) => {
                warn!("calibration read of channel {} failed: {}", channel, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(FoxError::Adc(format!("calibration failed: {} channel(s) could not be read", failed)));
    }
    println!("--- Background calibration complete ---");
    Ok(background)
}

impl MotionDetector {
    pub fn new(background: [f64; CHANNELS as usize], threshold: f64, tolerance: f64) -> Self {
        Self {
            background,
            threshold,
            tolerance,
            previous: None,
        }
    }

    /// `voltages[i]` is `None` when channel `i` could not be read this scan.
    pub fn evaluate(&mut self, voltages: &[Option<f64>]) -> ScanResult {
        let mut weighted_sum = 0.0;
        let mut total = 0.0;
        for (i, voltage) in voltages.iter().enumerate().take(CHANNELS as usize) {
            let diff = match voltage {
                Some(v) => (v - self.background[i]).abs(),
                None => continue,
            };
            if diff > self.threshold {
                weighted_sum += i as f64 * diff;
                total += diff;
            }
        }

        if total <= 0.0 {
            self.previous = None;
            return ScanResult {
                position: None,
                movement: Movement::Still,
            };
        }

        let position = weighted_sum / total;
        let movement = match self.previous {
            Some(previous) if position > previous + self.tolerance => Movement::Right,
            Some(previous) if position < previous - self.tolerance => Movement::Left,
            _ => Movement::Still,
        };
        self.previous = Some(position);
        ScanResult {
            position: Some(position),
            movement,
        }
    }

    pub fn scan<S: ChannelSampler>(&mut self, sampler: &mut S, settle: Duration) -> ScanResult {
        let voltages: Vec<Option<f64>> = (0..CHANNELS)
            .map(|channel| sampler.sample_voltage(channel, settle).ok())
            .collect();
        self.evaluate(&voltages)
    }
}

/// Calibrates, then prints one status line per scan until Ctrl-C or `max_scans`.
pub fn run<S: ChannelSampler>(sampler: &mut S, settings: &AdcSettings, max_scans: Option<u64>) -> FoxResult<()> {
    let settle = Duration::from_millis(settings.settle_ms);
    println!(
        "Threshold={:.2}V, Tolerance={:.2}",
        settings.difference_threshold, settings.position_tolerance
    );
    let background = calibrate(sampler, settle)?;
    let mut detector = MotionDetector::new(background, settings.difference_threshold, settings.position_tolerance);

    println!("--- Starting motion detection loop (Ctrl-C to exit) ---");
    let mut scans = 0;
    while !interrupted() && max_scans.map_or(true, |max| scans < max) {
        let result = detector.scan(sampler, settle);
        let position = result
            .position
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "---".to_string());
        print!("\rDirection: {:<10} (Pos: {:>7})   ", result.movement.to_string(), position);
        let _ = io::stdout().flush();
        scans += 1;
        if !pause(Duration::from_millis(settings.scan_delay_ms)) {
            break;
        }
    }
    println!();
    info!("motion detection end");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        scans: Vec<[Option<f64>; 8]>,
        reads: usize,
    }

    impl ChannelSampler for Scripted {
        fn sample_voltage(&mut self, channel: u8, _settle: Duration) -> FoxResult<f64> {
            let scan = (self.reads / 8).min(self.scans.len() - 1);
            self.reads += 1;
            self.scans[scan][channel as usize].ok_or_else(|| FoxError::Adc("dark".into()))
        }
    }

    fn detector() -> MotionDetector {
        MotionDetector::new([1.0; 8], 0.1, 0.5)
    }

    fn shadow_at(channel: usize) -> Vec<Option<f64>> {
        let mut v = vec![Some(1.0); 8];
        v[channel] = Some(0.5);
        v
    }

    #[test]
    fn movement_needs_a_previous_position() {
        let mut d = detector();
        let first = d.evaluate(&shadow_at(2));
        assert_eq!(first.position, Some(2.0));
        assert_eq!(first.movement, Movement::Still);
        assert_eq!(d.evaluate(&shadow_at(4)).movement, Movement::Right);
        assert_eq!(d.evaluate(&shadow_at(1)).movement, Movement::Left);
        assert_eq!(d.evaluate(&shadow_at(1)).movement, Movement::Still);
    }

    #[test]
    fn quiet_scan_forgets_the_position() {
        let mut d = detector();
        d.evaluate(&shadow_at(1));
        let quiet = d.evaluate(&vec![Some(1.05); 8]);
        assert_eq!(quiet.position, None);
        assert_eq!(d.evaluate(&shadow_at(6)).movement, Movement::Still);
    }

    #[test]
    fn weighted_center_skips_unread_channels() {
        let mut d = detector();
        let mut v = vec![Some(1.0); 8];
        v[2] = Some(0.7);
        v[6] = Some(1.3);
        v[7] = None;
        let result = d.evaluate(&v);
        assert!((result.position.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn calibration_requires_every_channel() {
        let mut ok = Scripted {
            scans: vec![[Some(0.4); 8]],
            reads: 0,
        };
        assert_eq!(calibrate(&mut ok, Duration::ZERO).unwrap(), [0.4; 8]);

        let mut row = [Some(0.4); 8];
        row[3] = None;
        let mut broken = Scripted {
            scans: vec![row],
            reads: 0,
        };
        assert!(calibrate(&mut broken, Duration::ZERO).is_err());
    }

    #[test]
    fn scan_uses_the_sampler() {
        let mut quiet = [Some(1.0); 8];
        quiet[0] = Some(1.0);
        let mut shadow = [Some(1.0); 8];
        shadow[5] = Some(0.2);
        let mut sampler = Scripted {
            scans: vec![quiet, shadow],
            reads: 0,
        };
        let mut d = detector();
        assert_eq!(d.scan(&mut sampler, Duration::ZERO).position, None);
        assert_eq!(d.scan(&mut sampler, Duration::ZERO).position, Some(5.0));
    }
}
