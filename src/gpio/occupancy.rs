//! Presence sensors, one input pin per area: visits and dwell time per area.

use super::{Gpio, InputPin};
use crate::{
    config::AreaPin,
    error::FoxResult,
    utils::sync_flag::{interrupted, pause},
};
use std::{
    fs,
    io::Write,
    path::Path,
    time::{Duration, Instant},
};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AreaStats {
    pub area: String,
    pub visits: u32,
    pub dwell: Duration,
    entered: Option<Instant>,
}

impl AreaStats {
    fn new(area: &str) -> Self {
        Self {
            area: area.to_string(),
            visits: 0,
            dwell: Duration::ZERO,
            entered: None,
        }
    }
}

pub struct OccupancyTracker {
    areas: Vec<AreaStats>,
}

impl OccupancyTracker {
    pub fn new<'a>(areas: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            areas: areas.into_iter().map(AreaStats::new).collect(),
        }
    }

    /// Feeds one sampled level for area `idx`.
    pub fn update(&mut self, idx: usize, present: bool, now: Instant) {
        let stats = match self.areas.get_mut(idx) {
            Some(stats) => stats,
            None => return,
        };
        match (present, stats.entered) {
            (true, None) => {
                stats.entered = Some(now);
                stats.visits += 1;
            }
            (false, Some(entered)) => {
                stats.dwell += now.saturating_duration_since(entered);
                stats.entered = None;
            }
            _ => {}
        }
    }

    /// Closes any visit still open.
    pub fn finish(&mut self, now: Instant) {
        for idx in 0..self.areas.len() {
            self.update(idx, false, now);
        }
    }

    pub fn stats(&self) -> &[AreaStats] {
        &self.areas
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::from("area,visits,seconds\n");
        for stats in self.areas.iter() {
            csv.push_str(&format!("{},{},{:.1}\n", stats.area, stats.visits, stats.dwell.as_secs_f64()));
        }
        csv
    }

    pub fn write_csv(&self, path: &Path) -> FoxResult<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(self.to_csv().as_bytes())?;
        info!("occupancy summary written to {:?}", path);
        Ok(())
    }
}

/// Polls every area until Ctrl-C (or `max_polls`), then writes the summary.
pub fn track(
    gpio: &Gpio,
    areas: &[AreaPin],
    poll: Duration,
    report: &Path,
    max_polls: Option<u64>,
) -> FoxResult<OccupancyTracker> {
    let mut pins = vec![];
    for area in areas {
        pins.push(InputPin::open(gpio, area.pin)?);
    }
    let mut tracker = OccupancyTracker::new(areas.iter().map(|a| a.area.as_str()));
    println!("Tracking movements (Ctrl-C to stop)...");

    let mut polls = 0;
    while !interrupted() && max_polls.map_or(true, |max| polls < max) {
        let now = Instant::now();
        for (idx, pin) in pins.iter().enumerate() {
            match pin.read() {
                Ok(present) => tracker.update(idx, present, now),
                Err(e) => warn!("area {}: {}", areas[idx].area, e),
            }
        }
        polls += 1;
        if !pause(poll) {
            break;
        }
    }

    println!("Experiment ended, writing summary...");
    tracker.finish(Instant::now());
    for stats in tracker.stats() {
        println!("{}: {} visits, {:.1} s", stats.area, stats.visits, stats.dwell.as_secs_f64());
    }
    tracker.write_csv(report)?;
    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::fake;

    #[test]
    fn rising_edges_count_and_falling_edges_accumulate() {
        let t0 = Instant::now();
        let at = |ms| t0 + Duration::from_millis(ms);
        let mut tracker = OccupancyTracker::new(["A", "B"]);
        tracker.update(0, true, at(0));
        tracker.update(0, true, at(100));
        tracker.update(0, false, at(500));
        tracker.update(0, true, at(600));
        tracker.update(1, false, at(600));
        tracker.finish(at(1100));

        let a = &tracker.stats()[0];
        assert_eq!(a.visits, 2);
        assert_eq!(a.dwell, Duration::from_millis(1000));
        assert_eq!(tracker.stats()[1].visits, 0);
        assert_eq!(tracker.to_csv(), "area,visits,seconds\nA,2,1.0\nB,0,0.0\n");
    }

    #[test]
    fn tracks_from_sysfs_and_writes_summary() {
        let root = fake::sysfs("occupancy", &[(52, "1"), (53, "0")]);
        let areas = vec![
            AreaPin {
                area: "A".into(),
                pin: 52,
            },
            AreaPin {
                area: "B".into(),
                pin: 53,
            },
        ];
        let report = root.join("occupancy.csv");
        let tracker = track(&Gpio::new(&root), &areas, Duration::from_millis(1), &report, Some(3)).unwrap();
        assert_eq!(tracker.stats()[0].visits, 1);
        assert_eq!(tracker.stats()[1].visits, 0);
        let csv = fs::read_to_string(&report).unwrap();
        assert!(csv.starts_with("area,visits,seconds\nA,1,"));
        let _ = fs::remove_dir_all(root);
    }
}
