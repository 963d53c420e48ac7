use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};
use foxconsole::{
    adc::{
        mux::{Mux, MuxAdc},
        IioAdc,
    },
    config::{AdcSettings, AreaPin},
    gpio::{self, occupancy, Gpio},
    i2c::{sweep, Mcp4725},
};
use std::{fs, path::PathBuf, time::Duration};

fn sysfs(tag: &str, pins: &[(u32, &str)]) -> PathBuf {
    let root = std::env::temp_dir().join(format!("foxconsole-it-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("export"), "").unwrap();
    fs::write(root.join("unexport"), "").unwrap();
    for (pin, value) in pins {
        let dir = root.join(format!("gpio{}", pin));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), "in").unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }
    root
}

fn pin_file(root: &PathBuf, pin: u32, name: &str) -> String {
    fs::read_to_string(root.join(format!("gpio{}", pin)).join(name)).unwrap()
}

#[test]
fn blink_leaves_led_off_and_releases_pin() {
    let root = sysfs("blink", &[(55, "0")]);
    gpio::blink(&Gpio::new(&root), 55, Duration::ZERO, Some(3)).unwrap();
    assert_eq!(pin_file(&root, 55, "direction"), "out");
    assert_eq!(pin_file(&root, 55, "value"), "0");
    assert_eq!(fs::read_to_string(root.join("unexport")).unwrap(), "55");
    let _ = fs::remove_dir_all(root);
}

#[test]
fn monitor_reports_each_level() {
    let root = sysfs("monitor", &[(54, "1\n")]);
    let levels = gpio::monitor(&Gpio::new(&root), 54, Duration::ZERO, Some(2)).unwrap();
    assert_eq!(levels, vec![true, true]);
    assert_eq!(pin_file(&root, 54, "direction"), "in");
    let _ = fs::remove_dir_all(root);
}

#[test]
fn occupancy_summary_counts_occupied_areas() {
    let root = sysfs("occupancy", &[(40, "1"), (41, "0")]);
    let areas = vec![
        AreaPin {
            area: "Left".to_string(),
            pin: 40,
        },
        AreaPin {
            area: "Right".to_string(),
            pin: 41,
        },
    ];
    let report = root.join("occupancy.csv");
    let tracker = occupancy::track(&Gpio::new(&root), &areas, Duration::ZERO, &report, Some(3)).unwrap();

    let visits: Vec<u32> = tracker.stats().iter().map(|s| s.visits).collect();
    assert_eq!(visits, vec![1, 0]);
    let csv = fs::read_to_string(&report).unwrap();
    assert!(csv.starts_with("area,visits,seconds\nLeft,1,"), "{}", csv);
    assert!(csv.contains("Right,0,0.0"));
    let _ = fs::remove_dir_all(root);
}

#[test]
fn mux_selects_channel_before_reading() {
    let root = sysfs("mux", &[(50, "0"), (51, "0"), (52, "0")]);
    let iio_root = root.join("iio");
    let settings = AdcSettings {
        iio_root: iio_root.clone(),
        ..AdcSettings::default()
    };
    let dir = iio_root.join(&settings.device);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}_raw", settings.channel)), "512\n").unwrap();

    let mut front_end = MuxAdc {
        mux: Mux::open(&Gpio::new(&root), [50, 51, 52]).unwrap(),
        adc: IioAdc::new(&settings),
    };
    let reading = front_end.sample(5, Duration::ZERO).unwrap();
    assert_eq!(reading.raw, 512);
    assert_eq!(
        [pin_file(&root, 50, "value"), pin_file(&root, 51, "value"), pin_file(&root, 52, "value")],
        ["1", "0", "1"]
    );
    drop(front_end);
    let _ = fs::remove_dir_all(root);
}

/// Acknowledges every address and keeps each write.
#[derive(Default)]
struct RecordingBus {
    writes: Vec<(u8, Vec<u8>)>,
}

impl ErrorType for RecordingBus {
    type Error = ErrorKind;
}

impl I2c for RecordingBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                Operation::Read(buf) => buf.fill(0),
            }
        }
        Ok(())
    }
}

#[test]
fn dac_sweep_writes_fast_mode_frames() {
    let mut dac = Mcp4725::new(RecordingBus::default(), 0x60);
    dac.general_call_reset().unwrap();
    let written = sweep(&mut dac, &[0, 2048, 4095], 4.9, Duration::ZERO).unwrap();
    assert_eq!(written, 3);
    assert!(dac.set_code(4096).is_err());

    let bus = dac.release();
    assert_eq!(
        bus.writes,
        vec![
            (0x00, vec![0x06]),
            (0x60, vec![0x40, 0x00, 0x00]),
            (0x60, vec![0x40, 0x80, 0x00]),
            (0x60, vec![0x40, 0xFF, 0xF0]),
        ]
    );
}
