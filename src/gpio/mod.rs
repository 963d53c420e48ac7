//! Pins through the legacy sysfs interface (`/sys/class/gpio`).

pub mod occupancy;
pub mod shift_register;

use crate::{
    error::{FoxError, FoxResult},
    utils::sync_flag::{interrupted, pause},
};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

const EXPORT_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "in",
            Direction::Out => "out",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Gpio {
    root: PathBuf,
}

impl Gpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn pin_file(&self, pin: u32, name: &str) -> PathBuf {
        self.pin_dir(pin).join(name)
    }

    pub fn is_exported(&self, pin: u32) -> bool {
        self.pin_dir(pin).exists()
    }

    /// No-op when the pin directory already exists.
    pub fn export(&self, pin: u32) -> FoxResult<()> {
        if self.is_exported(pin) {
            return Ok(());
        }
        fs::write(self.root.join("export"), pin.to_string())
            .map_err(|e| FoxError::gpio(pin, format!("export failed: {}", e)))?;
        debug!("exported gpio{}", pin);
        // udev needs a moment before the attribute files are writable
        thread::sleep(EXPORT_SETTLE);
        Ok(())
    }

    /// Only warns on failure; used from cleanup paths.
    pub fn unexport(&self, pin: u32) {
        if !self.is_exported(pin) {
            return;
        }
        match fs::write(self.root.join("unexport"), pin.to_string()) {
            Ok(()) => debug!("unexported gpio{}", pin),
            Err(e) => warn!("could not unexport gpio{}: {}", pin, e),
        }
    }

    pub fn set_direction(&self, pin: u32, direction: Direction) -> FoxResult<()> {
        let path = self.pin_file(pin, "direction");
        if !path.exists() {
            return Err(FoxError::gpio(pin, "direction file missing, is the pin exported?"));
        }
        fs::write(&path, direction.to_string())
            .map_err(|e| FoxError::gpio(pin, format!("set direction {}: {}", direction, e)))
    }

    pub fn write(&self, pin: u32, high: bool) -> FoxResult<()> {
        fs::write(self.pin_file(pin, "value"), if high { "1" } else { "0" })
            .map_err(|e| FoxError::gpio(pin, format!("write failed: {}", e)))
    }

    pub fn read(&self, pin: u32) -> FoxResult<bool> {
        let text = fs::read_to_string(self.pin_file(pin, "value"))
            .map_err(|e| FoxError::gpio(pin, format!("read failed: {}", e)))?;
        match text.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(FoxError::gpio(pin, format!("unexpected value {:?}", other))),
        }
    }
}

/// Exported output, released when dropped.
pub struct OutputPin {
    gpio: Gpio,
    pin: u32,
}

impl OutputPin {
    pub fn open(gpio: &Gpio, pin: u32) -> FoxResult<Self> {
        gpio.export(pin)?;
        let handle = Self {
            gpio: gpio.clone(),
            pin,
        };
        gpio.set_direction(pin, Direction::Out)?;
        Ok(handle)
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn set(&self, high: bool) -> FoxResult<()> {
        self.gpio.write(self.pin, high)
    }
}

impl Drop for OutputPin {
    fn drop(&mut self) {
        self.gpio.unexport(self.pin);
    }
}

/// Anything that can drive a digital level; lets drivers run against test doubles.
pub trait OutputLine {
    fn set(&mut self, high: bool) -> FoxResult<()>;
}

impl OutputLine for OutputPin {
    fn set(&mut self, high: bool) -> FoxResult<()> {
        OutputPin::set(self, high)
    }
}

/// Exported input, released when dropped.
pub struct InputPin {
    gpio: Gpio,
    pin: u32,
}

impl InputPin {
    pub fn open(gpio: &Gpio, pin: u32) -> FoxResult<Self> {
        gpio.export(pin)?;
        let handle = Self {
            gpio: gpio.clone(),
            pin,
        };
        gpio.set_direction(pin, Direction::In)?;
        Ok(handle)
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn read(&self) -> FoxResult<bool> {
        self.gpio.read(self.pin)
    }
}

impl Drop for InputPin {
    fn drop(&mut self) {
        self.gpio.unexport(self.pin);
    }
}

/// Toggles `pin` every `period` until Ctrl-C or `max_cycles` full on/off cycles.
/// The LED is left off.
pub fn blink(gpio: &Gpio, pin: u32, period: Duration, max_cycles: Option<u64>) -> FoxResult<()> {
    let led = OutputPin::open(gpio, pin)?;
    info!("blinking gpio{} every {:?}", pin, period);
    let mut cycles = 0;
    while !interrupted() && max_cycles.map_or(true, |max| cycles < max) {
        led.set(true)?;
        println!("LED ON");
        if !pause(period) {
            break;
        }
        led.set(false)?;
        println!("LED OFF");
        if !pause(period) {
            break;
        }
        cycles += 1;
    }
    println!("Stopping LED control.");
    led.set(false)
}

/// Prints the level of `pin` every `period` until Ctrl-C or `max_reads`.
pub fn monitor(gpio: &Gpio, pin: u32, period: Duration, max_reads: Option<u64>) -> FoxResult<Vec<bool>> {
    let input = InputPin::open(gpio, pin)?;
    println!("Monitoring gpio{}... (Ctrl-C to stop)", pin);
    let mut levels = vec![];
    while !interrupted() && max_reads.map_or(true, |max| (levels.len() as u64) < max) {
        let high = input.read()?;
        println!("Pin is {}", if high { "HIGH" } else { "LOW" });
        levels.push(high);
        if !pause(period) {
            break;
        }
    }
    println!("Stopping GPIO input reading.");
    Ok(levels)
}
