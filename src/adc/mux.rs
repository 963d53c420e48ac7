//! 74HC4051 eight-channel analog multiplexer in front of the ADC.

use super::{AdcReading, IioAdc};
use crate::{
    error::{FoxError, FoxResult},
    gpio::{Gpio, OutputLine, OutputPin},
    utils::user_io::{is_user_exit, read_line},
};
use std::{thread, time::Duration};
use tracing::info;

pub const CHANNELS: u8 = 8;

/// S0, S1, S2 levels for `channel`.
pub fn selector_levels(channel: u8) -> FoxResult<[bool; 3]> {
    if channel >= CHANNELS {
        return Err(FoxError::Invalid(format!("mux channel {} out of range (0-7)", channel)));
    }
    Ok([channel & 1 != 0, channel & 2 != 0, channel & 4 != 0])
}

pub struct Mux<L: OutputLine> {
    selectors: [L; 3],
}

impl<L: OutputLine> Mux<L> {
    pub fn new(selectors: [L; 3]) -> Self {
        Self { selectors }
    }

    pub fn select(&mut self, channel: u8) -> FoxResult<()> {
        let levels = selector_levels(channel)?;
        for (line, level) in self.selectors.iter_mut().zip(levels) {
            line.set(level)?;
        }
        Ok(())
    }
}

impl Mux<OutputPin> {
    pub fn open(gpio: &Gpio, pins: [u32; 3]) -> FoxResult<Self> {
        Ok(Self::new([
            OutputPin::open(gpio, pins[0])?,
            OutputPin::open(gpio, pins[1])?,
            OutputPin::open(gpio, pins[2])?,
        ]))
    }
}

/// Mux plus ADC: select a channel, let it settle, read.
pub struct MuxAdc<L: OutputLine> {
    pub mux: Mux<L>,
    pub adc: IioAdc,
}

impl<L: OutputLine> MuxAdc<L> {
    pub fn sample(&mut self, channel: u8, settle: Duration) -> FoxResult<AdcReading> {
        self.mux.select(channel)?;
        thread::sleep(settle);
        self.adc.read()
    }
}

enum MuxEntry {
    Channel(u8),
    Quit,
}

fn parse_entry(entry: &str) -> FoxResult<MuxEntry> {
    let entry = entry.trim().to_lowercase();
    if entry == "q" {
        return Ok(MuxEntry::Quit);
    }
    let channel = entry
        .parse::<u8>()
        .map_err(|_| FoxError::Invalid("please enter a number (0-7) or Q".to_string()))?;
    selector_levels(channel)?;
    Ok(MuxEntry::Channel(channel))
}

/// Asks for channels until `q`, Ctrl-C or Ctrl-D.
pub fn interactive(gpio: &Gpio, pins: [u32; 3], adc: IioAdc, settle: Duration) -> FoxResult<()> {
    println!("Using GPIOs: S0={}, S1={}, S2={}", pins[0], pins[1], pins[2]);
    println!("Reading ADC from: {:?}", adc.raw_path());
    let mut front_end = MuxAdc {
        mux: Mux::open(gpio, pins)?,
        adc,
    };
    loop {
        let entry = match read_line("Enter MUX channel (0-7) or Q to quit: ") {
            Ok(entry) => entry,
            Err(FoxError::Readline(e)) if is_user_exit(&e) => break,
            Err(e) => return Err(e),
        };
        let channel = match parse_entry(&entry) {
            Ok(MuxEntry::Quit) => break,
            Ok(MuxEntry::Channel(channel)) => channel,
            Err(e) => {
                println!("Invalid input. {}", e);
                continue;
            }
        };
        match front_end.sample(channel, settle) {
            Ok(reading) => println!(
                "Channel {}: Raw={}, Voltage={:.3}V",
                channel, reading.raw, reading.voltage
            ),
            Err(e) => println!("Failed to read voltage: {}", e),
        }
        println!("{}", "-".repeat(20));
    }
    info!("mux session end");
    Ok(())
}
