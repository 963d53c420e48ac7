//! Bus scanner and the MCP4725 12-bit DAC.

use crate::{
    config::I2cSettings,
    error::{FoxError, FoxResult},
    utils::{
        sync_flag::pause,
        user_io::{is_user_exit, read_line},
    },
};
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use std::{fmt::Write as _, ops::RangeInclusive, path::Path, thread, time::Duration};
use tracing::{debug, info, warn};

pub const SCAN_RANGE: RangeInclusive<u8> = 0x03..=0x77;

const GENERAL_CALL: u8 = 0x00;
const GENERAL_CALL_RESET: u8 = 0x06;
const RESET_SETTLE: Duration = Duration::from_millis(50);
const WRITE_DAC_REGISTER: u8 = 0x40;

pub const DAC_MAX_CODE: u16 = 4095;
pub const SWEEP_CODES: [u16; 7] = [1, 500, 1000, 2000, 3000, 4000, 4095];

pub fn open_bus(path: &Path) -> FoxResult<I2cdev> {
    I2cdev::new(path).map_err(|e| FoxError::I2c(format!("cannot open {:?}: {}", path, e)))
}

/// Addresses that acknowledge a one-byte read.
pub fn scan<I2C: I2c>(bus: &mut I2C) -> Vec<u8> {
    let mut buf = [0u8; 1];
    SCAN_RANGE.filter(|addr| bus.read(*addr, &mut buf).is_ok()).collect()
}

/// `i2cdetect`-style grid of the responders.
pub fn render_scan(found: &[u8]) -> String {
    let mut out = String::from("     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f\n");
    for row in (0u8..0x80).step_by(16) {
        let _ = write!(out, "{:02x}:", row);
        for addr in row..row + 16 {
            if !SCAN_RANGE.contains(&addr) {
                out.push_str("   ");
            } else if found.contains(&addr) {
                let _ = write!(out, " {:02x}", addr);
            } else {
                out.push_str(" --");
            }
        }
        out.push('\n');
    }
    out
}

pub fn run_scan(settings: &I2cSettings) -> FoxResult<Vec<u8>> {
    let mut bus = open_bus(&settings.bus)?;
    let found = scan(&mut bus);
    print!("{}", render_scan(&found));
    info!("{} device(s) on {:?}", found.len(), settings.bus);
    Ok(found)
}

/// Truncates `voltage / vdd * 4095`.
pub fn code_for_voltage(voltage: f64, vdd: f64) -> FoxResult<u16> {
    if !(0.0..=vdd).contains(&voltage) {
        return Err(FoxError::Invalid(format!("voltage must be between 0 and {:.2} V", vdd)));
    }
    Ok((voltage / vdd * DAC_MAX_CODE as f64) as u16)
}

pub fn voltage_for_code(code: u16, vdd: f64) -> f64 {
    code as f64 / DAC_MAX_CODE as f64 * vdd
}

pub struct Mcp4725<I2C> {
    bus: I2C,
    address: u8,
}

impl<I2C: I2c> Mcp4725<I2C> {
    pub fn new(bus: I2C, address: u8) -> Self {
        Self { bus, address }
    }

    /// Resets every device on the bus that honors the general call.
    pub fn general_call_reset(&mut self) -> FoxResult<()> {
        self.bus
            .write(GENERAL_CALL, &[GENERAL_CALL_RESET])
            .map_err(|e| FoxError::I2c(format!("general call reset: {:?}", e)))?;
        thread::sleep(RESET_SETTLE);
        Ok(())
    }

    pub fn set_code(&mut self, code: u16) -> FoxResult<()> {
        if code > DAC_MAX_CODE {
            return Err(FoxError::Invalid(format!("DAC code {} above {}", code, DAC_MAX_CODE)));
        }
        let frame = [WRITE_DAC_REGISTER, (code >> 4) as u8, ((code << 4) & 0xF0) as u8];
        debug!("dac 0x{:02x} <- {:02x?}", self.address, frame);
        self.bus
            .write(self.address, &frame)
            .map_err(|e| FoxError::I2c(format!("write to 0x{:02x}: {:?}", self.address, e)))
    }

    pub fn release(self) -> I2C {
        self.bus
    }
}

/// Steps through `codes`, holding each for `dwell`. Stops early on Ctrl-C.
pub fn sweep<I2C: I2c>(dac: &mut Mcp4725<I2C>, codes: &[u16], vdd: f64, dwell: Duration) -> FoxResult<usize> {
    let mut written = 0;
    for code in codes {
        dac.set_code(*code)?;
        written += 1;
        println!("Set DAC to {:>4} (~{:.2} V)", code, voltage_for_code(*code, vdd));
        if !pause(dwell) {
            break;
        }
    }
    Ok(written)
}

fn open_dac(settings: &I2cSettings) -> FoxResult<Mcp4725<I2cdev>> {
    let mut dac = Mcp4725::new(open_bus(&settings.bus)?, settings.dac_address);
    if let Err(e) = dac.general_call_reset() {
        warn!("{}", e);
    }
    Ok(dac)
}

pub fn run_sweep(settings: &I2cSettings) -> FoxResult<()> {
    let mut dac = open_dac(settings)?;
    let written = sweep(
        &mut dac,
        &SWEEP_CODES,
        settings.dac_vdd,
        Duration::from_millis(settings.dac_dwell_ms),
    )?;
    info!("sweep wrote {} of {} codes", written, SWEEP_CODES.len());
    Ok(())
}

/// Asks for voltages until `q`, Ctrl-C or Ctrl-D.
pub fn run_set(settings: &I2cSettings) -> FoxResult<()> {
    let mut dac = open_dac(settings)?;
    let prompt = format!("Enter voltage (0 - {:.2} V) or Q to quit: ", settings.dac_vdd);
    loop {
        let entry = match read_line(&prompt) {
            Ok(entry) => entry,
            Err(FoxError::Readline(e)) if is_user_exit(&e) => break,
            Err(e) => return Err(e),
        };
        let entry = entry.trim();
        if entry.eq_ignore_ascii_case("q") {
            break;
        }
        let code = match entry
            .parse::<f64>()
            .map_err(|_| FoxError::Invalid(format!("{:?} is not a number", entry)))
            .and_then(|v| code_for_voltage(v, settings.dac_vdd))
        {
            Ok(code) => code,
            Err(e) => {
                println!("Invalid input. {}", e);
                continue;
            }
        };
        match dac.set_code(code) {
            Ok(()) => println!("DAC code {} (~{:.3} V)", code, voltage_for_code(code, settings.dac_vdd)),
            Err(e) => println!("Write failed: {}", e),
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod mock {
    use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

    /// Records writes and acknowledges only the listed addresses.
    #[derive(Default)]
    pub struct BusMock {
        pub present: Vec<u8>,
        pub writes: Vec<(u8, Vec<u8>)>,
    }

    impl BusMock {
        pub fn with_devices(present: &[u8]) -> Self {
            Self {
                present: present.to_vec(),
                writes: vec![],
            }
        }
    }

    impl ErrorType for BusMock {
        type Error = ErrorKind;
    }

    impl I2c for BusMock {
        fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
            if address != 0 && !self.present.contains(&address) {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    Operation::Read(buf) => buf.fill(0),
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{mock::BusMock, *};

    #[test]
    fn scan_reports_responders_in_range() {
        let mut bus = BusMock::with_devices(&[0x02, 0x3c, 0x60, 0x78]);
        assert_eq!(scan(&mut bus), vec![0x3c, 0x60]);
    }

    #[test]
    fn grid_marks_found_and_skipped_cells() {
        let grid = render_scan(&[0x3c]);
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[1].starts_with(&format!("00:{} --", " ".repeat(9))));
        assert!(lines[4].contains(" 3c"));
        assert!(lines[8].starts_with("70: -- --"));
        assert!(lines[8].ends_with("   "));
    }

    #[test]
    fn voltage_to_code_truncates() {
        assert_eq!(code_for_voltage(0.0, 4.9).unwrap(), 0);
        assert_eq!(code_for_voltage(4.9, 4.9).unwrap(), 4095);
        assert_eq!(code_for_voltage(2.45, 4.9).unwrap(), 2047);
        assert!(code_for_voltage(-0.1, 4.9).is_err());
        assert!(code_for_voltage(5.0, 4.9).is_err());
    }

    #[test]
    fn set_code_packs_fast_mode_frame() {
        let mut dac = Mcp4725::new(BusMock::with_devices(&[0x60]), 0x60);
        dac.set_code(0xABC).unwrap();
        assert!(dac.set_code(4096).is_err());
        let bus = dac.release();
        assert_eq!(bus.writes, vec![(0x60, vec![0x40, 0xAB, 0xC0])]);
    }

    #[test]
    fn reset_uses_general_call() {
        let mut dac = Mcp4725::new(BusMock::default(), 0x60);
        dac.general_call_reset().unwrap();
        assert_eq!(dac.release().writes, vec![(0x00, vec![0x06])]);
    }

    #[test]
    fn absent_dac_is_an_error() {
        let mut dac = Mcp4725::new(BusMock::default(), 0x60);
        assert!(matches!(dac.set_code(1), Err(FoxError::I2c(_))));
    }
}
