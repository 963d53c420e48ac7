//! 74HC595 driving ten active-low LEDs.

use super::{Gpio, OutputLine, OutputPin};
use crate::{
    config::ShiftRegisterPins,
    error::{FoxError, FoxResult},
    utils::user_io::{is_user_exit, read_line},
};
use std::{iter, thread, time::Duration};
use tracing::info;

pub const PATTERN_BITS: usize = 10;
const LEADING_ZEROS: usize = 6;
const PULSE: Duration = Duration::from_millis(1);

/// Exactly ten `0`/`1` characters.
pub fn parse_pattern(entry: &str) -> FoxResult<Vec<bool>> {
    let entry = entry.trim();
    if entry.chars().count() != PATTERN_BITS || entry.chars().any(|c| c != '0' && c != '1') {
        return Err(FoxError::Invalid(format!(
            "expected exactly {} bits of 0 or 1, got {:?}",
            PATTERN_BITS, entry
        )));
    }
    Ok(entry.chars().map(|c| c == '1').collect())
}

/// Frame as shifted, MSB first: six padding zeros, then the inverted pattern.
pub fn frame_bits(pattern: &[bool]) -> Vec<bool> {
    iter::repeat(false)
        .take(LEADING_ZEROS)
        .chain(pattern.iter().map(|bit| !bit))
        .collect()
}

pub struct ShiftRegister<L: OutputLine> {
    data: L,
    shift_clock: L,
    latch_clock: L,
    output_enable: L,
}

fn pulse<L: OutputLine>(line: &mut L) -> FoxResult<()> {
    line.set(true)?;
    thread::sleep(PULSE);
    line.set(false)?;
    thread::sleep(PULSE);
    Ok(())
}

impl<L: OutputLine> ShiftRegister<L> {
    /// Drives output enable low so the outputs follow the latch.
    pub fn new(data: L, shift_clock: L, latch_clock: L, output_enable: L) -> FoxResult<Self> {
        let mut register = Self {
            data,
            shift_clock,
            latch_clock,
            output_enable,
        };
        register.output_enable.set(false)?;
        Ok(register)
    }

    pub fn shift_out(&mut self, bits: &[bool]) -> FoxResult<()> {
        for bit in bits {
            self.data.set(*bit)?;
            pulse(&mut self.shift_clock)?;
        }
        pulse(&mut self.latch_clock)
    }

    pub fn show(&mut self, pattern: &[bool]) -> FoxResult<()> {
        self.shift_out(&frame_bits(pattern))
    }
}

impl ShiftRegister<OutputPin> {
    pub fn open(gpio: &Gpio, pins: &ShiftRegisterPins) -> FoxResult<Self> {
        Self::new(
            OutputPin::open(gpio, pins.data)?,
            OutputPin::open(gpio, pins.shift_clock)?,
            OutputPin::open(gpio, pins.latch_clock)?,
            OutputPin::open(gpio, pins.output_enable)?,
        )
    }
}

/// Asks for patterns until Ctrl-C or Ctrl-D.
pub fn interactive(gpio: &Gpio, pins: &ShiftRegisterPins) -> FoxResult<()> {
    let mut register = ShiftRegister::open(gpio, pins)?;
    info!("shift register on data {} clock {} latch {}", pins.data, pins.shift_clock, pins.latch_clock);
    loop {
        let entry = match read_line("Enter a 10-bit binary number (e.g., 1011001101): ") {
            Ok(entry) => entry,
            Err(FoxError::Readline(e)) if is_user_exit(&e) => break,
            Err(e) => return Err(e),
        };
        match parse_pattern(&entry) {
            Ok(pattern) => register.show(&pattern)?,
            Err(e) => println!("Invalid input. {}", e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Clone)]
    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<(&'static str, bool)>>>,
    }

    impl OutputLine for Probe {
        fn set(&mut self, high: bool) -> FoxResult<()> {
            self.log.borrow_mut().push((self.name, high));
            Ok(())
        }
    }

    #[test]
    fn patterns_must_be_ten_bits() {
        assert_eq!(parse_pattern("1000000001").unwrap().len(), 10);
        assert!(parse_pattern("100000001").is_err());
        assert!(parse_pattern("10000000012").is_err());
        assert!(parse_pattern("10000x0001").is_err());
    }

    #[test]
    fn frame_is_padded_and_inverted() {
        let frame = frame_bits(&parse_pattern("1100000000").unwrap());
        let text: String = frame.iter().map(|b| if *b { '1' } else { '0' }).collect();
        assert_eq!(text, "0000000011111111");
    }

    #[test]
    fn bits_are_clocked_then_latched() {
        let log = Rc::new(RefCell::new(vec![]));
        let line = |name| Probe {
            name,
            log: Rc::clone(&log),
        };
        let mut register = ShiftRegister::new(line("data"), line("clk"), line("latch"), line("oe")).unwrap();
        register.shift_out(&[true, false]).unwrap();

        let log = log.borrow();
        assert_eq!(log[0], ("oe", false));
        assert_eq!(
            &log[1..],
            &[
                ("data", true),
                ("clk", true),
                ("clk", false),
                ("data", false),
                ("clk", true),
                ("clk", false),
                ("latch", true),
                ("latch", false),
            ]
        );
    }
}
