//! Small text panels: an SSD1306 OLED, or the terminal when no OLED answers.

use crate::{
    config::I2cSettings,
    error::{FoxError, FoxResult},
    i2c::open_bus,
};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle, MonoTextStyleBuilder},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use linux_embedded_hal::I2cdev;
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};
use tracing::{info, warn};

pub const MAX_LINES: usize = 6;
pub const MAX_COLUMNS: usize = 21;
const LINE_HEIGHT: i32 = 10;

pub trait TextPanel {
    fn show(&mut self, lines: &[String]) -> FoxResult<()>;
    fn clear(&mut self) -> FoxResult<()>;
}

/// First six lines, each cut to what fits across 128 pixels.
pub fn fit_lines(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .take(MAX_LINES)
        .map(|line| line.chars().take(MAX_COLUMNS).collect())
        .collect()
}

type Oled = Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub struct OledPanel {
    display: Oled,
    style: MonoTextStyle<'static, BinaryColor>,
}

impl OledPanel {
    pub fn open(settings: &I2cSettings) -> FoxResult<Self> {
        let interface = I2CDisplayInterface::new_custom_address(open_bus(&settings.bus)?, settings.oled_address);
        let mut display =
            Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0).into_buffered_graphics_mode();
        display
            .init()
            .map_err(|e| FoxError::Display(format!("oled init at 0x{:02x}: {:?}", settings.oled_address, e)))?;
        let style = MonoTextStyleBuilder::new()
            .font(&FONT_6X10)
            .text_color(BinaryColor::On)
            .build();
        let mut panel = Self { display, style };
        panel.clear()?;
        Ok(panel)
    }

    fn flush(&mut self) -> FoxResult<()> {
        self.display
            .flush()
            .map_err(|e| FoxError::Display(format!("oled flush: {:?}", e)))
    }
}

impl TextPanel for OledPanel {
    fn show(&mut self, lines: &[String]) -> FoxResult<()> {
        self.display.clear_buffer();
        for (row, line) in fit_lines(lines).iter().enumerate() {
            Text::with_baseline(line, Point::new(0, row as i32 * LINE_HEIGHT), self.style, Baseline::Top)
                .draw(&mut self.display)
                .map_err(|e| FoxError::Display(format!("oled draw: {:?}", e)))?;
        }
        self.flush()
    }

    fn clear(&mut self) -> FoxResult<()> {
        self.display.clear_buffer();
        self.flush()
    }
}

/// Prints panel contents to the terminal.
#[derive(Debug, Default)]
pub struct ConsolePanel {
    shown: Vec<String>,
}

impl ConsolePanel {
    pub fn shown(&self) -> &[String] {
        &self.shown
    }
}

impl TextPanel for ConsolePanel {
    fn show(&mut self, lines: &[String]) -> FoxResult<()> {
        let lines = fit_lines(lines);
        if lines == self.shown {
            return Ok(());
        }
        println!("+{}+", "-".repeat(MAX_COLUMNS));
        for line in &lines {
            println!("|{:<width$}|", line, width = MAX_COLUMNS);
        }
        println!("+{}+", "-".repeat(MAX_COLUMNS));
        self.shown = lines;
        Ok(())
    }

    fn clear(&mut self) -> FoxResult<()> {
        self.shown.clear();
        Ok(())
    }
}

/// OLED when it initializes, terminal otherwise.
pub fn open_panel(settings: &I2cSettings) -> Box<dyn TextPanel> {
    match OledPanel::open(settings) {
        Ok(panel) => {
            info!("oled ready at 0x{:02x} on {:?}", settings.oled_address, settings.bus);
            Box::new(panel)
        }
        Err(e) => {
            warn!("{}; using the terminal instead", e);
            Box::new(ConsolePanel::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn lines_are_cut_to_the_panel() {
        let fitted = fit_lines(&lines(&["1", "2", "3", "4", "5", "6", "7"]));
        assert_eq!(fitted.len(), MAX_LINES);
        let fitted = fit_lines(&lines(&["abcdefghijklmnopqrstuvwxyz"]));
        assert_eq!(fitted[0], "abcdefghijklmnopqrstu");
    }

    #[test]
    fn console_panel_keeps_what_it_showed() {
        let mut panel = ConsolePanel::default();
        panel.show(&lines(&["Setra Wt:", "   1.250 g"])).unwrap();
        assert_eq!(panel.shown(), &lines(&["Setra Wt:", "   1.250 g"])[..]);
        panel.clear().unwrap();
        assert!(panel.shown().is_empty());
    }

    #[test]
    fn missing_bus_falls_back_to_console() {
        let settings = I2cSettings {
            bus: "/nonexistent/i2c-99".into(),
            ..I2cSettings::default()
        };
        let mut panel = open_panel(&settings);
        panel.show(&lines(&["ok"])).unwrap();
    }
}
