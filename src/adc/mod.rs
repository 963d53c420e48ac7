//! SAR ADC through the IIO sysfs interface, plus the analog front ends behind it.

pub mod motion;
pub mod mux;

use crate::{
    config::AdcSettings,
    error::{FoxError, FoxResult},
};
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcReading {
    pub raw: u32,
    pub voltage: f64,
}

#[derive(Debug, Clone)]
pub struct IioAdc {
    raw_path: PathBuf,
    vref: f64,
    max_code: u32,
}

impl IioAdc {
    pub fn new(settings: &AdcSettings) -> Self {
        let bits = settings.resolution_bits.clamp(1, 31);
        Self {
            raw_path: settings
                .iio_root
                .join(&settings.device)
                .join(format!("{}_raw", settings.channel)),
            vref: settings.vref,
            max_code: (1u32 << bits) - 1,
        }
    }

    pub fn raw_path(&self) -> &PathBuf {
        &self.raw_path
    }

    pub fn to_voltage(&self, raw: u32) -> f64 {
        raw as f64 / self.max_code as f64 * self.vref
    }

    pub fn read(&self) -> FoxResult<AdcReading> {
        let text = fs::read_to_string(&self.raw_path)
            .map_err(|e| FoxError::Adc(format!("cannot read {:?}: {}", self.raw_path, e)))?;
        let raw = text
            .trim()
            .parse::<u32>()
            .map_err(|_| FoxError::Adc(format!("non-integer value {:?} in {:?}", text.trim(), self.raw_path)))?;
        Ok(AdcReading {
            raw,
            voltage: self.to_voltage(raw),
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use crate::config::AdcSettings;
    use std::{fs, path::PathBuf};

    /// IIO tree with one channel holding `raw`.
    pub fn iio(tag: &str, raw: &str) -> (PathBuf, AdcSettings) {
        let root = std::env::temp_dir().join(format!("foxconsole-iio-{}-{}", tag, std::process::id()));
        let settings = AdcSettings {
            iio_root: root.clone(),
            ..AdcSettings::default()
        };
        let dir = root.join(&settings.device);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}_raw", settings.channel)), raw).unwrap();
        (root, settings)
    }
}
