//! Full-duplex loopback over spidev (MOSI wired to MISO).

use crate::{
    config::SpiSettings,
    error::{FoxError, FoxResult},
};
use embedded_hal::spi::SpiDevice;
use linux_embedded_hal::{
    spidev::{SpiModeFlags, SpidevOptions},
    SpidevDevice,
};
use tracing::{info, warn};

pub fn open_device(settings: &SpiSettings) -> FoxResult<SpidevDevice> {
    let mut device = SpidevDevice::open(&settings.device)
        .map_err(|e| FoxError::Spi(format!("cannot open {:?}: {:?}", settings.device, e)))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(settings.max_speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    device
        .0
        .configure(&options)
        .map_err(|e| FoxError::Spi(format!("configure {:?}: {}", settings.device, e)))?;
    Ok(device)
}

/// Clocks `tx` out while reading the same number of bytes back.
pub fn exchange<S: SpiDevice>(device: &mut S, tx: &[u8]) -> FoxResult<Vec<u8>> {
    let mut rx = vec![0u8; tx.len()];
    device
        .transfer(&mut rx, tx)
        .map_err(|e| FoxError::Spi(format!("transfer: {:?}", e)))?;
    Ok(rx)
}

pub fn run_loopback(settings: &SpiSettings) -> FoxResult<bool> {
    let mut device = open_device(settings)?;
    info!("spi {:?} at {} Hz", settings.device, settings.max_speed_hz);
    let tx = settings.payload.as_bytes();
    let rx = exchange(&mut device, tx)?;
    println!("tx_buffer:\n\r {}", settings.payload);
    println!("rx_buffer:\n\r {}", String::from_utf8_lossy(&rx));
    let matched = rx == tx;
    if !matched {
        warn!("loopback mismatch: sent {:02x?}, got {:02x?}", tx, rx);
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::{ErrorKind, ErrorType, Operation};

    /// MISO tied to MOSI, optionally with one stuck bit.
    struct Wire {
        stuck_high: u8,
    }

    impl ErrorType for Wire {
        type Error = ErrorKind;
    }

    impl SpiDevice for Wire {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Transfer(read, write) => {
                        for (r, w) in read.iter_mut().zip(write.iter()) {
                            *r = *w | self.stuck_high;
                        }
                    }
                    Operation::TransferInPlace(_) | Operation::Write(_) | Operation::DelayNs(_) => {}
                    Operation::Read(_) => return Err(ErrorKind::Other),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn wired_loop_echoes() {
        let rx = exchange(&mut Wire { stuck_high: 0 }, b"hello world!").unwrap();
        assert_eq!(rx, b"hello world!");
    }

    #[test]
    fn stuck_line_shows_up_in_rx() {
        let rx = exchange(&mut Wire { stuck_high: 0x80 }, b"A").unwrap();
        assert_eq!(rx, vec![0xC1]);
    }
}
