use crate::{
    config::BaudRate,
    error::{FoxError, FoxResult},
};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};
use tracing::{error, info};

/// Byte-level view of a terminal line. Everything above it (prompt scraping,
/// login, instruments) talks to this trait so it can run against `MockLink`.
pub trait SerialLink {
    /// Reads what is waiting. 0 means nothing arrived before the port timeout.
    fn read_chunk(&mut self, buf: &mut [u8]) -> FoxResult<usize>;
    fn send(&mut self, bytes: &[u8]) -> FoxResult<()>;
    fn clear_input(&mut self) -> FoxResult<()>;
    fn clear_output(&mut self) -> FoxResult<()>;
    fn bytes_waiting(&mut self) -> FoxResult<usize>;

    fn clear_all(&mut self) -> FoxResult<()> {
        self.clear_input()?;
        self.clear_output()
    }
}

impl SerialLink for Box<dyn SerialPort> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> FoxResult<usize> {
        match self.read(buf) {
            Ok(count) => Ok(count),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(FoxError::Io(e)),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> FoxResult<()> {
        self.write_all(bytes)?;
        self.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> FoxResult<()> {
        Ok(self.as_mut().clear(ClearBuffer::Input)?)
    }

    fn clear_output(&mut self) -> FoxResult<()> {
        Ok(self.as_mut().clear(ClearBuffer::Output)?)
    }

    fn bytes_waiting(&mut self) -> FoxResult<usize> {
        Ok(self.as_mut().bytes_to_read()? as usize)
    }
}

/// Opens `name` as 8N1 without flow control.
pub fn open_port(name: &str, baud_rate: BaudRate, read_timeout: Duration) -> FoxResult<Box<dyn SerialPort>> {
    let opened = serialport::new(name, baud_rate)
        .timeout(read_timeout)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open();
    match opened {
        Ok(port) => {
            info!("opened {} at {} baud", name, baud_rate);
            Ok(port)
        }
        Err(e) => {
            error!("could not open {}: {}", name, e);
            Err(FoxError::Serial(e))
        }
    }
}
