pub mod adc;
pub mod balance;
pub mod bench;
pub mod camera;
pub mod capture;
pub mod config;
pub mod display;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod logging;
pub mod spi;
pub mod telemetry;
pub mod terminal;
pub mod threads;
pub mod transfer;
pub mod uart;
pub mod utils;
