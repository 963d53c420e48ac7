use thiserror::Error;

pub type FoxResult<T> = Result<T, FoxError>;

#[derive(Debug, Error)]
pub enum FoxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("readline error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("remote command failed: {0}")]
    Remote(String),

    #[error("local command failed: {0}")]
    Local(String),

    #[error("gpio {pin}: {msg}")]
    Gpio { pin: u32, msg: String },

    #[error("adc: {0}")]
    Adc(String),

    #[error("i2c: {0}")]
    I2c(String),

    #[error("spi: {0}")]
    Spi(String),

    #[error("display: {0}")]
    Display(String),

    #[error("mqtt: {0}")]
    Mqtt(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl FoxError {
    pub fn gpio(pin: u32, msg: impl Into<String>) -> Self {
        Self::Gpio {
            pin,
            msg: msg.into(),
        }
    }
}
