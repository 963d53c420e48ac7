pub mod custom_config;
pub mod read_config;

use crate::error::{FoxError, FoxResult};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub type BaudRate = u32;
pub const DEFAULT_BAUD_RATE: BaudRate = 115_200;
pub const DEFAULT_CONFIG_PATH: &str = "./foxconsole.json";
pub const DEFAULT_TTY: &str = "/dev/ttyS3";

/// Fractional seconds from the config file as a `Duration`.
pub fn seconds(name: &str, value: f64) -> FoxResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| FoxError::Invalid(format!("{} must be a non-negative number of seconds, got {}", name, value)))
}

/// Zero for values `FoxConfig::validate` rejects.
fn secs_or_zero(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Whole-program settings, one section per tool family.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct FoxConfig {
    pub serial: SerialSettings,
    pub target: TargetSettings,
    pub camera: CameraSettings,
    pub transfer: TransferSettings,
    pub console: ConsoleSettings,
    pub loopback: LoopbackSettings,
    pub gpio: GpioSettings,
    pub adc: AdcSettings,
    pub i2c: I2cSettings,
    pub spi: SpiSettings,
    pub balance: BalanceSettings,
    pub mqtt: MqttSettings,
}

impl FoxConfig {
    /// Rejects timeouts that cannot be turned into a `Duration`.
    pub fn validate(&self) -> FoxResult<()> {
        seconds("serial.command_timeout_s", self.serial.command_timeout_s)?;
        seconds("serial.login_timeout_s", self.serial.login_timeout_s)?;
        seconds("serial.cleanup_timeout_s", self.serial.cleanup_timeout_s)?;
        seconds("camera.capture_timeout_s", self.camera.capture_timeout_s)?;
        seconds("balance.response_timeout_s", self.balance.response_timeout_s)?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: BaudRate,
    pub read_timeout_ms: u64,
    pub command_timeout_s: f64,
    pub login_timeout_s: f64,
    /// Removing the remote image after a capture.
    pub cleanup_timeout_s: f64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_TTY.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            command_timeout_s: 10.0,
            login_timeout_s: 15.0,
            cleanup_timeout_s: 5.0,
        }
    }
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
    pub fn command_timeout(&self) -> Duration {
        secs_or_zero(self.command_timeout_s)
    }
    pub fn login_timeout(&self) -> Duration {
        secs_or_zero(self.login_timeout_s)
    }
    pub fn cleanup_timeout(&self) -> Duration {
        secs_or_zero(self.cleanup_timeout_s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TargetSettings {
    pub username: String,
    pub password: String,
    pub login_prompt: String,
    pub password_prompt: String,
    pub shell_prompts: Vec<String>,
    pub network_interface: String,
    pub services_to_stop: Vec<String>,
    pub reboot_wait_s: u64,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: "luckfox".to_string(),
            login_prompt: "login: ".to_string(),
            password_prompt: "Password: ".to_string(),
            shell_prompts: vec![
                "[root@luckfox ~]# ".to_string(),
                "[root@luckfox root]# ".to_string(),
                "# ".to_string(),
            ],
            network_interface: "eth0".to_string(),
            services_to_stop: vec!["rkipc".to_string()],
            reboot_wait_s: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CameraSettings {
    pub device_node: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub target_image_path: String,
    pub capture_timeout_s: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_node: "/dev/video15".to_string(),
            width: 240,
            height: 135,
            pixel_format: "NV12".to_string(),
            target_image_path: "/tmp/csi_capture.yuv".to_string(),
            capture_timeout_s: 15.0,
        }
    }
}

impl CameraSettings {
    pub fn capture_timeout(&self) -> Duration {
        secs_or_zero(self.capture_timeout_s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TransferSettings {
    pub output_dir: PathBuf,
    pub raw_prefix: String,
    pub jpg_prefix: String,
    pub scp_timeout_s: u64,
    pub ffmpeg_timeout_s: u64,
    pub session_report_file: PathBuf,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./captured_images"),
            raw_prefix: "capture_raw_".to_string(),
            jpg_prefix: "capture_final_".to_string(),
            scp_timeout_s: 60,
            ffmpeg_timeout_s: 30,
            session_report_file: PathBuf::from("luckfox_session_report.log"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AutoReply {
    pub trigger: String,
    pub reply: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConsoleSettings {
    pub project_name: String,
    pub log_dir: PathBuf,
    pub line_width: usize,
    pub line_ending: String,
    pub auto_replies: Vec<AutoReply>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            project_name: "luckfox".to_string(),
            log_dir: PathBuf::from("./logs"),
            line_width: 80,
            line_ending: "\r\n".to_string(),
            auto_replies: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoopbackSettings {
    pub port_name: String,
    pub baud_rate: BaudRate,
    pub payload: String,
    pub delay_ms: u64,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_TTY.to_string(),
            baud_rate: 9600,
            payload: "GNL\r\n".to_string(),
            delay_ms: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ShiftRegisterPins {
    pub data: u32,
    pub shift_clock: u32,
    pub latch_clock: u32,
    pub output_enable: u32,
}

impl Default for ShiftRegisterPins {
    fn default() -> Self {
        Self {
            data: 53,
            shift_clock: 52,
            latch_clock: 54,
            output_enable: 55,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AreaPin {
    pub area: String,
    pub pin: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GpioSettings {
    pub sysfs_root: PathBuf,
    pub led_pin: u32,
    pub blink_period_ms: u64,
    pub input_pin: u32,
    pub monitor_period_ms: u64,
    pub shift_register: ShiftRegisterPins,
    pub mux_selectors: [u32; 3],
    pub occupancy_areas: Vec<AreaPin>,
    pub occupancy_poll_ms: u64,
    pub occupancy_report: PathBuf,
}

impl Default for GpioSettings {
    fn default() -> Self {
        let area = |area: &str, pin| AreaPin {
            area: area.to_string(),
            pin,
        };
        Self {
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            led_pin: 55,
            blink_period_ms: 1000,
            input_pin: 54,
            monitor_period_ms: 1500,
            shift_register: ShiftRegisterPins::default(),
            mux_selectors: [64, 65, 66],
            occupancy_areas: vec![area("A", 52), area("B", 53), area("C", 56), area("D", 57)],
            occupancy_poll_ms: 100,
            occupancy_report: PathBuf::from("occupancy.csv"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AdcSettings {
    pub iio_root: PathBuf,
    pub device: String,
    pub channel: String,
    pub vref: f64,
    pub resolution_bits: u32,
    pub settle_ms: u64,
    pub scan_delay_ms: u64,
    pub difference_threshold: f64,
    pub position_tolerance: f64,
}

impl Default for AdcSettings {
    fn default() -> Self {
        Self {
            iio_root: PathBuf::from("/sys/bus/iio/devices"),
            device: "iio:device0".to_string(),
            channel: "in_voltage0".to_string(),
            vref: 1.8,
            resolution_bits: 10,
            settle_ms: 50,
            scan_delay_ms: 100,
            difference_threshold: 0.1,
            position_tolerance: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct I2cSettings {
    pub bus: PathBuf,
    pub dac_address: u8,
    pub dac_vdd: f64,
    pub dac_dwell_ms: u64,
    pub oled_address: u8,
}

impl Default for I2cSettings {
    fn default() -> Self {
        Self {
            bus: PathBuf::from("/dev/i2c-3"),
            dac_address: 0x60,
            dac_vdd: 4.9,
            dac_dwell_ms: 5000,
            oled_address: 0x3C,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SpiSettings {
    pub device: PathBuf,
    pub max_speed_hz: u32,
    pub payload: String,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/spidev0.0"),
            max_speed_hz: 1_000_000,
            payload: "hello world!".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BalanceSettings {
    pub port_name: String,
    pub baud_rate: BaudRate,
    pub read_timeout_ms: u64,
    pub response_timeout_s: f64,
    pub update_interval_ms: u64,
    pub record_file: PathBuf,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_TTY.to_string(),
            baud_rate: 300,
            read_timeout_ms: 100,
            response_timeout_s: 5.0,
            update_interval_ms: 1000,
            record_file: PathBuf::from("evaporation.csv"),
        }
    }
}

impl BalanceSettings {
    pub fn response_timeout(&self) -> Duration {
        secs_or_zero(self.response_timeout_s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MqttSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub board_id: Option<String>,
    pub network_interface: String,
    pub report_interval_s: u64,
    pub keep_alive_s: u64,
    pub max_connect_attempts: u32,
    pub connect_wait_s: u64,
    pub retry_delay_s: u64,
    pub status_topic_filter: String,
    pub stale_after_s: u64,
    pub max_board_lines: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_host: "192.168.50.206".to_string(),
            broker_port: 1883,
            board_id: None,
            network_interface: "eth0".to_string(),
            report_interval_s: 15,
            keep_alive_s: 60,
            max_connect_attempts: 5,
            connect_wait_s: 10,
            retry_delay_s: 5,
            status_topic_filter: "luckfox/+/status".to_string(),
            stale_after_s: 90,
            max_board_lines: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: FoxConfig =
            serde_json::from_str(r#"{"serial": {"port_name": "/dev/ttyUSB0"}, "mqtt": {"broker_port": 8883}}"#)
                .unwrap();
        assert_eq!(cfg.serial.port_name, "/dev/ttyUSB0");
        assert_eq!(cfg.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(cfg.mqtt.broker_port, 8883);
        assert_eq!(cfg.mqtt.report_interval_s, 15);
        assert_eq!(cfg.target.shell_prompts.len(), 3);
        assert_eq!(cfg.gpio.mux_selectors, [64, 65, 66]);
    }

    #[test]
    fn timeouts_convert_from_seconds() {
        let serial = SerialSettings::default();
        assert_eq!(serial.command_timeout(), Duration::from_secs(10));
        assert_eq!(serial.login_timeout(), Duration::from_secs(15));
        assert_eq!(serial.read_timeout(), Duration::from_millis(100));
    }
}
