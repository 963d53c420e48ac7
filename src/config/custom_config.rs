use crate::{
    config::{BaudRate, FoxConfig},
    error::{FoxError, FoxResult},
    utils::user_io::{read_and_parse_user_entry, read_line, UserEntry},
};
use serialport::{available_ports, SerialPortType};
use std::path::Path;

pub struct PortInfo {
    pub port_name: String,
    pub description: String,
}

impl PortInfo {
    pub fn available() -> FoxResult<Vec<PortInfo>> {
        let mut ports = vec![];
        for info in available_ports()? {
            let description = match info.port_type {
                SerialPortType::UsbPort(usb) => format!(
                    "usb vid{:04x}:pid{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                SerialPortType::PciPort => "pci".to_string(),
                SerialPortType::BluetoothPort => "bluetooth".to_string(),
                SerialPortType::Unknown => "uart".to_string(),
            };
            ports.push(PortInfo {
                port_name: info.port_name,
                description,
            });
        }
        Ok(ports)
    }
}

pub fn print_ports(ports: &[PortInfo]) {
    if ports.is_empty() {
        println!("> [ports] no serial ports found");
    }
    for (idx, p) in ports.iter().enumerate() {
        println!("{}) {} ({})", idx + 1, p.port_name, p.description);
    }
}

enum PortChoice {
    Port(String),
    Keep,
    Retry,
}

fn user_select_port(ports: &[PortInfo], current: &str) -> FoxResult<PortChoice> {
    println!("Serial ports to select from:");
    print_ports(ports);
    let msg = format!("Enter index of the target console port (or enter to keep {})", current);
    Ok(match read_and_parse_user_entry::<usize>(&msg)? {
        UserEntry::Value(idx) if idx >= 1 && idx <= ports.len() => {
            PortChoice::Port(ports[idx - 1].port_name.clone())
        }
        UserEntry::Value(_) => {
            println!("> Entry out of range\n");
            PortChoice::Retry
        }
        UserEntry::Invalid { entry, reason } => {
            println!("> Invalid entry {:?} {}\n", entry, reason);
            PortChoice::Retry
        }
        UserEntry::Empty => PortChoice::Keep,
    })
}

fn user_select_baud(port_name: &str) -> FoxResult<BaudRate> {
    loop {
        println!("Baud rate options for {:?}:", port_name);
        println!("1) 115200");
        println!("2) 9600");
        println!("_) custom value");

        match read_and_parse_user_entry::<BaudRate>("Enter 1, 2, or a custom value")? {
            UserEntry::Invalid { entry, reason } => println!("> Invalid entry {:?} {}\n", entry, reason),
            UserEntry::Empty => println!("> Empty entry, try again\n"),
            UserEntry::Value(0) => println!("> Invalid entry, try again\n"),
            UserEntry::Value(1) => return Ok(115_200),
            UserEntry::Value(2) => return Ok(9600),
            UserEntry::Value(baud_rate) => return Ok(baud_rate),
        }
    }
}

impl FoxConfig {
    /// Walks the user through picking the target port, baud rate and project name,
    /// then saves the result to `path`.
    pub fn user_create_custom(path: &Path) -> FoxResult<Self> {
        let mut cfg = FoxConfig::load(path)?;
        let ports = PortInfo::available()?;

        cfg.serial.port_name = loop {
            match user_select_port(&ports, &cfg.serial.port_name)? {
                PortChoice::Port(name) => break name,
                PortChoice::Keep => break cfg.serial.port_name.clone(),
                PortChoice::Retry => continue,
            }
        };
        println!("> Selected {}\n", cfg.serial.port_name);

        cfg.serial.baud_rate = user_select_baud(&cfg.serial.port_name)?;
        println!("> Set baud rate of {:?} as {}\n", cfg.serial.port_name, cfg.serial.baud_rate);

        cfg.console.project_name = loop {
            let project_name = read_line("Enter project name: ")?;
            if project_name.trim().is_empty() {
                println!("> Empty project name. Try again");
            } else {
                break project_name.trim().to_string();
            }
        };
        println!("> Set project name as {}", cfg.console.project_name);

        if cfg.console.project_name.contains('/') {
            return Err(FoxError::Invalid("project name may not contain '/'".to_string()));
        }
        cfg.save(path)?;
        Ok(cfg)
    }
}
