// LuckFox bench tools: serial console automation, camera capture, pins, buses,
// instruments and telemetry, one subcommand each.

use clap::{Parser, Subcommand};
use foxconsole::{
    adc::{
        motion,
        mux::{self, Mux, MuxAdc},
        IioAdc,
    },
    balance, bench, capture,
    config::{
        custom_config::{print_ports, PortInfo},
        FoxConfig, DEFAULT_CONFIG_PATH,
    },
    display::open_panel,
    error::{FoxError, FoxResult},
    gpio::{self, occupancy, shift_register, Gpio},
    i2c, logging, spi,
    telemetry::{board, reporter},
    threads::console_task,
    uart,
    utils::sync_flag::install_interrupt_handler,
};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::debug;

#[derive(Parser)]
#[command(name = "foxconsole", version, about = "LuckFox bench and target tools", long_about = None)]
struct Cli {
    /// JSON config file; defaults are used for anything it leaves out
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug logging (FOXCONSOLE_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports on this host
    Ports,

    /// Create or print the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Interactive serial console with transcript logging
    Console,

    /// Log in on the target console and reboot it
    Reboot,

    /// Log in on the target console and print its IP address
    TargetIp,

    /// Capture a camera frame on the target and convert it to JPEG here
    Capture {
        /// Skip the reboot before capturing
        #[arg(long)]
        no_reboot: bool,
    },

    /// UART loopback test (TX wired to RX)
    Loopback,

    /// Blink the LED pin
    Blink {
        #[arg(long)]
        pin: Option<u32>,
        /// Stop after this many on/off cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Print the level of an input pin
    GpioMonitor {
        #[arg(long)]
        pin: Option<u32>,
        /// Stop after this many reads
        #[arg(long)]
        reads: Option<u64>,
    },

    /// Drive the 74HC595 LED bar from typed bit patterns
    Shift,

    /// Read one 74HC4051 channel at a time
    Mux,

    /// Track a shadow across the photoresistor array
    Motion {
        /// Stop after this many scans
        #[arg(long)]
        scans: Option<u64>,
    },

    /// Count visits and dwell time per area from presence sensors
    Occupancy {
        /// Stop after this many polls
        #[arg(long)]
        polls: Option<u64>,
    },

    /// Probe the I2C bus like i2cdetect
    I2cScan,

    /// MCP4725 DAC output
    Dac {
        #[command(subcommand)]
        action: DacAction,
    },

    /// SPI loopback test (MOSI wired to MISO)
    SpiLoopback,

    /// Setra balance readout and recording
    Balance,

    /// Publish this board's status over MQTT
    Report,

    /// Show every board's status on the OLED
    StatusBoard,

    /// CPU micro-benchmarks
    Bench,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Pick port, baud rate and project name, then save
    Init,
    /// Print the effective config
    Show,
}

#[derive(Subcommand)]
enum DacAction {
    /// Step through fixed codes
    Sweep,
    /// Type voltages to output
    Set,
}

fn run(cli: Cli) -> FoxResult<()> {
    let cfg = match &cli.command {
        Commands::Config {
            action: ConfigAction::Init,
        } => FoxConfig::user_create_custom(&cli.config)?,
        _ => FoxConfig::load(&cli.config)?,
    };
    let gpio = Gpio::new(&cfg.gpio.sysfs_root);

    match cli.command {
        Commands::Ports => print_ports(&PortInfo::available()?),
        Commands::Config { action } => match action {
            ConfigAction::Init => println!("> [config] saved {:?}", cli.config),
            ConfigAction::Show => println!("{}", cfg.to_pretty_json()?),
        },
        Commands::Console => console_task(&cfg)?,
        Commands::Reboot => {
            let mut report = capture::SessionReport::new();
            capture::trigger_reboot(&cfg, &mut report)?;
        }
        Commands::TargetIp => capture::print_target_ip(&cfg)?,
        Commands::Capture { no_reboot } => capture::run(&cfg, !no_reboot)?,
        Commands::Loopback => uart::run_loopback(&cfg.loopback)?,
        Commands::Blink { pin, cycles } => gpio::blink(
            &gpio,
            pin.unwrap_or(cfg.gpio.led_pin),
            Duration::from_millis(cfg.gpio.blink_period_ms),
            cycles,
        )?,
        Commands::GpioMonitor { pin, reads } => {
            gpio::monitor(
                &gpio,
                pin.unwrap_or(cfg.gpio.input_pin),
                Duration::from_millis(cfg.gpio.monitor_period_ms),
                reads,
            )?;
        }
        Commands::Shift => shift_register::interactive(&gpio, &cfg.gpio.shift_register)?,
        Commands::Mux => mux::interactive(
            &gpio,
            cfg.gpio.mux_selectors,
            IioAdc::new(&cfg.adc),
            Duration::from_millis(cfg.adc.settle_ms),
        )?,
        Commands::Motion { scans } => {
            let mut front_end = MuxAdc {
                mux: Mux::open(&gpio, cfg.gpio.mux_selectors)?,
                adc: IioAdc::new(&cfg.adc),
            };
            motion::run(&mut front_end, &cfg.adc, scans)?;
        }
        Commands::Occupancy { polls } => {
            occupancy::track(
                &gpio,
                &cfg.gpio.occupancy_areas,
                Duration::from_millis(cfg.gpio.occupancy_poll_ms),
                &cfg.gpio.occupancy_report,
                polls,
            )?;
        }
        Commands::I2cScan => {
            i2c::run_scan(&cfg.i2c)?;
        }
        Commands::Dac { action } => match action {
            DacAction::Sweep => i2c::run_sweep(&cfg.i2c)?,
            DacAction::Set => i2c::run_set(&cfg.i2c)?,
        },
        Commands::SpiLoopback => {
            if !spi::run_loopback(&cfg.spi)? {
                return Err(FoxError::Spi("received data does not match sent data".to_string()));
            }
        }
        Commands::Balance => {
            let mut panel = open_panel(&cfg.i2c);
            balance::run(&cfg.balance, panel.as_mut())?;
        }
        Commands::Report => reporter::run(&cfg.mqtt)?,
        Commands::StatusBoard => {
            let mut panel = open_panel(&cfg.i2c);
            board::run(&cfg.mqtt, panel.as_mut())?;
        }
        Commands::Bench => bench::run(),
    }
    Ok(())
}

pub fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    install_interrupt_handler();

    match run(cli) {
        Err(e) => {
            println!("> [main] error {}", e);
            ExitCode::FAILURE
        }
        Ok(()) => {
            debug!("> [main] end");
            ExitCode::SUCCESS
        }
    }
}
