use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hatbot_runtime::Robot;
use hatbot_runtime::config::{CMD_TIMEOUT_MS, MOTOR_PORT, RobotConfig};
use hatbot_runtime::motor::{MotorDriver, MotorHat, NullDriver};
use hatbot_runtime::runtime::{self, DynSensor, Runtime};
use hatbot_runtime::sensor::SerialRangefinder;

/// Drive a four-motor HAT robot from zenoh commands
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON robot config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the motor HAT bridge
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Serial port of the rangefinder (enables navigation)
    #[arg(long)]
    rangefinder: Option<String>,

    /// HAT bus address, e.g. 0x60
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,

    #[arg(long, allow_hyphen_values = true)]
    left_trim: Option<i32>,

    #[arg(long, allow_hyphen_values = true)]
    right_trim: Option<i32>,

    /// Leave motors running when the process exits
    #[arg(long)]
    no_stop_on_exit: bool,

    /// Stop an untimed maneuver after this long without any new command.
    /// Clients must keep re-sending it (teleop does, at 50 Hz); scripted
    /// clients should send timed maneuvers or pass 0 to disable
    #[arg(long, default_value_t = CMD_TIMEOUT_MS)]
    watchdog_ms: u64,

    /// Log motor commands instead of opening the HAT
    #[arg(long)]
    dry_run: bool,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid bus address {:?}: {}", s, e))
}

impl Args {
    fn robot_config(&self) -> Result<RobotConfig, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = match &self.config {
            Some(path) => RobotConfig::from_json_file(path)?,
            None => RobotConfig::default(),
        };
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(trim) = self.left_trim {
            config.left_trim = trim;
        }
        if let Some(trim) = self.right_trim {
            config.right_trim = trim;
        }
        if self.no_stop_on_exit {
            config.stop_on_exit = false;
        }
        config.validate()?;
        Ok(config)
    }
}

async fn start(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = args.robot_config()?;

    let driver: Box<dyn MotorDriver> = if args.dry_run {
        info!("Dry run: motor commands are only logged");
        Box::new(NullDriver)
    } else {
        info!("Opening motor HAT 0x{:02X} on {}", config.address, args.port);
        Box::new(MotorHat::connect(&args.port, config.address)?)
    };
    let robot = Robot::new(driver, config)?;

    let sensor = match &args.rangefinder {
        Some(port) => {
            info!("Opening rangefinder on {}", port);
            Some(Box::new(SerialRangefinder::open(port)?) as DynSensor)
        }
        None => None,
    };

    let watchdog = (args.watchdog_ms > 0).then(|| Duration::from_millis(args.watchdog_ms));
    runtime::run(Runtime::new(robot, sensor, watchdog)).await
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = start(Args::parse()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
