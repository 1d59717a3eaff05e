//! CLI Entry Point for the K10CR1 driver
//!
//! # Usage
//!
//! ```bash
//! k10cr1 ports
//! k10cr1 --port 55000231 home
//! k10cr1 --port /dev/ttyUSB0 move-abs -45 --wait
//! k10cr1 --config lab.toml position
//! k10cr1 encode -- -1 --width 4
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k10cr1::config::{StageConfig, DEFAULT_CONFIG_PATH};
use k10cr1::hardware::capabilities::{move_and_settle, Movable};
use k10cr1::{codec, logging, K10cr1Driver};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "k10cr1")]
#[command(about = "Control a Thorlabs K10CR1 rotation stage", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port path or USB serial number (overrides the config file)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Log level (overrides the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and their USB serial numbers
    Ports,
    /// Flash the stage's front-panel LED
    Identify,
    /// Home the stage
    Home,
    /// Rotate relative to the current position
    MoveRel {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        /// Wait for the move-completed message
        #[arg(long)]
        wait: bool,
    },
    /// Rotate to an absolute angle
    MoveAbs {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        /// Wait for the move-completed message
        #[arg(long)]
        wait: bool,
    },
    /// Jog one step
    Jog,
    /// Print the current angle
    Position,
    /// Show the little-endian two's-complement encoding of an integer
    Encode {
        #[arg(allow_negative_numbers = true)]
        value: i128,
        #[arg(long, default_value_t = 4)]
        width: usize,
    },
    /// Decode little-endian two's-complement hex
    Decode { hex: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = StageConfig::load_from(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(port) = cli.port {
        config.device.port = port;
    }
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Encode { value, width } => {
            println!("{}", codec::encode_hex(value, width)?);
            Ok(())
        }
        Commands::Decode { hex } => {
            println!("{}", codec::decode_hex(&hex)?);
            Ok(())
        }
        Commands::Ports => list_ports(),
        command => {
            config.validate()?;
            let driver = K10cr1Driver::new(config.device.clone());
            driver
                .connect()
                .await
                .with_context(|| format!("Failed to open stage on '{}'", config.device.port))?;

            let result = run(&driver, command).await;
            driver.disconnect().await?;
            result
        }
    }
}

async fn run(driver: &K10cr1Driver, command: Commands) -> Result<()> {
    match command {
        Commands::Identify => driver.identify().await?,
        Commands::Home => {
            driver.home().await?;
            info!("Stage homed");
        }
        Commands::MoveRel { degrees, wait } => {
            driver.move_rel(degrees).await?;
            if wait {
                driver.wait_settled().await?;
            }
        }
        Commands::MoveAbs { degrees, wait } => {
            if wait {
                move_and_settle(driver, degrees).await?;
            } else {
                driver.move_abs(degrees).await?;
            }
        }
        Commands::Jog => {
            driver.jog().await?;
        }
        Commands::Position => println!("{:.3}", driver.get_position().await?),
        Commands::Ports | Commands::Encode { .. } | Commands::Decode { .. } => {
            anyhow::bail!("command does not use a stage connection")
        }
    }
    Ok(())
}

#[cfg(feature = "serial")]
fn list_ports() -> Result<()> {
    let ports = k10cr1::hardware::serial::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports detected.");
    }
    for port in ports {
        println!(
            "{}\t{}\t{}",
            port.name,
            port.serial_number.as_deref().unwrap_or("-"),
            port.product.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_ports() -> Result<()> {
    Err(k10cr1::StageError::SerialFeatureDisabled.into())
}
