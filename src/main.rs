//! niimbot - Command-line driver for NIIMBOT label printers
//!
//! Talks to a printer over a bound RFCOMM device and runs one command per
//! invocation.

mod commands;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use niimbot_client::{Printer, PrinterConfig, DEFAULT_DEVICE};
use niimbot_protocol::{InfoKey, Threshold};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "niimbot")]
#[command(about = "Print labels on NIIMBOT thermal printers")]
#[command(version)]
struct Cli {
    /// RFCOMM device bound to the printer
    #[arg(short, long, env = "NIIMBOT_DEVICE", default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// YAML configuration file
    #[arg(short, long, env = "NIIMBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Response timeout in milliseconds (overrides the config file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read device properties (all of them when no key is given)
    Info {
        /// Keys such as battery, soft-version, device-serial
        keys: Vec<InfoKey>,
    },

    /// Read the RFID tag of the loaded label roll
    Rfid,

    /// Query lid, battery and paper state
    Heartbeat,

    /// Query print progress
    Status,

    /// Print a PNG image
    Print {
        /// Image file
        image: PathBuf,

        /// Print darkness (1-5)
        #[arg(short, long, default_value = "3")]
        density: u8,

        /// Label type (1-3)
        #[arg(short, long, default_value = "1")]
        label_type: u8,

        /// Number of copies
        #[arg(short, long, default_value = "1")]
        quantity: u32,

        #[command(flatten)]
        raster: RasterArgs,
    },

    /// Render a PNG the way it would be printed, without a printer
    Preview {
        /// Image file
        image: PathBuf,

        /// Output PNG
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        raster: RasterArgs,
    },
}

/// Options controlling how an image becomes printed dots.
#[derive(Args)]
pub struct RasterArgs {
    /// Rotate 90 degrees clockwise
    #[arg(long)]
    rotate: bool,

    /// Swap printed and blank pixels
    #[arg(long)]
    invert: bool,

    /// Pixel rule: alpha or luminance
    #[arg(long, default_value = "alpha")]
    threshold: Threshold,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Preview runs locally (no printer needed)
    if let Commands::Preview { image, out, raster } = &cli.command {
        match commands::preview(image, out, raster) {
            Ok(output) => {
                println!("{}", output);
                return Ok(());
            }
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    }

    let mut config = match PrinterConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(ms) = cli.timeout_ms {
        config = config.with_response_timeout(Duration::from_millis(ms));
        if let Err(e) = config.validate() {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    let printer = match Printer::open(&cli.device, config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!(
                "{} to {}: {}",
                "Connection failed".red(),
                cli.device.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let result = commands::execute(&printer, cli.command).await;
    printer.cleanup().await;

    // The link reader may still be parked in a blocking read, so exit
    // instead of waiting for the runtime to wind down.
    match result {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
