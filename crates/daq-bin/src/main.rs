//! `oselots` command-line entry point.
//!
//! Drives the bench hardware of the OSELOTS sky spectrograph:
//! - the Atik EFW filter wheel (`filter-wheel`)
//! - the Cornerstone monochromator (`mono`)
//! - conversion of raw PIXIS dumps to FITS (`pixis-to-fits`)
//!
//! Device settings come from `oselots.toml` (or `--config`) and
//! `OSELOTS_*` environment variables; command-line flags override them.
//!
//! ```bash
//! oselots filter-wheel --mock position --filter 3
//! oselots mono --port /dev/ttyUSB1 wavelength 650
//! oselots pixis-to-fits dark.raw dark_001 dark.txt /data/raw /data/fits \
//!     DARK 30000 1 1 0 12.5 22:10:00 22:10:30
//! ```

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod devices;
mod filter_wheel;
mod mono;
mod pixis;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use daq_core::config::{LabConfig, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oselots")]
#[command(about = "OSELOTS bench instrument control", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Atik EFW filter wheel
    FilterWheel(filter_wheel::FilterWheelArgs),

    /// Cornerstone monochromator
    Mono(mono::MonoArgs),

    /// Convert a raw PIXIS dump to FITS
    PixisToFits(pixis::PixisArgs),

    /// Show registered drivers and configured devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = LabConfig::load_from(&cli.config)?;
    init_logging(&config.log_level, cli.verbose);

    let registry = devices::registry()?;

    match cli.command {
        Commands::FilterWheel(args) => filter_wheel::run(args, &config, &registry).await,
        Commands::Mono(args) => mono::run(args, &config, &registry).await,
        Commands::PixisToFits(args) => pixis::run(args, &config).await,
        Commands::Devices => devices::show(&config, &registry),
    }
}

/// Configured level, raised by `-v`; `RUST_LOG` wins when set.
fn init_logging(configured: &str, verbose: u8) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
