//! `oselots mono ...`

use crate::devices;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use daq_core::capabilities::{FilterSelect, GratingSelect, ShutterControl, WavelengthTunable};
use daq_core::config::{DeviceConfig, LabConfig};
use daq_core::driver::DeviceRegistry;
use daq_driver_newport::{list_ports, CornerstoneConfig, CornerstoneDriver, ShutterState};
use std::time::Duration;

/// Port used when neither the command line nor the config names one.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

#[derive(Args)]
pub struct MonoArgs {
    /// Configured device id (default: first `cornerstone` entry)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Serial port
    #[arg(long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    action: MonoAction,
}

#[derive(Subcommand)]
enum MonoAction {
    /// Go to a wavelength in nm
    Wavelength { nm: f64 },
    /// Select a filter (1-6)
    Filter { filter: u8 },
    /// Select a grating (1-3)
    Grating { grating: u8 },
    /// Open (O) or close (C) the shutter
    Shutter { state: ShutterState },
    /// Print wavelength, grating and shutter
    Get,
    /// Print the identification string
    Info,
    /// Step through a wavelength range
    Scan {
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
        #[arg(long)]
        step: f64,
        /// Seconds at each wavelength
        #[arg(long, default_value_t = 1.0)]
        dwell: f64,
    },
    /// List serial ports
    Ports,
}

impl MonoArgs {
    fn device(&self, config: &LabConfig) -> Result<DeviceConfig> {
        let device = devices::resolve(config, "cornerstone", self.device.as_deref(), "mono")?;
        let port = match (&self.port, device.settings.get("port")) {
            (Some(port), _) => Some(port.clone()),
            (None, None) => Some(DEFAULT_PORT.to_string()),
            (None, Some(_)) => None,
        };
        let overrides = port.map(|p| ("port", toml::Value::String(p)));
        Ok(devices::with_overrides(device, overrides))
    }
}

pub async fn run(args: MonoArgs, config: &LabConfig, registry: &DeviceRegistry) -> Result<()> {
    let device = args.device(config)?;
    registry.validate(&device)?;

    match args.action {
        MonoAction::Wavelength { nm } => {
            let mono = registry.build(&device).await?;
            let tunable = require(&mono.wavelength_tunable, "wavelength tuning")?;
            tunable.set_wavelength(nm).await?;
            println!("Wavelength {} nm", tunable.get_wavelength().await?);
        }
        MonoAction::Filter { filter } => {
            let mono = registry.build(&device).await?;
            let filters = require(&mono.filter_select, "filter selection")?;
            filters.select_slot(usize::from(filter)).await?;
            println!("Filter {}", filters.slot().await?);
        }
        MonoAction::Grating { grating } => {
            let mono = registry.build(&device).await?;
            let gratings = require(&mono.grating_select, "grating selection")?;
            gratings.select_grating(usize::from(grating)).await?;
            println!("Grating {}", gratings.grating().await?);
        }
        MonoAction::Shutter { state } => {
            let mono = registry.build(&device).await?;
            let shutter = require(&mono.shutter_control, "shutter control")?;
            match state {
                ShutterState::Open => shutter.open_shutter().await?,
                ShutterState::Closed => shutter.close_shutter().await?,
            }
            let open = shutter.is_shutter_open().await?;
            println!("Shutter {}", if open { "open" } else { "closed" });
        }
        MonoAction::Get => {
            let driver = open(&device).await?;
            let state = driver.state().await?;
            match state.wavelength_nm {
                Some(nm) => println!("Wavelength: {} nm", nm),
                None => println!("Wavelength: unknown"),
            }
            println!("Grating:    {}", state.grating);
            println!("Shutter:    {}", state.shutter);
            driver.close().await?;
        }
        MonoAction::Info => {
            let driver = open(&device).await?;
            println!("{}", driver.info().await?);
            driver.close().await?;
        }
        MonoAction::Scan {
            start,
            end,
            step,
            dwell,
        } => {
            let dwell = Duration::try_from_secs_f64(dwell)
                .with_context(|| format!("Invalid dwell time {}", dwell))?;
            let driver = open(&device).await?;
            for nm in driver.scan(start, end, step, dwell).await? {
                println!("{}", nm);
            }
            driver.close().await?;
        }
        MonoAction::Ports => print_ports()?,
    }
    Ok(())
}

fn require<'a, T: ?Sized>(capability: &'a Option<std::sync::Arc<T>>, what: &str) -> Result<&'a T> {
    capability
        .as_deref()
        .with_context(|| format!("cornerstone device has no {}", what))
}

async fn open(device: &DeviceConfig) -> Result<CornerstoneDriver> {
    let cfg: CornerstoneConfig = device
        .settings
        .clone()
        .try_into()
        .with_context(|| format!("Invalid settings for device '{}'", device.id))?;
    CornerstoneDriver::open(&cfg).await
}

fn print_ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.description {
            Some(description) => println!("{}  {}", port.name, description),
            None => println!("{}", port.name),
        }
    }
    Ok(())
}
