//! `oselots filter-wheel ...`

use crate::devices;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use daq_core::capabilities::FilterSelect;
use daq_core::config::{DeviceConfig, LabConfig};
use daq_core::driver::DeviceRegistry;
use daq_driver_atik::{AtikEfwConfig, AtikFilterWheel};

#[derive(Args)]
pub struct FilterWheelArgs {
    /// Configured device id (default: first `atik_efw` entry)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Device index on the USB bus
    #[arg(long, global = true, conflicts_with = "serial")]
    index: Option<i32>,

    /// Select the wheel by serial number
    #[arg(long, global = true)]
    serial: Option<u32>,

    /// Use the simulated SDK
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    action: WheelAction,
}

#[derive(Subcommand)]
enum WheelAction {
    /// Move to a filter position
    Position {
        /// Target position, counted from 0
        #[arg(long)]
        filter: usize,
    },
    /// Print the current position
    GetPosition,
    /// List wheels present on the bus
    List,
    /// Print type, serial number and slot count
    Details,
}

impl FilterWheelArgs {
    fn device(&self, config: &LabConfig) -> Result<DeviceConfig> {
        let device = devices::resolve(config, "atik_efw", self.device.as_deref(), "filter_wheel")?;
        let mut overrides = Vec::new();
        if let Some(index) = self.index {
            overrides.push(("index", toml::Value::Integer(index.into())));
        }
        if let Some(serial) = self.serial {
            overrides.push(("serial", toml::Value::Integer(serial.into())));
        }
        if self.mock {
            overrides.push(("mock", toml::Value::Boolean(true)));
        }
        Ok(devices::with_overrides(device, overrides))
    }
}

pub async fn run(args: FilterWheelArgs, config: &LabConfig, registry: &DeviceRegistry) -> Result<()> {
    let device = args.device(config)?;
    registry.validate(&device)?;

    match args.action {
        WheelAction::Position { filter } => {
            let wheel = registry
                .build(&device)
                .await?
                .filter_select
                .context("atik_efw device has no filter selection")?;
            let count = wheel.slot_count().await?;
            // Upper bound is inclusive here; the driver rejects `count` itself
            if filter > count {
                bail!(
                    "Filter position {} exceeds the {} filters on the wheel",
                    filter,
                    count
                );
            }
            wheel.select_slot(filter).await?;
            wheel.wait_settled().await?;
            println!("Filter wheel at position {}", wheel.slot().await?);
        }
        WheelAction::GetPosition => {
            let wheel = registry
                .build(&device)
                .await?
                .filter_select
                .context("atik_efw device has no filter selection")?;
            println!("{}", wheel.slot().await?);
        }
        WheelAction::List => {
            let cfg = typed(&device)?;
            let sdk = cfg.sdk()?;
            let reported = AtikFilterWheel::available_devices(sdk.as_ref());
            let found = AtikFilterWheel::available_filter_wheels(sdk.as_ref());
            tracing::debug!(reported, found = found.len(), "Enumerated filter wheels");
            if found.is_empty() {
                println!("No filter wheels found");
            }
            for index in found {
                match AtikFilterWheel::device_details(sdk.as_ref(), index) {
                    Ok(details) => println!(
                        "{}: {} serial {}",
                        index, details.efw_type, details.serial_number
                    ),
                    Err(e) => println!("{}: details unavailable ({})", index, e),
                }
            }
        }
        WheelAction::Details => {
            let wheel = typed(&device)?.open().await?;
            let details = wheel.details()?;
            println!("Index:    {}", wheel.device_index().unwrap_or_default());
            println!("Type:     {}", details.efw_type);
            println!("Serial:   {}", details.serial_number);
            println!("Filters:  {}", wheel.number_of_filters()?);
            println!("Position: {}", wheel.position()?);
            wheel.disconnect()?;
        }
    }
    Ok(())
}

fn typed(device: &DeviceConfig) -> Result<AtikEfwConfig> {
    device
        .settings
        .clone()
        .try_into()
        .with_context(|| format!("Invalid settings for device '{}'", device.id))
}
