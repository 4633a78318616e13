//! Newport hardware drivers.
//!
//! - Cornerstone monochromator (RS-232, `wave?`/`gowave` ASCII protocol)
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_newport::CornerstoneFactory;
//!
//! registry.register_factory(Box::new(CornerstoneFactory))?;
//! ```

pub mod cornerstone;

pub use cornerstone::{
    CornerstoneConfig, CornerstoneDriver, CornerstoneFactory, MonochromatorState,
    OrderSortingPolicy, ShutterState,
};

use anyhow::{Context, Result};

/// A serial port the OS reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path (e.g. "/dev/ttyUSB0")
    pub name: String,
    /// USB vendor/product description, when known
    pub description: Option<String>,
}

/// Enumerate serial ports, USB adapters first.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .context("Failed to enumerate serial ports")?
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => Some(
                    format!(
                        "USB {:04x}:{:04x} {}",
                        usb.vid,
                        usb.pid,
                        usb.product.unwrap_or_default()
                    )
                    .trim_end()
                    .to_string(),
                ),
                _ => None,
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect();
    ports.sort_by(|a, b| {
        b.description
            .is_some()
            .cmp(&a.description.is_some())
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(ports)
}

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are
/// linked into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<CornerstoneFactory>());
}
