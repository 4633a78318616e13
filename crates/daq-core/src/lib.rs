//! `daq-core`
//!
//! Shared building blocks for the OSELOTS bench tools: capability traits the
//! drivers implement, the driver factory registry, layered configuration and
//! the common error type.
//!
//! ## Modules
//!
//! - [`capabilities`]: `FilterSelect`, `WavelengthTunable`, `ShutterControl`, `GratingSelect`
//! - [`driver`]: `DriverFactory`, `DeviceComponents`, `DeviceRegistry`
//! - [`config`]: figment-backed `LabConfig`
//! - [`error`]: `DaqError`, `DriverError`
//! - `serial` (feature `serial`): async serial port helpers

pub mod capabilities;
pub mod config;
pub mod driver;
pub mod error;

#[cfg(feature = "serial")]
pub mod serial;

pub use anyhow::{anyhow, Result};
pub use capabilities::{DeviceCategory, FilterSelect, GratingSelect, ShutterControl, WavelengthTunable};
pub use config::{DeviceConfig, LabConfig, StorageSettings};
pub use driver::{Capability, DeviceComponents, DeviceRegistry, DriverFactory};
pub use error::{AppResult, DaqError, DriverError, DriverErrorKind};
