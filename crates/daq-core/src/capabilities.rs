//! Atomic Hardware Capabilities
//!
//! Fine-grained capability traits that bench devices implement. Instead of a
//! monolithic `Instrument` trait, each device implements the pieces it
//! actually supports:
//!
//! - The Atik filter wheel implements `FilterSelect`
//! - The Cornerstone monochromator implements
//!   `WavelengthTunable + ShutterControl + FilterSelect + GratingSelect`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn park<F: FilterSelect + ?Sized>(wheel: &F) -> Result<()> {
//!     wheel.select_slot(0).await?;
//!     wheel.wait_settled().await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Device category for grouping in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Filter wheels and filter changers
    FilterWheel,
    /// Monochromators and spectrographs
    Monochromator,
    /// Anything else
    Other,
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Capability: Wavelength Tuning
///
/// Devices with tunable wavelength output (monochromators, tunable sources).
///
/// # Contract
/// - Wavelength is in nanometers (nm)
/// - `set_wavelength()` may block while the grating drives
/// - Implementation should validate wavelength is within device range
#[async_trait]
pub trait WavelengthTunable: Send + Sync {
    /// Set output wavelength
    ///
    /// # Arguments
    /// * `wavelength_nm` - Target wavelength in nanometers
    ///
    /// # Returns
    /// - Ok(()) if wavelength set successfully
    /// - Err if value is out of hardware range or tuning failed
    async fn set_wavelength(&self, wavelength_nm: f64) -> Result<()>;

    /// Get current wavelength setting in nanometers
    async fn get_wavelength(&self) -> Result<f64>;

    /// Get wavelength tuning range as (min_nm, max_nm)
    ///
    /// # Default Implementation
    /// Returns a typical visible/NIR grating range. Override for specific devices.
    fn wavelength_range(&self) -> (f64, f64) {
        (200.0, 1600.0)
    }
}

/// Capability: Shutter Control
///
/// Devices with a controllable beam shutter.
///
/// # Contract
/// - `open_shutter()` allows light to pass
/// - `close_shutter()` blocks light
/// - Shutter state should be queryable
#[async_trait]
pub trait ShutterControl: Send + Sync {
    /// Open the shutter (allow light to pass)
    async fn open_shutter(&self) -> Result<()>;

    /// Close the shutter (block light)
    async fn close_shutter(&self) -> Result<()>;

    /// Query shutter state
    ///
    /// # Returns
    /// - Ok(true) if shutter is open
    /// - Ok(false) if shutter is closed
    /// - Err if state cannot be determined
    async fn is_shutter_open(&self) -> Result<bool>;
}

/// Capability: Filter Selection
///
/// Devices that place one of a fixed set of filters in the beam
/// (stand-alone filter wheels, filter changers built into monochromators).
///
/// # Contract
/// - Slots are in the device's own numbering. Atik wheels count from 0,
///   Cornerstone filter wheels count from 1.
/// - `select_slot` may return before the wheel has stopped; call
///   `wait_settled` when the next step needs the filter in place.
#[async_trait]
pub trait FilterSelect: Send + Sync {
    /// Number of filter slots on the wheel
    async fn slot_count(&self) -> Result<usize>;

    /// Currently selected slot
    async fn slot(&self) -> Result<usize>;

    /// Move to a slot
    ///
    /// # Returns
    /// - Ok(()) if the move was accepted
    /// - Err if the slot is out of range or the device refused
    async fn select_slot(&self, slot: usize) -> Result<()>;

    /// Whether the wheel is still moving
    ///
    /// # Default Implementation
    /// Devices that block until the move completes report `false`.
    async fn is_moving(&self) -> Result<bool> {
        Ok(false)
    }

    /// Wait until the wheel reports it has stopped
    ///
    /// # Default Implementation
    /// No-op for devices whose `select_slot` already blocks.
    async fn wait_settled(&self) -> Result<()> {
        Ok(())
    }
}

/// Capability: Grating Selection
///
/// Spectrographs and monochromators with a grating turret.
#[async_trait]
pub trait GratingSelect: Send + Sync {
    /// Number of gratings on the turret
    fn grating_count(&self) -> usize;

    /// Currently selected grating (1-based)
    async fn grating(&self) -> Result<usize>;

    /// Rotate the turret to a grating (1-based)
    async fn select_grating(&self, grating: usize) -> Result<()>;
}
