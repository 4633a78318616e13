//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`] and are registered with the
//! [`DeviceRegistry`] at startup via explicit `registry.register_factory(factory)`
//! calls in the binary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Composition Root (oselots main.rs)             │
//! │  registry.register_factory(Box::new(AtikEfwFactory));          │
//! │  registry.register_factory(Box::new(CornerstoneFactory));      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DeviceRegistry                           │
//! │  factories: HashMap<driver_type, Box<dyn DriverFactory>>       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    DriverFactory::build()                       │
//! │  Parses TOML config, instantiates driver, returns capabilities │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! pub struct AtikEfwFactory;
//!
//! impl DriverFactory for AtikEfwFactory {
//!     fn driver_type(&self) -> &'static str { "atik_efw" }
//!     fn name(&self) -> &'static str { "Atik EFW Filter Wheel" }
//!     fn capabilities(&self) -> &'static [Capability] { &[Capability::FilterSelect] }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let _: AtikEfwConfig = config.clone().try_into()?;
//!         Ok(())
//!     }
//!
//!     fn build(&self, config: toml::Value) -> BoxFuture<'static, anyhow::Result<DeviceComponents>> {
//!         Box::pin(async move {
//!             let wheel = Arc::new(AtikFilterWheel::from_config(config.try_into()?).await?);
//!             Ok(DeviceComponents::new().with_filter_select(wheel))
//!         })
//!     }
//! }
//! ```

use crate::capabilities::{
    DeviceCategory, FilterSelect, GratingSelect, ShutterControl, WavelengthTunable,
};
use crate::config::DeviceConfig;
use crate::error::{DriverError, DriverErrorKind};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Capability Enum
// =============================================================================

/// Capabilities a driver can expose.
///
/// ```rust
/// use daq_core::driver::Capability;
///
/// let caps = [Capability::FilterSelect];
/// assert!(caps.contains(&Capability::FilterSelect));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Corresponds to [`crate::capabilities::WavelengthTunable`]
    WavelengthTunable,

    /// Corresponds to [`crate::capabilities::ShutterControl`]
    ShutterControl,

    /// Corresponds to [`crate::capabilities::FilterSelect`]
    FilterSelect,

    /// Corresponds to [`crate::capabilities::GratingSelect`]
    GratingSelect,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::WavelengthTunable => "Wavelength Tunable",
            Self::ShutterControl => "Shutter Control",
            Self::FilterSelect => "Filter Select",
            Self::GratingSelect => "Grating Select",
        }
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Container for capability trait objects returned by drivers.
///
/// ```rust,ignore
/// let driver = Arc::new(CornerstoneDriver::open(&cfg).await?);
///
/// let components = DeviceComponents::new()
///     .with_wavelength_tunable(driver.clone())
///     .with_shutter_control(driver.clone())
///     .with_filter_select(driver);
/// ```
#[derive(Default)]
pub struct DeviceComponents {
    /// Device category for listings
    pub category: Option<DeviceCategory>,

    /// WavelengthTunable implementation
    pub wavelength_tunable: Option<Arc<dyn WavelengthTunable>>,

    /// ShutterControl implementation
    pub shutter_control: Option<Arc<dyn ShutterControl>>,

    /// FilterSelect implementation
    pub filter_select: Option<Arc<dyn FilterSelect>>,

    /// GratingSelect implementation
    pub grating_select: Option<Arc<dyn GratingSelect>>,

    /// Capability-specific metadata
    pub metadata: DeviceMetadata,
}

impl DeviceComponents {
    /// Create a new empty DeviceComponents
    pub fn new() -> Self {
        Self::default()
    }

    /// Get list of capabilities this device supports
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();

        if self.wavelength_tunable.is_some() {
            caps.push(Capability::WavelengthTunable);
        }
        if self.shutter_control.is_some() {
            caps.push(Capability::ShutterControl);
        }
        if self.filter_select.is_some() {
            caps.push(Capability::FilterSelect);
        }
        if self.grating_select.is_some() {
            caps.push(Capability::GratingSelect);
        }

        caps
    }

    // Builder methods

    /// Set device category
    pub fn with_category(mut self, category: DeviceCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set WavelengthTunable implementation
    pub fn with_wavelength_tunable(mut self, w: Arc<dyn WavelengthTunable>) -> Self {
        self.wavelength_tunable = Some(w);
        self
    }

    /// Set ShutterControl implementation
    pub fn with_shutter_control(mut self, s: Arc<dyn ShutterControl>) -> Self {
        self.shutter_control = Some(s);
        self
    }

    /// Set FilterSelect implementation
    pub fn with_filter_select(mut self, f: Arc<dyn FilterSelect>) -> Self {
        self.filter_select = Some(f);
        self
    }

    /// Set GratingSelect implementation
    pub fn with_grating_select(mut self, g: Arc<dyn GratingSelect>) -> Self {
        self.grating_select = Some(g);
        self
    }

    /// Set device metadata
    pub fn with_metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// =============================================================================
// Device Metadata
// =============================================================================

/// Descriptive information a driver reports after connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// Vendor model string (e.g. "EFW2", "Cornerstone 130")
    pub model: Option<String>,

    /// Vendor serial number
    pub serial_number: Option<String>,

    /// Free-form identification reply from the device
    pub identification: Option<String>,
}

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Factory for building a driver from its TOML settings table.
///
/// # Error Handling
///
/// Both `validate()` and `build()` return `Result`. Validation errors should be
/// descriptive and actionable. Build errors include hardware connection failures.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in TOML config `type` field.
    ///
    /// ```toml
    /// [[devices]]
    /// id = "wheel"
    /// type = "atik_efw"  # matches driver_type() returning "atik_efw"
    /// ```
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for listings and error messages.
    fn name(&self) -> &'static str;

    /// List of capabilities this driver type provides.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without touching hardware.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Async instantiation of the driver.
    ///
    /// Parses the configuration, opens the hardware connection and returns
    /// the capabilities the driver implements.
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}

// =============================================================================
// Device Registry
// =============================================================================

/// Lookup table from `driver_type` to factory.
#[derive(Default)]
pub struct DeviceRegistry {
    factories: HashMap<&'static str, Box<dyn DriverFactory>>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its `driver_type`.
    ///
    /// Registering two factories with the same type is a configuration error.
    pub fn register_factory(&mut self, factory: Box<dyn DriverFactory>) -> Result<(), DriverError> {
        let driver_type = factory.driver_type();
        if self.factories.contains_key(driver_type) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Configuration,
                "factory already registered",
            ));
        }
        tracing::debug!(driver_type, name = factory.name(), "Registered driver factory");
        self.factories.insert(driver_type, factory);
        Ok(())
    }

    /// Look up a factory by `driver_type`
    pub fn factory(&self, driver_type: &str) -> Option<&dyn DriverFactory> {
        self.factories.get(driver_type).map(|f| f.as_ref())
    }

    /// Registered `(driver_type, name)` pairs, sorted by type.
    pub fn list_factories(&self) -> Vec<(&'static str, &'static str)> {
        let mut list: Vec<_> = self
            .factories
            .values()
            .map(|f| (f.driver_type(), f.name()))
            .collect();
        list.sort_unstable();
        list
    }

    fn factory_for(&self, device: &DeviceConfig) -> Result<&dyn DriverFactory, DriverError> {
        self.factory(&device.type_name).ok_or_else(|| {
            DriverError::new(
                device.type_name.clone(),
                DriverErrorKind::Configuration,
                format!("no driver registered for device '{}'", device.id),
            )
        })
    }

    /// Validate a device entry against its factory.
    pub fn validate(&self, device: &DeviceConfig) -> Result<()> {
        let factory = self.factory_for(device)?;
        factory.validate(&device.settings).map_err(|e| {
            DriverError::new(
                factory.driver_type(),
                DriverErrorKind::Configuration,
                format!("device '{}': {:#}", device.id, e),
            )
            .into()
        })
    }

    /// Validate and build a device entry.
    pub async fn build(&self, device: &DeviceConfig) -> Result<DeviceComponents> {
        self.validate(device)?;
        let factory = self.factory_for(device)?;
        tracing::info!(
            device = %device.id,
            driver_type = factory.driver_type(),
            "Building device"
        );
        factory.build(device.settings.clone()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::capabilities::FilterSelect;
    use async_trait::async_trait;

    struct FixedWheel;

    #[async_trait]
    impl FilterSelect for FixedWheel {
        async fn slot_count(&self) -> Result<usize> {
            Ok(5)
        }
        async fn slot(&self) -> Result<usize> {
            Ok(2)
        }
        async fn select_slot(&self, _slot: usize) -> Result<()> {
            Ok(())
        }
    }

    struct FixedWheelFactory;

    impl DriverFactory for FixedWheelFactory {
        fn driver_type(&self) -> &'static str {
            "fixed_wheel"
        }

        fn name(&self) -> &'static str {
            "Fixed Wheel"
        }

        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::FilterSelect]
        }

        fn validate(&self, config: &toml::Value) -> Result<()> {
            if config.get("slots").is_some() {
                anyhow::bail!("slots is not configurable");
            }
            Ok(())
        }

        fn build(&self, _config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
            Box::pin(async move {
                Ok(DeviceComponents::new()
                    .with_category(DeviceCategory::FilterWheel)
                    .with_filter_select(Arc::new(FixedWheel)))
            })
        }
    }

    fn device(type_name: &str, settings: toml::Value) -> DeviceConfig {
        DeviceConfig {
            id: "wheel".into(),
            type_name: type_name.into(),
            settings,
        }
    }

    #[test]
    fn test_capability_name() {
        assert_eq!(Capability::FilterSelect.name(), "Filter Select");
        assert_eq!(Capability::WavelengthTunable.name(), "Wavelength Tunable");
    }

    #[test]
    fn test_device_components_capabilities() {
        let empty = DeviceComponents::new();
        assert!(empty.capabilities().is_empty());

        let wheel = DeviceComponents::new().with_filter_select(Arc::new(FixedWheel));
        assert_eq!(wheel.capabilities(), vec![Capability::FilterSelect]);
    }

    #[test]
    fn test_capability_serde() {
        let json = serde_json::to_string(&Capability::GratingSelect).unwrap();
        assert_eq!(json, "\"grating_select\"");

        let cap: Capability = serde_json::from_str("\"shutter_control\"").unwrap();
        assert_eq!(cap, Capability::ShutterControl);
    }

    #[test]
    fn duplicate_factory_rejected() {
        let mut registry = DeviceRegistry::new();
        registry.register_factory(Box::new(FixedWheelFactory)).unwrap();
        let err = registry
            .register_factory(Box::new(FixedWheelFactory))
            .unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Configuration);
        assert_eq!(registry.list_factories(), vec![("fixed_wheel", "Fixed Wheel")]);
    }

    #[tokio::test]
    async fn registry_builds_registered_type() {
        let mut registry = DeviceRegistry::new();
        registry.register_factory(Box::new(FixedWheelFactory)).unwrap();

        let components = registry
            .build(&device("fixed_wheel", toml::Value::Table(Default::default())))
            .await
            .unwrap();
        assert_eq!(components.category, Some(DeviceCategory::FilterWheel));
        let wheel = components.filter_select.unwrap();
        assert_eq!(wheel.slot().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_type_and_bad_settings() {
        let mut registry = DeviceRegistry::new();
        registry.register_factory(Box::new(FixedWheelFactory)).unwrap();

        let unknown = registry
            .build(&device("laser", toml::Value::Table(Default::default())))
            .await;
        assert!(unknown.is_err());

        let bad = registry.validate(&device(
            "fixed_wheel",
            toml::Value::Table(toml::toml! { slots = 7 }),
        ));
        let msg = format!("{:#}", bad.unwrap_err());
        assert!(msg.contains("slots is not configurable"), "{msg}");
    }
}
