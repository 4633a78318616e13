//! Driver registry and device entry lookup.

use anyhow::{bail, Result};
use daq_core::config::{DeviceConfig, LabConfig};
use daq_core::driver::DeviceRegistry;
use daq_driver_atik::AtikEfwFactory;
use daq_driver_newport::CornerstoneFactory;

/// Registry holding every driver this binary ships.
pub fn registry() -> Result<DeviceRegistry> {
    daq_driver_atik::link();
    daq_driver_newport::link();

    let mut registry = DeviceRegistry::new();
    registry.register_factory(Box::new(AtikEfwFactory))?;
    registry.register_factory(Box::new(CornerstoneFactory))?;
    Ok(registry)
}

/// Device entry of `type_name` to use.
///
/// `id` selects a configured entry by name; without it the first entry of
/// the type is used, or an empty one called `fallback_id`.
pub fn resolve(
    config: &LabConfig,
    type_name: &str,
    id: Option<&str>,
    fallback_id: &str,
) -> Result<DeviceConfig> {
    if let Some(id) = id {
        let Some(device) = config.device(id) else {
            bail!("No device '{}' in configuration", id);
        };
        if device.type_name != type_name {
            bail!(
                "Device '{}' is a '{}', expected '{}'",
                id,
                device.type_name,
                type_name
            );
        }
        return Ok(device.clone());
    }

    Ok(config
        .first_of_type(type_name)
        .cloned()
        .unwrap_or_else(|| DeviceConfig {
            id: fallback_id.to_string(),
            type_name: type_name.to_string(),
            settings: toml::Value::Table(toml::Table::new()),
        }))
}

/// Replace settings of `device` with command-line values.
pub fn with_overrides(
    mut device: DeviceConfig,
    overrides: impl IntoIterator<Item = (&'static str, toml::Value)>,
) -> DeviceConfig {
    let mut table = match device.settings {
        toml::Value::Table(table) => table,
        _ => toml::Table::new(),
    };
    for (key, value) in overrides {
        tracing::debug!(device = %device.id, key, value = %value, "Command-line override");
        table.insert(key.to_string(), value);
    }
    device.settings = toml::Value::Table(table);
    device
}

/// Print drivers and the validation status of each configured device.
pub fn show(config: &LabConfig, registry: &DeviceRegistry) -> Result<()> {
    println!("Drivers:");
    for (driver_type, name) in registry.list_factories() {
        println!("  {:<12} {}", driver_type, name);
    }

    println!("Devices:");
    if config.devices.is_empty() {
        println!("  (none configured)");
    }
    for device in &config.devices {
        match registry.validate(device) {
            Ok(()) => println!("  {:<12} {} ok", device.id, device.type_name),
            Err(e) => println!("  {:<12} {} invalid: {:#}", device.id, device.type_name, e),
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [[devices]]
        id = "wheel"
        type = "atik_efw"
        index = 2

        [[devices]]
        id = "mono"
        type = "cornerstone"
        port = "/dev/ttyS0"
    "#;

    #[test]
    fn registry_has_both_drivers() {
        let registry = registry().unwrap();
        assert_eq!(
            registry.list_factories(),
            vec![
                ("atik_efw", "Atik EFW Filter Wheel"),
                ("cornerstone", "Newport Cornerstone Monochromator"),
            ]
        );
    }

    #[test]
    fn resolve_by_type_and_id() {
        let config = LabConfig::from_toml_str(CONFIG).unwrap();
        let wheel = resolve(&config, "atik_efw", None, "filter_wheel").unwrap();
        assert_eq!(wheel.id, "wheel");

        let mono = resolve(&config, "cornerstone", Some("mono"), "mono").unwrap();
        assert_eq!(mono.settings.get("port").unwrap().as_str(), Some("/dev/ttyS0"));

        assert!(resolve(&config, "atik_efw", Some("mono"), "x").is_err());
        assert!(resolve(&config, "atik_efw", Some("missing"), "x").is_err());
    }

    #[test]
    fn missing_entry_falls_back_to_empty_settings() {
        let config = LabConfig::default();
        let device = resolve(&config, "cornerstone", None, "mono").unwrap();
        assert_eq!(device.id, "mono");
        assert!(device.settings.as_table().unwrap().is_empty());
    }

    #[test]
    fn overrides_replace_config_values() {
        let config = LabConfig::from_toml_str(CONFIG).unwrap();
        let device = resolve(&config, "atik_efw", None, "filter_wheel").unwrap();
        let device = with_overrides(
            device,
            [("index", toml::Value::Integer(0)), ("mock", toml::Value::Boolean(true))],
        );
        assert_eq!(device.settings.get("index").unwrap().as_integer(), Some(0));
        assert_eq!(device.settings.get("mock").unwrap().as_bool(), Some(true));
        #[cfg(feature = "mock")]
        registry().unwrap().validate(&device).unwrap();
    }
}
