//! Newport/Oriel Cornerstone Monochromator Driver
//!
//! Protocol Overview:
//! - Format: ASCII commands terminated by CR LF
//! - Baud: 9600, 8N1, no flow control
//! - The firmware echoes every command line before any reply line
//! - Queries: `wave?`, `info?`, `GRAT?`, `SHUTTER?`, `filter?`
//! - Commands: `gowave <nm>`, `GRAT <n>`, `SHUTTER O|C`, `filter <n>`
//!
//! Moving to a wavelength also selects the order-sorting filter: the short
//! filter below the threshold (600 nm by default), the long-pass filter at or
//! above it. The filter command is only sent when the wheel is not already on
//! the right filter.
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_newport::CornerstoneFactory;
//!
//! registry.register_factory(Box::new(CornerstoneFactory))?;
//!
//! let config = toml::toml! {
//!     port = "/dev/ttyUSB0"
//! };
//! let components = factory.build(config.into()).await?;
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use daq_core::capabilities::{
    DeviceCategory, FilterSelect, GratingSelect, ShutterControl, WavelengthTunable,
};
use daq_core::driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
use daq_core::serial::{
    drain_serial_buffer, open_serial_async, wrap_shared, DynSerial, SerialSettings, SharedPort,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::instrument;

/// Gratings on the turret.
pub const GRATING_COUNT: usize = 3;

/// Slots on the attached filter wheel.
pub const FILTER_COUNT: usize = 6;

const WAVELENGTH_RANGE_NM: (f64, f64) = (200.0, 1600.0);

// =============================================================================
// Configuration
// =============================================================================

/// Order-sorting filter selection used by `go_wavelength`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSortingPolicy {
    /// Switch filters automatically
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wavelengths at or above this use the long filter
    #[serde(default = "default_threshold_nm")]
    pub threshold_nm: f64,
    /// Filter below the threshold
    #[serde(default = "default_short_filter")]
    pub short_filter: u8,
    /// Filter at or above the threshold
    #[serde(default = "default_long_filter")]
    pub long_filter: u8,
}

fn default_true() -> bool {
    true
}

fn default_threshold_nm() -> f64 {
    600.0
}

fn default_short_filter() -> u8 {
    1
}

fn default_long_filter() -> u8 {
    2
}

impl Default for OrderSortingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_nm: default_threshold_nm(),
            short_filter: default_short_filter(),
            long_filter: default_long_filter(),
        }
    }
}

impl OrderSortingPolicy {
    /// Filter to use at `wavelength_nm`.
    pub fn filter_for(&self, wavelength_nm: f64) -> u8 {
        if wavelength_nm < self.threshold_nm {
            self.short_filter
        } else {
            self.long_filter
        }
    }
}

/// Configuration for the Cornerstone driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerstoneConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    pub port: String,

    /// Line settings (9600 baud, 2 s timeout unless overridden)
    #[serde(flatten)]
    pub serial: SerialSettings,

    /// Order-sorting filter policy
    #[serde(default)]
    pub order_sorting: OrderSortingPolicy,

    /// Wait after reaching the scan start, in milliseconds
    #[serde(default = "default_scan_settle_ms")]
    pub scan_settle_ms: u64,
}

fn default_scan_settle_ms() -> u64 {
    5000
}

impl CornerstoneConfig {
    /// Default settings for `port`.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            serial: SerialSettings::default(),
            order_sorting: OrderSortingPolicy::default(),
            scan_settle_ms: default_scan_settle_ms(),
        }
    }

    /// Reject settings the hardware cannot honour.
    pub fn check(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            bail!("port must not be empty");
        }
        if self.serial.baud_rate == 0 {
            bail!("baud_rate must be positive");
        }
        let policy = &self.order_sorting;
        for filter in [policy.short_filter, policy.long_filter] {
            check_filter(filter)?;
        }
        if !(WAVELENGTH_RANGE_NM.0..=WAVELENGTH_RANGE_NM.1).contains(&policy.threshold_nm) {
            bail!(
                "order_sorting.threshold_nm {} outside {}-{} nm",
                policy.threshold_nm,
                WAVELENGTH_RANGE_NM.0,
                WAVELENGTH_RANGE_NM.1
            );
        }
        Ok(())
    }
}

fn check_filter(filter: u8) -> Result<()> {
    if !(1..=FILTER_COUNT).contains(&usize::from(filter)) {
        bail!("Filter must be 1-{}, got {}", FILTER_COUNT, filter);
    }
    Ok(())
}

fn check_grating(grating: u8) -> Result<()> {
    if !(1..=GRATING_COUNT).contains(&usize::from(grating)) {
        bail!("Grating must be 1, 2 or 3, got {}", grating);
    }
    Ok(())
}

// =============================================================================
// CornerstoneFactory - DriverFactory implementation
// =============================================================================

/// Factory for creating Cornerstone driver instances.
pub struct CornerstoneFactory;

static CORNERSTONE_CAPABILITIES: &[Capability] = &[
    Capability::WavelengthTunable,
    Capability::ShutterControl,
    Capability::FilterSelect,
    Capability::GratingSelect,
];

impl DriverFactory for CornerstoneFactory {
    fn driver_type(&self) -> &'static str {
        "cornerstone"
    }

    fn name(&self) -> &'static str {
        "Newport Cornerstone Monochromator"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CORNERSTONE_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: CornerstoneConfig = config.clone().try_into()?;
        cfg.check()
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: CornerstoneConfig =
                config.try_into().context("Invalid Cornerstone config")?;
            let driver = Arc::new(CornerstoneDriver::open(&cfg).await?);

            let metadata = DeviceMetadata {
                model: Some("Cornerstone".to_string()),
                serial_number: None,
                identification: driver.info().await.ok(),
            };

            Ok(DeviceComponents::new()
                .with_category(DeviceCategory::Monochromator)
                .with_wavelength_tunable(driver.clone())
                .with_shutter_control(driver.clone())
                .with_filter_select(driver.clone())
                .with_grating_select(driver)
                .with_metadata(metadata))
        })
    }
}

// =============================================================================
// Shutter state and readback
// =============================================================================

/// Position of the output shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutterState {
    /// `O`
    Open,
    /// `C`
    Closed,
}

impl ShutterState {
    /// Letter used on the wire
    pub fn code(self) -> char {
        match self {
            Self::Open => 'O',
            Self::Closed => 'C',
        }
    }
}

impl FromStr for ShutterState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "O" | "OPEN" => Ok(Self::Open),
            "C" | "CLOSED" | "CLOSE" => Ok(Self::Closed),
            other => Err(anyhow!("Shutter state must be O or C, got '{}'", other)),
        }
    }
}

impl fmt::Display for ShutterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot returned by [`CornerstoneDriver::state`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonochromatorState {
    /// Current wavelength, `None` if the reply did not parse
    pub wavelength_nm: Option<f64>,
    /// Selected grating
    pub grating: u8,
    /// Shutter position
    pub shutter: ShutterState,
}

// =============================================================================
// CornerstoneDriver
// =============================================================================

/// Driver for the Cornerstone monochromator.
pub struct CornerstoneDriver {
    port: SharedPort,
    timeout: Duration,
    order_sorting: OrderSortingPolicy,
    scan_settle: Duration,
}

impl CornerstoneDriver {
    /// Open the configured serial port and confirm the monochromator answers.
    ///
    /// # Errors
    /// Returns error if:
    /// - Serial port cannot be opened
    /// - Device doesn't answer the `wave?` probe
    pub async fn open(config: &CornerstoneConfig) -> Result<Self> {
        config.check()?;
        let port = open_serial_async(&config.port, &config.serial, "Cornerstone").await?;
        Self::connect(Box::new(port), config)
            .await
            .with_context(|| format!("Cornerstone on {}", config.port))
    }

    /// Use an already open port and probe it with `wave?`.
    pub async fn connect(port: DynSerial, config: &CornerstoneConfig) -> Result<Self> {
        let driver = Self::with_port(port, config);
        match driver.wavelength().await {
            Ok(nm) => {
                tracing::info!(wavelength_nm = nm, "Cornerstone validated");
                Ok(driver)
            }
            Err(e) => Err(anyhow!(
                "Cornerstone validation failed: no response to wavelength query. Error: {:#}",
                e
            )),
        }
    }

    /// Wrap a port without probing it.
    pub fn with_port(port: DynSerial, config: &CornerstoneConfig) -> Self {
        Self {
            port: wrap_shared(port),
            timeout: config.serial.timeout(),
            order_sorting: config.order_sorting.clone(),
            scan_settle: Duration::from_millis(config.scan_settle_ms),
        }
    }

    /// Identification string (`info?`).
    pub async fn info(&self) -> Result<String> {
        self.query("info?").await
    }

    /// Current wavelength in nm (`wave?`).
    pub async fn wavelength(&self) -> Result<f64> {
        let response = self.query("wave?").await?;
        parse_number(&response).with_context(|| format!("Failed to parse wavelength: '{}'", response))
    }

    /// Move to `wavelength_nm`, switching the order-sorting filter first if needed.
    #[instrument(skip(self), err)]
    pub async fn go_wavelength(&self, wavelength_nm: f64) -> Result<()> {
        if !wavelength_nm.is_finite() || wavelength_nm <= 0.0 {
            bail!("Invalid wavelength {} nm", wavelength_nm);
        }

        if self.order_sorting.enabled {
            let wanted = self.order_sorting.filter_for(wavelength_nm);
            let current = self.filter().await?;
            if current != wanted {
                tracing::debug!(current, wanted, "Switching order-sorting filter");
                self.command(&format!("filter {}", wanted)).await?;
            } else {
                tracing::debug!(filter = current, "Order-sorting filter already in place");
            }
        }

        self.command(&format!("gowave {}", wavelength_nm)).await
    }

    /// Selected grating (first field of the `GRAT?` reply).
    pub async fn grating(&self) -> Result<u8> {
        let response = self.query("GRAT?").await?;
        let first = response
            .split(|c: char| c == ',' || c.is_whitespace())
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        first
            .parse()
            .with_context(|| format!("Failed to parse grating: '{}'", response))
    }

    /// Rotate the turret to grating 1, 2 or 3.
    pub async fn set_grating(&self, grating: u8) -> Result<()> {
        check_grating(grating)?;
        self.command(&format!("GRAT {}", grating)).await
    }

    /// Shutter position (`SHUTTER?`).
    pub async fn shutter(&self) -> Result<ShutterState> {
        self.query("SHUTTER?").await?.parse()
    }

    /// Open or close the shutter.
    pub async fn set_shutter(&self, state: ShutterState) -> Result<()> {
        self.command(&format!("SHUTTER {}", state.code())).await
    }

    /// Current filter slot (`filter?`).
    pub async fn filter(&self) -> Result<u8> {
        let response = self.query("filter?").await?;
        response
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse filter: '{}'", response))
    }

    /// Move the filter wheel to slot 1-6.
    pub async fn set_filter(&self, filter: u8) -> Result<()> {
        check_filter(filter)?;
        self.command(&format!("filter {}", filter)).await
    }

    /// Step from `start_nm` to `end_nm`, holding each wavelength for `dwell`.
    ///
    /// Waits the configured settle delay at the start wavelength. Returns the
    /// wavelengths visited.
    pub async fn scan(
        &self,
        start_nm: f64,
        end_nm: f64,
        step_nm: f64,
        dwell: Duration,
    ) -> Result<Vec<f64>> {
        if !(step_nm.is_finite() && step_nm > 0.0) {
            bail!("Scan step must be positive, got {}", step_nm);
        }
        if end_nm < start_nm {
            bail!("Scan end {} nm is below start {} nm", end_nm, start_nm);
        }

        self.go_wavelength(start_nm).await?;
        tokio::time::sleep(self.scan_settle).await;
        let mut visited = vec![start_nm];

        for step in 1u32.. {
            let next = start_nm + f64::from(step) * step_nm;
            if next > end_nm + f64::EPSILON * end_nm.abs() {
                break;
            }
            tokio::time::sleep(dwell).await;
            self.go_wavelength(next).await?;
            visited.push(next);
        }

        tracing::info!(start_nm, end_nm, steps = visited.len(), "Finished scan");
        Ok(visited)
    }

    /// Wavelength, grating and shutter in one call.
    pub async fn state(&self) -> Result<MonochromatorState> {
        let wavelength_nm = match self.wavelength().await {
            Ok(nm) => Some(nm),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable wavelength");
                None
            }
        };
        Ok(MonochromatorState {
            wavelength_nm,
            grating: self.grating().await?,
            shutter: self.shutter().await?,
        })
    }

    /// Flush and release the port.
    pub async fn close(self) -> Result<()> {
        let mut port = self.port.lock().await;
        port.get_mut()
            .shutdown()
            .await
            .context("Cornerstone close failed")?;
        tracing::info!("Closed Cornerstone connection");
        Ok(())
    }

    /// Send query and read response with retry support.
    async fn query(&self, command: &str) -> Result<String> {
        const MAX_RETRIES: u32 = 3;
        const BASE_BACKOFF_MS: u64 = 100;

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * u64::from(attempt));
                tracing::debug!(
                    cmd = %command,
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    "Retrying Cornerstone query after backoff"
                );
                tokio::time::sleep(backoff).await;
            }

            match self.query_once(command).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::debug!(cmd = %command, attempt, error = %e, "Cornerstone query attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Cornerstone query failed after {} retries", MAX_RETRIES)))
    }

    /// Send query and return the first line that is not the echo.
    async fn query_once(&self, command: &str) -> Result<String> {
        let mut port = self.port.lock().await;

        let buffered = port.buffer().len();
        if buffered > 0 {
            tracing::debug!(bytes = buffered, "Discarding buffered Cornerstone bytes");
            port.consume(buffered);
        }
        let stale = drain_serial_buffer(port.get_mut(), 20).await;
        if stale > 0 {
            tracing::debug!(bytes = stale, "Discarded stale Cornerstone bytes");
        }

        port.get_mut()
            .write_all(format!("{}\r\n", command).as_bytes())
            .await
            .context("Cornerstone write failed")?;
        tracing::debug!(cmd = %command, "Sent Cornerstone query");

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let mut line = String::new();
            match tokio::time::timeout(remaining, port.read_line(&mut line)).await {
                Ok(Ok(0)) => bail!("Cornerstone connection closed"),
                Ok(Ok(_)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if is_echo(trimmed, command) {
                        tracing::debug!(echo = %trimmed, "Skipping Cornerstone echo");
                        continue;
                    }
                    tracing::debug!(cmd = %command, response = %trimmed, "Cornerstone response");
                    return Ok(trimmed.to_string());
                }
                Ok(Err(e)) => bail!("Cornerstone read error: {}", e),
                Err(_) => bail!("Cornerstone read timeout waiting for reply to '{}'", command),
            }
        }
    }

    /// Send a command that has no reply and consume its echo.
    async fn command(&self, command: &str) -> Result<()> {
        let mut port = self.port.lock().await;

        port.get_mut()
            .write_all(format!("{}\r\n", command).as_bytes())
            .await
            .context("Cornerstone write failed")?;
        tracing::debug!(cmd = %command, "Sent Cornerstone command");

        let mut echo = String::new();
        match tokio::time::timeout(self.timeout, port.read_line(&mut echo)).await {
            Ok(Ok(_)) if is_echo(echo.trim(), command) => {}
            Ok(Ok(_)) => {
                tracing::debug!(cmd = %command, line = %echo.trim(), "Unexpected line after command");
            }
            Ok(Err(_)) | Err(_) => {
                tracing::debug!(cmd = %command, "No echo for command");
            }
        }
        Ok(())
    }
}

fn is_echo(line: &str, command: &str) -> bool {
    line.eq_ignore_ascii_case(command.trim())
}

fn parse_number(response: &str) -> Result<f64> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        bail!("Empty response");
    }
    Ok(trimmed.parse::<f64>()?)
}

// =============================================================================
// Capability implementations
// =============================================================================

#[async_trait]
impl WavelengthTunable for CornerstoneDriver {
    #[instrument(skip(self), fields(wavelength_nm), err)]
    async fn set_wavelength(&self, wavelength_nm: f64) -> Result<()> {
        let (min, max) = self.wavelength_range();
        if !(min..=max).contains(&wavelength_nm) {
            bail!("Wavelength {} nm out of range ({}-{} nm)", wavelength_nm, min, max);
        }
        self.go_wavelength(wavelength_nm).await
    }

    async fn get_wavelength(&self) -> Result<f64> {
        self.wavelength().await
    }

    fn wavelength_range(&self) -> (f64, f64) {
        WAVELENGTH_RANGE_NM
    }
}

#[async_trait]
impl ShutterControl for CornerstoneDriver {
    async fn open_shutter(&self) -> Result<()> {
        self.set_shutter(ShutterState::Open).await
    }

    async fn close_shutter(&self) -> Result<()> {
        self.set_shutter(ShutterState::Closed).await
    }

    async fn is_shutter_open(&self) -> Result<bool> {
        Ok(self.shutter().await? == ShutterState::Open)
    }
}

#[async_trait]
impl FilterSelect for CornerstoneDriver {
    async fn slot_count(&self) -> Result<usize> {
        Ok(FILTER_COUNT)
    }

    async fn slot(&self) -> Result<usize> {
        Ok(usize::from(self.filter().await?))
    }

    async fn select_slot(&self, slot: usize) -> Result<()> {
        let filter = u8::try_from(slot).map_err(|_| anyhow!("Filter must be 1-6, got {}", slot))?;
        self.set_filter(filter).await
    }
}

#[async_trait]
impl GratingSelect for CornerstoneDriver {
    fn grating_count(&self) -> usize {
        GRATING_COUNT
    }

    async fn grating(&self) -> Result<usize> {
        Ok(usize::from(CornerstoneDriver::grating(self).await?))
    }

    async fn select_grating(&self, grating: usize) -> Result<()> {
        let grating =
            u8::try_from(grating).map_err(|_| anyhow!("Grating must be 1, 2 or 3, got {}", grating))?;
        self.set_grating(grating).await
    }
}
