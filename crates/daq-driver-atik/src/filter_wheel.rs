//! Atik EFW filter wheel driver.
//!
//! Typical use:
//!
//! ```rust,ignore
//! let sdk = Arc::new(LibraryEfwSdk::load(None)?);
//! let wheel = AtikFilterWheel::new(sdk, WheelOptions::default());
//! wheel.connect(0).await?;
//! wheel.set_position(3).await?;
//! ```
//!
//! The wheel disconnects when dropped.

use crate::error::EfwError;
use crate::sdk::{EfwDetails, EfwHandle, EfwSdk};
use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::FilterSelect;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Indices probed when the SDK reports zero attached devices.
///
/// `ArtemisDeviceCount` does not count filter wheels, so a bus with only a
/// wheel on it reports zero.
pub const FALLBACK_PROBE_COUNT: i32 = 10;

/// Polling behaviour of a wheel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelOptions {
    /// Presence checks before `connect` gives up
    pub presence_attempts: u32,
    /// Delay between presence checks
    pub presence_interval: Duration,
    /// Delay between motion polls after a move; zero returns immediately
    pub poll_interval: Duration,
    /// Upper bound on waiting for a move to finish
    pub settle_timeout: Option<Duration>,
}

impl Default for WheelOptions {
    fn default() -> Self {
        Self {
            presence_attempts: 10,
            presence_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            settle_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Connection {
    handle: EfwHandle,
    index: i32,
}

/// One Atik EFW filter wheel.
pub struct AtikFilterWheel {
    sdk: Arc<dyn EfwSdk>,
    options: WheelOptions,
    connection: Mutex<Option<Connection>>,
}

impl AtikFilterWheel {
    /// Create an unconnected wheel.
    pub fn new(sdk: Arc<dyn EfwSdk>, options: WheelOptions) -> Self {
        Self {
            sdk,
            options,
            connection: Mutex::new(None),
        }
    }

    /// Polling options in use
    pub fn options(&self) -> &WheelOptions {
        &self.options
    }

    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Device index of the open connection, if any.
    pub fn device_index(&self) -> Option<i32> {
        self.connection().map(|c| c.index)
    }

    /// Connect to the wheel at `index`.
    ///
    /// Waits for the SDK to report the wheel present, polling up to
    /// `presence_attempts` times. Already being connected to `index` is a
    /// no-op; a connection to another index is closed first.
    pub async fn connect(&self, index: i32) -> Result<(), EfwError> {
        if self.device_index() == Some(index) && self.is_connected() {
            return Ok(());
        }
        if self.connection().is_some() {
            self.disconnect()?;
        }

        let attempts = self.options.presence_attempts.max(1);
        let mut attempt = 1;
        while !self.sdk.is_present(index) {
            if attempt >= attempts {
                return Err(EfwError::NotPresent { index, attempts });
            }
            tracing::debug!(index, attempt, "Filter wheel not present yet");
            tokio::time::sleep(self.options.presence_interval).await;
            attempt += 1;
        }

        let handle = self
            .sdk
            .connect(index)
            .ok_or(EfwError::ConnectFailed(index))?;
        *self.connection() = Some(Connection { handle, index });

        tracing::info!(index, attempts = attempt, "Connected to Atik filter wheel");
        Ok(())
    }

    /// Release the handle.
    ///
    /// The handle is forgotten even when the SDK reports a failure.
    pub fn disconnect(&self) -> Result<(), EfwError> {
        let Some(conn) = self.connection().take() else {
            return Ok(());
        };
        if !self.sdk.is_connected(conn.handle) {
            return Ok(());
        }
        self.sdk.disconnect(conn.handle)?;
        tracing::info!(index = conn.index, "Disconnected from Atik filter wheel");
        Ok(())
    }

    /// Whether a handle is held and the SDK still reports it connected.
    pub fn is_connected(&self) -> bool {
        match *self.connection() {
            Some(conn) => self.sdk.is_connected(conn.handle),
            None => false,
        }
    }

    fn handle(&self) -> Result<EfwHandle, EfwError> {
        let conn = (*self.connection()).ok_or(EfwError::NotConnected)?;
        if !self.sdk.is_connected(conn.handle) {
            return Err(EfwError::NotConnected);
        }
        Ok(conn.handle)
    }

    /// Number of reachable positions.
    pub fn number_of_filters(&self) -> Result<i32, EfwError> {
        self.sdk.position_count(self.handle()?)
    }

    /// Current position index.
    pub fn position(&self) -> Result<i32, EfwError> {
        Ok(self.sdk.position(self.handle()?)?.0)
    }

    /// Whether the wheel is turning.
    pub fn is_moving(&self) -> Result<bool, EfwError> {
        Ok(self.sdk.position(self.handle()?)?.1)
    }

    /// Wheel type and serial number.
    pub fn details(&self) -> Result<EfwDetails, EfwError> {
        self.sdk.details(self.handle()?)
    }

    /// Move to `position` and wait for the wheel to stop.
    ///
    /// # Errors
    ///
    /// [`EfwError::PositionOutOfRange`] unless `0 <= position < number_of_filters()`.
    pub async fn set_position(&self, position: i32) -> Result<(), EfwError> {
        let count = self.number_of_filters()?;
        if position < 0 || position >= count {
            return Err(EfwError::PositionOutOfRange { position, count });
        }

        self.sdk.set_position(self.handle()?, position)?;
        tracing::debug!(position, count, "Filter wheel move issued");

        if !self.options.poll_interval.is_zero() {
            self.wait_until_stopped().await?;
        }
        tracing::info!(position, "Filter wheel in position");
        Ok(())
    }

    /// Poll `is_moving` until the wheel stops or the settle timeout passes.
    pub async fn wait_until_stopped(&self) -> Result<(), EfwError> {
        let started = Instant::now();
        let interval = self.options.poll_interval.max(Duration::from_millis(1));
        while self.is_moving()? {
            if let Some(limit) = self.options.settle_timeout {
                if started.elapsed() >= limit {
                    return Err(EfwError::SettleTimeout(limit));
                }
            }
            tokio::time::sleep(interval).await;
        }
        Ok(())
    }

    // Bus-level queries

    /// Refresh the SDK device list and return the number of Atik devices.
    pub fn available_devices(sdk: &dyn EfwSdk) -> i32 {
        sdk.refresh_devices_count();
        sdk.device_count()
    }

    /// Type and serial number of the wheel at `index`, without connecting.
    pub fn device_details(sdk: &dyn EfwSdk, index: i32) -> Result<EfwDetails, EfwError> {
        sdk.device_details(index)
    }

    /// Indices of wheels currently present.
    pub fn available_filter_wheels(sdk: &dyn EfwSdk) -> Vec<i32> {
        let mut probe = Self::available_devices(sdk);
        if probe == 0 {
            probe = FALLBACK_PROBE_COUNT;
        }
        (0..probe).filter(|&i| sdk.is_present(i)).collect()
    }

    /// Connect to the first present wheel reporting `serial_number`.
    pub async fn connect_by_serial(
        sdk: Arc<dyn EfwSdk>,
        serial_number: u32,
        options: WheelOptions,
    ) -> Result<Self, EfwError> {
        for index in Self::available_filter_wheels(sdk.as_ref()) {
            match sdk.device_details(index) {
                Ok(details) if details.serial_number == serial_number => {
                    let wheel = Self::new(sdk, options);
                    wheel.connect(index).await?;
                    return Ok(wheel);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(index, error = %e, "Skipping filter wheel"),
            }
        }
        Err(EfwError::SerialNotFound(serial_number))
    }
}

impl Drop for AtikFilterWheel {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "Failed to disconnect filter wheel on drop");
        }
    }
}

fn slot_index(slot: usize) -> Result<i32> {
    i32::try_from(slot).map_err(|_| anyhow::anyhow!("slot {} out of range", slot))
}

#[async_trait]
impl FilterSelect for AtikFilterWheel {
    async fn slot_count(&self) -> Result<usize> {
        Ok(usize::try_from(self.number_of_filters()?)?)
    }

    async fn slot(&self) -> Result<usize> {
        Ok(usize::try_from(self.position()?)?)
    }

    async fn select_slot(&self, slot: usize) -> Result<()> {
        self.set_position(slot_index(slot)?).await?;
        Ok(())
    }

    async fn is_moving(&self) -> Result<bool> {
        Ok(AtikFilterWheel::is_moving(self)?)
    }

    async fn wait_settled(&self) -> Result<()> {
        self.wait_until_stopped().await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "mock"))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{MockEfwSdk, MockWheel};
    use crate::status::ArtemisStatus;

    fn fast() -> WheelOptions {
        WheelOptions {
            presence_interval: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            ..WheelOptions::default()
        }
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let wheel = AtikFilterWheel::new(Arc::new(MockEfwSdk::single(5)), fast());
        assert!(!wheel.is_connected());
        assert!(matches!(wheel.position(), Err(EfwError::NotConnected)));
        assert!(matches!(wheel.number_of_filters(), Err(EfwError::NotConnected)));
        assert!(matches!(wheel.set_position(1).await, Err(EfwError::NotConnected)));
        wheel.disconnect().unwrap();
    }

    #[tokio::test]
    async fn presence_poll_gives_up() {
        let sdk = Arc::new(
            MockEfwSdk::new().with_wheel(MockWheel::new(0, 7).with_present_after(50)),
        );
        let wheel = AtikFilterWheel::new(sdk.clone(), fast());
        let err = wheel.connect(0).await.unwrap_err();
        assert!(matches!(err, EfwError::NotPresent { index: 0, attempts: 10 }));
        assert_eq!(sdk.presence_checks(), 10);
    }

    #[tokio::test]
    async fn presence_poll_waits_for_late_wheel() {
        let sdk = Arc::new(
            MockEfwSdk::new().with_wheel(MockWheel::new(0, 7).with_present_after(3)),
        );
        let wheel = AtikFilterWheel::new(sdk.clone(), fast());
        wheel.connect(0).await.unwrap();
        assert!(wheel.is_connected());
        assert_eq!(sdk.presence_checks(), 4);

        // Reconnecting to the same index does not poll again
        wheel.connect(0).await.unwrap();
        assert_eq!(sdk.presence_checks(), 4);
    }

    #[tokio::test]
    async fn set_position_waits_for_motion() {
        let sdk = Arc::new(
            MockEfwSdk::new().with_wheel(MockWheel::new(0, 7).with_settle_polls(4)),
        );
        let wheel = AtikFilterWheel::new(sdk.clone(), fast());
        wheel.connect(0).await.unwrap();

        wheel.set_position(3).await.unwrap();
        assert!(!wheel.is_moving().unwrap());
        assert_eq!(wheel.position().unwrap(), 3);
        assert_eq!(sdk.moves(), vec![(0, 3)]);
    }

    #[tokio::test]
    async fn zero_poll_interval_returns_while_moving() {
        let sdk = Arc::new(
            MockEfwSdk::new().with_wheel(MockWheel::new(0, 7).with_settle_polls(2)),
        );
        let options = WheelOptions {
            poll_interval: Duration::ZERO,
            ..fast()
        };
        let wheel = AtikFilterWheel::new(sdk, options);
        wheel.connect(0).await.unwrap();

        wheel.set_position(2).await.unwrap();
        assert!(wheel.is_moving().unwrap());
        wheel.wait_until_stopped().await.unwrap();
        assert_eq!(wheel.position().unwrap(), 2);
    }

    #[tokio::test]
    async fn out_of_range_positions_rejected() {
        let sdk = Arc::new(MockEfwSdk::single(5));
        let wheel = AtikFilterWheel::new(sdk.clone(), fast());
        wheel.connect(0).await.unwrap();

        let err = wheel.set_position(5).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid filter wheel position 5. Valid range: [0, 5)");
        assert!(wheel.set_position(-1).await.is_err());
        assert!(sdk.moves().is_empty());
    }

    #[tokio::test]
    async fn settle_timeout_caps_wait() {
        let sdk = Arc::new(
            MockEfwSdk::new().with_wheel(MockWheel::new(0, 7).with_settle_polls(10_000)),
        );
        let options = WheelOptions {
            settle_timeout: Some(Duration::from_millis(20)),
            ..fast()
        };
        let wheel = AtikFilterWheel::new(sdk, options);
        wheel.connect(0).await.unwrap();
        let err = wheel.set_position(1).await.unwrap_err();
        assert!(matches!(err, EfwError::SettleTimeout(_)));
    }

    #[tokio::test]
    async fn sdk_status_is_reported() {
        let sdk = Arc::new(MockEfwSdk::single(5));
        let wheel = AtikFilterWheel::new(sdk.clone(), fast());
        wheel.connect(0).await.unwrap();

        sdk.fail_next("ArtemisEFWSetPosition", 4);
        let err = wheel.set_position(1).await.unwrap_err();
        assert!(matches!(
            err,
            EfwError::Status {
                op: "ArtemisEFWSetPosition",
                status: ArtemisStatus::NoResponse
            }
        ));
    }

    #[tokio::test]
    async fn disconnect_failure_clears_handle() {
        let sdk = Arc::new(MockEfwSdk::single(5));
        let wheel = AtikFilterWheel::new(sdk.clone(), fast());
        wheel.connect(0).await.unwrap();

        sdk.fail_next("ArtemisEFWDisconnect", 7);
        let err = wheel.disconnect().unwrap_err();
        assert!(err.to_string().contains("ARTEMIS_OPERATION_FAILED (7)"));
        assert!(!wheel.is_connected());
        assert_eq!(wheel.device_index(), None);
    }

    #[tokio::test]
    async fn drop_disconnects() {
        let sdk = Arc::new(MockEfwSdk::single(5));
        {
            let wheel = AtikFilterWheel::new(sdk.clone(), fast());
            wheel.connect(0).await.unwrap();
            assert!(sdk.wheel_connected(0));
        }
        assert!(!sdk.wheel_connected(0));
    }

    #[tokio::test]
    async fn filter_select_capability() {
        let sdk = Arc::new(MockEfwSdk::single(8));
        let wheel = AtikFilterWheel::new(sdk, fast());
        wheel.connect(0).await.unwrap();

        let cap: &dyn FilterSelect = &wheel;
        assert_eq!(cap.slot_count().await.unwrap(), 8);
        cap.select_slot(6).await.unwrap();
        cap.wait_settled().await.unwrap();
        assert_eq!(cap.slot().await.unwrap(), 6);
        assert!(cap.select_slot(8).await.is_err());
    }
}
