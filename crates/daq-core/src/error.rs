//! Error types shared by the instrument crates.
//!
//! `DaqError` is the primary error type. Driver crates keep their own
//! `thiserror` enums for device-specific failures (SDK status codes, protocol
//! replies) and convert into `DaqError` or `anyhow::Error` at the boundary.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: semantically invalid settings that parsed fine.
//! - **`Figment`** / **`Toml`**: configuration files that failed to parse.
//! - **`Io`**: file and port I/O failures.
//! - **`Instrument`**: the device answered, but not with what was expected.
//! - **`NotConnected`**: an operation needed an open connection and there was none.
//! - **`InvalidParameter`**: a caller asked for something the device cannot do
//!   (slot out of range, grating 4 on a three-grating turret).
//! - **`Timeout`**: the device did not answer in time.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Coarse classification of driver failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device or SDK could not be brought up.
    Initialization,
    /// Driver configuration was rejected.
    Configuration,
    /// Transport-level failure (serial, shared library).
    Communication,
    /// Failure while releasing the device.
    Shutdown,
    /// Device reported a fault.
    Hardware,
    /// Device did not answer in time.
    Timeout,
    /// Request outside what the device supports.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Error raised by a driver factory while validating or building a device.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Factory `driver_type` that produced the error.
    pub driver_type: String,
    /// Failure class.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the instrument tools.
///
/// # Example
///
/// ```rust
/// use daq_core::error::DaqError;
///
/// fn validate_slot(slot: usize, slots: usize) -> Result<(), DaqError> {
///     if slot >= slots {
///         return Err(DaqError::InvalidParameter(format!(
///             "slot {} out of range [0, {})",
///             slot, slots
///         )));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration values parsed but failed semantic validation.
    ///
    /// **Recovery Strategy**: Abort, report the offending key, fix the file.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Layered configuration (file + environment) could not be extracted.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A driver settings table did not match the driver's schema.
    #[error("Driver settings error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Standard I/O operation failed.
    ///
    /// Covers raw file reads, FITS output directories and serial port opening.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The instrument replied with something the driver could not use.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// An operation required an open device connection.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// The request is outside what the device supports.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The device did not answer within the configured timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Factory-level failure.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Figment(Box::new(err))
    }
}
