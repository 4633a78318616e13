//! Driver error type.

use crate::status::ArtemisStatus;
use daq_core::error::DaqError;
use std::time::Duration;
use thiserror::Error;

/// Failures of the filter wheel driver.
#[derive(Error, Debug)]
pub enum EfwError {
    /// None of the candidate library paths could be loaded.
    #[error("Failed to load the Atik SDK library (tried: {tried}). Make sure the Atik Core SDK is installed")]
    LibraryNotFound {
        /// Candidate names, comma separated
        tried: String,
    },

    /// The library loaded but does not export a required symbol.
    #[error("Atik SDK function not found: {0}")]
    FunctionNotFound(String),

    /// An SDK call returned a non-zero status.
    #[error("{op} failed: {status}")]
    Status {
        /// SDK function name
        op: &'static str,
        /// Decoded return code
        status: ArtemisStatus,
    },

    /// Instance operation without a live handle.
    #[error("Filter wheel is not connected. Use connect() before using the filter wheel")]
    NotConnected,

    /// `ArtemisEFWIsPresent` never reported the wheel.
    #[error("Could not detect an Atik filter wheel at index {index} after {attempts} attempts")]
    NotPresent {
        /// Device index
        index: i32,
        /// Presence checks made
        attempts: u32,
    },

    /// `ArtemisEFWConnect` returned a null handle.
    #[error("Could not connect to the Atik filter wheel at index {0}")]
    ConnectFailed(i32),

    /// Requested slot is outside `[0, count)`.
    #[error("Invalid filter wheel position {position}. Valid range: [0, {count})")]
    PositionOutOfRange {
        /// Requested slot
        position: i32,
        /// Slots on the wheel
        count: i32,
    },

    /// Wheel type code other than EFW1/EFW2.
    #[error("Unknown filter wheel type {0}")]
    UnknownType(i32),

    /// Serial number buffer did not hold an integer.
    #[error("Unreadable filter wheel serial number '{0}'")]
    InvalidSerial(String),

    /// No present wheel reports the requested serial.
    #[error("Filter wheel with serial number {0} is not connected")]
    SerialNotFound(u32),

    /// The wheel kept reporting motion past the settle timeout.
    #[error("Filter wheel still moving after {0:?}")]
    SettleTimeout(Duration),
}

impl From<EfwError> for DaqError {
    fn from(err: EfwError) -> Self {
        match err {
            EfwError::NotConnected => DaqError::NotConnected(err.to_string()),
            EfwError::PositionOutOfRange { .. } => DaqError::InvalidParameter(err.to_string()),
            EfwError::SettleTimeout(_) => DaqError::Timeout(err.to_string()),
            other => DaqError::Instrument(other.to_string()),
        }
    }
}
