//! Vendor status codes and wheel model identifiers.

use crate::error::EfwError;
use std::fmt;

/// Return code of an `Artemis*` SDK call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtemisStatus {
    /// `ARTEMIS_OK`
    Ok,
    /// `ARTEMIS_INVALID_PARAMETER`
    InvalidParameter,
    /// `ARTEMIS_NOT_CONNECTED`
    NotConnected,
    /// `ARTEMIS_NOT_IMPLEMENTED`
    NotImplemented,
    /// `ARTEMIS_NO_RESPONSE`
    NoResponse,
    /// `ARTEMIS_INVALID_FUNCTION`
    InvalidFunction,
    /// `ARTEMIS_NOT_INITIALIZED`
    NotInitialized,
    /// `ARTEMIS_OPERATION_FAILED`
    OperationFailed,
    /// Code outside the documented table
    Unknown(i32),
}

impl ArtemisStatus {
    /// Map a raw return code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidParameter,
            2 => Self::NotConnected,
            3 => Self::NotImplemented,
            4 => Self::NoResponse,
            5 => Self::InvalidFunction,
            6 => Self::NotInitialized,
            7 => Self::OperationFailed,
            other => Self::Unknown(other),
        }
    }

    /// Raw return code.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InvalidParameter => 1,
            Self::NotConnected => 2,
            Self::NotImplemented => 3,
            Self::NoResponse => 4,
            Self::InvalidFunction => 5,
            Self::NotInitialized => 6,
            Self::OperationFailed => 7,
            Self::Unknown(code) => code,
        }
    }

    /// Vendor name of the code, `None` for undocumented codes.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::Ok => "ARTEMIS_OK",
            Self::InvalidParameter => "ARTEMIS_INVALID_PARAMETER",
            Self::NotConnected => "ARTEMIS_NOT_CONNECTED",
            Self::NotImplemented => "ARTEMIS_NOT_IMPLEMENTED",
            Self::NoResponse => "ARTEMIS_NO_RESPONSE",
            Self::InvalidFunction => "ARTEMIS_INVALID_FUNCTION",
            Self::NotInitialized => "ARTEMIS_NOT_INITIALIZED",
            Self::OperationFailed => "ARTEMIS_OPERATION_FAILED",
            Self::Unknown(_) => return None,
        })
    }
}

impl fmt::Display for ArtemisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.code()),
            None => write!(f, "unknown status ({})", self.code()),
        }
    }
}

/// Turn a raw SDK return code into a `Result`.
///
/// `op` names the SDK call for the error message.
pub fn check_status(op: &'static str, code: i32) -> Result<(), EfwError> {
    match ArtemisStatus::from_code(code) {
        ArtemisStatus::Ok => Ok(()),
        status => Err(EfwError::Status { op, status }),
    }
}

/// Filter wheel generation reported by `ArtemisEFWGetDetails`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfwType {
    /// First generation EFW
    Efw1 = 1,
    /// EFW2
    Efw2 = 2,
}

impl TryFrom<i32> for EfwType {
    type Error = EfwError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Efw1),
            2 => Ok(Self::Efw2),
            other => Err(EfwError::UnknownType(other)),
        }
    }
}

impl fmt::Display for EfwType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Efw1 => write!(f, "EFW1"),
            Self::Efw2 => write!(f, "EFW2"),
        }
    }
}
