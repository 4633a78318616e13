//! Errors raised while decoding raw frames and building FITS headers.

use thiserror::Error;

/// Failures in the raw-to-FITS path that callers may want to match on.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The dump holds fewer bytes than the requested frames need
    #[error("raw buffer holds {actual} bytes but {frames} frame(s) of {frame_len} bytes need {expected}")]
    ShortBuffer {
        /// Frames requested
        frames: usize,
        /// Bytes per frame
        frame_len: usize,
        /// Bytes needed for all frames
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Frame geometry whose byte count overflows `usize`
    #[error("{frames} frame(s) of {width}x{height} samples exceed the addressable size")]
    LayoutTooLarge {
        /// Samples per row
        width: usize,
        /// Rows per frame
        height: usize,
        /// Frames requested
        frames: usize,
    },

    /// Sample width other than two bytes
    #[error("only 16-bit samples are supported, got {0} bytes per sample")]
    UnsupportedSampleWidth(usize),

    /// Zero width or height
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    EmptyFrame {
        /// Samples per row
        width: usize,
        /// Rows per frame
        height: usize,
    },

    /// Keyword that is not 1-8 characters of `A-Z 0-9 - _`
    #[error("invalid FITS keyword {0:?}: expected 1-8 characters of A-Z, 0-9, '-' or '_'")]
    InvalidKey(String),

    /// Keyword owned by the FITS library
    #[error("{0} is written by the FITS library and cannot be set")]
    ReservedKey(String),

    /// Value that does not parse, or is not finite
    #[error("invalid {field}: {value:?}")]
    InvalidSetting {
        /// Setting name
        field: &'static str,
        /// Text as given
        value: String,
    },

    /// Gain or readout speed key without a mapping
    #[error("unknown {field} key {key}")]
    UnknownKey {
        /// Setting name
        field: &'static str,
        /// Key as given
        key: i64,
    },

    /// Output exists and overwriting is disabled
    #[error("{path} already exists and overwrite is disabled")]
    AlreadyExists {
        /// Output path
        path: String,
    },
}
