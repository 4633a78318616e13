//! `daq-storage`
//!
//! Conversion of raw PIXIS sensor dumps into FITS images.
//!
//! - [`raw_frame`]: splits a dump into `u16` frames
//! - [`header`]: ordered FITS cards
//! - [`exposure`]: exposure and telemetry cards
//! - [`fits_writer`]: cfitsio output through `fitsio`
//! - [`convert`]: the whole pipeline
//!
//! ```rust,ignore
//! let mut request = ConvertRequest::new("dump.raw", "/data", "dark_001", &config.storage);
//! request.header = settings.header(&Telemetry::read("dump.txt")?)?;
//! let written = convert_raw_to_fits(&request)?;
//! ```

pub mod convert;
pub mod error;
pub mod exposure;
pub mod fits_writer;
pub mod header;
pub mod raw_frame;

pub use convert::{convert_raw_to_fits, ConvertRequest};
pub use error::StorageError;
pub use exposure::{ExposureSettings, ObsType, Telemetry};
pub use fits_writer::FitsWriter;
pub use header::{FitsHeader, HeaderCard, HeaderValue};
pub use raw_frame::{decode_frames, ByteOrder, RawFrameLayout};
