//! Raw dump to FITS conversion.

use crate::fits_writer::FitsWriter;
use crate::header::FitsHeader;
use crate::raw_frame::{decode_frames, RawFrameLayout};
use anyhow::{Context, Result};
use daq_core::config::StorageSettings;
use std::path::{Path, PathBuf};

/// Everything needed to convert one raw dump.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Raw dump to read
    pub source: PathBuf,
    /// Directory receiving the FITS files
    pub target_dir: PathBuf,
    /// Output file name without suffix
    pub target_stem: String,
    /// Suffix of a single-frame output
    pub suffix: String,
    /// Frame geometry and byte order
    pub layout: RawFrameLayout,
    /// Frames expected in the dump
    pub frames: usize,
    /// Replace existing outputs
    pub overwrite: bool,
    /// Cards added to every output file
    pub header: FitsHeader,
}

impl ConvertRequest {
    /// One-frame PIXIS request using the configured suffix and overwrite policy.
    pub fn new(
        source: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        target_stem: impl Into<String>,
        storage: &StorageSettings,
    ) -> Self {
        Self {
            source: source.into(),
            target_dir: target_dir.into(),
            target_stem: target_stem.into(),
            suffix: storage.suffix.clone(),
            layout: RawFrameLayout::default(),
            frames: 1,
            overwrite: storage.overwrite,
            header: FitsHeader::new(),
        }
    }

    /// Paths this request writes, one per frame.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        if self.frames > 1 {
            (0..self.frames)
                .map(|i| self.target_dir.join(format!("{}_{}.fits", self.target_stem, i)))
                .collect()
        } else {
            vec![self
                .target_dir
                .join(format!("{}{}", self.target_stem, self.suffix))]
        }
    }
}

/// Decode `request.source` and write one FITS file per frame.
///
/// # Errors
/// Fails if the dump cannot be read, holds fewer bytes than the requested
/// frames, or any output cannot be written.
pub fn convert_raw_to_fits(request: &ConvertRequest) -> Result<Vec<PathBuf>> {
    if request.frames == 0 {
        anyhow::bail!("frame count must be at least 1");
    }
    let bytes = read_raw(&request.source)?;
    let frames = decode_frames(&bytes, &request.layout, request.frames)
        .with_context(|| format!("Failed to decode {:?}", request.source))?;

    let paths = request.output_paths();
    for (frame, path) in frames.iter().zip(&paths) {
        FitsWriter::write_image(path, frame, &request.header, request.overwrite)?;
    }

    tracing::info!(
        source = ?request.source,
        frames = paths.len(),
        byte_order = ?request.layout.byte_order,
        "Converted raw dump to FITS"
    );
    Ok(paths)
}

fn read_raw(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read raw dump {:?}", path))
}
