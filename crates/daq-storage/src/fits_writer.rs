//! FITS output for decoded frames.

use crate::error::StorageError;
use crate::header::{FitsHeader, HeaderValue};
use anyhow::{Context, Result};
use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::Array2;
use std::path::Path;

/// Writes single-image FITS files.
pub struct FitsWriter;

impl FitsWriter {
    /// Write `image` as the primary HDU of `path` followed by every card of `header`.
    ///
    /// The image is stored as unsigned 16-bit data, which cfitsio encodes as
    /// BITPIX 16 with BZERO 32768 and BSCALE 1. Row 0 of `image` becomes the
    /// first FITS row.
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `image` - `height x width` samples
    /// * `header` - Cards written after the structural keys
    /// * `overwrite` - Replace an existing file
    ///
    /// # Errors
    /// Returns an error if `path` exists and `overwrite` is false, or if
    /// cfitsio fails to create or write the file.
    pub fn write_image<P: AsRef<Path>>(
        path: P,
        image: &Array2<u16>,
        header: &FitsHeader,
        overwrite: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(StorageError::AlreadyExists {
                path: path.display().to_string(),
            }
            .into());
        }

        let (height, width) = image.dim();
        let description = ImageDescription {
            data_type: ImageType::UnsignedShort,
            dimensions: &[height, width],
        };

        let mut builder = FitsFile::create(path).with_custom_primary(&description);
        if overwrite {
            builder = builder.overwrite();
        }
        let mut fptr = builder
            .open()
            .with_context(|| format!("Failed to create {:?}", path))?;
        let hdu = fptr
            .primary_hdu()
            .with_context(|| format!("Failed to open primary HDU of {:?}", path))?;

        let samples: Vec<u16> = image.iter().copied().collect();
        hdu.write_image(&mut fptr, &samples)
            .with_context(|| format!("Failed to write image data to {:?}", path))?;

        for card in header.cards() {
            write_card(&mut fptr, &hdu, &card.key, &card.value, &card.comment)
                .with_context(|| format!("Failed to write {} to {:?}", card.key, path))?;
        }

        tracing::info!(
            path = ?path,
            dimensions = format!("{}x{}", width, height),
            cards = header.len(),
            "Wrote FITS image"
        );
        Ok(())
    }
}

fn write_card(
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    key: &str,
    value: &HeaderValue,
    comment: &str,
) -> fitsio::errors::Result<()> {
    match value {
        HeaderValue::Str(s) => hdu.write_key(fptr, key, (s.as_str(), comment)),
        HeaderValue::Int(v) => hdu.write_key(fptr, key, (*v, comment)),
        HeaderValue::Float(v) => hdu.write_key(fptr, key, (*v, comment)),
        // fitsio has no logical key writer
        HeaderValue::Bool(b) => hdu.write_key(fptr, key, (if *b { "T" } else { "F" }, comment)),
    }
}
