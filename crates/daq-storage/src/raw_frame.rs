//! Decoding of raw PIXIS sensor dumps.
//!
//! The camera software writes frames back to back as unsigned 16-bit
//! samples, row-major, with no header. Row 0 of the dump is the top of the
//! sensor, so decoded frames are flipped to put it at the FITS origin.

use crate::error::StorageError;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

/// Byte order of the samples in a raw dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first (PIXIS default)
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder {
    fn sample(self, pair: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(pair),
            ByteOrder::Big => u16::from_be_bytes(pair),
        }
    }
}

/// Geometry of one frame in a raw dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrameLayout {
    /// Samples per row
    pub width: usize,
    /// Rows per frame
    pub height: usize,
    /// Bytes per sample; only 2 is supported
    pub bytes_per_sample: usize,
    /// Sample byte order
    #[serde(default)]
    pub byte_order: ByteOrder,
}

impl Default for RawFrameLayout {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            bytes_per_sample: 2,
            byte_order: ByteOrder::Little,
        }
    }
}

impl RawFrameLayout {
    /// PIXIS 1024x1024 layout in the given byte order.
    pub fn pixis(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            ..Self::default()
        }
    }

    /// Bytes occupied by one frame, `None` if that does not fit in `usize`.
    pub fn frame_len(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.bytes_per_sample)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.bytes_per_sample != 2 {
            return Err(StorageError::UnsupportedSampleWidth(self.bytes_per_sample));
        }
        if self.width == 0 || self.height == 0 {
            return Err(StorageError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Split `bytes` into `n_frames` images of `layout`.
///
/// Each image is `height x width`, flipped vertically relative to the
/// stored row order.
///
/// # Errors
///
/// Returns [`StorageError::ShortBuffer`] if `bytes` cannot hold `n_frames`
/// frames, or a layout error for anything other than non-empty 16-bit frames.
pub fn decode_frames(
    bytes: &[u8],
    layout: &RawFrameLayout,
    n_frames: usize,
) -> Result<Vec<Array2<u16>>, StorageError> {
    layout.check()?;

    let too_large = || StorageError::LayoutTooLarge {
        width: layout.width,
        height: layout.height,
        frames: n_frames,
    };
    let frame_len = layout.frame_len().ok_or_else(too_large)?;
    let expected = frame_len.checked_mul(n_frames).ok_or_else(too_large)?;
    if bytes.len() < expected {
        return Err(StorageError::ShortBuffer {
            frames: n_frames,
            frame_len,
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        tracing::warn!(
            trailing = bytes.len() - expected,
            frames = n_frames,
            "Ignoring trailing bytes after last frame"
        );
    }

    bytes[..expected]
        .chunks_exact(frame_len)
        .map(|chunk| decode_one(chunk, layout))
        .collect()
}

fn decode_one(chunk: &[u8], layout: &RawFrameLayout) -> Result<Array2<u16>, StorageError> {
    let samples: Vec<u16> = chunk
        .chunks_exact(2)
        .map(|pair| layout.byte_order.sample([pair[0], pair[1]]))
        .collect();

    let stored = Array2::from_shape_vec((layout.height, layout.width), samples).map_err(|_| {
        StorageError::EmptyFrame {
            width: layout.width,
            height: layout.height,
        }
    })?;
    Ok(stored.slice(s![..;-1, ..]).to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn small(byte_order: ByteOrder) -> RawFrameLayout {
        RawFrameLayout {
            width: 3,
            height: 2,
            bytes_per_sample: 2,
            byte_order,
        }
    }

    fn encode(samples: &[u16], big: bool) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|v| if big { v.to_be_bytes() } else { v.to_le_bytes() })
            .collect()
    }

    #[test]
    fn default_layout_is_pixis() {
        let layout = RawFrameLayout::default();
        assert_eq!(layout.frame_len(), Some(1024 * 1024 * 2));
        assert_eq!(layout.byte_order, ByteOrder::Little);
    }

    #[test]
    fn flips_rows_little_endian() {
        let bytes = encode(&[1, 2, 3, 4, 5, 65535], false);
        let frames = decode_frames(&bytes, &small(ByteOrder::Little), 1).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            ndarray::arr2(&[[4, 5, 65535], [1, 2, 3]])
        );
    }

    #[test]
    fn big_endian_reads_swapped_bytes() {
        let bytes = encode(&[0x0102, 0, 0, 0, 0, 0], true);
        let frames = decode_frames(&bytes, &small(ByteOrder::Big), 1).unwrap();
        assert_eq!(frames[0][[1, 0]], 0x0102);

        let misread = decode_frames(&bytes, &small(ByteOrder::Little), 1).unwrap();
        assert_eq!(misread[0][[1, 0]], 0x0201);
    }

    #[test]
    fn splits_consecutive_frames() {
        let bytes = encode(&[1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 9], false);
        let frames = decode_frames(&bytes, &small(ByteOrder::Little), 2).unwrap();
        assert!(frames[0].iter().all(|&v| v == 1));
        assert!(frames[1].iter().all(|&v| v == 2));
    }

    #[test]
    fn short_buffer_is_an_error() {
        let bytes = encode(&[1, 2, 3, 4, 5], false);
        let err = decode_frames(&bytes, &small(ByteOrder::Little), 1).unwrap_err();
        assert!(matches!(
            err,
            StorageError::ShortBuffer {
                expected: 12,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn oversized_layout_is_an_error() {
        let layout = RawFrameLayout {
            width: usize::MAX / 2,
            height: 4,
            ..RawFrameLayout::default()
        };
        assert_eq!(layout.frame_len(), None);
        assert!(matches!(
            decode_frames(&[0; 16], &layout, 1),
            Err(StorageError::LayoutTooLarge { .. })
        ));

        let tall = RawFrameLayout {
            width: 1024,
            height: 1024,
            ..RawFrameLayout::default()
        };
        assert!(matches!(
            decode_frames(&[0; 16], &tall, usize::MAX / 2),
            Err(StorageError::LayoutTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_wide_samples() {
        let mut layout = small(ByteOrder::Little);
        layout.bytes_per_sample = 4;
        assert!(matches!(
            decode_frames(&[0; 24], &layout, 1),
            Err(StorageError::UnsupportedSampleWidth(4))
        ));
    }
}
