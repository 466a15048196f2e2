//! 8-bit RGB previews of tiles for visual checks.

use crate::raster::PixelArray;
use crate::{ImageryError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::{info, warn};

/// Lower percentile of the contrast stretch.
pub const STRETCH_LOW_PERCENTILE: f64 = 2.0;
/// Upper percentile of the contrast stretch.
pub const STRETCH_HIGH_PERCENTILE: f64 = 98.0;

/// A pixel-interleaved RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbPreview {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RgbPreview {
    /// All-black preview.
    pub fn black(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Interleaved RGB bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at `(col, row)`.
    pub fn pixel(&self, col: usize, row: usize) -> [u8; 3] {
        let i = (row * self.width + col) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Write as an uncompressed RGB TIFF.
    pub fn write_tiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let width = u32::try_from(self.width)
            .map_err(|_| ImageryError::UnsupportedDataType(format!("preview width {}", self.width)))?;
        let height = u32::try_from(self.height)
            .map_err(|_| ImageryError::UnsupportedDataType(format!("preview height {}", self.height)))?;

        let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
        encoder.write_image::<colortype::RGB8>(width, height, &self.data)?;
        info!("Preview image saved to {}", path.display());
        Ok(())
    }
}

/// Linear 2-98 percentile stretch of the first three bands to 0..255.
///
/// The percentiles are taken over all three bands together. A single band is
/// replicated to grey. Input with no positive value gives a black image.
pub fn stretch_rgb(pixels: &PixelArray) -> Result<RgbPreview> {
    let (bands, height, width) = pixels.shape();
    if bands == 0 {
        return Err(ImageryError::UnsupportedDataType("tile has no bands".to_string()));
    }

    let rgb: Vec<Vec<f64>> = (0..3).map(|b| pixels.band_f64(b.min(bands - 1))).collect();
    let max = rgb.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 {
        warn!("Image data is all zeros. Creating a black preview.");
        return Ok(RgbPreview::black(width, height));
    }

    let mut sorted: Vec<f64> = rgb.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let low = percentile(&sorted, STRETCH_LOW_PERCENTILE);
    let high = percentile(&sorted, STRETCH_HIGH_PERCENTILE);
    let range = high - low;

    let stretch = |v: f64| -> u8 {
        if range > 0.0 {
            ((v - low) * 255.0 / range).clamp(0.0, 255.0) as u8
        } else if v > low {
            255
        } else {
            0
        }
    };

    let data = (0..height * width)
        .flat_map(|px| rgb.iter().map(move |band| band[px]))
        .map(stretch)
        .collect();
    Ok(RgbPreview { width, height, data })
}

/// Percentile of sorted values with linear interpolation between ranks.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}
