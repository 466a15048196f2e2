//! Raster data types: affine transforms, pixel windows, typed band-major arrays
//! and georeferencing profiles.

use crate::aoi::Bounds;
use crate::crs::Epsg;
use crate::{ImageryError, Result};

/// Tolerance, in pixels, when snapping fractional window edges.
const WINDOW_EPSILON: f64 = 1e-6;

/// Affine pixel-to-world transform.
///
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`. North-up rasters
/// have `b = d = 0` and a negative `e`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    /// North-up transform from the upper-left corner and pixel sizes.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            a: pixel_width,
            b: 0.0,
            c: origin_x,
            d: 0.0,
            e: -pixel_height,
            f: origin_y,
        }
    }

    /// World coordinates of a (fractional) pixel position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Inverse transform, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    /// Transform of a window whose upper-left pixel is `(col_off, row_off)`.
    pub fn window_transform(&self, window: &Window) -> Self {
        let (c, f) = self.apply(window.col_off as f64, window.row_off as f64);
        Self { c, f, ..*self }
    }

    /// Whether the transform has no rotation or shear terms.
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

/// A rectangular pixel region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
}

impl Window {
    /// Whether the window covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel window covering `bounds`, clipped to a `raster_width` x `raster_height` raster.
    ///
    /// Offsets are floored and far edges ceiled so the window covers the whole
    /// bounding box. Returns an empty window when there is no overlap or the
    /// transform is singular.
    pub fn from_bounds(bounds: &Bounds, transform: &Affine, raster_width: u32, raster_height: u32) -> Self {
        let empty = Self {
            col_off: 0,
            row_off: 0,
            width: 0,
            height: 0,
        };
        let Some(inverse) = transform.inverse() else {
            return empty;
        };

        let corners = [
            inverse.apply(bounds.min_x, bounds.max_y),
            inverse.apply(bounds.max_x, bounds.max_y),
            inverse.apply(bounds.min_x, bounds.min_y),
            inverse.apply(bounds.max_x, bounds.min_y),
        ];
        let col_min = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let col_max = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let row_min = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let row_max = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        if !(col_min.is_finite() && col_max.is_finite() && row_min.is_finite() && row_max.is_finite()) {
            return empty;
        }

        let col_start = (col_min + WINDOW_EPSILON).floor().clamp(0.0, raster_width as f64);
        let col_stop = (col_max - WINDOW_EPSILON).ceil().clamp(0.0, raster_width as f64);
        let row_start = (row_min + WINDOW_EPSILON).floor().clamp(0.0, raster_height as f64);
        let row_stop = (row_max - WINDOW_EPSILON).ceil().clamp(0.0, raster_height as f64);

        if col_stop <= col_start || row_stop <= row_start {
            return empty;
        }

        Self {
            col_off: col_start as u32,
            row_off: row_start as u32,
            width: (col_stop - col_start) as u32,
            height: (row_stop - row_start) as u32,
        }
    }
}

/// Band-major sample storage, in the raster's native type.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::I16(v) => v.len(),
            Samples::U32(v) => v.len(),
            Samples::I32(v) => v.len(),
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample type name, numpy style.
    pub fn type_name(&self) -> &'static str {
        match self {
            Samples::U8(_) => "uint8",
            Samples::U16(_) => "uint16",
            Samples::I16(_) => "int16",
            Samples::U32(_) => "uint32",
            Samples::I32(_) => "int32",
            Samples::F32(_) => "float32",
            Samples::F64(_) => "float64",
        }
    }

    /// Sample `index` widened to `f64`.
    pub fn value_f64(&self, index: usize) -> f64 {
        match self {
            Samples::U8(v) => v[index] as f64,
            Samples::U16(v) => v[index] as f64,
            Samples::I16(v) => v[index] as f64,
            Samples::U32(v) => v[index] as f64,
            Samples::I32(v) => v[index] as f64,
            Samples::F32(v) => v[index] as f64,
            Samples::F64(v) => v[index],
        }
    }
}

/// Pixel data laid out as bands x height x width.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    bands: usize,
    height: usize,
    width: usize,
    samples: Samples,
}

impl PixelArray {
    /// Wrap samples, checking the length matches the shape.
    pub fn new(bands: usize, height: usize, width: usize, samples: Samples) -> Result<Self> {
        let expected = bands * height * width;
        if samples.len() != expected {
            return Err(ImageryError::UnsupportedDataType(format!(
                "{} samples do not fill {bands}x{height}x{width}",
                samples.len()
            )));
        }
        Ok(Self {
            bands,
            height,
            width,
            samples,
        })
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// `(bands, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.bands, self.height, self.width)
    }

    /// Typed sample storage.
    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// One band widened to `f64`, row-major.
    pub fn band_f64(&self, band: usize) -> Vec<f64> {
        let plane = self.height * self.width;
        (band * plane..(band + 1) * plane)
            .map(|i| self.samples.value_f64(i))
            .collect()
    }
}

/// Georeferencing of a raster or window.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// Number of bands.
    pub bands: u32,
    /// Pixel to world transform.
    pub transform: Affine,
    /// CRS of the world coordinates, if the file declares one.
    pub crs: Option<Epsg>,
    /// No-data value.
    pub nodata: Option<f64>,
}

impl Profile {
    /// Fractional `(col, row)` of a world coordinate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.transform.inverse().map(|inv| inv.apply(x, y))
    }

    /// World bounds of the full extent.
    pub fn bounds(&self) -> Bounds {
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(self.width as f64, 0.0),
            self.transform.apply(0.0, self.height as f64),
            self.transform.apply(self.width as f64, self.height as f64),
        ];
        Bounds::new(
            corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min),
            corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min),
            corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max),
            corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max),
        )
    }

    /// Profile of a window read from this raster.
    pub fn windowed(&self, window: &Window) -> Self {
        Self {
            width: window.width,
            height: window.height,
            transform: self.transform.window_transform(window),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn transform() -> Affine {
        // 3 m pixels, upper-left at (1000, 5000)
        Affine::north_up(1000.0, 5000.0, 3.0, 3.0)
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Affine {
            a: 2.0,
            b: 0.5,
            c: 10.0,
            d: -0.25,
            e: -3.0,
            f: 20.0,
        };
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(7.0, 11.0);
        let (col, row) = inv.apply(x, y);
        assert_abs_diff_eq!(col, 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row, 11.0, epsilon = 1e-9);
    }

    #[test]
    fn test_window_inside() {
        let bounds = Bounds::new(1030.0, 4940.0, 1060.0, 4970.0);
        let w = Window::from_bounds(&bounds, &transform(), 100, 100);
        assert_eq!(
            w,
            Window {
                col_off: 10,
                row_off: 10,
                width: 10,
                height: 10
            }
        );
    }

    #[test]
    fn test_window_fractional_edges_expand() {
        let bounds = Bounds::new(1031.0, 4941.0, 1059.0, 4969.0);
        let w = Window::from_bounds(&bounds, &transform(), 100, 100);
        assert_eq!((w.col_off, w.row_off, w.width, w.height), (10, 10, 10, 10));
    }

    #[test]
    fn test_window_clipped_to_raster() {
        let bounds = Bounds::new(970.0, 4970.0, 1015.0, 5030.0);
        let w = Window::from_bounds(&bounds, &transform(), 100, 100);
        assert_eq!((w.col_off, w.row_off, w.width, w.height), (0, 0, 5, 10));
    }

    #[test]
    fn test_window_outside_is_empty() {
        let bounds = Bounds::new(0.0, 0.0, 100.0, 100.0);
        assert!(Window::from_bounds(&bounds, &transform(), 100, 100).is_empty());
    }

    #[test]
    fn test_window_transform_and_profile() {
        let profile = Profile {
            width: 100,
            height: 100,
            bands: 3,
            transform: transform(),
            crs: Some(Epsg(3857)),
            nodata: None,
        };
        let window = Window {
            col_off: 10,
            row_off: 20,
            width: 5,
            height: 6,
        };
        let windowed = profile.windowed(&window);
        assert_eq!(windowed.width, 5);
        assert_eq!(windowed.height, 6);
        assert_eq!(windowed.transform.c, 1030.0);
        assert_eq!(windowed.transform.f, 4940.0);
        assert_eq!(windowed.bounds(), Bounds::new(1030.0, 4922.0, 1045.0, 4940.0));

        let (col, row) = windowed.world_to_pixel(1031.5, 4938.5).unwrap();
        assert_abs_diff_eq!(col, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(row, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_pixel_array_shape_checked() {
        assert!(PixelArray::new(3, 2, 2, Samples::U8(vec![0; 12])).is_ok());
        assert!(PixelArray::new(3, 2, 2, Samples::U8(vec![0; 11])).is_err());

        let array = PixelArray::new(2, 1, 2, Samples::U16(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(array.band_f64(1), vec![3.0, 4.0]);
        assert_eq!(array.samples().type_name(), "uint16");
    }
}
