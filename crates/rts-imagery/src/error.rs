//! Error types for the imagery crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or reading basemap imagery.
#[derive(Debug, Error)]
pub enum ImageryError {
    /// An input file, feature or object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A geospatial input could not be parsed.
    #[error("Failed to load {}: {reason}", .path.display())]
    Load {
        /// File that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The remote path index could not be built. Fatal for the session.
    #[error("Failed to initialize path index for {location}: {reason}")]
    Initialization {
        /// Bucket and prefix being listed.
        location: String,
        /// Underlying failure.
        reason: String,
    },

    /// I/O error reading a file or remote object.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// HTTP request error when talking to the object store.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store answered with a non-success status.
    #[error("Object store returned HTTP {status} for {url}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Object store location or endpoint is malformed.
    #[error("Invalid object store configuration: {0}")]
    Config(String),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported sample type or band layout.
    #[error("Unsupported raster data: {0}")]
    UnsupportedDataType(String),

    /// Coordinate transformation failed.
    #[error("Projection error: {0}")]
    Projection(String),

    /// The area of interest does not overlap the raster.
    #[error("Area of interest does not overlap raster {0}")]
    EmptyWindow(String),

    /// A mask or array does not have the expected shape.
    #[error("Shape mismatch: expected {expected_height}x{expected_width}, got {height}x{width}")]
    ShapeMismatch {
        /// Expected rows.
        expected_height: usize,
        /// Expected columns.
        expected_width: usize,
        /// Actual rows.
        height: usize,
        /// Actual columns.
        width: usize,
    },
}
