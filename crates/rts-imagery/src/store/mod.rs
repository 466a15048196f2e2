//! Object stores holding basemap rasters.
//!
//! An [`ObjectStore`] lists object paths under a prefix and opens objects as
//! seekable readers. Remote objects are served through a [`BlockReader`] so a
//! windowed GeoTIFF read only fetches the byte ranges it touches.

mod block_reader;
mod gcs;
mod local;

pub use block_reader::{BlockReader, RangeSource, DEFAULT_BLOCK_SIZE};
pub use gcs::{discover_access_token, GcsOptions, GcsStore, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
pub use local::LocalStore;

use crate::Result;
use std::io::{Read, Seek};

/// A readable, seekable object handle. Dropping it releases the handle.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// A store of raster objects addressed by `/`-separated paths.
pub trait ObjectStore {
    /// Recursively list all object paths under `prefix` ending with `suffix`.
    fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>>;

    /// Open an object for reading.
    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>>;

    /// Human-readable location of a path, for logs.
    fn describe(&self, path: &str) -> String;
}
