//! # rts-imagery
//!
//! Basemap imagery access for labeling Retrogressive Thaw Slumps (RTS).
//!
//! Given a feature UID, this crate works out which quarterly basemap images
//! show the feature, finds the matching cloud-optimized GeoTIFFs in an object
//! store, and reads just the window around the feature.
//!
//! ## Overview
//!
//! The pipeline has five stages:
//! - [`CorrespondenceTable`]: loads the GeoJSON mapping each UID to basemap
//!   image ids and years. Coordinates are treated as EPSG:3413.
//! - [`resolve_candidates`]: picks one year per UID (the latest year shared by
//!   all of its images, else the latest year overall) and returns the images
//!   to try.
//! - [`PathIndex`]: lists every `.tif` under the basemap prefix once, then
//!   matches candidates against paths in memory.
//! - [`TileReader`]: tries each path in order and returns the first AOI window
//!   that can be read, with its georeferencing.
//! - [`feature_context`]: collects a UID's polygons and the centroid of their
//!   union, used to place the AOI and prompts.
//!
//! Rasters live in an [`ObjectStore`]: [`GcsStore`] for Google Cloud Storage or
//! [`LocalStore`] for a mirrored directory.
//!
//! ## Example
//!
//! ```no_run
//! use rts_imagery::{
//!     feature_context, resolve_candidates, Aoi, CorrespondenceTable, GcsOptions, GcsStore,
//!     PathIndex, PositiveFeatures, TileReader, CANONICAL_CRS,
//! };
//!
//! let table = CorrespondenceTable::load("data/correspondence.geojson")?;
//! let features = PositiveFeatures::load("data/arts.geojson")?;
//! let store = GcsStore::new("abrupt_thaw", GcsOptions::default())?;
//! let index = PathIndex::build(&store, "planet_basemaps/global_quarterly_COGs")?;
//!
//! let uid = "6aff1955-71f5-5fa5-97d1-d9e006e4ec5c";
//! let context = feature_context(uid, &features)?;
//! let aoi = Aoi::buffered_point(context.centroid, 384.0, CANONICAL_CRS);
//!
//! let reader = TileReader::new(&store);
//! for candidate in resolve_candidates(uid, &table) {
//!     let paths = index.find(&[candidate]);
//!     if let Some(tile) = reader.read_tile(&paths, &aoi) {
//!         println!("Read {:?} from {}", tile.pixels.shape(), tile.source);
//!         tile.write_geotiff("tile.tif")?;
//!         break;
//!     }
//! }
//! # Ok::<(), rts_imagery::ImageryError>(())
//! ```

mod aoi;
mod correspondence;
mod crs;
mod error;
mod features;
mod geotiff;
mod path_index;
mod preview;
mod raster;
mod segment;
mod store;
mod tile;
mod years;

pub use aoi::{Aoi, Bounds, BUFFER_SEGMENTS};
pub use correspondence::{
    CorrespondenceRecord, CorrespondenceTable, CrsPolicy, IMAGE_ID_PROPERTY, UID_PROPERTY, YEAR_PROPERTY,
};
pub use crs::{declared_crs, Epsg, Reprojector, CANONICAL_CRS, WGS84};
pub use error::ImageryError;
pub use features::{feature_context, FeatureContext, PositiveFeature, PositiveFeatures, POSITIVE_CLASS, TRAIN_CLASS_PROPERTY};
pub use geotiff::{crs_from_geokeys, geokeys_for, write_geotiff, GeoTiffReader};
pub use path_index::{PathIndex, PathMatcher, SubstringMatcher, QUAD_MARKER, RASTER_SUFFIX};
pub use preview::{stretch_rgb, RgbPreview, STRETCH_HIGH_PERCENTILE, STRETCH_LOW_PERCENTILE};
pub use raster::{Affine, PixelArray, Profile, Samples, Window};
pub use segment::{run_segmenter, Mask, Prompt, Segmenter};
pub use store::{
    discover_access_token, BlockReader, GcsOptions, GcsStore, LocalStore, ObjectStore, RangeSource, ReadSeek,
    DEFAULT_BLOCK_SIZE, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT,
};
pub use tile::{AttemptOutcome, ReadAttempt, TileReader, TileResult};
pub use years::{resolve_candidates, CandidateImage};

/// Result type for imagery operations.
pub type Result<T> = std::result::Result<T, ImageryError>;
