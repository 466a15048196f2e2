//! Reading an AOI window from the first usable candidate raster.

use crate::aoi::Aoi;
use crate::geotiff::{self, GeoTiffReader};
use crate::raster::{PixelArray, Profile, Window};
use crate::store::ObjectStore;
use crate::{ImageryError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info, warn};

/// Pixels read for an AOI, with the georeferencing of the window.
#[derive(Debug, Clone, PartialEq)]
pub struct TileResult {
    /// Source object the pixels came from.
    pub source: String,
    /// Band-major pixel data.
    pub pixels: PixelArray,
    /// Georeferencing of `pixels`.
    pub profile: Profile,
}

impl TileResult {
    /// Write the tile as a GeoTIFF at `path`.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        geotiff::write_geotiff(BufWriter::new(file), &self.pixels, &self.profile)?;
        info!("Saved {}x{} tile to {}", self.profile.width, self.profile.height, path.display());
        Ok(())
    }
}

/// Outcome of reading one candidate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Pixels were read.
    Success,
    /// The AOI does not overlap the raster.
    EmptyWindow,
    /// Opening, decoding or reprojection failed.
    Failed(String),
}

/// One candidate path and what happened when reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAttempt {
    /// Object path.
    pub path: String,
    /// Result of the attempt.
    pub outcome: AttemptOutcome,
}

/// Reads AOI windows from rasters in an object store.
///
/// Candidates are tried in order and the first that yields pixels wins. There
/// is no mosaicking across rasters and no retrying of a failed path.
pub struct TileReader<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> std::fmt::Debug for TileReader<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileReader").finish_non_exhaustive()
    }
}

impl<'a> TileReader<'a> {
    /// Create a reader over `store`.
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Pixels for `aoi` from the first path that covers it, or `None`.
    pub fn read_tile(&self, paths: &[String], aoi: &Aoi) -> Option<TileResult> {
        self.read_tile_with_attempts(paths, aoi).0
    }

    /// As [`TileReader::read_tile`], also reporting every attempt made.
    pub fn read_tile_with_attempts(&self, paths: &[String], aoi: &Aoi) -> (Option<TileResult>, Vec<ReadAttempt>) {
        let mut attempts = Vec::with_capacity(paths.len());

        for path in paths {
            let location = self.store.describe(path);
            info!("Attempting to read from {}", location);

            let outcome = match self.read_one(path, aoi) {
                Ok(tile) => {
                    info!(
                        "Successfully read {}x{} window from {}",
                        tile.profile.width, tile.profile.height, location
                    );
                    attempts.push(ReadAttempt {
                        path: path.clone(),
                        outcome: AttemptOutcome::Success,
                    });
                    return (Some(tile), attempts);
                }
                Err(ImageryError::EmptyWindow(_)) => {
                    debug!("AOI does not intersect {}", location);
                    AttemptOutcome::EmptyWindow
                }
                Err(e) => {
                    warn!("Error reading from {}: {}", location, e);
                    AttemptOutcome::Failed(e.to_string())
                }
            };
            attempts.push(ReadAttempt {
                path: path.clone(),
                outcome,
            });
        }

        warn!("Could not read a tile from any of {} path(s)", paths.len());
        (None, attempts)
    }

    fn read_one(&self, path: &str, aoi: &Aoi) -> Result<TileResult> {
        // The handle lives only for this attempt
        let mut reader = GeoTiffReader::open(self.store.open(path)?)?;
        let profile = reader.profile().clone();

        let crs = profile
            .crs
            .ok_or_else(|| ImageryError::InvalidGeoTiff(format!("{path} declares no EPSG coordinate system")))?;
        let aoi = if crs != aoi.crs() {
            debug!("Reprojecting AOI from {} to {}", aoi.crs(), crs);
            aoi.to_crs(crs)?
        } else {
            aoi.clone()
        };
        let bounds = aoi
            .bounds()
            .ok_or_else(|| ImageryError::EmptyWindow(format!("{path}: AOI has no extent")))?;

        let window = Window::from_bounds(&bounds, &profile.transform, profile.width, profile.height);
        if window.is_empty() {
            return Err(ImageryError::EmptyWindow(path.to_string()));
        }

        let pixels = reader.read_window(&window)?;
        Ok(TileResult {
            source: path.to_string(),
            pixels,
            profile: profile.windowed(&window),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::Bounds;
    use crate::crs::Epsg;
    use crate::raster::{Affine, Samples};
    use crate::store::ReadSeek;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// In-memory store holding encoded GeoTIFFs.
    #[derive(Default)]
    struct MemoryStore {
        objects: HashMap<String, Vec<u8>>,
    }

    impl MemoryStore {
        fn put_raster(&mut self, path: &str, origin_x: f64, origin_y: f64) {
            self.put_raster_in(path, origin_x, origin_y, Some(Epsg(3413)));
        }

        fn put_raster_in(&mut self, path: &str, origin_x: f64, origin_y: f64, crs: Option<Epsg>) {
            let (width, height) = (20usize, 10usize);
            let samples = (0..width * height).map(|i| (i % 250) as u8 + 1).collect();
            let pixels = PixelArray::new(1, height, width, Samples::U8(samples)).unwrap();
            let profile = Profile {
                width: width as u32,
                height: height as u32,
                bands: 1,
                transform: Affine::north_up(origin_x, origin_y, 10.0, 10.0),
                crs,
                nodata: None,
            };
            let mut buf = Cursor::new(Vec::new());
            geotiff::write_geotiff(&mut buf, &pixels, &profile).unwrap();
            self.objects.insert(path.to_string(), buf.into_inner());
        }
    }

    impl ObjectStore for MemoryStore {
        fn list(&self, _prefix: &str, suffix: &str) -> Result<Vec<String>> {
            Ok(self.objects.keys().filter(|k| k.ends_with(suffix)).cloned().collect())
        }

        fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>> {
            self.objects
                .get(path)
                .map(|bytes| Box::new(Cursor::new(bytes.clone())) as Box<dyn ReadSeek>)
                .ok_or_else(|| ImageryError::NotFound(path.to_string()))
        }

        fn describe(&self, path: &str) -> String {
            format!("mem://{path}")
        }
    }

    fn aoi() -> Aoi {
        Aoi::from_bounds(Bounds::new(1040.0, 1930.0, 1080.0, 1970.0), Epsg(3413))
    }

    #[test]
    fn test_first_success_wins() {
        let mut store = MemoryStore::default();
        store.put_raster("far.tif", 90_000.0, 90_000.0);
        store.put_raster("near.tif", 1000.0, 2000.0);
        store.put_raster("also_near.tif", 1000.0, 2000.0);
        store.objects.insert("broken.tif".to_string(), b"not a tiff".to_vec());

        let paths: Vec<String> = ["broken.tif", "far.tif", "near.tif", "also_near.tif"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let reader = TileReader::new(&store);
        let (tile, attempts) = reader.read_tile_with_attempts(&paths, &aoi());

        let tile = tile.unwrap();
        assert_eq!(tile.source, "near.tif");
        assert_eq!(tile.pixels.shape(), (1, 4, 4));
        assert_eq!(tile.profile.transform.c, 1040.0);
        assert_eq!(tile.profile.transform.f, 1970.0);
        assert_eq!(tile.profile.crs, Some(Epsg(3413)));

        assert_eq!(attempts.len(), 3);
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed(_)));
        assert_eq!(attempts[1].outcome, AttemptOutcome::EmptyWindow);
        assert_eq!(attempts[2].outcome, AttemptOutcome::Success);
    }

    #[test]
    fn test_exhaustion_is_none() {
        let mut store = MemoryStore::default();
        store.put_raster("far.tif", 90_000.0, 90_000.0);
        let paths = vec!["far.tif".to_string(), "missing.tif".to_string()];

        let reader = TileReader::new(&store);
        let (tile, attempts) = reader.read_tile_with_attempts(&paths, &aoi());
        assert!(tile.is_none());
        assert_eq!(attempts[0].outcome, AttemptOutcome::EmptyWindow);
        assert!(matches!(attempts[1].outcome, AttemptOutcome::Failed(_)));

        assert!(reader.read_tile(&[], &aoi()).is_none());
    }

    #[test]
    fn test_partial_overlap_is_clipped() {
        let mut store = MemoryStore::default();
        store.put_raster("edge.tif", 1000.0, 2000.0);
        let overhanging = Aoi::from_bounds(Bounds::new(1150.0, 1950.0, 1250.0, 2050.0), Epsg(3413));

        let tile = TileReader::new(&store)
            .read_tile(&["edge.tif".to_string()], &overhanging)
            .unwrap();
        assert_eq!(tile.pixels.shape(), (1, 5, 5));
        assert_eq!(tile.profile.transform.c, 1150.0);
        assert_eq!(tile.profile.transform.f, 2000.0);
    }

    #[test]
    fn test_raster_without_crs_is_skipped() {
        let mut store = MemoryStore::default();
        store.put_raster_in("unlabeled.tif", 1000.0, 2000.0, None);
        store.put_raster("labeled.tif", 1000.0, 2000.0);
        let paths = vec!["unlabeled.tif".to_string(), "labeled.tif".to_string()];

        let (tile, attempts) = TileReader::new(&store).read_tile_with_attempts(&paths, &aoi());
        assert_eq!(tile.unwrap().source, "labeled.tif");
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed(_)));
        assert_eq!(attempts[1].outcome, AttemptOutcome::Success);

        let degrees = Aoi::from_bounds(Bounds::new(2.0, 2.0, 5.0, 5.0), Epsg(4326));
        let only_unlabeled = vec!["unlabeled.tif".to_string()];
        assert!(TileReader::new(&store).read_tile(&only_unlabeled, &degrees).is_none());
    }
}
