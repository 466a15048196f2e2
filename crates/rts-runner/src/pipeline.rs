//! The tile fetching pipeline for one labeling session.

use crate::{Result, RunnerConfig};
use geo::Point;
use rts_imagery::{
    feature_context, resolve_candidates, Aoi, CandidateImage, CorrespondenceTable, ImageryError, ObjectStore,
    PathIndex, PositiveFeatures, ReadAttempt, Reprojector, SubstringMatcher, TileReader, TileResult,
    CANONICAL_CRS,
};
use tracing::{debug, info, warn};

/// A tile fetched for a feature.
#[derive(Debug)]
pub struct FetchedTile {
    /// Feature identifier.
    pub uid: String,
    /// Basemap image and year the tile came from.
    pub candidate: CandidateImage,
    /// Pixels and georeferencing.
    pub tile: TileResult,
    /// Feature centroid in tile pixel coordinates, when a centroid is known.
    pub centroid_pixel: Option<(f64, f64)>,
    /// Every read attempted, across all candidates.
    pub attempts: Vec<ReadAttempt>,
}

/// Loaded inputs and the path index, built once and reused per feature.
pub struct LabelingSession {
    config: RunnerConfig,
    table: CorrespondenceTable,
    features: Option<PositiveFeatures>,
    store: Box<dyn ObjectStore>,
    index: PathIndex,
}

impl std::fmt::Debug for LabelingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelingSession")
            .field("records", &self.table.len())
            .field("features", &self.features.as_ref().map(PositiveFeatures::len))
            .field("indexed_paths", &self.index.len())
            .finish()
    }
}

impl LabelingSession {
    /// Load the correspondence table and features, and index the store.
    ///
    /// A missing features file is tolerated; AOIs then come from the
    /// correspondence footprints.
    pub fn open(config: RunnerConfig) -> Result<Self> {
        let table = CorrespondenceTable::load_with_policy(&config.correspondence_path, config.crs_policy)?;
        let features = match PositiveFeatures::load(&config.features_path) {
            Ok(features) => Some(features),
            Err(ImageryError::NotFound(what)) => {
                warn!("{} not found, using correspondence footprints as AOIs", what);
                None
            }
            Err(e) => return Err(e.into()),
        };
        let store = config.open_store()?;
        Self::with_store(config, table, features, store)
    }

    /// Assemble a session from loaded parts, building the path index.
    pub fn with_store(
        config: RunnerConfig,
        table: CorrespondenceTable,
        features: Option<PositiveFeatures>,
        store: Box<dyn ObjectStore>,
    ) -> Result<Self> {
        let index = PathIndex::build(store.as_ref(), &config.search_prefix)?;
        Ok(Self {
            config,
            table,
            features,
            store,
            index,
        })
    }

    /// The path index.
    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Fetch a tile for `uid` from the first candidate image that yields one.
    ///
    /// Returns `Ok(None)` when no candidate image produced a tile.
    pub fn fetch(&self, uid: &str) -> Result<Option<FetchedTile>> {
        let candidates = resolve_candidates(uid, &self.table);
        if candidates.is_empty() {
            warn!("No basemap candidates for UID {}", uid);
            return Ok(None);
        }

        let centroid = self.centroid(uid)?;
        let matcher = SubstringMatcher::new(self.config.quad_marker.as_str());
        let reader = TileReader::new(self.store.as_ref());
        let mut attempts = Vec::new();

        for candidate in candidates {
            info!("Trying image {} for UID {}", candidate, uid);
            let Some(aoi) = self.aoi_for(uid, &candidate, centroid) else {
                warn!("No AOI for UID {} in image {}", uid, candidate);
                continue;
            };

            let paths = self.index.find_with(std::slice::from_ref(&candidate), &matcher);
            if paths.is_empty() {
                warn!("No raster paths match image {}", candidate);
                continue;
            }

            let (tile, tried) = reader.read_tile_with_attempts(&paths, &aoi);
            attempts.extend(tried);
            let Some(tile) = tile else {
                continue;
            };

            let centroid_pixel = centroid.and_then(|point| pixel_of(point, &tile));
            if let Some((col, row)) = centroid_pixel {
                info!("Feature centroid is at pixel ({:.1}, {:.1}) of the tile", col, row);
            }
            return Ok(Some(FetchedTile {
                uid: uid.to_string(),
                candidate,
                tile,
                centroid_pixel,
                attempts,
            }));
        }

        warn!("Could not retrieve a tile for UID {} from any candidate image", uid);
        Ok(None)
    }

    /// Feature centroid in the canonical CRS, if the loaded features list the UID.
    fn centroid(&self, uid: &str) -> Result<Option<Point<f64>>> {
        let Some(features) = &self.features else {
            return Ok(None);
        };
        let context = match feature_context(uid, features) {
            Ok(context) => context,
            Err(ImageryError::NotFound(what)) => {
                warn!("{}, using correspondence footprints as AOIs", what);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        debug!("UID {} has {} historical polygon(s)", uid, context.geometries.len());

        let (x, y) = Reprojector::new(context.crs, CANONICAL_CRS)?
            .transform(context.centroid.x(), context.centroid.y())?;
        Ok(Some(Point::new(x, y)))
    }

    /// Buffered centroid, else the correspondence footprint for this image and year.
    fn aoi_for(&self, uid: &str, candidate: &CandidateImage, centroid: Option<Point<f64>>) -> Option<Aoi> {
        if let Some(center) = centroid {
            return Some(Aoi::buffered_point(center, self.config.aoi_buffer_m, CANONICAL_CRS));
        }
        self.table
            .records_matching(uid, &candidate.image_id, candidate.year)
            .find_map(|record| record.geometry.as_ref())
            .and_then(|geometry| Aoi::try_from((geometry, self.table.crs())).ok())
    }
}

/// Pixel position of a canonical-CRS point in the tile.
fn pixel_of(point: Point<f64>, tile: &TileResult) -> Option<(f64, f64)> {
    let (x, y) = match tile.profile.crs {
        Some(crs) if crs != CANONICAL_CRS => Reprojector::new(CANONICAL_CRS, crs)
            .and_then(|r| r.transform(point.x(), point.y()))
            .ok()?,
        _ => (point.x(), point.y()),
    };
    tile.profile.world_to_pixel(x, y)
}
