//! In-memory index of basemap raster paths.
//!
//! The bucket holds many thousands of quad rasters nested by mosaic quarter.
//! Listing it is slow, so the index lists once per session and every lookup
//! afterwards is an in-memory scan. The index is never refreshed; objects
//! added to the store after construction are not seen.

use crate::store::ObjectStore;
use crate::years::CandidateImage;
use crate::{ImageryError, Result};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Literal marking tiled mosaic outputs in basemap filenames.
pub const QUAD_MARKER: &str = "quad";

/// Raster file suffix indexed by [`PathIndex::build`].
pub const RASTER_SUFFIX: &str = ".tif";

/// Decides whether a stored path holds imagery for a candidate.
pub trait PathMatcher {
    /// Whether `path` matches `candidate`.
    fn matches(&self, path: &str, candidate: &CandidateImage) -> bool;
}

/// Substring heuristic: the path contains the year, the image id and a marker.
///
/// The mapping from image id to the bucket's folder and file naming is not
/// fully known, so this is deliberately permissive.
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    marker: String,
}

impl SubstringMatcher {
    /// Match with a custom marker.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for SubstringMatcher {
    fn default() -> Self {
        Self::new(QUAD_MARKER)
    }
}

impl PathMatcher for SubstringMatcher {
    fn matches(&self, path: &str, candidate: &CandidateImage) -> bool {
        path.contains(&candidate.year.to_string())
            && path.contains(candidate.image_id.as_str())
            && path.contains(self.marker.as_str())
    }
}

impl<F> PathMatcher for F
where
    F: Fn(&str, &CandidateImage) -> bool,
{
    fn matches(&self, path: &str, candidate: &CandidateImage) -> bool {
        self(path, candidate)
    }
}

/// A flat, sorted set of object paths.
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    paths: Vec<String>,
}

impl PathIndex {
    /// List every raster under `prefix` once.
    ///
    /// Any listing failure (authentication, network, missing prefix) is an
    /// [`ImageryError::Initialization`]: nothing downstream works without the index.
    pub fn build(store: &dyn ObjectStore, prefix: &str) -> Result<Self> {
        let location = store.describe(prefix);
        info!("Pre-fetching all raster paths from {}...", location);

        let paths = store
            .list(prefix, RASTER_SUFFIX)
            .map_err(|e| ImageryError::Initialization {
                location: location.clone(),
                reason: e.to_string(),
            })?;

        let index = Self::from_paths(paths);
        info!("Found {} raster file(s) under {}", index.len(), location);
        Ok(index)
    }

    /// Build an index from known paths.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        Self {
            paths: unique.into_iter().collect(),
        }
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// All indexed paths, sorted.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Paths matching any candidate under the default [`SubstringMatcher`].
    pub fn find(&self, candidates: &[CandidateImage]) -> Vec<String> {
        self.find_with(candidates, &SubstringMatcher::default())
    }

    /// Paths matching any candidate, sorted and without duplicates.
    pub fn find_with(&self, candidates: &[CandidateImage], matcher: &dyn PathMatcher) -> Vec<String> {
        let found: BTreeSet<&String> = candidates
            .iter()
            .flat_map(|candidate| {
                self.paths
                    .iter()
                    .filter(move |path| matcher.matches(path, candidate))
            })
            .collect();

        let found: Vec<String> = found.into_iter().cloned().collect();
        debug!("Found {} matching image path(s): {:?}", found.len(), found);
        found
    }
}
