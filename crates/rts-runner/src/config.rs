//! YAML configuration for the runner.

use crate::{Result, RunnerError};
use rts_imagery::{discover_access_token, CrsPolicy, GcsOptions, GcsStore, LocalStore, ObjectStore, QUAD_MARKER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Runner settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Google Cloud project billed for bucket access.
    pub project_id: Option<String>,
    /// Bucket holding the basemap rasters.
    pub bucket: String,
    /// Prefix under which all basemap rasters live.
    pub search_prefix: String,
    /// Read rasters from this local mirror instead of the bucket.
    pub local_root: Option<PathBuf>,
    /// UID to basemap correspondence GeoJSON.
    pub correspondence_path: PathBuf,
    /// Training dataset GeoJSON with `TrainClass`.
    pub features_path: PathBuf,
    /// Work manifest CSV.
    pub manifest_path: PathBuf,
    /// Directory for fetched tiles.
    pub output_dir: PathBuf,
    /// Radius of the AOI around the feature centroid, in metres.
    pub aoi_buffer_m: f64,
    /// Literal every basemap quad path contains.
    pub quad_marker: String,
    /// Timeout for each request to the bucket.
    pub request_timeout_secs: u64,
    /// OAuth2 token; discovered from the environment or gcloud when absent.
    pub access_token: Option<String>,
    /// Handling of a correspondence table declared in another CRS.
    pub crs_policy: CrsPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            project_id: Some("abruptthawmapping".to_string()),
            bucket: "abrupt_thaw".to_string(),
            search_prefix: "planet_basemaps/global_quarterly_COGs".to_string(),
            local_root: None,
            correspondence_path: PathBuf::from("data/raw/planet_basemaps_rts_polygon_basemap_correspondence.geojson"),
            features_path: PathBuf::from("data/raw/ARTS_main_dataset_v.3.1.0.geojson"),
            manifest_path: PathBuf::from("manifest.csv"),
            output_dir: PathBuf::from("tiles"),
            aoi_buffer_m: 384.0,
            quad_marker: QUAD_MARKER.to_string(),
            request_timeout_secs: 60,
            access_token: None,
            crs_policy: CrsPolicy::Override,
        }
    }
}

impl RunnerConfig {
    /// Load a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| RunnerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Open the configured raster store: the local mirror if set, else the bucket.
    pub fn open_store(&self) -> Result<Box<dyn ObjectStore>> {
        if let Some(root) = &self.local_root {
            info!("Using local basemap mirror at {}", root.display());
            return Ok(Box::new(LocalStore::new(root)));
        }

        let access_token = self.access_token.clone().or_else(discover_access_token);
        if access_token.is_none() {
            info!("No access token found, using anonymous access");
        }
        let options = GcsOptions {
            timeout: self.request_timeout(),
            access_token,
            project_id: self.project_id.clone(),
            ..GcsOptions::default()
        };
        info!("Connecting to gs://{}", self.bucket);
        Ok(Box::new(GcsStore::new(self.bucket.clone(), options)?))
    }
}
