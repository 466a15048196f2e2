//! Command-line arguments.

use crate::RunnerConfig;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Fetch basemap tiles for labeling Retrogressive Thaw Slumps.
#[derive(Debug, Parser)]
#[command(name = "rts-label", version, about)]
pub struct Cli {
    /// YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Values that take precedence over the config file.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Bucket holding the basemap rasters
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Prefix under which basemap rasters live
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Read rasters from a local mirror instead of the bucket
    #[arg(long, global = true)]
    pub local_root: Option<PathBuf>,

    /// Correspondence GeoJSON
    #[arg(long, global = true)]
    pub correspondence: Option<PathBuf>,

    /// Training dataset GeoJSON with positive features
    #[arg(long, global = true)]
    pub features: Option<PathBuf>,

    /// Work manifest CSV
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    /// AOI radius around the feature centroid, in metres
    #[arg(long, global = true)]
    pub buffer: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl Overrides {
    /// Apply the set values onto `config`.
    pub fn apply(&self, config: &mut RunnerConfig) {
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.search_prefix = prefix.clone();
        }
        if let Some(root) = &self.local_root {
            config.local_root = Some(root.clone());
        }
        if let Some(path) = &self.correspondence {
            config.correspondence_path = path.clone();
        }
        if let Some(path) = &self.features {
            config.features_path = path.clone();
        }
        if let Some(path) = &self.manifest {
            config.manifest_path = path.clone();
        }
        if let Some(buffer) = self.buffer {
            config.aoi_buffer_m = buffer;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a manifest with one row per positive feature UID
    CreateManifest {
        /// Manifest to write (defaults to the configured path)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Replace an existing manifest
        #[arg(long)]
        force: bool,
    },

    /// List the basemap bucket and report how many rasters are visible
    CheckAccess,

    /// Fetch the basemap tile around one feature
    FetchTile(FetchArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["uid", "next"])))]
pub struct FetchArgs {
    /// Feature UID to fetch
    #[arg(long)]
    pub uid: Option<String>,

    /// Claim the next unprocessed feature from the manifest
    #[arg(long, requires = "worker")]
    pub next: bool,

    /// Worker id recorded in the manifest
    #[arg(long)]
    pub worker: Option<String>,

    /// GeoTIFF to write (defaults to `<output_dir>/<uid>.tif`)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Also write an 8-bit RGB preview TIFF here
    #[arg(long)]
    pub preview: Option<PathBuf>,
}
