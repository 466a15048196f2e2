//! Subcommand implementations.

use crate::cli::{Cli, Command, FetchArgs};
use crate::pipeline::{FetchedTile, LabelingSession};
use crate::{Result, RunnerConfig, RunnerError};
use chrono::Utc;
use rts_imagery::{stretch_rgb, PathIndex, PositiveFeatures};
use rts_manifest::Manifest;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file values with command-line overrides applied.
pub fn resolve_config(cli: &Cli) -> Result<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    cli.overrides.apply(&mut config);
    Ok(config)
}

/// Run the parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    match cli.command {
        Command::CreateManifest { output, force } => {
            let output = output.unwrap_or_else(|| config.manifest_path.clone());
            create_manifest(&config.features_path, &output, force)?;
        }
        Command::CheckAccess => {
            let count = check_access(&config)?;
            println!("Found {} raster file(s) under gs://{}/{}", count, config.bucket, config.search_prefix);
        }
        Command::FetchTile(args) => match fetch_tile(config, &args)? {
            Some(path) => println!("Tile written to {}", path.display()),
            None => println!("No tile could be retrieved"),
        },
    }
    Ok(())
}

/// Write a manifest with one unprocessed row per positive UID.
pub fn create_manifest(features_path: &Path, output: &Path, force: bool) -> Result<Manifest> {
    if output.exists() && !force {
        return Err(rts_manifest::ManifestError::AlreadyExists(output.to_path_buf()).into());
    }
    let features = PositiveFeatures::load(features_path)?;
    let manifest = Manifest::from_uids(features.unique_uids());
    info!("Found {} unique UID(s) in the positive class", manifest.len());
    manifest.create(output, force)?;
    Ok(manifest)
}

/// Build the path index and return its size.
pub fn check_access(config: &RunnerConfig) -> Result<usize> {
    let store = config.open_store()?;
    let index = PathIndex::build(store.as_ref(), &config.search_prefix)?;
    Ok(index.len())
}

/// Fetch one tile, by explicit UID or by claiming the next manifest row.
///
/// Returns the written GeoTIFF path, or `None` when no tile was found.
pub fn fetch_tile(config: RunnerConfig, args: &FetchArgs) -> Result<Option<PathBuf>> {
    let output_dir = config.output_dir.clone();

    if !args.next {
        let Some(uid) = args.uid.as_deref() else {
            return Ok(None);
        };
        let session = LabelingSession::open(config)?;
        return match session.fetch(uid)? {
            Some(fetched) => save_tile(&fetched, &output_dir, args).map(Some),
            None => Ok(None),
        };
    }

    let manifest_path = config.manifest_path.clone();
    let worker = args.worker.as_deref().unwrap_or("unknown");
    let mut manifest = Manifest::load(&manifest_path)?;
    let uid = manifest
        .next_unprocessed()
        .map(|row| row.uid.clone())
        .ok_or_else(|| RunnerError::ManifestExhausted(manifest_path.clone()))?;

    // Session failures abort before any row is claimed
    let session = LabelingSession::open(config)?;

    manifest.claim(&uid, worker, Utc::now())?;
    manifest.save(&manifest_path)?;
    info!("Worker {} claimed UID {}", worker, uid);

    let outcome = session
        .fetch(&uid)
        .and_then(|fetched| match fetched {
            Some(fetched) => save_tile(&fetched, &output_dir, args).map(Some),
            None => Ok(None),
        });

    match &outcome {
        Ok(Some(path)) => {
            manifest.complete(&uid, &path.to_string_lossy(), Utc::now())?;
        }
        Ok(None) => {
            manifest.skip(&uid, "no basemap tile found", Utc::now())?;
        }
        Err(e) => {
            warn!("Fetching UID {} failed: {}", uid, e);
            manifest.skip(&uid, &e.to_string(), Utc::now())?;
        }
    }
    manifest.save(&manifest_path)?;
    outcome
}

fn save_tile(fetched: &FetchedTile, output_dir: &Path, args: &FetchArgs) -> Result<PathBuf> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| output_dir.join(format!("{}.tif", fetched.uid)));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    fetched.tile.write_geotiff(&output)?;
    info!(
        "Tile for UID {} from image {} ({} read attempt(s))",
        fetched.uid,
        fetched.candidate,
        fetched.attempts.len()
    );

    if let Some(preview_path) = &args.preview {
        stretch_rgb(&fetched.tile.pixels)?.write_tiff(preview_path)?;
    }
    Ok(output)
}
