//! End-to-end runner tests against a local basemap mirror.

use rts_imagery::{Affine, Epsg, ImageryError, PixelArray, Profile, Samples};
use rts_manifest::{LabelingStatus, Manifest};
use rts_runner::cli::FetchArgs;
use rts_runner::commands::{check_access, create_manifest, fetch_tile};
use rts_runner::{LabelingSession, RunnerConfig, RunnerError};
use serde_json::json;
use std::fs;
use std::path::Path;

const PREFIX: &str = "planet_basemaps/global_quarterly_COGs";
const CENTER: (f64, f64) = (-2_250_000.0, 450_000.0);

fn polygon(cx: f64, cy: f64, half: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [cx - half, cy - half], [cx + half, cy - half], [cx + half, cy + half],
            [cx - half, cy + half], [cx - half, cy - half]
        ]]
    })
}

fn collection(features: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "EPSG:3413"}},
        "features": features
    })
}

/// Workspace with inputs for `slump-1` and a positive `slump-2` that has no imagery.
fn setup(root: &Path) -> RunnerConfig {
    let correspondence = collection(vec![json!({
        "type": "Feature",
        "properties": {"UID": "slump-1", "id": "L15-0420E-1234N", "planet_basemap_year": 2022},
        "geometry": polygon(CENTER.0, CENTER.1, 200.0)
    })]);
    let positives = collection(vec![
        json!({"type": "Feature", "properties": {"UID": "slump-1", "TrainClass": "Positive"},
               "geometry": polygon(CENTER.0, CENTER.1, 40.0)}),
        json!({"type": "Feature", "properties": {"UID": "slump-2", "TrainClass": "Positive"},
               "geometry": polygon(0.0, 0.0, 40.0)}),
        json!({"type": "Feature", "properties": {"UID": "slump-3", "TrainClass": "Negative"},
               "geometry": polygon(0.0, 0.0, 40.0)}),
    ]);
    fs::write(root.join("correspondence.geojson"), correspondence.to_string()).unwrap();
    fs::write(root.join("arts.geojson"), positives.to_string()).unwrap();

    let raster = root
        .join("mirror")
        .join(PREFIX)
        .join("2022q3")
        .join("L15-0420E-1234N_quad.tif");
    fs::create_dir_all(raster.parent().unwrap()).unwrap();
    let size = 512usize;
    let samples = (0..3 * size * size).map(|i| (i % 251) as u16 * 40).collect();
    let pixels = PixelArray::new(3, size, size, Samples::U16(samples)).unwrap();
    let profile = Profile {
        width: size as u32,
        height: size as u32,
        bands: 3,
        transform: Affine::north_up(CENTER.0 - 768.0, CENTER.1 + 768.0, 3.0, 3.0),
        crs: Some(Epsg(3413)),
        nodata: None,
    };
    rts_imagery::write_geotiff(fs::File::create(&raster).unwrap(), &pixels, &profile).unwrap();

    RunnerConfig {
        local_root: Some(root.join("mirror")),
        correspondence_path: root.join("correspondence.geojson"),
        features_path: root.join("arts.geojson"),
        manifest_path: root.join("manifest.csv"),
        output_dir: root.join("tiles"),
        ..RunnerConfig::default()
    }
}

fn next_args(root: &Path) -> FetchArgs {
    FetchArgs {
        uid: None,
        next: true,
        worker: Some("worker-1".to_string()),
        output: None,
        preview: Some(root.join("preview.tif")),
    }
}

#[test]
fn test_manifest_driven_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let config = setup(root);

    let manifest = create_manifest(&config.features_path, &config.manifest_path, false).unwrap();
    assert_eq!(manifest.len(), 2);
    assert!(matches!(
        create_manifest(&config.features_path, &config.manifest_path, false),
        Err(RunnerError::Manifest(_))
    ));

    assert_eq!(check_access(&config).unwrap(), 1);

    // slump-1 has imagery
    let written = fetch_tile(config.clone(), &next_args(root)).unwrap().unwrap();
    assert_eq!(written, root.join("tiles").join("slump-1.tif"));
    assert!(written.exists());
    assert!(root.join("preview.tif").exists());

    // slump-2 has no correspondence rows
    assert!(fetch_tile(config.clone(), &next_args(root)).unwrap().is_none());

    let manifest = Manifest::load(&config.manifest_path).unwrap();
    let first = manifest.get("slump-1").unwrap();
    assert_eq!(first.labeling_status, LabelingStatus::Completed);
    assert_eq!(first.worker_id.as_deref(), Some("worker-1"));
    assert!(first.output_filename.as_deref().unwrap().ends_with("slump-1.tif"));
    let second = manifest.get("slump-2").unwrap();
    assert_eq!(second.labeling_status, LabelingStatus::Skipped);
    assert!(second.notes.is_some());

    assert!(matches!(
        fetch_tile(config, &next_args(root)),
        Err(RunnerError::ManifestExhausted(_))
    ));
}

#[test]
fn test_fetch_by_uid_places_centroid_in_tile() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let session = LabelingSession::open(config).unwrap();
    assert_eq!(session.index().len(), 1);

    let fetched = session.fetch("slump-1").unwrap().unwrap();
    assert_eq!(fetched.candidate.year, 2022);
    assert_eq!(fetched.tile.pixels.shape(), (3, 256, 256));
    let (col, row) = fetched.centroid_pixel.unwrap();
    assert!((col - 128.0).abs() < 1e-6);
    assert!((row - 128.0).abs() < 1e-6);

    assert!(session.fetch("unknown-uid").unwrap().is_none());
}

#[test]
fn test_footprint_aoi_without_features() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.features_path = dir.path().join("missing.geojson");

    let session = LabelingSession::open(config).unwrap();
    let fetched = session.fetch("slump-1").unwrap().unwrap();
    // 400 m footprint at 3 m pixels
    let (_, height, width) = fetched.tile.pixels.shape();
    assert_eq!((width, height), (134, 134));
    assert!(fetched.centroid_pixel.is_none());
}

#[test]
fn test_unreachable_store_leaves_row_unclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut config = setup(root);
    create_manifest(&config.features_path, &config.manifest_path, false).unwrap();
    config.local_root = Some(root.join("no-mirror"));

    assert!(matches!(
        fetch_tile(config.clone(), &next_args(root)),
        Err(RunnerError::Imagery(ImageryError::Initialization { .. }))
    ));

    let manifest = Manifest::load(&config.manifest_path).unwrap();
    let row = manifest.get("slump-1").unwrap();
    assert_eq!(row.labeling_status, LabelingStatus::Unprocessed);
    assert!(row.worker_id.is_none());
    assert!(!root.join("tiles").join("slump-1.tif").exists());
}

#[test]
fn test_footprint_aoi_for_uid_missing_from_features() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let config = setup(root);
    let correspondence = collection(vec![
        json!({
            "type": "Feature",
            "properties": {"UID": "slump-1", "id": "L15-0420E-1234N", "planet_basemap_year": 2022},
            "geometry": polygon(CENTER.0, CENTER.1, 200.0)
        }),
        json!({
            "type": "Feature",
            "properties": {"UID": "slump-9", "id": "L15-0420E-1234N", "planet_basemap_year": 2022},
            "geometry": polygon(CENTER.0, CENTER.1, 200.0)
        }),
    ]);
    fs::write(&config.correspondence_path, correspondence.to_string()).unwrap();

    let session = LabelingSession::open(config).unwrap();
    let fetched = session.fetch("slump-9").unwrap().unwrap();
    let (_, height, width) = fetched.tile.pixels.shape();
    assert_eq!((width, height), (134, 134));
    assert!(fetched.centroid_pixel.is_none());

    // Listed UIDs still center on their feature
    assert!(session.fetch("slump-1").unwrap().unwrap().centroid_pixel.is_some());
}
