//! Example: Read an AOI window from a local basemap mirror.
//!
//! Usage: cargo run --example read_tile -- <root> <prefix> <x> <y> [buffer_m] [output.tif]

use geo::Point;
use rts_imagery::{Aoi, LocalStore, PathIndex, TileReader, CANONICAL_CRS};
use std::env;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 5 {
        eprintln!("Usage: {} <root> <prefix> <x> <y> [buffer_m] [output.tif]", args[0]);
        eprintln!(
            "Example: {} ./mirror planet_basemaps/global_quarterly_COGs -2250000 450000 384",
            args[0]
        );
        std::process::exit(1);
    }

    let root = &args[1];
    let prefix = &args[2];
    let x: f64 = args[3].parse().expect("Invalid x coordinate");
    let y: f64 = args[4].parse().expect("Invalid y coordinate");
    let buffer: f64 = args.get(5).map(|s| s.parse().expect("Invalid buffer")).unwrap_or(384.0);

    println!("Indexing rasters under {}/{}...", root, prefix);
    let start = Instant::now();
    let store = LocalStore::new(root);
    let index = PathIndex::build(&store, prefix).expect("Failed to index rasters");
    println!("Indexed {} rasters in {:.3}s", index.len(), start.elapsed().as_secs_f64());

    let aoi = Aoi::buffered_point(Point::new(x, y), buffer, CANONICAL_CRS);
    let reader = TileReader::new(&store);

    let query_start = Instant::now();
    let (tile, attempts) = reader.read_tile_with_attempts(index.paths(), &aoi);
    for attempt in &attempts {
        println!("  {} -> {:?}", attempt.path, attempt.outcome);
    }

    match tile {
        Some(tile) => {
            let (bands, height, width) = tile.pixels.shape();
            println!(
                "Read {} band(s) of {}x{} from {} in {:.2}s",
                bands,
                width,
                height,
                tile.source,
                query_start.elapsed().as_secs_f64()
            );
            if let Some(output) = args.get(6) {
                tile.write_geotiff(output).expect("Failed to write tile");
                println!("Saved to {}", output);
            }
        }
        None => {
            eprintln!("No raster covers ({}, {})", x, y);
            std::process::exit(1);
        }
    }
}
