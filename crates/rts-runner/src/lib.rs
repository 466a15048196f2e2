//! # rts-runner
//!
//! Command-line runner tying the imagery pipeline to the labeling manifest.
//!
//! `rts-label create-manifest` seeds the manifest from the positive features,
//! `rts-label check-access` verifies the bucket can be listed, and
//! `rts-label fetch-tile` retrieves the basemap tile around a feature,
//! optionally claiming it from the manifest first.

pub mod cli;
pub mod commands;
mod config;
mod error;
mod pipeline;

pub use config::RunnerConfig;
pub use error::RunnerError;
pub use pipeline::{FetchedTile, LabelingSession};

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
