//! Error types for the runner.

use rts_imagery::ImageryError;
use rts_manifest::ManifestError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a runner command.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Imagery lookup or reading failed.
    #[error(transparent)]
    Imagery(#[from] ImageryError),

    /// Manifest could not be read, written or updated.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Configuration file could not be read.
    #[error("Failed to read config {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for [`crate::RunnerConfig`].
    #[error("Invalid config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The manifest has no unprocessed rows left.
    #[error("No unprocessed features left in {}", .0.display())]
    ManifestExhausted(PathBuf),

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
