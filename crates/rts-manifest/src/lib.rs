//! # rts-manifest
//!
//! A CSV manifest of labeling work, one row per RTS feature UID.
//!
//! Columns are `uid`, `labeling_status`, `worker_id`, `start_time_utc`,
//! `end_time_utc`, `output_filename` and `notes`. A fresh manifest has every
//! row `unprocessed` with the other columns empty. Workers claim a row, which
//! moves it to `in_progress`, and finish it as `completed` or `skipped`.
//!
//! ```no_run
//! use chrono::Utc;
//! use rts_manifest::Manifest;
//!
//! let mut manifest = Manifest::load("manifest.csv")?;
//! if let Some(uid) = manifest.next_unprocessed().map(|row| row.uid.clone()) {
//!     manifest.claim(&uid, "worker-1", Utc::now())?;
//!     manifest.complete(&uid, "labels/abc.tif", Utc::now())?;
//!     manifest.save("manifest.csv")?;
//! }
//! # Ok::<(), rts_manifest::ManifestError>(())
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// I/O error reading or writing the manifest.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The UID has no row in the manifest.
    #[error("UID {0} is not in the manifest")]
    UnknownUid(String),

    /// Refusing to replace an existing manifest.
    #[error("Manifest already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The row's current status does not allow the change.
    #[error("UID {uid} is {status}, cannot {action}")]
    InvalidTransition {
        /// Row being changed.
        uid: String,
        /// Its current status.
        status: LabelingStatus,
        /// Attempted operation.
        action: &'static str,
    },
}

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Progress of one feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelingStatus {
    #[default]
    Unprocessed,
    InProgress,
    Completed,
    Skipped,
}

impl fmt::Display for LabelingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LabelingStatus::Unprocessed => "unprocessed",
            LabelingStatus::InProgress => "in_progress",
            LabelingStatus::Completed => "completed",
            LabelingStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub uid: String,
    pub labeling_status: LabelingStatus,
    pub worker_id: Option<String>,
    pub start_time_utc: Option<DateTime<Utc>>,
    pub end_time_utc: Option<DateTime<Utc>>,
    pub output_filename: Option<String>,
    pub notes: Option<String>,
}

impl ManifestRow {
    /// Unprocessed row for `uid`.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            labeling_status: LabelingStatus::Unprocessed,
            worker_id: None,
            start_time_utc: None,
            end_time_utc: None,
            output_filename: None,
            notes: None,
        }
    }
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub unprocessed: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    /// All rows.
    pub fn total(&self) -> usize {
        self.unprocessed + self.in_progress + self.completed + self.skipped
    }
}

/// The labeling manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

impl Manifest {
    /// One unprocessed row per distinct UID, in first-seen order.
    pub fn from_uids<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let rows = uids
            .into_iter()
            .map(Into::into)
            .filter(|uid: &String| seen.insert(uid.clone()))
            .map(ManifestRow::new)
            .collect();
        Self { rows }
    }

    /// Read a manifest CSV.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let rows = reader.deserialize().collect::<std::result::Result<Vec<ManifestRow>, _>>()?;
        debug!("Loaded {} manifest row(s) from {}", rows.len(), path.display());
        Ok(Self { rows })
    }

    /// Write the manifest CSV, replacing any existing file.
    ///
    /// The file is written beside the target and renamed into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let staging = staging_path(path);
        {
            let mut writer = csv::Writer::from_path(&staging)?;
            for row in &self.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&staging, path)?;
        debug!("Saved {} manifest row(s) to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Write a new manifest, refusing to replace an existing one unless `force`.
    pub fn create<P: AsRef<Path>>(&self, path: P, force: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ManifestError::AlreadyExists(path.to_path_buf()));
        }
        self.save(path)?;
        info!("Manifest with {} task(s) written to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// All rows.
    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the manifest has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for `uid`.
    pub fn get(&self, uid: &str) -> Option<&ManifestRow> {
        self.rows.iter().find(|row| row.uid == uid)
    }

    /// First row still waiting to be labeled.
    pub fn next_unprocessed(&self) -> Option<&ManifestRow> {
        self.rows
            .iter()
            .find(|row| row.labeling_status == LabelingStatus::Unprocessed)
    }

    /// Assign `uid` to `worker`.
    pub fn claim(&mut self, uid: &str, worker: &str, now: DateTime<Utc>) -> Result<&ManifestRow> {
        let row = self.row_mut(uid)?;
        if row.labeling_status != LabelingStatus::Unprocessed {
            return Err(ManifestError::InvalidTransition {
                uid: uid.to_string(),
                status: row.labeling_status,
                action: "claim",
            });
        }
        row.labeling_status = LabelingStatus::InProgress;
        row.worker_id = Some(worker.to_string());
        row.start_time_utc = Some(now);
        row.end_time_utc = None;
        Ok(row)
    }

    /// Mark `uid` labeled, with the file holding its output.
    pub fn complete(&mut self, uid: &str, output_filename: &str, now: DateTime<Utc>) -> Result<&ManifestRow> {
        let row = self.finishable_row(uid, "complete")?;
        row.labeling_status = LabelingStatus::Completed;
        row.output_filename = Some(output_filename.to_string());
        row.end_time_utc = Some(now);
        Ok(row)
    }

    /// Mark `uid` skipped with a reason.
    pub fn skip(&mut self, uid: &str, notes: &str, now: DateTime<Utc>) -> Result<&ManifestRow> {
        let row = self.finishable_row(uid, "skip")?;
        row.labeling_status = LabelingStatus::Skipped;
        row.notes = Some(notes.to_string());
        row.end_time_utc = Some(now);
        Ok(row)
    }

    /// Rows per status.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for row in &self.rows {
            match row.labeling_status {
                LabelingStatus::Unprocessed => counts.unprocessed += 1,
                LabelingStatus::InProgress => counts.in_progress += 1,
                LabelingStatus::Completed => counts.completed += 1,
                LabelingStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    fn row_mut(&mut self, uid: &str) -> Result<&mut ManifestRow> {
        self.rows
            .iter_mut()
            .find(|row| row.uid == uid)
            .ok_or_else(|| ManifestError::UnknownUid(uid.to_string()))
    }

    fn finishable_row(&mut self, uid: &str, action: &'static str) -> Result<&mut ManifestRow> {
        let row = self.row_mut(uid)?;
        match row.labeling_status {
            LabelingStatus::Unprocessed | LabelingStatus::InProgress => Ok(row),
            status => Err(ManifestError::InvalidTransition {
                uid: uid.to_string(),
                status,
                action,
            }),
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
