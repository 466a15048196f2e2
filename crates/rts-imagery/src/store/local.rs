//! Local directory store, for mirrored basemaps and tests.

use super::{ObjectStore, ReadSeek};
use crate::{ImageryError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Objects stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }
}

impl ObjectStore for LocalStore {
    fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>> {
        let base = self.root.join(prefix.trim_matches('/'));
        if !base.is_dir() {
            return Err(ImageryError::NotFound(format!("directory {}", base.display())));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = self.key_for(entry.path()) {
                if key.ends_with(suffix) {
                    paths.push(key);
                }
            }
        }
        Ok(paths)
    }

    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>> {
        let file = File::open(self.root.join(path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn describe(&self, path: &str) -> String {
        self.root.join(path).display().to_string()
    }
}
