//! Where change-scripts come from.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MigrateError, Result};

/// A collection of named change-scripts.
pub trait ScriptSource: Send + Sync {
    /// Lists the names of all entries in the source.
    fn list_names(&self) -> Result<Vec<String>>;

    /// Reads the whole content of one entry.
    fn read(&self, name: &str) -> Result<String>;
}

/// Change-scripts stored as files in a single directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    path: PathBuf,
}

impl DirectorySource {
    /// Creates a source over the given directory.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScriptSource for DirectorySource {
    fn list_names(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.path).map_err(|e| MigrateError::io(&self.path, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::io(&self.path, e))?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(name = ?name, "Skipping entry with a non UTF-8 name"),
            }
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.path.join(name);
        fs::read_to_string(&path).map_err(|e| MigrateError::io(path, e))
    }
}
