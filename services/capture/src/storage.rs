//! Capture library: the directory holding one sub-directory per capture.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to create capture directory {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list captures in {path}: {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid capture name: {0:?}")]
    InvalidName(String),
}

/// One capture directory in the library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureEntry {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub struct CaptureLibrary {
    root: PathBuf,
}

impl CaptureLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (or reuse) the directory for capture `name`.
    pub fn make_capture_directory(&self, name: &str) -> Result<PathBuf, LibraryError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(LibraryError::InvalidName(name.to_string()));
        }

        let path = self.root.join(name);
        std::fs::create_dir_all(&path).map_err(|source| LibraryError::CreateFailed {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Capture directory ready");
        Ok(path)
    }

    /// Captures newest first. A missing library root lists as empty.
    pub fn list_captures(&self) -> Result<Vec<CaptureEntry>, LibraryError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LibraryError::ListFailed {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut captures = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LibraryError::ListFailed {
                path: self.root.clone(),
                source,
            })?;

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_dir() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(name = %name, error = %e, "Skipping unreadable capture entry");
                    continue;
                }
            };

            let Ok(timestamp) = metadata.created().or_else(|_| metadata.modified()) else {
                warn!(name = %name, "Capture has no timestamp, skipping");
                continue;
            };

            captures.push(CaptureEntry {
                name,
                path: entry.path(),
                created_at: DateTime::<Utc>::from(timestamp),
            });
        }

        captures.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(captures)
    }
}
