//! Image lookup by record identifier
//!
//! Images live at `{folder}/{id}.{extension}`. A missing image is reported,
//! never treated as an error that blocks editing.

use crate::record::RecordId;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ImageLookup {
    folder: PathBuf,
    extension: String,
}

/// Result of resolving a record's image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum ImageStatus {
    Found(PathBuf),
    Missing(PathBuf),
}

impl ImageStatus {
    pub fn path(&self) -> &Path {
        match self {
            ImageStatus::Found(path) | ImageStatus::Missing(path) => path,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ImageStatus::Found(_))
    }
}

impl ImageLookup {
    pub fn new(folder: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            folder: folder.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Deterministic location of the image for `id`
    pub fn path_for(&self, id: &RecordId) -> PathBuf {
        self.folder.join(format!("{}.{}", id, self.extension))
    }

    pub fn locate(&self, id: &RecordId) -> ImageStatus {
        let path = self.path_for(id);
        if path.is_file() {
            ImageStatus::Found(path)
        } else {
            warn!("Image not found for ID {} ({})", id, path.display());
            ImageStatus::Missing(path)
        }
    }
}
