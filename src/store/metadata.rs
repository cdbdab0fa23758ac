//! Collection metadata persisted next to the segment files.
//!
//! The presence of `collection.json` marks a collection as existing. It is
//! written after the segment files, so a crash during creation leaves no
//! half-created collection behind.

use crate::error::{VindexError, VindexResult};
use crate::vector::{Metric, VectorDimension};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) const METADATA_FILE: &str = "collection.json";

/// Metadata for one embedded collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,

    pub dimension: VectorDimension,

    pub metric: Metric,

    /// Unix timestamp when created
    pub created_at: i64,

    /// Unix timestamp of the last committed insert
    pub updated_at: i64,

    /// Version of the metadata format
    pub version: u32,
}

impl CollectionMetadata {
    /// Current metadata version
    const CURRENT_VERSION: u32 = 1;

    pub fn new(name: impl Into<String>, dimension: VectorDimension, metric: Metric) -> Self {
        let now = Utc::now().timestamp();
        Self {
            name: name.into(),
            dimension,
            metric,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp();
    }

    /// Writes `collection.json` through a temporary file and rename.
    pub fn save(&self, dir: &Path) -> VindexResult<()> {
        let path = dir.join(METADATA_FILE);
        let tmp = dir.join(format!("{METADATA_FILE}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| {
            VindexError::backend("save metadata", format!("failed to serialize: {e}"))
        })?;
        std::fs::write(&tmp, json).map_err(|e| VindexError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| VindexError::io(&path, e))
    }

    pub fn load(dir: &Path) -> VindexResult<Self> {
        let path = dir.join(METADATA_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| VindexError::io(&path, e))?;

        let metadata: Self = serde_json::from_str(&json).map_err(|e| {
            VindexError::backend(
                "load metadata",
                format!("{} is corrupted: {e}", path.display()),
            )
        })?;

        if metadata.version > Self::CURRENT_VERSION {
            return Err(VindexError::backend(
                "load metadata",
                format!(
                    "metadata version {} is newer than supported version {}",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            ));
        }

        Ok(metadata)
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(METADATA_FILE).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = CollectionMetadata::new(
            "clip_images",
            VectorDimension::dimension_512(),
            Metric::Cosine,
        );

        assert!(!CollectionMetadata::exists(temp_dir.path()));
        metadata.save(temp_dir.path()).unwrap();
        assert!(CollectionMetadata::exists(temp_dir.path()));

        let loaded = CollectionMetadata::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.name, "clip_images");
        assert_eq!(loaded.dimension.get(), 512);
        assert_eq!(loaded.metric, Metric::Cosine);
        assert_eq!(loaded.version, CollectionMetadata::CURRENT_VERSION);
    }

    #[test]
    fn test_newer_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut metadata = CollectionMetadata::new("c", VectorDimension::new(4).unwrap(), Metric::InnerProduct);
        metadata.version = 99;
        metadata.save(temp_dir.path()).unwrap();
        assert!(matches!(
            CollectionMetadata::load(temp_dir.path()),
            Err(VindexError::Backend { .. })
        ));
    }
}
