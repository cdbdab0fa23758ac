//! Vector storage backends.
//!
//! A [`VectorStore`] owns named collections of fixed-dimension records and
//! answers exact top-k queries over them. Two backends implement the trait:
//!
//! - [`EmbeddedStore`]: collections live in a local directory, one
//!   subdirectory per collection, scanned in-process.
//! - [`RemoteStore`]: a thin HTTP client for a `vindex serve` process that
//!   hosts an embedded store.
//!
//! The backend is picked once from [`StoreConfig`]; callers only hold a
//! [`Collection`] handle and never branch on the kind.

mod embedded;
mod metadata;
pub mod protocol;
mod remote;
mod segment;

pub use embedded::EmbeddedStore;
pub use metadata::CollectionMetadata;
pub use remote::RemoteStore;
pub use segment::Segment;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{VindexError, VindexResult};
use crate::vector::{CollectionInfo, Metric, Record, SearchResult, VectorDimension};
use std::sync::Arc;

/// Storage backend holding any number of named collections.
pub trait VectorStore: Send + Sync {
    /// Creates the collection if absent.
    ///
    /// An existing collection must have the same dimension and metric,
    /// otherwise a collection mismatch error is returned and nothing changes.
    fn ensure_collection(
        &self,
        name: &str,
        dimension: VectorDimension,
        metric: Metric,
    ) -> VindexResult<CollectionInfo>;

    /// Appends records with caller-assigned ids, all or nothing.
    fn insert(&self, name: &str, records: &[Record]) -> VindexResult<usize>;

    /// Top-k records by descending score with `score >= threshold`.
    fn search(
        &self,
        name: &str,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> VindexResult<Vec<SearchResult>>;

    fn count(&self, name: &str) -> VindexResult<usize>;

    fn describe(&self, name: &str) -> VindexResult<CollectionInfo>;

    /// Irreversibly removes the collection and its records.
    fn drop_collection(&self, name: &str) -> VindexResult<()>;

    /// Short description of where the data lives, for diagnostics.
    fn location(&self) -> String;
}

/// Checks a collection name is safe to use as a directory and URL segment.
pub fn validate_collection_name(name: &str) -> VindexResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(VindexError::config(format!(
            "invalid collection name '{name}': use ASCII letters, digits, '_' or '-'"
        )))
    }
}

/// Opens the backend described by the store settings.
pub fn open_store(config: &StoreConfig, parallel_threads: usize) -> VindexResult<Arc<dyn VectorStore>> {
    match config.backend()? {
        StoreBackend::Embedded { uri } => {
            Ok(Arc::new(EmbeddedStore::open(uri, parallel_threads)?))
        }
        StoreBackend::Remote { host, port } => Ok(Arc::new(RemoteStore::connect(
            &host,
            port,
            std::time::Duration::from_secs(config.timeout_secs),
        )?)),
    }
}

/// Handle binding a collection name to its backend.
#[derive(Clone)]
pub struct Collection {
    name: String,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("location", &self.store.location())
            .finish()
    }
}

impl Collection {
    /// Handle to a collection that may or may not exist yet.
    pub fn new(store: Arc<dyn VectorStore>, name: impl Into<String>) -> VindexResult<Self> {
        let name = name.into();
        validate_collection_name(&name)?;
        Ok(Self { name, store })
    }

    /// Creates the collection if needed and returns a handle to it.
    pub fn ensure(
        store: Arc<dyn VectorStore>,
        name: impl Into<String>,
        dimension: VectorDimension,
        metric: Metric,
    ) -> VindexResult<Self> {
        let collection = Self::new(store, name)?;
        collection
            .store
            .ensure_collection(&collection.name, dimension, metric)?;
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&self, records: &[Record]) -> VindexResult<usize> {
        self.store.insert(&self.name, records)
    }

    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> VindexResult<Vec<SearchResult>> {
        self.store.search(&self.name, query, top_k, threshold)
    }

    pub fn count(&self) -> VindexResult<usize> {
        self.store.count(&self.name)
    }

    pub fn info(&self) -> VindexResult<CollectionInfo> {
        self.store.describe(&self.name)
    }

    pub fn drop(self) -> VindexResult<()> {
        self.store.drop_collection(&self.name)
    }

    pub fn location(&self) -> String {
        self.store.location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("clip_images").is_ok());
        assert!(validate_collection_name("photos-2024").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("../escape").is_err());
        assert!(validate_collection_name("a/b").is_err());
        assert!(validate_collection_name("-flag").is_err());
    }

    #[test]
    fn test_open_store_rejects_conflicting_backends() {
        let config = StoreConfig {
            uri: Some("local.db".into()),
            host: Some("localhost".to_string()),
            ..StoreConfig::default()
        };
        let err = open_store(&config, 1).err().unwrap();
        assert!(err.is_config());
    }
}
