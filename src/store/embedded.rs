//! Embedded store: collections kept in a local directory.
//!
//! Layout under the store root:
//! ```text
//! <uri>/
//!   <collection>/
//!     collection.json
//!     records.vec
//!     paths.dat
//! ```
//! Segments are opened lazily and cached. Each segment sits behind its own
//! `RwLock` so searches run concurrently while inserts are exclusive.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::metadata::CollectionMetadata;
use super::segment::Segment;
use super::{VectorStore, validate_collection_name};
use crate::error::{VindexError, VindexResult};
use crate::vector::{CollectionInfo, Metric, Record, SearchResult, VectorDimension};

#[derive(Debug)]
struct OpenCollection {
    dir: PathBuf,
    metadata: CollectionMetadata,
    segment: Segment,
    /// Set by `drop_collection`; handles fetched earlier must not touch disk
    dropped: bool,
}

impl OpenCollection {
    fn live(&self) -> VindexResult<&Self> {
        if self.dropped {
            return Err(VindexError::CollectionNotFound {
                name: self.metadata.name.clone(),
            });
        }
        Ok(self)
    }

    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.metadata.name.clone(),
            dimension: self.segment.dimension(),
            metric: self.segment.metric(),
            count: self.segment.len(),
        }
    }
}

type Handle = Arc<RwLock<OpenCollection>>;

/// Local, file-backed vector store.
#[derive(Debug)]
pub struct EmbeddedStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, Handle>>,
    pool: rayon::ThreadPool,
}

impl EmbeddedStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>, parallel_threads: usize) -> VindexResult<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() && !root.is_dir() {
            return Err(VindexError::config(format!(
                "store uri '{}' exists and is not a directory",
                root.display()
            )));
        }
        std::fs::create_dir_all(&root).map_err(|e| VindexError::io(&root, e))?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel_threads.max(1))
            .thread_name(|i| format!("vindex-scan-{i}"))
            .build()
            .map_err(|e| VindexError::backend("open", e))?;

        info!(root = %root.display(), "opened embedded store");
        Ok(Self {
            root,
            collections: RwLock::new(HashMap::new()),
            pool,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all collections on disk, sorted.
    pub fn list_collections(&self) -> VindexResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| VindexError::io(&self.root, e))?;
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| CollectionMetadata::exists(&entry.path()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn dir_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Cached handle, opening the collection from disk on first access.
    fn handle(&self, name: &str) -> VindexResult<Handle> {
        validate_collection_name(name)?;
        if let Some(handle) = self.collections.read().get(name) {
            return Ok(Arc::clone(handle));
        }

        let mut collections = self.collections.write();
        if let Some(handle) = collections.get(name) {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(RwLock::new(self.load(name)?));
        collections.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Appends to an already resolved handle, all or nothing.
    fn insert_into(&self, name: &str, handle: &Handle, records: &[Record]) -> VindexResult<usize> {
        let mut open = handle.write();

        // validate the whole batch before touching disk
        open.live()?;
        let dimension = open.segment.dimension();
        let mut batch_ids = HashSet::with_capacity(records.len());
        for record in records {
            dimension.validate_vector(&record.vector)?;
            record.id.validate()?;
            if open.segment.contains(record.id) || !batch_ids.insert(record.id) {
                return Err(VindexError::DuplicateId {
                    collection: name.to_string(),
                    id: record.id,
                });
            }
        }
        if records.is_empty() {
            return Ok(0);
        }

        open.segment.append(records)?;

        // records are committed; the timestamp refresh must not turn that into an error
        open.metadata.touch();
        let dir = open.dir.clone();
        if let Err(e) = open.metadata.save(&dir) {
            warn!(collection = name, error = %e, "inserted records but failed to update metadata");
        }

        debug!(collection = name, inserted = records.len(), total = open.segment.len(), "committed batch");
        Ok(records.len())
    }

    fn load(&self, name: &str) -> VindexResult<OpenCollection> {
        let dir = self.dir_for(name);
        if !CollectionMetadata::exists(&dir) {
            return Err(VindexError::CollectionNotFound {
                name: name.to_string(),
            });
        }
        let metadata = CollectionMetadata::load(&dir)?;
        let segment = Segment::open(&dir)?;
        if segment.dimension() != metadata.dimension || segment.metric() != metadata.metric {
            return Err(VindexError::backend(
                "open",
                format!("collection '{name}' metadata disagrees with its segment header"),
            ));
        }
        Ok(OpenCollection {
            dir,
            metadata,
            segment,
            dropped: false,
        })
    }
}

impl VectorStore for EmbeddedStore {
    fn ensure_collection(
        &self,
        name: &str,
        dimension: VectorDimension,
        metric: Metric,
    ) -> VindexResult<CollectionInfo> {
        validate_collection_name(name)?;
        // creation is serialized with every other lookup of this store
        let mut collections = self.collections.write();

        let handle = match collections.get(name) {
            Some(handle) => Some(Arc::clone(handle)),
            None if CollectionMetadata::exists(&self.dir_for(name)) => {
                let handle = Arc::new(RwLock::new(self.load(name)?));
                collections.insert(name.to_string(), Arc::clone(&handle));
                Some(handle)
            }
            None => None,
        };

        if let Some(handle) = handle {
            let open = handle.read();
            if open.segment.dimension() != dimension {
                return Err(VindexError::CollectionDimensionMismatch {
                    collection: name.to_string(),
                    existing: open.segment.dimension().get(),
                    requested: dimension.get(),
                });
            }
            if open.segment.metric() != metric {
                return Err(VindexError::CollectionMetricMismatch {
                    collection: name.to_string(),
                    existing: open.segment.metric().to_string(),
                    requested: metric.to_string(),
                });
            }
            return Ok(open.info());
        }

        let dir = self.dir_for(name);
        let segment = Segment::create(&dir, dimension, metric)?;
        let metadata = CollectionMetadata::new(name, dimension, metric);
        metadata.save(&dir)?;
        info!(collection = name, %dimension, %metric, "created collection");

        let open = OpenCollection {
            dir,
            metadata,
            segment,
            dropped: false,
        };
        let info = open.info();
        collections.insert(name.to_string(), Arc::new(RwLock::new(open)));
        Ok(info)
    }

    fn insert(&self, name: &str, records: &[Record]) -> VindexResult<usize> {
        let handle = self.handle(name)?;
        self.insert_into(name, &handle, records)
    }

    fn search(
        &self,
        name: &str,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> VindexResult<Vec<SearchResult>> {
        let handle = self.handle(name)?;
        let guard = handle.read();
        let open = guard.live()?;
        open.segment.dimension().validate_vector(query)?;
        Ok(self
            .pool
            .install(|| open.segment.search(query, top_k, threshold)))
    }

    fn count(&self, name: &str) -> VindexResult<usize> {
        let handle = self.handle(name)?;
        let open = handle.read();
        Ok(open.live()?.segment.len())
    }

    fn describe(&self, name: &str) -> VindexResult<CollectionInfo> {
        let handle = self.handle(name)?;
        let open = handle.read();
        Ok(open.live()?.info())
    }

    fn drop_collection(&self, name: &str) -> VindexResult<()> {
        validate_collection_name(name)?;
        let mut collections = self.collections.write();
        let dir = self.dir_for(name);
        if !CollectionMetadata::exists(&dir) {
            return Err(VindexError::CollectionNotFound {
                name: name.to_string(),
            });
        }

        // hold the collection exclusively so no insert is mid-append
        // and retire it, since callers may still hold this handle
        let handle = collections.remove(name);
        let mut guard = handle.as_ref().map(|h| h.write());
        if let Some(open) = guard.as_deref_mut() {
            open.dropped = true;
        }
        std::fs::remove_dir_all(&dir).map_err(|e| VindexError::io(&dir, e))?;
        info!(collection = name, "dropped collection");
        Ok(())
    }

    fn location(&self) -> String {
        format!("embedded:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::RecordId;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> EmbeddedStore {
        EmbeddedStore::open(temp.path().join("db"), 2).unwrap()
    }

    fn dim(n: usize) -> VectorDimension {
        VectorDimension::new(n).unwrap()
    }

    #[test]
    fn test_ensure_is_idempotent_and_validated() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let info = store.ensure_collection("c", dim(3), Metric::Cosine).unwrap();
        assert_eq!(info.count, 0);
        let again = store.ensure_collection("c", dim(3), Metric::Cosine).unwrap();
        assert_eq!(again, info);

        assert!(matches!(
            store.ensure_collection("c", dim(4), Metric::Cosine),
            Err(VindexError::CollectionDimensionMismatch {
                existing: 3,
                requested: 4,
                ..
            })
        ));
        assert!(matches!(
            store.ensure_collection("c", dim(3), Metric::InnerProduct),
            Err(VindexError::CollectionMetricMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_collection() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(matches!(
            store.count("nope"),
            Err(VindexError::CollectionNotFound { .. })
        ));
        assert!(matches!(
            store.drop_collection("nope"),
            Err(VindexError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn test_insert_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();

        store
            .insert("c", &[Record::new(RecordId::new(0), "a", vec![1.0, 0.0])])
            .unwrap();

        // duplicate against the collection
        let err = store
            .insert(
                "c",
                &[
                    Record::new(RecordId::new(1), "b", vec![0.0, 1.0]),
                    Record::new(RecordId::new(0), "dup", vec![0.0, 1.0]),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, VindexError::DuplicateId { .. }));
        assert_eq!(store.count("c").unwrap(), 1);

        // duplicate within the batch
        let err = store
            .insert(
                "c",
                &[
                    Record::new(RecordId::new(5), "x", vec![0.0, 1.0]),
                    Record::new(RecordId::new(5), "y", vec![0.0, 1.0]),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, VindexError::DuplicateId { .. }));

        // wrong dimension
        let err = store
            .insert(
                "c",
                &[
                    Record::new(RecordId::new(2), "ok", vec![0.0, 1.0]),
                    Record::new(RecordId::new(3), "bad", vec![0.0, 1.0, 0.0]),
                ],
            )
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(store.count("c").unwrap(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let store = store(&temp);
            store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();
            store
                .insert(
                    "c",
                    &[
                        Record::new(RecordId::new(0), "a.png", vec![1.0, 0.0]),
                        Record::new(RecordId::new(1), "b.png", vec![0.0, 1.0]),
                    ],
                )
                .unwrap();
        }

        let store = store(&temp);
        assert_eq!(store.count("c").unwrap(), 2);
        assert_eq!(store.list_collections().unwrap(), vec!["c".to_string()]);
        let hits = store.search("c", &[0.0, 1.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].path, "b.png");
    }

    #[test]
    fn test_search_checks_query_dimension() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();
        assert!(matches!(
            store.search("c", &[1.0, 0.0, 0.0], 3, 0.0),
            Err(VindexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_drop_then_recreate() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();
        store
            .insert("c", &[Record::new(RecordId::new(0), "a", vec![1.0, 0.0])])
            .unwrap();
        store.drop_collection("c").unwrap();
        assert!(store.count("c").is_err());

        let info = store.ensure_collection("c", dim(5), Metric::InnerProduct).unwrap();
        assert_eq!(info.count, 0);
        assert_eq!(info.dimension.get(), 5);
    }

    #[test]
    fn test_stale_handle_cannot_write_into_recreated_collection() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();
        store
            .insert("c", &[Record::new(RecordId::new(0), "old", vec![1.0, 0.0])])
            .unwrap();

        // an insert that resolved the handle before the drop
        let stale = store.handle("c").unwrap();
        store.drop_collection("c").unwrap();
        store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();

        let err = store
            .insert_into("c", &stale, &[Record::new(RecordId::new(1), "late", vec![0.0, 1.0])])
            .unwrap_err();
        assert!(matches!(err, VindexError::CollectionNotFound { .. }));

        store
            .insert("c", &[Record::new(RecordId::new(0), "new", vec![0.0, 1.0])])
            .unwrap();
        drop(store);

        let reopened = EmbeddedStore::open(temp.path().join("db"), 1).unwrap();
        assert_eq!(reopened.count("c").unwrap(), 1);
        let hits = reopened.search("c", &[0.0, 1.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].path, "new");
    }

    #[test]
    fn test_metadata_refresh_failure_keeps_insert_successful() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.ensure_collection("c", dim(2), Metric::Cosine).unwrap();
        // the atomic save writes here first, a directory makes it fail
        std::fs::create_dir(temp.path().join("db/c/collection.json.tmp")).unwrap();

        let inserted = store
            .insert("c", &[Record::new(RecordId::new(0), "a", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.count("c").unwrap(), 1);
        drop(store);

        let reopened = EmbeddedStore::open(temp.path().join("db"), 1).unwrap();
        assert_eq!(reopened.count("c").unwrap(), 1);
    }

    #[test]
    fn test_uri_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.db");
        std::fs::write(&file, b"x").unwrap();
        assert!(EmbeddedStore::open(&file, 1).unwrap_err().is_config());
    }
}
