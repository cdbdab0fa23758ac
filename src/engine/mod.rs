//! Search engine tying an encoder to a collection.
//!
//! The engine owns the indexing workflow (scan, decode, encode, id
//! assignment, batched insert) and the three query modes: image to image,
//! text to image, and a single image/text match score.
//!
//! # Id assignment
//!
//! With [`IdStrategy::Sequential`] ids continue from the collection's
//! current count, so the id space stays dense as long as a single writer
//! indexes a collection. The engine serializes its own indexing calls, but
//! two processes indexing the same collection will collide and the second
//! insert fails with a duplicate id error. [`IdStrategy::ContentHash`]
//! derives ids from file contents instead and needs no counter; re-indexing
//! an already indexed image skips it.

mod scan;

pub use scan::ImageScanner;

use crate::encoder::{Encoder, ImageInput};
use crate::error::{VindexError, VindexResult};
use crate::store::{Collection, VectorStore};
use crate::vector::{CollectionInfo, MAX_RECORD_ID, Metric, Record, RecordId, SearchResult, dot};
use image::RgbImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How record ids are assigned during indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// Dense ids continuing from the collection count
    #[default]
    Sequential,
    /// First 63 bits of the SHA-256 of the file bytes
    ContentHash,
}

/// Why an input did not end up in the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedExtension,
    Unreadable(String),
    /// Content-hash id already present in the collection or earlier in the call
    AlreadyIndexed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedExtension => f.write_str("unsupported extension"),
            Self::Unreadable(reason) => write!(f, "unreadable: {reason}"),
            Self::AlreadyIndexed => f.write_str("already indexed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Outcome of an indexing call.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Records successfully inserted
    pub indexed: usize,
    /// Inputs that were not inserted, in input order
    pub skipped: Vec<SkippedItem>,
    /// Batches committed to the store
    pub batches: usize,
    /// Next free sequential id after this call
    pub next_id: Option<RecordId>,
}

impl IndexReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Progress notification emitted after each committed batch.
#[derive(Debug, Clone, Copy)]
pub struct IndexProgress {
    /// Supported inputs processed so far, including skipped ones
    pub processed: usize,
    /// Supported inputs in this call
    pub total: usize,
    pub indexed: usize,
}

pub type ProgressCallback = Box<dyn Fn(IndexProgress) + Send + Sync>;

/// Multimodal search over one collection.
pub struct SearchEngine {
    encoder: Arc<dyn Encoder>,
    collection: Collection,
    metric: Metric,
    scanner: ImageScanner,
    id_strategy: IdStrategy,
    /// Single-writer arbiter for read-count-then-insert
    index_lock: Mutex<()>,
    progress: Option<ProgressCallback>,
}

impl SearchEngine {
    /// Binds `encoder` to the named collection, creating it if absent.
    ///
    /// The collection is typed with the encoder's dimension; an existing
    /// collection with another dimension or metric is rejected.
    pub fn new(
        encoder: Arc<dyn Encoder>,
        store: Arc<dyn VectorStore>,
        collection: &str,
        metric: Metric,
    ) -> VindexResult<Self> {
        let collection = Collection::ensure(store, collection, encoder.dimension(), metric)?;
        info!(
            collection = collection.name(),
            model = encoder.model_name(),
            dimension = %encoder.dimension(),
            location = %collection.location(),
            "search engine ready"
        );
        Ok(Self {
            encoder,
            collection,
            metric,
            scanner: ImageScanner::default(),
            id_strategy: IdStrategy::default(),
            index_lock: Mutex::new(()),
            progress: None,
        })
    }

    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scanner = ImageScanner::new(extensions);
        self
    }

    #[must_use]
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn scanner(&self) -> &ImageScanner {
        &self.scanner
    }

    /// Indexes `paths` in batches, issuing sequential ids from `start_id`.
    ///
    /// Files with unsupported extensions and files that fail to decode are
    /// skipped and listed in the report. Only decoded items consume ids.
    /// Each batch is inserted atomically, so an error part-way leaves the
    /// earlier batches committed. Under [`IdStrategy::ContentHash`],
    /// `start_id` is ignored.
    pub fn index_images(
        &self,
        paths: &[PathBuf],
        batch_size: usize,
        start_id: RecordId,
    ) -> VindexResult<IndexReport> {
        let _guard = self.index_lock.lock();
        self.index_locked(paths, batch_size, start_id)
    }

    /// Indexes every supported image in `folder`, continuing from `count()`.
    pub fn index_folder(
        &self,
        folder: &Path,
        recursive: bool,
        batch_size: usize,
    ) -> VindexResult<IndexReport> {
        let _guard = self.index_lock.lock();
        let paths = self.scanner.scan(folder, recursive)?;
        let start_id = RecordId::new(self.collection.count()? as u64);
        info!(
            folder = %folder.display(),
            files = paths.len(),
            recursive,
            start_id = %start_id,
            "indexing folder"
        );
        self.index_locked(&paths, batch_size, start_id)
    }

    fn index_locked(
        &self,
        paths: &[PathBuf],
        batch_size: usize,
        start_id: RecordId,
    ) -> VindexResult<IndexReport> {
        if batch_size == 0 {
            return Err(VindexError::config("batch size must be at least 1"));
        }
        let started = Instant::now();
        let mut report = IndexReport::default();

        let mut supported = Vec::with_capacity(paths.len());
        for path in paths {
            if self.scanner.is_supported(path) {
                supported.push(path.clone());
            } else {
                debug!(path = %path.display(), "skipping unsupported file");
                report.skipped.push(SkippedItem {
                    path: path.clone(),
                    reason: SkipReason::UnsupportedExtension,
                });
            }
        }

        let total = supported.len();
        let mut processed = 0usize;
        let mut next_id = start_id.get();
        let mut seen_hashes = HashSet::new();

        for chunk in supported.chunks(batch_size) {
            let mut images: Vec<RgbImage> = Vec::with_capacity(chunk.len());
            let mut items: Vec<(&PathBuf, Option<RecordId>)> = Vec::with_capacity(chunk.len());

            for path in chunk {
                match self.load(path) {
                    Ok((rgb, hash_id)) => {
                        if let Some(id) = hash_id {
                            if !seen_hashes.insert(id) {
                                report.skipped.push(SkippedItem {
                                    path: path.clone(),
                                    reason: SkipReason::AlreadyIndexed,
                                });
                                continue;
                            }
                        }
                        images.push(rgb);
                        items.push((path, hash_id));
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping image");
                        report.skipped.push(SkippedItem {
                            path: path.clone(),
                            reason: SkipReason::Unreadable(e.to_string()),
                        });
                    }
                }
            }
            processed += chunk.len();

            if !images.is_empty() {
                let vectors = self.encoder.encode_decoded(&images)?;
                let records: Vec<Record> = items
                    .iter()
                    .zip(vectors)
                    .map(|((path, hash_id), vector)| {
                        let id = hash_id.unwrap_or_else(|| {
                            let id = RecordId::new(next_id);
                            next_id += 1;
                            id
                        });
                        Record::new(id, path.to_string_lossy(), vector)
                    })
                    .collect();

                let inserted = match self.id_strategy {
                    IdStrategy::Sequential => self.collection.insert(&records)?,
                    IdStrategy::ContentHash => self.insert_skipping_existing(records, &mut report)?,
                };
                report.indexed += inserted;
                report.batches += 1;
                debug!(batch = report.batches, inserted, "batch committed");
            }

            if let Some(callback) = &self.progress {
                callback(IndexProgress {
                    processed,
                    total,
                    indexed: report.indexed,
                });
            }
        }

        if self.id_strategy == IdStrategy::Sequential {
            report.next_id = Some(RecordId::new(next_id));
        }
        info!(
            indexed = report.indexed,
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indexing finished"
        );
        Ok(report)
    }

    /// Decodes one file and, for content-hash ids, derives its id.
    fn load(&self, path: &Path) -> VindexResult<(RgbImage, Option<RecordId>)> {
        match self.id_strategy {
            IdStrategy::Sequential => Ok((ImageInput::path(path).decode()?, None)),
            IdStrategy::ContentHash => {
                let bytes = std::fs::read(path).map_err(|e| VindexError::io(path, e))?;
                let id = content_id(&bytes);
                let rgb = ImageInput::Bytes(bytes).decode().map_err(|e| match e {
                    VindexError::Decode { reason, .. } => VindexError::Decode {
                        source_name: path.display().to_string(),
                        reason,
                    },
                    other => other,
                })?;
                Ok((rgb, Some(id)))
            }
        }
    }

    /// Inserts a content-hash batch, dropping ids the collection already holds.
    ///
    /// The store rejects a batch on the first duplicate and reports that id,
    /// so the batch is retried without it until it goes through.
    fn insert_skipping_existing(
        &self,
        mut records: Vec<Record>,
        report: &mut IndexReport,
    ) -> VindexResult<usize> {
        loop {
            if records.is_empty() {
                return Ok(0);
            }
            match self.collection.insert(&records) {
                Ok(inserted) => return Ok(inserted),
                Err(VindexError::DuplicateId { id, .. }) => {
                    let Some(pos) = records.iter().position(|r| r.id == id) else {
                        return Err(VindexError::DuplicateId {
                            collection: self.collection.name().to_string(),
                            id,
                        });
                    };
                    let record = records.remove(pos);
                    debug!(path = %record.path, id = %id, "already indexed");
                    report.skipped.push(SkippedItem {
                        path: PathBuf::from(record.path),
                        reason: SkipReason::AlreadyIndexed,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Records most similar to an image.
    pub fn search_by_image(
        &self,
        image: &ImageInput,
        top_k: usize,
        threshold: f32,
    ) -> VindexResult<Vec<SearchResult>> {
        let query = self.encoder.encode_image(image)?;
        self.collection.search(&query, top_k, threshold)
    }

    /// Records most similar to a text description.
    pub fn search_by_text(
        &self,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> VindexResult<Vec<SearchResult>> {
        let query = self.encoder.encode_text(text)?;
        self.collection.search(&query, top_k, threshold)
    }

    /// Image/text agreement mapped from cosine [-1, 1] to [0, 1].
    pub fn compute_image_text_similarity(&self, image: &ImageInput, text: &str) -> VindexResult<f32> {
        image_text_similarity(self.encoder.as_ref(), image, text)
    }

    pub fn count(&self) -> VindexResult<usize> {
        self.collection.count()
    }

    pub fn info(&self) -> VindexResult<CollectionInfo> {
        self.collection.info()
    }

    /// Drops the underlying collection. Irreversible.
    pub fn drop_collection(self) -> VindexResult<()> {
        self.collection.drop()
    }
}

/// Image/text agreement in [0, 1] without touching any collection.
pub fn image_text_similarity(
    encoder: &dyn Encoder,
    image: &ImageInput,
    text: &str,
) -> VindexResult<f32> {
    let image_vector = encoder.encode_image(image)?;
    let text_vector = encoder.encode_text(text)?;
    Ok((dot(&image_vector, &text_vector) + 1.0) / 2.0)
}

/// Record id derived from file contents.
pub fn content_id(bytes: &[u8]) -> RecordId {
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    RecordId::new(u64::from_be_bytes(head) & MAX_RECORD_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MockEncoder;
    use crate::store::EmbeddedStore;
    use image::{ImageBuffer, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        ImageBuffer::from_pixel(8, 8, Rgb(color)).save(&path).unwrap();
        path
    }

    fn engine(temp: &TempDir) -> SearchEngine {
        let store = Arc::new(EmbeddedStore::open(temp.path().join("db"), 2).unwrap());
        SearchEngine::new(Arc::new(MockEncoder::new(8)), store, "images", Metric::Cosine).unwrap()
    }

    #[test]
    fn test_index_images_dense_ids() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let a = write_png(temp.path(), "a.png", [250, 0, 0]);
        let broken = temp.path().join("broken.png");
        std::fs::write(&broken, b"nope").unwrap();
        let b = write_png(temp.path(), "b.png", [0, 250, 0]);
        let txt = temp.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();

        let report = engine
            .index_images(&[a, broken.clone(), b, txt.clone()], 2, RecordId::new(10))
            .unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.next_id, Some(RecordId::new(12)));
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].path, txt);
        assert_eq!(report.skipped[0].reason, SkipReason::UnsupportedExtension);
        assert_eq!(report.skipped[1].path, broken);

        let hits = engine.search_by_text("green", 1, 0.0).unwrap();
        assert_eq!(hits[0].id, RecordId::new(11));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        assert!(engine.index_images(&[], 0, RecordId::new(0)).unwrap_err().is_config());
    }

    #[test]
    fn test_progress_reported_per_batch() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let engine = engine(&temp).with_progress(Box::new(move |p| {
            assert!(p.processed <= p.total);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let paths: Vec<PathBuf> = (0..5u8)
            .map(|i| write_png(temp.path(), &format!("{i}.png"), [i * 50, 10, 10]))
            .collect();
        engine.index_images(&paths, 2, RecordId::new(0)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_content_hash_reindex_skips_existing() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp).with_id_strategy(IdStrategy::ContentHash);
        let images = temp.path().join("imgs");
        std::fs::create_dir_all(&images).unwrap();
        write_png(&images, "red.png", [255, 0, 0]);
        write_png(&images, "red_copy.png", [255, 0, 0]);
        write_png(&images, "blue.png", [0, 0, 255]);

        let first = engine.index_folder(&images, false, 8).unwrap();
        assert_eq!(first.indexed, 2);
        assert_eq!(first.skipped.len(), 1);
        assert_eq!(first.next_id, None);

        write_png(&images, "green.png", [0, 255, 0]);
        let second = engine.index_folder(&images, false, 2).unwrap();
        assert_eq!(second.indexed, 1);
        assert!(second.skipped.iter().all(|s| s.reason == SkipReason::AlreadyIndexed));
        assert_eq!(engine.count().unwrap(), 3);
    }

    #[test]
    fn test_content_id_is_stable_and_bounded() {
        let a = content_id(b"same bytes");
        assert_eq!(a, content_id(b"same bytes"));
        assert_ne!(a, content_id(b"other bytes"));
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_match_score_formula() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let path = write_png(temp.path(), "red.png", [255, 0, 0]);
        let input = ImageInput::path(&path);

        let score = engine.compute_image_text_similarity(&input, "red").unwrap();
        let expected = (dot(
            &engine.encoder().encode_image(&input).unwrap(),
            &engine.encoder().encode_text("red").unwrap(),
        ) + 1.0)
            / 2.0;
        assert!((score - expected).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&score));
    }
}
