//! Append-only on-disk segment for one collection.
//!
//! # Storage Format
//!
//! `records.vec`:
//! - Header (32 bytes): magic `VIDX`, version u32, dimension u32, metric
//!   tag u32, committed record count u64, committed `paths.dat` length u64
//! - Records: id u64 followed by `dimension` f32 values, all little-endian
//!
//! `paths.dat`: one `[u32 length][utf-8 bytes]` entry per record, in
//! record order.
//!
//! An append writes record and path bytes past the committed end, syncs
//! them, then rewrites the two header counters. That header write is the
//! commit point: anything beyond the committed lengths is a torn tail
//! from an interrupted append and is truncated the next time the segment
//! is opened.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{VindexError, VindexResult};
use crate::vector::{Metric, Record, RecordId, SearchResult, VectorDimension, ranking};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
pub(crate) const HEADER_SIZE: usize = 32;

/// Offset of the committed counters inside the header.
const COUNTERS_OFFSET: u64 = 16;

/// Magic bytes to identify vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"VIDX";

const BYTES_PER_F32: usize = 4;
const BYTES_PER_ID: usize = 8;

pub(crate) const RECORDS_FILE: &str = "records.vec";
pub(crate) const PATHS_FILE: &str = "paths.dat";

#[derive(Debug, Clone, Copy)]
struct Header {
    dimension: VectorDimension,
    metric: Metric,
    count: u64,
    paths_bytes: u64,
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC_BYTES);
        buf[4..8].copy_from_slice(&STORAGE_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.dimension.get() as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&self.metric.tag().to_le_bytes());
        buf[16..24].copy_from_slice(&self.count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.paths_bytes.to_le_bytes());
        buf
    }

    fn parse(buf: &[u8; HEADER_SIZE], path: &Path) -> VindexResult<Self> {
        let invalid = |reason: String| {
            VindexError::backend("open", format!("{}: {reason}", path.display()))
        };
        if &buf[0..4] != MAGIC_BYTES {
            return Err(invalid("invalid magic bytes".to_string()));
        }
        let version = read_u32(&buf[4..8]);
        if version != STORAGE_VERSION {
            return Err(invalid(format!(
                "unsupported format version {version}, expected {STORAGE_VERSION}"
            )));
        }
        let dimension = VectorDimension::new(read_u32(&buf[8..12]) as usize)
            .map_err(|e| invalid(e.to_string()))?;
        let tag = read_u32(&buf[12..16]);
        let metric = Metric::from_tag(tag).ok_or_else(|| invalid(format!("unknown metric tag {tag}")))?;
        Ok(Self {
            dimension,
            metric,
            count: read_u64(&buf[16..24]),
            paths_bytes: read_u64(&buf[24..32]),
        })
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64(b: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&b[..8]);
    u64::from_le_bytes(arr)
}

fn read_f32(b: &[u8]) -> f32 {
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Memory-mapped segment holding every record of one collection.
#[derive(Debug)]
pub struct Segment {
    dir: PathBuf,
    header: Header,
    /// Read-only view of the committed records, remapped after each append.
    mmap: Option<Mmap>,
    ids: Vec<RecordId>,
    paths: Vec<String>,
    positions: HashMap<RecordId, usize>,
}

impl Segment {
    /// Creates empty segment files in `dir`.
    pub fn create(dir: impl AsRef<Path>, dimension: VectorDimension, metric: Metric) -> VindexResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| VindexError::io(&dir, e))?;

        let header = Header {
            dimension,
            metric,
            count: 0,
            paths_bytes: 0,
        };

        let records_path = dir.join(RECORDS_FILE);
        let mut file = File::create(&records_path).map_err(|e| VindexError::io(&records_path, e))?;
        file.write_all(&header.to_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| VindexError::io(&records_path, e))?;

        let paths_path = dir.join(PATHS_FILE);
        File::create(&paths_path)
            .and_then(|f| f.sync_all())
            .map_err(|e| VindexError::io(&paths_path, e))?;

        let mut segment = Self {
            dir,
            header,
            mmap: None,
            ids: Vec::new(),
            paths: Vec::new(),
            positions: HashMap::new(),
        };
        segment.remap()?;
        Ok(segment)
    }

    /// Opens existing segment files, discarding any uncommitted tail.
    pub fn open(dir: impl AsRef<Path>) -> VindexResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let records_path = dir.join(RECORDS_FILE);
        let paths_path = dir.join(PATHS_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&records_path)
            .map_err(|e| VindexError::io(&records_path, e))?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf)
            .map_err(|e| VindexError::io(&records_path, e))?;
        let header = Header::parse(&buf, &records_path)?;

        let record_size = Self::record_size_for(header.dimension);
        let committed = HEADER_SIZE as u64 + header.count * record_size as u64;
        truncate_tail(&file, &records_path, committed)?;

        let paths_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&paths_path)
            .map_err(|e| VindexError::io(&paths_path, e))?;
        truncate_tail(&paths_file, &paths_path, header.paths_bytes)?;

        let paths = read_paths(&paths_path, header.count as usize)?;

        let mut segment = Self {
            dir,
            header,
            mmap: None,
            ids: Vec::with_capacity(header.count as usize),
            paths,
            positions: HashMap::with_capacity(header.count as usize),
        };
        segment.remap()?;
        segment.load_ids();

        debug!(
            dir = %segment.dir.display(),
            count = segment.len(),
            "opened segment"
        );
        Ok(segment)
    }

    fn record_size_for(dimension: VectorDimension) -> usize {
        BYTES_PER_ID + dimension.get() * BYTES_PER_F32
    }

    fn record_size(&self) -> usize {
        Self::record_size_for(self.header.dimension)
    }

    pub fn dimension(&self) -> VectorDimension {
        self.header.dimension
    }

    pub fn metric(&self) -> Metric {
        self.header.metric
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.positions.contains_key(&id)
    }

    fn remap(&mut self) -> VindexResult<()> {
        let path = self.dir.join(RECORDS_FILE);
        let file = File::open(&path).map_err(|e| VindexError::io(&path, e))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| VindexError::io(&path, e))?;
        self.mmap = Some(mmap);
        Ok(())
    }

    /// Committed record bytes, excluding the header.
    ///
    /// A map taken before the latest append covers only the records that
    /// existed then; those are still served.
    fn record_region(&self) -> &[u8] {
        let record_size = self.record_size();
        let committed = self.ids.len().max(self.header.count as usize);
        match &self.mmap {
            Some(mmap) if mmap.len() >= HEADER_SIZE => {
                let mapped = (mmap.len() - HEADER_SIZE) / record_size;
                &mmap[HEADER_SIZE..HEADER_SIZE + committed.min(mapped) * record_size]
            }
            _ => &[],
        }
    }

    fn load_ids(&mut self) {
        let record_size = self.record_size();
        let ids: Vec<RecordId> = self
            .record_region()
            .chunks_exact(record_size)
            .map(|chunk| RecordId::new(read_u64(&chunk[..BYTES_PER_ID])))
            .collect();
        self.positions = ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
        self.ids = ids;
    }

    /// Appends records and commits them by rewriting the header counters.
    ///
    /// Callers validate dimensions and uniqueness first. On failure the
    /// committed state is untouched and the partial tail is overwritten by
    /// the next append or truncated on the next open.
    pub fn append(&mut self, records: &[Record]) -> VindexResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let record_size = self.record_size();
        let mut record_bytes = Vec::with_capacity(records.len() * record_size);
        let mut path_bytes = Vec::new();
        for record in records {
            record_bytes.extend_from_slice(&record.id.to_bytes());
            for value in &record.vector {
                record_bytes.extend_from_slice(&value.to_le_bytes());
            }
            let path = record.path.as_bytes();
            let len = u32::try_from(path.len())
                .map_err(|_| VindexError::config(format!("path too long: {}", record.path)))?;
            path_bytes.extend_from_slice(&len.to_le_bytes());
            path_bytes.extend_from_slice(path);
        }

        let records_path = self.dir.join(RECORDS_FILE);
        let paths_path = self.dir.join(PATHS_FILE);
        let records_end = HEADER_SIZE as u64 + self.header.count * record_size as u64;

        write_at(&records_path, records_end, &record_bytes)?;
        write_at(&paths_path, self.header.paths_bytes, &path_bytes)?;

        let committed = Header {
            count: self.header.count + records.len() as u64,
            paths_bytes: self.header.paths_bytes + path_bytes.len() as u64,
            ..self.header
        };
        let header_bytes = committed.to_bytes();
        write_at(
            &records_path,
            COUNTERS_OFFSET,
            &header_bytes[COUNTERS_OFFSET as usize..],
        )?;

        self.header = committed;
        let base = self.ids.len();
        for (offset, record) in records.iter().enumerate() {
            self.ids.push(record.id);
            self.positions.insert(record.id, base + offset);
            self.paths.push(record.path.clone());
        }

        // committed above; a stale map only hides the new records until the next remap
        if let Err(e) = self.remap() {
            warn!(dir = %self.dir.display(), error = %e, "failed to remap segment after append");
        }
        Ok(())
    }

    /// Exact scan over every committed record.
    ///
    /// Scoring runs in parallel on the current rayon pool; ranking is
    /// deterministic regardless of thread count.
    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Vec<SearchResult> {
        if top_k == 0 || self.is_empty() {
            return Vec::new();
        }

        let metric = self.header.metric;
        let query_norm = crate::vector::l2_norm(query);
        let scored: Vec<(RecordId, f32)> = self
            .record_region()
            .par_chunks_exact(self.record_size())
            .map(|chunk| {
                let id = RecordId::new(read_u64(&chunk[..BYTES_PER_ID]));
                (id, score_bytes(metric, query, query_norm, &chunk[BYTES_PER_ID..]))
            })
            .collect();

        ranking::rank_scored(scored, top_k, threshold, |id| {
            self.positions
                .get(&id)
                .and_then(|pos| self.paths.get(*pos))
                .cloned()
                .unwrap_or_default()
        })
    }
}

fn score_bytes(metric: Metric, query: &[f32], query_norm: f32, values: &[u8]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_sq = 0.0f32;
    for (q, raw) in query.iter().zip(values.chunks_exact(BYTES_PER_F32)) {
        let v = read_f32(raw);
        dot += q * v;
        norm_sq += v * v;
    }
    match metric {
        Metric::InnerProduct => dot,
        Metric::Cosine => {
            let denom = query_norm * norm_sq.sqrt();
            if denom == 0.0 { 0.0 } else { dot / denom }
        }
    }
}

fn write_at(path: &Path, offset: u64, bytes: &[u8]) -> VindexResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| VindexError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(bytes))
        .and_then(|_| file.sync_data())
        .map_err(|e| VindexError::io(path, e))
}

fn truncate_tail(file: &File, path: &Path, committed: u64) -> VindexResult<()> {
    let len = file.metadata().map_err(|e| VindexError::io(path, e))?.len();
    if len < committed {
        return Err(VindexError::backend(
            "open",
            format!(
                "{} is shorter than its committed length ({len} < {committed})",
                path.display()
            ),
        ));
    }
    if len > committed {
        warn!(
            path = %path.display(),
            discarded = len - committed,
            "truncating uncommitted tail"
        );
        file.set_len(committed)
            .and_then(|_| file.sync_all())
            .map_err(|e| VindexError::io(path, e))?;
    }
    Ok(())
}

fn read_paths(path: &Path, count: usize) -> VindexResult<Vec<String>> {
    let data = std::fs::read(path).map_err(|e| VindexError::io(path, e))?;
    let corrupt = || VindexError::backend("open", format!("{} is corrupted", path.display()));

    let mut paths = Vec::with_capacity(count);
    let mut offset = 0usize;
    while paths.len() < count {
        let len_bytes = data.get(offset..offset + 4).ok_or_else(corrupt)?;
        let len = read_u32(len_bytes) as usize;
        offset += 4;
        let raw = data.get(offset..offset + len).ok_or_else(corrupt)?;
        paths.push(String::from_utf8(raw.to_vec()).map_err(|_| corrupt())?);
        offset += len;
    }
    Ok(paths)
}
