//! Type-safe wrappers and core types for vector storage and search.
//!
//! Newtypes keep record ids and dimensions from being mixed up with
//! plain integers, and the record/result structs are shared by every
//! store backend and by the remote wire protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{VindexError, VindexResult};

/// Output dimension of the CLIP ViT-B/32 image and text towers.
pub const VECTOR_DIMENSION_512: usize = 512;

/// Largest id a record may carry. Ids must fit a signed 64-bit primary key.
pub const MAX_RECORD_ID: u64 = i64::MAX as u64;

/// Type-safe wrapper for record ids.
///
/// Ids are assigned by the caller, never generated by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a new `RecordId`.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Checks the id fits the portable range.
    pub fn validate(&self) -> VindexResult<()> {
        if self.0 > MAX_RECORD_ID {
            return Err(VindexError::config(format!(
                "record id {} exceeds the maximum of {MAX_RECORD_ID}",
                self.0
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions
/// to prevent dimension mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> VindexResult<Self> {
        if dim == 0 {
            return Err(VindexError::config("vector dimension cannot be zero"));
        }
        Ok(Self(dim))
    }

    /// Creates the 512-dimensional CLIP dimension.
    #[must_use]
    pub const fn dimension_512() -> Self {
        Self(VECTOR_DIMENSION_512)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> VindexResult<()> {
        if vector.len() != self.0 {
            return Err(VindexError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VindexError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(value: VectorDimension) -> Self {
        value.0
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Similarity metric a collection is typed with.
///
/// Both metrics report cosine similarity for unit-norm vectors. `Cosine`
/// divides by the norms, `InnerProduct` trusts the vectors are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    #[serde(rename = "ip")]
    InnerProduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "ip",
        }
    }

    /// On-disk tag used by the embedded segment header.
    pub(crate) fn tag(&self) -> u32 {
        match self {
            Self::Cosine => 1,
            Self::InnerProduct => 2,
        }
    }

    pub(crate) fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Cosine),
            2 => Some(Self::InnerProduct),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = VindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "ip" | "inner_product" | "inner-product" => Ok(Self::InnerProduct),
            other => Err(VindexError::config(format!(
                "unknown metric '{other}', expected 'cosine' or 'ip'"
            ))),
        }
    }
}

/// A stored record: caller-assigned id, opaque source path and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub path: String,
    pub vector: Vec<f32>,
}

impl Record {
    pub fn new(id: RecordId, path: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id,
            path: path.into(),
            vector,
        }
    }
}

/// One search hit.
///
/// `score` is cosine similarity in [-1, 1] and `distance` is `1 - score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: RecordId,
    pub path: String,
    pub score: f32,
    pub distance: f32,
}

impl SearchResult {
    pub fn new(id: RecordId, path: impl Into<String>, score: f32) -> Self {
        Self {
            id,
            path: path.into(),
            score,
            distance: 1.0 - score,
        }
    }
}

/// Descriptive information about a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: VectorDimension,
    pub metric: Metric,
    pub count: usize,
}
