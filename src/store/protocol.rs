//! JSON wire types shared by `vindex serve` and [`RemoteStore`](super::RemoteStore).
//!
//! Endpoints:
//! - `GET    /health`
//! - `PUT    /collections/{name}` with [`EnsureCollectionRequest`], returns `CollectionInfo`
//! - `GET    /collections/{name}` returns `CollectionInfo`
//! - `DELETE /collections/{name}`
//! - `POST   /collections/{name}/records` with [`InsertRequest`], returns [`InsertResponse`]
//! - `POST   /collections/{name}/search` with [`SearchRequest`], returns [`SearchResponse`]
//!
//! Failures return an [`ErrorBody`] carrying the stable status code of the
//! error, so the client can rebuild the same error variant.

use crate::error::VindexError;
use crate::vector::{Metric, Record, RecordId, SearchResult, VectorDimension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureCollectionRequest {
    pub dimension: VectorDimension,
    pub metric: Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResponse {
    pub inserted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error envelope returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<String>,
}

impl ErrorBody {
    fn plain(err: &VindexError) -> Self {
        Self {
            code: err.status_code().to_string(),
            message: err.to_string(),
            collection: None,
            id: None,
            existing: None,
            requested: None,
        }
    }

    /// Envelope for an error, keeping the fields needed to rebuild it.
    pub fn from_error(err: &VindexError) -> Self {
        let body = Self::plain(err);
        match err {
            VindexError::CollectionNotFound { name } => Self {
                collection: Some(name.clone()),
                ..body
            },
            VindexError::DuplicateId { collection, id } => Self {
                collection: Some(collection.clone()),
                id: Some(*id),
                ..body
            },
            VindexError::CollectionDimensionMismatch {
                collection,
                existing,
                requested,
            } => Self {
                collection: Some(collection.clone()),
                existing: Some(existing.to_string()),
                requested: Some(requested.to_string()),
                ..body
            },
            VindexError::CollectionMetricMismatch {
                collection,
                existing,
                requested,
            } => Self {
                collection: Some(collection.clone()),
                existing: Some(existing.clone()),
                requested: Some(requested.clone()),
                ..body
            },
            VindexError::DimensionMismatch { expected, actual } => Self {
                existing: Some(expected.to_string()),
                requested: Some(actual.to_string()),
                ..body
            },
            _ => body,
        }
    }

    /// Rebuilds the error on the client side.
    ///
    /// Server-local failures (I/O, decode, encoding) come back as backend
    /// errors since they say nothing about the client's own environment.
    pub fn into_error(self, operation: &str) -> VindexError {
        let number = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<usize>().ok());
        match self.code.as_str() {
            "COLLECTION_NOT_FOUND" => VindexError::CollectionNotFound {
                name: self.collection.unwrap_or_default(),
            },
            "DUPLICATE_ID" => match self.id {
                Some(id) => VindexError::DuplicateId {
                    collection: self.collection.unwrap_or_default(),
                    id,
                },
                None => VindexError::backend(operation, self.message),
            },
            "COLLECTION_DIMENSION_MISMATCH" => {
                match (number(&self.existing), number(&self.requested)) {
                    (Some(existing), Some(requested)) => VindexError::CollectionDimensionMismatch {
                        collection: self.collection.unwrap_or_default(),
                        existing,
                        requested,
                    },
                    _ => VindexError::config(self.message),
                }
            }
            "COLLECTION_METRIC_MISMATCH" => VindexError::CollectionMetricMismatch {
                collection: self.collection.unwrap_or_default(),
                existing: self.existing.unwrap_or_default(),
                requested: self.requested.unwrap_or_default(),
            },
            "DIMENSION_MISMATCH" => match (number(&self.existing), number(&self.requested)) {
                (Some(expected), Some(actual)) => VindexError::DimensionMismatch { expected, actual },
                _ => VindexError::config(self.message),
            },
            "CONFIG_ERROR" => VindexError::config(self.message),
            _ => VindexError::backend(operation, format!("server error: {}", self.message)),
        }
    }
}
