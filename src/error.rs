//! Error types for the multimodal search engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::vector::RecordId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for encoding, storage and search operations
#[derive(Error, Debug)]
pub enum VindexError {
    /// Configuration errors (bad settings, unknown model, invalid backend address)
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error(
        "Collection '{collection}' has dimension {existing}, but dimension {requested} was requested"
    )]
    CollectionDimensionMismatch {
        collection: String,
        existing: usize,
        requested: usize,
    },

    #[error("Collection '{collection}' uses metric '{existing}', but '{requested}' was requested")]
    CollectionMetricMismatch {
        collection: String,
        existing: String,
        requested: String,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Image could not be read or decoded
    #[error("Failed to decode image '{source_name}': {reason}")]
    Decode { source_name: String, reason: String },

    /// Missing input folder or file
    #[error("Path not found: '{path}'")]
    PathNotFound { path: PathBuf },

    #[error("Collection '{name}' not found. Index some images first.")]
    CollectionNotFound { name: String },

    #[error("Record id {id} already exists in collection '{collection}'")]
    DuplicateId { collection: String, id: RecordId },

    /// Store unreachable or a storage operation failed
    #[error("Vector store backend failed during {operation}: {reason}")]
    Backend { operation: String, reason: String },

    /// The embedding model failed to produce vectors
    #[error("Embedding generation failed: {reason}")]
    Encoding { reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl VindexError {
    /// Shorthand for a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Shorthand for a backend failure.
    pub fn backend(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an I/O failure tied to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// The remote protocol carries these strings so a client can rebuild
    /// the matching variant.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::CollectionDimensionMismatch { .. } => "COLLECTION_DIMENSION_MISMATCH",
            Self::CollectionMetricMismatch { .. } => "COLLECTION_METRIC_MISMATCH",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Decode { .. } => "DECODE_ERROR",
            Self::PathNotFound { .. } => "PATH_NOT_FOUND",
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::Backend { .. } => "BACKEND_ERROR",
            Self::Encoding { .. } => "ENCODING_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }

    /// True for the configuration family of errors.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::CollectionDimensionMismatch { .. }
                | Self::CollectionMetricMismatch { .. }
                | Self::DimensionMismatch { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::CollectionDimensionMismatch { .. } | Self::CollectionMetricMismatch { .. } => {
                vec![
                    "Use the same --model that created the collection",
                    "Or pick a new --collection name, or run 'vindex drop --yes' to start over",
                ]
            }
            Self::Config { .. } => vec![
                "Run 'vindex config' to inspect the effective settings",
                "Set either store.uri or store.host, not both",
            ],
            Self::CollectionNotFound { .. } => {
                vec!["Run 'vindex index --folder <path>' to create and fill the collection"]
            }
            Self::DuplicateId { .. } => vec![
                "Another indexer may have written to this collection concurrently",
                "Index from a single process, or switch indexing.id_strategy to \"content-hash\"",
            ],
            Self::Backend { .. } => vec![
                "Check that the vindex server is running and reachable",
                "Check disk space and permissions of the store directory",
            ],
            Self::Encoding { .. } => vec![
                "Verify the embedding model downloaded completely",
                "Remove the model cache directory to force a fresh download",
            ],
            Self::Decode { .. } => vec!["Check that the file is a valid image"],
            Self::PathNotFound { .. } => vec!["Check the path exists and is readable"],
            _ => vec![],
        }
    }
}

/// Result type alias for vindex operations
pub type VindexResult<T> = Result<T, VindexError>;
