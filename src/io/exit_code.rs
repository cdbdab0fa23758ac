//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success, including searches that return no results
//! - `1`: General error - unspecified failure
//! - `3-8`: Specific errors scripts can react to
//! - `126-255`: Reserved by shell

use crate::error::VindexError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Input path or collection not found (code 3)
    NotFound = 3,

    /// Image could not be decoded (code 4)
    DecodeError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error, including collection mismatches (code 6)
    ConfigError = 6,

    /// Vector store unreachable or failed (code 7)
    BackendError = 7,

    /// Record id collision (code 8)
    DuplicateId = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert a `VindexError` to the appropriate exit code.
    pub fn from_error(error: &VindexError) -> Self {
        match error {
            VindexError::PathNotFound { .. } | VindexError::CollectionNotFound { .. } => {
                ExitCode::NotFound
            }
            VindexError::Decode { .. } => ExitCode::DecodeError,
            VindexError::Io { .. } => ExitCode::IoError,
            VindexError::DuplicateId { .. } => ExitCode::DuplicateId,
            VindexError::Backend { .. } => ExitCode::BackendError,
            e if e.is_config() => ExitCode::ConfigError,
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::NotFound => "Not found",
            ExitCode::DecodeError => "Image decode error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::BackendError => "Vector store error",
            ExitCode::DuplicateId => "Duplicate record id",
        }
    }
}
