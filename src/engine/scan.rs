//! Discovery of image files to index.

use crate::error::{VindexError, VindexResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filters paths by extension and walks folders for supported images.
#[derive(Debug, Clone)]
pub struct ImageScanner {
    extensions: Vec<String>,
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new(crate::config::default_extensions())
    }
}

impl ImageScanner {
    /// Extensions are matched case-insensitively, with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
    }

    /// Supported files under `root`, sorted by path.
    ///
    /// Without `recursive` only the direct children of `root` are listed.
    /// Unreadable entries are skipped.
    pub fn scan(&self, root: &Path, recursive: bool) -> VindexResult<Vec<PathBuf>> {
        if !root.exists() {
            return Err(VindexError::PathNotFound {
                path: root.to_path_buf(),
            });
        }
        if !root.is_dir() {
            return Err(VindexError::config(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }

        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        Ok(walker
            .into_iter()
            .filter_map(Result::ok) // Skip files we can't access
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_supported(path))
            .collect())
    }
}
