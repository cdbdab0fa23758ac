//! Output management for CLI commands.
//!
//! Results go to stdout, diagnostics to stderr, so search output can be
//! piped. Text mode prints one line per hit; JSON mode prints one document.

use crate::engine::IndexReport;
use crate::error::VindexError;
use crate::io::exit_code::ExitCode;
use crate::vector::{CollectionInfo, SearchResult};
use serde::Serialize;
use std::io::{self, Write};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

#[derive(Serialize)]
struct IndexSummary<'a> {
    indexed: usize,
    skipped: Vec<SkippedEntry<'a>>,
    batches: usize,
}

#[derive(Serialize)]
struct SkippedEntry<'a> {
    path: std::borrow::Cow<'a, str>,
    reason: String,
}

/// Manages output formatting and display.
pub struct OutputManager {
    format: OutputFormat,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl OutputManager {
    /// Create a new output manager with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }

    /// Create an output manager with custom writers.
    pub fn new_with_writers(format: OutputFormat, stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        Self {
            format,
            stdout,
            stderr,
        }
    }

    fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        writeln!(self.stdout, "{}", serde_json::to_string_pretty(value)?)
    }

    /// Ranked hits as `"<rank>. Score: <score> | <path>"`.
    ///
    /// An empty result list is still a success.
    pub fn search_results(&mut self, results: &[SearchResult]) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => self.json(results)?,
            OutputFormat::Text => {
                if results.is_empty() {
                    writeln!(self.stderr, "No results found.")?;
                }
                for (rank, hit) in results.iter().enumerate() {
                    writeln!(
                        self.stdout,
                        "{}. Score: {:.4} | {}",
                        rank + 1,
                        hit.score,
                        hit.path
                    )?;
                }
            }
        }
        Ok(ExitCode::Success)
    }

    /// Image/text match score.
    pub fn similarity(&mut self, score: f32) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => self.json(&serde_json::json!({ "similarity": score }))?,
            OutputFormat::Text => writeln!(self.stdout, "Similarity: {score:.4}")?,
        }
        Ok(ExitCode::Success)
    }

    /// Indexing summary; skipped items are listed on stderr in text mode.
    pub fn index_report(&mut self, report: &IndexReport) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => {
                let summary = IndexSummary {
                    indexed: report.indexed,
                    skipped: report
                        .skipped
                        .iter()
                        .map(|s| SkippedEntry {
                            path: s.path.to_string_lossy(),
                            reason: s.reason.to_string(),
                        })
                        .collect(),
                    batches: report.batches,
                };
                self.json(&summary)?;
            }
            OutputFormat::Text => {
                for item in &report.skipped {
                    writeln!(self.stderr, "Skipped {}: {}", item.path.display(), item.reason)?;
                }
                if report.skipped.is_empty() {
                    writeln!(self.stdout, "Indexed {} images", report.indexed)?;
                } else {
                    writeln!(
                        self.stdout,
                        "Indexed {} images ({} skipped)",
                        report.indexed,
                        report.skipped.len()
                    )?;
                }
            }
        }
        Ok(ExitCode::Success)
    }

    /// Collection description; text mode renders a table.
    pub fn collection_info(&mut self, info: &CollectionInfo, location: &str) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => self.json(&serde_json::json!({
                "location": location,
                "collection": info,
            }))?,
            OutputFormat::Text => {
                let table = crate::display::tables::collection_table(info, location);
                writeln!(self.stdout, "{table}")?;
            }
        }
        Ok(ExitCode::Success)
    }

    /// Output an error with suggestions.
    pub fn error(&mut self, error: &VindexError) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => {
                let body = crate::store::protocol::ErrorBody::from_error(error);
                writeln!(self.stderr, "{}", serde_json::to_string_pretty(&body)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stderr, "Error: {error}")?;
                for suggestion in error.recovery_suggestions() {
                    writeln!(self.stderr, "  Suggestion: {suggestion}")?;
                }
            }
        }
        Ok(ExitCode::from_error(error))
    }

    /// Raw line on stdout, used by `config` to print TOML.
    pub fn raw(&mut self, text: &str) -> io::Result<ExitCode> {
        writeln!(self.stdout, "{text}")?;
        Ok(ExitCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SkipReason, SkippedItem};
    use crate::vector::RecordId;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn manager(format: OutputFormat) -> (OutputManager, SharedBuf, SharedBuf) {
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let manager = OutputManager::new_with_writers(format, Box::new(out.clone()), Box::new(err.clone()));
        (manager, out, err)
    }

    #[test]
    fn test_search_result_lines() {
        let (mut manager, out, err) = manager(OutputFormat::Text);
        let results = vec![
            SearchResult::new(RecordId::new(0), "imgs/cat.jpg", 0.91234),
            SearchResult::new(RecordId::new(2), "imgs/car.jpg", 0.5),
        ];
        assert_eq!(manager.search_results(&results).unwrap(), ExitCode::Success);
        assert_eq!(
            out.text(),
            "1. Score: 0.9123 | imgs/cat.jpg\n2. Score: 0.5000 | imgs/car.jpg\n"
        );
        assert!(err.text().is_empty());
    }

    #[test]
    fn test_empty_results_are_success() {
        let (mut manager, out, err) = manager(OutputFormat::Text);
        assert_eq!(manager.search_results(&[]).unwrap(), ExitCode::Success);
        assert!(out.text().is_empty());
        assert!(err.text().contains("No results"));
    }

    #[test]
    fn test_similarity_line() {
        let (mut manager, out, _) = manager(OutputFormat::Text);
        manager.similarity(0.61789).unwrap();
        assert_eq!(out.text(), "Similarity: 0.6179\n");
    }

    #[test]
    fn test_json_results() {
        let (mut manager, out, _) = manager(OutputFormat::Json);
        manager
            .search_results(&[SearchResult::new(RecordId::new(4), "a.png", 0.25)])
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.text()).unwrap();
        assert_eq!(value[0]["id"], 4);
        assert_eq!(value[0]["path"], "a.png");
    }

    #[test]
    fn test_index_report_lists_skipped_on_stderr() {
        let (mut manager, out, err) = manager(OutputFormat::Text);
        let report = IndexReport {
            indexed: 3,
            skipped: vec![SkippedItem {
                path: "bad.jpg".into(),
                reason: SkipReason::Unreadable("truncated".to_string()),
            }],
            batches: 1,
            next_id: Some(RecordId::new(3)),
        };
        manager.index_report(&report).unwrap();
        assert_eq!(out.text(), "Indexed 3 images (1 skipped)\n");
        assert!(err.text().contains("bad.jpg"));
    }

    #[test]
    fn test_error_exit_code_and_suggestions() {
        let (mut manager, _, err) = manager(OutputFormat::Text);
        let code = manager
            .error(&VindexError::CollectionNotFound {
                name: "c".to_string(),
            })
            .unwrap();
        assert_eq!(code, ExitCode::NotFound);
        assert!(err.text().contains("Suggestion"));
    }
}
