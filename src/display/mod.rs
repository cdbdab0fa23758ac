//! Terminal display utilities for CLI output.
//!
//! Provides styled tables, progress bars, and themed status lines.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{create_progress_bar, create_spinner, index_progress_callback, with_spinner};
pub use tables::{TableBuilder, collection_table, models_table};
pub use theme::{THEME, Theme};
