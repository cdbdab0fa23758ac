//! Table formatting utilities for structured output.

use crate::vector::CollectionInfo;
use comfy_table::{Attribute, Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Two-column table describing a collection.
pub fn collection_table(info: &CollectionInfo, location: &str) -> String {
    TableBuilder::new()
        .set_headers(vec!["Property", "Value"])
        .add_row(vec!["Backend".to_string(), location.to_string()])
        .add_row(vec!["Collection".to_string(), info.name.clone()])
        .add_row(vec!["Dimension".to_string(), info.dimension.to_string()])
        .add_row(vec!["Metric".to_string(), info.metric.to_string()])
        .add_row(vec!["Records".to_string(), info.count.to_string()])
        .build()
}

/// Model registry listing.
pub fn models_table() -> String {
    crate::encoder::available_models()
        .into_iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Model", "Dimension", "Description"]),
            |table, spec| {
                table.add_row(vec![
                    spec.name.to_string(),
                    spec.dimension.to_string(),
                    spec.description.to_string(),
                ])
            },
        )
        .build()
}
