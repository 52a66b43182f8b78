// src/process/mod.rs

pub mod date_parser;
pub mod extract;
pub mod locate;
pub mod records;
pub mod utils;

pub use extract::{extract_grid, ParseError};
pub use locate::{locate_fields, FieldIndex};

/// The first sheet of the source workbook, split into title, header and data.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGrid {
    /// Text of the discarded first line (the report title).
    pub title: String,
    /// Normalized header names, trailing blanks removed.
    pub headers: Vec<String>,
    /// Data rows as read; widths may differ from `headers`.
    pub rows: Vec<Vec<String>>,
}

impl RawGrid {
    /// Data rows forced to the header width.
    pub fn normalized_rows(self) -> (Vec<String>, Vec<Vec<String>>) {
        let width = self.headers.len();
        let rows = self
            .rows
            .into_iter()
            .map(|row| utils::normalize_row(row, width))
            .collect();
        (self.headers, rows)
    }
}
