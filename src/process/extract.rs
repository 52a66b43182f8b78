// src/process/extract.rs

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use csv::StringRecord;
use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::process::{
    date_parser::format_serial_date,
    records::{is_blank, parse_records, write_records},
    utils::clean_str,
    RawGrid,
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read workbook {path:?}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("re-reading sheet text from {path:?}")]
    Records {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("workbook {path:?} has no sheets")]
    NoSheets { path: PathBuf },
    #[error("sheet {sheet:?} in {path:?} has {records} line(s); need a title and a header")]
    MissingHeader {
        path: PathBuf,
        sheet: String,
        records: usize,
    },
}

/// Load the first sheet of the workbook at `path` into a `RawGrid`.
///
/// The format is sniffed from the bytes rather than the extension, since the
/// publisher's `.xls` link has served other formats. The sheet is serialized
/// to pipe-delimited text first; the first line is a report title and is
/// dropped, the second is the header. Other sheets are ignored.
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn extract_grid(path: impl AsRef<Path>) -> Result<RawGrid, ParseError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|source| ParseError::Workbook {
            path: path.to_path_buf(),
            source,
        })?;

    let sheet_names = workbook.sheet_names();
    let Some(sheet) = sheet_names.first().cloned() else {
        return Err(ParseError::NoSheets {
            path: path.to_path_buf(),
        });
    };
    if sheet_names.len() > 1 {
        warn!(sheet = %sheet, ignored = sheet_names.len() - 1, "only the first sheet is read");
    }

    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(source)) => {
            return Err(ParseError::Workbook {
                path: path.to_path_buf(),
                source,
            })
        }
        None => {
            return Err(ParseError::NoSheets {
                path: path.to_path_buf(),
            })
        }
    };
    debug!(sheet = %sheet, rows = range.height(), cols = range.width(), "loaded sheet");

    let records = serialize_sheet(&range)
        .and_then(|text| parse_records(&text))
        .map_err(|source| ParseError::Records {
            path: path.to_path_buf(),
            source,
        })?;
    let count = records.len();
    let grid = grid_from_records(records).ok_or_else(|| ParseError::MissingHeader {
        path: path.to_path_buf(),
        sheet: sheet.clone(),
        records: count,
    })?;

    info!(
        sheet = %sheet,
        title = %grid.title,
        headers = grid.headers.len(),
        rows = grid.rows.len(),
        "extracted grid"
    );
    Ok(grid)
}

/// Render one cell the way the sheet would display it in plain text.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => format_serial_date(dt.as_f64()).unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Serialize the used range of a sheet, one record per row.
pub fn serialize_sheet(range: &Range<Data>) -> csv::Result<String> {
    write_records(range.rows().map(|row| row.iter().map(cell_to_string)))
}

/// Build a grid from parsed records. `None` when there is no header line.
pub fn grid_from_records(records: Vec<StringRecord>) -> Option<RawGrid> {
    let mut records = records.into_iter();
    let title = records.next()?;
    let header = records.next()?;

    let mut headers: Vec<String> = header.iter().map(clean_str).collect();
    while headers.last().is_some_and(|h| h.is_empty()) {
        headers.pop();
    }

    let rows = records
        .filter(|r| !is_blank(r))
        .map(|r| r.iter().map(|c| c.trim().to_string()).collect())
        .collect();

    Some(RawGrid {
        title: title
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        headers,
        rows,
    })
}
