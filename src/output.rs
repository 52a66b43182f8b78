// src/output.rs

use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;

use crate::geocode::Coordinate;
use crate::process::records::DELIMITER;

pub const LATITUDE_HEADER: &str = "Latitude";
pub const LONGITUDE_HEADER: &str = "Longitude";

/// Output cells never carry quotes, and anything that would split a cell or
/// a line becomes a space.
pub fn sanitize_cell(cell: &str) -> String {
    cell.chars()
        .filter(|c| *c != '"')
        .map(|c| match c {
            '|' | '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}

/// The two trailing coordinate fields; empty strings when there is no hit.
pub fn coordinate_fields(coord: Option<Coordinate>) -> [String; 2] {
    match coord {
        Some(c) => [c.lat.to_string(), c.lng.to_string()],
        None => [String::new(), String::new()],
    }
}

/// Render the header plus one line per row. Lines are `\n` separated with no
/// trailing newline.
pub fn render_table(
    headers: &[String],
    rows: &[Vec<String>],
    coords: &[Option<Coordinate>],
) -> csv::Result<String> {
    // cells are sanitized first, so nothing ever needs quoting
    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(
        headers
            .iter()
            .map(String::as_str)
            .chain([LATITUDE_HEADER, LONGITUDE_HEADER])
            .map(sanitize_cell),
    )?;
    for (i, row) in rows.iter().enumerate() {
        let [lat, lng] = coordinate_fields(coords.get(i).copied().flatten());
        writer.write_record(
            row.iter()
                .map(String::as_str)
                .chain([lat.as_str(), lng.as_str()])
                .map(sanitize_cell),
        )?;
    }

    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    let mut table = String::from_utf8_lossy(&bytes).into_owned();
    if table.ends_with('\n') {
        table.pop();
    }
    Ok(table)
}

/// Write `contents` to a temp file beside `path`, then rename it into place.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        out.write_all(contents.as_bytes())?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn zero_and_missing_render_differently() -> anyhow::Result<()> {
        let headers = strings(&["Premises Address"]);
        let rows = vec![strings(&["Null Island"]), strings(&["Nowhere"])];
        let coords = vec![Some(Coordinate { lat: 0.0, lng: 0.0 }), None];

        let table = render_table(&headers, &rows, &coords)?;
        let lines: Vec<&str> = table.split('\n').collect();
        assert_eq!(lines[0], "Premises Address|Latitude|Longitude");
        assert_eq!(lines[1], "Null Island|0|0");
        assert_eq!(lines[2], "Nowhere||");
        Ok(())
    }

    #[test]
    fn quotes_and_delimiters_are_neutralised() -> anyhow::Result<()> {
        let headers = strings(&["\"Premises Address\"", "Notes"]);
        let rows = vec![strings(&["Flat 1|2 \"Rear\"", "two\nlines"])];
        let table = render_table(&headers, &rows, &[None])?;
        assert_eq!(
            table,
            "Premises Address|Notes|Latitude|Longitude\nFlat 1 2 Rear|two lines||"
        );
        for line in table.lines() {
            assert_eq!(line.matches('|').count(), 3);
        }
        Ok(())
    }

    #[test]
    fn coordinates_use_shortest_form() {
        let [lat, lng] = coordinate_fields(Some(Coordinate {
            lat: 55.95,
            lng: -3.19,
        }));
        assert_eq!((lat.as_str(), lng.as_str()), ("55.95", "-3.19"));
    }

    #[test]
    fn no_trailing_newline() -> anyhow::Result<()> {
        let table = render_table(&strings(&["A"]), &[strings(&["1"])], &[None])?;
        assert_eq!(table, "A|Latitude|Longitude\n1||");
        Ok(())
    }

    #[test]
    fn single_empty_cell_rows_stay_unquoted() -> anyhow::Result<()> {
        let table = render_table(&strings(&["A"]), &[strings(&[""])], &[None])?;
        assert_eq!(table, "A|Latitude|Longitude\n||");
        Ok(())
    }

    #[test]
    fn atomic_write_replaces_and_cleans_up() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("short_term_lets.csv");
        fs::write(&path, "old")?;

        write_atomic(&path, "A|Latitude|Longitude\n1||")?;
        assert_eq!(fs::read_to_string(&path)?, "A|Latitude|Longitude\n1||");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
