//! Pipe-delimited text records.
//!
//! A cell is wrapped in double quotes when it contains the delimiter, a quote
//! or a line break; embedded quotes are doubled. `parse_records` reads the
//! same convention back, including quoted line breaks.

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};

pub const DELIMITER: u8 = b'|';

/// Serialize rows, one `\n`-terminated record each. No trailing delimiter.
pub fn write_records<I, R, S>(rows: I) -> csv::Result<String>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    // every field came in as UTF-8
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Split text into records. Rows may differ in width; empty lines produce no
/// record.
pub fn parse_records(text: &str) -> csv::Result<Vec<StringRecord>> {
    ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .into_records()
        .collect()
}

/// A line with no delimiter and nothing but whitespace in it.
pub fn is_blank(record: &StringRecord) -> bool {
    record.len() <= 1 && record.iter().all(|c| c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(records: &[StringRecord]) -> Vec<Vec<&str>> {
        records.iter().map(|r| r.iter().collect()).collect()
    }

    #[test]
    fn plain_cells_are_not_quoted() -> anyhow::Result<()> {
        assert_eq!(write_records([["a", "", "c d"]])?, "a||c d\n");
        Ok(())
    }

    #[test]
    fn awkward_cells_survive_a_round_trip() -> anyhow::Result<()> {
        let row = ["Flat 1|2", "the \"Old\" Mill", "line one\nline two", "plain"];
        let text = write_records([row])?;
        assert_eq!(
            text,
            "\"Flat 1|2\"|\"the \"\"Old\"\" Mill\"|\"line one\nline two\"|plain\n"
        );

        let parsed = parse_records(&text)?;
        assert_eq!(cells(&parsed), vec![row.to_vec()]);
        Ok(())
    }

    #[test]
    fn splits_lines_and_keeps_empty_cells() -> anyhow::Result<()> {
        let parsed = parse_records("Title||\r\nA|B|\n\n   \n1|2|3")?;
        assert_eq!(
            cells(&parsed),
            vec![
                vec!["Title", "", ""],
                vec!["A", "B", ""],
                vec!["   "],
                vec!["1", "2", "3"],
            ]
        );
        let blank: Vec<bool> = parsed.iter().map(is_blank).collect();
        assert_eq!(blank, vec![false, false, true, false]);
        Ok(())
    }

    #[test]
    fn all_delimiter_line_is_not_blank() -> anyhow::Result<()> {
        let parsed = parse_records("||")?;
        assert_eq!(parsed[0].len(), 3);
        assert!(!is_blank(&parsed[0]));
        Ok(())
    }

    #[test]
    fn quote_inside_unquoted_cell_is_literal() -> anyhow::Result<()> {
        let parsed = parse_records("12\" pipe|x")?;
        assert_eq!(cells(&parsed), vec![vec!["12\" pipe", "x"]]);
        Ok(())
    }

    #[test]
    fn trailing_newline_does_not_add_a_record() -> anyhow::Result<()> {
        assert_eq!(parse_records("a|b\n")?.len(), 1);
        assert!(parse_records("")?.is_empty());
        Ok(())
    }
}
