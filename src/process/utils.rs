/// Trim whitespace and drop every double-quote character.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('"') {
        trimmed.replace('"', "").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Force `row` to exactly `width` cells: extra cells are cut, missing ones
/// are filled with empty strings.
pub fn normalize_row(mut row: Vec<String>, width: usize) -> Vec<String> {
    row.truncate(width);
    row.resize(width, String::new());
    row
}
