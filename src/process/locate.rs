/// Column positions the geocoding step cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldIndex {
    pub address: Option<usize>,
    pub postcode: Option<usize>,
}

const ADDRESS_NEEDLE: &str = "premises address";
const POSTCODE_NEEDLE: &str = "postcode";

fn find_column(headers: &[String], needle: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.to_lowercase().contains(needle))
}

/// First header containing "premises address" / "postcode", ignoring case.
pub fn locate_fields(headers: &[String]) -> FieldIndex {
    FieldIndex {
        address: find_column(headers, ADDRESS_NEEDLE),
        postcode: find_column(headers, POSTCODE_NEEDLE),
    }
}
