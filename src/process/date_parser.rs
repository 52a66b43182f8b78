use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

/// Day zero of the 1900 date system as the spreadsheet apps count it
/// (already shifted past the phantom 1900-02-29).
fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Serial day number → `NaiveDateTime`, rounded to the nearest second.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 2958465 is 9999-12-31, the last date a sheet can hold
    if !serial.is_finite() || !(0.0..=2_958_466.0).contains(&serial) {
        return None;
    }
    let secs = (serial * 86_400.0).round() as i64;
    excel_epoch()?.checked_add_signed(Duration::seconds(secs))
}

/// Render a serial date as `dd/mm/yyyy`, adding ` HH:MM:SS` only when the
/// value carries a time of day.
pub fn format_serial_date(serial: f64) -> Option<String> {
    let dt = serial_to_datetime(serial)?;
    if dt.time().num_seconds_from_midnight() == 0 {
        Some(dt.format("%d/%m/%Y").to_string())
    } else {
        Some(dt.format("%d/%m/%Y %H:%M:%S").to_string())
    }
}
