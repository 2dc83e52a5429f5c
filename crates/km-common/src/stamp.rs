//! Timestamp formatting for run keys and human-facing titles.

use chrono::{DateTime, Local};

/// Record key for a run: `YYYY_MM_DD-hh_mm` in local time.
///
/// Two runs started within the same minute share a key.
pub fn record_key(started_at: &DateTime<Local>) -> String {
    started_at.format("%Y_%m_%d-%H_%M").to_string()
}

/// Title stamp used in notification subjects and plot titles.
pub fn display_stamp(started_at: &DateTime<Local>) -> String {
    started_at.format("%Y/%m/%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_and_stamp_formats() {
        let t = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 42).unwrap();
        assert_eq!(record_key(&t), "2024_03_05-14_07");
        assert_eq!(display_stamp(&t), "2024/03/05 14:07");
    }

    #[test]
    fn same_minute_shares_key() {
        let a = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 1).unwrap();
        let b = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 59).unwrap();
        assert_eq!(record_key(&a), record_key(&b));
    }
}
