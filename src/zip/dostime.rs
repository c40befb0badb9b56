//! MS-DOS date/time conversion.
//!
//! ZIP headers store modification times as a packed 32-bit value:
//!
//! ```text
//! bits 31-25  year - 1980      bits 15-11  hour
//! bits 24-21  month (1-12)     bits 10-5   minute
//! bits 20-16  day (1-31)       bits  4-0   second / 2
//! ```
//!
//! The encoding has a two second resolution and covers 1980-01-01 through
//! 2107-12-31. Conversions here treat the packed value as UTC; values
//! outside the representable range are clamped to its ends.

use chrono::{DateTime, Datelike, NaiveDate, Timelike};

/// 1980-01-01 00:00:00.
pub const DOS_EPOCH: u32 = (1 << 21) | (1 << 16);

/// 2107-12-31 23:59:58.
pub const DOS_MAX: u32 = (127 << 25) | (12 << 21) | (31 << 16) | (23 << 11) | (59 << 5) | 29;

/// `DOS_EPOCH` in seconds since the Unix epoch.
pub const DOS_EPOCH_UNIX: i64 = 315_532_800;

/// Convert seconds since the Unix epoch to a packed DOS date/time.
pub fn unix_to_dos(secs: i64) -> u32 {
    let Some(time) = DateTime::from_timestamp(secs, 0) else {
        return if secs < 0 { DOS_EPOCH } else { DOS_MAX };
    };
    let time = time.naive_utc();
    let year = time.year();
    if year < 1980 {
        return DOS_EPOCH;
    }
    if year > 2107 {
        return DOS_MAX;
    }
    ((year - 1980) as u32) << 25
        | time.month() << 21
        | time.day() << 16
        | time.hour() << 11
        | time.minute() << 5
        | time.second() / 2
}

/// Convert a packed DOS date/time to seconds since the Unix epoch.
///
/// Fields that do not form a valid calendar date decode to [`DOS_EPOCH_UNIX`].
pub fn dos_to_unix(dos: u32) -> i64 {
    let (year, month, day) = date_parts(dos);
    let (hour, minute, second) = time_parts(dos);
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .map(|time| time.and_utc().timestamp())
        .unwrap_or(DOS_EPOCH_UNIX)
}

/// Split the date half into (year, month, day)
pub fn date_parts(dos: u32) -> (u16, u8, u8) {
    let date = (dos >> 16) as u16;
    let day = (date & 0x1F) as u8;
    let month = ((date >> 5) & 0x0F) as u8;
    let year = ((date >> 9) & 0x7F) + 1980;
    (year, month, day)
}

/// Split the time half into (hour, minute, second)
pub fn time_parts(dos: u32) -> (u8, u8, u8) {
    let time = dos as u16;
    let second = ((time & 0x1F) * 2) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let hour = ((time >> 11) & 0x1F) as u8;
    (hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        // 2020-06-15 13:45:30 UTC
        let secs = 1_592_228_730;
        let dos = unix_to_dos(secs);
        assert_eq!(date_parts(dos), (2020, 6, 15));
        assert_eq!(time_parts(dos), (13, 45, 30));
        assert_eq!(dos_to_unix(dos), secs);
    }

    #[test]
    fn round_trip_stays_within_two_seconds() {
        let last = dos_to_unix(DOS_MAX);
        let step = 7_919_993; // prime stride, hits odd seconds and every month
        let mut secs = DOS_EPOCH_UNIX;
        while secs <= last {
            let back = dos_to_unix(unix_to_dos(secs));
            assert!(back <= secs && secs - back < 2, "{secs} -> {back}");
            secs += step;
        }
        assert_eq!(dos_to_unix(unix_to_dos(last + 1)), last);
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(unix_to_dos(0), DOS_EPOCH);
        assert_eq!(unix_to_dos(i64::MIN), DOS_EPOCH);
        assert_eq!(unix_to_dos(i64::MAX), DOS_MAX);
        assert_eq!(dos_to_unix(DOS_EPOCH), DOS_EPOCH_UNIX);
        assert_eq!(date_parts(unix_to_dos(5_000_000_000)), (2107, 12, 31));
    }

    #[test]
    fn invalid_packed_date_decodes_to_epoch() {
        // month 0, day 0
        assert_eq!(dos_to_unix(0), DOS_EPOCH_UNIX);
        // February 31st
        assert_eq!(dos_to_unix((40 << 25) | (2 << 21) | (31 << 16)), DOS_EPOCH_UNIX);
    }
}
