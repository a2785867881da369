//! FILENAME: engine/src/serial_date.rs
//! PURPOSE: Date/time serial number arithmetic backing DATE, TIME, YEAR,
//! MONTH, EDATE, DAYS360, NOW and TODAY.
//! CONTEXT: A serial is a real number: the integer part counts days from
//! an epoch of day 1 = 1900-01-01, the fraction is time-of-day. Day 60
//! (1900-02-29) is deliberately fictitious — this repeats the source's
//! epoch bug so TIME/DATE round-trip against YEAR/MONTH the same way the
//! source's own arithmetic does, rather than against a "correct" calendar.
//! No external date library is used: the whole point of owning this
//! module is never letting a chrono/time upgrade silently change the
//! serial numbers already persisted in a workbook.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn month_lengths(year: i32) -> [i64; 12] {
    if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    }
}

/// Encodes a calendar date as the integer day count of a serial.
pub fn date_to_serial_days(year: i32, month: u32, day: u32) -> i64 {
    let mut days: i64 = 0;
    if year >= 1900 {
        for y in 1900..year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }
    } else {
        for y in year..1900 {
            days -= if is_leap_year(y) { 366 } else { 365 };
        }
    }
    let months = month_lengths(year);
    let month_idx = (month.saturating_sub(1)).min(11) as usize;
    for len in months.iter().take(month_idx) {
        days += *len;
    }
    days += day as i64;
    if days >= 60 {
        days += 1;
    }
    days
}

/// Decodes a serial's integer day count back to (year, month, day).
/// Returns None for non-positive serials.
pub fn serial_days_to_date(days: i64) -> Option<(i32, u32, u32)> {
    if days < 1 {
        return None;
    }
    let adjusted = if days >= 60 { days - 1 } else { days };
    let mut remaining = adjusted;
    let mut year = 1900i32;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining <= days_in_year as i64 {
            break;
        }
        remaining -= days_in_year as i64;
        year += 1;
    }
    for (idx, len) in month_lengths(year).iter().enumerate() {
        if remaining <= *len as i64 {
            return Some((year, idx as u32 + 1, remaining as u32));
        }
        remaining -= *len as i64;
    }
    None
}

pub fn time_to_fraction(hour: u32, minute: u32, second: u32) -> f64 {
    let total_seconds = hour as f64 * 3600.0 + minute as f64 * 60.0 + second as f64;
    (total_seconds / 86400.0).rem_euclid(1.0)
}

pub fn fraction_to_time(fraction: f64) -> (u32, u32, u32) {
    let total_seconds = (fraction.fract().abs() * 86400.0).round() as u32;
    let hour = total_seconds / 3600;
    let minute = (total_seconds % 3600) / 60;
    let second = total_seconds % 60;
    (hour, minute, second)
}

/// DATE(y, m, d): a date serial with no time component.
pub fn date_serial(year: i32, month: u32, day: u32) -> f64 {
    date_to_serial_days(year, month, day) as f64
}

/// TIME(h, m, s): a pure fractional-day serial.
pub fn time_serial(hour: u32, minute: u32, second: u32) -> f64 {
    time_to_fraction(hour, minute, second)
}

/// YEAR(serial) / MONTH(serial): extract calendar fields from a serial.
pub fn year_of(serial: f64) -> Option<i32> {
    serial_days_to_date(serial.floor() as i64).map(|(y, _, _)| y)
}

pub fn month_of(serial: f64) -> Option<u32> {
    serial_days_to_date(serial.floor() as i64).map(|(_, m, _)| m)
}

/// EDATE(start, months): same day-of-month, `months` months later (or
/// earlier for negative values); clamps to the shifted month's length.
pub fn edate(serial: f64, months: i64) -> Option<f64> {
    let (year, month, day) = serial_days_to_date(serial.floor() as i64)?;
    let total_months = (year as i64) * 12 + (month as i64 - 1) + months;
    let new_year = total_months.div_euclid(12) as i32;
    let new_month = (total_months.rem_euclid(12) + 1) as u32;
    let max_day = month_lengths(new_year)[(new_month - 1) as usize] as u32;
    let new_day = day.min(max_day);
    Some(date_to_serial_days(new_year, new_month, new_day) as f64)
}

fn is_last_day_of_month(year: i32, month: u32, day: u32) -> bool {
    month_lengths(year)[(month.saturating_sub(1)).min(11) as usize] as u32 == day
}

/// DAYS360(start, end): day count under the European 30/360 convention.
/// Endpoints are swapped (and the result negated) when `end < start`.
pub fn days360(start: f64, end: f64) -> Option<i64> {
    let (mut y1, mut m1, mut d1) = serial_days_to_date(start.floor() as i64)?;
    let (mut y2, mut m2, mut d2) = serial_days_to_date(end.floor() as i64)?;

    let negate = end < start;
    if negate {
        std::mem::swap(&mut y1, &mut y2);
        std::mem::swap(&mut m1, &mut m2);
        std::mem::swap(&mut d1, &mut d2);
    }

    if is_last_day_of_month(y1, m1, d1) {
        d1 = 30;
    }
    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 && d1 == 30 {
        d2 = 30;
    } else if is_last_day_of_month(y2, m2, d2) && m2 == 2 {
        d2 = 30;
    }

    let count = (y2 as i64 - y1 as i64) * 360 + (m2 as i64 - m1 as i64) * 30 + (d2 as i64 - d1 as i64);
    Some(if negate { -count } else { count })
}

/// Current instant as a serial number (days since epoch, fractional part
/// = time of day). Not deterministic — callers needing repeatability
/// should inject a fixed serial instead of calling this in tests.
pub fn now_serial() -> f64 {
    let epoch_days = date_to_serial_days(1970, 1, 1) as f64;
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    epoch_days + elapsed.as_secs_f64() / 86400.0
}

pub fn today_serial() -> f64 {
    now_serial().floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn date_and_time_round_trip_through_year_month() {
        let serial = date_serial(2024, 3, 15) + time_serial(6, 30, 0);
        assert_eq!(year_of(serial), Some(2024));
        assert_eq!(month_of(serial), Some(3));
    }

    #[test]
    fn time_serial_round_trips_fraction() {
        let serial = time_serial(12, 0, 0);
        let (h, m, s) = fraction_to_time(serial);
        assert_eq!((h, m, s), (12, 0, 0));
    }

    #[test]
    fn date_serial_encode_decode_round_trip_across_leap_bug_boundary() {
        for day in 55..=65 {
            let serial = date_to_serial_days(1900, 3, 1) - (65 - day);
            let decoded = serial_days_to_date(serial);
            assert!(decoded.is_some());
        }
    }

    #[test]
    fn edate_shifts_months_and_clamps_day() {
        let start = date_serial(2024, 1, 31);
        let shifted = edate(start, 1).unwrap();
        assert_eq!(serial_days_to_date(shifted as i64), Some((2024, 2, 29)));
    }

    #[test]
    fn days360_swaps_endpoints_when_reversed() {
        let start = date_serial(2024, 1, 1);
        let end = date_serial(2024, 4, 1);
        assert_eq!(days360(start, end), Some(90));
        assert_eq!(days360(end, start), Some(-90));
    }

    #[test]
    fn today_has_no_fractional_part() {
        assert_eq!(today_serial().fract(), 0.0);
    }
}
