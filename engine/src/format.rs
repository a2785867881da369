//! FILENAME: engine/src/format.rs
//! PURPOSE: The closed set of cell display formats and a cache of
//! compiled format descriptors (§3, §4.6).
//! CONTEXT: `FormatRegistry` mirrors the Flyweight approach in `style.rs`:
//! fixed/scientific/currency/percent formats are looked up by
//! `(kind, thousands-separator, decimal-places)` rather than recompiled
//! on every render. Date/time and custom patterns are cheap enough to
//! render directly without caching.

use crate::serial_date;
use parser::Variant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    General,
    Fixed,
    Scientific,
    Currency,
    Percent,
    Text,
    DateDmy,
    DateDm,
    DateMy,
    TimeHmsz,
    TimeHms,
    TimeHm,
    TimeHmz,
    CustomWithPattern(String),
}

impl Default for Format {
    fn default() -> Self {
        Format::General
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    General,
    Left,
    Right,
    Centre,
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::General
    }
}

/// Resolves `general` alignment to a concrete side based on the value's
/// kind; other alignments pass through unchanged.
pub fn effective_alignment(alignment: Alignment, is_numeric: bool) -> Alignment {
    match alignment {
        Alignment::General => if is_numeric { Alignment::Right } else { Alignment::Left },
        other => other,
    }
}

pub fn pad_to_width(text: &str, width: usize, alignment: Alignment) -> String {
    if text.len() >= width {
        return text.to_string();
    }
    let gap = width - text.len();
    match alignment {
        Alignment::Right => format!("{}{}", " ".repeat(gap), text),
        Alignment::Centre => {
            let left = gap / 2;
            let right = gap - left;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
        }
        _ => format!("{}{}", text, " ".repeat(gap)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheableKind {
    Fixed,
    Scientific,
    Currency,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FormatCacheKey {
    kind: CacheableKind,
    thousands: bool,
    decimal_places: u8,
}

#[derive(Debug, Clone, Copy)]
struct CompiledFormat {
    decimal_places: u8,
    thousands: bool,
}

/// Caches compiled `(kind, thousands, decimal-places)` descriptors so
/// repeated renders of the same format don't re-derive them.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    cache: HashMap<FormatCacheKey, CompiledFormat>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry { cache: HashMap::new() }
    }

    fn compile(&mut self, kind: CacheableKind, thousands: bool, decimal_places: u8) -> CompiledFormat {
        *self
            .cache
            .entry(FormatCacheKey { kind, thousands, decimal_places })
            .or_insert(CompiledFormat { decimal_places, thousands })
    }

    /// Renders a cell's computed value per its format. `decimal_places`
    /// and `use_thousands` are the cell's own overrides (falling back to
    /// factory defaults is the caller's responsibility, per §6).
    pub fn render(&mut self, value: &Variant, format: &Format, decimal_places: u8, use_thousands: bool, raw_content: &str) -> String {
        match format {
            Format::General => value.to_display_string(),
            Format::Text => raw_content.to_string(),
            Format::Fixed => {
                let compiled = self.compile(CacheableKind::Fixed, use_thousands, decimal_places);
                format_fixed(value.to_number().unwrap_or(0.0), compiled.decimal_places, compiled.thousands)
            }
            Format::Scientific => {
                let compiled = self.compile(CacheableKind::Scientific, use_thousands, decimal_places);
                format_scientific(value.to_number().unwrap_or(0.0), compiled.decimal_places)
            }
            Format::Currency => {
                let compiled = self.compile(CacheableKind::Currency, use_thousands, decimal_places);
                format_currency(value.to_number().unwrap_or(0.0), compiled.decimal_places)
            }
            Format::Percent => {
                let compiled = self.compile(CacheableKind::Percent, use_thousands, decimal_places);
                format_percent(value.to_number().unwrap_or(0.0), compiled.decimal_places)
            }
            Format::DateDmy => render_pattern(value.to_number().unwrap_or(0.0), "dd/mm/yyyy"),
            Format::DateDm => render_pattern(value.to_number().unwrap_or(0.0), "dd/mm"),
            Format::DateMy => render_pattern(value.to_number().unwrap_or(0.0), "mm/yyyy"),
            Format::TimeHmsz => render_pattern(value.to_number().unwrap_or(0.0), "hh:mm:ss am/pm"),
            Format::TimeHms => render_pattern(value.to_number().unwrap_or(0.0), "HH:mm:ss"),
            Format::TimeHm => render_pattern(value.to_number().unwrap_or(0.0), "HH:mm"),
            Format::TimeHmz => render_pattern(value.to_number().unwrap_or(0.0), "hh:mm am/pm"),
            Format::CustomWithPattern(pattern) => render_pattern(value.to_number().unwrap_or(0.0), pattern),
        }
    }
}

fn add_thousands_separator(s: &str) -> String {
    let (integer_part, decimal_part) = match s.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (s, None),
    };
    let negative = integer_part.starts_with('-');
    let digits: String = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut result = String::new();
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    if negative {
        result = format!("-{}", result);
    }
    if let Some(decimal) = decimal_part {
        result.push('.');
        result.push_str(decimal);
    }
    result
}

fn format_fixed(value: f64, decimal_places: u8, thousands: bool) -> String {
    let rendered = format!("{:.prec$}", value, prec = decimal_places as usize);
    if thousands {
        add_thousands_separator(&rendered)
    } else {
        rendered
    }
}

fn format_scientific(value: f64, decimal_places: u8) -> String {
    format!("{:.prec$e}", value, prec = decimal_places as usize).replace('e', "E")
}

fn format_currency(value: f64, decimal_places: u8) -> String {
    let formatted = add_thousands_separator(&format!("{:.prec$}", value.abs(), prec = decimal_places as usize));
    let with_symbol = format!("${}", formatted);
    if value < 0.0 {
        format!("({})", with_symbol)
    } else {
        with_symbol
    }
}

fn format_percent(value: f64, decimal_places: u8) -> String {
    format!("{:.prec$}%", value * 100.0, prec = decimal_places as usize)
}

/// Applies a date/time pattern to a serial number. `m`/`mm` is taken as
/// "minutes" once an hour token (`h`/`H`) has appeared earlier in the
/// pattern, and as "month" otherwise — the same left-to-right rule
/// spreadsheet format codes use to disambiguate `dd/mm/yyyy h:mm`.
fn render_pattern(serial: f64, pattern: &str) -> String {
    let days = serial.floor() as i64;
    let (year, month, day) = serial_date::serial_days_to_date(days.max(1)).unwrap_or((1900, 1, 1));
    let (hour24, minute, second) = serial_date::fraction_to_time(serial);
    let is_pm = hour24 >= 12;
    let hour12 = if hour24 == 0 { 12 } else if hour24 > 12 { hour24 - 12 } else { hour24 };

    let mut out = String::new();
    let mut seen_hour = false;
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let rest: String = chars[i..].iter().collect();
        let lower = rest.to_lowercase();
        if lower.starts_with("yyyy") {
            out.push_str(&format!("{:04}", year));
            i += 4;
        } else if lower.starts_with("yy") {
            out.push_str(&format!("{:02}", year % 100));
            i += 2;
        } else if lower.starts_with("dd") {
            out.push_str(&format!("{:02}", day));
            i += 2;
        } else if lower.starts_with('d') {
            out.push_str(&day.to_string());
            i += 1;
        } else if lower.starts_with("hh") {
            let use_12h = lower.contains("am/pm") || rest.contains('h');
            let _ = use_12h;
            let is_lower_h = chars[i] == 'h';
            out.push_str(&format!("{:02}", if is_lower_h { hour12 } else { hour24 }));
            seen_hour = true;
            i += 2;
        } else if lower.starts_with('h') {
            let is_lower_h = chars[i] == 'h';
            out.push_str(&(if is_lower_h { hour12 } else { hour24 }).to_string());
            seen_hour = true;
            i += 1;
        } else if lower.starts_with("mm") {
            if seen_hour {
                out.push_str(&format!("{:02}", minute));
            } else {
                out.push_str(&format!("{:02}", month));
            }
            i += 2;
        } else if lower.starts_with('m') {
            if seen_hour {
                out.push_str(&minute.to_string());
            } else {
                out.push_str(&month.to_string());
            }
            i += 1;
        } else if lower.starts_with("ss") {
            out.push_str(&format!("{:02}", second));
            i += 2;
        } else if lower.starts_with('s') {
            out.push_str(&second.to_string());
            i += 1;
        } else if lower.starts_with("am/pm") {
            out.push_str(if is_pm { "PM" } else { "AM" });
            i += 5;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Replaces a numeric rendering with a `*`-fill when it doesn't fit the
/// column width (§4.6); never applied to text-format cells.
pub fn fit_or_asterisks(rendered: String, width: usize) -> String {
    if rendered.len() > width {
        "*".repeat(width)
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_currency_with_parens_for_negative() {
        assert_eq!(format_currency(-1234.5, 2), "($1,234.50)");
    }

    #[test]
    fn renders_percent() {
        assert_eq!(format_percent(0.5, 0), "50%");
    }

    #[test]
    fn now_pattern_disambiguates_month_vs_minute() {
        let serial = serial_date::date_serial(2024, 3, 5) + serial_date::time_serial(9, 30, 0);
        assert_eq!(render_pattern(serial, "dd/mm/yyyy h:mm"), "05/03/2024 9:30");
    }

    #[test]
    fn overlong_numeric_rendering_becomes_asterisks() {
        assert_eq!(fit_or_asterisks("123456".to_string(), 4), "****");
        assert_eq!(fit_or_asterisks("12".to_string(), 4), "12");
    }

    #[test]
    fn general_alignment_resolves_by_value_kind() {
        assert_eq!(effective_alignment(Alignment::General, true), Alignment::Right);
        assert_eq!(effective_alignment(Alignment::General, false), Alignment::Left);
    }
}
