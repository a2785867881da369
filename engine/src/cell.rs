//! FILENAME: engine/src/cell.rs
//! PURPOSE: The atomic unit of a sheet: raw content, parsed formula,
//! computed value, and rendering overrides (§3).
//! CONTEXT: Kept lightweight since a sheet may hold many of these —
//! formatting/style overrides are `Option`s that fall back to the
//! workbook's factory defaults (§6) rather than being duplicated per cell.

use crate::error::{ContentError, EvalError};
use crate::format::{Alignment, Format};
use parser::{CellLocation, Expr, Variant};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Empty,
    Number,
    Text,
    Formula,
    Error,
}

impl Default for CellKind {
    fn default() -> Self {
        CellKind::Empty
    }
}

/// The atomic unit of a sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub location: CellLocation,
    pub raw_content: String,
    /// Derived from `raw_content` by `set_content`; not persisted (see
    /// `format.rs`'s registry note — persistence stores content, the
    /// parse/evaluate pipeline regenerates everything derived from it).
    #[serde(skip, default)]
    pub kind: CellKind,
    #[serde(skip)]
    pub formula_tree: Option<Expr>,
    #[serde(skip, default)]
    pub computed_value: Variant,
    #[serde(skip, default)]
    pub eval_error: Option<EvalError>,
    pub format: Option<Format>,
    pub alignment: Option<Alignment>,
    pub decimal_places: Option<u8>,
    pub use_thousands_separator: Option<bool>,
    pub style_index: Option<usize>,
}

impl Cell {
    pub fn new(location: CellLocation) -> Self {
        Cell {
            location,
            raw_content: String::new(),
            kind: CellKind::Empty,
            formula_tree: None,
            computed_value: Variant::Empty,
            eval_error: None,
            format: None,
            alignment: None,
            decimal_places: None,
            use_thousands_separator: None,
            style_index: None,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.kind == CellKind::Formula
    }

    pub fn has_error(&self) -> bool {
        self.eval_error.is_some()
    }

    /// Applies the content decision tree from §4.6. `strict` controls
    /// what happens to a formula that fails to parse: lenient mode
    /// retains the text as-is (kind=text), strict mode marks the cell
    /// kind=error while still keeping the literal text in `raw_content`.
    pub fn set_content(&mut self, content: &str, strict: bool) -> Result<(), ContentError> {
        self.raw_content = content.to_string();
        self.eval_error = None;
        self.formula_tree = None;

        if let Some(formula_text) = content.strip_prefix('=') {
            return match parser::parse(formula_text, self.location.clone()) {
                Ok(expr) => {
                    self.kind = CellKind::Formula;
                    self.formula_tree = Some(expr);
                    self.computed_value = Variant::Empty;
                    Ok(())
                }
                Err(err) => {
                    let content_err: ContentError = err.into();
                    if strict {
                        self.kind = CellKind::Error;
                        self.computed_value = Variant::Empty;
                    } else {
                        self.kind = CellKind::Text;
                        self.computed_value = Variant::Text(content.to_string());
                    }
                    Err(content_err)
                }
            };
        }

        if let Some(serial) = parse_date_literal(content) {
            self.kind = CellKind::Number;
            self.computed_value = Variant::Number(serial);
            return Ok(());
        }
        if let Some(serial) = parse_time_literal(content) {
            self.kind = CellKind::Number;
            self.computed_value = Variant::Number(serial);
            return Ok(());
        }
        if let Ok(n) = content.trim().parse::<f64>() {
            self.kind = CellKind::Number;
            self.computed_value = Variant::Number(n);
            return Ok(());
        }
        if content.is_empty() {
            self.kind = CellKind::Empty;
            self.computed_value = Variant::Empty;
        } else {
            self.kind = CellKind::Text;
            self.computed_value = Variant::Text(content.to_string());
        }
        Ok(())
    }

    /// Applies the result of evaluating `formula_tree`: success clears
    /// `eval_error`; failure captures it and resets `computed_value` so a
    /// stale value is never shown alongside an error sentinel.
    pub fn apply_eval_result(&mut self, result: Result<Variant, EvalError>) {
        match result {
            Ok(value) => {
                self.computed_value = value;
                self.eval_error = None;
            }
            Err(err) => {
                self.computed_value = Variant::Empty;
                self.eval_error = Some(err);
            }
        }
    }

    pub fn value_display(&self) -> String {
        if let Some(err) = self.eval_error {
            return err.sentinel().to_string();
        }
        self.computed_value.to_display_string()
    }
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn month_index(word: &str) -> Option<u32> {
    let lower = word.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

/// Recognises `d-MMM`, `MMM-yyyy`, `d-MMM-yyyy` (§4.6 step 2). The current
/// year is used for the two-field forms since neither carries one.
fn parse_date_literal(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.split('-').collect();
    let this_year = crate::serial_date::year_of(crate::serial_date::today_serial()).unwrap_or(1900);
    match parts.as_slice() {
        [day, month] => {
            if let Ok(d) = day.parse::<u32>() {
                let m = month_index(month)?;
                return Some(crate::serial_date::date_serial(this_year, m, d));
            }
            let m = month_index(day)?;
            let y: i32 = month.parse().ok()?;
            Some(crate::serial_date::date_serial(y, m, 1))
        }
        [day, month, year] => {
            let d: u32 = day.parse().ok()?;
            let m = month_index(month)?;
            let y: i32 = year.parse().ok()?;
            Some(crate::serial_date::date_serial(y, m, d))
        }
        _ => None,
    }
}

/// Recognises `h:mm:ss` with an optional trailing `AM`/`PM` (§4.6 step 3).
fn parse_time_literal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let (body, meridiem) = if let Some(rest) = trimmed.to_ascii_uppercase().strip_suffix("PM") {
        (rest.trim().to_string(), Some(true))
    } else if let Some(rest) = trimmed.to_ascii_uppercase().strip_suffix("AM") {
        (rest.trim().to_string(), Some(false))
    } else {
        (trimmed.to_string(), None)
    };
    let fields: Vec<&str> = body.split(':').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return None;
    }
    let mut hour: u32 = fields[0].parse().ok()?;
    let minute: u32 = fields[1].parse().ok()?;
    let second: u32 = if fields.len() == 3 { fields[2].parse().ok()? } else { 0 };
    if minute > 59 || second > 59 {
        return None;
    }
    if let Some(is_pm) = meridiem {
        if hour == 0 || hour > 12 {
            return None;
        }
        hour = if is_pm && hour != 12 { hour + 12 } else if !is_pm && hour == 12 { 0 } else { hour };
    } else if hour > 23 {
        return None;
    }
    Some(crate::serial_date::time_serial(hour, minute, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn here() -> CellLocation {
        CellLocation::unqualified(1, 1)
    }

    #[test]
    fn plain_number_content_sets_number_kind() {
        let mut cell = Cell::new(here());
        cell.set_content("42", false).unwrap();
        assert_eq!(cell.kind, CellKind::Number);
        assert_eq!(cell.computed_value, Variant::Number(42.0));
    }

    #[test]
    fn formula_content_requires_leading_equals() {
        let mut cell = Cell::new(here());
        cell.set_content("=A1+1", false).unwrap();
        assert_eq!(cell.kind, CellKind::Formula);
        assert!(cell.formula_tree.is_some());
        assert!(cell.raw_content.starts_with('='));
    }

    #[test]
    fn invalid_formula_falls_back_to_text_in_lenient_mode() {
        let mut cell = Cell::new(here());
        let result = cell.set_content("=1+", false);
        assert!(result.is_err());
        assert_eq!(cell.kind, CellKind::Text);
    }

    #[test]
    fn invalid_formula_becomes_error_kind_in_strict_mode() {
        let mut cell = Cell::new(here());
        let result = cell.set_content("=1+", true);
        assert!(result.is_err());
        assert_eq!(cell.kind, CellKind::Error);
    }

    #[test]
    fn recognises_day_month_year_date_literal() {
        let mut cell = Cell::new(here());
        cell.set_content("5-Jan-2024", false).unwrap();
        assert_eq!(cell.kind, CellKind::Number);
        assert_eq!(crate::serial_date::year_of(cell.computed_value.to_number().unwrap()), Some(2024));
    }

    #[test]
    fn recognises_time_literal_with_meridiem() {
        let mut cell = Cell::new(here());
        cell.set_content("2:30:00 PM", false).unwrap();
        assert_eq!(cell.kind, CellKind::Number);
        let (h, m, _) = crate::serial_date::fraction_to_time(cell.computed_value.to_number().unwrap());
        assert_eq!((h, m), (14, 30));
    }

    #[test]
    fn eval_error_overrides_displayed_value() {
        let mut cell = Cell::new(here());
        cell.apply_eval_result(Err(EvalError::DivideByZero));
        assert_eq!(cell.value_display(), "#DIV/0!");
    }

    #[test]
    fn plain_text_falls_through_to_text_kind() {
        let mut cell = Cell::new(here());
        cell.set_content("hello", false).unwrap();
        assert_eq!(cell.kind, CellKind::Text);
    }

    #[test]
    fn serialized_cell_omits_derived_fields() {
        let mut cell = Cell::new(here());
        cell.set_content("=A1+1", false).unwrap();
        let json = serde_json::to_value(&cell).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("raw_content"));
        assert!(!obj.contains_key("kind"));
        assert!(!obj.contains_key("formula_tree"));
        assert!(!obj.contains_key("computed_value"));
    }
}
