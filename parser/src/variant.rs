//! FILENAME: parser/src/variant.rs
//! PURPOSE: The tagged value type that flows through formula evaluation.
//! CONTEXT: Every literal, cell value, and function result is a Variant.
//! Coercion rules here are deliberately permissive (numbers parse out of
//! strings, booleans coerce to 0/1) so that formulas behave the way a
//! spreadsheet user expects rather than the way a type-checker would like.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Numbers within this distance of each other compare equal. Matches the
/// source's tolerance; kept as a constant rather than a true global so
/// callers can see exactly where it's used.
pub const EQUALITY_EPSILON: f64 = 0.01;

/// A tagged numeric/string/boolean/empty value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Variant {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Empty
    }
}

/// Failure to coerce a Variant the way an operator needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantError {
    NumericCoercion,
    DivideByZero,
}

impl fmt::Display for VariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantError::NumericCoercion => write!(f, "value cannot be coerced to a number"),
            VariantError::DivideByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for VariantError {}

pub type VariantResult = Result<Variant, VariantError>;

/// Ordinal used when two Variants of different tags must be ordered
/// lexicographically rather than coerced (empty < number < text).
fn tag_rank(v: &Variant) -> u8 {
    match v {
        Variant::Empty => 0,
        Variant::Number(_) => 1,
        Variant::Boolean(_) => 1,
        Variant::Text(_) => 2,
    }
}

impl Variant {
    pub fn has_value(&self) -> bool {
        !matches!(self, Variant::Empty)
    }

    /// Coerce to a number. Text coerces when it parses as a decimal
    /// literal (trimmed); booleans coerce to 1.0/0.0; empty coerces to 0.0.
    pub fn to_number(&self) -> Result<f64, VariantError> {
        match self {
            Variant::Empty => Ok(0.0),
            Variant::Number(n) => Ok(*n),
            Variant::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Variant::Text(s) => s.trim().parse::<f64>().map_err(|_| VariantError::NumericCoercion),
        }
    }

    /// General-format rendering, used by concatenation and text coercion.
    pub fn to_display_string(&self) -> String {
        match self {
            Variant::Empty => String::new(),
            Variant::Number(n) => crate::variant::format_general(*n),
            Variant::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Variant::Text(s) => s.clone(),
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Variant::Empty => false,
            Variant::Number(n) => *n != 0.0,
            Variant::Boolean(b) => *b,
            Variant::Text(s) => !s.is_empty(),
        }
    }

    pub fn add(&self, other: &Variant) -> VariantResult {
        Ok(Variant::Number(self.to_number()? + other.to_number()?))
    }

    pub fn sub(&self, other: &Variant) -> VariantResult {
        Ok(Variant::Number(self.to_number()? - other.to_number()?))
    }

    pub fn mul(&self, other: &Variant) -> VariantResult {
        Ok(Variant::Number(self.to_number()? * other.to_number()?))
    }

    pub fn div(&self, other: &Variant) -> VariantResult {
        let rhs = other.to_number()?;
        if rhs == 0.0 {
            return Err(VariantError::DivideByZero);
        }
        Ok(Variant::Number(self.to_number()? / rhs))
    }

    pub fn pow(&self, other: &Variant) -> VariantResult {
        Ok(Variant::Number(self.to_number()?.powf(other.to_number()?)))
    }

    pub fn negate(&self) -> VariantResult {
        Ok(Variant::Number(-self.to_number()?))
    }

    pub fn concat(&self, other: &Variant) -> VariantResult {
        Ok(Variant::Text(format!("{}{}", self.to_display_string(), other.to_display_string())))
    }

    /// Comparison used by `= <> < <= > >=`. Numbers (and booleans, coerced)
    /// compare numerically within EQUALITY_EPSILON; a number vs. a string
    /// coerces the string when it parses, else falls back to tag order.
    pub fn compare(&self, other: &Variant) -> Ordering {
        let both_numeric = matches!(self, Variant::Number(_) | Variant::Boolean(_) | Variant::Empty)
            && matches!(other, Variant::Number(_) | Variant::Boolean(_) | Variant::Empty);
        if both_numeric {
            return compare_numbers(self.to_number().unwrap_or(0.0), other.to_number().unwrap_or(0.0));
        }
        if let (Ok(a), Ok(b)) = (self.to_number(), other.to_number()) {
            return compare_numbers(a, b);
        }
        let rank_cmp = tag_rank(self).cmp(&tag_rank(other));
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }
        self.to_display_string().cmp(&other.to_display_string())
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    if (a - b).abs() < EQUALITY_EPSILON {
        Ordering::Equal
    } else {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

/// "General" numeric rendering: integers print bare, decimals trim
/// trailing zeros, very large/small magnitudes switch to scientific form.
pub fn format_general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let abs_value = value.abs();
    if abs_value >= 1e10 || abs_value < 1e-4 {
        return format!("{:.5e}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string();
    }
    if value.fract() == 0.0 && abs_value < 1e15 {
        return format!("{:.0}", value);
    }
    format!("{:.10}", value)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numeric_equality_tolerates_epsilon() {
        assert_eq!(Variant::Number(1.0), Variant::Number(1.005));
        assert_ne!(Variant::Number(1.0), Variant::Number(1.02));
    }

    #[test]
    fn string_number_comparison_coerces_when_parseable() {
        let a = Variant::Number(10.0);
        let b = Variant::Text("10".to_string());
        assert_eq!(a.compare(&b), Ordering::Equal);
    }

    #[test]
    fn string_number_comparison_falls_back_to_tag_order() {
        let a = Variant::Number(10.0);
        let b = Variant::Text("ten".to_string());
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn empty_has_no_value() {
        assert!(!Variant::Empty.has_value());
        assert!(Variant::Number(0.0).has_value());
    }

    #[test]
    fn division_by_zero_errors() {
        assert_eq!(Variant::Number(1.0).div(&Variant::Number(0.0)), Err(VariantError::DivideByZero));
    }

    #[test]
    fn concat_coerces_general_rendering() {
        let result = Variant::Text("x=".to_string()).concat(&Variant::Number(3.5)).unwrap();
        assert_eq!(result.to_display_string(), "x=3.5");
    }
}
