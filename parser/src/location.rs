//! FILENAME: parser/src/location.rs
//! PURPOSE: Cell addresses: the (sheet, column, row) triple and conversions
//! to/from the two textual notations a formula can use.
//! CONTEXT: Absolute form ("A1", "Sheet2!B10") is what a user types and what
//! the UI displays. Relative form ("R(-1)C(2)") is what persistence stores,
//! so that a formula's meaning survives being copied to a different cell.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_COLUMNS: u32 = 255;
pub const MAX_ROWS: u32 = 4096;

/// A fully-qualified cell address. `sheet = None` means "current sheet",
/// the meaning a bare reference has while still inside the formula that
/// wrote it; a graph edge always carries a concrete sheet name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellLocation {
    pub sheet: Option<String>,
    pub column: u32,
    pub row: u32,
}

impl CellLocation {
    pub fn new(sheet: Option<String>, column: u32, row: u32) -> Self {
        CellLocation { sheet, column, row }
    }

    pub fn in_sheet(sheet: impl Into<String>, column: u32, row: u32) -> Self {
        CellLocation { sheet: Some(sheet.into()), column, row }
    }

    pub fn unqualified(column: u32, row: u32) -> Self {
        CellLocation { sheet: None, column, row }
    }

    pub fn in_bounds(&self) -> bool {
        (1..=MAX_COLUMNS).contains(&self.column) && (1..=MAX_ROWS).contains(&self.row)
    }

    /// Resolve `self` against whichever sheet is current, producing a
    /// location that always carries a concrete sheet name.
    pub fn qualify(&self, current_sheet: &str) -> CellLocation {
        CellLocation {
            sheet: Some(self.sheet.clone().unwrap_or_else(|| current_sheet.to_string())),
            column: self.column,
            row: self.row,
        }
    }

    pub fn to_a1(&self) -> String {
        match &self.sheet {
            Some(sheet) => format!("{}!{}{}", sheet, column_to_letters(self.column), self.row),
            None => format!("{}{}", column_to_letters(self.column), self.row),
        }
    }
}

impl fmt::Display for CellLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

/// Row/column offsets relative to the cell that owns the formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeAddress {
    pub row_offset: i32,
    pub col_offset: i32,
}

impl RelativeAddress {
    pub fn from_absolute(source: &CellLocation, target_col: u32, target_row: u32) -> Self {
        RelativeAddress {
            row_offset: target_row as i32 - source.row as i32,
            col_offset: target_col as i32 - source.column as i32,
        }
    }

    /// Resolve back to an absolute (column, row) given the cell the
    /// formula now lives in. Returns None if the result falls below 1.
    pub fn resolve(&self, source: &CellLocation) -> Option<(u32, u32)> {
        let col = source.column as i32 + self.col_offset;
        let row = source.row as i32 + self.row_offset;
        if col < 1 || row < 1 {
            None
        } else {
            Some((col as u32, row as u32))
        }
    }

    pub fn to_raw_string(&self) -> String {
        format!("R({})C({})", self.row_offset, self.col_offset)
    }
}

/// `255` -> "IU"-style base-26 letters (A..Z, AA..AZ, ...), 1-based.
pub fn column_to_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Parses a (possibly multi-letter) column reference back to its 1-based
/// index. Returns None on anything that isn't pure ASCII letters.
pub fn letters_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut column: u32 = 0;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A' + 1) as u32;
        column = column * 26 + digit;
    }
    Some(column)
}

/// Splits "AB12" into ("AB", 12). Does not validate bounds.
pub fn split_letters_and_digits(s: &str) -> Option<(&str, &str)> {
    let split_at = s.find(|c: char| c.is_ascii_digit())?;
    if split_at == 0 {
        return None;
    }
    Some((&s[..split_at], &s[split_at..]))
}

/// Parses an absolute address, optionally sheet-qualified:
/// "A1", "AB12", "Sheet2!C4".
pub fn parse_absolute_address(text: &str) -> Option<CellLocation> {
    let (sheet, rest) = match text.rfind('!') {
        Some(idx) => (Some(text[..idx].to_string()), &text[idx + 1..]),
        None => (None, text),
    };
    let (letters, digits) = split_letters_and_digits(rest)?;
    let column = letters_to_column(letters)?;
    let row: u32 = digits.parse().ok()?;
    if column == 0 || row == 0 {
        return None;
    }
    Some(CellLocation { sheet, column, row })
}

/// Parses "R(-1)C(2)" style relative addresses.
pub fn parse_relative_address(text: &str) -> Option<RelativeAddress> {
    let text = text.strip_prefix('R')?;
    let (row_part, text) = parse_paren_int(text)?;
    let text = text.strip_prefix('C')?;
    let (col_part, rest) = parse_paren_int(text)?;
    if !rest.is_empty() {
        return None;
    }
    Some(RelativeAddress { row_offset: row_part, col_offset: col_part })
}

fn parse_paren_int(text: &str) -> Option<(i32, &str)> {
    let text = text.strip_prefix('(')?;
    let close = text.find(')')?;
    let num: i32 = text[..close].parse().ok()?;
    Some((num, &text[close + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn column_letter_round_trip() {
        for col in [1, 2, 26, 27, 52, 255] {
            let letters = column_to_letters(col);
            assert_eq!(letters_to_column(&letters), Some(col));
        }
    }

    #[test]
    fn parses_plain_and_qualified_addresses() {
        let loc = parse_absolute_address("AB12").unwrap();
        assert_eq!(loc, CellLocation::unqualified(28, 12));

        let loc = parse_absolute_address("Sheet2!C4").unwrap();
        assert_eq!(loc, CellLocation::in_sheet("Sheet2", 3, 4));
    }

    #[test]
    fn relative_address_round_trips_through_absolute() {
        let source = CellLocation::unqualified(5, 5);
        let rel = RelativeAddress::from_absolute(&source, 3, 7);
        assert_eq!(rel.resolve(&source), Some((3, 7)));
        assert_eq!(rel.to_raw_string(), "R(2)C(-2)");
    }

    #[test]
    fn relative_address_below_one_fails_to_resolve() {
        let source = CellLocation::unqualified(1, 1);
        let rel = RelativeAddress { row_offset: -5, col_offset: 0 };
        assert_eq!(rel.resolve(&source), None);
    }

    #[test]
    fn parses_relative_notation() {
        let rel = parse_relative_address("R(-1)C(2)").unwrap();
        assert_eq!(rel, RelativeAddress { row_offset: -1, col_offset: 2 });
    }
}
