//! FILENAME: engine/src/error.rs
//! PURPOSE: Error kinds raised by content assignment, evaluation, and
//! sheet-structural operations (see spec §7).
//! CONTEXT: Parse errors propagate to the caller of `Cell::set_content`.
//! Evaluation errors never propagate through recalculation — they are
//! captured into the offending cell's `CellValue::Error` instead, which
//! is why `EvalError` implements `Clone`: it has to be stashed on a cell.

use parser::{ParseError, VariantError};
use thiserror::Error;

/// Raised while parsing the text a user typed into a cell.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    #[error("invalid formula: {0}")]
    InvalidFormula(String),
    #[error("invalid number")]
    InvalidNumber,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid relative address")]
    InvalidRelativeAddress,
}

impl From<ParseError> for ContentError {
    fn from(err: ParseError) -> Self {
        if err.message.contains("invalid-relative-address") {
            ContentError::InvalidRelativeAddress
        } else if err.message.contains("invalid-address") {
            ContentError::InvalidAddress
        } else {
            ContentError::InvalidFormula(err.message)
        }
    }
}

/// Raised while evaluating a formula AST. Never escapes the recalculation
/// loop — the offending cell is marked `error` and this value becomes its
/// displayed sentinel (see `EvalError::sentinel`).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    #[error("circular reference")]
    CircularReference,
    #[error("invalid reference")]
    InvalidReference,
    #[error("numeric overflow")]
    NumericOverflow,
    #[error("date out of range")]
    DateOutOfRange,
    #[error("wrong number of arguments")]
    ArgumentCount,
    #[error("argument of the wrong kind")]
    ArgumentKind,
    #[error("#DIV/0!")]
    DivideByZero,
    #[error("value cannot be coerced to a number")]
    NumericCoercion,
    #[error("unknown function")]
    UnknownFunction,
}

impl EvalError {
    /// Short sentinel text a cell renders in place of its value.
    pub fn sentinel(self) -> &'static str {
        match self {
            EvalError::CircularReference => "#CIRCULAR!",
            EvalError::InvalidReference => "#REF!",
            EvalError::NumericOverflow => "#NUM!",
            EvalError::DateOutOfRange => "#NUM!",
            EvalError::ArgumentCount => "#ARGS!",
            EvalError::ArgumentKind => "#VALUE!",
            EvalError::DivideByZero => "#DIV/0!",
            EvalError::NumericCoercion => "#VALUE!",
            EvalError::UnknownFunction => "#NAME?",
        }
    }
}

impl From<VariantError> for EvalError {
    fn from(err: VariantError) -> Self {
        match err {
            VariantError::NumericCoercion => EvalError::NumericCoercion,
            VariantError::DivideByZero => EvalError::DivideByZero,
        }
    }
}

/// Raised by operations on the owning workbook rather than a single cell.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error("sheet not found: {0}")]
    SheetNotFound(String),
    #[error("duplicate sheet name: {0}")]
    DuplicateSheetName(String),
}
