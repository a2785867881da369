//! FILENAME: parser/src/lib.rs
//! PURPOSE: Library root for the formula parser.
//! CONTEXT: This crate is leaf-level: the tagged Variant value, cell
//! addresses, and the closed formula AST. It has no dependency on the
//! sheet/workbook model — evaluation, dependency extraction and address
//! fixup over the AST live in the `engine` crate.
//!
//! PIPELINE: Formula string --> Lexer --> Tokens --> Parser --> Expr (AST)
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, ^ (power)
//! - Comparison: =, <>, <, >, <=, >=
//! - String concatenation: &
//! - Cell references: A1, AA100, Sheet1!A1, 'Sheet Name'!A1
//! - Relative references: R(-1)C(2)
//! - Ranges: A1:B10
//! - Function calls: SUM(A1:A10), IF(A1>0, "yes", "no")
//! - Parentheses for grouping
//! - Unary negation: -5

pub mod ast;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod token;
pub mod variant;

#[cfg(test)]
mod tests;

pub use ast::{BinaryOperator, Expr, LocationNode};
pub use lexer::Lexer;
pub use location::{CellLocation, RelativeAddress, MAX_COLUMNS, MAX_ROWS};
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use token::Token;
pub use variant::{Variant, VariantError, VariantResult, EQUALITY_EPSILON};
