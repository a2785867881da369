//! FILENAME: parser/src/tests.rs
//! PURPOSE: End-to-end parser tests exercising full formula strings rather
//! than individual grammar productions (those live next to the code they
//! cover in ast.rs / lexer.rs / parser.rs).

use crate::ast::Expr;
use crate::location::CellLocation;
use crate::parser::parse;
use crate::variant::Variant;
use pretty_assertions::assert_eq;

fn here() -> CellLocation {
    CellLocation::unqualified(3, 3)
}

#[test]
fn nested_function_calls_parse() {
    let expr = parse("IF(A1>0, SUM(A1:A10), 0)", here()).unwrap();
    match expr {
        Expr::Function { method, args } => {
            assert_eq!(method, "IF");
            assert_eq!(args.len(), 3);
        }
        _ => panic!("expected IF(...)"),
    }
}

#[test]
fn cross_sheet_reference_round_trips() {
    let expr = parse("Sheet2!B10", here()).unwrap();
    match expr {
        Expr::Location(node) => {
            assert_eq!(node.absolute, CellLocation::in_sheet("Sheet2", 2, 10));
        }
        _ => panic!("expected location"),
    }
}

#[test]
fn quoted_sheet_name_with_space_parses() {
    let expr = parse("'Q1 Actuals'!A1", here()).unwrap();
    match expr {
        Expr::Location(node) => {
            assert_eq!(node.absolute.sheet.as_deref(), Some("Q1 Actuals"));
        }
        _ => panic!("expected location"),
    }
}

#[test]
fn string_literal_with_quotes_parses() {
    let expr = parse("\"hello world\"", here()).unwrap();
    assert_eq!(expr, Expr::Text("hello world".to_string()));
}

#[test]
fn boolean_literals_parse_as_numbers() {
    assert_eq!(parse("TRUE", here()).unwrap(), Expr::Number(Variant::Boolean(true)));
    assert_eq!(parse("FALSE", here()).unwrap(), Expr::Number(Variant::Boolean(false)));
}

#[test]
fn deeply_parenthesised_expression_parses() {
    let expr = parse("((1+2)*(3-4))/2", here());
    assert!(expr.is_ok());
}

#[test]
fn malformed_formula_is_a_single_error_kind() {
    let err = parse("SUM(A1, ", here()).unwrap_err();
    assert!(err.message.len() > 0);
}

#[test]
fn relative_notation_round_trips_through_source_cell() {
    let source = CellLocation::unqualified(5, 5);
    let expr = parse("R(-2)C(-2)", source.clone()).unwrap();
    match expr {
        Expr::Location(node) => {
            assert_eq!(node.absolute, CellLocation::unqualified(3, 3));
        }
        _ => panic!("expected location"),
    }
}

#[test]
fn out_of_bounds_address_is_flagged_but_still_parses() {
    let expr = parse("ZZZ9999", here()).unwrap();
    match expr {
        Expr::Location(node) => assert!(node.error),
        _ => panic!("expected location"),
    }
}
