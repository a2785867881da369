//! FILENAME: engine/src/recalc.rs
//! PURPOSE: The recalculation driver (§4.8): incremental recalculate of
//! the invalid set, and full recalculate (rebuild every edge, invalidate
//! every formula, then recalculate).
//! CONTEXT: Layers a graph-based cycle pre-check on top of `ast_ops`'s
//! same-frame reference-stack guard, per §9's Design Note — the graph
//! catches a cycle before a single cell is evaluated and marks the whole
//! cycle at once, rather than discovering it one `CircularReference` at a
//! time as evaluation happens to walk into it.

use crate::ast_ops::{AstOps, CalcContext};
use crate::error::EvalError;
use crate::workbook::Workbook;
use parser::CellLocation;
use std::collections::HashSet;

/// Recalculates every cell currently marked invalid across all sheets, in
/// dependency order. Cells caught in a cycle are short-circuited straight
/// to `EvalError::CircularReference` without being evaluated. Returns every
/// cell this pass touched (evaluated or cycle-marked), the set `calculate()`
/// reports to a caller (§6).
pub fn recalculate_invalid(workbook: &mut Workbook) -> Vec<CellLocation> {
    let invalid: HashSet<CellLocation> =
        workbook.sheets.iter().flat_map(|s| s.invalid_cells.iter().cloned()).collect();
    if invalid.is_empty() {
        return Vec::new();
    }

    let (order, cyclic) = match workbook.dependency_graph.order_subset(&invalid) {
        Ok(order) => (order, Vec::new()),
        Err(cycle) => {
            let cycle_set: HashSet<CellLocation> = cycle.cycle_path.iter().cloned().collect();
            let remaining: HashSet<CellLocation> = invalid.difference(&cycle_set).cloned().collect();
            let order = workbook.dependency_graph.order_subset(&remaining).unwrap_or_default();
            (order, cycle.cycle_path)
        }
    };

    for loc in &cyclic {
        if let Some(cell) = workbook.cell_mut(loc) {
            cell.apply_eval_result(Err(EvalError::CircularReference));
        }
    }
    for loc in &order {
        evaluate_one(workbook, loc);
    }

    let processed: HashSet<&CellLocation> = order.iter().chain(cyclic.iter()).collect();
    for sheet in workbook.sheets.iter_mut() {
        sheet.invalid_cells.retain(|loc| !processed.contains(loc));
    }

    order.into_iter().chain(cyclic).collect()
}

fn evaluate_one(workbook: &mut Workbook, loc: &CellLocation) {
    let Some(sheet_name) = loc.sheet.clone() else { return };
    let (is_formula, expr) = match workbook.cell(loc) {
        Some(cell) => (cell.is_formula(), cell.formula_tree.clone()),
        None => return,
    };
    if !is_formula {
        return;
    }
    let Some(expr) = expr else { return };

    let mut ctx = CalcContext::new(workbook, sheet_name);
    let result = ctx.evaluate_root(loc, &expr);
    if let Some(cell) = workbook.cell_mut(loc) {
        cell.apply_eval_result(result);
    }
}

/// §4.7/§4.9: rebuilds every formula cell's dependency edges from its
/// current AST, invalidates every formula cell, and recalculates. Used
/// after a structural edit that fixed up at least one address, and on
/// workbook load (where the graph always starts empty, per §4.9).
pub fn full_recalculate(workbook: &mut Workbook) {
    workbook.dependency_graph.clear();

    let sheet_names: Vec<String> = workbook.sheets.iter().map(|s| s.name.clone()).collect();
    for sheet_name in &sheet_names {
        let locations: Vec<CellLocation> = workbook
            .sheet(sheet_name)
            .map(|s| s.columns.all_formula_locations().into_iter().collect())
            .unwrap_or_default();
        for loc in locations {
            let qualified = CellLocation::in_sheet(sheet_name.clone(), loc.column, loc.row);
            if let Some(expr) = workbook.cell(&qualified).and_then(|c| c.formula_tree.clone()) {
                let precedents = expr.dependents(sheet_name);
                workbook.dependency_graph.set_dependencies(qualified, precedents);
            }
        }
    }

    for sheet_name in &sheet_names {
        let locations: Vec<CellLocation> = workbook
            .sheet(sheet_name)
            .map(|s| s.columns.all_formula_locations().into_iter().collect())
            .unwrap_or_default();
        if let Some(sheet) = workbook.sheet_mut(sheet_name) {
            for loc in locations {
                sheet.invalid_cells.insert(CellLocation::in_sheet(sheet_name.clone(), loc.column, loc.row));
            }
        }
    }

    recalculate_invalid(workbook);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use parser::Variant;

    #[test]
    fn full_recalculate_rebuilds_edges_and_values() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "4").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "=A1*2").unwrap();
        workbook.dependency_graph.clear();
        full_recalculate(&mut workbook);
        let cell = workbook.cell(&CellLocation::in_sheet("Sheet1", 1, 2)).unwrap();
        assert_eq!(cell.computed_value, Variant::Number(8.0));
        assert!(workbook.dependency_graph.get_precedents(&CellLocation::in_sheet("Sheet1", 1, 2)).is_some());
    }

    #[test]
    fn a_two_cell_cycle_is_marked_without_evaluating() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "=A2").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "=A1").unwrap();
        let a1 = workbook.cell(&CellLocation::in_sheet("Sheet1", 1, 1)).unwrap();
        assert!(a1.has_error());
    }

    #[test]
    fn recalculate_invalid_reports_every_cell_it_touched() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "4").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "=A1*2").unwrap();
        workbook.invalidate(&CellLocation::in_sheet("Sheet1", 1, 2));
        let touched = recalculate_invalid(&mut workbook);
        assert!(touched.contains(&CellLocation::in_sheet("Sheet1", 1, 2)));
    }
}
