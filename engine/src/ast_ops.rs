//! FILENAME: engine/src/ast_ops.rs
//! PURPOSE: The operations that act on a parsed formula (§4.3, §4.5):
//! evaluation, dependency extraction, address fixup after a structural
//! edit, and rendering back to text.
//! CONTEXT: `parser::Expr` carries no behaviour of its own (see its doc
//! comment) — everything here is a free function or a trait impl living in
//! this crate instead, since only the engine knows about cells, workbooks,
//! and the function registry an `Expr::Function` node dispatches into.

use crate::error::EvalError;
use crate::format::Format;
use crate::functions::FunctionRegistry;
use crate::workbook::Workbook;
use parser::{BinaryOperator, Expr, LocationNode, Variant};
use parser::CellLocation;
use std::collections::HashSet;

/// Evaluation state threaded through a single recalculation of one cell:
/// which cell referenced which (for same-frame cycle detection) and which
/// cells this pass has already computed (so a diamond-shaped dependency
/// isn't evaluated twice). See §4.5.
pub struct CalcContext<'a> {
    workbook: &'a mut Workbook,
    current_sheet: String,
    reference_stack: Vec<CellLocation>,
    update_list: HashSet<CellLocation>,
    cached_now: Option<f64>,
}

impl<'a> CalcContext<'a> {
    pub fn new(workbook: &'a mut Workbook, current_sheet: impl Into<String>) -> Self {
        CalcContext {
            workbook,
            current_sheet: current_sheet.into(),
            reference_stack: Vec::new(),
            update_list: HashSet::new(),
            cached_now: None,
        }
    }

    /// The instant `NOW()`/`TODAY()` see this pass. Memoized on first call
    /// so two calls within the same formula (e.g. `=NOW()-NOW()`) agree
    /// instead of racing the clock (§8).
    pub fn now(&mut self) -> f64 {
        *self.cached_now.get_or_insert_with(crate::serial_date::now_serial)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        self.workbook.functions()
    }

    /// Evaluates the formula rooted at `root`, seeding the reference stack
    /// with it so a self-reference inside the formula is caught.
    pub fn evaluate_root(&mut self, root: &CellLocation, expr: &Expr) -> Result<Variant, EvalError> {
        self.reference_stack.push(root.clone());
        let previous_sheet = std::mem::replace(
            &mut self.current_sheet,
            root.sheet.clone().unwrap_or_else(|| self.current_sheet.clone()),
        );
        let result = expr.evaluate(self);
        self.current_sheet = previous_sheet;
        self.reference_stack.pop();
        self.update_list.insert(root.clone());
        result
    }

    /// Resolves a single cell reference, recursively evaluating it first if
    /// it's a formula that hasn't been computed yet this pass (§4.5). A
    /// reference back to the cell currently being evaluated is a same-frame
    /// circular reference — the graph-based pre-check in `recalc.rs` is
    /// meant to catch the general case ahead of time; this is the
    /// evaluation-time safety net (§9).
    pub fn resolve(&mut self, loc: &CellLocation) -> Result<Variant, EvalError> {
        let qualified = loc.qualify(&self.current_sheet);
        if !qualified.in_bounds() {
            return Err(EvalError::InvalidReference);
        }
        if self.reference_stack.last() == Some(&qualified) {
            return Err(EvalError::CircularReference);
        }
        if self.update_list.contains(&qualified) {
            return Ok(self.cell_value(&qualified));
        }

        let (is_formula, formula_tree) = match self.workbook.cell(&qualified) {
            Some(cell) => (cell.is_formula(), cell.formula_tree.clone()),
            None => return Ok(Variant::Empty),
        };
        if !is_formula {
            if let Some(err) = self.workbook.cell(&qualified).and_then(|c| c.eval_error) {
                return Err(err);
            }
            return Ok(self.cell_value(&qualified));
        }
        let Some(expr) = formula_tree else { return Ok(Variant::Empty) };

        self.reference_stack.push(qualified.clone());
        let previous_sheet = std::mem::replace(
            &mut self.current_sheet,
            qualified.sheet.clone().unwrap_or_else(|| self.current_sheet.clone()),
        );
        let result = expr.evaluate(self);
        self.current_sheet = previous_sheet;
        self.reference_stack.pop();

        if let Some(cell) = self.workbook.cell_mut(&qualified) {
            cell.apply_eval_result(result.clone());
        }
        self.update_list.insert(qualified);
        result
    }

    fn cell_value(&self, loc: &CellLocation) -> Variant {
        self.workbook.cell(loc).map(|c| c.computed_value.clone()).unwrap_or(Variant::Empty)
    }

    /// Resolves every cell in the rectangle `start..=end`, in column-major
    /// order (the order `SUM`-style functions fold over).
    pub fn resolve_range(&mut self, start: &CellLocation, end: &CellLocation) -> Result<Vec<Variant>, EvalError> {
        let sheet = start.sheet.clone().unwrap_or_else(|| self.current_sheet.clone());
        let (c0, c1) = (start.column.min(end.column), start.column.max(end.column));
        let (r0, r1) = (start.row.min(end.row), start.row.max(end.row));
        let mut values = Vec::with_capacity(((c1 - c0 + 1) * (r1 - r0 + 1)) as usize);
        for column in c0..=c1 {
            for row in r0..=r1 {
                values.push(self.resolve(&CellLocation::in_sheet(sheet.clone(), column, row))?);
            }
        }
        Ok(values)
    }

    /// §4.4's documented side effect of `NOW()`/`TODAY()`: the calling
    /// cell's format is set when it currently has none, or is `general`.
    pub fn set_current_format_if_unset(&mut self, format: Format) {
        let Some(loc) = self.reference_stack.last().cloned() else { return };
        if let Some(cell) = self.workbook.cell_mut(&loc) {
            if matches!(cell.format, None | Some(Format::General)) {
                cell.format = Some(format);
            }
        }
    }

    #[cfg(test)]
    pub fn dummy_for_tests() -> CalcContext<'static> {
        let workbook: &'static mut Workbook = Box::leak(Box::new(Workbook::new()));
        CalcContext::new(workbook, "Sheet1")
    }
}

/// Operations over a formula AST that need a calculation context, a
/// workbook, or a function registry — everything `parser::Expr` itself
/// can't know about (§4.3, §4.5).
pub trait AstOps {
    fn evaluate(&self, ctx: &mut CalcContext) -> Result<Variant, EvalError>;
    /// Every cell this expression reads, qualified against `current_sheet`.
    /// A range expands to its full rectangle (§4.3).
    fn dependents(&self, current_sheet: &str) -> HashSet<CellLocation>;
    /// Adjusts addresses after a row/column insert or delete. `axis_column`
    /// / `axis_row` is the inserted/deleted line (0 = that axis unaffected);
    /// `offset` is +1 for an insert, -1 for a delete. `new_source` is the
    /// formula cell's own (already-shifted) location, used to keep each
    /// node's relative form consistent. Returns whether anything changed.
    fn fixup_address(&mut self, axis_column: u32, axis_row: u32, offset: i32, new_source: &CellLocation) -> bool;
    /// Relative form, e.g. `R(1)C(-2)` — what persistence stores (§4.2, §4.3).
    fn to_raw_string(&self) -> String;
    /// Absolute, user-facing form, e.g. `B1*2`, `Sheet2!C4` — what a cell
    /// displays (§4.3).
    fn to_string(&self) -> String;
}

impl AstOps for Expr {
    fn evaluate(&self, ctx: &mut CalcContext) -> Result<Variant, EvalError> {
        match self {
            Expr::Number(v) => Ok(v.clone()),
            Expr::Text(s) => Ok(Variant::Text(s.clone())),
            Expr::Location(node) => {
                if node.error {
                    return Err(EvalError::InvalidReference);
                }
                ctx.resolve(&node.absolute)
            }
            // A bare range only makes sense as a function argument, where
            // `evaluate_args` expands it instead of calling this.
            Expr::Range(..) => Err(EvalError::ArgumentKind),
            Expr::BinaryOp { op, left, right } => evaluate_binary(*op, left, right, ctx),
            Expr::Function { method, args } => evaluate_function(method, args, ctx),
        }
    }

    fn dependents(&self, current_sheet: &str) -> HashSet<CellLocation> {
        let mut out = HashSet::new();
        collect_dependents(self, current_sheet, &mut out);
        out
    }

    fn fixup_address(&mut self, axis_column: u32, axis_row: u32, offset: i32, new_source: &CellLocation) -> bool {
        match self {
            Expr::Number(_) | Expr::Text(_) => false,
            Expr::Location(node) => fixup_node(node, axis_column, axis_row, offset, new_source),
            Expr::Range(start, end) => {
                let a = fixup_node(start, axis_column, axis_row, offset, new_source);
                let b = fixup_node(end, axis_column, axis_row, offset, new_source);
                a || b
            }
            Expr::BinaryOp { left, right, .. } => {
                let a = left.fixup_address(axis_column, axis_row, offset, new_source);
                let b = right.fixup_address(axis_column, axis_row, offset, new_source);
                a || b
            }
            Expr::Function { args, .. } => {
                args.iter_mut().fold(false, |acc, a| a.fixup_address(axis_column, axis_row, offset, new_source) || acc)
            }
        }
    }

    fn to_raw_string(&self) -> String {
        render_raw(self, 0)
    }

    fn to_string(&self) -> String {
        render_abs(self, 0)
    }
}

fn fixup_node(node: &mut LocationNode, axis_column: u32, axis_row: u32, offset: i32, new_source: &CellLocation) -> bool {
    if node.error {
        return false;
    }
    let mut changed = false;
    if axis_column != 0 && node.absolute.column >= axis_column {
        if offset < 0 && node.absolute.column == axis_column {
            node.error = true;
            return true;
        }
        let shifted = node.absolute.column as i64 + offset as i64;
        if shifted < 1 {
            node.error = true;
            return true;
        }
        node.absolute.column = shifted as u32;
        changed = true;
    }
    if axis_row != 0 && node.absolute.row >= axis_row {
        if offset < 0 && node.absolute.row == axis_row {
            node.error = true;
            return true;
        }
        let shifted = node.absolute.row as i64 + offset as i64;
        if shifted < 1 {
            node.error = true;
            return true;
        }
        node.absolute.row = shifted as u32;
        changed = true;
    }
    if changed {
        node.relative = parser::RelativeAddress::from_absolute(new_source, node.absolute.column, node.absolute.row);
    }
    changed
}

fn collect_dependents(expr: &Expr, current_sheet: &str, out: &mut HashSet<CellLocation>) {
    match expr {
        Expr::Number(_) | Expr::Text(_) => {}
        Expr::Location(node) => {
            if !node.error {
                out.insert(node.absolute.qualify(current_sheet));
            }
        }
        Expr::Range(start, end) => {
            if start.error || end.error {
                return;
            }
            let sheet = start.absolute.sheet.clone().unwrap_or_else(|| current_sheet.to_string());
            let (c0, c1) = (start.absolute.column.min(end.absolute.column), start.absolute.column.max(end.absolute.column));
            let (r0, r1) = (start.absolute.row.min(end.absolute.row), start.absolute.row.max(end.absolute.row));
            for column in c0..=c1 {
                for row in r0..=r1 {
                    out.insert(CellLocation::in_sheet(sheet.clone(), column, row));
                }
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_dependents(left, current_sheet, out);
            collect_dependents(right, current_sheet, out);
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect_dependents(arg, current_sheet, out);
            }
        }
    }
}

fn evaluate_binary(op: BinaryOperator, left: &Expr, right: &Expr, ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let lhs = left.evaluate(ctx)?;
    let rhs = right.evaluate(ctx)?;
    match op {
        BinaryOperator::Add => lhs.add(&rhs).map_err(EvalError::from),
        BinaryOperator::Subtract => lhs.sub(&rhs).map_err(EvalError::from),
        BinaryOperator::Multiply => lhs.mul(&rhs).map_err(EvalError::from),
        BinaryOperator::Divide => lhs.div(&rhs).map_err(EvalError::from),
        BinaryOperator::Power => lhs.pow(&rhs).map_err(EvalError::from),
        BinaryOperator::Concat => lhs.concat(&rhs).map_err(EvalError::from),
        BinaryOperator::Equal => Ok(Variant::Boolean(lhs.compare(&rhs) == std::cmp::Ordering::Equal)),
        BinaryOperator::NotEqual => Ok(Variant::Boolean(lhs.compare(&rhs) != std::cmp::Ordering::Equal)),
        BinaryOperator::LessThan => Ok(Variant::Boolean(lhs.compare(&rhs) == std::cmp::Ordering::Less)),
        BinaryOperator::LessEqual => Ok(Variant::Boolean(lhs.compare(&rhs) != std::cmp::Ordering::Greater)),
        BinaryOperator::GreaterThan => Ok(Variant::Boolean(lhs.compare(&rhs) == std::cmp::Ordering::Greater)),
        BinaryOperator::GreaterEqual => Ok(Variant::Boolean(lhs.compare(&rhs) != std::cmp::Ordering::Less)),
    }
}

fn evaluate_function(method: &str, args: &[Expr], ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let descriptor = *ctx.functions().get(method).ok_or(EvalError::UnknownFunction)?;
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Expr::Range(start, end) => {
                if start.error || end.error {
                    return Err(EvalError::InvalidReference);
                }
                values.extend(ctx.resolve_range(&start.absolute, &end.absolute)?);
            }
            other => values.push(other.evaluate(ctx)?),
        }
    }
    FunctionRegistry::check_arity(&descriptor, values.len())?;
    (descriptor.call)(&values, ctx)
}

fn render_raw(expr: &Expr, parent_precedence: u8) -> String {
    match expr {
        Expr::Number(v) => v.to_display_string(),
        Expr::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Expr::Location(node) => node.relative.to_raw_string(),
        Expr::Range(start, end) => format!("{}:{}", start.relative.to_raw_string(), end.relative.to_raw_string()),
        Expr::BinaryOp { op, left, right } => {
            let precedence = op.precedence();
            let rendered = format!("{}{}{}", render_raw(left, precedence), op.symbol(), render_raw(right, precedence + 1));
            if precedence < parent_precedence {
                format!("({})", rendered)
            } else {
                rendered
            }
        }
        Expr::Function { method, args } => {
            let rendered_args: Vec<String> = args.iter().map(|a| render_raw(a, 0)).collect();
            format!("{}({})", method, rendered_args.join(","))
        }
    }
}

fn render_abs(expr: &Expr, parent_precedence: u8) -> String {
    match expr {
        Expr::Number(v) => v.to_display_string(),
        Expr::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Expr::Location(node) => node.absolute.to_a1(),
        Expr::Range(start, end) => format!("{}:{}", start.absolute.to_a1(), end.absolute.to_a1()),
        Expr::BinaryOp { op, left, right } => {
            let precedence = op.precedence();
            let rendered = format!("{}{}{}", render_abs(left, precedence), op.symbol(), render_abs(right, precedence + 1));
            if precedence < parent_precedence {
                format!("({})", rendered)
            } else {
                rendered
            }
        }
        Expr::Function { method, args } => {
            let rendered_args: Vec<String> = args.iter().map(|a| render_abs(a, 0)).collect();
            format!("{}({})", method, rendered_args.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn workbook_with_formula() -> Workbook {
        let mut workbook = Workbook::new();
        {
            let sheet = workbook.sheet_mut("Sheet1").unwrap();
            sheet.columns.get_cell(1, 1, true).unwrap().set_content("2", false).unwrap();
            sheet.columns.get_cell(1, 2, true).unwrap().set_content("3", false).unwrap();
        }
        workbook
    }

    #[test]
    fn evaluates_simple_addition_formula() {
        let mut workbook = workbook_with_formula();
        let loc = CellLocation::in_sheet("Sheet1", 2, 1);
        let expr = parser::parse("A1+A2", loc.clone()).unwrap();
        let mut ctx = CalcContext::new(&mut workbook, "Sheet1");
        let result = ctx.evaluate_root(&loc, &expr).unwrap();
        assert_eq!(result, Variant::Number(5.0));
    }

    #[test]
    fn self_reference_is_a_circular_error() {
        let mut workbook = workbook_with_formula();
        let loc = CellLocation::in_sheet("Sheet1", 1, 1);
        let expr = parser::parse("A1+1", loc.clone()).unwrap();
        let mut ctx = CalcContext::new(&mut workbook, "Sheet1");
        let result = ctx.evaluate_root(&loc, &expr);
        assert_eq!(result, Err(EvalError::CircularReference));
    }

    #[test]
    fn sum_function_expands_a_range() {
        let mut workbook = workbook_with_formula();
        let loc = CellLocation::in_sheet("Sheet1", 2, 2);
        let expr = parser::parse("SUM(A1:A2)", loc.clone()).unwrap();
        let mut ctx = CalcContext::new(&mut workbook, "Sheet1");
        let result = ctx.evaluate_root(&loc, &expr).unwrap();
        assert_eq!(result, Variant::Number(5.0));
    }

    #[test]
    fn dependents_expands_range_to_full_rectangle() {
        let loc = CellLocation::in_sheet("Sheet1", 3, 3);
        let expr = parser::parse("SUM(A1:B2)", loc).unwrap();
        let deps = expr.dependents("Sheet1");
        assert_eq!(deps.len(), 4);
        assert!(deps.contains(&CellLocation::in_sheet("Sheet1", 1, 1)));
        assert!(deps.contains(&CellLocation::in_sheet("Sheet1", 2, 2)));
    }

    #[test]
    fn fixup_address_shifts_column_references_and_keeps_relative_consistent() {
        let source = CellLocation::in_sheet("Sheet1", 2, 1);
        let mut expr = parser::parse("A1*2", source.clone()).unwrap();
        let new_source = CellLocation::in_sheet("Sheet1", 3, 1);
        let changed = expr.fixup_address(1, 0, 1, &new_source);
        assert!(changed);
        assert_eq!(expr.to_raw_string(), "R(0)C(-1)*2");
    }

    #[test]
    fn fixup_address_below_one_sets_error_flag() {
        let source = CellLocation::in_sheet("Sheet1", 1, 1);
        let mut expr = Expr::Location(LocationNode::new(
            CellLocation::in_sheet("Sheet1", 1, 1),
            parser::RelativeAddress::from_absolute(&source, 1, 1),
        ));
        expr.fixup_address(1, 0, -1, &source);
        match expr {
            Expr::Location(node) => assert!(node.error),
            _ => panic!("expected a location node"),
        }
    }
}
