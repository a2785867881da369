//! FILENAME: engine/src/workbook.rs
//! PURPOSE: The top-level container: sheets, the shared dependency graph,
//! style/format registries, and factory defaults (§3, §6).
//! CONTEXT: `FactoryDefaults` turns what the source keeps as process-wide
//! static fields into a plain config struct the workbook owns — one
//! workbook's defaults no longer leak into another's (§9's Design Note).

use crate::ast_ops::AstOps;
use crate::cell::Cell;
use crate::column_list::{ColumnWidth, Sheet};
use crate::dependency_graph::DependencyGraph;
use crate::error::{ContentError, StructuralError};
use crate::format::{Alignment, Format, FormatRegistry};
use crate::functions::FunctionRegistry;
use crate::recalc;
use crate::style::{CellStyle, Color, StyleRegistry};
use log::{debug, info};
use parser::CellLocation;

/// Rendering/content defaults a new cell is given when it carries no
/// explicit override of its own (§6).
#[derive(Debug, Clone)]
pub struct FactoryDefaults {
    pub format: Format,
    pub alignment: Alignment,
    pub decimal_places: u8,
    pub use_thousands_separator: bool,
    pub column_width: ColumnWidth,
    /// §4.6: whether an unparseable formula marks its cell `error` (strict)
    /// or falls back to plain text (lenient).
    pub strict_formula_errors: bool,
}

impl Default for FactoryDefaults {
    fn default() -> Self {
        FactoryDefaults {
            format: Format::General,
            alignment: Alignment::General,
            decimal_places: 2,
            use_thousands_separator: false,
            column_width: ColumnWidth::Fixed(crate::column_list::DEFAULT_WIDTH),
            strict_formula_errors: false,
        }
    }
}

pub struct Workbook {
    pub sheets: Vec<Sheet>,
    pub dependency_graph: DependencyGraph,
    pub defaults: FactoryDefaults,
    pub style_registry: StyleRegistry,
    pub format_registry: FormatRegistry,
    functions: FunctionRegistry,
    pub path: Option<std::path::PathBuf>,
    pub modified: bool,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    pub fn new() -> Self {
        let mut workbook = Workbook {
            sheets: Vec::new(),
            dependency_graph: DependencyGraph::new(),
            defaults: FactoryDefaults::default(),
            style_registry: StyleRegistry::new(CellStyle::new(Color::black(), Color::bright_white())),
            format_registry: FormatRegistry::new(),
            functions: FunctionRegistry::new(),
            path: None,
            modified: false,
        };
        workbook.sheets.push(Sheet::new("Sheet1"));
        workbook
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    fn next_sheet_name(&self) -> String {
        let mut n = self.sheets.len() + 1;
        loop {
            let candidate = format!("Sheet{}", n);
            if !self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&candidate)) {
                return candidate;
            }
            n += 1;
        }
    }

    /// §6: adds a sheet, auto-naming it `SheetN` when `name` is `None`.
    pub fn add_sheet(&mut self, name: Option<String>) -> Result<&mut Sheet, StructuralError> {
        let name = name.unwrap_or_else(|| self.next_sheet_name());
        if self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&name)) {
            return Err(StructuralError::DuplicateSheetName(name));
        }
        info!("adding sheet {}", name);
        self.sheets.push(Sheet::new(name));
        self.modified = true;
        Ok(self.sheets.last_mut().unwrap())
    }

    pub fn remove_sheet(&mut self, name: &str) -> Result<(), StructuralError> {
        let idx = self
            .sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StructuralError::SheetNotFound(name.to_string()))?;
        self.dependency_graph.clear_sheet(&self.sheets[idx].name.clone());
        self.sheets.remove(idx);
        self.modified = true;
        Ok(())
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn cell(&self, loc: &CellLocation) -> Option<&Cell> {
        let sheet = self.sheet(loc.sheet.as_deref()?)?;
        sheet.columns.peek_cell(loc.column, loc.row)
    }

    pub fn cell_mut(&mut self, loc: &CellLocation) -> Option<&mut Cell> {
        let sheet_name = loc.sheet.as_deref()?.to_string();
        let sheet = self.sheet_mut(&sheet_name)?;
        sheet.columns.get_cell(loc.column, loc.row, false)
    }

    /// §4.6/§4.8: assigns new content to a cell, rebuilds its precedent
    /// edges, marks it and its transitive dependents invalid, then runs an
    /// incremental recalculate. The `ContentError` (if any) is still
    /// returned after the cell's kind has been settled per strict/lenient
    /// mode — a parse failure doesn't stop the bookkeeping.
    pub fn set_cell_content(&mut self, sheet: &str, column: u32, row: u32, content: &str) -> Result<(), ContentError> {
        let loc = CellLocation::in_sheet(sheet, column, row);
        let strict = self.defaults.strict_formula_errors;
        let parse_result = {
            let sheet_ref = self.sheet_mut(sheet).expect("sheet must exist");
            let cell = sheet_ref.columns.get_cell(column, row, true).unwrap();
            cell.set_content(content, strict)
        };

        self.dependency_graph.clear_dependencies(&loc);
        let is_formula = self.cell(&loc).map(|c| c.is_formula()).unwrap_or(false);
        if is_formula {
            if let Some(expr) = self.cell(&loc).and_then(|c| c.formula_tree.clone()) {
                let precedents = expr.dependents(sheet);
                self.dependency_graph.set_dependencies(loc.clone(), precedents);
            }
        }

        self.invalidate(&loc);
        recalc::recalculate_invalid(self);
        self.modified = true;
        debug!("set content of {}: {:?}", loc, parse_result);
        parse_result
    }

    /// Adds `loc` and every transitive dependent of it to their owning
    /// sheets' invalid sets (§4.8).
    pub fn invalidate(&mut self, loc: &CellLocation) {
        let mut affected: Vec<CellLocation> = self.dependency_graph.transitive_dependents(loc).into_iter().collect();
        affected.push(loc.clone());
        for cell_loc in affected {
            if let Some(sheet_name) = cell_loc.sheet.clone() {
                if let Some(sheet) = self.sheet_mut(&sheet_name) {
                    sheet.invalid_cells.insert(cell_loc);
                }
            }
        }
    }

    pub fn insert_row(&mut self, sheet: &str, at: u32) {
        self.structural_edit(sheet, 0, at, 1);
    }

    pub fn delete_row(&mut self, sheet: &str, at: u32) {
        self.structural_edit(sheet, 0, at, -1);
    }

    pub fn insert_column(&mut self, sheet: &str, at: u32) {
        self.structural_edit(sheet, at, 0, 1);
    }

    pub fn delete_column(&mut self, sheet: &str, at: u32) {
        self.structural_edit(sheet, at, 0, -1);
    }

    /// §4.7: shifts the sheet's own storage, then walks every formula cell
    /// in the workbook (a reference can cross sheets) running
    /// `fixup_address`. Any formula whose addresses actually moved forces a
    /// full recalculate afterward, since its dependency edges are now stale.
    fn structural_edit(&mut self, sheet: &str, column_axis: u32, row_axis: u32, offset: i32) {
        {
            let sheet_ref = self.sheet_mut(sheet).expect("sheet must exist");
            if column_axis != 0 {
                sheet_ref.columns.shift_columns(column_axis, offset);
            } else {
                sheet_ref.columns.shift_rows(row_axis, offset);
            }
        }

        let mut any_fixed_up = false;
        let sheet_names: Vec<String> = self.sheets.iter().map(|s| s.name.clone()).collect();
        for owning_sheet in sheet_names {
            let locations: Vec<CellLocation> = self
                .sheet(&owning_sheet)
                .map(|s| s.columns.all_formula_locations().into_iter().collect())
                .unwrap_or_default();
            for loc in locations {
                let new_loc = CellLocation::in_sheet(owning_sheet.clone(), loc.column, loc.row);
                let axis_column = if owning_sheet.eq_ignore_ascii_case(sheet) { column_axis } else { 0 };
                let axis_row = if owning_sheet.eq_ignore_ascii_case(sheet) { row_axis } else { 0 };
                if axis_column == 0 && axis_row == 0 {
                    continue;
                }
                if let Some(cell) = self.sheet_mut(&owning_sheet).and_then(|s| s.columns.get_cell(loc.column, loc.row, false)) {
                    if let Some(mut expr) = cell.formula_tree.take() {
                        let changed = expr.fixup_address(axis_column, axis_row, offset, &new_loc);
                        cell.formula_tree = Some(expr);
                        any_fixed_up |= changed;
                    }
                }
            }
        }

        if any_fixed_up {
            recalc::full_recalculate(self);
        }
    }

    /// Rebuilds every formula cell's dependency edges from its current AST
    /// and runs a full recalculate; used at load time and after a
    /// structural edit that fixed up at least one address (§4.7, §4.9).
    pub fn full_recalculate(&mut self) {
        recalc::full_recalculate(self);
    }

    /// §6's `calculate()`: recalculates whatever is currently marked
    /// invalid and returns every cell the pass touched.
    pub fn calculate(&mut self) -> Vec<CellLocation> {
        recalc::recalculate_invalid(self)
    }

    /// §6: the format a cell renders with, falling back to the workbook's
    /// factory default when the cell carries no override of its own.
    pub fn effective_format(&self, loc: &CellLocation) -> Format {
        self.cell(loc).and_then(|c| c.format.clone()).unwrap_or_else(|| self.defaults.format.clone())
    }

    pub fn effective_alignment(&self, loc: &CellLocation) -> Alignment {
        self.cell(loc).and_then(|c| c.alignment).unwrap_or(self.defaults.alignment)
    }

    pub fn effective_decimal_places(&self, loc: &CellLocation) -> u8 {
        self.cell(loc).and_then(|c| c.decimal_places).unwrap_or(self.defaults.decimal_places)
    }

    pub fn effective_use_thousands(&self, loc: &CellLocation) -> bool {
        self.cell(loc).and_then(|c| c.use_thousands_separator).unwrap_or(self.defaults.use_thousands_separator)
    }

    /// Falls back to the style registry's default (index 0) slot rather
    /// than `FactoryDefaults`, since style lives in the registry, not here.
    pub fn effective_style(&self, loc: &CellLocation) -> CellStyle {
        match self.cell(loc).and_then(|c| c.style_index) {
            Some(idx) => self.style_registry.get(idx),
            None => self.style_registry.default_style(),
        }
    }

    /// §4.7/§6/§8 `SortCells`: reorders rows `row_start..=row_end` of
    /// `sheet` by the value in `sort_column`, swapping columns
    /// `col_start..=col_end` together. Since formula cells may move, a full
    /// recalculate follows so every dependency edge is keyed to its cell's
    /// new location.
    pub fn sort_cells(&mut self, sheet: &str, sort_column: u32, descending: bool, row_start: u32, row_end: u32, col_start: u32, col_end: u32) {
        let Some(sheet_ref) = self.sheet_mut(sheet) else { return };
        sheet_ref.columns.sort_cells(sort_column, descending, row_start, row_end, col_start, col_end);
        recalc::full_recalculate(self);
        self.modified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_workbook_starts_with_sheet1() {
        let workbook = Workbook::new();
        assert!(workbook.sheet("Sheet1").is_some());
    }

    #[test]
    fn add_sheet_rejects_duplicate_names() {
        let mut workbook = Workbook::new();
        assert!(workbook.add_sheet(Some("Sheet1".to_string())).is_err());
    }

    #[test]
    fn add_sheet_auto_names_when_none_given() {
        let mut workbook = Workbook::new();
        let added = workbook.add_sheet(None).unwrap();
        assert_eq!(added.name, "Sheet2");
    }

    #[test]
    fn set_cell_content_recalculates_dependents() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "2").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "=A1*3").unwrap();
        assert_eq!(workbook.cell(&CellLocation::in_sheet("Sheet1", 1, 2)).unwrap().computed_value, parser::Variant::Number(6.0));

        workbook.set_cell_content("Sheet1", 1, 1, "5").unwrap();
        assert_eq!(workbook.cell(&CellLocation::in_sheet("Sheet1", 1, 2)).unwrap().computed_value, parser::Variant::Number(15.0));
    }

    #[test]
    fn sort_cells_reorders_rows_ascending() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "1").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "3").unwrap();
        workbook.set_cell_content("Sheet1", 1, 3, "2").unwrap();
        workbook.sort_cells("Sheet1", 1, false, 1, 3, 1, 1);
        let values: Vec<f64> = (1..=3)
            .map(|r| workbook.cell(&CellLocation::in_sheet("Sheet1", 1, r)).unwrap().computed_value.to_number().unwrap())
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn insert_column_fixes_up_formula_reference() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "5").unwrap();
        workbook.set_cell_content("Sheet1", 2, 1, "=A1*2").unwrap();
        workbook.insert_column("Sheet1", 1);
        let moved = workbook.cell(&CellLocation::in_sheet("Sheet1", 3, 1)).unwrap();
        assert_eq!(moved.formula_tree.as_ref().unwrap().to_raw_string(), "R(0)C(-1)*2");
        assert_eq!(moved.computed_value, parser::Variant::Number(10.0));
    }

    #[test]
    fn insert_then_delete_column_round_trips_formula_text() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "5").unwrap();
        workbook.set_cell_content("Sheet1", 2, 1, "=A1*2").unwrap();
        let before = workbook.cell(&CellLocation::in_sheet("Sheet1", 2, 1)).unwrap().formula_tree.as_ref().unwrap().to_string();
        workbook.insert_column("Sheet1", 1);
        workbook.delete_column("Sheet1", 1);
        let after = workbook.cell(&CellLocation::in_sheet("Sheet1", 2, 1)).unwrap().formula_tree.as_ref().unwrap().to_string();
        assert_eq!(before, after);
    }

    #[test]
    fn deleting_the_column_a_reference_points_at_marks_it_an_error() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 2, 1, "5").unwrap();
        workbook.set_cell_content("Sheet1", 1, 1, "=B1+1").unwrap();
        workbook.delete_column("Sheet1", 2);
        let cell = workbook.cell(&CellLocation::in_sheet("Sheet1", 1, 1)).unwrap();
        assert!(cell.has_error());
    }

    #[test]
    fn calculate_returns_the_cells_it_recalculated() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "2").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "=A1+1").unwrap();
        workbook.invalidate(&CellLocation::in_sheet("Sheet1", 1, 2));
        let touched = workbook.calculate();
        assert!(touched.contains(&CellLocation::in_sheet("Sheet1", 1, 2)));
    }

    #[test]
    fn effective_accessors_fall_back_to_factory_defaults_when_unset() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "1").unwrap();
        let loc = CellLocation::in_sheet("Sheet1", 1, 1);
        assert_eq!(workbook.effective_format(&loc), workbook.defaults.format);
        assert_eq!(workbook.effective_alignment(&loc), workbook.defaults.alignment);
        assert_eq!(workbook.effective_decimal_places(&loc), workbook.defaults.decimal_places);
        assert_eq!(workbook.effective_use_thousands(&loc), workbook.defaults.use_thousands_separator);
        assert_eq!(workbook.effective_style(&loc), workbook.style_registry.default_style());

        workbook.cell_mut(&loc).unwrap().decimal_places = Some(4);
        assert_eq!(workbook.effective_decimal_places(&loc), 4);
    }
}
