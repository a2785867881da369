//! FILENAME: engine/src/column_list.rs
//! PURPOSE: The per-sheet sparse cell store and the `Sheet` it belongs to
//! (§3, §4.7).
//! CONTEXT: Columns are kept in a `Vec` sorted by index; each column's cells
//! are a `Vec` sorted by row. Both levels use binary search rather than a
//! hash map, matching §4.7's "GetCell... binary-searches the ordered cell
//! list" — this also makes `insert_row`/`insert_column`'s index-shifting a
//! simple linear walk instead of a full-table rehash.

use crate::cell::Cell;
use parser::CellLocation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_WIDTH: u32 = 10;
pub const MIN_WIDTH: u32 = 1;
pub const MAX_WIDTH: u32 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnWidth {
    Fixed(u32),
    Auto,
}

impl Default for ColumnWidth {
    fn default() -> Self {
        ColumnWidth::Fixed(DEFAULT_WIDTH)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub index: u32,
    pub width: ColumnWidth,
    /// Cells in this column, kept sorted by row.
    cells: Vec<Cell>,
}

impl Column {
    fn new(index: u32) -> Self {
        Column { index, width: ColumnWidth::default(), cells: Vec::new() }
    }

    fn find(&self, row: u32) -> Result<usize, usize> {
        self.cells.binary_search_by_key(&row, |c| c.location.row)
    }

    pub fn get(&self, row: u32) -> Option<&Cell> {
        self.find(row).ok().map(|idx| &self.cells[idx])
    }

    pub fn get_mut(&mut self, row: u32) -> Option<&mut Cell> {
        match self.find(row) {
            Ok(idx) => Some(&mut self.cells[idx]),
            Err(_) => None,
        }
    }

    fn insert(&mut self, cell: Cell) -> &mut Cell {
        match self.find(cell.location.row) {
            Ok(idx) => {
                self.cells[idx] = cell;
                &mut self.cells[idx]
            }
            Err(idx) => {
                self.cells.insert(idx, cell);
                &mut self.cells[idx]
            }
        }
    }

    pub fn remove(&mut self, row: u32) -> Option<Cell> {
        match self.find(row) {
            Ok(idx) => Some(self.cells.remove(idx)),
            Err(_) => None,
        }
    }

    pub fn max_row(&self) -> u32 {
        self.cells.last().map(|c| c.location.row).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Resolved width in character cells: an explicit fixed width, or the
    /// widest rendered cell (clipped to `[MIN_WIDTH, MAX_WIDTH]`) when "auto".
    pub fn resolved_width(&self) -> u32 {
        match self.width {
            ColumnWidth::Fixed(w) => w,
            ColumnWidth::Auto => {
                let widest = self.cells.iter().map(|c| c.value_display().len() as u32).max().unwrap_or(DEFAULT_WIDTH);
                widest.clamp(MIN_WIDTH, MAX_WIDTH)
            }
        }
    }
}

/// A sparse, column-major cell store: columns sorted by index, cells within
/// a column sorted by row (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnList {
    columns: Vec<Column>,
}

impl ColumnList {
    pub fn new() -> Self {
        ColumnList { columns: Vec::new() }
    }

    fn find_column(&self, index: u32) -> Result<usize, usize> {
        self.columns.binary_search_by_key(&index, |c| c.index)
    }

    fn column_mut_or_insert(&mut self, index: u32) -> &mut Column {
        match self.find_column(index) {
            Ok(idx) => &mut self.columns[idx],
            Err(idx) => {
                self.columns.insert(idx, Column::new(index));
                &mut self.columns[idx]
            }
        }
    }

    pub fn column(&self, index: u32) -> Option<&Column> {
        self.find_column(index).ok().map(|idx| &self.columns[idx])
    }

    pub fn column_mut(&mut self, index: u32) -> Option<&mut Column> {
        self.find_column(index).ok().map(move |idx| &mut self.columns[idx])
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// §4.7 `GetCell`: locate-or-insert the column, then binary-search the
    /// row within it; inserts an empty cell at the correct position when
    /// `create` is set and none exists.
    pub fn get_cell(&mut self, column: u32, row: u32, create: bool) -> Option<&mut Cell> {
        if create {
            let col = self.column_mut_or_insert(column);
            if col.find(row).is_err() {
                col.insert(Cell::new(CellLocation::unqualified(column, row)));
            }
            col.get_mut(row)
        } else {
            self.column_mut(column).and_then(|col| col.get_mut(row))
        }
    }

    pub fn peek_cell(&self, column: u32, row: u32) -> Option<&Cell> {
        self.column(column).and_then(|col| col.get(row))
    }

    pub fn delete_cell(&mut self, column: u32, row: u32) -> Option<Cell> {
        let (col_idx, removed) = {
            let col = self.column_mut(column)?;
            let removed = col.remove(row);
            (self.find_column(column).ok(), removed)
        };
        if let Some(idx) = col_idx {
            if self.columns[idx].is_empty() {
                self.columns.remove(idx);
            }
        }
        removed
    }

    pub fn set_column_width(&mut self, index: u32, width: ColumnWidth) -> Result<(), &'static str> {
        if let ColumnWidth::Fixed(w) = width {
            if !(MIN_WIDTH..=MAX_WIDTH).contains(&w) {
                return Err("column width out of range");
            }
        }
        self.column_mut_or_insert(index).width = width;
        Ok(())
    }

    pub fn extent(&self) -> (u32, u32) {
        let max_col = self.columns.last().map(|c| c.index).unwrap_or(0);
        let max_row = self.columns.iter().map(|c| c.max_row()).max().unwrap_or(0);
        (max_col, max_row)
    }

    /// §4.7 `InsertColumn`/`DeleteColumn`: shifts every column at or beyond
    /// `at` by `delta` (+1 for insert, -1 for delete). A column shifted to
    /// index 0 (i.e. the deleted line itself) is dropped.
    pub fn shift_columns(&mut self, at: u32, delta: i32) {
        let mut kept = Vec::with_capacity(self.columns.len());
        for mut col in std::mem::take(&mut self.columns) {
            if col.index >= at {
                let shifted = col.index as i64 + delta as i64;
                if shifted < 1 {
                    continue;
                }
                col.index = shifted as u32;
                for cell in col.iter_mut() {
                    cell.location.column = col.index;
                }
            }
            kept.push(col);
        }
        kept.sort_by_key(|c| c.index);
        self.columns = kept;
    }

    /// §4.7 `InsertRow`/`DeleteRow`: shifts every cell at or beyond row `at`
    /// within every column by `delta`.
    pub fn shift_rows(&mut self, at: u32, delta: i32) {
        for col in self.columns.iter_mut() {
            let mut kept = Vec::with_capacity(col.cells.len());
            for mut cell in std::mem::take(&mut col.cells) {
                if cell.location.row >= at {
                    let shifted = cell.location.row as i64 + delta as i64;
                    if shifted < 1 {
                        continue;
                    }
                    cell.location.row = shifted as u32;
                }
                kept.push(cell);
            }
            kept.sort_by_key(|c| c.location.row);
            col.cells = kept;
        }
    }

    pub fn all_formula_locations(&self) -> HashSet<CellLocation> {
        self.columns
            .iter()
            .flat_map(|c| c.iter())
            .filter(|c| c.is_formula())
            .map(|c| c.location.clone())
            .collect()
    }

    /// §4.7/§8 `SortCells`: bubble-sorts the rows of `row_start..=row_end`
    /// by the value in `sort_column`, swapping every column in
    /// `col_start..=col_end` together so a row's data stays aligned.
    /// Bubble sort (rather than a faster comparison sort) makes each swap a
    /// single atomic multi-column operation and keeps equal rows in their
    /// original relative order.
    pub fn sort_cells(&mut self, sort_column: u32, descending: bool, row_start: u32, row_end: u32, col_start: u32, col_end: u32) {
        if row_end <= row_start {
            return;
        }
        let row_count = (row_end - row_start + 1) as usize;
        for i in 0..row_count {
            for j in 0..row_count - 1 - i {
                let row_a = row_start + j as u32;
                let row_b = row_a + 1;
                let key_a = self.sort_key(sort_column, row_a);
                let key_b = self.sort_key(sort_column, row_b);
                let ordering = key_a.compare(&key_b);
                let should_swap =
                    if descending { ordering == std::cmp::Ordering::Less } else { ordering == std::cmp::Ordering::Greater };
                if should_swap {
                    self.swap_rows(row_a, row_b, col_start, col_end);
                }
            }
        }
    }

    fn sort_key(&self, column: u32, row: u32) -> parser::Variant {
        self.peek_cell(column, row).map(|c| c.computed_value.clone()).unwrap_or(parser::Variant::Empty)
    }

    fn swap_rows(&mut self, row_a: u32, row_b: u32, col_start: u32, col_end: u32) {
        for col_idx in col_start..=col_end {
            let Some(col) = self.column_mut(col_idx) else { continue };
            let cell_a = col.remove(row_a);
            let cell_b = col.remove(row_b);
            if let Some(mut cell) = cell_a {
                cell.location.row = row_b;
                col.insert(cell);
            }
            if let Some(mut cell) = cell_b {
                cell.location.row = row_a;
                col.insert(cell);
            }
        }
    }
}

/// A single worksheet: its cells, active cursor, and editing state (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub columns: ColumnList,
    pub active_location: CellLocation,
    pub ready: bool,
    pub modified: bool,
    #[serde(skip)]
    pub invalid_cells: HashSet<CellLocation>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Sheet {
            active_location: CellLocation::in_sheet(name.clone(), 1, 1),
            name,
            columns: ColumnList::new(),
            ready: true,
            modified: false,
            invalid_cells: HashSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn get_cell_creates_in_sorted_position() {
        let mut list = ColumnList::new();
        list.get_cell(3, 1, true);
        list.get_cell(1, 1, true);
        list.get_cell(2, 1, true);
        let indices: Vec<u32> = list.columns().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn get_cell_without_create_does_not_insert() {
        let mut list = ColumnList::new();
        assert!(list.get_cell(1, 1, false).is_none());
        assert_eq!(list.columns().count(), 0);
    }

    #[test]
    fn deleting_last_cell_in_a_column_removes_the_column() {
        let mut list = ColumnList::new();
        list.get_cell(1, 1, true);
        list.delete_cell(1, 1);
        assert_eq!(list.columns().count(), 0);
    }

    #[test]
    fn shift_columns_moves_cells_and_drops_overwritten_line() {
        let mut list = ColumnList::new();
        list.get_cell(2, 1, true).unwrap().set_content("x", false).unwrap();
        list.shift_columns(1, 1);
        assert!(list.column(2).is_none());
        assert!(list.column(3).is_some());
    }

    #[test]
    fn shift_columns_drops_cells_shifted_below_one() {
        let mut list = ColumnList::new();
        list.get_cell(1, 1, true);
        list.shift_columns(1, -1);
        assert!(list.column(0).is_none());
        assert_eq!(list.columns().count(), 0);
    }

    #[test]
    fn auto_width_reflects_widest_rendered_cell() {
        let mut list = ColumnList::new();
        list.get_cell(1, 1, true).unwrap().set_content("hello world", false).unwrap();
        list.set_column_width(1, ColumnWidth::Auto).unwrap();
        assert_eq!(list.column(1).unwrap().resolved_width(), 11);
    }

    #[test]
    fn column_width_rejects_out_of_range() {
        let mut list = ColumnList::new();
        assert!(list.set_column_width(1, ColumnWidth::Fixed(0)).is_err());
        assert!(list.set_column_width(1, ColumnWidth::Fixed(73)).is_err());
    }

    #[test]
    fn sort_cells_orders_ascending_by_column() {
        let mut list = ColumnList::new();
        list.get_cell(1, 1, true).unwrap().set_content("1", false).unwrap();
        list.get_cell(1, 2, true).unwrap().set_content("3", false).unwrap();
        list.get_cell(1, 3, true).unwrap().set_content("2", false).unwrap();
        list.sort_cells(1, false, 1, 3, 1, 1);
        let values: Vec<f64> = (1..=3).map(|r| list.peek_cell(1, r).unwrap().computed_value.to_number().unwrap()).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sort_cells_keeps_non_sort_columns_aligned() {
        let mut list = ColumnList::new();
        list.get_cell(1, 1, true).unwrap().set_content("2", false).unwrap();
        list.get_cell(2, 1, true).unwrap().set_content("b", false).unwrap();
        list.get_cell(1, 2, true).unwrap().set_content("1", false).unwrap();
        list.get_cell(2, 2, true).unwrap().set_content("a", false).unwrap();
        list.sort_cells(1, false, 1, 2, 1, 2);
        assert_eq!(list.peek_cell(2, 1).unwrap().raw_content, "a");
        assert_eq!(list.peek_cell(2, 2).unwrap().raw_content, "b");
    }

    #[test]
    fn sort_cells_never_swaps_rows_with_equal_keys() {
        let mut list = ColumnList::new();
        for (row, tag) in [(1, "first"), (2, "second"), (3, "third")] {
            list.get_cell(1, row, true).unwrap().set_content("5", false).unwrap();
            list.get_cell(2, row, true).unwrap().set_content(tag, false).unwrap();
        }
        list.sort_cells(1, false, 1, 3, 1, 2);
        let tags: Vec<String> = (1..=3).map(|r| list.peek_cell(2, r).unwrap().raw_content.clone()).collect();
        assert_eq!(tags, vec!["first", "second", "third"]);
    }
}
