//! FILENAME: engine/src/render.rs
//! PURPOSE: Composes one sheet row into fixed-width styled spans for
//! display (§4.6, §4.7, §6).
//! CONTEXT: Each occupied cell renders through `FormatRegistry` using its
//! own overrides where set, falling back to the workbook's factory
//! defaults otherwise. A text cell whose rendering overflows its own
//! column swallows the following empty cells on the same row until it
//! fits or meets an occupied cell, matching the source's row-rendering
//! overflow behaviour.

use crate::cell::CellKind;
use crate::column_list::ColumnWidth;
use crate::format::{effective_alignment, fit_or_asterisks, pad_to_width, Alignment, Format};
use crate::style::CellStyle;
use crate::workbook::Workbook;
use parser::{CellLocation, Variant};

#[derive(Debug, Clone, PartialEq)]
pub struct StyledSpan {
    pub text: String,
    pub width: u32,
    pub alignment: Alignment,
    pub style: CellStyle,
}

impl Workbook {
    /// §6 `get_row`: renders `width` columns of `row` on `sheet`, starting
    /// at `start_column`, as a sequence of fixed-width styled spans ready
    /// for display.
    pub fn get_row(&mut self, sheet: &str, start_column: u32, row: u32, width: u32) -> Vec<StyledSpan> {
        let mut spans = Vec::new();
        let last_column = start_column + width.saturating_sub(1);
        let mut column = start_column;

        while column <= last_column {
            let col_width = self.resolved_column_width(sheet, column);
            let cell = self.sheet(sheet).and_then(|s| s.columns.peek_cell(column, row)).cloned();

            let Some(cell) = cell else {
                spans.push(self.blank_span(col_width));
                column += 1;
                continue;
            };

            let loc = CellLocation::in_sheet(sheet, column, row);

            if cell.has_error() {
                let text = cell.value_display();
                spans.push(self.cell_span(&loc, pad_to_width(&text, col_width as usize, Alignment::Left), col_width, Alignment::Left));
                column += 1;
                continue;
            }

            let format = self.effective_format(&loc);
            let decimal_places = self.effective_decimal_places(&loc);
            let thousands = self.effective_use_thousands(&loc);
            let is_numeric = matches!(cell.computed_value, Variant::Number(_)) && !matches!(format, Format::Text);
            let alignment = effective_alignment(self.effective_alignment(&loc), is_numeric);
            let rendered = self.format_registry.render(&cell.computed_value, &format, decimal_places, thousands, &cell.raw_content);

            if is_numeric {
                let fitted = fit_or_asterisks(rendered, col_width as usize);
                spans.push(self.cell_span(&loc, pad_to_width(&fitted, col_width as usize, alignment), col_width, alignment));
                column += 1;
                continue;
            }

            if rendered.len() as u32 <= col_width {
                spans.push(self.cell_span(&loc, pad_to_width(&rendered, col_width as usize, alignment), col_width, alignment));
                column += 1;
                continue;
            }

            let (span_width, next_column) = self.overflow_width(sheet, row, column, col_width, rendered.len() as u32, last_column);
            let truncated: String = rendered.chars().take(span_width as usize).collect();
            spans.push(self.cell_span(&loc, pad_to_width(&truncated, span_width as usize, alignment), span_width, alignment));
            column = next_column;
        }

        spans
    }

    /// Grows a text span rightward across empty cells on the same row
    /// until `needed` characters fit, the row edge is reached, or the next
    /// cell is occupied (§4.7 "multi-cell text overflow").
    fn overflow_width(&self, sheet: &str, row: u32, start: u32, start_width: u32, needed: u32, last_column: u32) -> (u32, u32) {
        let mut span_width = start_width;
        let mut next = start + 1;
        while span_width < needed && next <= last_column {
            let occupied = self
                .sheet(sheet)
                .and_then(|s| s.columns.peek_cell(next, row))
                .map(|c| c.kind != CellKind::Empty)
                .unwrap_or(false);
            if occupied {
                break;
            }
            span_width += self.resolved_column_width(sheet, next);
            next += 1;
        }
        (span_width, next)
    }

    fn resolved_column_width(&self, sheet: &str, column: u32) -> u32 {
        self.sheet(sheet)
            .and_then(|s| s.columns.column(column))
            .map(|c| c.resolved_width())
            .unwrap_or(match self.defaults.column_width {
                ColumnWidth::Fixed(w) => w,
                ColumnWidth::Auto => crate::column_list::DEFAULT_WIDTH,
            })
    }

    fn cell_span(&self, loc: &CellLocation, text: String, width: u32, alignment: Alignment) -> StyledSpan {
        let style = self.effective_style(loc);
        StyledSpan { text, width, alignment, style }
    }

    fn blank_span(&self, width: u32) -> StyledSpan {
        StyledSpan { text: " ".repeat(width as usize), width, alignment: Alignment::General, style: self.style_registry.default_style() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_a_row_of_mixed_numeric_and_empty_cells() {
        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "42").unwrap();
        let spans = workbook.get_row("Sheet1", 1, 1, 2);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].text.trim_end().ends_with("42"));
        assert_eq!(spans[1].text.trim(), "");
    }

    #[test]
    fn text_overflows_into_following_empty_cell() {
        let mut workbook = Workbook::new();
        workbook.sheet_mut("Sheet1").unwrap().columns.set_column_width(1, ColumnWidth::Fixed(4)).unwrap();
        workbook.set_cell_content("Sheet1", 1, 1, "hello world").unwrap();
        let spans = workbook.get_row("Sheet1", 1, 1, 3);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].text.starts_with("hello world"));
    }

    #[test]
    fn text_overflow_stops_at_an_occupied_cell() {
        let mut workbook = Workbook::new();
        workbook.sheet_mut("Sheet1").unwrap().columns.set_column_width(1, ColumnWidth::Fixed(4)).unwrap();
        workbook.set_cell_content("Sheet1", 1, 1, "hello world").unwrap();
        workbook.set_cell_content("Sheet1", 2, 1, "x").unwrap();
        let spans = workbook.get_row("Sheet1", 1, 1, 3);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].width, 4);
    }

    #[test]
    fn numeric_overflow_becomes_asterisks() {
        let mut workbook = Workbook::new();
        workbook.sheet_mut("Sheet1").unwrap().columns.set_column_width(1, ColumnWidth::Fixed(2)).unwrap();
        workbook.set_cell_content("Sheet1", 1, 1, "12345").unwrap();
        let spans = workbook.get_row("Sheet1", 1, 1, 1);
        assert_eq!(spans[0].text, "**");
    }
}
