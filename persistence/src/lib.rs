//! FILENAME: persistence/src/lib.rs
//! PURPOSE: Workbook save/load: a self-describing zip+JSON document (§4.9).
//! CONTEXT: Only raw content and explicit per-cell overrides are
//! persisted — computed values, the dependency graph, and every formula's
//! parsed AST are rebuilt by `Workbook::full_recalculate` on load, never
//! serialized. Formulas are written out in their raw relative form via
//! `AstOps::to_raw_string` so a copy/pasted formula still means the same
//! thing after a save/load round trip (§4.3).

mod error;

pub use error::PersistenceError;

use engine::{Alignment, AstOps, Cell, CellStyle, Column, ColumnWidth, Format, Sheet, Workbook};
use log::info;
use parser::CellLocation;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

const DOCUMENT_ENTRY: &str = "workbook.json";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedWorkbook {
    sheets: Vec<PersistedSheet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSheet {
    name: String,
    active_column: u32,
    active_row: u32,
    columns: Vec<PersistedColumn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedColumn {
    index: u32,
    width: ColumnWidth,
    cells: Vec<PersistedCell>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCell {
    row: u32,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alignment: Option<Alignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decimal_places: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_thousands_separator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<CellStyle>,
}

/// A cell's raw relative-form content: formulas render from their parsed
/// tree (so they survive translation); everything else is the literal text
/// the user typed (§4.9).
fn persisted_content(cell: &Cell) -> String {
    match &cell.formula_tree {
        Some(expr) => format!("={}", expr.to_raw_string()),
        None => cell.raw_content.clone(),
    }
}

fn persist_cell(cell: &Cell, styles: &engine::StyleRegistry) -> PersistedCell {
    PersistedCell {
        row: cell.location.row,
        content: persisted_content(cell),
        format: cell.format.clone(),
        alignment: cell.alignment,
        decimal_places: cell.decimal_places,
        use_thousands_separator: cell.use_thousands_separator,
        style: cell.style_index.map(|idx| styles.get(idx)),
    }
}

fn persist_column(column: &Column, styles: &engine::StyleRegistry) -> PersistedColumn {
    PersistedColumn {
        index: column.index,
        width: column.width,
        cells: column.iter().map(|c| persist_cell(c, styles)).collect(),
    }
}

fn persist_sheet(sheet: &Sheet, styles: &engine::StyleRegistry) -> PersistedSheet {
    PersistedSheet {
        name: sheet.name.clone(),
        active_column: sheet.active_location.column,
        active_row: sheet.active_location.row,
        columns: sheet.columns.columns().map(|c| persist_column(c, styles)).collect(),
    }
}

fn to_document(workbook: &Workbook) -> PersistedWorkbook {
    PersistedWorkbook { sheets: workbook.sheets.iter().map(|s| persist_sheet(s, &workbook.style_registry)).collect() }
}

fn restore_sheet(document: PersistedSheet, workbook: &mut Workbook) {
    let strict = workbook.defaults.strict_formula_errors;
    let mut sheet = Sheet::new(document.name.clone());
    sheet.active_location = CellLocation::in_sheet(document.name, document.active_column, document.active_row);

    for column in document.columns {
        if !matches!(column.width, ColumnWidth::Fixed(w) if w == engine::column_list::DEFAULT_WIDTH) {
            let _ = sheet.columns.set_column_width(column.index, column.width);
        }
        for persisted in column.cells {
            let cell = sheet.columns.get_cell(column.index, persisted.row, true).unwrap();
            let _ = cell.set_content(&persisted.content, strict);
            cell.format = persisted.format;
            cell.alignment = persisted.alignment;
            cell.decimal_places = persisted.decimal_places;
            cell.use_thousands_separator = persisted.use_thousands_separator;
            cell.style_index = persisted.style.map(|style| workbook.style_registry.get_or_create(style));
        }
    }

    workbook.sheets.push(sheet);
}

/// §6 `open`: loads a workbook and schedules a full recalculate — the
/// dependency graph and every computed value start from scratch (§4.9).
pub fn open(path: &Path) -> Result<Workbook, PersistenceError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut document_text = String::new();
    archive.by_name(DOCUMENT_ENTRY)?.read_to_string(&mut document_text)?;
    let document: PersistedWorkbook = serde_json::from_str(&document_text)?;
    if document.sheets.is_empty() {
        return Err(PersistenceError::InvalidFormat("workbook contains no sheets".to_string()));
    }

    let mut workbook = Workbook::new();
    workbook.sheets.clear();
    for sheet in document.sheets {
        restore_sheet(sheet, &mut workbook);
    }
    workbook.full_recalculate();
    workbook.path = Some(path.to_path_buf());
    workbook.modified = false;
    Ok(workbook)
}

/// §6 `write`: persists `workbook` to `path`. When `backup` is set, the
/// previous file at `path` (if any) is copied to `path` with a `.bak`
/// extension first — the old backup is deleted before the copy so a
/// failed save never leaves two generations of backup lying around
/// (§4.9's backup policy).
pub fn write(workbook: &mut Workbook, path: &Path, backup: bool) -> Result<(), PersistenceError> {
    if backup && path.exists() {
        let bak_path = backup_path(path);
        if bak_path.exists() {
            std::fs::remove_file(&bak_path)?;
        }
        std::fs::copy(path, &bak_path)?;
    }

    let document = to_document(workbook);
    let body = serde_json::to_vec_pretty(&document)?;

    let tmp_path = path.with_extension("tmp");
    {
        let file = std::fs::File::create(&tmp_path)?;
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip_writer.start_file(DOCUMENT_ENTRY, options)?;
        zip_writer.write_all(&body)?;
        zip_writer.finish()?;
    }
    std::fs::rename(&tmp_path, path)?;

    workbook.path = Some(path.to_path_buf());
    workbook.modified = false;
    info!("wrote workbook to {}", path.display());
    Ok(())
}

fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::Variant;

    #[test]
    fn round_trips_a_formula_and_its_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.calcula");

        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "5").unwrap();
        workbook.set_cell_content("Sheet1", 1, 2, "=A1*2").unwrap();
        write(&mut workbook, &path, false).unwrap();

        let loaded = open(&path).unwrap();
        let cell = loaded.cell(&CellLocation::in_sheet("Sheet1", 1, 2)).unwrap();
        assert_eq!(cell.computed_value, Variant::Number(10.0));
        assert!(cell.raw_content.starts_with('='));
    }

    #[test]
    fn backup_policy_copies_previous_file_before_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.calcula");

        let mut workbook = Workbook::new();
        workbook.set_cell_content("Sheet1", 1, 1, "1").unwrap();
        write(&mut workbook, &path, false).unwrap();

        workbook.set_cell_content("Sheet1", 1, 1, "2").unwrap();
        write(&mut workbook, &path, true).unwrap();

        assert!(backup_path(&path).exists());
    }
}
