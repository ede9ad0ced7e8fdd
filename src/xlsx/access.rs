//! Path-level workbook operations: sheet listing, single cells, previews
//! and link validation.

use std::path::Path;

use super::cell_ref::CellRef;
use super::range::read_range;
use super::workbook::{Sheet, Workbook};
use crate::error::{Error, Result};
use crate::model::TabularRangeRow;
use crate::options::RangeOptions;

/// Whether the path carries a workbook extension (`.xlsx` or `.xlsm`).
pub fn is_workbook_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xlsm"))
}

/// Open a workbook after checking that the file exists and is named like one.
pub fn open_workbook(path: impl AsRef<Path>) -> Result<Workbook> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::ValidationFailed("no file path specified".to_string()));
    }
    if !path.is_file() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    if !is_workbook_path(path) {
        return Err(Error::ValidationFailed(format!(
            "not an .xlsx or .xlsm file: {}",
            path.display()
        )));
    }
    Workbook::open(path)
}

/// Sheet names in workbook order.
pub fn list_sheet_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let workbook = open_workbook(path)?;
    Ok(workbook.sheet_names().into_iter().map(String::from).collect())
}

/// Load a sheet, naming the available sheets when it does not exist.
fn load_sheet(workbook: &Workbook, sheet_name: &str) -> Result<Sheet> {
    if !workbook.has_sheet(sheet_name) {
        return Err(Error::NotFound(format!(
            "sheet {:?}; available: {}",
            sheet_name,
            workbook.sheet_names().join(", ")
        )));
    }
    workbook.sheet(sheet_name)
}

/// Read one cell as text. Empty cells read as `""`; integral numbers lose
/// their decimal point.
pub fn read_cell(path: impl AsRef<Path>, sheet_name: &str, cell_ref: &str) -> Result<String> {
    let cell = CellRef::parse(cell_ref)?;
    let workbook = open_workbook(path)?;
    let sheet = load_sheet(&workbook, sheet_name)?;
    Ok(sheet.value(&cell).to_display_string())
}

/// The top-left `max_rows` × `max_cols` block of a sheet as text, for
/// pickers. Empty cells are `""`.
pub fn read_sheet_preview(
    path: impl AsRef<Path>,
    sheet_name: &str,
    max_rows: u32,
    max_cols: u32,
) -> Result<Vec<Vec<String>>> {
    let workbook = open_workbook(path)?;
    let sheet = load_sheet(&workbook, sheet_name)?;
    Ok(preview_grid(&sheet, max_rows, max_cols))
}

pub(crate) fn preview_grid(sheet: &Sheet, max_rows: u32, max_cols: u32) -> Vec<Vec<String>> {
    (1..=max_rows)
        .map(|row| {
            (1..=max_cols)
                .map(|col| {
                    sheet
                        .get(col, row)
                        .map(|v| v.to_display_string())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

/// Check a range before saving it and return the rows it currently yields.
///
/// A range that yields no rows is rejected with `ValidationFailed`.
pub fn validate_range(
    path: impl AsRef<Path>,
    sheet_name: &str,
    start_cell: &str,
    options: &RangeOptions,
) -> Result<Vec<TabularRangeRow>> {
    let start = CellRef::parse(start_cell)?;
    let workbook = open_workbook(path)?;
    let sheet = load_sheet(&workbook, sheet_name)?;

    let rows = read_range(&sheet, start, options);
    if rows.is_empty() {
        return Err(Error::ValidationFailed(format!(
            "no variables found starting at {}",
            start
        )));
    }
    Ok(rows)
}

/// Check a single-cell link and return the cell's current value.
pub fn validate_link(path: impl AsRef<Path>, sheet_name: &str, cell_ref: &str) -> Result<String> {
    read_cell(path, sheet_name, cell_ref)
}
