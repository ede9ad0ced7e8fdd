//! Name/value/unit block reader.
//!
//! A range is read from its top-left name cell downward: the value sits one
//! column to the right of the name and the unit two columns to the right.
//! Blank name cells before the first entry are tolerated up to a limit; the
//! first blank name after an entry ends the block.

use std::path::Path;

use super::access::open_workbook;
use super::cell_ref::CellRef;
use super::workbook::Sheet;
use crate::error::Result;
use crate::model::{normalize_variable_name, CellValue, TabularRangeRow};
use crate::options::RangeOptions;

/// Read the block starting at `start` from a loaded sheet.
pub fn read_range(sheet: &Sheet, start: CellRef, options: &RangeOptions) -> Vec<TabularRangeRow> {
    let mut rows = Vec::new();
    let mut leading_blanks = 0;

    for offset in 0..options.max_rows {
        let name_cell = start.down(offset);
        let name = sheet.value(&name_cell);

        if name.is_blank() {
            if rows.is_empty() && leading_blanks < options.max_leading_blank_rows {
                leading_blanks += 1;
                continue;
            }
            break;
        }

        rows.push(TabularRangeRow {
            name: normalize_variable_name(&name.to_display_string()),
            value: cell_text(&sheet.value(&name_cell.right(1)), options),
            unit: sheet.value(&name_cell.right(2)).to_display_string().trim().to_string(),
            source_row: name_cell.row,
        });
    }

    log::debug!(
        "range {}!{}: {} row(s)",
        sheet.name(),
        start,
        rows.len()
    );
    rows
}

fn cell_text(value: &CellValue, options: &RangeOptions) -> String {
    let text = value.to_display_string();
    if options.trim_values {
        text.trim().to_string()
    } else {
        text
    }
}

/// Open a workbook and read the block at `start_cell` on `sheet_name`.
///
/// Fails with `NotFound` for a missing file or sheet and `ValidationFailed`
/// for a malformed start cell.
pub fn read_range_from_path(
    path: impl AsRef<Path>,
    sheet_name: &str,
    start_cell: &str,
    options: &RangeOptions,
) -> Result<Vec<TabularRangeRow>> {
    let start = CellRef::parse(start_cell)?;
    let workbook = open_workbook(path)?;
    let sheet = workbook.sheet(sheet_name)?;
    Ok(read_range(&sheet, start, options))
}
