//! Refreshing variables from linked workbook cells and saved ranges.
//!
//! These functions only propose changes; the caller persists them. A link
//! or range that cannot be read is skipped with a warning and listed in the
//! report instead of failing the whole sync.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::model::{SavedRange, TabularRangeRow, Variable};
use crate::options::RangeOptions;
use crate::xlsx::{open_workbook, read_range, CellRef, Sheet, Workbook};

/// Where a proposed value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeSource {
    /// A variable's own single-cell link
    Cell {
        file: String,
        sheet: String,
        cell: String,
    },
    /// A row of a saved range
    Range { name: String, row: u32 },
}

/// A variable whose value differs from its workbook source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub variable_id: i64,
    pub name: String,
    pub old: String,
    pub new: String,
    pub source: ChangeSource,
}

/// A link or range that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Variable or range name
    pub item: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl SkippedItem {
    fn new(item: impl Into<String>, err: &Error) -> Self {
        let item = item.into();
        log::warn!("skipping {}: {}", item, err);
        Self {
            item,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Result of an Excel sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcelSyncReport {
    /// Links or ranges examined
    pub checked: usize,
    pub changes: Vec<ProposedChange>,
    pub skipped: Vec<SkippedItem>,
}

impl ExcelSyncReport {
    /// Whether every source matched the stored values.
    pub fn is_up_to_date(&self) -> bool {
        self.changes.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ExcelSyncReport) {
        self.checked += other.checked;
        self.changes.extend(other.changes);
        self.skipped.extend(other.skipped);
    }
}

/// Loads each workbook and sheet at most once per pass.
#[derive(Default)]
struct SheetCache {
    workbooks: HashMap<String, std::result::Result<Workbook, String>>,
    sheets: HashMap<(String, String), Sheet>,
}

impl SheetCache {
    fn sheet(&mut self, file: &str, sheet: &str) -> crate::Result<&Sheet> {
        let key = (file.to_string(), sheet.to_string());
        if !self.sheets.contains_key(&key) {
            let workbook = self
                .workbooks
                .entry(file.to_string())
                .or_insert_with(|| open_workbook(Path::new(file)).map_err(|e| e.to_string()));
            let workbook = match workbook {
                Ok(wb) => wb,
                Err(reason) => return Err(reopen_error(file, reason)),
            };
            if !workbook.has_sheet(sheet) {
                return Err(Error::NotFound(format!(
                    "sheet {:?} in {}",
                    sheet, file
                )));
            }
            let loaded = workbook.sheet(sheet)?;
            self.sheets.insert(key.clone(), loaded);
        }
        self.sheets
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("sheet {:?} in {}", sheet, file)))
    }
}

/// Rebuild a cached open failure. Errors are not `Clone`, so the kind is
/// recovered from the file system state.
fn reopen_error(file: &str, reason: &str) -> Error {
    if Path::new(file).is_file() {
        Error::InvalidFormat(reason.to_string())
    } else {
        Error::NotFound(file.to_string())
    }
}

/// Compare every complete single-cell link with the stored value.
pub fn sync_cell_links(variables: &[Variable]) -> ExcelSyncReport {
    let mut report = ExcelSyncReport::default();
    let mut cache = SheetCache::default();

    for var in variables {
        let Some(link) = var.cell_link() else {
            continue;
        };
        report.checked += 1;

        let cell = match CellRef::parse(link.cell) {
            Ok(cell) => cell,
            Err(err) => {
                report.skipped.push(SkippedItem::new(&var.name, &err));
                continue;
            }
        };
        let new = match cache.sheet(link.file, link.sheet) {
            Ok(sheet) => sheet.value(&cell).to_display_string(),
            Err(err) => {
                report.skipped.push(SkippedItem::new(&var.name, &err));
                continue;
            }
        };

        if new != var.value {
            report.changes.push(ProposedChange {
                variable_id: var.id,
                name: var.name.clone(),
                old: var.value.clone(),
                new,
                source: ChangeSource::Cell {
                    file: link.file.to_string(),
                    sheet: link.sheet.to_string(),
                    cell: link.cell.to_string(),
                },
            });
        }
    }

    report
}

/// Re-read every saved range and compare rows with the variables of the
/// same name. Rows naming no existing variable are ignored here; importing
/// them is [`plan_range_import`]'s job.
pub fn sync_saved_ranges(
    ranges: &[SavedRange],
    variables: &[Variable],
    options: &RangeOptions,
) -> ExcelSyncReport {
    let mut report = ExcelSyncReport::default();
    let mut cache = SheetCache::default();
    let by_name: HashMap<&str, &Variable> = variables.iter().map(|v| (v.name.as_str(), v)).collect();
    let mut proposed: HashSet<i64> = HashSet::new();

    for range in ranges {
        report.checked += 1;

        let start = match CellRef::parse(&range.start_cell) {
            Ok(start) => start,
            Err(err) => {
                report.skipped.push(SkippedItem::new(&range.name, &err));
                continue;
            }
        };
        let rows = match cache.sheet(&range.file_path, &range.sheet_name) {
            Ok(sheet) => read_range(sheet, start, options),
            Err(err) => {
                report.skipped.push(SkippedItem::new(&range.name, &err));
                continue;
            }
        };

        for row in rows {
            let Some(var) = by_name.get(row.name.as_str()) else {
                continue;
            };
            // the first range to mention a variable wins
            if row.value != var.value && proposed.insert(var.id) {
                report.changes.push(ProposedChange {
                    variable_id: var.id,
                    name: var.name.clone(),
                    old: var.value.clone(),
                    new: row.value,
                    source: ChangeSource::Range {
                        name: range.name.clone(),
                        row: row.source_row,
                    },
                });
            }
        }
    }

    report
}

/// An existing variable a range row would overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeUpdate {
    pub variable_id: i64,
    pub row: TabularRangeRow,
    pub old_value: String,
    pub old_unit: String,
}

/// How a block of range rows maps onto the tracked variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPlan {
    /// Rows naming no existing variable
    pub additions: Vec<TabularRangeRow>,

    /// Rows naming an existing variable; value and unit are replaced
    pub updates: Vec<RangeUpdate>,

    /// Rows with an empty name, or repeating a name seen earlier in the block
    pub rejected: Vec<TabularRangeRow>,
}

impl ImportPlan {
    /// Whether the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.updates.is_empty()
    }
}

/// Split range rows into additions and updates against the tracked
/// variables.
pub fn plan_range_import(rows: &[TabularRangeRow], variables: &[Variable]) -> ImportPlan {
    let by_name: BTreeMap<&str, &Variable> =
        variables.iter().map(|v| (v.name.as_str(), v)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut plan = ImportPlan::default();

    for row in rows {
        if row.name.is_empty() || !seen.insert(row.name.as_str()) {
            plan.rejected.push(row.clone());
            continue;
        }
        match by_name.get(row.name.as_str()) {
            Some(var) => plan.updates.push(RangeUpdate {
                variable_id: var.id,
                row: row.clone(),
                old_value: var.value.clone(),
                old_unit: var.unit.clone().unwrap_or_default(),
            }),
            None => plan.additions.push(row.clone()),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlsx::workbook::tests::build_xlsx;
    use std::fs;

    const SHEET: &str = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>Width</t></is></c><c r="B1"><v>12.0</v></c><c r="C1" t="inlineStr"><is><t>cm</t></is></c></row>
<row r="2"><c r="A2" t="inlineStr"><is><t>Depth</t></is></c><c r="B2"><v>4</v></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t>New Thing</t></is></c><c r="B3"><v>1.5</v></c></row>
</sheetData></worksheet>"#;

    fn book() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.xlsx");
        fs::write(&path, build_xlsx(&[("Data", SHEET)], &[])).unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    fn row(name: &str, value: &str, source_row: u32) -> TabularRangeRow {
        TabularRangeRow {
            name: name.into(),
            value: value.into(),
            unit: String::new(),
            source_row,
        }
    }

    #[test]
    fn test_sync_cell_links_skips_unreadable() {
        let (dir, path) = book();
        let missing = dir.path().join("gone.xlsx").to_string_lossy().into_owned();
        let vars = vec![
            Variable::new(1, "Width", "10").with_cell_link(&path, "Data", "B1"),
            Variable::new(2, "Depth", "4").with_cell_link(&path, "Data", "B2"),
            Variable::new(3, "Ghost", "x").with_cell_link(&path, "NoSheet", "A1"),
            Variable::new(4, "Lost", "y").with_cell_link(&missing, "Data", "A1"),
            Variable::new(5, "Bad", "z").with_cell_link(&path, "Data", "1B"),
            Variable::new(6, "Unlinked", "w"),
        ];

        let report = sync_cell_links(&vars);
        assert_eq!(report.checked, 5);
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].name, "Width");
        assert_eq!(report.changes[0].old, "10");
        assert_eq!(report.changes[0].new, "12");

        let kinds: Vec<_> = report.skipped.iter().map(|s| (s.item.as_str(), s.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("Ghost", ErrorKind::NotFound),
                ("Lost", ErrorKind::NotFound),
                ("Bad", ErrorKind::ValidationFailed),
            ]
        );
    }

    #[test]
    fn test_sync_saved_ranges() {
        let (_dir, path) = book();
        let ranges = vec![
            SavedRange {
                id: 1,
                name: "Geometry".into(),
                file_path: path.clone(),
                sheet_name: "Data".into(),
                start_cell: "A1".into(),
                excel_file_id: None,
                last_synced: None,
            },
            SavedRange {
                id: 2,
                name: "Broken".into(),
                file_path: path,
                sheet_name: "Missing".into(),
                start_cell: "A1".into(),
                excel_file_id: None,
                last_synced: None,
            },
        ];
        let vars = vec![Variable::new(1, "Width", "12"), Variable::new(2, "Depth", "3")];

        let report = sync_saved_ranges(&ranges, &vars, &RangeOptions::default());
        assert_eq!(report.checked, 2);
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].name, "Depth");
        assert_eq!(report.changes[0].new, "4");
        assert_eq!(
            report.changes[0].source,
            ChangeSource::Range {
                name: "Geometry".into(),
                row: 2
            }
        );
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].item, "Broken");
    }

    #[test]
    fn test_plan_range_import() {
        let vars = vec![Variable::new(7, "Width", "10").with_unit("mm")];
        let rows = vec![
            row("Width", "12", 1),
            row("New_Thing", "1.5", 2),
            row("", "3", 3),
            row("Width", "99", 4),
        ];

        let plan = plan_range_import(&rows, &vars);
        assert_eq!(plan.additions.len(), 1);
        assert_eq!(plan.additions[0].name, "New_Thing");
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].variable_id, 7);
        assert_eq!(plan.updates[0].old_unit, "mm");
        assert_eq!(plan.rejected.len(), 2);
    }
}
