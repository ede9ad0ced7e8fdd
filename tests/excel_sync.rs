//! Workbook reads, ranges, identity and the Excel refresh.

mod common;

use std::fs;

use common::{build_xlsx, num_cell, text_cell};
use varsync::sync::{plan_range_import, sync_cell_links, sync_saved_ranges, ChangeSource};
use varsync::xlsx::{
    get_or_create_identity, read_identity, read_range_from_path, read_sheet_preview,
    validate_range, verify_identity, IdentityCheck,
};
use varsync::{list_sheet_names, read_cell, ErrorKind, RangeOptions, SavedRange, Variable};

fn row(r: u32, cells: &[String]) -> String {
    format!(r#"<row r="{}">{}</row>"#, r, cells.concat())
}

/// Rows 5 and 6 hold variables, row 7 is blank, row 8 holds one more.
fn inputs_sheet() -> String {
    [
        row(1, &[text_cell("A1", "Inputs")]),
        row(5, &[text_cell("A5", "Width"), num_cell("B5", "12.0"), text_cell("C5", "cm")]),
        row(6, &[text_cell("A6", " Total Depth "), num_cell("B6", "0.5")]),
        row(8, &[text_cell("A8", "Late"), num_cell("B8", "3")]),
    ]
    .concat()
}

fn workbook(dir: &std::path::Path) -> String {
    let path = dir.join("inputs.xlsx");
    let other = row(1, &[text_cell("A1", "Name"), num_cell("B1", "7")]);
    fs::write(&path, build_xlsx(&[("Geometry", &inputs_sheet()), ("Other", &other)])).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_range_stops_at_first_blank() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    for start in ["A5", "A3", "$A$5"] {
        let rows = read_range_from_path(&path, "Geometry", start, &RangeOptions::default()).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Width", "Total_Depth"], "start {}", start);
    }
}

#[test]
fn test_range_values_are_coerced() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    let rows = read_range_from_path(&path, "Geometry", "A5", &RangeOptions::default()).unwrap();
    assert_eq!(rows[0].value, "12");
    assert_eq!(rows[0].unit, "cm");
    assert_eq!(rows[0].source_row, 5);
    assert_eq!(rows[1].value, "0.5");
    assert_eq!(rows[1].unit, "");

    assert_eq!(read_cell(&path, "Geometry", "B5").unwrap(), "12");
    assert_eq!(read_cell(&path, "Geometry", "Z99").unwrap(), "");
}

#[test]
fn test_empty_range_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    let err = validate_range(&path, "Geometry", "D1", &RangeOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert_eq!(
        validate_range(&path, "Geometry", "A8", &RangeOptions::default())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_sheets_and_preview() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    assert_eq!(list_sheet_names(&path).unwrap(), vec!["Geometry", "Other"]);

    let grid = read_sheet_preview(&path, "Geometry", 5, 3).unwrap();
    assert_eq!(grid.len(), 5);
    assert_eq!(grid[0], vec!["Inputs", "", ""]);
    assert_eq!(grid[4], vec!["Width", "12", "cm"]);

    let err = read_cell(&path, "Missing", "A1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_identity_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    assert_eq!(read_identity(&path).unwrap(), None);
    assert_eq!(verify_identity(&path, "x").unwrap(), IdentityCheck::Untagged);

    let id = get_or_create_identity(&path).unwrap();
    assert_eq!(id.len(), 36);
    assert_eq!(get_or_create_identity(&path).unwrap(), id);
    assert_eq!(read_identity(&path).unwrap().as_deref(), Some(id.as_str()));

    assert_eq!(verify_identity(&path, &id.to_uppercase()).unwrap(), IdentityCheck::Match);
    assert_eq!(
        verify_identity(&path, "00000000-0000-0000-0000-000000000000").unwrap(),
        IdentityCheck::Mismatch { found: id.clone() }
    );

    // tagging leaves the data readable
    assert_eq!(read_cell(&path, "Geometry", "A5").unwrap(), "Width");
}

#[test]
fn test_cell_links_propose_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    let variables = vec![
        Variable::new(1, "Width", "10").with_cell_link(&path, "Geometry", "B5"),
        Variable::new(2, "Name", "7").with_cell_link(&path, "Other", "B1"),
        Variable::new(3, "Lost", "1").with_cell_link(&path, "Gone", "A1"),
        Variable::new(4, "Free", "x"),
    ];
    let report = sync_cell_links(&variables);

    assert_eq!(report.checked, 3);
    assert_eq!(report.changes.len(), 1);
    let change = &report.changes[0];
    assert_eq!((change.old.as_str(), change.new.as_str()), ("10", "12"));
    assert!(matches!(&change.source, ChangeSource::Cell { cell, .. } if cell == "B5"));

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].item, "Lost");
    assert_eq!(report.skipped[0].kind, ErrorKind::NotFound);
}

#[test]
fn test_saved_ranges_and_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = workbook(dir.path());

    let ranges = vec![
        SavedRange {
            id: 1,
            name: "Geometry inputs".into(),
            file_path: path.clone(),
            sheet_name: "Geometry".into(),
            start_cell: "A5".into(),
            excel_file_id: None,
            last_synced: None,
        },
        SavedRange {
            id: 2,
            name: "Broken".into(),
            file_path: dir.path().join("missing.xlsx").to_string_lossy().into_owned(),
            sheet_name: "Geometry".into(),
            start_cell: "A5".into(),
            excel_file_id: None,
            last_synced: None,
        },
    ];
    let variables = vec![Variable::new(1, "Width", "11").with_unit("cm")];

    let report = sync_saved_ranges(&ranges, &variables, &RangeOptions::default());
    assert_eq!(report.checked, 2);
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].new, "12");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, ErrorKind::NotFound);

    let rows = read_range_from_path(&path, "Geometry", "A5", &RangeOptions::default()).unwrap();
    let plan = plan_range_import(&rows, &variables);
    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].old_value, "11");
    assert_eq!(plan.additions.len(), 1);
    assert_eq!(plan.additions[0].name, "Total_Depth");
    assert!(plan.rejected.is_empty());
}
