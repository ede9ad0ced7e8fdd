//! XLSX (Excel) workbook access.
//!
//! Workbooks are only ever read, with one exception: tagging a workbook
//! with its identity property rewrites the package the same atomic way
//! Word documents are rewritten.
//!
//! # Example
//!
//! ```no_run
//! use varsync::xlsx::{read_cell, read_range_from_path};
//! use varsync::RangeOptions;
//!
//! let width = read_cell("inputs.xlsx", "Geometry", "B5")?;
//! println!("width = {}", width);
//!
//! for row in read_range_from_path("inputs.xlsx", "Geometry", "A2", &RangeOptions::default())? {
//!     println!("{} = {} {}", row.name, row.value, row.unit);
//! }
//! # Ok::<(), varsync::Error>(())
//! ```

mod access;
mod cell_ref;
mod identity;
mod range;
mod shared_strings;
pub(crate) mod workbook;

pub use access::{
    is_workbook_path, list_sheet_names, open_workbook, read_cell, read_sheet_preview,
    validate_link, validate_range,
};
pub use cell_ref::{column_letters, CellRef, MAX_COLUMN, MAX_ROW};
pub use identity::{
    get_or_create_identity, parse_custom_properties, read_identity, set_property,
    try_get_property, verify_identity, CustomProperty, IdentityCheck, IDENTITY_PROPERTY,
};
pub use range::{read_range, read_range_from_path};
pub use shared_strings::SharedStrings;
pub use workbook::{Sheet, Workbook};
