//! # varsync
//!
//! Keep named variables in sync with Word documents and Excel workbooks,
//! without Office installed.
//!
//! Word stores document variables as `w:docVar` definitions and renders
//! them through `DOCVARIABLE` fields. This library reads and rewrites both
//! directly inside closed `.docx` packages, reads values from Excel cells
//! and name/value/unit ranges, and reconciles all of it against a set of
//! tracked variables.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use varsync::UpdateOptions;
//!
//! // What does the document hold?
//! let snapshot = varsync::read_docx_snapshot("report.docx")?;
//! println!("defined: {:?}", snapshot.doc_var_values);
//! println!("displayed: {:?}", snapshot.display_field_names);
//!
//! // Push a new value into definitions and display fields
//! let mut updates = BTreeMap::new();
//! updates.insert("Width".to_string(), "12 cm".to_string());
//! let report = varsync::update_docx_variables("report.docx", &updates, &UpdateOptions::default())?;
//! println!("backup at {:?}", report.backup);
//!
//! // Read a value from a workbook
//! let width = varsync::xlsx::read_cell("inputs.xlsx", "Geometry", "B5")?;
//! # Ok::<(), varsync::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`docx`]: field parsing, definition and display patching, read scans
//! - [`xlsx`]: cells, ranges, sheet previews and workbook identity
//! - [`sync`]: staleness, per-document desired values, Update All and
//!   Excel refresh
//! - [`container`]: the OOXML working copy with atomic commit
//!
//! ## Features
//!
//! - `docx` (default): Word document support
//! - `xlsx` (default): Excel workbook support
//!
//! `sync` needs both.

pub mod container;
pub mod detect;
pub mod error;
pub mod model;
pub mod options;

#[cfg(feature = "docx")]
pub mod docx;

#[cfg(feature = "xlsx")]
pub mod xlsx;

#[cfg(all(feature = "docx", feature = "xlsx"))]
pub mod sync;

// Re-exports
pub use container::{OoxmlContainer, Relationship, Relationships};
pub use detect::{detect_format_from_bytes, detect_format_from_path, FormatType};
pub use error::{Error, ErrorKind, Result};
pub use model::{
    normalize_variable_name, CellValue, DocumentVariableSnapshot, SavedRange, TabularRangeRow,
    TrackedDocument, UnitUsage, UsageRecord, Variable,
};
pub use options::{RangeOptions, UpdateOptions};

#[cfg(feature = "docx")]
pub use docx::{
    read_docx_field_names, read_docx_snapshot, read_docx_variables, update_docx_variables,
    DocxDocument, UpdateReport,
};

#[cfg(feature = "xlsx")]
pub use xlsx::{get_or_create_identity, list_sheet_names, read_cell, Workbook};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
