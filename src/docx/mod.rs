//! DOCX (Word) document variables.
//!
//! A Word document stores variable definitions as `w:docVar` entries in
//! `word/settings.xml` and renders them through DOCVARIABLE fields in
//! `word/document.xml`, either as simple fields (`w:fldSimple`) or as
//! complex fields (`w:fldChar` begin/separate/end runs around a
//! `w:instrText`).
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use varsync::docx::DocxDocument;
//!
//! let mut doc = DocxDocument::open("report.docx")?;
//! println!("{:?}", doc.read_defined_variables()?);
//!
//! let mut updates = BTreeMap::new();
//! updates.insert("Width".to_string(), "12 cm".to_string());
//! doc.apply_variable_updates(&updates)?;
//! doc.commit("report.docx")?;
//! # Ok::<(), varsync::Error>(())
//! ```

mod document;
mod field;
mod patch;
mod scan;

pub use document::{
    backup_path, read_docx_field_names, read_docx_snapshot, read_docx_variables,
    update_docx_variables, DocxDocument, PatchSummary, UpdateReport, DOCUMENT_PART,
    SETTINGS_PART,
};
pub use field::parse_docvariable_instruction;
pub use patch::{patch_definitions, patch_display_fields, PartPatch};
pub use scan::{scan_definitions, scan_display_fields};
