//! Data model shared by the document, workbook and reconciliation layers.
//!
//! These types mirror the records an external variable store keeps
//! (variables, tracked documents, saved ranges, per-document unit flags)
//! plus the transient values the core produces while reading documents
//! and workbooks.

mod cell;
mod snapshot;
mod variable;

pub use cell::*;
pub use snapshot::*;
pub use variable::*;
