//! Reconciliation between the variable store, documents and workbooks.
//!
//! The store is never touched here: callers pass in the tracked variables,
//! documents, saved ranges and unit flags, and get back what is stale, what
//! to write and which records to persist.
//!
//! # Example
//!
//! ```no_run
//! use varsync::model::{TrackedDocument, UnitUsage, Variable};
//! use varsync::sync::plan_update_all;
//! use varsync::UpdateOptions;
//!
//! let variables = vec![Variable::new(1, "Width", "12").with_unit("cm")];
//! let documents = vec![TrackedDocument {
//!     id: 1,
//!     guid: "6f1c0c1e-0b7e-4a43-9d55-1f0f3c1a2b3c".into(),
//!     name: "report.docx".into(),
//!     path: "/home/me/report.docx".into(),
//! }];
//!
//! let plan = plan_update_all(&documents, &variables, &UnitUsage::new());
//! println!("{} file(s) to update", plan.pending());
//! let report = plan.apply(&UpdateOptions::default());
//! println!("{} updated", report.updated_count());
//! ```

mod batch;
mod excel;
mod live;
mod staleness;

pub use batch::{
    plan_update_all, resolve_document_path, BatchReport, FileOutcome, FileResult, FileUpdate,
    UpdatePlan,
};
pub use excel::{
    plan_range_import, sync_cell_links, sync_saved_ranges, ChangeSource, ExcelSyncReport,
    ImportPlan, ProposedChange, RangeUpdate, SkippedItem,
};
pub use live::{reconcile_document, LiveDocument, OfflineDocument, Reconciliation};
pub use staleness::{
    compute_staleness, desired_values_for_document, resolve_desired_value,
    usage_records_for_scan, ValueChange,
};
