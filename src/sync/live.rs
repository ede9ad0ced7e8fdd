//! Single-document reconciliation over any document source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::staleness::{
    compute_staleness, desired_values_for_document, usage_records_for_scan, ValueChange,
};
use crate::docx::{read_docx_snapshot, update_docx_variables};
use crate::error::Result;
use crate::model::{DocumentVariableSnapshot, UnitUsage, UsageRecord, Variable};
use crate::options::UpdateOptions;

/// A document whose variables can be read and written.
///
/// Implemented by the automation layer for documents open in Word, and by
/// [`OfflineDocument`] for closed files. Reconciliation only talks to this
/// trait, so it behaves the same for both.
pub trait LiveDocument {
    /// Current definitions and displayed names.
    fn snapshot(&mut self) -> Result<DocumentVariableSnapshot>;

    /// Store the given values and refresh their display fields. Returns the
    /// names that changed.
    fn apply_values(&mut self, values: &BTreeMap<String, String>) -> Result<Vec<String>>;
}

/// A closed `.docx` file on disk.
#[derive(Debug, Clone)]
pub struct OfflineDocument {
    path: PathBuf,
    options: UpdateOptions,
}

impl OfflineDocument {
    /// Wrap a path with default update options (backup on).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: UpdateOptions::default(),
        }
    }

    /// Use specific update options.
    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LiveDocument for OfflineDocument {
    fn snapshot(&mut self) -> Result<DocumentVariableSnapshot> {
        read_docx_snapshot(&self.path)
    }

    fn apply_values(&mut self, values: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let report = update_docx_variables(&self.path, values, &self.options)?;
        Ok(report.updated)
    }
}

/// What reconciling one document found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Identity the document was reconciled under
    pub document: String,

    /// Desired values for every tracked name the document holds or shows
    pub desired: BTreeMap<String, String>,

    /// Stored definitions that differ from their desired value
    pub stale: BTreeMap<String, ValueChange>,

    /// Usage records the store should persist for this document
    pub usage: Vec<UsageRecord>,

    /// Names the document holds or shows that are not tracked variables
    pub untracked: Vec<String>,
}

impl Reconciliation {
    /// Whether the document already holds every desired value.
    pub fn is_up_to_date(&self) -> bool {
        self.stale.is_empty()
    }

    /// Push the desired values into the document when anything is stale.
    /// Returns the names that changed.
    pub fn apply<D: LiveDocument + ?Sized>(&self, doc: &mut D) -> Result<Vec<String>> {
        if self.is_up_to_date() {
            return Ok(Vec::new());
        }
        doc.apply_values(&self.desired)
    }
}

/// Reconcile one document against the tracked variables.
///
/// Nothing is written: the result says what is stale and which usage
/// records to persist, and [`Reconciliation::apply`] performs the update
/// when the caller decides to.
pub fn reconcile_document<D: LiveDocument + ?Sized>(
    doc: &mut D,
    variables: &[Variable],
    usage: &UnitUsage,
    document_id: &str,
) -> Result<Reconciliation> {
    let snapshot = doc.snapshot()?;
    let names = snapshot.all_names();

    let all_desired = desired_values_for_document(variables, usage, document_id);
    let desired: BTreeMap<String, String> = all_desired
        .into_iter()
        .filter(|(name, _)| names.contains(&name.as_str()))
        .collect();

    let stale = compute_staleness(&snapshot.doc_var_values, &desired);
    let usage_records = usage_records_for_scan(names.iter().copied(), variables, usage, document_id);
    let untracked = names
        .iter()
        .filter(|n| !desired.contains_key(**n))
        .map(|n| n.to_string())
        .collect();

    log::debug!(
        "reconciled {}: {} stale, {} untracked",
        document_id,
        stale.len(),
        names.len() - desired.len()
    );

    Ok(Reconciliation {
        document: document_id.to_string(),
        desired,
        stale,
        usage: usage_records,
        untracked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory stand-in for a document open in Word.
    #[derive(Default)]
    struct FakeDocument {
        snapshot: DocumentVariableSnapshot,
        applied: Vec<BTreeMap<String, String>>,
    }

    impl LiveDocument for FakeDocument {
        fn snapshot(&mut self) -> Result<DocumentVariableSnapshot> {
            Ok(self.snapshot.clone())
        }

        fn apply_values(&mut self, values: &BTreeMap<String, String>) -> Result<Vec<String>> {
            self.applied.push(values.clone());
            let mut changed = Vec::new();
            for (name, value) in values {
                let old = self.snapshot.doc_var_values.insert(name.clone(), value.clone());
                if old.as_ref() != Some(value) {
                    changed.push(name.clone());
                }
            }
            Ok(changed)
        }
    }

    fn fake() -> FakeDocument {
        let mut doc = FakeDocument::default();
        doc.snapshot.doc_var_values.insert("Width".into(), "10 cm".into());
        doc.snapshot.doc_var_values.insert("Depth".into(), "4".into());
        doc.snapshot.doc_var_values.insert("Legacy".into(), "?".into());
        doc.snapshot.push_field_name("Width");
        doc.snapshot.push_field_name("Depth");
        doc
    }

    fn variables() -> Vec<Variable> {
        vec![
            Variable::new(1, "Width", "12").with_unit("cm"),
            Variable::new(2, "Depth", "4").with_unit("cm"),
            Variable::new(3, "Height", "9"),
        ]
    }

    #[test]
    fn test_reconcile_honors_unit_flags() {
        let mut usage = UnitUsage::new();
        usage.set("doc-1", "Width", true);

        let mut doc = fake();
        let rec = reconcile_document(&mut doc, &variables(), &usage, "doc-1").unwrap();

        assert_eq!(rec.stale.len(), 1);
        assert_eq!(rec.stale["Width"], ValueChange::new("10 cm", "12 cm"));
        assert_eq!(rec.untracked, vec!["Legacy"]);
        assert!(!rec.desired.contains_key("Height"));
        assert!(rec.usage.iter().any(|u| u.variable == "Width" && u.with_unit));
        assert!(rec.usage.iter().any(|u| u.variable == "Depth" && !u.with_unit));
        assert!(doc.applied.is_empty());

        let changed = rec.apply(&mut doc).unwrap();
        assert_eq!(changed, vec!["Width"]);

        let again = reconcile_document(&mut doc, &variables(), &usage, "doc-1").unwrap();
        assert!(again.is_up_to_date());
        assert!(again.apply(&mut doc).unwrap().is_empty());
        assert_eq!(doc.applied.len(), 1);
    }

    #[test]
    fn test_reconcile_through_trait_object() {
        let mut doc = fake();
        let dyn_doc: &mut dyn LiveDocument = &mut doc;
        let rec = reconcile_document(dyn_doc, &variables(), &UnitUsage::new(), "doc-2").unwrap();
        assert_eq!(rec.stale["Width"], ValueChange::new("10 cm", "12"));
    }
}
