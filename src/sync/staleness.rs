//! Desired values and staleness.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{UnitUsage, UsageRecord, Variable};

/// A value a target holds and the value it should hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: String,
    pub new: String,
}

impl ValueChange {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Compare what a document holds with what it should hold.
///
/// Only names the document already holds are considered, and only when a
/// desired value exists for them. Nothing is ever proposed for deletion.
///
/// ```
/// use std::collections::BTreeMap;
/// use varsync::sync::compute_staleness;
///
/// let current: BTreeMap<_, _> = [("A", "1"), ("B", "2")]
///     .into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
/// let desired: BTreeMap<_, _> = [("A", "1"), ("B", "3"), ("C", "9")]
///     .into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
///
/// let stale = compute_staleness(&current, &desired);
/// assert_eq!(stale.len(), 1);
/// assert_eq!(stale["B"].old, "2");
/// assert_eq!(stale["B"].new, "3");
/// ```
pub fn compute_staleness(
    current: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> BTreeMap<String, ValueChange> {
    current
        .iter()
        .filter_map(|(name, old)| {
            let new = desired.get(name)?;
            (old != new).then(|| (name.clone(), ValueChange::new(old.clone(), new.clone())))
        })
        .collect()
}

/// The text a document should show for `variable`: the value, followed by
/// a space and the unit when the document displays it with its unit.
pub fn resolve_desired_value(variable: &Variable, with_unit: bool) -> String {
    match variable.unit() {
        Some(unit) if with_unit => format!("{} {}", variable.value, unit),
        _ => variable.value.clone(),
    }
}

/// Desired values of every variable for one document, honoring that
/// document's with-unit flags.
pub fn desired_values_for_document(
    variables: &[Variable],
    usage: &UnitUsage,
    document: &str,
) -> BTreeMap<String, String> {
    variables
        .iter()
        .map(|v| {
            let with_unit = usage.with_unit(document, &v.name);
            (v.name.clone(), resolve_desired_value(v, with_unit))
        })
        .collect()
}

/// Usage records for the tracked variables a scan found in a document.
///
/// A flag recorded earlier for the same (document, variable) pair is kept;
/// pairs seen for the first time start without unit. Names that are not
/// tracked variables produce no record.
pub fn usage_records_for_scan<'a>(
    found: impl IntoIterator<Item = &'a str>,
    variables: &[Variable],
    usage: &UnitUsage,
    document: &str,
) -> Vec<UsageRecord> {
    let mut records: Vec<UsageRecord> = Vec::new();
    for name in found {
        if !variables.iter().any(|v| v.name == name) {
            continue;
        }
        if records.iter().any(|r| r.variable == name) {
            continue;
        }
        records.push(UsageRecord {
            document: document.to_string(),
            variable: name.to_string(),
            with_unit: usage.get(document, name).unwrap_or(false),
        });
    }
    records
}
