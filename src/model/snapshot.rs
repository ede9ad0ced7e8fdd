//! What a document currently holds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variable state of one document: its stored definitions and the names
/// its display fields reference.
///
/// Produced by the offline read scanner or by a live automation
/// collaborator; reconciliation does not care which.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVariableSnapshot {
    /// Stored variable definitions, name to value
    pub doc_var_values: BTreeMap<String, String>,

    /// Names referenced by DOCVARIABLE fields, first-seen order, no duplicates
    pub display_field_names: Vec<String>,
}

impl DocumentVariableSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a displayed name unless it was already seen.
    pub fn push_field_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.display_field_names.contains(&name) {
            self.display_field_names.push(name);
        }
    }

    /// Whether a display field references `name`.
    pub fn displays(&self, name: &str) -> bool {
        self.display_field_names.iter().any(|n| n == name)
    }

    /// Names that are either defined or displayed, sorted.
    pub fn all_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.doc_var_values.keys().map(String::as_str).collect();
        for name in &self.display_field_names {
            if !self.doc_var_values.contains_key(name) {
                names.push(name);
            }
        }
        names.sort_unstable();
        names
    }
}
