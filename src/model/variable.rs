//! Variable store records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Normalize a variable name the way it must appear in a DOCVARIABLE field:
/// trimmed, NFC-composed, spaces replaced with underscores.
pub fn normalize_variable_name(raw: &str) -> String {
    raw.trim().nfc().collect::<String>().replace(' ', "_")
}

/// A named value tracked by the variable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Store identifier
    pub id: i64,

    /// Unique, non-empty, identifier-like name
    pub name: String,

    /// Current value
    #[serde(default)]
    pub value: String,

    /// Unit appended when a document displays the value with its unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Workbook holding the linked cell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_file: Option<String>,

    /// Sheet holding the linked cell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_sheet: Option<String>,

    /// Linked cell reference (e.g. `B5`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_cell: Option<String>,

    /// Store identifier of the tracked workbook this variable came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_file_id: Option<i64>,
}

/// A complete single-cell link borrowed from a [`Variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLink<'a> {
    pub file: &'a str,
    pub sheet: &'a str,
    pub cell: &'a str,
}

impl Variable {
    /// Create a variable with a name and value.
    pub fn new(id: i64, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
            unit: None,
            description: None,
            excel_file: None,
            excel_sheet: None,
            excel_cell: None,
            excel_file_id: None,
        }
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Link the variable to a single workbook cell.
    pub fn with_cell_link(
        mut self,
        file: impl Into<String>,
        sheet: impl Into<String>,
        cell: impl Into<String>,
    ) -> Self {
        self.excel_file = Some(file.into());
        self.excel_sheet = Some(sheet.into());
        self.excel_cell = Some(cell.into());
        self
    }

    /// The unit, if set and non-empty.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref().filter(|u| !u.is_empty())
    }

    /// The cell link, if file, sheet and cell are all present.
    pub fn cell_link(&self) -> Option<CellLink<'_>> {
        let file = self.excel_file.as_deref().filter(|s| !s.is_empty())?;
        let sheet = self.excel_sheet.as_deref().filter(|s| !s.is_empty())?;
        let cell = self.excel_cell.as_deref().filter(|s| !s.is_empty())?;
        Some(CellLink { file, sheet, cell })
    }
}

/// A document the store tracks for batch updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDocument {
    /// Store identifier
    pub id: i64,

    /// Identity embedded in the document, stable across renames
    pub guid: String,

    /// Display name
    pub name: String,

    /// Last known path; may be an `unsaved:` placeholder or a Mac colon path
    pub path: String,
}

/// A saved pointer to a name/value/unit block for repeatable imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRange {
    /// Store identifier
    pub id: i64,

    /// Display name
    pub name: String,

    /// Workbook path
    pub file_path: String,

    /// Sheet name
    pub sheet_name: String,

    /// Top-left cell of the name column
    pub start_cell: String,

    /// Store identifier of the tracked workbook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excel_file_id: Option<i64>,

    /// Timestamp of the last sync, as recorded by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,
}

/// One persisted "with unit" flag for a (document, variable) usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Document identity (GUID)
    pub document: String,

    /// Variable name
    pub variable: String,

    /// Whether the document displays the value followed by its unit
    pub with_unit: bool,
}

/// Lookup table of "with unit" flags keyed by (document identity, variable
/// name). Owned by the store and handed to the core as input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UsageRecord>", into = "Vec<UsageRecord>")]
pub struct UnitUsage {
    flags: HashMap<(String, String), bool>,
}

impl UnitUsage {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded flag, or `None` when the usage was never recorded.
    pub fn get(&self, document: &str, variable: &str) -> Option<bool> {
        self.flags
            .get(&(document.to_string(), variable.to_string()))
            .copied()
    }

    /// Recorded flag, defaulting to "without unit".
    pub fn with_unit(&self, document: &str, variable: &str) -> bool {
        self.get(document, variable).unwrap_or(false)
    }

    /// Record a flag, replacing any previous one.
    pub fn set(&mut self, document: impl Into<String>, variable: impl Into<String>, with_unit: bool) {
        self.flags
            .insert((document.into(), variable.into()), with_unit);
    }

    /// Apply persisted records.
    pub fn extend(&mut self, records: impl IntoIterator<Item = UsageRecord>) {
        for record in records {
            self.set(record.document, record.variable, record.with_unit);
        }
    }

    /// Number of recorded usages.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether no usage is recorded.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl From<Vec<UsageRecord>> for UnitUsage {
    fn from(records: Vec<UsageRecord>) -> Self {
        let mut usage = UnitUsage::new();
        usage.extend(records);
        usage
    }
}

impl From<UnitUsage> for Vec<UsageRecord> {
    fn from(usage: UnitUsage) -> Self {
        let mut records: Vec<UsageRecord> = usage
            .flags
            .into_iter()
            .map(|((document, variable), with_unit)| UsageRecord {
                document,
                variable,
                with_unit,
            })
            .collect();
        records.sort_by(|a, b| (&a.document, &a.variable).cmp(&(&b.document, &b.variable)));
        records
    }
}
