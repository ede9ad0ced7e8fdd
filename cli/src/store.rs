//! JSON workspace: the variable store the CLI reconciles against.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use varsync::sync::{resolve_document_path, ImportPlan, ProposedChange};
use varsync::{SavedRange, TrackedDocument, UnitUsage, UsageRecord, Variable};

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Variables, tracked documents, unit flags and saved ranges.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub variables: Vec<Variable>,

    #[serde(default)]
    pub documents: Vec<TrackedDocument>,

    #[serde(default)]
    pub usage: UnitUsage,

    #[serde(default)]
    pub ranges: Vec<SavedRange>,
}

impl Workspace {
    /// Load a workspace. A missing file is an empty workspace.
    pub fn load(path: &Path) -> BoxResult<Self> {
        if !path.exists() {
            log::debug!("{} does not exist, starting empty", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let workspace = serde_json::from_str(&text)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(workspace)
    }

    /// Write the workspace through a sibling temp file.
    pub fn save(&self, path: &Path) -> BoxResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn next_variable_id(&self) -> i64 {
        self.variables.iter().map(|v| v.id).max().unwrap_or(0) + 1
    }

    /// Copy accepted Excel values onto their variables.
    pub fn apply_changes(&mut self, changes: &[ProposedChange]) -> usize {
        let mut applied = 0;
        for change in changes {
            if let Some(var) = self.variables.iter_mut().find(|v| v.id == change.variable_id) {
                var.value = change.new.clone();
                applied += 1;
            }
        }
        applied
    }

    /// Apply a range import: replace value and unit of existing variables,
    /// add the rest.
    pub fn apply_import(&mut self, plan: &ImportPlan) -> usize {
        let mut applied = 0;
        for update in &plan.updates {
            if let Some(var) = self.variables.iter_mut().find(|v| v.id == update.variable_id) {
                var.value = update.row.value.clone();
                var.unit = non_empty(&update.row.unit);
                applied += 1;
            }
        }
        for row in &plan.additions {
            let mut var = Variable::new(self.next_variable_id(), row.name.clone(), row.value.clone());
            var.unit = non_empty(&row.unit);
            self.variables.push(var);
            applied += 1;
        }
        applied
    }

    /// The tracked document at `path`, registering it under a fresh
    /// identity when it is not tracked yet.
    pub fn track_document(&mut self, path: &Path) -> TrackedDocument {
        let existing = self
            .documents
            .iter()
            .find(|d| resolve_document_path(&d.path).as_deref() == Some(path));
        if let Some(doc) = existing {
            return doc.clone();
        }

        let doc = TrackedDocument {
            id: self.documents.iter().map(|d| d.id).max().unwrap_or(0) + 1,
            guid: uuid::Uuid::new_v4().to_string(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_string_lossy().into_owned(),
        };
        log::info!("tracking {} as {}", doc.path, doc.guid);
        self.documents.push(doc.clone());
        doc
    }

    /// Persist usage records from a scan.
    pub fn record_usage(&mut self, records: Vec<UsageRecord>) {
        self.usage.extend(records);
    }

    /// Remember a range for later refreshes, replacing one of the same name.
    pub fn save_range(&mut self, name: &str, file: &Path, sheet: &str, start_cell: &str) {
        let id = match self.ranges.iter().position(|r| r.name == name) {
            Some(pos) => self.ranges.remove(pos).id,
            None => self.ranges.iter().map(|r| r.id).max().unwrap_or(0) + 1,
        };
        self.ranges.push(SavedRange {
            id,
            name: name.to_string(),
            file_path: file.to_string_lossy().into_owned(),
            sheet_name: sheet.to_string(),
            start_cell: start_cell.to_string(),
            excel_file_id: None,
            last_synced: None,
        });
    }

    /// Stamp every saved range as refreshed at `when`.
    pub fn mark_ranges_synced(&mut self, when: &str) {
        for range in &mut self.ranges {
            range.last_synced = Some(when.to_string());
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
