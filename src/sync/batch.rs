//! Update All: reconcile every tracked closed document.
//!
//! Planning reads each document and decides what it needs; applying writes
//! the documents that need it. Both steps record a per-file outcome and
//! carry on past failures, so one unreadable or locked file never stops the
//! rest of the batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::staleness::{compute_staleness, desired_values_for_document, ValueChange};
use crate::docx::{read_docx_variables, update_docx_variables};
use crate::error::{Error, ErrorKind};
use crate::model::{TrackedDocument, UnitUsage, Variable};
use crate::options::UpdateOptions;

const UNSAVED_PREFIX: &str = "unsaved:";
const MAC_VOLUME_PREFIX: &str = "Macintosh HD:";

/// Turn a stored document path into a file system path.
///
/// `unsaved:` placeholders resolve to nothing. Classic Mac paths on the
/// boot volume (`Macintosh HD:Users:me:a.docx`) become POSIX paths
/// (`/Users/me/a.docx`). Anything else is taken as is.
pub fn resolve_document_path(stored: &str) -> Option<PathBuf> {
    let stored = stored.trim();
    if stored.is_empty() || stored.starts_with(UNSAVED_PREFIX) {
        return None;
    }
    match stored.strip_prefix(MAC_VOLUME_PREFIX) {
        Some(rest) => Some(PathBuf::from(format!("/{}", rest.replace(':', "/")))),
        None => Some(PathBuf::from(stored)),
    }
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
}

/// Per-file result of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// The document was rewritten
    Updated {
        changed: Vec<String>,
        backup: Option<PathBuf>,
    },
    /// Every stored value was already current
    UpToDate,
    /// The document was not considered (unsaved, not a .docx, missing)
    Skipped { reason: String },
    /// Reading or writing the document failed
    Failed { kind: ErrorKind, message: String },
}

impl FileOutcome {
    fn failed(err: &Error) -> Self {
        FileOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome for one tracked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub document: TrackedDocument,
    pub path: Option<PathBuf>,
    pub outcome: FileOutcome,
}

/// A document that needs rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    pub document: TrackedDocument,
    pub path: PathBuf,

    /// Values to write: every tracked variable the document defines
    pub values: BTreeMap<String, String>,

    /// Definitions whose value will change
    pub changes: BTreeMap<String, ValueChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PlannedFile {
    Update(FileUpdate),
    Done(FileResult),
}

/// What Update All would do, computed without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePlan {
    entries: Vec<PlannedFile>,
}

impl UpdatePlan {
    /// Documents that need rewriting, in tracking order.
    pub fn updates(&self) -> impl Iterator<Item = &FileUpdate> {
        self.entries.iter().filter_map(|e| match e {
            PlannedFile::Update(u) => Some(u),
            PlannedFile::Done(_) => None,
        })
    }

    /// Documents already settled during planning.
    pub fn settled(&self) -> impl Iterator<Item = &FileResult> {
        self.entries.iter().filter_map(|e| match e {
            PlannedFile::Done(r) => Some(r),
            PlannedFile::Update(_) => None,
        })
    }

    /// Number of documents that need rewriting.
    pub fn pending(&self) -> usize {
        self.updates().count()
    }

    /// Total number of value changes across all documents.
    pub fn change_count(&self) -> usize {
        self.updates().map(|u| u.changes.len()).sum()
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Write every pending document, each with its own backup. A failure
    /// is recorded against its document and the batch continues.
    pub fn apply(self, options: &UpdateOptions) -> BatchReport {
        self.apply_with(options, |_| {})
    }

    /// Like [`apply`](Self::apply), calling `progress` once per pending
    /// document before it is written.
    pub fn apply_with<F>(self, options: &UpdateOptions, mut progress: F) -> BatchReport
    where
        F: FnMut(&FileUpdate),
    {
        let mut results = Vec::with_capacity(self.entries.len());

        for entry in self.entries {
            let update = match entry {
                PlannedFile::Done(result) => {
                    results.push(result);
                    continue;
                }
                PlannedFile::Update(update) => update,
            };

            progress(&update);
            let outcome = match update_docx_variables(&update.path, &update.values, options) {
                Ok(report) if report.written => FileOutcome::Updated {
                    changed: report.updated,
                    backup: report.backup,
                },
                Ok(_) => FileOutcome::UpToDate,
                Err(err) => {
                    log::warn!("update of {} failed: {}", update.path.display(), err);
                    FileOutcome::failed(&err)
                }
            };

            results.push(FileResult {
                document: update.document,
                path: Some(update.path),
                outcome,
            });
        }

        BatchReport { results }
    }
}

/// Plan Update All over the tracked documents.
///
/// Documents with an unresolvable path, a non-.docx path or no file on
/// disk are skipped. A document that cannot be read is recorded as failed.
pub fn plan_update_all(
    documents: &[TrackedDocument],
    variables: &[Variable],
    usage: &UnitUsage,
) -> UpdatePlan {
    let mut entries = Vec::with_capacity(documents.len());

    for document in documents {
        let skipped = |path: Option<PathBuf>, reason: &str| {
            PlannedFile::Done(FileResult {
                document: document.clone(),
                path,
                outcome: FileOutcome::Skipped {
                    reason: reason.to_string(),
                },
            })
        };

        let Some(path) = resolve_document_path(&document.path) else {
            entries.push(skipped(None, "unsaved document"));
            continue;
        };
        if !is_docx(&path) {
            entries.push(skipped(Some(path), "not a .docx file"));
            continue;
        }
        if !path.is_file() {
            entries.push(skipped(Some(path), "file not found"));
            continue;
        }

        let current = match read_docx_variables(&path) {
            Ok(current) => current,
            Err(err) => {
                log::warn!("cannot read {}: {}", path.display(), err);
                entries.push(PlannedFile::Done(FileResult {
                    document: document.clone(),
                    path: Some(path),
                    outcome: FileOutcome::failed(&err),
                }));
                continue;
            }
        };

        let values: BTreeMap<String, String> =
            desired_values_for_document(variables, usage, &document.guid)
                .into_iter()
                .filter(|(name, _)| current.contains_key(name))
                .collect();
        let changes = compute_staleness(&current, &values);

        if changes.is_empty() {
            entries.push(PlannedFile::Done(FileResult {
                document: document.clone(),
                path: Some(path),
                outcome: FileOutcome::UpToDate,
            }));
        } else {
            log::debug!("{}: {} change(s)", path.display(), changes.len());
            entries.push(PlannedFile::Update(FileUpdate {
                document: document.clone(),
                path,
                values,
                changes,
            }));
        }
    }

    UpdatePlan { entries }
}

/// Per-file results of Update All, in tracking order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<FileResult>,
}

impl BatchReport {
    /// Number of documents rewritten.
    pub fn updated_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, FileOutcome::Updated { .. }))
            .count()
    }

    /// Results that failed.
    pub fn failures(&self) -> impl Iterator<Item = &FileResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, FileOutcome::Failed { .. }))
    }

    /// Whether no document failed.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}
