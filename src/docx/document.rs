//! Offline working copy of a Word document.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::patch::{patch_definitions, patch_display_fields};
use super::scan::{scan_definitions, scan_display_fields};
use crate::container::OoxmlContainer;
use crate::detect::{detect_format, FormatType};
use crate::error::{Error, Result};
use crate::model::DocumentVariableSnapshot;
use crate::options::UpdateOptions;

/// Part holding the `w:docVar` definitions.
pub const SETTINGS_PART: &str = "word/settings.xml";

/// Part holding the document body and its fields.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// What [`DocxDocument::apply_variable_updates`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSummary {
    /// Variables whose stored definition changed
    pub definitions: BTreeSet<String>,

    /// Variables whose displayed text changed
    pub displays: BTreeSet<String>,
}

impl PatchSummary {
    /// Whether any part was rewritten.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.displays.is_empty()
    }

    /// Union of changed definitions and displays.
    pub fn changed_names(&self) -> Vec<String> {
        self.definitions.union(&self.displays).cloned().collect()
    }
}

/// Outcome of [`update_docx_variables`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Document that was updated
    pub path: PathBuf,

    /// Backup written before the update, if one was requested
    pub backup: Option<PathBuf>,

    /// Variables whose definition or display changed
    pub updated: Vec<String>,

    /// Whether the document was rewritten on disk
    pub written: bool,
}

/// A Word document opened for reading and patching variables.
#[derive(Debug)]
pub struct DocxDocument {
    container: OoxmlContainer,
}

impl DocxDocument {
    /// Open a document from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let container = OoxmlContainer::open(path)?;
        Self::from_container(container)
    }

    /// Open a document from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let container = OoxmlContainer::from_bytes(data)?;
        Self::from_container(container)
    }

    fn from_container(container: OoxmlContainer) -> Result<Self> {
        if detect_format(&container)? != FormatType::Docx {
            return Err(Error::InvalidFormat("not a Word document".to_string()));
        }
        if !container.exists(DOCUMENT_PART) {
            return Err(Error::InvalidFormat(format!("missing {}", DOCUMENT_PART)));
        }
        Ok(Self { container })
    }

    /// Stored variable definitions. A document without a settings part has
    /// none.
    pub fn read_defined_variables(&self) -> Result<BTreeMap<String, String>> {
        match self.container.read_part(SETTINGS_PART)? {
            Some(bytes) => {
                let xml = crate::container::decode_xml_bytes(&bytes)?;
                scan_definitions(&xml)
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// Names referenced by DOCVARIABLE fields in the body.
    pub fn read_displayed_variable_names(&self) -> Result<Vec<String>> {
        let xml = self.container.read_xml(DOCUMENT_PART)?;
        scan_display_fields(&xml)
    }

    /// Both scans at once.
    pub fn snapshot(&self) -> Result<DocumentVariableSnapshot> {
        Ok(DocumentVariableSnapshot {
            doc_var_values: self.read_defined_variables()?,
            display_field_names: self.read_displayed_variable_names()?,
        })
    }

    /// Run the definition and display passes and stage every part that
    /// changed. Parts that need no change are left as they are, so an empty
    /// or already-applied update leaves the package untouched.
    pub fn apply_variable_updates(
        &mut self,
        updates: &BTreeMap<String, String>,
    ) -> Result<PatchSummary> {
        let mut summary = PatchSummary::default();
        if updates.is_empty() {
            return Ok(summary);
        }

        if let Some(bytes) = self.container.read_part(SETTINGS_PART)? {
            let xml = crate::container::decode_xml_bytes(&bytes)?;
            let patch = patch_definitions(&xml, updates)?;
            if let Some(new_xml) = patch.xml {
                log::debug!("{}: rewriting {} definition(s)", SETTINGS_PART, patch.changed.len());
                self.container.write_part(SETTINGS_PART, new_xml.into_bytes());
                summary.definitions = patch.changed;
            } else {
                log::debug!("{}: unchanged", SETTINGS_PART);
            }
        }

        let xml = self.container.read_xml(DOCUMENT_PART)?;
        let patch = patch_display_fields(&xml, updates)?;
        if let Some(new_xml) = patch.xml {
            log::debug!("{}: rewriting {} display field(s)", DOCUMENT_PART, patch.changed.len());
            self.container.write_part(DOCUMENT_PART, new_xml.into_bytes());
            summary.displays = patch.changed;
        } else {
            log::debug!("{}: unchanged", DOCUMENT_PART);
        }

        Ok(summary)
    }

    /// Whether any part has been staged.
    pub fn is_modified(&self) -> bool {
        self.container.is_modified()
    }

    /// Write the working copy over `path` atomically.
    pub fn commit(&self, path: impl AsRef<Path>) -> Result<()> {
        self.container.commit(path)
    }

    /// The underlying package.
    pub fn container(&self) -> &OoxmlContainer {
        &self.container
    }
}

/// Sibling backup path: `report.docx` becomes `report.docx.bak`.
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn has_docx_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
}

/// Update variables in a closed document on disk.
///
/// When a backup is requested it is copied before the document is even
/// opened, so it exists whatever happens afterwards. The document is only
/// rewritten when at least one part changed, and the rewrite replaces the
/// file atomically: on any failure the original is left untouched.
///
/// # Example
///
/// ```no_run
/// use std::collections::BTreeMap;
/// use varsync::docx::update_docx_variables;
/// use varsync::UpdateOptions;
///
/// let mut updates = BTreeMap::new();
/// updates.insert("Width".to_string(), "12 cm".to_string());
/// let report = update_docx_variables("report.docx", &updates, &UpdateOptions::default())?;
/// println!("updated: {:?}", report.updated);
/// # Ok::<(), varsync::Error>(())
/// ```
pub fn update_docx_variables(
    path: impl AsRef<Path>,
    updates: &BTreeMap<String, String>,
    options: &UpdateOptions,
) -> Result<UpdateReport> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    if options.require_docx_extension && !has_docx_extension(path) {
        return Err(Error::ValidationFailed(format!(
            "not a .docx file: {}",
            path.display()
        )));
    }

    let backup = if options.backup {
        let target = backup_path(path, &options.backup_suffix);
        fs::copy(path, &target)?;
        log::debug!("backup written to {}", target.display());
        Some(target)
    } else {
        None
    };

    let mut doc = DocxDocument::open(path)?;
    let summary = doc.apply_variable_updates(updates)?;
    let written = doc.is_modified();
    if written {
        doc.commit(path)?;
    }

    Ok(UpdateReport {
        path: path.to_path_buf(),
        backup,
        updated: summary.changed_names(),
        written,
    })
}

/// Read the stored variable definitions of a document on disk.
pub fn read_docx_variables(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    DocxDocument::open(path)?.read_defined_variables()
}

/// Read the names referenced by DOCVARIABLE fields of a document on disk.
pub fn read_docx_field_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    DocxDocument::open(path)?.read_displayed_variable_names()
}

/// Read both definitions and displayed names of a document on disk.
pub fn read_docx_snapshot(path: impl AsRef<Path>) -> Result<DocumentVariableSnapshot> {
    DocxDocument::open(path)?.snapshot()
}
