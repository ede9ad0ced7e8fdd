//! Format detection for Office Open XML packages.

use crate::container::OoxmlContainer;
use crate::error::{Error, Result};
use std::path::Path;

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Content type for the DOCX main document part.
const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

/// Content type for the macro-enabled DOCM main document part.
const DOCM_CONTENT_TYPE: &str = "application/vnd.ms-word.document.macroEnabled.main+xml";

/// Content type for the XLSX workbook part.
const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

/// Content type for the macro-enabled XLSM workbook part.
const XLSM_CONTENT_TYPE: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";

/// Detected package format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Word document (.docx, .docm)
    Docx,
    /// Excel workbook (.xlsx)
    Xlsx,
    /// Macro-enabled Excel workbook (.xlsm)
    Xlsm,
}

impl FormatType {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FormatType::Docx => "docx",
            FormatType::Xlsx => "xlsx",
            FormatType::Xlsm => "xlsm",
        }
    }

    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            FormatType::Docx => "Word Document",
            FormatType::Xlsx => "Excel Workbook",
            FormatType::Xlsm => "Excel Macro-Enabled Workbook",
        }
    }

    /// Whether this is one of the spreadsheet formats.
    pub fn is_workbook(&self) -> bool {
        matches!(self, FormatType::Xlsx | FormatType::Xlsm)
    }

    /// Guess the format from a file extension (case-insensitive).
    pub fn from_extension(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(FormatType::Docx),
            "xlsx" => Some(FormatType::Xlsx),
            "xlsm" => Some(FormatType::Xlsm),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the format of a package on disk.
///
/// # Example
///
/// ```no_run
/// use varsync::detect::{detect_format_from_path, FormatType};
///
/// let format = detect_format_from_path("report.docx")?;
/// assert_eq!(format, FormatType::Docx);
/// # Ok::<(), varsync::Error>(())
/// ```
pub fn detect_format_from_path(path: impl AsRef<Path>) -> Result<FormatType> {
    let container = OoxmlContainer::open(path)?;
    detect_format(&container)
}

/// Detect the format of a package from its bytes.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<FormatType> {
    if !is_zip_file(data) {
        return Err(Error::InvalidFormat("not a zip package".to_string()));
    }
    let container = OoxmlContainer::from_bytes(data.to_vec())?;
    detect_format(&container)
}

/// Detect the format of an opened package from `[Content_Types].xml`,
/// falling back to its folder layout.
pub fn detect_format(container: &OoxmlContainer) -> Result<FormatType> {
    let content_types = container
        .read_xml("[Content_Types].xml")
        .map_err(|_| Error::InvalidFormat("missing [Content_Types].xml".to_string()))?;

    if content_types.contains(DOCX_CONTENT_TYPE) || content_types.contains(DOCM_CONTENT_TYPE) {
        Ok(FormatType::Docx)
    } else if content_types.contains(XLSM_CONTENT_TYPE) {
        Ok(FormatType::Xlsm)
    } else if content_types.contains(XLSX_CONTENT_TYPE) {
        Ok(FormatType::Xlsx)
    } else {
        detect_by_folder_structure(container)
    }
}

fn detect_by_folder_structure(container: &OoxmlContainer) -> Result<FormatType> {
    let names = container.list_files();

    let has_word = names.iter().any(|n| n.starts_with("word/"));
    let has_xl = names.iter().any(|n| n.starts_with("xl/"));

    match (has_word, has_xl) {
        (true, false) => Ok(FormatType::Docx),
        (false, true) => Ok(FormatType::Xlsx),
        _ => Err(Error::InvalidFormat(
            "package is neither a Word document nor an Excel workbook".to_string(),
        )),
    }
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZIP_MAGIC
}
