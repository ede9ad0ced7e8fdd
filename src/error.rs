//! Error types for the varsync library.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for varsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or rewriting documents and workbooks.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A target file, sheet, cell or document is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The file is not a package of the expected kind.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Error reading ZIP archive.
    #[error("ZIP archive error: {0}")]
    ZipArchive(String),

    /// Error parsing XML content.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// A required package part is missing.
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// The repacked archive could not replace the target. The original file
    /// is left as it was.
    #[error("Write failed for {}: {reason}", path.display())]
    WriteFailed {
        /// Target path of the failed write.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Input rejected before any work was done (bad cell reference, wrong
    /// file extension, empty required field).
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Coarse classification of an [`Error`], used for per-file batch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidFormat,
    WriteFailed,
    ValidationFailed,
    Other,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            Error::InvalidFormat(_)
            | Error::ZipArchive(_)
            | Error::XmlParse(_)
            | Error::MissingComponent(_) => ErrorKind::InvalidFormat,
            Error::WriteFailed { .. } => ErrorKind::WriteFailed,
            Error::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Error::Io(_) => ErrorKind::Other,
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::WriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::ZipArchive(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlParse(err.to_string())
    }
}
