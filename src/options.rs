//! Configuration for document updates and range reads.

/// Options controlling how a closed document is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Copy the original to a sibling backup before any mutation
    pub backup: bool,

    /// Suffix appended to the original path to name the backup
    pub backup_suffix: String,

    /// Reject targets whose extension is not `.docx`
    pub require_docx_extension: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            backup: true,
            backup_suffix: ".bak".to_string(),
            require_docx_extension: true,
        }
    }
}

impl UpdateOptions {
    /// Create new update options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the pre-write backup.
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Set the backup suffix. An empty suffix falls back to `.bak`, since
    /// the backup must never overwrite the original.
    pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.backup_suffix = if suffix.is_empty() {
            ".bak".to_string()
        } else {
            suffix
        };
        self
    }

    /// Enable or disable the `.docx` extension check.
    pub fn with_extension_check(mut self, check: bool) -> Self {
        self.require_docx_extension = check;
        self
    }
}

/// Options for the tabular range reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeOptions {
    /// Blank name cells tolerated before the first captured row
    pub max_leading_blank_rows: u32,

    /// Hard cap on rows scanned past the start row
    pub max_rows: u32,

    /// Trim whitespace around text values and units
    pub trim_values: bool,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            max_leading_blank_rows: 5,
            max_rows: 1000,
            trim_values: true,
        }
    }
}

impl RangeOptions {
    /// Create new range options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many blank rows may precede the data.
    pub fn with_leading_blank_rows(mut self, rows: u32) -> Self {
        self.max_leading_blank_rows = rows;
        self
    }

    /// Set the scan cap. At least one row is always read.
    pub fn with_max_rows(mut self, rows: u32) -> Self {
        self.max_rows = rows.max(1);
        self
    }

    /// Enable or disable trimming of text values.
    pub fn with_trim_values(mut self, trim: bool) -> Self {
        self.trim_values = trim;
        self
    }
}
