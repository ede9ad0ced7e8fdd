//! Spreadsheet cell values and range rows.

use serde::{Deserialize, Serialize};

/// A typed worksheet cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    /// No value
    #[default]
    Empty,
    /// Numeric value (dates included, as serial numbers)
    Number(f64),
    /// Text
    Text(String),
    /// Boolean
    Bool(bool),
    /// Error literal such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    /// Whether the cell is empty or holds only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the value as text: integral numbers without a decimal point,
    /// other numbers in shortest decimal form, empty cells as `""`.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Error(e) => e.clone(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Format a number the way cell values are compared and stored: `12.0`
/// becomes `"12"`, `12.5` stays `"12.5"`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        if n == 0.0 {
            // avoid "-0"
            return "0".to_string();
        }
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// One accepted row of a name/value/unit block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularRangeRow {
    /// Normalized variable name
    pub name: String,

    /// Value, numbers normalized; empty when the value cell is empty
    pub value: String,

    /// Unit; empty when absent
    pub unit: String,

    /// 1-based worksheet row the values came from
    pub source_row: u32,
}
