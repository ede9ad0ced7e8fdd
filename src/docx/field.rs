//! DOCVARIABLE instruction parsing and field tracking.

use crate::error::{Error, Result};
use quick_xml::events::BytesStart;

const KEYWORD: &str = "DOCVARIABLE";

/// Extract the variable name from a field instruction.
///
/// The name is the first whitespace-delimited token after the
/// `DOCVARIABLE` keyword, with surrounding quotes stripped. Switches after
/// the name (`\* MERGEFORMAT`) are ignored. The keyword is matched
/// case-insensitively, as Word does.
///
/// ```
/// use varsync::docx::parse_docvariable_instruction;
///
/// assert_eq!(
///     parse_docvariable_instruction(r#" DOCVARIABLE "Width" \* MERGEFORMAT "#),
///     Some("Width".to_string())
/// );
/// assert_eq!(parse_docvariable_instruction(" PAGE "), None);
/// ```
pub fn parse_docvariable_instruction(instr: &str) -> Option<String> {
    // ASCII uppercasing keeps byte offsets aligned with `instr`
    let upper = instr.to_ascii_uppercase();
    let mut from = 0;

    while let Some(pos) = upper[from..].find(KEYWORD) {
        let after = from + pos + KEYWORD.len();
        let rest = &instr[after..];
        from = after;

        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(token) = rest.split_whitespace().next() else {
            continue;
        };
        let name = token.trim_matches(|c| matches!(c, '"' | '\u{201C}' | '\u{201D}'));
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComplexState {
    Idle,
    InField,
    AfterSeparate,
}

/// Tracks which DOCVARIABLE field, if any, the current position of an
/// element stream belongs to.
///
/// Feed it every start/empty element through [`open`](Self::open), every
/// end element through [`close`](Self::close), and text through
/// [`text`](Self::text) while [`collecting_instruction`](Self::collecting_instruction)
/// is true. Only `fldSimple`, `fldChar` and `instrText` are examined.
#[derive(Debug)]
pub(crate) struct FieldTracker {
    state: ComplexState,
    instruction: String,
    complex_name: Option<String>,
    complex_reported: bool,
    in_instr_text: bool,
    /// `Some` while inside a `fldSimple`; inner value is its DOCVARIABLE name
    simple: Option<Option<String>>,
}

impl FieldTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: ComplexState::Idle,
            instruction: String::new(),
            complex_name: None,
            complex_reported: false,
            in_instr_text: false,
            simple: None,
        }
    }

    /// Handle a start (`self_closing == false`) or empty element. Returns the
    /// variable name when this element completes the recognition of a
    /// DOCVARIABLE field.
    pub(crate) fn open(&mut self, e: &BytesStart<'_>, self_closing: bool) -> Result<Option<String>> {
        match e.local_name().as_ref() {
            b"fldSimple" => {
                let instr = attribute(e, b"instr")?.unwrap_or_default();
                let name = parse_docvariable_instruction(&instr);
                if !self_closing {
                    self.simple = Some(name.clone());
                }
                Ok(name)
            }
            b"fldChar" => {
                let kind = attribute(e, b"fldCharType")?.unwrap_or_default();
                Ok(self.field_char(&kind))
            }
            b"instrText" if !self_closing && self.state == ComplexState::InField => {
                self.in_instr_text = true;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Handle an end element by local name.
    pub(crate) fn close(&mut self, local_name: &[u8]) {
        match local_name {
            b"fldSimple" => self.simple = None,
            b"instrText" if self.in_instr_text => {
                self.in_instr_text = false;
                if let Some(name) = parse_docvariable_instruction(&self.instruction) {
                    self.complex_name = Some(name);
                }
            }
            _ => {}
        }
    }

    /// Whether text events currently belong to an instruction.
    pub(crate) fn collecting_instruction(&self) -> bool {
        self.in_instr_text
    }

    /// Append instruction text.
    pub(crate) fn text(&mut self, text: &str) {
        if self.in_instr_text {
            self.instruction.push_str(text);
        }
    }

    /// Name of the variable whose display text encloses the current
    /// position, if any.
    pub(crate) fn display_target(&self) -> Option<&str> {
        if let Some(simple) = &self.simple {
            return simple.as_deref();
        }
        match self.state {
            ComplexState::AfterSeparate => self.complex_name.as_deref(),
            _ => None,
        }
    }

    fn field_char(&mut self, kind: &str) -> Option<String> {
        match (self.state, kind) {
            (_, "begin") => {
                self.state = ComplexState::InField;
                self.instruction.clear();
                self.complex_name = None;
                self.complex_reported = false;
                self.in_instr_text = false;
                None
            }
            (ComplexState::InField, "separate") => {
                self.state = ComplexState::AfterSeparate;
                self.report_complex()
            }
            (_, "end") => {
                // a field without a result section is still a reference
                let found = if self.state == ComplexState::InField {
                    self.report_complex()
                } else {
                    None
                };
                self.state = ComplexState::Idle;
                self.complex_name = None;
                self.in_instr_text = false;
                found
            }
            _ => None,
        }
    }

    fn report_complex(&mut self) -> Option<String> {
        if self.complex_reported {
            return None;
        }
        self.complex_reported = true;
        self.complex_name.clone()
    }
}

/// Unescaped value of the attribute with the given local name.
pub(crate) fn attribute(e: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local_name {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::XmlParse(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
