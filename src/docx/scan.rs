//! Read-only scans of the definitions and body parts.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::field::{attribute, FieldTracker};
use crate::error::{Error, Result};

/// Parse `w:docVar` definitions from a settings part into name → value.
///
/// A definition without a value attribute reads as the empty string.
pub fn scan_definitions(xml: &str) -> Result<BTreeMap<String, String>> {
    let mut variables = BTreeMap::new();
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"docVar" => {
                if let Some(name) = attribute(&e, b"name")? {
                    if !name.is_empty() {
                        let value = attribute(&e, b"val")?.unwrap_or_default();
                        variables.insert(name, value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(variables)
}

/// Collect the names referenced by DOCVARIABLE display fields in a body
/// part, simple and complex alike, in first-seen order without duplicates.
pub fn scan_display_fields(xml: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    let mut tracker = FieldTracker::new();
    let mut reader = Reader::from_str(xml);

    loop {
        let found = match reader.read_event() {
            Ok(Event::Start(e)) => tracker.open(&e, false)?,
            Ok(Event::Empty(e)) => tracker.open(&e, true)?,
            Ok(Event::End(e)) => {
                tracker.close(e.local_name().as_ref());
                None
            }
            Ok(Event::Text(t)) => {
                if tracker.collecting_instruction() {
                    let text = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                    tracker.text(&text);
                }
                None
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::XmlParse(e.to_string())),
            _ => None,
        };

        if let Some(name) = found {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:zoom w:percent="100"/>
  <w:docVars>
    <w:docVar w:name="Width" w:val="10 cm"/>
    <w:docVar w:name="Label" w:val="A &amp; B"/>
    <w:docVar w:name="Blank"/>
  </w:docVars>
</w:settings>"#;

    #[test]
    fn test_scan_definitions() {
        let vars = scan_definitions(SETTINGS).unwrap();
        assert_eq!(vars.len(), 3);
        assert_eq!(vars["Width"], "10 cm");
        assert_eq!(vars["Label"], "A & B");
        assert_eq!(vars["Blank"], "");
    }

    #[test]
    fn test_scan_definitions_none() {
        let xml = r#"<w:settings xmlns:w="x"><w:zoom w:percent="90"/></w:settings>"#;
        assert!(scan_definitions(xml).unwrap().is_empty());
    }

    #[test]
    fn test_scan_display_fields_mixed() {
        let xml = r#"<w:document xmlns:w="x"><w:body>
<w:p><w:fldSimple w:instr=" DOCVARIABLE Width \* MERGEFORMAT "><w:r><w:t>10</w:t></w:r></w:fldSimple></w:p>
<w:p>
  <w:r><w:fldChar w:fldCharType="begin"/></w:r>
  <w:r><w:instrText xml:space="preserve"> DOCVARIABLE "Depth" </w:instrText></w:r>
  <w:r><w:fldChar w:fldCharType="separate"/></w:r>
  <w:r><w:t>4</w:t></w:r>
  <w:r><w:fldChar w:fldCharType="end"/></w:r>
</w:p>
<w:p><w:fldSimple w:instr=" PAGE "><w:r><w:t>1</w:t></w:r></w:fldSimple></w:p>
<w:p><w:fldSimple w:instr="DOCVARIABLE Width"/></w:p>
</w:body></w:document>"#;

        let names = scan_display_fields(xml).unwrap();
        assert_eq!(names, vec!["Width", "Depth"]);
    }

    #[test]
    fn test_scan_display_fields_malformed() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p></w:body></w:document>"#;
        assert!(matches!(scan_display_fields(xml), Err(Error::XmlParse(_))));
    }
}
