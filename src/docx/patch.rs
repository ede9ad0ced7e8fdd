//! Rewriting variable definitions and DOCVARIABLE display text.
//!
//! Both passes stream the part through a quick-xml reader/writer pair and
//! pass every event through untouched except the handful they own: the
//! `w:docVar` entries of the settings part, and the `w:t` runs that sit
//! inside a DOCVARIABLE field's result in the body part.

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::field::{attribute, FieldTracker};
use crate::error::{Error, Result};

/// Result of patching one part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartPatch {
    /// Rewritten XML, or `None` when nothing had to change
    pub xml: Option<String>,

    /// Variables whose stored or displayed value actually changed
    pub changed: BTreeSet<String>,
}

impl PartPatch {
    fn finish(writer: Writer<Vec<u8>>, changed: BTreeSet<String>) -> Result<Self> {
        if changed.is_empty() {
            return Ok(Self::default());
        }
        let xml = String::from_utf8(writer.into_inner())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        Ok(Self {
            xml: Some(xml),
            changed,
        })
    }
}

/// Definition pass: replace the value of every `w:docVar` whose name is a
/// key of `updates`. Definitions are never created or removed.
pub fn patch_definitions(xml: &str, updates: &BTreeMap<String, String>) -> Result<PartPatch> {
    if updates.is_empty() {
        return Ok(PartPatch::default());
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 128));
    let mut changed = BTreeSet::new();

    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.local_name().as_ref() == b"docVar" => {
                match rewrite_doc_var(&e, updates)? {
                    Some((name, patched)) => {
                        changed.insert(name);
                        writer.write_event(Event::Empty(patched))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"docVar" => {
                match rewrite_doc_var(&e, updates)? {
                    Some((name, patched)) => {
                        changed.insert(name);
                        writer.write_event(Event::Start(patched))?;
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    PartPatch::finish(writer, changed)
}

/// Rebuild a `w:docVar` element with a new value attribute, or `None` when
/// it is not targeted or already holds the value.
fn rewrite_doc_var(
    e: &BytesStart<'_>,
    updates: &BTreeMap<String, String>,
) -> Result<Option<(String, BytesStart<'static>)>> {
    let Some(name) = attribute(e, b"name")? else {
        return Ok(None);
    };
    let Some(new_value) = updates.get(&name) else {
        return Ok(None);
    };
    if attribute(e, b"val")?.as_deref() == Some(new_value.as_str()) {
        return Ok(None);
    }

    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut patched = BytesStart::new(tag);
    let mut replaced = false;

    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"val" {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            patched.push_attribute((key.as_str(), new_value.as_str()));
            replaced = true;
        } else {
            patched.push_attribute(attr);
        }
    }

    if !replaced {
        let key = match e.name().prefix() {
            Some(prefix) => format!("{}:val", String::from_utf8_lossy(prefix.as_ref())),
            None => "val".to_string(),
        };
        patched.push_attribute((key.as_str(), new_value.as_str()));
    }

    Ok(Some((name, patched)))
}

/// A display run being buffered until its end tag, so it can be written
/// back verbatim when it already shows the target value.
struct PendingRun {
    name: String,
    target: String,
    start: BytesStart<'static>,
    events: Vec<Event<'static>>,
    text: String,
}

impl PendingRun {
    /// Write the run out; returns whether its text changed.
    fn flush(self, writer: &mut Writer<Vec<u8>>, end: BytesEnd<'_>) -> Result<bool> {
        if self.text == self.target {
            writer.write_event(Event::Start(self.start))?;
            for event in self.events {
                writer.write_event(event)?;
            }
            writer.write_event(Event::End(end))?;
            return Ok(false);
        }

        writer.write_event(Event::Start(preserve_space(self.start, &self.target)))?;
        if !self.target.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&self.target)))?;
        }
        writer.write_event(Event::End(end))?;
        Ok(true)
    }
}

/// Add `xml:space="preserve"` when the new text has edge whitespace Word
/// would otherwise drop.
fn preserve_space(start: BytesStart<'static>, text: &str) -> BytesStart<'static> {
    let needs = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    let has = start
        .attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"xml:space");
    if needs && !has {
        let mut start = start;
        start.push_attribute(("xml:space", "preserve"));
        start
    } else {
        start
    }
}

/// Display pass: overwrite the text runs of every simple or complex
/// DOCVARIABLE field whose variable is a key of `updates`.
///
/// Every run of a matching field receives the full new value. Elements
/// other than field markers, instruction text and text runs are passed
/// through without inspection.
pub fn patch_display_fields(xml: &str, updates: &BTreeMap<String, String>) -> Result<PartPatch> {
    if updates.is_empty() {
        return Ok(PartPatch::default());
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut tracker = FieldTracker::new();
    let mut pending: Option<PendingRun> = None;
    let mut changed = BTreeSet::new();

    loop {
        let event = reader.read_event()?;

        if let Some(mut run) = pending.take() {
            match event {
                Event::End(end) if end.local_name().as_ref() == b"t" => {
                    let name = run.name.clone();
                    if run.flush(&mut writer, end)? {
                        changed.insert(name);
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                    run.text.push_str(&text);
                    run.events.push(Event::Text(t.into_owned()));
                    pending = Some(run);
                }
                Event::CData(c) => {
                    run.text.push_str(&String::from_utf8_lossy(&c));
                    run.events.push(Event::CData(c.into_owned()));
                    pending = Some(run);
                }
                Event::Eof => {
                    return Err(Error::XmlParse("unterminated text run".to_string()));
                }
                other => {
                    run.events.push(other.into_owned());
                    pending = Some(run);
                }
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"t" {
                    if let Some((name, target)) = display_update(&tracker, updates) {
                        pending = Some(PendingRun {
                            name,
                            target,
                            start: e.into_owned(),
                            events: Vec::new(),
                            text: String::new(),
                        });
                        continue;
                    }
                }
                tracker.open(&e, false)?;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"t" {
                    if let Some((name, target)) = display_update(&tracker, updates) {
                        if target.is_empty() {
                            writer.write_event(Event::Empty(e))?;
                        } else {
                            let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                            writer.write_event(Event::Start(preserve_space(e.into_owned(), &target)))?;
                            writer.write_event(Event::Text(BytesText::new(&target)))?;
                            writer.write_event(Event::End(BytesEnd::new(tag)))?;
                            changed.insert(name);
                        }
                        continue;
                    }
                }
                tracker.open(&e, true)?;
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                tracker.close(e.local_name().as_ref());
                writer.write_event(Event::End(e))?;
            }
            Event::Text(t) => {
                if tracker.collecting_instruction() {
                    let text = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                    tracker.text(&text);
                }
                writer.write_event(Event::Text(t))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    PartPatch::finish(writer, changed)
}

fn display_update(
    tracker: &FieldTracker,
    updates: &BTreeMap<String, String>,
) -> Option<(String, String)> {
    let name = tracker.display_target()?;
    updates
        .get(name)
        .map(|value| (name.to_string(), value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::scan::{scan_definitions, scan_display_fields};

    fn updates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docVars><w:docVar w:name="A" w:val="1"/><w:docVar w:name="B" w:val="2"/><w:docVar w:name="C" w:val="3"/></w:docVars></w:settings>"#;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>
<w:p><w:fldSimple w:instr=" DOCVARIABLE A \* MERGEFORMAT "><w:r><w:rPr><w:b/></w:rPr><w:t>1</w:t></w:r></w:fldSimple></w:p>
<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> DOCVARIABLE B </w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>2</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>
<w:p><w:fldSimple w:instr=" DOCVARIABLE C "><w:r><w:t>3</w:t></w:r></w:fldSimple></w:p>
<w:p><w:r><w:t>plain 1 2 3</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_definitions_selective_update() {
        let patch = patch_definitions(SETTINGS, &updates(&[("A", "x"), ("B", "y"), ("Z", "new")]))
            .unwrap();
        let xml = patch.xml.unwrap();
        let vars = scan_definitions(&xml).unwrap();
        assert_eq!(vars["A"], "x");
        assert_eq!(vars["B"], "y");
        assert_eq!(vars["C"], "3");
        assert!(!vars.contains_key("Z"));
        assert_eq!(patch.changed, ["A", "B"].iter().map(|s| s.to_string()).collect());
        assert!(xml.contains(r#"<w:docVar w:name="C" w:val="3"/>"#));
    }

    #[test]
    fn test_definitions_value_is_escaped() {
        let patch = patch_definitions(SETTINGS, &updates(&[("A", "<5 & \"q\">")])).unwrap();
        let xml = patch.xml.unwrap();
        assert_eq!(scan_definitions(&xml).unwrap()["A"], "<5 & \"q\">");
    }

    #[test]
    fn test_definitions_unchanged_value() {
        let patch = patch_definitions(SETTINGS, &updates(&[("A", "1")])).unwrap();
        assert!(patch.xml.is_none());
        assert!(patch.changed.is_empty());
    }

    #[test]
    fn test_empty_updates_untouched() {
        assert_eq!(patch_definitions(SETTINGS, &BTreeMap::new()).unwrap(), PartPatch::default());
        assert_eq!(patch_display_fields(BODY, &BTreeMap::new()).unwrap(), PartPatch::default());
    }

    #[test]
    fn test_display_selective_update() {
        let patch = patch_display_fields(BODY, &updates(&[("A", "x"), ("B", "y")])).unwrap();
        let xml = patch.xml.unwrap();

        assert!(xml.contains(r#"<w:rPr><w:b/></w:rPr><w:t>x</w:t>"#));
        assert!(xml.contains(r#"<w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>y</w:t>"#));
        assert!(xml.contains(r#"<w:fldSimple w:instr=" DOCVARIABLE C "><w:r><w:t>3</w:t>"#));
        assert!(xml.contains("<w:t>Title</w:t>"));
        assert!(xml.contains("<w:t>plain 1 2 3</w:t>"));
        assert!(xml.contains(r#"<w:instrText xml:space="preserve"> DOCVARIABLE B </w:instrText>"#));
        assert_eq!(patch.changed.len(), 2);

        // everything outside the two runs is byte-identical
        let expected = BODY
            .replace(r#"<w:b/></w:rPr><w:t>1</w:t>"#, r#"<w:b/></w:rPr><w:t>x</w:t>"#)
            .replace(
                r#"separate"/></w:r><w:r><w:t>2</w:t>"#,
                r#"separate"/></w:r><w:r><w:t>y</w:t>"#,
            );
        assert_eq!(xml, expected);
        assert_eq!(scan_display_fields(&xml).unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_display_idempotent() {
        let u = updates(&[("A", "x"), ("B", "y")]);
        let once = patch_display_fields(BODY, &u).unwrap().xml.unwrap();
        let twice = patch_display_fields(&once, &u).unwrap();
        assert!(twice.xml.is_none());
    }

    #[test]
    fn test_display_multiple_runs_rewritten_identically() {
        let xml = r#"<w:p xmlns:w="x"><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText>DOCVARIABLE Cost</w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>12</w:t></w:r><w:r><w:t xml:space="preserve"> EUR</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r><w:r><w:t>after</w:t></w:r></w:p>"#;
        let patched = patch_display_fields(xml, &updates(&[("Cost", "15")]))
            .unwrap()
            .xml
            .unwrap();
        assert!(patched.contains("<w:r><w:t>15</w:t></w:r><w:r><w:t xml:space=\"preserve\">15</w:t></w:r>"));
        assert!(patched.contains("<w:t>after</w:t>"));
    }

    #[test]
    fn test_display_empty_run_and_preserve_space() {
        let xml = r#"<w:p xmlns:w="x"><w:fldSimple w:instr="DOCVARIABLE Note"><w:r><w:t/></w:r></w:fldSimple></w:p>"#;
        let patched = patch_display_fields(xml, &updates(&[("Note", " padded ")]))
            .unwrap()
            .xml
            .unwrap();
        assert!(patched.contains(r#"<w:t xml:space="preserve"> padded </w:t>"#));
    }

    #[test]
    fn test_display_escapes_text() {
        let xml = r#"<w:p xmlns:w="x"><w:fldSimple w:instr="DOCVARIABLE Q"><w:r><w:t>old</w:t></w:r></w:fldSimple></w:p>"#;
        let patched = patch_display_fields(xml, &updates(&[("Q", "a < b & c")]))
            .unwrap()
            .xml
            .unwrap();
        assert!(patched.contains("<w:t>a &lt; b &amp; c</w:t>"));
    }

    #[test]
    fn test_display_ignores_other_fields() {
        let xml = r#"<w:p xmlns:w="x"><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText> PAGE </w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>1</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#;
        let patch = patch_display_fields(xml, &updates(&[("PAGE", "9")])).unwrap();
        assert!(patch.xml.is_none());
    }

    #[test]
    fn test_display_malformed_body() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p></w:body></w:document>"#;
        let err = patch_display_fields(xml, &updates(&[("A", "1")])).unwrap_err();
        assert!(matches!(err, Error::XmlParse(_)));
    }
}
