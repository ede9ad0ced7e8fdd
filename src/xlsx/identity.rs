//! Workbook identity stored as a custom document property.
//!
//! Workbooks that feed variables are tagged with a random UUID under the
//! [`IDENTITY_PROPERTY`] custom property, so a linked workbook can be
//! recognised after it has been moved or renamed.

use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use super::access::open_workbook;
use crate::container::OoxmlContainer;
use crate::error::{Error, Result};

/// Name of the custom property holding the workbook identity.
pub const IDENTITY_PROPERTY: &str = "TansuGUID";

const CUSTOM_PART: &str = "docProps/custom.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";

const CUSTOM_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/custom-properties";
const CUSTOM_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.custom-properties+xml";
const PROPERTIES_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/custom-properties";
const VT_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes";

/// Format id shared by all user-defined custom properties.
const USER_FMTID: &str = "{D5CDD505-2E9C-101B-9397-08002B2CF9AE}";

/// A custom document property, value rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProperty {
    pub name: String,
    pub pid: u32,
    pub value: String,
}

/// Result of checking a workbook against a remembered identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityCheck {
    /// The workbook carries the expected identity
    Match,
    /// The workbook carries a different identity
    Mismatch { found: String },
    /// The workbook carries no identity
    Untagged,
}

/// Parse the properties of a custom.xml part.
pub fn parse_custom_properties(xml: &str) -> Result<Vec<CustomProperty>> {
    let mut properties = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut current: Option<CustomProperty> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"property" => {
                current = Some(property_header(&e)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"property" => {
                properties.push(property_header(&e)?);
            }
            Event::Text(t) => {
                if let Some(prop) = current.as_mut() {
                    let text = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                    prop.value.push_str(&text);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"property" => {
                if let Some(mut prop) = current.take() {
                    prop.value = prop.value.trim().to_string();
                    properties.push(prop);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(properties)
}

fn property_header(e: &BytesStart<'_>) -> Result<CustomProperty> {
    let mut name = String::new();
    let mut pid = 0;
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::XmlParse(err.to_string()))?;
        match attr.key.local_name().as_ref() {
            b"name" => name = value.into_owned(),
            b"pid" => pid = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(CustomProperty {
        name,
        pid,
        value: String::new(),
    })
}

/// Look up a custom property. A package without custom properties, or
/// without that property, yields `None`.
pub fn try_get_property(container: &OoxmlContainer, name: &str) -> Result<Option<String>> {
    let Some(bytes) = container.read_part(CUSTOM_PART)? else {
        return Ok(None);
    };
    let xml = crate::container::decode_xml_bytes(&bytes)?;
    Ok(parse_custom_properties(&xml)?
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.value)
        .filter(|v| !v.is_empty()))
}

/// Stage a string custom property, replacing any property of that name.
///
/// Adds the custom properties part, its content type override and its
/// package relationship when the package has none.
pub fn set_property(container: &mut OoxmlContainer, name: &str, value: &str) -> Result<()> {
    let custom = match container.read_part(CUSTOM_PART)? {
        Some(bytes) => {
            let xml = crate::container::decode_xml_bytes(&bytes)?;
            replace_property(&xml, name, value)?
        }
        None => {
            register_custom_part(container)?;
            new_custom_part(name, value)?
        }
    };
    container.write_part(CUSTOM_PART, custom.into_bytes());
    Ok(())
}

fn property_events(name: &str, value: &str, pid: u32, declare_vt: bool) -> Vec<Event<'static>> {
    let pid = pid.to_string();
    let mut start = BytesStart::new("property");
    start.push_attribute(("fmtid", USER_FMTID));
    start.push_attribute(("pid", pid.as_str()));
    start.push_attribute(("name", name));

    let mut lpwstr = BytesStart::new("vt:lpwstr");
    if declare_vt {
        lpwstr.push_attribute(("xmlns:vt", VT_NS));
    }

    vec![
        Event::Start(start),
        Event::Start(lpwstr),
        Event::Text(BytesText::new(value).into_owned()),
        Event::End(BytesEnd::new("vt:lpwstr")),
        Event::End(BytesEnd::new("property")),
    ]
}

fn new_custom_part(name: &str, value: &str) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new(
        "1.0",
        Some("UTF-8"),
        Some("yes"),
    )))?;
    let mut root = BytesStart::new("Properties");
    root.push_attribute(("xmlns", PROPERTIES_NS));
    root.push_attribute(("xmlns:vt", VT_NS));
    writer.write_event(Event::Start(root))?;
    for event in property_events(name, value, 2, false) {
        writer.write_event(event)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Properties")))?;
    String::from_utf8(writer.into_inner()).map_err(|e| Error::XmlParse(e.to_string()))
}

/// Rewrite an existing custom.xml: drop the old property of that name and
/// append the new one with the next free pid (user pids start at 2).
fn replace_property(xml: &str, name: &str, value: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut max_pid = 1;
    let mut skipping = 0usize;
    let mut declares_vt = false;

    loop {
        let event = reader.read_event()?;

        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => return Err(Error::XmlParse("unterminated property".to_string())),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == b"Properties" => {
                declares_vt = declares_vt_namespace(&e);
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"Properties" => {
                let declares_vt = declares_vt_namespace(&e);
                let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                writer.write_event(Event::Start(e))?;
                for event in property_events(name, value, max_pid + 1, !declares_vt) {
                    writer.write_event(event)?;
                }
                writer.write_event(Event::End(end))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"property" => {
                let header = property_header(&e)?;
                if header.name == name {
                    skipping = 1;
                } else {
                    max_pid = max_pid.max(header.pid);
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"property" => {
                let header = property_header(&e)?;
                if header.name != name {
                    max_pid = max_pid.max(header.pid);
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"Properties" => {
                for event in property_events(name, value, max_pid + 1, !declares_vt) {
                    writer.write_event(event)?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| Error::XmlParse(e.to_string()))
}

fn declares_vt_namespace(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"xmlns:vt" && a.value.as_ref() == VT_NS.as_bytes())
}

/// Register a new custom properties part in the content types and the
/// package relationships.
fn register_custom_part(container: &mut OoxmlContainer) -> Result<()> {
    let content_types = container.read_xml(CONTENT_TYPES_PART)?;
    if !content_types.contains("/docProps/custom.xml") {
        let mut over = BytesStart::new("Override");
        over.push_attribute(("PartName", "/docProps/custom.xml"));
        over.push_attribute(("ContentType", CUSTOM_CONTENT_TYPE));
        let xml = append_child(&content_types, b"Types", over)?;
        container.write_part(CONTENT_TYPES_PART, xml.into_bytes());
    }

    let rels = container.read_package_relationships()?;
    if rels.get_by_type(CUSTOM_REL_TYPE).is_empty() {
        let id = rels.next_id();
        let mut rel = BytesStart::new("Relationship");
        rel.push_attribute(("Id", id.as_str()));
        rel.push_attribute(("Type", CUSTOM_REL_TYPE));
        rel.push_attribute(("Target", "docProps/custom.xml"));

        let xml = match container.read_part(PACKAGE_RELS_PART)? {
            Some(bytes) => append_child(&crate::container::decode_xml_bytes(&bytes)?, b"Relationships", rel)?,
            None => append_child(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#,
                b"Relationships",
                rel,
            )?,
        };
        container.write_part(PACKAGE_RELS_PART, xml.into_bytes());
    }
    Ok(())
}

/// Append an empty child element as the last child of the root `parent`.
fn append_child(xml: &str, parent: &[u8], child: BytesStart<'_>) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut inserted = false;

    loop {
        match reader.read_event()? {
            Event::End(e) if !inserted && e.local_name().as_ref() == parent => {
                writer.write_event(Event::Empty(child.borrow()))?;
                writer.write_event(Event::End(e))?;
                inserted = true;
            }
            Event::Empty(e) if !inserted && e.local_name().as_ref() == parent => {
                let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                writer.write_event(Event::Start(e))?;
                writer.write_event(Event::Empty(child.borrow()))?;
                writer.write_event(Event::End(end))?;
                inserted = true;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    if !inserted {
        return Err(Error::XmlParse(format!(
            "no <{}> element",
            String::from_utf8_lossy(parent)
        )));
    }
    String::from_utf8(writer.into_inner()).map_err(|e| Error::XmlParse(e.to_string()))
}

/// Read a workbook's identity without modifying it.
pub fn read_identity(path: impl AsRef<Path>) -> Result<Option<String>> {
    let workbook = open_workbook(path)?;
    try_get_property(workbook.container(), IDENTITY_PROPERTY)
}

/// Return the workbook's identity, tagging it with a new UUID first when it
/// has none. The file is only rewritten in the latter case.
///
/// Not safe to call concurrently on the same path.
pub fn get_or_create_identity(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut container = open_workbook(path)?.into_container();

    if let Some(id) = try_get_property(&container, IDENTITY_PROPERTY)? {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    set_property(&mut container, IDENTITY_PROPERTY, &id)?;
    container.commit(path)?;
    log::debug!("tagged {} with identity {}", path.display(), id);
    Ok(id)
}

/// Compare the identity of a (possibly relocated) workbook with `expected`.
pub fn verify_identity(path: impl AsRef<Path>, expected: &str) -> Result<IdentityCheck> {
    Ok(match read_identity(path)? {
        Some(found) if found.eq_ignore_ascii_case(expected) => IdentityCheck::Match,
        Some(found) => IdentityCheck::Mismatch { found },
        None => IdentityCheck::Untagged,
    })
}
