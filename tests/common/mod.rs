//! Package builders shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="{main}"/></Relationships>"#;

fn zip_parts(parts: &[(&str, String)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// settings.xml holding the given docVars.
pub fn settings_xml(vars: &[(&str, &str)]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:settings xmlns:w="{}"><w:zoom w:percent="100"/><w:docVars>"#,
        W_NS
    );
    for (name, value) in vars {
        xml.push_str(&format!(r#"<w:docVar w:name="{}" w:val="{}"/>"#, name, value));
    }
    xml.push_str("</w:docVars></w:settings>");
    xml
}

/// document.xml with a heading, then one complex DOCVARIABLE field per
/// `(name, shown)` pair.
pub fn document_xml(fields: &[(&str, &str)]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body><w:p><w:r><w:t>Report</w:t></w:r></w:p>"#,
        W_NS
    );
    for (name, shown) in fields {
        xml.push_str(&format!(
            r#"<w:p><w:r><w:t xml:space="preserve">{} is </w:t></w:r><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> DOCVARIABLE {} \* MERGEFORMAT </w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>{}</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
            name, name, shown
        ));
    }
    xml.push_str("<w:sectPr/></w:body></w:document>");
    xml
}

/// A .docx package with the given settings and document parts.
pub fn build_docx(settings: &str, document: &str) -> Vec<u8> {
    zip_parts(&[
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/settings.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml"/></Types>"#.to_string(),
        ),
        ("_rels/.rels", PACKAGE_RELS.replace("{main}", "word/document.xml")),
        ("word/document.xml", document.to_string()),
        ("word/settings.xml", settings.to_string()),
        (
            "word/styles.xml",
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{}"/>"#, W_NS),
        ),
    ])
}

/// Write a .docx whose definitions and displayed values agree.
pub fn write_docx(dir: &Path, file: &str, vars: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, build_docx(&settings_xml(vars), &document_xml(vars))).unwrap();
    path
}

/// A workbook with one sheet per `(name, sheetData rows)` pair.
pub fn build_xlsx(sheets: &[(&str, &str)]) -> Vec<u8> {
    let names: Vec<String> = (1..=sheets.len()).map(|i| format!("xl/worksheets/sheet{}.xml", i)).collect();
    let mut parts = vec![
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#.to_string(),
        ),
        ("_rels/.rels", PACKAGE_RELS.replace("{main}", "xl/workbook.xml")),
    ];

    let mut workbook = String::from(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#);
    let mut rels = String::from(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#, name, i + 1, i + 1));
        rels.push_str(&format!(r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#, i + 1, i + 1));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");
    parts.push(("xl/workbook.xml", workbook));
    parts.push(("xl/_rels/workbook.xml.rels", rels));
    for ((_, rows), part) in sheets.iter().zip(&names) {
        parts.push((
            part.as_str(),
            format!(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#, rows),
        ));
    }
    zip_parts(&parts)
}

/// Inline-string cell.
pub fn text_cell(r: &str, text: &str) -> String {
    format!(r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#, r, text)
}

/// Numeric cell.
pub fn num_cell(r: &str, value: &str) -> String {
    format!(r#"<c r="{}"><v>{}</v></c>"#, r, value)
}

/// Every entry of a package, by name.
pub fn read_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(fs::read(path).unwrap())).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        entries.push((file.name().to_string(), data));
    }
    entries.sort();
    entries
}

/// One entry of a package as text.
pub fn read_entry(path: &Path, name: &str) -> String {
    let entries = read_entries(path);
    let (_, data) = entries.into_iter().find(|(n, _)| n == name).unwrap();
    String::from_utf8(data).unwrap()
}
