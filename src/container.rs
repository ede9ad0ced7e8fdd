//! ZIP container abstraction for OOXML packages.
//!
//! [`OoxmlContainer`] is the working copy every document and workbook
//! operation goes through: parts are read from the original archive,
//! rewritten parts are staged in memory, and [`OoxmlContainer::commit`]
//! repacks the package into a temporary sibling file that atomically
//! replaces the target only once it has been written completely.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A relationship entry from a .rels file.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target path (relative or absolute)
    pub target: String,
    /// Whether the target is external
    pub external: bool,
}

/// Collection of relationships parsed from a .rels file.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    /// Map from relationship ID to relationship data
    pub by_id: HashMap<String, Relationship>,
    /// Map from relationship type to list of relationships
    pub by_type: HashMap<String, Vec<Relationship>>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a relationship by ID.
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id)
    }

    /// Get relationships by type.
    pub fn get_by_type(&self, rel_type: &str) -> Vec<&Relationship> {
        self.by_type
            .get(rel_type)
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    /// Add a relationship.
    pub fn add(&mut self, rel: Relationship) {
        self.by_type
            .entry(rel.rel_type.clone())
            .or_default()
            .push(rel.clone());
        self.by_id.insert(rel.id.clone(), rel);
    }

    /// First `rIdN` identifier not already taken.
    pub fn next_id(&self) -> String {
        let max = self
            .by_id
            .keys()
            .filter_map(|id| id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }
}

/// Fix XML encoding declaration from UTF-16 to UTF-8.
///
/// Once UTF-16 XML has been decoded into a Rust `String`, the declaration
/// still claims UTF-16, which would make a re-parse or a rewrite lie about
/// its own bytes.
fn fix_xml_encoding_declaration(content: &str) -> String {
    if content.starts_with("<?xml") {
        if let Some(end_decl) = content.find("?>") {
            let decl = &content[..end_decl + 2];
            let rest = &content[end_decl + 2..];

            let fixed_decl = decl
                .replace("encoding=\"UTF-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='UTF-16'", "encoding='UTF-8'")
                .replace("encoding=\"utf-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='utf-16'", "encoding='UTF-8'");

            return format!("{}{}", fixed_decl, rest);
        }
    }
    content.to_string()
}

/// Decode XML bytes handling different encodings (UTF-8, UTF-16 LE/BE).
///
/// OOXML parts are almost always UTF-8, but some producers write UTF-16.
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String> {
    if bytes.len() >= 3 && bytes[0] == 0xEF && bytes[1] == 0xBB && bytes[2] == 0xBF {
        return String::from_utf8(bytes[3..].to_vec())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)));
    }

    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        let content = decode_utf16_le(&bytes[2..])?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let content = decode_utf16_be(&bytes[2..])?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        Err(_) => {
            // UTF-16 without BOM: ASCII markup leaves every other byte null
            if bytes.len() >= 4 && bytes[1] == 0 && bytes[3] == 0 {
                decode_utf16_le(bytes).map(|s| fix_xml_encoding_declaration(&s))
            } else if bytes.len() >= 4 && bytes[0] == 0 && bytes[2] == 0 {
                decode_utf16_be(bytes).map(|s| fix_xml_encoding_declaration(&s))
            } else {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

fn decode_utf16_le(bytes: &[u8]) -> Result<String> {
    let len = bytes.len() & !1;

    let u16_iter = (0..len)
        .step_by(2)
        .map(|i| u16::from_le_bytes([bytes[i], bytes[i + 1]]));

    char::decode_utf16(u16_iter)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn decode_utf16_be(bytes: &[u8]) -> Result<String> {
    let len = bytes.len() & !1;

    let u16_iter = (0..len)
        .step_by(2)
        .map(|i| u16::from_be_bytes([bytes[i], bytes[i + 1]]));

    char::decode_utf16(u16_iter)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Working copy of an OOXML package.
///
/// Reads go to staged parts first and then to the source archive. Nothing
/// touches the file system until [`commit`](Self::commit).
pub struct OoxmlContainer {
    archive: RefCell<zip::ZipArchive<Cursor<Vec<u8>>>>,
    /// Parts rewritten or added since opening, keyed by entry name.
    staged: BTreeMap<String, Vec<u8>>,
}

impl OoxmlContainer {
    /// Open an OOXML container from a file path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use varsync::container::OoxmlContainer;
    ///
    /// let container = OoxmlContainer::open("report.docx")?;
    /// assert!(container.exists("word/document.xml"));
    /// # Ok::<(), varsync::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Create an OOXML container from a byte vector.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let cursor = Cursor::new(data);
        let archive = zip::ZipArchive::new(cursor)
            .map_err(|e| Error::InvalidFormat(format!("not a zip package: {}", e)))?;
        Ok(Self {
            archive: RefCell::new(archive),
            staged: BTreeMap::new(),
        })
    }

    /// Create an OOXML container from a reader.
    pub fn from_reader<R: Read + Seek>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Read a part, returning `None` when the package has no such entry.
    pub fn read_part(&self, path: &str) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.staged.get(path) {
            return Ok(Some(bytes.clone()));
        }

        let mut archive = self.archive.borrow_mut();
        let mut file = match archive.by_name(path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// Read an XML part as a string, decoding UTF-8 or UTF-16.
    pub fn read_xml(&self, path: &str) -> Result<String> {
        let bytes = self.read_binary(path)?;
        decode_xml_bytes(&bytes)
    }

    /// Read a binary part.
    pub fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        self.read_part(path)?
            .ok_or_else(|| Error::MissingComponent(path.to_string()))
    }

    /// Stage new content for a part. Existing entries keep their position
    /// and compression method on commit; new entries are appended.
    pub fn write_part(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.staged.insert(path.into(), data);
    }

    /// Whether any part has been staged since opening.
    pub fn is_modified(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Names of the staged parts.
    pub fn modified_parts(&self) -> Vec<&str> {
        self.staged.keys().map(String::as_str).collect()
    }

    /// Check if a part exists in the package.
    pub fn exists(&self, path: &str) -> bool {
        if self.staged.contains_key(path) {
            return true;
        }
        let archive = self.archive.borrow();
        let result = archive.file_names().any(|n| n == path);
        result
    }

    /// List all parts in the package, staged additions included.
    pub fn list_files(&self) -> Vec<String> {
        let archive = self.archive.borrow();
        let mut files: Vec<String> = archive.file_names().map(String::from).collect();
        for name in self.staged.keys() {
            if !files.iter().any(|f| f == name) {
                files.push(name.clone());
            }
        }
        files
    }

    /// Repack the package into `out`.
    ///
    /// Entries that were not staged are raw-copied, so their compressed
    /// bytes are preserved exactly. Staged entries are recompressed with
    /// the method of the entry they replace.
    pub fn write_to<W: Write + Seek>(&self, out: W) -> Result<W> {
        let mut archive = self.archive.borrow_mut();
        let mut zip = ZipWriter::new(out);
        let mut written: HashSet<String> = HashSet::new();

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name().to_string();

            match self.staged.get(&name) {
                Some(bytes) => {
                    let method = match file.compression() {
                        CompressionMethod::Stored => CompressionMethod::Stored,
                        _ => CompressionMethod::Deflated,
                    };
                    drop(file);
                    let options = SimpleFileOptions::default().compression_method(method);
                    zip.start_file(name.as_str(), options)?;
                    zip.write_all(bytes)?;
                    written.insert(name);
                }
                None => zip.raw_copy_file(file)?,
            }
        }

        for (name, bytes) in &self.staged {
            if written.contains(name) {
                continue;
            }
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?)
    }

    /// Repack the package and atomically replace `path` with it.
    ///
    /// The new archive is written to a temporary file next to `path` and
    /// renamed over it only after it is complete and synced. Any failure
    /// leaves `path` untouched and is reported as [`Error::WriteFailed`].
    pub fn commit(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::write_failed(path, e))?;

        {
            let writer = BufWriter::new(tmp.as_file_mut());
            let mut writer = self
                .write_to(writer)
                .map_err(|e| Error::write_failed(path, e))?;
            writer.flush().map_err(|e| Error::write_failed(path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::write_failed(path, e))?;

        tmp.persist(path)
            .map_err(|e| Error::write_failed(path, e.error))?;
        log::debug!("committed {}", path.display());
        Ok(())
    }

    /// Read and parse relationships for a part.
    pub fn read_relationships(&self, part_path: &str) -> Result<Relationships> {
        let rels_path = if part_path.is_empty() || part_path == "/" {
            "_rels/.rels".to_string()
        } else {
            let path = Path::new(part_path);
            let parent = path.parent().unwrap_or(Path::new(""));
            let filename = path.file_name().unwrap_or_default().to_string_lossy();
            format!("{}/_rels/{}.rels", parent.display(), filename)
        };

        self.parse_relationships(&rels_path)
    }

    /// Read package-level relationships (_rels/.rels).
    pub fn read_package_relationships(&self) -> Result<Relationships> {
        self.parse_relationships("_rels/.rels")
    }

    fn parse_relationships(&self, rels_path: &str) -> Result<Relationships> {
        let content = match self.read_xml(rels_path) {
            Ok(c) => c,
            Err(_) => return Ok(Relationships::new()),
        };

        if content.trim().is_empty() {
            return Ok(Relationships::new());
        }

        let mut rels = Relationships::new();
        let mut reader = quick_xml::Reader::from_str(&content);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                    let mut id = String::new();
                    let mut rel_type = String::new();
                    let mut target = String::new();
                    let mut external = false;

                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                            b"Type" => rel_type = String::from_utf8_lossy(&attr.value).to_string(),
                            b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                            b"TargetMode" => {
                                external = String::from_utf8_lossy(&attr.value).to_lowercase()
                                    == "external"
                            }
                            _ => {}
                        }
                    }

                    if !id.is_empty() {
                        rels.add(Relationship {
                            id,
                            rel_type,
                            target,
                            external,
                        });
                    }
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => return Err(Error::XmlParse(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// Resolve a relative path from a base path.
    pub fn resolve_path(base: &str, relative: &str) -> String {
        if let Some(stripped) = relative.strip_prefix('/') {
            return stripped.to_string();
        }

        let base_path = Path::new(base);
        let base_dir = base_path.parent().unwrap_or(Path::new(""));

        let mut result = base_dir.to_path_buf();
        for component in Path::new(relative).components() {
            match component {
                std::path::Component::ParentDir => {
                    result.pop();
                }
                std::path::Component::Normal(c) => {
                    result.push(c);
                }
                _ => {}
            }
        }

        result.to_string_lossy().replace('\\', "/")
    }
}

impl std::fmt::Debug for OoxmlContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OoxmlContainer")
            .field("files", &self.list_files().len())
            .field("staged", &self.staged.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_zip(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, method) in entries {
            let options = SimpleFileOptions::default().compression_method(*method);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn entry_method(data: &[u8], name: &str) -> CompressionMethod {
        let mut archive = zip::ZipArchive::new(Cursor::new(data.to_vec())).unwrap();
        let file = archive.by_name(name).unwrap();
        file.compression()
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "../media/image1.png"),
            "media/image1.png"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
    }

    #[test]
    fn test_relationships_next_id() {
        let mut rels = Relationships::new();
        assert_eq!(rels.next_id(), "rId1");
        rels.add(Relationship {
            id: "rId3".to_string(),
            rel_type: "http://test/type1".to_string(),
            target: "target1.xml".to_string(),
            external: false,
        });
        rels.add(Relationship {
            id: "custom".to_string(),
            rel_type: "http://test/type1".to_string(),
            target: "target2.xml".to_string(),
            external: false,
        });
        assert_eq!(rels.next_id(), "rId4");
        assert_eq!(rels.get_by_type("http://test/type1").len(), 2);
    }

    #[test]
    fn test_read_part_absent() {
        let data = build_zip(&[("a.xml", b"<a/>", CompressionMethod::Deflated)]);
        let container = OoxmlContainer::from_bytes(data).unwrap();
        assert_eq!(container.read_part("a.xml").unwrap(), Some(b"<a/>".to_vec()));
        assert_eq!(container.read_part("b.xml").unwrap(), None);
        assert!(matches!(
            container.read_binary("b.xml"),
            Err(Error::MissingComponent(_))
        ));
    }

    #[test]
    fn test_not_a_zip() {
        let err = OoxmlContainer::from_bytes(b"plain text".to_vec()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let err = OoxmlContainer::open("/definitely/not/here.docx").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_repack_preserves_untouched_entries() {
        let data = build_zip(&[
            ("stored.bin", b"\x00\x01\x02binary", CompressionMethod::Stored),
            ("a.xml", b"<a>old</a>", CompressionMethod::Deflated),
            ("b.xml", b"<b/>", CompressionMethod::Stored),
        ]);

        let mut container = OoxmlContainer::from_bytes(data).unwrap();
        container.write_part("a.xml", b"<a>new</a>".to_vec());
        container.write_part("extra.xml", b"<extra/>".to_vec());
        assert!(container.is_modified());
        assert_eq!(container.modified_parts(), vec!["a.xml", "extra.xml"]);

        let out = container.write_to(Cursor::new(Vec::new())).unwrap().into_inner();
        let reopened = OoxmlContainer::from_bytes(out.clone()).unwrap();

        assert_eq!(reopened.read_binary("stored.bin").unwrap(), b"\x00\x01\x02binary");
        assert_eq!(reopened.read_xml("a.xml").unwrap(), "<a>new</a>");
        assert_eq!(reopened.read_xml("b.xml").unwrap(), "<b/>");
        assert_eq!(reopened.read_xml("extra.xml").unwrap(), "<extra/>");
        let mut files = reopened.list_files();
        files.sort();
        assert_eq!(files, vec!["a.xml", "b.xml", "extra.xml", "stored.bin"]);

        assert_eq!(entry_method(&out, "stored.bin"), CompressionMethod::Stored);
        assert_eq!(entry_method(&out, "a.xml"), CompressionMethod::Deflated);
        assert_eq!(entry_method(&out, "b.xml"), CompressionMethod::Stored);
    }

    #[test]
    fn test_commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.zip");
        std::fs::write(
            &path,
            build_zip(&[("a.xml", b"<a>old</a>", CompressionMethod::Deflated)]),
        )
        .unwrap();

        let mut container = OoxmlContainer::open(&path).unwrap();
        container.write_part("a.xml", b"<a>new</a>".to_vec());
        container.commit(&path).unwrap();

        let reopened = OoxmlContainer::open(&path).unwrap();
        assert_eq!(reopened.read_xml("a.xml").unwrap(), "<a>new</a>");

        // no temporary files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_commit_into_missing_directory_fails() {
        let data = build_zip(&[("a.xml", b"<a/>", CompressionMethod::Deflated)]);
        let container = OoxmlContainer::from_bytes(data).unwrap();
        let err = container
            .commit("/definitely/not/a/dir/pkg.zip")
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailed { .. }));
    }

    #[test]
    fn test_utf16_decoding_function() {
        let utf16_le = b"\xFF\xFE<\0?\0x\0m\0l\0>\0";
        assert_eq!(decode_xml_bytes(utf16_le).unwrap(), "<?xml>");

        let utf16_be = b"\xFE\xFF\0<\0?\0x\0m\0l\0>";
        assert_eq!(decode_xml_bytes(utf16_be).unwrap(), "<?xml>");

        let utf8_bom = b"\xEF\xBB\xBF<?xml>";
        assert_eq!(decode_xml_bytes(utf8_bom).unwrap(), "<?xml>");

        let utf8_plain = b"<?xml>";
        assert_eq!(decode_xml_bytes(utf8_plain).unwrap(), "<?xml>");
    }

    #[test]
    fn test_utf16_declaration_rewritten() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><a/>";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in xml.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode_xml_bytes(&bytes).unwrap();
        assert_eq!(decoded, "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>");
    }
}
