//! Read-only access to workbook sheets and cells.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};

use super::cell_ref::CellRef;
use super::shared_strings::SharedStrings;
use crate::container::OoxmlContainer;
use crate::detect::detect_format;
use crate::error::{Error, Result};
use crate::model::CellValue;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Sheet entry from workbook.xml.
#[derive(Debug, Clone)]
struct SheetInfo {
    name: String,
    /// Part path of the worksheet, resolved through the workbook rels
    path: Option<String>,
}

/// An opened Excel workbook (.xlsx or .xlsm).
#[derive(Debug)]
pub struct Workbook {
    container: OoxmlContainer,
    shared_strings: SharedStrings,
    sheets: Vec<SheetInfo>,
}

impl Workbook {
    /// Open a workbook for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let container = OoxmlContainer::open(path)?;
        Self::from_container(container)
    }

    /// Open a workbook from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let container = OoxmlContainer::from_bytes(data)?;
        Self::from_container(container)
    }

    pub(crate) fn from_container(container: OoxmlContainer) -> Result<Self> {
        if !detect_format(&container)?.is_workbook() {
            return Err(Error::InvalidFormat("not an Excel workbook".to_string()));
        }

        let shared_strings = match container.read_part(SHARED_STRINGS_PART)? {
            Some(bytes) => SharedStrings::parse(&crate::container::decode_xml_bytes(&bytes)?)?,
            None => SharedStrings::default(),
        };

        let sheets = Self::parse_workbook(&container)?;

        Ok(Self {
            container,
            shared_strings,
            sheets,
        })
    }

    /// Parse workbook.xml for sheet names and their part paths.
    fn parse_workbook(container: &OoxmlContainer) -> Result<Vec<SheetInfo>> {
        let xml = container
            .read_xml(WORKBOOK_PART)
            .map_err(|_| Error::InvalidFormat(format!("missing {}", WORKBOOK_PART)))?;
        let rels = container.read_relationships(WORKBOOK_PART)?;

        let mut sheets = Vec::new();
        let mut reader = quick_xml::Reader::from_str(&xml);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                    let mut name = String::new();
                    let mut rel_id = String::new();

                    for attr in e.attributes().flatten() {
                        let value = attr
                            .unescape_value()
                            .map_err(|err| Error::XmlParse(err.to_string()))?;
                        match attr.key.local_name().as_ref() {
                            b"name" => name = value.into_owned(),
                            // r:id; the only namespaced attribute named id
                            b"id" if attr.key.prefix().is_some() => rel_id = value.into_owned(),
                            _ => {}
                        }
                    }

                    if !name.is_empty() {
                        let path = rels
                            .get(&rel_id)
                            .map(|rel| OoxmlContainer::resolve_path(WORKBOOK_PART, &rel.target));
                        sheets.push(SheetInfo { name, path });
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::XmlParse(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        Ok(sheets)
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether a sheet of that exact name exists.
    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    /// Load a sheet's cells.
    pub fn sheet(&self, name: &str) -> Result<Sheet> {
        let info = self
            .sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::NotFound(format!("sheet {:?}", name)))?;
        let path = info
            .path
            .as_deref()
            .ok_or_else(|| Error::MissingComponent(format!("worksheet part for {:?}", name)))?;

        let xml = self.container.read_xml(path)?;
        let cells = self.parse_sheet(&xml)?;
        Ok(Sheet {
            name: info.name.clone(),
            cells,
        })
    }

    /// Read one cell. An empty or absent cell is [`CellValue::Empty`].
    pub fn cell(&self, sheet: &str, cell: &CellRef) -> Result<CellValue> {
        Ok(self.sheet(sheet)?.value(cell))
    }

    /// Get a reference to the container.
    pub fn container(&self) -> &OoxmlContainer {
        &self.container
    }

    /// Take back the container, e.g. to stage and commit changes.
    pub fn into_container(self) -> OoxmlContainer {
        self.container
    }

    /// Parse worksheet XML into a cell map keyed by (row, column).
    fn parse_sheet(&self, xml: &str) -> Result<BTreeMap<(u32, u32), CellValue>> {
        let mut cells = BTreeMap::new();
        let mut reader = quick_xml::Reader::from_str(xml);

        let mut buf = Vec::new();
        let mut row: u32 = 0;
        let mut next_column: u32 = 1;
        let mut current: Option<PendingCell> = None;
        let mut in_value = false;
        let mut in_formula = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"row" => {
                        row = row_number(&e)?.unwrap_or(row + 1);
                        next_column = 1;
                    }
                    b"c" => {
                        let cell = PendingCell::start(&e, row, next_column)?;
                        next_column = cell.position.column + 1;
                        current = Some(cell);
                    }
                    b"v" | b"t" if current.is_some() && !in_formula => in_value = true,
                    b"f" => in_formula = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"row" => {
                        row = row_number(&e)?.unwrap_or(row + 1);
                        next_column = 1;
                    }
                    b"c" => {
                        let cell = PendingCell::start(&e, row, next_column)?;
                        next_column = cell.position.column + 1;
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) if in_value => {
                    if let Some(cell) = current.as_mut() {
                        let text = e.unescape().map_err(|err| Error::XmlParse(err.to_string()))?;
                        cell.raw.push_str(&text);
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        if let Some(cell) = current.take() {
                            let position = cell.position;
                            let value = self.resolve_cell_value(cell);
                            if value != CellValue::Empty {
                                cells.insert((position.row, position.column), value);
                            }
                        }
                        in_value = false;
                    }
                    b"v" | b"t" => in_value = false,
                    b"f" => in_formula = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::XmlParse(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        Ok(cells)
    }

    /// Resolve a cell value based on its type.
    fn resolve_cell_value(&self, cell: PendingCell) -> CellValue {
        if cell.raw.is_empty() {
            return CellValue::Empty;
        }
        match cell.cell_type.as_deref() {
            Some("s") => match cell.raw.trim().parse::<usize>() {
                Ok(idx) => match self.shared_strings.get(idx) {
                    Some(s) if !s.is_empty() => CellValue::Text(s.to_string()),
                    _ => CellValue::Empty,
                },
                Err(_) => CellValue::Text(cell.raw),
            },
            Some("b") => CellValue::Bool(cell.raw.trim() == "1"),
            Some("e") => CellValue::Error(cell.raw),
            Some("str") | Some("inlineStr") | Some("d") => CellValue::Text(cell.raw),
            _ => match cell.raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(cell.raw),
            },
        }
    }
}

/// A cell whose value text is still being collected.
struct PendingCell {
    position: CellRef,
    cell_type: Option<String>,
    raw: String,
}

impl PendingCell {
    fn start(e: &BytesStart<'_>, row: u32, next_column: u32) -> Result<Self> {
        let mut position = CellRef::new(next_column, row.max(1));
        let mut cell_type = None;

        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"r" => {
                    let value = String::from_utf8_lossy(&attr.value);
                    position = CellRef::parse(&value)
                        .map_err(|_| Error::XmlParse(format!("bad cell reference {:?}", value)))?;
                }
                b"t" => cell_type = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            position,
            cell_type,
            raw: String::new(),
        })
    }
}

fn row_number(e: &BytesStart<'_>) -> Result<Option<u32>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            let value = String::from_utf8_lossy(&attr.value);
            return value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::XmlParse(format!("bad row number {:?}", value)));
        }
    }
    Ok(None)
}

/// The non-empty cells of one worksheet.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<(u32, u32), CellValue>,
}

impl Sheet {
    /// Sheet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value at a position; absent cells read as [`CellValue::Empty`].
    pub fn value(&self, cell: &CellRef) -> CellValue {
        self.get(cell.column, cell.row).cloned().unwrap_or_default()
    }

    /// Value at 1-based (column, row), if the cell holds anything.
    pub fn get(&self, column: u32, row: u32) -> Option<&CellValue> {
        self.cells.get(&(row, column))
    }

    /// Last used (row, column), or (0, 0) for an empty sheet.
    pub fn dimensions(&self) -> (u32, u32) {
        let rows = self.cells.keys().map(|&(r, _)| r).max().unwrap_or(0);
        let cols = self.cells.keys().map(|&(_, c)| c).max().unwrap_or(0);
        (rows, cols)
    }

    /// Number of non-empty cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the sheet has no non-empty cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
