/// XML Dump Documents
///
/// A dump is a `mysqldump`-style XML document holding one database with an
/// ordered list of per-table sections:
///
/// ```text
/// <?xml version="1.0"?>
/// <mysqldump xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
///  <database name="">
///   <table_structure name="#__test">
///    <field Field="id" Type="int(11) unsigned" .../>
///    <key Table="#__test" Key_name="PRIMARY" .../>
///   </table_structure>
///   <table_data name="#__test">
///    <row>
///     <field name="id">1</field>
///     <field name="note" xsi:nil="true"/>
///    </row>
///   </table_data>
///  </database>
/// </mysqldump>
/// ```
///
/// Structure attributes are the driver's native metadata names, written
/// verbatim. A NULL cell is an empty `field` carrying `xsi:nil="true"`; an
/// empty string is an empty `field` without it. Both directions follow this
/// convention, so NULL and `''` survive a round trip distinctly.
///
/// Cells that cannot be carried as XML text (binary blobs, control
/// characters) are written base64-encoded with `encoding="base64"`.
use crate::core::value::{Record, Value};
use crate::core::{DatabaseError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const NIL_ATTRIBUTE: &str = "xsi:nil";
const ENCODING_ATTRIBUTE: &str = "encoding";
const BASE64_ENCODING: &str = "base64";

/// Column and key metadata declared for one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableStructure {
    pub name: String,
    /// One attribute record per column, in column order
    pub fields: Vec<Record>,
    /// One attribute record per key part, in index definition order
    pub keys: Vec<Record>,
}

/// Rows declared for one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableData {
    pub name: String,
    /// Cell values are `Value::Text` or `Value::Null`, or `Value::Blob` for
    /// base64-encoded cells that are not valid UTF-8
    pub rows: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DumpSection {
    Structure(TableStructure),
    Data(TableData),
}

impl DumpSection {
    pub fn table_name(&self) -> &str {
        match self {
            DumpSection::Structure(s) => &s.name,
            DumpSection::Data(d) => &d.name,
        }
    }
}

/// An in-memory dump document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DumpDocument {
    /// Value of `<database name>`, possibly empty
    pub database: String,
    pub sections: Vec<DumpSection>,
}

impl DumpDocument {
    pub fn new(database: &str) -> Self {
        DumpDocument {
            database: database.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn push_structure(&mut self, structure: TableStructure) {
        self.sections.push(DumpSection::Structure(structure));
    }

    pub fn push_data(&mut self, data: TableData) {
        self.sections.push(DumpSection::Data(data));
    }

    pub fn structures(&self) -> impl Iterator<Item = &TableStructure> {
        self.sections.iter().filter_map(|section| match section {
            DumpSection::Structure(s) => Some(s),
            DumpSection::Data(_) => None,
        })
    }

    pub fn data(&self) -> impl Iterator<Item = &TableData> {
        self.sections.iter().filter_map(|section| match section {
            DumpSection::Data(d) => Some(d),
            DumpSection::Structure(_) => None,
        })
    }

    /// Finds the structure section for `table`.
    pub fn structure(&self, table: &str) -> Option<&TableStructure> {
        self.structures().find(|s| s.name == table)
    }

    /// Serializes the document with one-space indentation per level.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

        let mut root = BytesStart::new("mysqldump");
        root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
        writer.write_event(Event::Start(root))?;

        let mut database = BytesStart::new("database");
        database.push_attribute(("name", self.database.as_str()));
        writer.write_event(Event::Start(database))?;

        for section in &self.sections {
            match section {
                DumpSection::Structure(structure) => write_structure(&mut writer, structure)?,
                DumpSection::Data(data) => write_data(&mut writer, data)?,
            }
        }

        writer.write_event(Event::End(BytesEnd::new("database")))?;
        writer.write_event(Event::End(BytesEnd::new("mysqldump")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| DatabaseError::Xml(e.to_string()))
    }

    /// Parses a document, rejecting anything outside the dump layout.
    pub fn from_xml(xml: &str) -> Result<Self> {
        DumpParser::new(xml).parse()
    }

    /// Reads and parses a dump file.
    pub fn read_file(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)?;
        Self::from_xml(&xml)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_xml()?)?;
        Ok(())
    }
}

/// Writes `attributes` in order; NULL values are omitted.
fn element_with_attributes<'a>(name: &'a str, attributes: &'a Record) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    for (key, value) in attributes {
        if let Some(text) = value.as_text() {
            element.push_attribute((key.as_str(), text.as_ref()));
        }
    }
    element
}

fn write_structure(writer: &mut Writer<Vec<u8>>, structure: &TableStructure) -> Result<()> {
    let mut start = BytesStart::new("table_structure");
    start.push_attribute(("name", structure.name.as_str()));

    if structure.fields.is_empty() && structure.keys.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for field in &structure.fields {
        writer.write_event(Event::Empty(element_with_attributes("field", field)))?;
    }
    for key in &structure.keys {
        writer.write_event(Event::Empty(element_with_attributes("key", key)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("table_structure")))?;
    Ok(())
}

fn write_data(writer: &mut Writer<Vec<u8>>, data: &TableData) -> Result<()> {
    let mut start = BytesStart::new("table_data");
    start.push_attribute(("name", data.name.as_str()));

    if data.rows.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for row in &data.rows {
        writer.write_event(Event::Start(BytesStart::new("row")))?;
        for (column, value) in row {
            let mut field = BytesStart::new("field");
            field.push_attribute(("name", column.as_str()));
            match cell_text(value) {
                CellText::Plain(text) => {
                    writer.write_event(Event::Start(field))?;
                    writer.write_event(Event::Text(BytesText::new(&text)))?;
                    writer.write_event(Event::End(BytesEnd::new("field")))?;
                }
                CellText::Encoded(encoded) => {
                    field.push_attribute((ENCODING_ATTRIBUTE, BASE64_ENCODING));
                    writer.write_event(Event::Start(field))?;
                    writer.write_event(Event::Text(BytesText::new(&encoded)))?;
                    writer.write_event(Event::End(BytesEnd::new("field")))?;
                }
                CellText::Nil => {
                    field.push_attribute((NIL_ATTRIBUTE, "true"));
                    writer.write_event(Event::Empty(field))?;
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("table_data")))?;
    Ok(())
}

enum CellText<'a> {
    Plain(std::borrow::Cow<'a, str>),
    Encoded(String),
    Nil,
}

/// XML 1.0 `Char` production. Carriage returns are legal but normalised
/// away by parsers, so they are treated as unsafe too.
fn is_xml_safe(c: char) -> bool {
    match c {
        '\t' | '\n' => true,
        '\u{0}'..='\u{1f}' => false,
        '\u{fffe}' | '\u{ffff}' => false,
        _ => true,
    }
}

fn cell_text(value: &Value) -> CellText<'_> {
    match value {
        Value::Null => CellText::Nil,
        Value::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) if text.chars().all(is_xml_safe) => CellText::Plain(text.into()),
            _ => CellText::Encoded(BASE64.encode(bytes)),
        },
        other => match other.as_text() {
            Some(text) if text.chars().all(is_xml_safe) => CellText::Plain(text),
            Some(text) => CellText::Encoded(BASE64.encode(text.as_bytes())),
            None => CellText::Nil,
        },
    }
}

/// Reverses `cell_text` for an encoded field.
fn decode_cell(column: &str, attributes: &Record, content: &str) -> Result<Value> {
    match attributes.get(ENCODING_ATTRIBUTE).and_then(Value::as_text).as_deref() {
        None => Ok(Value::Text(content.to_string())),
        Some(BASE64_ENCODING) => {
            let bytes = BASE64
                .decode(content.trim())
                .map_err(|e| DatabaseError::Xml(format!("field {column}: {e}")))?;
            Ok(match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Blob(e.into_bytes()),
            })
        }
        Some(other) => Err(DatabaseError::Xml(format!(
            "field {column} has unsupported encoding {other:?}"
        ))),
    }
}

/// Owned view of the parser events the dump layout cares about.
#[derive(Debug)]
enum Node {
    Start(String, Record),
    Empty(String, Record),
    End(String),
    Text(String),
    Eof,
}

impl Node {
    fn describe(&self) -> String {
        match self {
            Node::Start(name, _) => format!("<{name}>"),
            Node::Empty(name, _) => format!("<{name}/>"),
            Node::End(name) => format!("</{name}>"),
            Node::Text(text) => format!("text {:?}", text),
            Node::Eof => "end of document".to_string(),
        }
    }
}

fn unexpected(node: &Node, context: &str) -> DatabaseError {
    DatabaseError::Xml(format!("unexpected {} {}", node.describe(), context))
}

fn utf8_string(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| DatabaseError::Xml(e.to_string()))
}

fn attributes_of(element: &BytesStart<'_>) -> Result<Record> {
    let mut record = Record::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = utf8_string(attribute.key.as_ref())?;
        let value = attribute.unescape_value()?.into_owned();
        record.insert(key, Value::Text(value));
    }
    Ok(record)
}

fn required_name(attributes: &Record, element: &str) -> Result<String> {
    attributes
        .get("name")
        .and_then(Value::as_text)
        .map(|name| name.into_owned())
        .ok_or_else(|| DatabaseError::Xml(format!("<{element}> is missing its name attribute")))
}

fn is_nil(attributes: &Record) -> bool {
    matches!(attributes.get(NIL_ATTRIBUTE).and_then(Value::as_text).as_deref(), Some("true") | Some("1"))
}

struct DumpParser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> DumpParser<'a> {
    fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        DumpParser { reader }
    }

    /// Next node, including whitespace text.
    fn next_raw(&mut self) -> Result<Node> {
        loop {
            let node = match self.reader.read_event()? {
                Event::Start(e) => Node::Start(utf8_string(e.name().as_ref())?, attributes_of(&e)?),
                Event::Empty(e) => Node::Empty(utf8_string(e.name().as_ref())?, attributes_of(&e)?),
                Event::End(e) => Node::End(utf8_string(e.name().as_ref())?),
                Event::Text(e) => Node::Text(e.unescape()?.into_owned()),
                Event::CData(e) => Node::Text(utf8_string(&e.into_inner())?),
                Event::Eof => Node::Eof,
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
            };
            return Ok(node);
        }
    }

    /// Next node, skipping whitespace-only text between elements.
    fn next_significant(&mut self) -> Result<Node> {
        loop {
            match self.next_raw()? {
                Node::Text(text) if text.trim().is_empty() => continue,
                node => return Ok(node),
            }
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<()> {
        match self.next_significant()? {
            Node::End(end) if end == name => Ok(()),
            node => Err(unexpected(&node, &format!("where </{name}> was expected"))),
        }
    }

    fn parse(mut self) -> Result<DumpDocument> {
        match self.next_significant()? {
            Node::Start(name, _) if name == "mysqldump" => {}
            node => return Err(unexpected(&node, "where <mysqldump> was expected")),
        }

        let document = match self.next_significant()? {
            Node::Start(name, attributes) if name == "database" => {
                let mut document = DumpDocument::new(&database_name(&attributes));
                self.parse_sections(&mut document)?;
                document
            }
            Node::Empty(name, attributes) if name == "database" => DumpDocument::new(&database_name(&attributes)),
            node => return Err(unexpected(&node, "where <database> was expected")),
        };

        self.expect_end("mysqldump")?;
        match self.next_significant()? {
            Node::Eof => {}
            node => return Err(unexpected(&node, "after </mysqldump>")),
        }

        Ok(document)
    }

    fn parse_sections(&mut self, document: &mut DumpDocument) -> Result<()> {
        loop {
            match self.next_significant()? {
                Node::Start(name, attributes) if name == "table_structure" => {
                    let table = required_name(&attributes, &name)?;
                    let structure = self.parse_structure(table)?;
                    document.push_structure(structure);
                }
                Node::Empty(name, attributes) if name == "table_structure" => {
                    document.push_structure(TableStructure {
                        name: required_name(&attributes, &name)?,
                        ..TableStructure::default()
                    });
                }
                Node::Start(name, attributes) if name == "table_data" => {
                    let table = required_name(&attributes, &name)?;
                    let data = self.parse_data(table)?;
                    document.push_data(data);
                }
                Node::Empty(name, attributes) if name == "table_data" => {
                    document.push_data(TableData {
                        name: required_name(&attributes, &name)?,
                        rows: Vec::new(),
                    });
                }
                Node::End(name) if name == "database" => return Ok(()),
                node => return Err(unexpected(&node, "inside <database>")),
            }
        }
    }

    fn parse_structure(&mut self, name: String) -> Result<TableStructure> {
        let mut structure = TableStructure {
            name,
            ..TableStructure::default()
        };

        loop {
            let (element, attributes, closed) = match self.next_significant()? {
                Node::Empty(element, attributes) => (element, attributes, true),
                Node::Start(element, attributes) => (element, attributes, false),
                Node::End(end) if end == "table_structure" => return Ok(structure),
                node => return Err(unexpected(&node, "inside <table_structure>")),
            };

            match element.as_str() {
                "field" if structure.keys.is_empty() => structure.fields.push(attributes),
                "field" => {
                    return Err(DatabaseError::Xml(format!(
                        "<field> after <key> in structure of {}",
                        structure.name
                    )))
                }
                "key" => structure.keys.push(attributes),
                other => {
                    return Err(DatabaseError::Xml(format!(
                        "unexpected <{other}> inside <table_structure>"
                    )))
                }
            }

            if !closed {
                self.expect_end(&element)?;
            }
        }
    }

    fn parse_data(&mut self, name: String) -> Result<TableData> {
        let mut data = TableData {
            name,
            rows: Vec::new(),
        };

        loop {
            match self.next_significant()? {
                Node::Start(element, _) if element == "row" => {
                    let row = self.parse_row()?;
                    data.rows.push(row);
                }
                Node::Empty(element, _) if element == "row" => data.rows.push(Record::new()),
                Node::End(end) if end == "table_data" => return Ok(data),
                node => return Err(unexpected(&node, "inside <table_data>")),
            }
        }
    }

    fn parse_row(&mut self) -> Result<Record> {
        let mut row = Record::new();

        loop {
            match self.next_significant()? {
                Node::Empty(element, attributes) if element == "field" => {
                    let column = required_name(&attributes, &element)?;
                    let value = if is_nil(&attributes) {
                        Value::Null
                    } else {
                        Value::Text(String::new())
                    };
                    row.insert(column, value);
                }
                Node::Start(element, attributes) if element == "field" => {
                    let column = required_name(&attributes, &element)?;
                    let text = self.field_content(&column)?;
                    let value = match (is_nil(&attributes), text.is_empty()) {
                        (true, true) => Value::Null,
                        (true, false) => {
                            return Err(DatabaseError::Xml(format!(
                                "field {column} is marked nil but has content"
                            )))
                        }
                        (false, _) => decode_cell(&column, &attributes, &text)?,
                    };
                    row.insert(column, value);
                }
                Node::End(end) if end == "row" => return Ok(row),
                node => return Err(unexpected(&node, "inside <row>")),
            }
        }
    }

    /// Collects the raw text of a row field, whitespace included.
    fn field_content(&mut self, column: &str) -> Result<String> {
        let mut content = String::new();
        loop {
            match self.next_raw()? {
                Node::Text(text) => content.push_str(&text),
                Node::End(end) if end == "field" => return Ok(content),
                node => return Err(unexpected(&node, &format!("inside field {column}"))),
            }
        }
    }
}

fn database_name(attributes: &Record) -> String {
    attributes
        .get("name")
        .and_then(Value::as_text)
        .map(|name| name.into_owned())
        .unwrap_or_default()
}
