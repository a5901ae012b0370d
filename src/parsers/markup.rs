//! Structured markup: JSON Lines and XML record streams.
//!
//! JSON fields are addressed with JSON pointers (`/identifiers/smiles`). XML
//! fields are paths relative to the record element: `child/grandchild` for
//! element text, `@attr` or `child/@attr` for attributes.

use std::io::BufRead;
use std::iter;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use serde_json::Value;

use super::{Metadata, NumberedLines, ParseContext, RecordStream};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonLinesConfig {
    pub id_pointer: Option<String>,
    pub structure_pointers: Vec<String>,
}

impl JsonLinesConfig {
    pub fn new(structure_pointers: &[&str]) -> Self {
        Self {
            id_pointer: None,
            structure_pointers: structure_pointers.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn id_pointer(mut self, pointer: &str) -> Self {
        self.id_pointer = Some(pointer.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlConfig {
    pub record_element: String,
    pub id_path: Option<String>,
    pub structure_paths: Vec<String>,
}

impl XmlConfig {
    pub fn new(record_element: &str, structure_paths: &[&str]) -> Self {
        Self {
            record_element: record_element.to_string(),
            id_path: None,
            structure_paths: structure_paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn id_path(mut self, path: &str) -> Self {
        self.id_path = Some(path.to_string());
        self
    }
}

pub(crate) fn parse_json_lines<'a>(
    config: &'a JsonLinesConfig,
    input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    let lines = NumberedLines::new(input)
        .filter(|(_, text)| text.as_ref().map(|t| !t.trim().is_empty()).unwrap_or(true));

    Box::new(lines.map(move |(line, text)| {
        let text = text.map_err(|reason| context.error(Some(line), reason))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|err| context.error(Some(line), err.to_string()))?;

        let structure = config
            .structure_pointers
            .iter()
            .find_map(|pointer| value.pointer(pointer).and_then(scalar));
        let id = config
            .id_pointer
            .as_ref()
            .and_then(|pointer| value.pointer(pointer).and_then(scalar));

        let mut metadata = Metadata::new();
        if let Value::Object(fields) = &value {
            for (name, field) in fields {
                let pointer = format!("/{name}");
                if config.structure_pointers.contains(&pointer)
                    || config.id_pointer.as_ref() == Some(&pointer)
                {
                    continue;
                }
                if let Some(text) = scalar(field) {
                    metadata.insert(name.clone(), text);
                }
            }
        }

        context.finish(Some(line), id.as_deref(), structure.as_deref(), metadata)
    }))
}

/// Strings as-is, numbers and booleans printed, nested values as compact JSON.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Values collected for one record element, keyed by relative path. XML
/// records are located by their ordinal rather than a line number.
struct XmlRecord {
    line: u64,
    depth: usize,
    path: Vec<String>,
    fields: Metadata,
}

impl XmlRecord {
    fn open(line: u64) -> Self {
        Self {
            line,
            depth: 0,
            path: Vec::new(),
            fields: Metadata::new(),
        }
    }

    fn key(&self, leaf: Option<&str>) -> String {
        let mut parts: Vec<&str> = self.path.iter().map(String::as_str).collect();
        if let Some(leaf) = leaf {
            parts.push(leaf);
        }
        parts.join("/")
    }

    fn attributes(&mut self, element: &BytesStart<'_>) -> Result<(), String> {
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|err| err.to_string())?;
            let name = format!("@{}", String::from_utf8_lossy(attribute.key.local_name().as_ref()));
            let value = attribute.unescape_value().map_err(|err| err.to_string())?;
            let key = self.key(Some(&name));
            self.fields.insert(key, value.into_owned());
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.path.is_empty() {
            return;
        }
        let key = self.key(None);
        self.fields
            .entry(key)
            .and_modify(|existing| existing.push_str(text))
            .or_insert_with(|| text.to_string());
    }
}

pub(crate) fn parse_xml<'a>(
    config: &'a XmlConfig,
    input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<XmlRecord> = None;
    let mut ordinal = 0u64;
    let mut finished = false;

    Box::new(iter::from_fn(move || {
        if finished {
            return None;
        }
        loop {
            buf.clear();
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => {
                    finished = true;
                    let line = current.as_ref().map(|record| record.line);
                    return Some(Err(context.error(line, err.to_string())));
                }
            };
            let outcome: Result<Option<XmlRecord>, String> = match event {
                Event::Start(element) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    match current.as_mut() {
                        Some(record) => {
                            record.depth += 1;
                            record.path.push(name);
                            record.attributes(&element).map(|_| None)
                        }
                        None if name == config.record_element => {
                            ordinal += 1;
                            let mut record = XmlRecord::open(ordinal);
                            let result = record.attributes(&element);
                            current = Some(record);
                            result.map(|_| None)
                        }
                        None => Ok(None),
                    }
                }
                Event::Empty(element) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    match current.as_mut() {
                        Some(record) => {
                            record.path.push(name);
                            let result = record.attributes(&element);
                            record.path.pop();
                            result.map(|_| None)
                        }
                        None if name == config.record_element => {
                            ordinal += 1;
                            let mut record = XmlRecord::open(ordinal);
                            record.attributes(&element).map(|_| Some(record))
                        }
                        None => Ok(None),
                    }
                }
                Event::Text(text) => {
                    if let Some(record) = current.as_mut() {
                        match text.unescape() {
                            Ok(value) => record.text(&value),
                            Err(err) => {
                                current = None;
                                return Some(Err(context.error(None, err.to_string())));
                            }
                        }
                    }
                    Ok(None)
                }
                Event::CData(data) => {
                    if let Some(record) = current.as_mut() {
                        record.text(&String::from_utf8_lossy(&data.into_inner()));
                    }
                    Ok(None)
                }
                Event::End(_) => match current.as_mut() {
                    Some(record) if record.depth > 0 => {
                        record.depth -= 1;
                        record.path.pop();
                        Ok(None)
                    }
                    Some(_) => Ok(current.take()),
                    None => Ok(None),
                },
                Event::Eof => {
                    finished = true;
                    return current
                        .take()
                        .map(|record| Err(context.error(Some(record.line), "unterminated record")));
                }
                _ => Ok(None),
            };

            match outcome {
                Ok(Some(record)) => return Some(finish_xml(config, &context, record)),
                Ok(None) => {}
                Err(reason) => {
                    let line = current.take().map(|record| record.line);
                    return Some(Err(context.error(line, reason)));
                }
            }
        }
    }))
}

fn finish_xml(config: &XmlConfig, context: &ParseContext, record: XmlRecord) -> super::RecordResult {
    let XmlRecord { line, mut fields, .. } = record;
    let structure = config
        .structure_paths
        .iter()
        .find_map(|path| fields.get(path).cloned());
    let id = config.id_path.as_ref().and_then(|path| fields.get(path).cloned());
    fields.retain(|key, _| !config.structure_paths.contains(key) && config.id_path.as_ref() != Some(key));
    context.finish(Some(line), id.as_deref(), structure.as_deref(), fields)
}
