//! Format parsers turning one raw member file into a lazy stream of
//! standardized records.
//!
//! Every parser yields `Result<StandardizedRecord, RecordError>` per record: a
//! malformed record is reported in place and the stream moves on to the next
//! one. Streams are single pass over a `BufRead`.

use std::collections::BTreeMap;
use std::io::BufRead;

use serde::Serialize;
use thiserror::Error;

use crate::domain::Category;

pub mod delimited;
pub mod markup;
pub mod reaction_smiles;
pub mod sdf;

pub use delimited::{DelimitedConfig, Delimiter, StructureColumns};
pub use markup::{JsonLinesConfig, XmlConfig};
pub use reaction_smiles::ReactionSmilesConfig;
pub use sdf::StructureDataConfig;

pub type Metadata = BTreeMap<String, String>;

/// Participant roles of a `reactants>agents>products` reaction SMILES.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionRoles {
    pub reactants: String,
    pub agents: String,
    pub products: String,
}

impl ReactionRoles {
    pub fn split(reaction_smiles: &str) -> Option<Self> {
        let mut parts = reaction_smiles.split('>');
        let (Some(reactants), Some(agents), Some(products), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        Some(Self {
            reactants: reactants.to_string(),
            agents: agents.to_string(),
            products: products.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardizedRecord {
    pub id: String,
    pub structure: String,
    pub roles: Option<ReactionRoles>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{file}{}: {reason}", line_suffix(.line))]
pub struct RecordError {
    pub file: String,
    pub line: Option<u64>,
    pub reason: String,
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|line| format!(":{line}")).unwrap_or_default()
}

pub type RecordResult = Result<StandardizedRecord, RecordError>;

pub type RecordStream<'a> = Box<dyn Iterator<Item = RecordResult> + 'a>;

/// What a parser knows about the member it is reading.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub category: Category,
    pub file_name: String,
    /// Partially supported versions only keep the structure field.
    pub structure_only: bool,
}

impl ParseContext {
    pub fn new(category: Category, file_name: &str) -> Self {
        Self {
            category,
            file_name: file_name.to_string(),
            structure_only: false,
        }
    }

    pub fn structure_only(mut self, structure_only: bool) -> Self {
        self.structure_only = structure_only;
        self
    }

    pub fn error(&self, line: Option<u64>, reason: impl Into<String>) -> RecordError {
        RecordError {
            file: self.file_name.clone(),
            line,
            reason: reason.into(),
        }
    }

    /// Applies the record invariants shared by every format: a non-empty
    /// structure, a fallback `file:line` identifier, reaction roles, and the
    /// `source_file` provenance field.
    pub fn finish(
        &self,
        line: Option<u64>,
        id: Option<&str>,
        structure: Option<&str>,
        mut metadata: Metadata,
    ) -> RecordResult {
        let raw = structure.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(self.error(line, "missing structure"));
        }
        if self.structure_only {
            metadata.clear();
        }

        let (structure, extension) = match raw.split_once(char::is_whitespace) {
            Some((smiles, rest)) => (smiles, Some(rest.trim())),
            None => (raw, None),
        };
        if let Some(extension) = extension.filter(|ext| !ext.is_empty()) {
            metadata.insert("cxsmiles_extension".to_string(), extension.to_string());
        }

        let roles = match self.category {
            Category::Reaction => ReactionRoles::split(structure),
            Category::Compound => None,
        };
        let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => match line {
                Some(line) => format!("{}:{line}", self.file_name),
                None => self.file_name.clone(),
            },
        };
        metadata.insert("source_file".to_string(), self.file_name.clone());

        Ok(StandardizedRecord {
            id,
            structure: structure.to_string(),
            roles,
            metadata,
        })
    }
}

/// Parser wiring of a retrieval step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParserSpec {
    Delimited(DelimitedConfig),
    StructureData(StructureDataConfig),
    ReactionSmiles(ReactionSmilesConfig),
    JsonLines(JsonLinesConfig),
    Xml(XmlConfig),
}

impl ParserSpec {
    pub fn name(&self) -> &'static str {
        match self {
            ParserSpec::Delimited(_) => "delimited",
            ParserSpec::StructureData(_) => "structure_data",
            ParserSpec::ReactionSmiles(_) => "reaction_smiles",
            ParserSpec::JsonLines(_) => "json_lines",
            ParserSpec::Xml(_) => "xml",
        }
    }

    pub fn parse<'a>(&'a self, input: Box<dyn BufRead + 'a>, context: ParseContext) -> RecordStream<'a> {
        match self {
            ParserSpec::Delimited(config) => delimited::parse(config, input, context),
            ParserSpec::StructureData(config) => sdf::parse(config, input, context),
            ParserSpec::ReactionSmiles(config) => reaction_smiles::parse(config, input, context),
            ParserSpec::JsonLines(config) => markup::parse_json_lines(config, input, context),
            ParserSpec::Xml(config) => markup::parse_xml(config, input, context),
        }
    }
}

/// Numbered lines of a stream. Invalid UTF-8 is reported for that line only;
/// an I/O error is reported once and ends the iteration.
pub(crate) struct NumberedLines<R> {
    reader: R,
    line: u64,
    done: bool,
}

impl<R: BufRead> NumberedLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for NumberedLines<R> {
    type Item = (u64, Result<String, String>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line += 1;
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let text = String::from_utf8(buf).map_err(|_| "invalid UTF-8".to_string());
                Some((self.line, text))
            }
            Err(err) => {
                self.done = true;
                Some((self.line + 1, Err(err.to_string())))
            }
        }
    }
}
