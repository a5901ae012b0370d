use std::io::BufRead;

use serde::Serialize;

use super::{Metadata, NumberedLines, ParseContext, RecordResult, RecordStream};

const RECORD_TERMINATOR: &str = "$$$$";

/// Structure-data blocks: a header block followed by `> <NAME>` property
/// sections, each record closed by `$$$$`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureDataConfig {
    /// Properties holding the SMILES, first present wins.
    pub structure_properties: Vec<String>,
    /// Property holding the identifier; the title line is used otherwise.
    pub id_property: Option<String>,
}

impl StructureDataConfig {
    pub fn new(structure_properties: &[&str]) -> Self {
        Self {
            structure_properties: structure_properties.iter().map(|p| p.to_string()).collect(),
            id_property: None,
        }
    }

    pub fn id_property(mut self, property: &str) -> Self {
        self.id_property = Some(property.to_string());
        self
    }
}

struct Block {
    start: u64,
    lines: Vec<String>,
}

pub(crate) fn parse<'a>(
    config: &'a StructureDataConfig,
    input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    let mut lines = NumberedLines::new(input);
    let mut finished = false;

    Box::new(std::iter::from_fn(move || {
        if finished {
            return None;
        }
        let mut block: Option<Block> = None;
        let mut broken: Option<(u64, String)> = None;
        loop {
            match lines.next() {
                None => {
                    finished = true;
                    let block = block.filter(|b| b.lines.iter().any(|l| !l.trim().is_empty()))?;
                    return Some(Err(context.error(Some(block.start), "unterminated record")));
                }
                Some((line, Ok(text))) => {
                    if text.trim_end() == RECORD_TERMINATOR {
                        let start = block.as_ref().map(|b| b.start).unwrap_or(line);
                        if let Some((line, reason)) = broken {
                            return Some(Err(context.error(Some(line), reason)));
                        }
                        let lines = block.map(|b| b.lines).unwrap_or_default();
                        return Some(record(config, &context, start, &lines));
                    }
                    block
                        .get_or_insert_with(|| Block { start: line, lines: Vec::new() })
                        .lines
                        .push(text);
                }
                Some((line, Err(reason))) => {
                    block.get_or_insert_with(|| Block { start: line, lines: Vec::new() });
                    broken.get_or_insert((line, reason));
                }
            }
        }
    }))
}

fn record(config: &StructureDataConfig, context: &ParseContext, start: u64, lines: &[String]) -> RecordResult {
    let title = lines.first().map(|line| line.trim()).filter(|t| !t.is_empty());
    let properties = properties(lines);

    let structure = config
        .structure_properties
        .iter()
        .find_map(|name| properties.get(name))
        .map(String::as_str);
    let id = match &config.id_property {
        Some(name) => properties.get(name).map(String::as_str),
        None => title,
    };

    let mut metadata = Metadata::new();
    for (name, value) in &properties {
        let is_structure = config.structure_properties.contains(name);
        let is_id = config.id_property.as_ref() == Some(name);
        if !is_structure && !is_id && !value.is_empty() {
            metadata.insert(name.clone(), value.clone());
        }
    }
    if config.id_property.is_some() {
        if let Some(title) = title {
            metadata.insert("title".to_string(), title.to_string());
        }
    }

    context.finish(Some(start), id, structure, metadata)
}

/// Collects `> <NAME>` sections; values run until the next blank line.
fn properties(lines: &[String]) -> Metadata {
    let mut properties = Metadata::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in lines {
        if line.starts_with('>') {
            if let Some((name, values)) = current.take() {
                properties.insert(name, values.join("\n"));
            }
            current = property_name(line).map(|name| (name.to_string(), Vec::new()));
            continue;
        }
        if line.trim().is_empty() {
            if let Some((name, values)) = current.take() {
                properties.insert(name, values.join("\n"));
            }
            continue;
        }
        if let Some((_, values)) = current.as_mut() {
            values.push(line.trim_end());
        }
    }
    if let Some((name, values)) = current {
        properties.insert(name, values.join("\n"));
    }
    properties
}

fn property_name(line: &str) -> Option<&str> {
    let start = line.find('<')? + 1;
    let end = start + line[start..].find('>')?;
    let name = line[start..end].trim();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;

    const SAMPLE: &str = "\
aspirin
  RDKit          2D

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
> <SMILES>
CC(=O)Oc1ccccc1C(=O)O

> <MW>
180.16

$$$$
no-smiles
M  END
> <MW>
1.0

$$$$

M  END
> <SMILES>
c1ccccc1

$$$$
";

    fn run(config: &StructureDataConfig, data: &'static str) -> Vec<RecordResult> {
        let context = ParseContext::new(Category::Compound, "set.sdf");
        super::parse(config, Box::new(data.as_bytes()), context).collect()
    }

    #[test]
    fn blocks_with_property_sections() {
        let config = StructureDataConfig::new(&["SMILES"]);
        let results = run(&config, SAMPLE);
        assert_eq!(results.len(), 3);

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, "aspirin");
        assert_eq!(first.structure, "CC(=O)Oc1ccccc1C(=O)O");
        assert_eq!(first.metadata["MW"], "180.16");

        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.line, Some(13));

        let third = results[2].as_ref().unwrap();
        assert_eq!(third.id, "set.sdf:19");
    }

    #[test]
    fn id_from_property_keeps_title() {
        let config = StructureDataConfig::new(&["SMILES"]).id_property("MW");
        let results = run(&config, SAMPLE);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, "180.16");
        assert_eq!(first.metadata["title"], "aspirin");
    }

    #[test]
    fn unterminated_trailing_block() {
        let config = StructureDataConfig::new(&["SMILES"]);
        let results = run(&config, "x\n> <SMILES>\nC\n\n$$$$\ny\n> <SMILES>\nCC\n");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().reason, "unterminated record");
    }

    #[test]
    fn property_name_parsing() {
        assert_eq!(property_name(">  <PUBCHEM_ID>  (1)"), Some("PUBCHEM_ID"));
        assert_eq!(property_name("> <>"), None);
    }
}
