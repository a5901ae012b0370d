use std::io::BufRead;
use std::iter;

use serde::Serialize;

use super::{Metadata, NumberedLines, ParseContext, RecordResult, RecordStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// A single ASCII delimiter character, quoted fields allowed.
    Char(char),
    /// Runs of spaces or tabs, no quoting.
    Whitespace,
}

/// Where the structure value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureColumns {
    /// First column present out of the candidates.
    Single(Vec<String>),
    /// `reactants>>products` assembled from two columns.
    Composed { reactants: String, products: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelimitedConfig {
    pub delimiter: Delimiter,
    pub skip_lines: usize,
    pub has_header: bool,
    /// Column names for files without a header row.
    pub columns: Vec<String>,
    pub id_columns: Vec<String>,
    pub structure: StructureColumns,
    /// Columns left out of the metadata block.
    pub drop_columns: Vec<String>,
}

impl DelimitedConfig {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            skip_lines: 0,
            has_header: true,
            columns: Vec::new(),
            id_columns: Vec::new(),
            structure: StructureColumns::Single(vec!["smiles".to_string()]),
            drop_columns: Vec::new(),
        }
    }

    pub fn comma() -> Self {
        Self::new(Delimiter::Char(','))
    }

    pub fn tab() -> Self {
        Self::new(Delimiter::Char('\t'))
    }

    pub fn whitespace() -> Self {
        Self::new(Delimiter::Whitespace)
    }

    pub fn skip_lines(mut self, skip_lines: usize) -> Self {
        self.skip_lines = skip_lines;
        self
    }

    pub fn headerless(mut self, columns: &[&str]) -> Self {
        self.has_header = false;
        self.columns = to_strings(columns);
        self
    }

    pub fn id(mut self, candidates: &[&str]) -> Self {
        self.id_columns = to_strings(candidates);
        self
    }

    pub fn structure(mut self, candidates: &[&str]) -> Self {
        self.structure = StructureColumns::Single(to_strings(candidates));
        self
    }

    pub fn composed(mut self, reactants: &str, products: &str) -> Self {
        self.structure = StructureColumns::Composed {
            reactants: reactants.to_string(),
            products: products.to_string(),
        };
        self
    }

    pub fn drop(mut self, columns: &[&str]) -> Self {
        self.drop_columns = to_strings(columns);
        self
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[derive(Clone, Copy)]
enum StructureIndex {
    Single(usize),
    Composed(usize, usize),
}

/// Header-driven column lookup, built once per file.
struct ColumnMapping {
    names: Vec<String>,
    id: Option<usize>,
    structure: StructureIndex,
    metadata: Vec<usize>,
}

impl ColumnMapping {
    fn new(header: Vec<String>, config: &DelimitedConfig) -> Result<Self, String> {
        let position = |name: &str| header.iter().position(|column| column.trim() == name);
        let id = config.id_columns.iter().find_map(|name| position(name));
        let structure = match &config.structure {
            StructureColumns::Single(candidates) => candidates
                .iter()
                .find_map(|name| position(name))
                .map(StructureIndex::Single)
                .ok_or_else(|| {
                    format!("header has no structure column (expected one of {})", candidates.join(", "))
                })?,
            StructureColumns::Composed { reactants, products } => {
                match (position(reactants), position(products)) {
                    (Some(r), Some(p)) => StructureIndex::Composed(r, p),
                    _ => return Err(format!("header lacks {reactants} and {products} columns")),
                }
            }
        };
        let used = |index: usize| {
            Some(index) == id
                || match structure {
                    StructureIndex::Single(s) => s == index,
                    StructureIndex::Composed(r, p) => r == index || p == index,
                }
        };
        let metadata = (0..header.len())
            .filter(|&index| !used(index))
            .filter(|&index| !config.drop_columns.iter().any(|name| header[index].trim() == name))
            .collect();
        Ok(Self {
            names: header,
            id,
            structure,
            metadata,
        })
    }

    fn record(&self, context: &ParseContext, line: Option<u64>, fields: &[&str]) -> RecordResult {
        let field = |index: usize| fields.get(index).map(|value| value.trim()).filter(|v| !v.is_empty());
        let composed;
        let structure = match self.structure {
            StructureIndex::Single(index) => field(index),
            StructureIndex::Composed(r, p) => match (field(r), field(p)) {
                (Some(reactants), Some(products)) => {
                    composed = format!("{reactants}>>{products}");
                    Some(composed.as_str())
                }
                _ => None,
            },
        };

        let mut metadata = Metadata::new();
        for &index in &self.metadata {
            if let Some(value) = field(index) {
                metadata.insert(self.names[index].trim().to_string(), value.to_string());
            }
        }
        for (index, value) in fields.iter().enumerate().skip(self.names.len()) {
            if !value.trim().is_empty() {
                metadata.insert(format!("column_{}", index + 1), value.trim().to_string());
            }
        }

        context.finish(line, self.id.and_then(field), structure, metadata)
    }
}

pub(crate) fn parse<'a>(
    config: &'a DelimitedConfig,
    input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    match config.delimiter {
        Delimiter::Char(delimiter) => parse_quoted(config, delimiter, input, context),
        Delimiter::Whitespace => parse_whitespace(config, input, context),
    }
}

fn parse_quoted<'a>(
    config: &'a DelimitedConfig,
    delimiter: char,
    mut input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    let mut discarded = Vec::new();
    for _ in 0..config.skip_lines {
        discarded.clear();
        if let Err(err) = input.read_until(b'\n', &mut discarded) {
            return Box::new(iter::once(Err(context.error(None, err.to_string()))));
        }
    }
    let offset = config.skip_lines as u64;

    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut rows = reader.into_byte_records();

    let header = if config.has_header {
        match rows.next() {
            Some(Ok(row)) => row
                .iter()
                .map(|name| String::from_utf8_lossy(name).trim_start_matches('\u{feff}').to_string())
                .collect(),
            Some(Err(err)) => return Box::new(iter::once(Err(context.error(Some(offset + 1), err.to_string())))),
            None => return Box::new(iter::empty()),
        }
    } else {
        config.columns.clone()
    };
    let mapping = match ColumnMapping::new(header, config) {
        Ok(mapping) => mapping,
        Err(reason) => return Box::new(iter::once(Err(context.error(Some(offset + 1), reason)))),
    };

    Box::new(rows.map(move |row| {
        let row = row.map_err(|err| {
            let line = err.position().map(|pos| pos.line() + offset);
            context.error(line, err.to_string())
        })?;
        let line = row.position().map(|pos| pos.line() + offset);
        let fields = row
            .iter()
            .map(std::str::from_utf8)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| context.error(line, "invalid UTF-8"))?;
        mapping.record(&context, line, &fields)
    }))
}

fn parse_whitespace<'a>(
    config: &'a DelimitedConfig,
    input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    let mut lines = NumberedLines::new(input)
        .skip(config.skip_lines)
        .filter(|(_, text)| text.as_ref().map(|t| !t.trim().is_empty()).unwrap_or(true));

    let header = if config.has_header {
        match lines.next() {
            Some((_, Ok(text))) => text.split_whitespace().map(str::to_string).collect(),
            Some((line, Err(reason))) => return Box::new(iter::once(Err(context.error(Some(line), reason)))),
            None => return Box::new(iter::empty()),
        }
    } else {
        config.columns.clone()
    };
    let mapping = match ColumnMapping::new(header, config) {
        Ok(mapping) => mapping,
        Err(reason) => return Box::new(iter::once(Err(context.error(None, reason)))),
    };

    Box::new(lines.map(move |(line, text)| {
        let text = text.map_err(|reason| context.error(Some(line), reason))?;
        let fields: Vec<&str> = text.split_whitespace().collect();
        mapping.record(&context, Some(line), &fields)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use crate::parsers::StandardizedRecord;

    fn run(config: &DelimitedConfig, category: Category, data: &'static str) -> Vec<RecordResult> {
        let context = ParseContext::new(category, "sample.csv");
        super::parse(config, Box::new(data.as_bytes()), context).collect()
    }

    fn ok(results: &[RecordResult]) -> Vec<&StandardizedRecord> {
        results.iter().filter_map(|r| r.as_ref().ok()).collect()
    }

    #[test]
    fn header_driven_columns_with_metadata() {
        let config = DelimitedConfig::comma().structure(&["SMILES"]);
        let results = run(
            &config,
            Category::Compound,
            "SMILES,SPLIT\nCCO,train\n,test\nc1ccccc1,test\n",
        );
        assert_eq!(results.len(), 3);
        let records = ok(&results);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "sample.csv:2");
        assert_eq!(records[0].structure, "CCO");
        assert_eq!(records[0].metadata["SPLIT"], "train");
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn tab_file_with_id_column() {
        let config = DelimitedConfig::tab()
            .id(&["chembl_id"])
            .structure(&["canonical_smiles"]);
        let data = "chembl_id\tcanonical_smiles\tstandard_inchi_key\n\
                    CHEMBL6329\tCc1cc(cn1C)\tOWRSAHYFSSNENM-UHFFFAOYSA-N\n\
                    CHEMBL6328\t\tXYZ\n";
        let results = run(&config, Category::Compound, data);
        let records = ok(&results);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "CHEMBL6329");
        assert_eq!(records[0].metadata["standard_inchi_key"], "OWRSAHYFSSNENM-UHFFFAOYSA-N");
        assert!(!records[0].metadata.contains_key("chembl_id"));
    }

    #[test]
    fn skipped_preamble_and_quoted_fields() {
        let config = DelimitedConfig::comma()
            .skip_lines(2)
            .id(&["id"])
            .structure(&["rxn_smiles"])
            .drop(&[""]);
        let data = "# generated\n# by hand\n,id,rxn_smiles\n0,US1,\"CC>>CCO\"\n1,US2,\"C,C\"\n";
        let results = run(&config, Category::Reaction, data);
        let records = ok(&results);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "US1");
        assert_eq!(records[0].roles.as_ref().unwrap().products, "CCO");
        assert!(records[1].roles.is_none());
        assert_eq!(records[0].metadata.len(), 1);
    }

    #[test]
    fn composed_reaction_columns() {
        let config = DelimitedConfig::comma().id(&["idx"]).composed("rsmi", "psmi");
        let data = "idx,rsmi,psmi,ea\n0,[C:1],[C:1]=O,85.1\n1,[C:1],,12.0\n";
        let results = run(&config, Category::Reaction, data);
        assert_eq!(results.len(), 2);
        let record = results[0].as_ref().unwrap();
        assert_eq!(record.structure, "[C:1]>>[C:1]=O");
        assert_eq!(record.metadata["ea"], "85.1");
        assert!(results[1].is_err());
    }

    #[test]
    fn missing_structure_column_is_a_single_error() {
        let config = DelimitedConfig::comma().structure(&["smiles"]);
        let results = run(&config, Category::Compound, "name,weight\na,1\nb,2\n");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn headerless_tab_file() {
        let config = DelimitedConfig::tab()
            .headerless(&["id", "reaction_smiles"])
            .id(&["id"])
            .structure(&["reaction_smiles"]);
        let data = "10000\tCC>>CC\n10001\n10002\tO>>O\n";
        let results = run(&config, Category::Reaction, data);
        assert_eq!(results.len(), 3);
        assert_eq!(ok(&results).len(), 2);
        assert_eq!(results[2].as_ref().unwrap().id, "10002");
    }

    #[test]
    fn whitespace_delimited_smiles() {
        let config = DelimitedConfig::whitespace()
            .headerless(&["smiles", "id"])
            .id(&["id"])
            .structure(&["smiles"]);
        let data = "C1CCCCC1   ZINC000001\n\n   \nNCC(=O)O ZINC000002 extra\n";
        let results = run(&config, Category::Compound, data);
        let records = ok(&results);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "ZINC000001");
        assert_eq!(records[1].metadata["column_3"], "extra");
        assert_eq!(results.len(), 2);
    }
}
