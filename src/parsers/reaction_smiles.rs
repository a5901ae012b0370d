use std::io::BufRead;

use serde::Serialize;

use super::{Metadata, NumberedLines, ParseContext, RecordStream};

/// One reaction SMILES per line, optionally followed by whitespace separated
/// fields (atom-mapping edits, patent numbers, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSmilesConfig {
    pub skip_lines: usize,
    /// Names of the trailing fields in order; unnamed extras become `field_{n}`.
    pub trailing_fields: Vec<String>,
    /// Trailing field used as the record identifier.
    pub id_field: Option<String>,
}

impl ReactionSmilesConfig {
    pub fn new() -> Self {
        Self {
            skip_lines: 0,
            trailing_fields: Vec::new(),
            id_field: None,
        }
    }

    pub fn skip_lines(mut self, skip_lines: usize) -> Self {
        self.skip_lines = skip_lines;
        self
    }

    pub fn trailing(mut self, fields: &[&str]) -> Self {
        self.trailing_fields = fields.iter().map(|field| field.to_string()).collect();
        self
    }

    pub fn id_field(mut self, field: &str) -> Self {
        self.id_field = Some(field.to_string());
        self
    }
}

impl Default for ReactionSmilesConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse<'a>(
    config: &'a ReactionSmilesConfig,
    input: Box<dyn BufRead + 'a>,
    context: ParseContext,
) -> RecordStream<'a> {
    let lines = NumberedLines::new(input)
        .skip(config.skip_lines)
        .filter(|(_, text)| text.as_ref().map(|t| !t.trim().is_empty()).unwrap_or(true));

    Box::new(lines.map(move |(line, text)| {
        let text = text.map_err(|reason| context.error(Some(line), reason))?;
        let mut tokens = text.split_whitespace();
        let mut structure = tokens.next().unwrap_or_default().to_string();
        let mut rest: Vec<&str> = tokens.collect();

        // CXSMILES extension directly after the reaction SMILES
        if rest.first().is_some_and(|token| token.starts_with('|')) {
            if let Some(end) = rest.iter().position(|token| token.ends_with('|')) {
                let extension = rest.drain(..=end).collect::<Vec<_>>().join(" ");
                structure = format!("{structure} {extension}");
            }
        }

        let mut metadata = Metadata::new();
        for (index, value) in rest.iter().enumerate() {
            let name = config
                .trailing_fields
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("field_{}", index + 1));
            metadata.insert(name, value.to_string());
        }
        let id = config
            .id_field
            .as_ref()
            .and_then(|field| metadata.remove(field));

        context.finish(Some(line), id.as_deref(), Some(&structure), metadata)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use crate::parsers::RecordResult;

    fn run(config: &ReactionSmilesConfig, data: &'static str) -> Vec<RecordResult> {
        let context = ParseContext::new(Category::Reaction, "train.txt");
        super::parse(config, Box::new(data.as_bytes()), context).collect()
    }

    #[test]
    fn lines_with_trailing_edits() {
        let config = ReactionSmilesConfig::new().trailing(&["edits"]);
        let data = "[CH3:1][OH:2].[Na+]>>[CH3:1][O-:2] 1-2-0.0\n\n[C:1]>>[C:1]=O 1-3-1.0;2-3-0.0\n";
        let results = run(&config, data);
        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, "train.txt:1");
        assert_eq!(first.metadata["edits"], "1-2-0.0");
        assert_eq!(first.roles.as_ref().unwrap().reactants, "[CH3:1][OH:2].[Na+]");
        assert_eq!(results[1].as_ref().unwrap().id, "train.txt:3");
    }

    #[test]
    fn header_lines_are_skipped() {
        let config = ReactionSmilesConfig::new().skip_lines(1);
        let results = run(&config, "reactants>reagents>production\nCC>>CC\n");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().id, "train.txt:2");
    }

    #[test]
    fn cxsmiles_extension_and_id_field() {
        let config = ReactionSmilesConfig::new().trailing(&["patent"]).id_field("patent");
        let results = run(&config, "CC.O>>CCO |f:0.1| US123\n");
        let record = results[0].as_ref().unwrap();
        assert_eq!(record.id, "US123");
        assert_eq!(record.structure, "CC.O>>CCO");
        assert_eq!(record.metadata["cxsmiles_extension"], "|f:0.1|");
        assert!(!record.metadata.contains_key("patent"));
    }

    #[test]
    fn unnamed_fields_and_bad_lines() {
        let config = ReactionSmilesConfig::new();
        let data: &'static [u8] = b"CC>>CC a b\n\xff>>C\nO>>O\n";
        let context = ParseContext::new(Category::Reaction, "x.txt");
        let results: Vec<_> = super::parse(&config, Box::new(data), context).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().metadata["field_2"], "b");
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
