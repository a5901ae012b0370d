use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::app::{FetchResult, ProgressEvent, ProgressSink};
use crate::domain::Category;
use crate::error::KiraError;
use crate::parsers::StandardizedRecord;
use crate::query::{SourceInfo, SourceSummary};
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sources(result: &[SourceSummary]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_info(result: &SourceInfo) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive runs.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "{cyan}>{reset} {} ({:.1}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => eprintln!("{cyan}>{reset} {}", event.message),
        }
    }
}

const COMPOUND_HEADER: [&str; 3] = ["id", "smiles", "metadata"];
const REACTION_HEADER: [&str; 6] = [
    "id",
    "reaction_smiles",
    "reactants",
    "agents",
    "products",
    "metadata",
];

/// Streams standardized records into the dataset CSV.
///
/// Rows go to a staging file next to the destination; `finish` moves it into
/// place. A writer dropped without `finish` leaves nothing behind.
pub struct RecordWriter {
    category: Category,
    destination: Utf8PathBuf,
    writer: csv::Writer<NamedTempFile>,
    written: u64,
}

impl RecordWriter {
    pub fn create(destination: &Utf8Path, category: Category) -> Result<Self, KiraError> {
        let staging = Store::staging_file(destination)?;
        let mut writer = csv::Writer::from_writer(staging);
        let header: &[&str] = match category {
            Category::Compound => &COMPOUND_HEADER,
            Category::Reaction => &REACTION_HEADER,
        };
        writer.write_record(header).map_err(csv_error)?;
        Ok(Self {
            category,
            destination: destination.to_path_buf(),
            writer,
            written: 0,
        })
    }

    pub fn write(&mut self, record: &StandardizedRecord) -> Result<(), KiraError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        match self.category {
            Category::Compound => self
                .writer
                .write_record([record.id.as_str(), record.structure.as_str(), metadata.as_str()]),
            Category::Reaction => {
                let (reactants, agents, products) = match &record.roles {
                    Some(roles) => (
                        roles.reactants.as_str(),
                        roles.agents.as_str(),
                        roles.products.as_str(),
                    ),
                    None => ("", "", ""),
                };
                self.writer.write_record([
                    record.id.as_str(),
                    record.structure.as_str(),
                    reactants,
                    agents,
                    products,
                    metadata.as_str(),
                ])
            }
        }
        .map_err(csv_error)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Persists the file when at least one record was written and returns its
    /// path. An empty dataset is discarded.
    pub fn finish(self) -> Result<Option<Utf8PathBuf>, KiraError> {
        let staging = self
            .writer
            .into_inner()
            .map_err(|err| KiraError::Filesystem(err.error().to_string()))?;
        if self.written == 0 {
            return Ok(None);
        }
        Store::persist(staging, &self.destination)?;
        Ok(Some(self.destination))
    }
}

fn csv_error(err: csv::Error) -> KiraError {
    KiraError::Filesystem(format!("write dataset: {err}"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::parsers::{Metadata, ReactionRoles};

    fn record(id: &str, structure: &str) -> StandardizedRecord {
        let mut metadata = Metadata::new();
        metadata.insert("source_file".to_string(), "data.tsv".to_string());
        StandardizedRecord {
            id: id.to_string(),
            structure: structure.to_string(),
            roles: ReactionRoles::split(structure),
            metadata,
        }
    }

    fn root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn reaction_rows_carry_roles_and_json_metadata() {
        let (_temp, root) = root();
        let destination = root.join("reaction/rhea/out.csv");
        let mut writer = RecordWriter::create(&destination, Category::Reaction).unwrap();
        writer.write(&record("10000", "CC.O>[Na+]>CCO")).unwrap();
        writer.write(&record("10001", "not-a-reaction")).unwrap();
        assert_eq!(writer.written(), 2);
        let path = writer.finish().unwrap().unwrap();

        let content = fs::read_to_string(path.as_std_path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "id,reaction_smiles,reactants,agents,products,metadata"
        );
        assert_eq!(
            lines[1],
            r#"10000,CC.O>[Na+]>CCO,CC.O,[Na+],CCO,"{""source_file"":""data.tsv""}""#
        );
        assert!(lines[2].starts_with("10001,not-a-reaction,,,,"));
    }

    #[test]
    fn compound_header() {
        let (_temp, root) = root();
        let destination = root.join("compound/zinc/out.csv");
        let mut writer = RecordWriter::create(&destination, Category::Compound).unwrap();
        writer.write(&record("ZINC1", "CCO")).unwrap();
        writer.finish().unwrap();
        let content = fs::read_to_string(destination.as_std_path()).unwrap();
        assert!(content.starts_with("id,smiles,metadata\nZINC1,CCO,"));
    }

    #[test]
    fn empty_dataset_is_discarded() {
        let (_temp, root) = root();
        let destination = root.join("compound/chembl/out.csv");
        let writer = RecordWriter::create(&destination, Category::Compound).unwrap();
        assert_eq!(writer.finish().unwrap(), None);
        assert!(!destination.exists());
        let leftovers = fs::read_dir(root.join("compound/chembl").as_std_path())
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }
}
