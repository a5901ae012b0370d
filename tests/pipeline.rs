use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use kira_chemdata_manager::app::{
    App, CancelToken, FetchOptions, PipelineStatus, ProgressEvent, ProgressSink,
};
use kira_chemdata_manager::domain::{Category, DatasetRequest};
use kira_chemdata_manager::error::KiraError;
use kira_chemdata_manager::output::JsonOutput;
use kira_chemdata_manager::parsers::{ParserSpec, ReactionSmilesConfig};
use kira_chemdata_manager::plan::{ArchiveFormat, StepTemplate};
use kira_chemdata_manager::registry::{SourceDescriptor, SourceRegistry};
use kira_chemdata_manager::store::Store;
use kira_chemdata_manager::transport::Transport;
use kira_chemdata_manager::version::VersionPattern;

#[derive(Default)]
struct MockTransport {
    files: HashMap<String, Vec<u8>>,
    json: HashMap<String, Value>,
    downloads: Mutex<Vec<String>>,
}

impl MockTransport {
    fn with_file(mut self, url: &str, content: &[u8]) -> Self {
        self.files.insert(url.to_string(), content.to_vec());
        self
    }

    fn with_json(mut self, url: &str, value: Value) -> Self {
        self.json.insert(url.to_string(), value);
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, KiraError> {
        self.downloads.lock().unwrap().push(url.to_string());
        let content = self.files.get(url).ok_or(KiraError::HttpStatus {
            status: 404,
            message: url.to_string(),
        })?;
        fs::write(destination, content).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(content.len() as u64)
    }

    fn fetch_json(&self, url: &str) -> Result<Value, KiraError> {
        self.json
            .get(url)
            .cloned()
            .ok_or_else(|| KiraError::Http(format!("no response for {url}")))
    }
}

fn lines() -> ParserSpec {
    ParserSpec::ReactionSmiles(ReactionSmilesConfig::new())
}

fn registry() -> SourceRegistry {
    let three_steps = VersionPattern::literal("v_three_steps")
        .step(StepTemplate::direct("https://example.org/a.txt", "a.txt", lines()))
        .step(StepTemplate::direct("https://example.org/missing.txt", "missing.txt", lines()))
        .step(StepTemplate::direct("https://example.org/c.txt", "c.txt", lines()));
    let archived = VersionPattern::literal("v_archived").step(
        StepTemplate::indirect(
            "https://example.org/api/folder",
            "/download_url",
            "set.zip",
            lines(),
        )
        .archive(ArchiveFormat::Zip)
        .members(&["data/train.txt", "data/test.txt"]),
    );
    let broken = VersionPattern::literal("v_broken")
        .step(StepTemplate::direct("https://example.org/missing.txt", "missing.txt", lines()));

    let mut registry = SourceRegistry::new();
    registry
        .register(
            SourceDescriptor::new(Category::Reaction, "sample", "Sample reactions", "10.1000/sample")
                .pattern(three_steps)
                .pattern(archived)
                .pattern(broken),
        )
        .unwrap();
    registry
}

fn transport() -> MockTransport {
    MockTransport::default()
        .with_file("https://example.org/a.txt", b"CC>>CC\nCO>>C=O\n")
        .with_file("https://example.org/c.txt", b"N>>N\n")
}

fn store(root: &Path) -> Store {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    Store::new_with_paths(root.join("out"), root.join("cache"))
}

fn request(version: &str) -> DatasetRequest {
    DatasetRequest::new(Category::Reaction, "sample", version)
}

#[test]
fn failing_step_is_reported_and_siblings_are_kept() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport());

    let result = app
        .execute(
            &request("v_three_steps"),
            &FetchOptions::default(),
            &CancelToken::new(),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Partial);
    assert_eq!(result.steps_attempted, 3);
    assert_eq!(result.steps_failed.len(), 1);
    assert_eq!(result.steps_failed[0].index, 1);
    assert!(result.steps_failed[0].reason.contains("404"));
    assert_eq!(result.records_written, 3);

    let output = result.output_path.unwrap();
    let content = fs::read_to_string(&output).unwrap();
    let structures: Vec<_> = content
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(structures, vec!["CC>>CC", "CO>>C=O", "N>>N"]);
    assert!(Path::new(&result.metadata_path.unwrap()).exists());
}

#[test]
fn no_successful_step_marks_the_result_failed() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport());

    let result = app
        .execute(
            &request("v_broken"),
            &FetchOptions::default(),
            &CancelToken::new(),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.records_written, 0);
    assert_eq!(result.output_path, None);
}

#[test]
fn cached_downloads_are_reused_unless_forced() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport());
    let cancel = CancelToken::new();

    app.execute(&request("v_three_steps"), &FetchOptions::default(), &cancel, &JsonOutput)
        .unwrap();
    assert_eq!(app_downloads(&app), 3);

    app.execute(&request("v_three_steps"), &FetchOptions::default(), &cancel, &JsonOutput)
        .unwrap();
    // only the failing step goes back to the network
    assert_eq!(app_downloads(&app), 4);

    let forced = FetchOptions {
        force: true,
        no_cache: false,
    };
    app.execute(&request("v_three_steps"), &forced, &cancel, &JsonOutput)
        .unwrap();
    assert_eq!(app_downloads(&app), 7);
}

#[test]
fn no_cache_leaves_the_cache_empty() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let store = store(temp.path());
    let cache_root = store.cache_root().to_path_buf();
    let app = App::new(&registry, store, transport());
    let options = FetchOptions {
        force: false,
        no_cache: true,
    };

    let result = app
        .execute(&request("v_three_steps"), &options, &CancelToken::new(), &JsonOutput)
        .unwrap();
    assert_eq!(result.records_written, 3);
    assert!(!cache_root.join("downloads").exists());
}

#[test]
fn indirect_archive_members_are_parsed_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let mut archive = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut archive));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("data/test.txt", options).unwrap();
        writer.write_all(b"O>>O\n").unwrap();
        writer.start_file("data/train.txt", options).unwrap();
        writer.write_all(b"C>>C\n\xff\xfe>>C\n").unwrap();
        writer.finish().unwrap();
    }
    let transport = MockTransport::default()
        .with_json(
            "https://example.org/api/folder",
            json!({ "download_url": "https://example.org/files/set.zip" }),
        )
        .with_file("https://example.org/files/set.zip", &archive);
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport);

    let result = app
        .execute(
            &request("v_archived"),
            &FetchOptions::default(),
            &CancelToken::new(),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Completed);
    assert_eq!(result.records_written, 2);
    assert_eq!(result.record_failures.len(), 1);
    assert_eq!(result.record_failures[0].file, "data/train.txt");
    assert_eq!(result.record_failures[0].line, Some(2));

    let content = fs::read_to_string(result.output_path.unwrap()).unwrap();
    let ids: Vec<_> = content
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(ids, vec!["data/train.txt:1", "data/test.txt:1"]);
}

#[test]
fn cancelled_before_start_attempts_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport());
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = app
        .execute(&request("v_three_steps"), &FetchOptions::default(), &cancel, &JsonOutput)
        .unwrap();
    assert!(result.cancelled);
    assert_eq!(result.steps_attempted, 0);
    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(app_downloads(&app), 0);
}

/// Cancels the run once the first step reports completion.
struct CancelAfterFirstStep {
    cancel: CancelToken,
}

impl ProgressSink for CancelAfterFirstStep {
    fn event(&self, event: ProgressEvent) {
        if event.message.starts_with("step 1/") {
            self.cancel.cancel();
        }
    }
}

#[test]
fn cancelled_between_steps_keeps_finished_work() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport());
    let cancel = CancelToken::new();
    let sink = CancelAfterFirstStep {
        cancel: cancel.clone(),
    };

    let result = app
        .execute(&request("v_three_steps"), &FetchOptions::default(), &cancel, &sink)
        .unwrap();
    assert!(result.cancelled);
    assert_eq!(result.steps_attempted, 1);
    assert!(result.steps_failed.is_empty());
    assert_eq!(result.status, PipelineStatus::Partial);
    assert_eq!(result.records_written, 2);
    assert_eq!(app_downloads(&app), 1);

    let content = fs::read_to_string(result.output_path.unwrap()).unwrap();
    let structures: Vec<_> = content
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(structures, vec!["CC>>CC", "CO>>C=O"]);
}

#[test]
fn user_errors_abort_before_any_download() {
    let temp = tempfile::tempdir().unwrap();
    let registry = registry();
    let app = App::new(&registry, store(temp.path()), transport());

    let requests = vec![
        request("v_three_steps"),
        DatasetRequest::new(Category::Reaction, "unknown", "v_1"),
    ];
    let err = app
        .fetch(&requests, &FetchOptions::default(), &CancelToken::new(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, KiraError::UnknownSource { .. });

    let err = app
        .execute(
            &request("v_four_steps"),
            &FetchOptions::default(),
            &CancelToken::new(),
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, KiraError::UnsupportedVersion { ref version, .. } if version == "v_four_steps");
    assert_eq!(app_downloads(&app), 0);
}

fn app_downloads(app: &App<'_, MockTransport>) -> usize {
    app.transport().download_count()
}
