use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{Category, DatasetRequest};
use crate::error::KiraError;
use crate::fs_util::{self, ExtractedMember};
use crate::output::RecordWriter;
use crate::parsers::{ParseContext, RecordError};
use crate::plan::{ContentKind, Location, RetrievalPlan, RetrievalStep};
use crate::registry::SourceRegistry;
use crate::store::{Metadata, Store};
use crate::transport::Transport;
use crate::version;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub force: bool,
    pub no_cache: bool,
}

/// Stops a running pipeline before its next retrieval step. The step in
/// flight always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every planned step succeeded.
    Completed,
    /// Some steps failed or were skipped by cancellation, at least one
    /// succeeded.
    Partial,
    /// No step succeeded.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub index: usize,
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub step: usize,
    pub file: String,
    pub line: Option<u64>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub category: Category,
    pub source: String,
    pub version: String,
    pub citation: String,
    pub status: PipelineStatus,
    pub records_written: u64,
    pub steps_planned: usize,
    pub steps_attempted: usize,
    pub steps_failed: Vec<StepFailure>,
    pub record_failures: Vec<RecordFailure>,
    pub cancelled: bool,
    pub output_path: Option<String>,
    pub metadata_path: Option<String>,
}

impl PipelineResult {
    pub fn steps_succeeded(&self) -> usize {
        self.steps_attempted - self.steps_failed.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<PipelineResult>,
}

impl FetchResult {
    pub fn is_failed(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.status == PipelineStatus::Failed)
    }
}

pub struct App<'r, T: Transport> {
    registry: &'r SourceRegistry,
    store: Store,
    transport: T,
}

impl<'r, T: Transport> App<'r, T> {
    pub fn new(registry: &'r SourceRegistry, store: Store, transport: T) -> Self {
        Self {
            registry,
            store,
            transport,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Looks the source up and resolves the requested version. No I/O.
    pub fn plan(&self, request: &DatasetRequest) -> Result<RetrievalPlan, KiraError> {
        let descriptor = self.registry.lookup(request.category, &request.source)?;
        version::resolve(descriptor, &request.version, &request.parameters)
    }

    /// Runs several requests. Every request is resolved before the first
    /// download so that a bad entry aborts the whole batch up front.
    pub fn fetch(
        &self,
        requests: &[DatasetRequest],
        options: &FetchOptions,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KiraError> {
        if requests.is_empty() {
            return Err(KiraError::InvalidDatasetRequest(
                "no datasets requested".to_string(),
            ));
        }
        let plans = requests
            .iter()
            .map(|request| self.plan(request))
            .collect::<Result<Vec<_>, KiraError>>()?;

        let mut items = Vec::with_capacity(plans.len());
        for plan in &plans {
            if cancel.is_cancelled() {
                break;
            }
            items.push(self.execute_plan(plan, options, cancel, sink)?);
        }
        Ok(FetchResult { items })
    }

    pub fn execute(
        &self,
        request: &DatasetRequest,
        options: &FetchOptions,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<PipelineResult, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {request}"),
            elapsed: None,
        });
        let plan = self.plan(request)?;
        self.execute_plan(&plan, options, cancel, sink)
    }

    /// Runs every step of `plan` in order, streaming records into one CSV.
    ///
    /// Step failures are collected and never abort sibling steps. Only
    /// failures creating or finalizing the output are returned as `Err`.
    pub fn execute_plan(
        &self,
        plan: &RetrievalPlan,
        options: &FetchOptions,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<PipelineResult, KiraError> {
        let started = Instant::now();
        info!(
            category = %plan.category,
            source = %plan.source,
            version = %plan.version,
            steps = plan.steps().len(),
            "executing retrieval plan"
        );

        self.store.ensure_output_root()?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let destination =
            self.store
                .dataset_path(plan.category, &plan.source, &plan.version, &timestamp);
        let mut writer = RecordWriter::create(&destination, plan.category)?;

        let mut steps_attempted = 0;
        let mut steps_failed = Vec::new();
        let mut record_failures = Vec::new();
        let mut cancelled = false;

        for (index, step) in plan.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    source = %plan.source,
                    skipped = plan.steps().len() - index,
                    "pipeline cancelled"
                );
                cancelled = true;
                break;
            }
            steps_attempted += 1;
            let step_started = Instant::now();
            let before = writer.written();
            let mut failures = Vec::new();

            match self.run_step(plan, step, options, &mut writer, &mut failures, sink) {
                Ok(()) => {
                    info!(
                        step = index,
                        records = writer.written() - before,
                        record_failures = failures.len(),
                        "step finished"
                    );
                    sink.event(ProgressEvent {
                        message: format!(
                            "step {}/{} done; records={}",
                            index + 1,
                            plan.steps().len(),
                            writer.written() - before
                        ),
                        elapsed: Some(step_started.elapsed()),
                    });
                }
                Err(err) => {
                    warn!(step = index, location = %step.location, error = %err, "step failed");
                    sink.event(ProgressEvent {
                        message: format!("step {}/{} failed: {err}", index + 1, plan.steps().len()),
                        elapsed: Some(step_started.elapsed()),
                    });
                    steps_failed.push(StepFailure {
                        index,
                        location: step.location.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
            if !failures.is_empty() {
                warn!(step = index, count = failures.len(), "records skipped");
            }
            record_failures.extend(failures.into_iter().map(|err: RecordError| RecordFailure {
                step: index,
                file: err.file,
                line: err.line,
                reason: err.reason,
            }));
        }

        sink.event(ProgressEvent {
            message: "phase=Store; writing dataset".to_string(),
            elapsed: None,
        });
        let records_written = writer.written();
        let output_path = writer.finish()?;
        let metadata_path = match &output_path {
            Some(path) => {
                let metadata_path =
                    self.store
                        .metadata_path(plan.category, &plan.source, &plan.version);
                let metadata = Metadata {
                    category: plan.category,
                    source: plan.source.clone(),
                    version: plan.version.clone(),
                    citation: plan.citation.clone(),
                    locations: plan
                        .steps()
                        .iter()
                        .map(|step| step.location.to_string())
                        .collect(),
                    output_path: path.to_string(),
                    records_written,
                    steps_failed: steps_failed.len(),
                    produced_at: iso_timestamp(),
                    tool: format!("kira-cm/{}", env!("CARGO_PKG_VERSION")),
                };
                Store::write_metadata(&metadata_path, &metadata)?;
                Some(metadata_path.to_string())
            }
            None => None,
        };

        let succeeded = steps_attempted - steps_failed.len();
        let status = if succeeded == 0 {
            PipelineStatus::Failed
        } else if succeeded < plan.steps().len() {
            PipelineStatus::Partial
        } else {
            PipelineStatus::Completed
        };
        info!(
            source = %plan.source,
            version = %plan.version,
            status = ?status,
            records = records_written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        sink.event(ProgressEvent {
            message: format!("pipeline {status:?}; records={records_written}"),
            elapsed: Some(started.elapsed()),
        });

        Ok(PipelineResult {
            category: plan.category,
            source: plan.source.clone(),
            version: plan.version.clone(),
            citation: plan.citation.clone(),
            status,
            records_written,
            steps_planned: plan.steps().len(),
            steps_attempted,
            steps_failed,
            record_failures,
            cancelled,
            output_path: output_path.map(|path| path.to_string()),
            metadata_path,
        })
    }

    fn run_step(
        &self,
        plan: &RetrievalPlan,
        step: &RetrievalStep,
        options: &FetchOptions,
        writer: &mut RecordWriter,
        failures: &mut Vec<RecordError>,
        sink: &dyn ProgressSink,
    ) -> Result<(), KiraError> {
        let work_dir = self.store.work_dir()?;

        sink.event(ProgressEvent {
            message: format!("phase=Retrieve; {}", step.location),
            elapsed: None,
        });
        let downloaded = self.retrieve(plan, step, options, work_dir.path())?;

        let members = match step.content {
            ContentKind::File => vec![ExtractedMember {
                name: step.file_name.clone(),
                path: downloaded,
            }],
            ContentKind::Archive(format) => {
                sink.event(ProgressEvent {
                    message: format!("phase=Extract; {} ({format})", step.file_name),
                    elapsed: None,
                });
                let extracted = fs_util::decompress(
                    &downloaded,
                    format,
                    &step.file_name,
                    &work_dir.path().join("members"),
                )?;
                select_members(extracted, &step.members)?
            }
        };

        for member in &members {
            sink.event(ProgressEvent {
                message: format!("phase=Parse; {} ({})", member.name, step.parser.name()),
                elapsed: None,
            });
            let file = File::open(&member.path).map_err(|err| {
                KiraError::Filesystem(format!("open {}: {err}", member.path.display()))
            })?;
            let input: Box<dyn BufRead> = Box::new(BufReader::new(file));
            let context = ParseContext::new(plan.category, &member.name)
                .structure_only(plan.support.is_partial());
            for result in step.parser.parse(input, context) {
                match result {
                    Ok(record) => writer.write(&record)?,
                    Err(err) => {
                        debug!(error = %err, "record skipped");
                        failures.push(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the local path of the step's download, reusing the cache
    /// unless forced or disabled.
    fn retrieve(
        &self,
        plan: &RetrievalPlan,
        step: &RetrievalStep,
        options: &FetchOptions,
        scratch: &Path,
    ) -> Result<PathBuf, KiraError> {
        if options.no_cache {
            let url = self.resolve_location(&step.location)?;
            let destination = scratch.join("download");
            let bytes = self.transport.download(&url, &destination)?;
            debug!(url = %url, bytes, "downloaded without cache");
            return Ok(destination);
        }

        let cached =
            self.store
                .download_path(plan.category, &plan.source, &plan.version, &step.file_name);
        if cached.as_std_path().exists() && !options.force {
            info!(path = %cached, "using cached download");
            return Ok(cached.into_std_path_buf());
        }

        let url = self.resolve_location(&step.location)?;
        let staging = Store::staging_file(&cached)?;
        let bytes = self.transport.download(&url, staging.path())?;
        Store::persist(staging, &cached)?;
        debug!(url = %url, bytes, path = %cached, "downloaded");
        Ok(cached.into_std_path_buf())
    }

    fn resolve_location(&self, location: &Location) -> Result<String, KiraError> {
        match location {
            Location::Direct { url } => Ok(url.clone()),
            Location::Indirect { api_url, pointer } => {
                let response = self.transport.fetch_json(api_url)?;
                response
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        KiraError::Http(format!("{api_url}: no download link at {pointer}"))
                    })
            }
        }
    }
}

/// Picks the members named by the step, in the step's order. An empty list
/// keeps every member except archive bookkeeping files.
fn select_members(
    extracted: Vec<ExtractedMember>,
    wanted: &[String],
) -> Result<Vec<ExtractedMember>, KiraError> {
    if wanted.is_empty() {
        let members: Vec<_> = extracted
            .into_iter()
            .filter(|member| {
                !member.name.starts_with("__MACOSX/")
                    && !member
                        .name
                        .rsplit('/')
                        .next()
                        .is_some_and(|base| base.starts_with('.'))
            })
            .collect();
        if members.is_empty() {
            return Err(KiraError::Archive("archive has no members".to_string()));
        }
        return Ok(members);
    }

    wanted
        .iter()
        .map(|name| {
            extracted
                .iter()
                .find(|member| &member.name == name)
                .cloned()
                .ok_or_else(|| KiraError::Archive(format!("archive member not found: {name}")))
        })
        .collect()
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
