use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_chemdata_manager::app::{
    App, CancelToken, FetchOptions, FetchResult, PipelineStatus, ProgressSink,
};
use kira_chemdata_manager::config::ConfigLoader;
use kira_chemdata_manager::domain::{Category, DatasetRequest, parse_parameter};
use kira_chemdata_manager::error::KiraError;
use kira_chemdata_manager::output::{ConsoleProgress, JsonOutput, OutputMode};
use kira_chemdata_manager::plan::RetrievalPlan;
use kira_chemdata_manager::query::{self, SourceInfo, SourceSummary};
use kira_chemdata_manager::registry;
use kira_chemdata_manager::store::Store;
use kira_chemdata_manager::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "kira-cm")]
#[command(about = "Reproducible retrieval of public chemical compound and reaction datasets")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List registered data sources")]
    Sources(SourcesArgs),
    #[command(about = "Show name, citation and versions of a data source")]
    Info(SourceArgs),
    #[command(about = "List the version patterns of a data source")]
    Versions(SourceArgs),
    #[command(about = "Show the retrieval plan of a dataset version without downloading")]
    Plan(PlanArgs),
    #[command(about = "Download, parse and store datasets")]
    Fetch(FetchArgs),
}

#[derive(Args)]
struct SourcesArgs {
    #[arg(long)]
    category: Option<Category>,
}

#[derive(Args)]
struct SourceArgs {
    category: Category,
    source: String,
}

#[derive(Args)]
struct PlanArgs {
    category: Category,
    source: String,
    version: String,

    /// Parameter binding for templated versions, `name=value`.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Args)]
struct FetchArgs {
    category: Option<Category>,
    source: Option<String>,
    version: Option<String>,

    /// Parameter binding for templated versions, `name=value`.
    #[arg(long = "param")]
    params: Vec<String>,

    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(report_exit_code(&report))
        }
    }
}

/// Exit code for a failed run; reports not carrying a `KiraError` exit 1.
fn report_exit_code(report: &miette::Report) -> u8 {
    report.downcast_ref::<KiraError>().map_or(1, map_exit_code)
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingConfig | KiraError::ConfigRead(_) | KiraError::ConfigParse(_) => 2,
        KiraError::Http(_) | KiraError::HttpStatus { .. } | KiraError::Archive(_) => 3,
        error if error.is_user_error() => 2,
        error if error.is_integrity_error() => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let registry = registry::builtin()?;

    match cli.command {
        Commands::Sources(args) => {
            let sources = query::list_sources(registry, args.category);
            match output_mode {
                OutputMode::Json => JsonOutput::print_sources(&sources).into_diagnostic()?,
                OutputMode::Human => print_sources(&sources),
            }
        }
        Commands::Info(args) => {
            let info =
                query::describe_source(registry, args.category, &args.source)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&info).into_diagnostic()?,
                OutputMode::Human => print_info(&info),
            }
        }
        Commands::Versions(args) => {
            let info = query::describe_versions(registry, args.category, &args.source)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_json(&info.patterns).into_diagnostic()?,
                OutputMode::Human => print_versions(&info),
            }
        }
        Commands::Plan(args) => {
            let request = build_request(args.category, &args.source, &args.version, &args.params)?;
            let plan = query::describe_plan(registry, &request)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_json(&plan).into_diagnostic()?,
                OutputMode::Human => print_plan(&plan),
            }
        }
        Commands::Fetch(args) => return run_fetch(args, registry, output_mode),
    }
    Ok(ExitCode::SUCCESS)
}

fn build_request(
    category: Category,
    source: &str,
    version: &str,
    params: &[String],
) -> miette::Result<DatasetRequest> {
    let mut request = DatasetRequest::new(category, source, version);
    for param in params {
        let (name, value) = parse_parameter(param)?;
        request.parameters.insert(name, value);
    }
    Ok(request)
}

fn run_fetch(
    args: FetchArgs,
    registry: &registry::SourceRegistry,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let FetchArgs {
        category,
        source,
        version,
        params,
        output_dir,
        config,
        force,
        no_cache,
    } = args;

    let (config, requests) = match (category, source, version) {
        (Some(category), Some(source), Some(version)) => {
            let config = ConfigLoader::resolve_or_default(config.as_deref())?;
            let request = build_request(category, &source, &version, &params)?;
            (config, vec![request])
        }
        (None, None, None) => {
            if !params.is_empty() {
                return Err(KiraError::InvalidDatasetRequest(
                    "--param requires a category, source and version".to_string(),
                )
                .into());
            }
            let config = ConfigLoader::resolve(config.as_deref())?;
            let requests = config.datasets.clone();
            (config, requests)
        }
        _ => {
            return Err(KiraError::InvalidDatasetRequest(
                "expected CATEGORY SOURCE VERSION".to_string(),
            )
            .into());
        }
    };

    let output_dir = output_dir
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|| config.output_dir.clone());
    let store = Store::new(output_dir)?;
    let transport = HttpTransport::new(config.http)?;
    let app = App::new(registry, store, transport);
    let options = FetchOptions {
        force,
        no_cache: no_cache || !config.cache,
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &ConsoleProgress,
    };

    let result = app
        .fetch(&requests, &options, &CancelToken::new(), sink)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic()?,
        OutputMode::Human => print_fetch_summary(&result),
    }

    if result.is_failed() {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_sources(sources: &[SourceSummary]) {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    for source in sources {
        println!(
            "{cyan}{:<9}{reset} {:<14} {} ({} versions)",
            source.category.as_str(),
            source.identifier,
            source.name,
            source.versions
        );
    }
}

fn print_info(info: &SourceInfo) {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    println!("{cyan}{}:{}{reset} {}", info.category, info.identifier, info.name);
    println!("citation: {} ({})", info.citation, info.citation_url);
    print_versions(info);
}

fn print_versions(info: &SourceInfo) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";
    for pattern in &info.patterns {
        let color = if pattern.support.is_partial() {
            yellow
        } else {
            green
        };
        println!("{color}{}{reset}  [{}]", pattern.template, pattern.support);
        if pattern.template != pattern.example {
            println!("    example: {}", pattern.example);
        }
        for parameter in &pattern.parameters {
            match &parameter.constraint {
                Some(constraint) => println!("    {}: {constraint}", parameter.name),
                None => println!("    {}", parameter.name),
            }
        }
        if let Some(description) = &pattern.description {
            println!("    {description}");
        }
    }
}

fn print_plan(plan: &RetrievalPlan) {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    println!(
        "{cyan}{}:{}:{}{reset} [{}]",
        plan.category, plan.source, plan.version, plan.support
    );
    println!("citation: {} ({})", plan.citation, plan.citation_url());
    for (index, step) in plan.steps().iter().enumerate() {
        println!("{}. {} -> {}", index + 1, step.location, step.file_name);
        for member in &step.members {
            println!("     member: {member}");
        }
        println!("     parser: {}", step.parser.name());
    }
}

fn print_fetch_summary(result: &FetchResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-CM summary{reset}");
    for item in &result.items {
        let color = match item.status {
            PipelineStatus::Completed => green,
            PipelineStatus::Partial => yellow,
            PipelineStatus::Failed => red,
        };
        println!(
            "{color}{}:{}:{} {:?}{reset}",
            item.category, item.source, item.version, item.status
        );
        println!(
            "   records: {}  steps: {}/{}",
            item.records_written,
            item.steps_succeeded(),
            item.steps_planned
        );
        for failure in &item.steps_failed {
            println!(
                "{red}   step {} failed: {} ({}){reset}",
                failure.index + 1,
                failure.reason,
                failure.location
            );
        }
        if !item.record_failures.is_empty() {
            println!(
                "{yellow}   skipped records: {}{reset}",
                item.record_failures.len()
            );
        }
        if item.cancelled {
            println!("{yellow}   cancelled{reset}");
        }
        if let Some(path) = &item.output_path {
            println!("   output: {path}");
        }
        println!("   cite: https://doi.org/{}", item.citation);
    }
}
