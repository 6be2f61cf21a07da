mod registry;
mod requests;
mod workspace;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use finlake_core::{
    CoreError, ExecutionContext, RuleCatalog, RunMode, read_csv, rule_config_json_schema,
    validate_catalog, write_csv,
};
use finlake_merge::{CsvWarehouse, MergeError, MergeOrchestrator, MergeOutcome, RunStatus};
use finlake_rules::{RuleEngine, RuleError};
use registry::{init_logging, start_run};
use requests::{RequestError, RunRequest};
use thiserror::Error;
use workspace::{JobRegistry, JobStatus, PipelineSettings, load_or_create_settings};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("workspace error: {0}")]
    Workspace(#[from] workspace::WorkspaceError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("rule error: {0}")]
    Rules(#[from] RuleError),
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
    #[error("request error: {0}")]
    Request(#[from] RequestError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "finlake", version, about = "Financial data lake pipeline")]
struct Cli {
    /// Pipeline settings file, created with defaults when missing.
    #[arg(long, global = true, default_value = "finlake.toml")]
    settings: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge, validate and compute facts for a historical date range.
    Run(RangeArgs),
    /// Process a single day of live data.
    Live(LiveArgs),
    /// Execute a run request file and track it in the job registry.
    Request(RequestArgs),
    /// Validate one CSV file against one table's rules.
    Validate(ValidateArgs),
    /// Print the job registry.
    Jobs,
    /// Print the JSON Schema of the rule configuration.
    RulesSchema,
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// First day of the range (YYYY-MM-DD).
    #[arg(long)]
    start: NaiveDate,
    /// Last day of the range, inclusive.
    #[arg(long)]
    end: NaiveDate,
}

#[derive(Args, Debug)]
struct LiveArgs {
    /// Day to process; defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// JSON request `{start_date, end_date, job_id?, sched_time?}`.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long)]
    table: String,
    #[arg(long)]
    input: PathBuf,
    /// Directory for the valid/invalid partitions.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = load_or_create_settings(&cli.settings)?;

    match cli.command {
        Command::Run(args) => {
            let mode = RunMode::historical(args.start, args.end)?;
            run_pipeline(&settings, mode, None).map(|_| ())
        }
        Command::Live(args) => {
            let date = args.date.unwrap_or_else(|| Local::now().date_naive());
            run_pipeline(&settings, RunMode::Live { date }, None).map(|_| ())
        }
        Command::Request(args) => run_request(&settings, &args.path),
        Command::Validate(args) => run_validate(&settings, args),
        Command::Jobs => print_jobs(&settings),
        Command::RulesSchema => {
            println!("{}", serde_json::to_string_pretty(&rule_config_json_schema())?);
            Ok(())
        }
    }
}

fn load_engine(settings: &PipelineSettings) -> Result<RuleEngine, CliError> {
    let catalog = RuleCatalog::load(&settings.rules_path)?;
    validate_catalog(&catalog)?;
    Ok(RuleEngine::new(catalog))
}

/// Create the execution directory, start logging and run the orchestrator.
fn run_pipeline(
    settings: &PipelineSettings,
    mode: RunMode,
    job_id: Option<&str>,
) -> Result<(ExecutionContext, MergeOutcome), CliError> {
    let ctx = ExecutionContext::create(&settings.execution_root, mode)?;
    let run_paths = start_run(&ctx, settings, job_id)?;
    init_logging(Some(&run_paths.logs_path))?;
    execute(settings, ctx, job_id)
}

fn execute(
    settings: &PipelineSettings,
    ctx: ExecutionContext,
    job_id: Option<&str>,
) -> Result<(ExecutionContext, MergeOutcome), CliError> {
    tracing::info!(
        event = "run_started",
        run_id = %ctx.run_id,
        mode = ctx.mode.label(),
        start = %ctx.mode.start(),
        end = %ctx.mode.end(),
        job_id = job_id.unwrap_or("-"),
        dir = %ctx.dir.display()
    );
    let timer = Instant::now();

    let engine = load_engine(settings)?;
    let mut orchestrator = MergeOrchestrator::new(engine, settings.merge_options())?;
    if let Some(dir) = &settings.warehouse_dir {
        orchestrator = orchestrator.with_loader(Box::new(CsvWarehouse::new(dir.clone())));
    }

    let outcome = orchestrator.run(&ctx)?;
    let duration_ms = timer.elapsed().as_millis();
    let status = match outcome.report.status {
        RunStatus::Completed => "success",
        RunStatus::Failed => "failed",
        RunStatus::Running => "incomplete",
    };
    tracing::info!(
        event = "run_finished",
        status,
        tables = outcome.valid.len(),
        facts = outcome.facts.is_some(),
        duration_ms = duration_ms
    );
    Ok((ctx, outcome))
}

fn run_request(settings: &PipelineSettings, path: &Path) -> Result<(), CliError> {
    let request = RunRequest::load(path)?;
    let today = Local::now().date_naive();
    let mode = request.mode(today)?;

    let ctx = ExecutionContext::create(&settings.execution_root, mode)?;
    let resolved = request.resolve(today, &settings.sched_time)?;
    let run_paths = start_run(&ctx, settings, Some(&resolved.job_id))?;
    init_logging(Some(&run_paths.logs_path))?;
    if let Some(rejected) = &resolved.rejected_sched_time {
        tracing::warn!(
            event = "sched_time_defaulted",
            value = %rejected,
            default = %resolved.sched_time,
            "invalid scheduled time, using default"
        );
    }
    tracing::info!(
        event = "request_accepted",
        job_id = %resolved.job_id,
        sched_time = %resolved.sched_time,
        request = %path.display()
    );

    let mut jobs = JobRegistry::open(settings.jobs_path())?;
    jobs.insert(&resolved.job_id, resolved.mode.start(), resolved.mode.end())?;

    match execute(settings, ctx, Some(&resolved.job_id)) {
        Ok((ctx, _)) => {
            jobs.update(
                &resolved.job_id,
                JobStatus::Completed {
                    execution_dir: ctx.dir,
                },
            )?;
            Ok(())
        }
        Err(err) => {
            tracing::error!(event = "job_failed", job_id = %resolved.job_id, error = %err);
            jobs.update(
                &resolved.job_id,
                JobStatus::Failed {
                    reason: err.to_string(),
                },
            )?;
            Err(err)
        }
    }
}

fn run_validate(settings: &PipelineSettings, args: ValidateArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let engine = load_engine(settings)?;
    let dataset = read_csv(&args.input)?;
    let result = engine.validate(&dataset, &args.table, None)?;

    std::fs::create_dir_all(&args.out)?;
    let valid_path = args.out.join(format!("valid_{}.csv", args.table));
    let invalid_path = args.out.join(format!("invalid_{}.csv", args.table));
    let violations_path = args.out.join(format!("violations_{}.json", args.table));
    write_csv(&valid_path, &result.valid_dataset())?;
    write_csv(&invalid_path, &result.invalid_dataset())?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&violations_path)?;
    serde_json::to_writer_pretty(file, &result.failures)?;

    tracing::info!(
        event = "validation_finished",
        table = %args.table,
        valid = result.valid_count(),
        invalid = result.invalid_count(),
        out = %args.out.display()
    );
    Ok(())
}

fn print_jobs(settings: &PipelineSettings) -> Result<(), CliError> {
    let jobs = JobRegistry::open(settings.jobs_path())?;
    let records: Vec<_> = jobs.list().collect();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
