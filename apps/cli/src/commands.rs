//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use bomenrich_core::orchestrator::Collaborators;
use bomenrich_core::pipeline::{CancelFlag, JobProgress, JobSummary, resume_job, run_job};
use bomenrich_lookup::OpenRouterClient;
use bomenrich_sheet::SheetFormat;
use bomenrich_shared::{
    AppConfig, EnrichConfig, JobId, init_config, load_config, resolve_path, validate_api_key,
};
use bomenrich_store::{JobStore, StoreConfig};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bomenrich: canonicalize and source BOM spreadsheet descriptions.
#[derive(Parser)]
#[command(
    name = "bomenrich",
    version,
    about = "Normalize BOM component descriptions and attach vendor source links.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich a BOM spreadsheet (xlsx, xls, or csv).
    Enrich {
        /// Input spreadsheet path.
        input: PathBuf,

        /// Output CSV path (defaults to `<input stem>-enriched.csv`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Process at most this many rows, then checkpoint and stop.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Continue a partially processed job from its newest checkpoint.
    Resume {
        /// Job id printed when the job was started.
        job_id: String,

        /// Output CSV path (defaults to `<original stem>-enriched.csv`).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List known jobs, newest first.
    Jobs,

    /// Run store housekeeping once: evict stale artifacts.
    Prune,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug,hyper=info,reqwest=info",
        _ => "trace,hyper=debug,reqwest=debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Enrich { input, out, limit } => cmd_enrich(&input, out.as_deref(), limit).await,
        Command::Resume { job_id, out } => cmd_resume(&job_id, out.as_deref()).await,
        Command::Jobs => cmd_jobs().await,
        Command::Prune => cmd_prune().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(input: &Path, out: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config)?;

    let format = SheetFormat::from_path(input)?;
    let bytes =
        std::fs::read(input).map_err(|e| eyre!("cannot read '{}': {e}", input.display()))?;
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let mut enrich = EnrichConfig::from(&config);
    enrich.row_limit = limit;

    let client = OpenRouterClient::new(api_key, &enrich)?;
    let collab = Collaborators {
        search: &client,
        format: &client,
    };

    let store = open_store(&config)?;
    store.start().await;

    let job_id = JobId::new();
    store.create_job(job_id, &file_name, &bytes)?;
    info!(%job_id, file = %file_name, "job created");
    println!("  Job ID: {job_id}");

    let cancel = CancelFlag::new();
    spawn_cancel_listener(cancel.clone());

    let reporter = CliProgress::new();
    let result = run_job(
        job_id, format, &bytes, &enrich, &collab, &store, &reporter, &cancel,
    )
    .await;
    let summary = finish_run(result, &reporter, &store).await?;

    let out_path = resolved_out_path(out, input);
    if !summary.partial {
        export_latest(&store, job_id, &out_path)?;
    }
    print_summary(job_id, &summary, (!summary.partial).then_some(out_path.as_path()));
    Ok(())
}

async fn cmd_resume(job_id_raw: &str, out: Option<&Path>) -> Result<()> {
    let job_id: JobId = job_id_raw
        .parse()
        .map_err(|e| eyre!("invalid job id '{job_id_raw}': {e}"))?;

    let config = load_config()?;
    let api_key = validate_api_key(&config)?;
    let enrich = EnrichConfig::from(&config);

    let client = OpenRouterClient::new(api_key, &enrich)?;
    let collab = Collaborators {
        search: &client,
        format: &client,
    };

    let store = open_store(&config)?;
    store.start().await;

    let meta = store
        .job_meta(job_id)?
        .ok_or_else(|| eyre!("unknown job {job_id}"))?;
    info!(%job_id, original = %meta.original_name, "resuming job");

    let cancel = CancelFlag::new();
    spawn_cancel_listener(cancel.clone());

    let reporter = CliProgress::new();
    let result = resume_job(job_id, &enrich, &collab, &store, &reporter, &cancel).await;
    let summary = finish_run(result, &reporter, &store).await?;

    let out_path = resolved_out_path(out, Path::new(&meta.original_name));
    if !summary.partial {
        export_latest(&store, job_id, &out_path)?;
    }
    print_summary(job_id, &summary, (!summary.partial).then_some(out_path.as_path()));
    Ok(())
}

async fn cmd_jobs() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;
    let jobs = store.list_jobs()?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    for meta in jobs {
        println!(
            "{}  {}  {}",
            meta.id,
            meta.created_at.format("%Y-%m-%d %H:%M:%S"),
            meta.original_name
        );
    }
    Ok(())
}

async fn cmd_prune() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;
    let deleted = store.prune_artifacts()?;
    println!("Pruned {deleted} artifact file(s).");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open the job store rooted at the configured storage directory.
fn open_store(config: &AppConfig) -> Result<JobStore> {
    let root = resolve_path(&config.defaults.storage_dir)?;
    Ok(JobStore::open(StoreConfig::from_section(
        root,
        &config.store,
    ))?)
}

/// Clear the progress bar and stop the store sweeper before a run's
/// result reaches the error reporter. A bar left ticking garbles the
/// report.
async fn finish_run(
    result: bomenrich_shared::Result<JobSummary>,
    reporter: &CliProgress,
    store: &JobStore,
) -> bomenrich_shared::Result<JobSummary> {
    reporter.finish();
    store.stop().await;
    result
}

/// First ctrl-c requests a soft cancel (checkpoint, then a partial
/// summary); a second one aborts the process.
fn spawn_cancel_listener(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancelling after the current row; press ctrl-c again to abort");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });
}

/// `bom.xlsx` becomes `bom-enriched.csv` next to the input (or in the
/// working directory when resuming by original name).
fn resolved_out_path(out: Option<&Path>, input: &Path) -> PathBuf {
    if let Some(path) = out {
        return path.to_path_buf();
    }
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("bom");
    input.with_file_name(format!("{stem}-enriched.csv"))
}

/// Copy the job's final artifact to the requested output path.
fn export_latest(store: &JobStore, job_id: JobId, out: &Path) -> Result<()> {
    let artifact = store
        .latest_artifact(job_id)?
        .ok_or_else(|| eyre!("job {job_id} has no artifact"))?;
    std::fs::write(out, &artifact.bytes)
        .map_err(|e| eyre!("cannot write '{}': {e}", out.display()))?;
    Ok(())
}

fn print_summary(job_id: JobId, summary: &JobSummary, out: Option<&Path>) {
    println!();
    if summary.partial {
        println!("  Job paused. Resume with: bomenrich resume {job_id}");
    } else {
        println!("  Enrichment complete!");
    }
    println!("  Job ID:    {job_id}");
    println!("  Processed: {}", summary.processed);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);
    println!("  Total:     {}", summary.total);
    if let Some(path) = out {
        println!("  Output:    {}", path.display());
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Progress reporter backed by an indicatif bar: spinner during setup
/// phases, a row bar once the sheet size is known, preview lines
/// printed above it.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl JobProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn progress(&self, processed: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
            self.bar.set_style(
                ProgressStyle::with_template("{bar:30.cyan} {pos}/{len} rows").unwrap(),
            );
        }
        self.bar.set_position(processed as u64);
    }

    fn preview(&self, before: &str, after: &str, primary_source: &str) {
        self.bar
            .println(format!("  {before} -> {after}  [{primary_source}]"));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
