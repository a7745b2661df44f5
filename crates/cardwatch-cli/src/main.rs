mod pipeline;
mod report;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cardwatch_ai::{parse_response, ClaudeProposer};
use cardwatch_core::{day_index, PipelineConfig};
use cardwatch_search::{BraveSearch, EvidenceRetriever};
use cardwatch_store::RecordStore;
use chrono::{Datelike, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pipeline::{RunOptions, RunStats};

const BRAVE_KEY_VAR: &str = "BRAVE_API_KEY";
const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Parser)]
#[command(name = "cardwatch", version, about = "Evidence-backed updates for a credit card dataset")]
struct Cli {
    /// Pipeline config file. Missing file means defaults.
    #[arg(long, global = true, env = "CARDWATCH_CONFIG", default_value = "cardwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select today's cards, gather evidence, and apply high-confidence fixes.
    Run {
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        paths: PathArgs,
        /// Patch in memory and print the report; write nothing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the cards a run would pick, without calling any external service.
    Select {
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Validate and apply a saved proposer response.
    Apply {
        /// File holding the proposer's reply.
        proposals: PathBuf,
        #[command(flatten)]
        paths: PathArgs,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct ScheduleArgs {
    /// Rotation cursor. Defaults to days since 1970-01-01 plus the offset.
    #[arg(long, env = "CARDWATCH_DAY_INDEX", allow_negative_numbers = true)]
    day_index: Option<i64>,
    #[arg(long, env = "CARDWATCH_DAY_OFFSET", allow_negative_numbers = true)]
    day_offset: Option<i64>,
    #[arg(long, env = "CARDWATCH_ACTIVE_QUOTA")]
    active_quota: Option<usize>,
    #[arg(long, env = "CARDWATCH_TOTAL_QUOTA")]
    total_quota: Option<usize>,
}

#[derive(Args)]
struct PathArgs {
    #[arg(long, env = "CARDWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long = "report", env = "CARDWATCH_REPORT")]
    report: Option<PathBuf>,
}

impl ScheduleArgs {
    fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(offset) = self.day_offset {
            config.schedule.day_offset = offset;
        }
        if let Some(q) = self.active_quota {
            config.schedule.active_quota = q;
        }
        if let Some(q) = self.total_quota {
            config.schedule.total_quota = q;
        }
    }
}

impl PathArgs {
    fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.paths.data_dir = dir.clone();
        }
        if let Some(report) = &self.report {
            config.paths.report_path = report.clone();
        }
    }
}

fn run_options(config: &PipelineConfig, day_index_override: Option<i64>, dry_run: bool) -> RunOptions {
    let today = Utc::now().date_naive();
    RunOptions {
        day_index: day_index_override.unwrap_or_else(|| day_index(today, config.schedule.day_offset)),
        active_quota: config.schedule.active_quota,
        total_quota: config.schedule.total_quota,
        proposer_timeout: Duration::from_secs(config.proposer.timeout_secs),
        report_path: config.paths.report_path.clone(),
        dry_run,
    }
}

fn credential(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => bail!("{var} is not set"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!("cardwatch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run {
            schedule,
            paths,
            dry_run,
        } => {
            schedule.apply_to(&mut config);
            paths.apply_to(&mut config);
            config.validate()?;
            cmd_run(&config, run_options(&config, schedule.day_index, dry_run)).await
        }
        Command::Select { schedule, paths } => {
            schedule.apply_to(&mut config);
            paths.apply_to(&mut config);
            config.validate()?;
            cmd_select(&config, &run_options(&config, schedule.day_index, false))
        }
        Command::Apply {
            proposals,
            paths,
            dry_run,
        } => {
            paths.apply_to(&mut config);
            config.validate()?;
            cmd_apply(&config, &proposals, &run_options(&config, None, dry_run))
        }
    }
}

async fn cmd_run(config: &PipelineConfig, opts: RunOptions) -> Result<()> {
    // Both services are required; fail before touching any card.
    let brave_key = credential(BRAVE_KEY_VAR)?;
    let anthropic_key = credential(ANTHROPIC_KEY_VAR)?;

    let store = RecordStore::open(&config.paths.data_dir)?;

    let search = BraveSearch::new(
        config.search.base_url.clone(),
        brave_key,
        Duration::from_secs(config.search.timeout_secs),
    )
    .context("building search client")?;
    let retriever = EvidenceRetriever::new(
        search,
        config.search.max_results,
        Duration::from_millis(config.search.delay_ms),
        Duration::from_secs(config.search.timeout_secs),
        Utc::now().year(),
    );
    let proposer = ClaudeProposer::new(
        config.proposer.base_url.clone(),
        anthropic_key,
        config.proposer.model.clone(),
        config.proposer.max_tokens,
        Duration::from_secs(config.proposer.timeout_secs),
    )
    .context("building proposer client")?;

    let outcome = pipeline::run_pipeline(&store, &retriever, &proposer, &opts).await?;
    outcome.stats.log();
    print_report(outcome.report.as_deref(), &opts);
    Ok(())
}

fn cmd_select(config: &PipelineConfig, opts: &RunOptions) -> Result<()> {
    let store = RecordStore::open(&config.paths.data_dir)?;
    let records = pipeline::load_records(&store)?;
    let selection = pipeline::selection(&records, opts);

    println!("day index {}", selection.day_index);
    for id in &selection.chosen_ids {
        let pool = match records.get(id) {
            Some(r) if !r.is_active() => "inactive",
            _ => "active",
        };
        println!("  {id} ({pool})");
    }
    Ok(())
}

fn cmd_apply(config: &PipelineConfig, proposals: &Path, opts: &RunOptions) -> Result<()> {
    let start = Instant::now();
    let raw = std::fs::read_to_string(proposals)
        .with_context(|| format!("reading {}", proposals.display()))?;
    let parsed = parse_response(&raw);

    let store = RecordStore::open(&config.paths.data_dir)?;
    let records = pipeline::load_records(&store)?;

    let mut stats = RunStats {
        selected: records.len(),
        ..RunStats::default()
    };
    let applied = pipeline::apply_proposals(&store, &records, parsed, opts.dry_run, &mut stats)?;
    let report = pipeline::finish(&applied, opts)?;
    stats.elapsed_secs = start.elapsed().as_secs_f64();
    stats.log();
    print_report(report.as_deref(), opts);
    Ok(())
}

fn print_report(report: Option<&str>, opts: &RunOptions) {
    match report {
        Some(text) if opts.dry_run => println!("{text}"),
        Some(_) => eprintln!("  Report written to {}", opts.report_path.display()),
        None => eprintln!("  No changes applied."),
    }
}
