//! qareport - weekly QA status report generator
//!
//! A CLI tool that collects issue, pull request, build and task data
//! for a set of projects and renders a weekly report with issue-aging
//! trends.
//!
//! Exit codes:
//!   0 - Success (or no --fail-on-blockers set)
//!   1 - Runtime error (bad arguments, config, output file, etc.)
//!   2 - Open blockers found with --fail-on-blockers

mod analysis;
mod cli;
mod collector;
mod config;
mod models;
mod report;
mod sources;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use cli::{Args, OutputFormat};
use collector::Collector;
use config::Config;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Priority, ProjectReport, Report, ReportMetadata};
use sources::{jira, ReportDates};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args)?;

    info!("qareport v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_report(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .qareport.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::DEFAULT_CONFIG_FILE);
    println!("   Set the service URLs and edit the project tables as needed.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Resolve the report date and "today" for open issues.
fn resolve_dates(args: &Args, today: NaiveDate) -> ReportDates {
    let report_date = args.date.unwrap_or(today);
    let as_of = args.as_of.unwrap_or_else(|| today.max(report_date));
    ReportDates::new(report_date, as_of)
}

/// Run the complete report workflow. Returns exit code (0 or 2).
async fn run_report(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;
    debug!("Credentials: {:?}", config.credentials);

    let dates = resolve_dates(&args, Local::now().date_naive());
    if dates.as_of < dates.report_date {
        anyhow::bail!(
            "Open issues are counted as of {}, before the report date {}",
            dates.as_of,
            dates.report_date
        );
    }
    info!(
        "Report period {} .. {} (open issues as of {})",
        dates.period_start, dates.report_date, dates.as_of
    );

    if config.projects.is_empty() {
        anyhow::bail!("No projects selected");
    }

    // Handle --dry-run: print the plan and exit
    if args.dry_run {
        return handle_dry_run(&config, &dates);
    }

    println!(
        "📥 Collecting data for {} project(s), {} - {}",
        config.projects.len(),
        dates.period_start,
        dates.report_date
    );

    let mut collector = Collector::new(&config, dates)?;
    collector.load_weekly_pages().await;

    let projects = collect_projects(&collector, &config, args.quiet).await;

    // Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();

    let report = Report {
        metadata: ReportMetadata {
            period_start: dates.period_start,
            report_date: dates.report_date,
            as_of: dates.as_of,
            generated_at: Utc::now(),
            interval_weeks: config.statistics.interval_weeks,
            lookback_weeks: config.statistics.lookback_weeks,
            duration_seconds: duration,
        },
        summary: analysis::summary_rows(&projects),
        main_tasks: analysis::main_tasks(&projects),
        projects,
    };

    // Generate and save the report
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = &config.general.output;
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path))?;

    // Print summary
    let total_blockers = report.total_blockers();
    let total_criticals: usize = report.projects.iter().map(|p| p.criticals.len()).sum();
    let failed_sources: usize = report.projects.iter().map(|p| p.errors.len()).sum();

    println!("\n📊 Report Summary:");
    println!("   Projects: {}", report.projects.len());
    println!(
        "   Open issues: 🔴 Blockers: {} | 🟠 Criticals: {}",
        total_blockers, total_criticals
    );
    if failed_sources > 0 {
        println!("   ⚠️  Failed source requests: {}", failed_sources);
    }
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Report saved to: {}", output_path);

    if args.fail_on_blockers && total_blockers > 0 {
        eprintln!(
            "\n⛔ {} open blocker(s) found. Failing (exit code 2).",
            total_blockers
        );
        return Ok(2);
    }

    Ok(0)
}

/// Collect all configured projects, keeping configuration order.
async fn collect_projects(collector: &Collector, config: &Config, quiet: bool) -> Vec<ProjectReport> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(config.projects.len() as u64)
    };
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => warn!("Invalid progress template: {}", e),
    }

    let pb = &pb;
    let projects = stream::iter(config.projects.iter())
        .map(|(id, project)| async move {
            let report = collector.collect_project(*id, project).await;
            pb.set_message(id.display_name());
            pb.inc(1);
            report
        })
        .buffered(config.general.concurrency)
        .collect::<Vec<_>>()
        .await;

    pb.finish_and_clear();
    projects
}

/// Handle --dry-run: print dates, sources and queries without any requests.
fn handle_dry_run(config: &Config, dates: &ReportDates) -> Result<i32> {
    println!("\n🔍 Dry run: no requests will be made\n");
    println!("   Report date: {}", dates.report_date);
    println!("   Period: {} - {}", dates.period_start, dates.report_date);
    println!("   Open issues as of: {}", dates.as_of);
    println!(
        "   Aging: {} week interval(s) over {} weeks",
        config.statistics.interval_weeks, config.statistics.lookback_weeks
    );
    println!("   Output: {}", config.general.output);

    for (id, project) in &config.projects {
        println!("\n   📁 {} ({})", id, id.key());

        if let Some(ref key) = project.jira_key {
            let statuses = if project.jira_open_statuses.is_empty() {
                &config.jira.open_statuses
            } else {
                &project.jira_open_statuses
            };
            for priority in [Priority::Blocker, Priority::Critical] {
                println!(
                    "     Jira {}: {}",
                    priority,
                    jira::open_issues_jql(key, statuses, priority, dates)
                );
            }
            println!("     Jira new bugs: {}", jira::new_bugs_jql(key, dates));
            println!(
                "     Jira statistics: {}",
                jira::statistics_jql(
                    key,
                    Priority::Blocker,
                    config.statistics.lookback_weeks,
                    &config.jira.open_statuses,
                    dates
                )
            );
        }
        if let Some(ref repo) = project.github {
            println!("     GitHub: {}/{}", repo.owner, repo.repo);
        }
        for (label, job) in &project.jenkins_jobs {
            println!("     Jenkins {}: {}", label, job);
        }
        if let Some(ref name) = project.confluence_name {
            println!("     Confluence section: {}", name);
        }
    }

    println!("\n✅ Dry run complete. No requests were made.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
