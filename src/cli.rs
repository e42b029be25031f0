//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::MAX_WINDOW_WEEKS;
use crate::models::ProjectId;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// qareport - weekly QA status report generator
///
/// Collects open blockers and criticals, new bugs, pull requests, weekly
/// builds and status-page tasks for each tracked project, and renders them
/// as a Markdown or JSON report with issue-aging trends.
///
/// Examples:
///   qareport
///   qareport --date 2024-02-29 --format json -o report.json
///   qareport --project maya-rpr,houdini --lookback-weeks 12
///   qareport --dry-run
///   qareport --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Last day covered by the report (YYYY-MM-DD, default: today)
    #[arg(long, value_name = "DATE")]
    pub date: Option<NaiveDate>,

    /// Date treated as "today" for still-open issues (default: today)
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<NaiveDate>,

    /// Output file path for the report
    ///
    /// Default: from config or qa_report.md
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .qareport.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only report these projects (comma-separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub project: Option<Vec<ProjectId>>,

    /// Width of one issue-aging interval in weeks
    #[arg(long, value_name = "WEEKS")]
    pub interval_weeks: Option<u32>,

    /// Issue-aging lookback horizon in weeks
    #[arg(long, value_name = "WEEKS")]
    pub lookback_weeks: Option<u32>,

    /// Number of projects collected concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: print dates, projects and queries without contacting any service
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with code 2 when any project has open blockers
    #[arg(long)]
    pub fail_on_blockers: bool,

    /// Generate a default .qareport.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Jira base URL
    #[arg(long, env = "JIRA_URL", value_name = "URL")]
    pub jira_url: Option<String>,

    /// Jira user name
    #[arg(long, env = "JIRA_USERNAME", hide_env_values = true)]
    pub jira_username: Option<String>,

    /// Jira API token
    #[arg(long, env = "JIRA_TOKEN", hide_env_values = true)]
    pub jira_token: Option<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Jenkins base URL
    #[arg(long, env = "JENKINS_URL", value_name = "URL")]
    pub jenkins_url: Option<String>,

    /// Jenkins user name
    #[arg(long, env = "JENKINS_USERNAME", hide_env_values = true)]
    pub jenkins_username: Option<String>,

    /// Jenkins API token
    #[arg(long, env = "JENKINS_TOKEN", hide_env_values = true)]
    pub jenkins_token: Option<String>,

    /// Confluence base URL
    #[arg(long, env = "CONFLUENCE_URL", value_name = "URL")]
    pub confluence_url: Option<String>,

    /// Confluence personal access token
    #[arg(long, env = "CONFLUENCE_TOKEN", hide_env_values = true)]
    pub confluence_token: Option<String>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.interval_weeks == Some(0) {
            return Err("Interval must be at least 1 week".to_string());
        }

        for weeks in [self.interval_weeks, self.lookback_weeks].into_iter().flatten() {
            if weeks > MAX_WINDOW_WEEKS {
                return Err(format!(
                    "Aging window must not exceed {} weeks, got {}",
                    MAX_WINDOW_WEEKS, weeks
                ));
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let (Some(date), Some(as_of)) = (self.date, self.as_of) {
            if as_of < date {
                return Err(format!(
                    "--as-of ({}) must not be before the report date ({})",
                    as_of, date
                ));
            }
        }

        for url in [&self.jira_url, &self.jenkins_url, &self.confluence_url]
            .into_iter()
            .flatten()
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        if let Some(ref projects) = self.project {
            if projects.is_empty() {
                return Err("--project needs at least one project".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            date: None,
            as_of: None,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            project: None,
            interval_weeks: None,
            lookback_weeks: None,
            concurrency: None,
            timeout: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            fail_on_blockers: false,
            init_config: false,
            jira_url: None,
            jira_username: None,
            jira_token: None,
            github_token: None,
            jenkins_url: None,
            jenkins_username: None,
            jenkins_token: None,
            confluence_url: None,
            confluence_token: None,
        }
    }

    #[test]
    fn test_validation_defaults() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_as_of_before_date() {
        let mut args = make_args();
        args.date = NaiveDate::from_ymd_opt(2024, 3, 1);
        args.as_of = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert!(args.validate().is_err());

        args.as_of = NaiveDate::from_ymd_opt(2024, 3, 8);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.jira_url = Some("jira.example.com".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_interval() {
        let mut args = make_args();
        args.interval_weeks = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_oversized_window() {
        let args = Args::try_parse_from(["qareport", "--lookback-weeks", "4294967295"]).unwrap();
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.interval_weeks = Some(MAX_WINDOW_WEEKS + 1);
        assert!(args.validate().is_err());

        args.interval_weeks = Some(2);
        args.lookback_weeks = Some(MAX_WINDOW_WEEKS);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_parse_projects_and_dates() {
        let args = Args::try_parse_from([
            "qareport",
            "--project",
            "maya-rpr,hdrpr",
            "--date",
            "2024-02-29",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.project, Some(vec![ProjectId::MayaRpr, ProjectId::HdRpr]));
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
