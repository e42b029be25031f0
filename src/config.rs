//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.qareport.toml` files and the command line.

use crate::models::ProjectId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".qareport.toml";

/// Upper bound for the aging interval and lookback, in weeks (ten years).
pub const MAX_WINDOW_WEEKS: u32 = 520;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Issue-aging statistics settings.
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Jira settings.
    #[serde(default)]
    pub jira: JiraConfig,

    /// GitHub settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Jenkins settings.
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    /// Confluence settings.
    #[serde(default)]
    pub confluence: ConfluenceConfig,

    /// Per-project source mappings.
    #[serde(default = "default_projects")]
    pub projects: BTreeMap<ProjectId, ProjectConfig>,

    /// Service credentials; only ever taken from the environment or CLI.
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            statistics: StatisticsConfig::default(),
            http: HttpConfig::default(),
            jira: JiraConfig::default(),
            github: GithubConfig::default(),
            jenkins: JenkinsConfig::default(),
            confluence: ConfluenceConfig::default(),
            projects: default_projects(),
            credentials: Credentials::default(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of projects fetched concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "qa_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Issue-aging window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Width of one trend interval in weeks.
    #[serde(default = "default_interval_weeks")]
    pub interval_weeks: u32,

    /// Total lookback horizon in weeks.
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: u32,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            interval_weeks: default_interval_weeks(),
            lookback_weeks: default_lookback_weeks(),
        }
    }
}

fn default_interval_weeks() -> u32 {
    1
}

fn default_lookback_weeks() -> u32 {
    26
}

/// HTTP client settings shared by all sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// User-Agent header (GitHub rejects requests without one).
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("qareport/{}", env!("CARGO_PKG_VERSION"))
}

/// Jira settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Jira base URL; the source is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Status names treated as "open" by the aging statistics.
    #[serde(default = "default_open_statuses")]
    pub open_statuses: Vec<String>,

    /// Issues requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            url: None,
            open_statuses: default_open_statuses(),
            page_size: default_page_size(),
        }
    }
}

fn default_open_statuses() -> Vec<String> {
    strings(&[
        "Assessment",
        "Backlog",
        "Blocked",
        "Deployment",
        "In Progress",
        "In Review",
        "In Test",
        "In Testing",
        "Needs Merging",
        "Open",
        "Planning",
        "Reopened",
        "Selected for development",
        "Testing / QA",
        "Testing/QA",
        "To Do",
        "Waiting for Merge",
    ])
}

fn default_page_size() -> u32 {
    100
}

/// GitHub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL.
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Web base URL used for links.
    #[serde(default = "default_github_web_url")]
    pub web_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            web_url: default_github_web_url(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_web_url() -> String {
    "https://github.com".to_string()
}

/// Jenkins settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JenkinsConfig {
    /// Jenkins base URL; the source is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Confluence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Confluence base URL; the source is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Weekly status page title, followed by the `dd/mm/YYYY` date.
    #[serde(default = "default_page_title_prefix")]
    pub page_title_prefix: String,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            url: None,
            page_title_prefix: default_page_title_prefix(),
        }
    }
}

fn default_page_title_prefix() -> String {
    "Thursday weekly".to_string()
}

/// GitHub repository coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubRepo {
    pub owner: String,
    pub repo: String,
}

/// Where each source finds data for one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Jira project key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_key: Option<String>,

    /// Status names that count as open for this project's issue lists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jira_open_statuses: Vec<String>,

    /// GitHub repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubRepo>,

    /// Jenkins jobs, label to job path (e.g. `job/Plugin-Weekly`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jenkins_jobs: BTreeMap<String, String>,

    /// Project heading on the Confluence status page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confluence_name: Option<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn github(owner: &str, repo: &str) -> Option<GithubRepo> {
    Some(GithubRepo {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

fn jobs(default_job: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("default".to_string(), default_job.to_string())])
}

fn default_projects() -> BTreeMap<ProjectId, ProjectConfig> {
    let plugin_statuses = strings(&[
        "In Progress",
        "Assessment",
        "In Review",
        "In Test",
        "Open",
        "Reopened",
        "Blocked",
    ]);

    BTreeMap::from([
        (
            ProjectId::MayaRpr,
            ProjectConfig {
                jira_key: Some("RPRMAYA".to_string()),
                jira_open_statuses: plugin_statuses.clone(),
                github: github("GPUOpen-LibrariesAndSDKs", "RadeonProRenderMayaPlugin"),
                jenkins_jobs: jobs("job/RPR-MayaPlugin-Weekly"),
                confluence_name: Some("RPR Maya".to_string()),
            },
        ),
        (
            ProjectId::MayaUsd,
            ProjectConfig {
                jira_key: Some("MAYAUS".to_string()),
                jira_open_statuses: plugin_statuses.clone(),
                github: github("GPUOpen-LibrariesAndSDKs", "RadeonProRenderMayaUSD"),
                jenkins_jobs: jobs("job/USD-MayaPlugin-Weekly"),
                confluence_name: Some("Maya USD".to_string()),
            },
        ),
        (
            ProjectId::BlenderRpr,
            ProjectConfig {
                jira_key: Some("RPRBLND".to_string()),
                jira_open_statuses: plugin_statuses.clone(),
                github: github("GPUOpen-LibrariesAndSDKs", "RadeonProRenderBlenderAddon"),
                jenkins_jobs: jobs("job/RPR-BlenderPlugin-Weekly"),
                confluence_name: Some("RPR Blender".to_string()),
            },
        ),
        (
            ProjectId::BlenderUsd,
            ProjectConfig {
                jira_key: Some("BLEN".to_string()),
                jira_open_statuses: plugin_statuses,
                github: github("GPUOpen-LibrariesAndSDKs", "BlenderUSDHydraAddon"),
                jenkins_jobs: jobs("job/USD-BlenderPlugin-Weekly"),
                confluence_name: Some("Blender USD".to_string()),
            },
        ),
        (
            ProjectId::Houdini,
            ProjectConfig {
                jira_key: Some("RPRHOUD".to_string()),
                jira_open_statuses: strings(&[
                    "Backlog",
                    "Blocked",
                    "In Progress",
                    "Selected for development",
                    "Testing / QA",
                ]),
                github: github("GPUOpen-LibrariesAndSDKs", "RadeonProRenderUSD"),
                jenkins_jobs: jobs("job/USD-HoudiniPlugin-Weekly"),
                confluence_name: Some("Houdini".to_string()),
            },
        ),
        (
            ProjectId::RenderStudio,
            ProjectConfig {
                jira_key: Some("RS".to_string()),
                jira_open_statuses: strings(&[
                    "Backlog",
                    "Blocked",
                    "In Progress",
                    "Testing/QA",
                    "To Do",
                    "Waiting for Merge",
                ]),
                github: github("Radeon-Pro", "WebUsdViewer"),
                jenkins_jobs: jobs("job/RenderStudio-Weekly"),
                confluence_name: Some("Render Studio".to_string()),
            },
        ),
        (
            ProjectId::HdRpr,
            ProjectConfig {
                jira_key: Some("RPRUSD".to_string()),
                jira_open_statuses: strings(&[
                    "Backlog",
                    "In Progress",
                    "In Testing",
                    "Selected for Development",
                    "To Do",
                    "Blocked",
                ]),
                github: github("GPUOpen-LibrariesAndSDKs", "RadeonProRenderUSD"),
                jenkins_jobs: jobs("job/HdRPR-Weekly"),
                confluence_name: Some("hdRPR".to_string()),
            },
        ),
        (
            ProjectId::Solidworks,
            ProjectConfig {
                jira_key: Some("SV".to_string()),
                jira_open_statuses: strings(&[
                    "Blocked",
                    "In Progress",
                    "In Test",
                    "Needs Merging",
                    "To Do",
                ]),
                confluence_name: Some("Solidworks".to_string()),
                ..ProjectConfig::default()
            },
        ),
        (
            ProjectId::MaterialX,
            ProjectConfig {
                jenkins_jobs: jobs("job/MaterialXvsHdRPR-Weekly"),
                ..ProjectConfig::default()
            },
        ),
        (
            ProjectId::Inventor,
            ProjectConfig {
                jira_key: Some("INV".to_string()),
                jira_open_statuses: strings(&["In Progress", "In Testing", "Open", "Reopened"]),
                github: github("Radeon-Pro", "RadeonProRenderInventorPlugin"),
                jenkins_jobs: jobs("job/USD-Viewer-Weekly"),
                confluence_name: Some("Inventor".to_string()),
            },
        ),
        (ProjectId::Wml, ProjectConfig::default()),
        (
            ProjectId::RprHybrid,
            ProjectConfig {
                jira_key: Some("RPRHYB".to_string()),
                jira_open_statuses: strings(&[
                    "Assessment",
                    "Deployment",
                    "Blocked",
                    "In Progress",
                    "In Review",
                    "In Test",
                    "Open",
                    "Planning",
                    "Reopened",
                    "To Do",
                ]),
                ..ProjectConfig::default()
            },
        ),
    ])
}

/// Service credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    pub jira_username: Option<String>,
    pub jira_token: Option<String>,
    pub github_token: Option<String>,
    pub jenkins_username: Option<String>,
    pub jenkins_token: Option<String>,
    pub confluence_token: Option<String>,
}

// Never print secrets.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }

        f.debug_struct("Credentials")
            .field("jira_username", &self.jira_username)
            .field("jira_token", &mask(&self.jira_token))
            .field("github_token", &mask(&self.github_token))
            .field("jenkins_username", &self.jenkins_username)
            .field("jenkins_token", &mask(&self.jenkins_token))
            .field("confluence_token", &mask(&self.confluence_token))
            .finish()
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings; only
    /// explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(weeks) = args.interval_weeks {
            self.statistics.interval_weeks = weeks;
        }
        if let Some(weeks) = args.lookback_weeks {
            self.statistics.lookback_weeks = weeks;
        }
        if let Some(timeout) = args.timeout {
            self.http.timeout_seconds = timeout;
        }

        if args.jira_url.is_some() {
            self.jira.url = args.jira_url.clone();
        }
        if args.jenkins_url.is_some() {
            self.jenkins.url = args.jenkins_url.clone();
        }
        if args.confluence_url.is_some() {
            self.confluence.url = args.confluence_url.clone();
        }

        // Restrict to the requested projects
        if let Some(ref selected) = args.project {
            self.projects.retain(|id, _| selected.contains(id));
        }

        self.credentials = Credentials {
            jira_username: args.jira_username.clone(),
            jira_token: args.jira_token.clone(),
            github_token: args.github_token.clone(),
            jenkins_username: args.jenkins_username.clone(),
            jenkins_token: args.jenkins_token.clone(),
            confluence_token: args.confluence_token.clone(),
        };
    }

    /// Check values that the CLI cannot validate on its own.
    pub fn validate(&self) -> Result<()> {
        if self.statistics.interval_weeks == 0 {
            anyhow::bail!("statistics.interval_weeks must be at least 1");
        }
        if self.statistics.interval_weeks > MAX_WINDOW_WEEKS
            || self.statistics.lookback_weeks > MAX_WINDOW_WEEKS
        {
            anyhow::bail!(
                "statistics.interval_weeks and lookback_weeks must not exceed {}",
                MAX_WINDOW_WEEKS
            );
        }
        if self.general.concurrency == 0 {
            anyhow::bail!("general.concurrency must be at least 1");
        }
        if self.jira.page_size == 0 {
            anyhow::bail!("jira.page_size must be at least 1");
        }
        if self.http.timeout_seconds == 0 {
            anyhow::bail!("http.timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
