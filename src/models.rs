//! Data models for the QA report.
//!
//! This module contains the core data structures shared by the source
//! clients, the report assembly step, and the renderers.

use crate::analysis::AgingSeries;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Tracked project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum ProjectId {
    MayaRpr,
    MayaUsd,
    BlenderRpr,
    BlenderUsd,
    Houdini,
    RenderStudio,
    #[value(name = "hdrpr")]
    HdRpr,
    Solidworks,
    #[value(name = "materialx")]
    MaterialX,
    Inventor,
    Wml,
    RprHybrid,
}

impl ProjectId {
    /// All projects, in report order.
    pub const ALL: [ProjectId; 12] = [
        ProjectId::MayaRpr,
        ProjectId::MayaUsd,
        ProjectId::BlenderRpr,
        ProjectId::BlenderUsd,
        ProjectId::Houdini,
        ProjectId::RenderStudio,
        ProjectId::HdRpr,
        ProjectId::Solidworks,
        ProjectId::MaterialX,
        ProjectId::Inventor,
        ProjectId::Wml,
        ProjectId::RprHybrid,
    ];

    /// Identifier used in configuration files and on the command line.
    pub fn key(&self) -> &'static str {
        match self {
            ProjectId::MayaRpr => "maya-rpr",
            ProjectId::MayaUsd => "maya-usd",
            ProjectId::BlenderRpr => "blender-rpr",
            ProjectId::BlenderUsd => "blender-usd",
            ProjectId::Houdini => "houdini",
            ProjectId::RenderStudio => "render-studio",
            ProjectId::HdRpr => "hdrpr",
            ProjectId::Solidworks => "solidworks",
            ProjectId::MaterialX => "materialx",
            ProjectId::Inventor => "inventor",
            ProjectId::Wml => "wml",
            ProjectId::RprHybrid => "rpr-hybrid",
        }
    }

    /// Returns the human-readable project name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProjectId::MayaRpr => "Maya RPR",
            ProjectId::MayaUsd => "Maya USD",
            ProjectId::BlenderRpr => "Blender RPR",
            ProjectId::BlenderUsd => "Blender USD",
            ProjectId::Houdini => "Houdini",
            ProjectId::RenderStudio => "Render Studio",
            ProjectId::HdRpr => "hdRPR",
            ProjectId::Solidworks => "Solidworks",
            ProjectId::MaterialX => "MaterialX",
            ProjectId::Inventor => "Inventor",
            ProjectId::Wml => "WML",
            ProjectId::RprHybrid => "RPR Hybrid",
        }
    }
}

impl FromStr for ProjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectId::ALL
            .into_iter()
            .find(|id| id.key() == s)
            .ok_or_else(|| format!("unknown project: {}", s))
    }
}

// Serialized as the plain key so it can be used as a TOML table name.
impl Serialize for ProjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Issue priority tracked by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Blocker,
    Critical,
}

impl Priority {
    /// Priority name as used in Jira queries.
    pub fn jira_name(&self) -> &'static str {
        match self {
            Priority::Blocker => "Blocker",
            Priority::Critical => "Critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.jira_name())
    }
}

/// A hyperlink with display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

impl Link {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }

    /// Markdown rendering of the link. Brackets in the text are escaped.
    pub fn to_markdown(&self) -> String {
        let text = self
            .text
            .replace('\\', "\\\\")
            .replace('[', "\\[")
            .replace(']', "\\]");
        format!("[{}]({})", text, self.url)
    }
}

/// An open issue listed in the report (blocker or critical).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIssue {
    /// Issue key, e.g. `RPRMAYA-1234`.
    pub key: String,
    /// Browse URL of the issue.
    pub link: String,
    /// Issue summary line.
    pub summary: String,
}

/// Bugs created during the report period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBugs {
    pub count: u64,
    pub link: String,
}

/// A pull request row in the project's PR table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStatus {
    pub link: Link,
    pub status: String,
}

/// Pull requests merged during the report period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPullRequests {
    pub count: usize,
    pub link: String,
}

/// Latest build of one Jenkins job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Job label from the project configuration.
    pub label: String,
    /// Build date, formatted `dd-Mon-YYYY`.
    pub date: String,
    /// Link to the test report, if the build page has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_link: Option<String>,
    /// Product version extracted from the build description.
    pub version: String,
    /// Build result.
    pub status: String,
}

/// Completion state of a weekly task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Complete,
    Incomplete,
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "complete" => TaskStatus::Complete,
            _ => TaskStatus::Incomplete,
        }
    }
}

/// Priority marker of a weekly task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
    Unspecified,
}

/// A task from the weekly status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

/// Blocker and critical issue-aging series of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingTrend {
    pub blockers: AgingSeries,
    pub criticals: AgingSeries,
}

impl AgingTrend {
    /// Returns true when no interval has an open issue of either priority.
    pub fn is_empty(&self) -> bool {
        self.blockers.counts().iter().all(|c| *c == 0)
            && self.criticals.counts().iter().all(|c| *c == 0)
    }
}

/// Everything the report shows for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReport {
    pub id: ProjectId,
    pub name: String,
    pub builds: Vec<BuildInfo>,
    pub pull_requests: Vec<PullRequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_pull_requests: Option<MergedPullRequests>,
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_bugs: Option<NewBugs>,
    pub blockers: Vec<TrackedIssue>,
    pub criticals: Vec<TrackedIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockers_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criticals_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<AgingTrend>,
    /// Sources that failed for this project.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ProjectReport {
    /// Creates an empty project report.
    pub fn new(id: ProjectId) -> Self {
        Self {
            id,
            name: id.display_name().to_string(),
            builds: Vec::new(),
            pull_requests: Vec::new(),
            merged_pull_requests: None,
            tasks: Vec::new(),
            new_bugs: None,
            blockers: Vec::new(),
            criticals: Vec::new(),
            blockers_link: None,
            criticals_link: None,
            trend: None,
            errors: Vec::new(),
        }
    }

    /// Tasks completed this period.
    pub fn completed_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Complete)
    }

    /// Tasks still planned.
    pub fn planned_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Incomplete)
    }

    /// Date of the first configured build, if any.
    pub fn last_build_date(&self) -> Option<&str> {
        self.builds.first().map(|b| b.date.as_str())
    }
}

/// One row of the summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_bugs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_pull_requests: Option<usize>,
    pub blockers: usize,
    pub criticals: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build: Option<String>,
}

/// Metadata about the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// First day of the report period.
    pub period_start: NaiveDate,
    /// Last day of the report period.
    pub report_date: NaiveDate,
    /// Date used as "today" for still-open issues.
    pub as_of: NaiveDate,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Width of one aging interval in weeks.
    pub interval_weeks: u32,
    /// Aging lookback horizon in weeks.
    pub lookback_weeks: u32,
    /// Duration of data collection in seconds.
    pub duration_seconds: f64,
}

impl ReportMetadata {
    /// Period string shown in the report header.
    pub fn period(&self) -> String {
        format!(
            "{} - {}",
            self.period_start.format("%d-%B-%Y"),
            self.report_date.format("%d-%B-%Y")
        )
    }
}

/// The complete weekly QA report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: Vec<SummaryRow>,
    pub main_tasks: Vec<String>,
    pub projects: Vec<ProjectReport>,
}

impl Report {
    /// Total number of open blockers across all projects.
    pub fn total_blockers(&self) -> usize {
        self.projects.iter().map(|p| p.blockers.len()).sum()
    }
}
