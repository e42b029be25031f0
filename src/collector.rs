//! Per-project data collection.
//!
//! A failing source never aborts the run: the failure is logged and
//! recorded on the project so it shows up in the report.

use crate::analysis::{aggregate, AgingWindow, IssueLifetime};
use crate::config::{Config, ProjectConfig};
use crate::models::{AgingTrend, Priority, ProjectId, ProjectReport};
use crate::sources::confluence::WeeklyPages;
use crate::sources::github::{pull_request_status, recent_pull_requests};
use crate::sources::{
    build_http_client, ConfluenceClient, GithubClient, JenkinsClient, JiraClient, ReportDates,
};
use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// Collects report data for projects from the configured sources.
pub struct Collector {
    jira: Option<JiraClient>,
    github: GithubClient,
    jenkins: Option<JenkinsClient>,
    confluence: Option<ConfluenceClient>,
    open_statuses: Vec<String>,
    lookback_weeks: u32,
    window: AgingWindow,
    dates: ReportDates,
    weekly_pages: Option<Result<WeeklyPages, String>>,
}

impl Collector {
    /// Create clients for every source that has a URL configured.
    pub fn new(config: &Config, dates: ReportDates) -> Result<Self> {
        let http = build_http_client(&config.http)?;
        let credentials = &config.credentials;

        let jira = match config.jira.url {
            Some(ref url) => Some(JiraClient::new(
                http.clone(),
                url,
                credentials.jira_username.clone(),
                credentials.jira_token.clone(),
                config.jira.page_size,
            )),
            None => {
                warn!("Jira URL not configured; skipping issues and statistics");
                None
            }
        };

        if credentials.github_token.is_none() {
            warn!("GITHUB_TOKEN not set; GitHub requests are unauthenticated");
        }
        let github = GithubClient::new(
            http.clone(),
            &config.github.api_url,
            &config.github.web_url,
            credentials.github_token.clone(),
        );

        let jenkins = match config.jenkins.url {
            Some(ref url) => Some(JenkinsClient::new(
                http.clone(),
                url,
                credentials.jenkins_username.clone(),
                credentials.jenkins_token.clone(),
            )),
            None => {
                warn!("Jenkins URL not configured; skipping builds");
                None
            }
        };

        let confluence = match config.confluence.url {
            Some(ref url) => Some(ConfluenceClient::new(
                http,
                url,
                credentials.confluence_token.clone(),
                &config.confluence.page_title_prefix,
            )),
            None => {
                warn!("Confluence URL not configured; skipping tasks");
                None
            }
        };

        Ok(Self {
            jira,
            github,
            jenkins,
            confluence,
            open_statuses: config.jira.open_statuses.clone(),
            lookback_weeks: config.statistics.lookback_weeks,
            window: AgingWindow::weeks(
                config.statistics.interval_weeks,
                config.statistics.lookback_weeks,
            ),
            dates,
            weekly_pages: None,
        })
    }

    /// Fetch the weekly status pages shared by all projects.
    pub async fn load_weekly_pages(&mut self) {
        let Some(ref confluence) = self.confluence else {
            return;
        };

        let result = confluence
            .weekly_pages(self.dates.report_date)
            .await
            .map_err(|e| format!("{:#}", e));
        if let Err(ref e) = result {
            warn!("Failed to load status pages: {}", e);
        }
        self.weekly_pages = Some(result);
    }

    /// Gather everything the report shows for one project.
    pub async fn collect_project(&self, id: ProjectId, project: &ProjectConfig) -> ProjectReport {
        info!("Collecting {}", id);
        let mut report = ProjectReport::new(id);

        if let Some(ref key) = project.jira_key {
            self.collect_jira(key, project, &mut report).await;
        }
        if project.github.is_some() {
            self.collect_github(project, &mut report).await;
        }
        if !project.jenkins_jobs.is_empty() {
            self.collect_builds(project, &mut report).await;
        }
        if let Some(ref name) = project.confluence_name {
            self.collect_tasks(name, &mut report);
        }

        debug!(
            "{}: {} blockers, {} criticals, {} errors",
            id,
            report.blockers.len(),
            report.criticals.len(),
            report.errors.len()
        );
        report
    }

    async fn collect_jira(&self, key: &str, project: &ProjectConfig, report: &mut ProjectReport) {
        let Some(ref jira) = self.jira else {
            return;
        };
        let statuses = if project.jira_open_statuses.is_empty() {
            &self.open_statuses
        } else {
            &project.jira_open_statuses
        };

        match jira.open_issues(key, statuses, Priority::Blocker, &self.dates).await {
            Ok((issues, link)) => {
                report.blockers = issues;
                report.blockers_link = Some(link);
            }
            Err(e) => record_error(report, "Jira blockers", e),
        }

        match jira.open_issues(key, statuses, Priority::Critical, &self.dates).await {
            Ok((issues, link)) => {
                report.criticals = issues;
                report.criticals_link = Some(link);
            }
            Err(e) => record_error(report, "Jira criticals", e),
        }

        match jira.new_bugs(key, &self.dates).await {
            Ok(bugs) => report.new_bugs = Some(bugs),
            Err(e) => record_error(report, "Jira new bugs", e),
        }

        match self.trend(jira, key).await {
            Ok(trend) => report.trend = Some(trend),
            Err(e) => record_error(report, "Jira statistics", e),
        }
    }

    async fn trend(&self, jira: &JiraClient, key: &str) -> Result<AgingTrend> {
        let as_of = self.dates.as_of;
        let blockers = jira
            .issue_lifetimes(
                key,
                Priority::Blocker,
                self.lookback_weeks,
                &self.open_statuses,
                &self.dates,
            )
            .await?;
        let criticals = jira
            .issue_lifetimes(
                key,
                Priority::Critical,
                self.lookback_weeks,
                &self.open_statuses,
                &self.dates,
            )
            .await?;
        let blockers = known_on(key, &blockers, as_of);
        let criticals = known_on(key, &criticals, as_of);

        let reference_date = self.dates.report_date;

        Ok(AgingTrend {
            blockers: aggregate(&blockers, reference_date, self.window, as_of)?,
            criticals: aggregate(&criticals, reference_date, self.window, as_of)?,
        })
    }

    async fn collect_github(&self, project: &ProjectConfig, report: &mut ProjectReport) {
        let Some(ref repo) = project.github else {
            return;
        };

        match self.github.pull_requests(repo).await {
            Ok(prs) => {
                let recent = recent_pull_requests(prs, self.dates.merged_since);
                report.pull_requests = recent.iter().map(pull_request_status).collect();
                report.merged_pull_requests =
                    Some(self.github.merged_pull_requests(repo, &recent, &self.dates));
            }
            Err(e) => record_error(report, "GitHub", e),
        }
    }

    async fn collect_builds(&self, project: &ProjectConfig, report: &mut ProjectReport) {
        let Some(ref jenkins) = self.jenkins else {
            return;
        };

        for (label, job) in &project.jenkins_jobs {
            match jenkins.latest_build(label, job).await {
                Ok(build) => report.builds.push(build),
                Err(e) => record_error(report, &format!("Jenkins {}", label), e),
            }
        }
    }

    fn collect_tasks(&self, name: &str, report: &mut ProjectReport) {
        match self.weekly_pages {
            Some(Ok(ref pages)) => report.tasks = pages.project_tasks(name),
            Some(Err(ref e)) => report.errors.push(format!("Confluence: {}", e)),
            None => {}
        }
    }
}

/// Lifetimes as they stood on `as_of`, dropping issues created later.
fn known_on(key: &str, issues: &[IssueLifetime], as_of: NaiveDate) -> Vec<IssueLifetime> {
    let total = issues.len();
    let known: Vec<_> = issues
        .iter()
        .filter_map(|issue| issue.as_known_on(as_of))
        .collect();

    if known.len() < total {
        warn!(
            "{}: ignoring {} issue(s) created after {}",
            key,
            total - known.len(),
            as_of
        );
    }
    known
}

fn record_error(report: &mut ProjectReport, source: &str, error: anyhow::Error) {
    warn!("{}: {} failed: {:#}", report.name, source, error);
    report.errors.push(format!("{}: {:#}", source, error));
}
