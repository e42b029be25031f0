//! Jira search client.
//!
//! Fetches open blockers and criticals, counts newly reported bugs and
//! collects issue lifetimes for the aging statistics.

use super::{encode_query_value, send, trim_base, ReportDates};
use crate::analysis::IssueLifetime;
use crate::models::{NewBugs, Priority, TrackedIssue};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

/// One page of `/rest/api/2/search` results.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    #[serde(default)]
    pub fields: JiraFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub status: Option<JiraStatus>,
    #[serde(default)]
    pub statuscategorychangedate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraStatus {
    pub name: String,
}

/// Jira REST client.
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
    page_size: u32,
}

impl JiraClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        username: Option<String>,
        token: Option<String>,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            base_url: trim_base(base_url).to_string(),
            username,
            token,
            page_size,
        }
    }

    /// Browse link of a single issue.
    pub fn browse_link(&self, key: &str) -> String {
        format!("{}/browse/{}", self.base_url, key)
    }

    /// Project issue navigator filtered by `jql`.
    pub fn project_issues_link(&self, project_key: &str, jql: &str) -> String {
        format!(
            "{}/jira/software/c/projects/{}/issues/?jql={}",
            self.base_url,
            project_key,
            encode_query_value(jql)
        )
    }

    /// Global issue search filtered by `jql`.
    pub fn search_link(&self, jql: &str) -> String {
        format!("{}/issues/?jql={}", self.base_url, encode_query_value(jql))
    }

    async fn search(
        &self,
        jql: &str,
        fields: &str,
        start_at: u64,
        max_results: u32,
    ) -> Result<SearchResponse> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        debug!("Jira search (startAt={}): {}", start_at, jql);

        let mut request = self.http.get(&url).query(&[
            ("jql", jql.to_string()),
            ("fields", fields.to_string()),
            ("startAt", start_at.to_string()),
            ("maxResults", max_results.to_string()),
        ]);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.token.as_ref());
        }

        send(request, "Jira")
            .await?
            .json::<SearchResponse>()
            .await
            .context("Failed to parse Jira search response")
    }

    /// Run a search and follow pagination until every match is loaded.
    async fn search_all(&self, jql: &str, fields: &str) -> Result<Vec<JiraIssue>> {
        collect_pages(|start_at| self.search(jql, fields, start_at, self.page_size)).await
    }

    /// Open issues of one priority, newest first, plus the "view all" link.
    pub async fn open_issues(
        &self,
        project_key: &str,
        statuses: &[String],
        priority: Priority,
        dates: &ReportDates,
    ) -> Result<(Vec<TrackedIssue>, String)> {
        let jql = open_issues_jql(project_key, statuses, priority, dates);
        let issues = self.search_all(&jql, "summary").await?;

        let tracked = issues
            .into_iter()
            .map(|issue| TrackedIssue {
                link: self.browse_link(&issue.key),
                summary: issue.fields.summary.unwrap_or_default(),
                key: issue.key,
            })
            .collect();

        Ok((tracked, self.project_issues_link(project_key, &jql)))
    }

    /// Bugs created during the report period.
    pub async fn new_bugs(&self, project_key: &str, dates: &ReportDates) -> Result<NewBugs> {
        let jql = new_bugs_jql(project_key, dates);
        let page = self.search(&jql, "key", 0, 0).await?;

        Ok(NewBugs {
            count: page.total,
            link: self.search_link(&jql),
        })
    }

    /// Lifetimes of issues relevant to the aging window.
    pub async fn issue_lifetimes(
        &self,
        project_key: &str,
        priority: Priority,
        lookback_weeks: u32,
        open_statuses: &[String],
        dates: &ReportDates,
    ) -> Result<Vec<IssueLifetime>> {
        let jql = statistics_jql(project_key, priority, lookback_weeks, open_statuses, dates);
        let issues = self
            .search_all(&jql, "statuscategorychangedate,created,status")
            .await?;

        Ok(lifetimes_from_issues(&issues, open_statuses))
    }
}

/// Request pages from `fetch` until `total` issues are loaded or a page comes back empty.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<JiraIssue>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<SearchResponse>>,
{
    let mut issues = Vec::new();
    let mut start_at = 0u64;

    loop {
        let page = fetch(start_at).await?;
        let received = page.issues.len() as u64;
        issues.extend(page.issues);
        start_at += received;

        if received == 0 || start_at >= page.total {
            break;
        }
    }

    Ok(issues)
}

/// Quote and comma-join status names for a JQL `in (...)` clause.
fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(",")
}

/// JQL for open issues of one priority created up to the report date.
pub fn open_issues_jql(
    project_key: &str,
    statuses: &[String],
    priority: Priority,
    dates: &ReportDates,
) -> String {
    format!(
        "project = {} AND issuetype in (Bug, Sub-task) AND status in ({}) AND priority = {} \
         AND created < '{} 00:00' ORDER BY created DESC",
        project_key,
        quote_list(statuses),
        priority.jira_name(),
        dates.day_after_report().format("%Y-%m-%d")
    )
}

/// JQL for bugs created during the report period.
pub fn new_bugs_jql(project_key: &str, dates: &ReportDates) -> String {
    format!(
        "created >= {} AND created < '{} 00:00' AND project = {} \
         AND issuetype in (Bug, Sub-task) ORDER BY created DESC",
        dates.period_start.format("%Y-%m-%d"),
        dates.day_after_report().format("%Y-%m-%d"),
        project_key
    )
}

/// JQL for issues that may have been open during the lookback window,
/// created no later than `as_of`.
pub fn statistics_jql(
    project_key: &str,
    priority: Priority,
    lookback_weeks: u32,
    open_statuses: &[String],
    dates: &ReportDates,
) -> String {
    format!(
        "project = {} AND issuetype in (Bug, Sub-task) AND priority = {} \
         AND (updated >= -{}w OR status IN ({})) AND created < '{} 00:00' ORDER BY created ASC",
        project_key,
        priority.jira_name(),
        lookback_weeks,
        quote_list(open_statuses),
        dates.day_after_as_of().format("%Y-%m-%d")
    )
}

/// Date part of a Jira timestamp such as `2024-02-20T10:00:00.000+0000`.
fn date_part(timestamp: &str) -> Option<NaiveDate> {
    let date = timestamp.split('T').next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Convert search results into open/close spans.
///
/// An issue whose status is in `open_statuses` has no close date; any
/// other status closes it on the date its status category last changed.
/// Issues without the needed timestamps are skipped.
pub fn lifetimes_from_issues(issues: &[JiraIssue], open_statuses: &[String]) -> Vec<IssueLifetime> {
    issues
        .iter()
        .filter_map(|issue| {
            let opened_on = match issue.fields.created.as_deref().and_then(date_part) {
                Some(date) => date,
                None => {
                    warn!("Skipping {}: missing creation date", issue.key);
                    return None;
                }
            };

            let is_open = issue
                .fields
                .status
                .as_ref()
                .map(|s| open_statuses.iter().any(|open| open == &s.name))
                .unwrap_or(false);
            if is_open {
                return Some(IssueLifetime::new(opened_on, None));
            }

            match issue
                .fields
                .statuscategorychangedate
                .as_deref()
                .and_then(date_part)
            {
                Some(closed_on) => Some(IssueLifetime::new(opened_on, Some(closed_on))),
                None => {
                    warn!("Skipping {}: closed without a status change date", issue.key);
                    None
                }
            }
        })
        .collect()
}
