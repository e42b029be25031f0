//! GitHub pull request client.

use super::{dispatch, ensure_success, trim_base, ReportDates};
use crate::config::GithubRepo;
use crate::models::{Link, MergedPullRequests, PullRequestStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// Pull request fields the report needs.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    fn is_open(&self) -> bool {
        self.state == "open"
    }

    fn merged_since(&self, date: NaiveDate) -> bool {
        self.merged_at
            .map(|merged| merged.date_naive() >= date)
            .unwrap_or(false)
    }
}

/// GitHub REST client.
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    web_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, api_url: &str, web_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            api_url: trim_base(api_url).to_string(),
            web_url: trim_base(web_url).to_string(),
            token,
        }
    }

    /// Most recently updated pull requests of a repository (one page of 100).
    pub async fn pull_requests(&self, repo: &GithubRepo) -> Result<Vec<PullRequest>> {
        let url = format!(
            "{}/repos/{}/{}/pulls?state=all&sort=updated&direction=desc&per_page=100",
            self.api_url, repo.owner, repo.repo
        );
        debug!("Fetching pull requests: {}", url);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = dispatch(request, "GitHub").await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            anyhow::bail!("GitHub token is invalid (GITHUB_TOKEN)");
        }

        ensure_success(response, "GitHub")
            .await?
            .json::<Vec<PullRequest>>()
            .await
            .context("Failed to parse GitHub pull request list")
    }

    /// Search link listing pull requests merged in the two weeks up to the report date.
    pub fn merged_link(&self, repo: &GithubRepo, dates: &ReportDates) -> String {
        format!(
            "{}/{}/{}/pulls?q=is%3Apr+is%3Amerged+merged%3A{}..{}T23:59",
            self.web_url,
            repo.owner,
            repo.repo,
            dates.merged_since.format("%Y-%m-%d"),
            dates.report_date.format("%Y-%m-%d")
        )
    }

    /// Merged pull request count and search link.
    pub fn merged_pull_requests(
        &self,
        repo: &GithubRepo,
        recent: &[PullRequest],
        dates: &ReportDates,
    ) -> MergedPullRequests {
        MergedPullRequests {
            count: recent.iter().filter(|pr| pr.merged_at.is_some()).count(),
            link: self.merged_link(repo, dates),
        }
    }
}

/// Keep pull requests that are open or were merged on or after `merged_since`.
pub fn recent_pull_requests(prs: Vec<PullRequest>, merged_since: NaiveDate) -> Vec<PullRequest> {
    prs.into_iter()
        .filter(|pr| pr.is_open() || pr.merged_since(merged_since))
        .collect()
}

/// Table title of a pull request: `PR-{number}: {title}` without a trailing period.
pub fn format_title(number: u64, title: &str) -> String {
    let title = title.trim();
    let title = title.strip_suffix('.').unwrap_or(title);
    format!("PR-{}: {}", number, title)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Row of the project's pull request table.
pub fn pull_request_status(pr: &PullRequest) -> PullRequestStatus {
    PullRequestStatus {
        link: Link::new(pr.html_url.clone(), format_title(pr.number, &pr.title)),
        status: capitalize(&pr.state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PULLS_JSON: &str = r#"[
        {"number": 12, "title": "Fix AOV export.", "html_url": "https://github.com/acme/plugin/pull/12",
         "state": "open", "merged_at": null},
        {"number": 11, "title": "Bump SDK", "html_url": "https://github.com/acme/plugin/pull/11",
         "state": "closed", "merged_at": "2024-02-20T10:00:00Z"},
        {"number": 10, "title": "Old change", "html_url": "https://github.com/acme/plugin/pull/10",
         "state": "closed", "merged_at": "2024-01-02T10:00:00Z"},
        {"number": 9, "title": "Abandoned", "html_url": "https://github.com/acme/plugin/pull/9",
         "state": "closed", "merged_at": null}
    ]"#;

    fn dates() -> ReportDates {
        let report_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        ReportDates::new(report_date, report_date)
    }

    fn repo() -> GithubRepo {
        GithubRepo {
            owner: "acme".to_string(),
            repo: "plugin".to_string(),
        }
    }

    #[test]
    fn test_recent_pull_requests() {
        let prs: Vec<PullRequest> = serde_json::from_str(PULLS_JSON).unwrap();
        let recent = recent_pull_requests(prs, dates().merged_since);

        let numbers: Vec<u64> = recent.iter().map(|pr| pr.number).collect();
        assert_eq!(numbers, vec![12, 11]);
    }

    #[test]
    fn test_merged_two_weeks_before_report_is_kept() {
        let json = r#"[
            {"number": 8, "title": "Edge", "html_url": "https://github.com/acme/plugin/pull/8",
             "state": "closed", "merged_at": "2024-02-16T08:00:00Z"},
            {"number": 7, "title": "Too old", "html_url": "https://github.com/acme/plugin/pull/7",
             "state": "closed", "merged_at": "2024-02-15T23:00:00Z"}
        ]"#;
        let prs: Vec<PullRequest> = serde_json::from_str(json).unwrap();

        let recent = recent_pull_requests(prs, dates().merged_since);

        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].number, 8);
    }

    #[test]
    fn test_format_title() {
        assert_eq!(format_title(12, "  Fix AOV export. "), "PR-12: Fix AOV export");
        assert_eq!(format_title(3, "Support v2..."), "PR-3: Support v2..");
        assert_eq!(format_title(4, "No period"), "PR-4: No period");
    }

    #[test]
    fn test_pull_request_status() {
        let prs: Vec<PullRequest> = serde_json::from_str(PULLS_JSON).unwrap();
        let row = pull_request_status(&prs[0]);

        assert_eq!(row.status, "Open");
        assert_eq!(row.link.text, "PR-12: Fix AOV export");
        assert_eq!(row.link.url, "https://github.com/acme/plugin/pull/12");
        assert_eq!(pull_request_status(&prs[1]).status, "Closed");
    }

    #[test]
    fn test_merged_pull_requests() {
        let client = GithubClient::new(
            reqwest::Client::new(),
            "https://api.github.com",
            "https://github.com/",
            None,
        );
        let prs: Vec<PullRequest> = serde_json::from_str(PULLS_JSON).unwrap();
        let recent = recent_pull_requests(prs, dates().merged_since);

        let merged = client.merged_pull_requests(&repo(), &recent, &dates());

        assert_eq!(merged.count, 1);
        assert_eq!(
            merged.link,
            "https://github.com/acme/plugin/pulls?q=is%3Apr+is%3Amerged+merged%3A2024-02-16..2024-03-01T23:59"
        );
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("open"), "Open");
        assert_eq!(capitalize("CLOSED"), "Closed");
        assert_eq!(capitalize(""), "");
    }
}
