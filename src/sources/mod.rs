//! Clients for the services the report pulls data from.
//!
//! Every client is a thin async wrapper over `reqwest`; payload handling
//! lives in plain functions so it can be tested without a network.

pub mod confluence;
pub mod github;
pub mod jenkins;
pub mod jira;

use crate::config::HttpConfig;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use quick_xml::Reader;
use reqwest::{RequestBuilder, Response};
use std::time::Duration as StdDuration;
use tracing::debug;

pub use confluence::ConfluenceClient;
pub use github::GithubClient;
pub use jenkins::JenkinsClient;
pub use jira::JiraClient;

/// Dates that bound one report run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportDates {
    /// Last day covered by the report.
    pub report_date: NaiveDate,
    /// First day covered by the report (two weeks inclusive).
    pub period_start: NaiveDate,
    /// First merge date counted for pull requests (two weeks back).
    pub merged_since: NaiveDate,
    /// "Today" for issues that are still open.
    pub as_of: NaiveDate,
}

impl ReportDates {
    pub fn new(report_date: NaiveDate, as_of: NaiveDate) -> Self {
        Self {
            report_date,
            period_start: report_date - Duration::weeks(2) + Duration::days(1),
            merged_since: report_date - Duration::weeks(2),
            as_of,
        }
    }

    /// Exclusive upper bound for "created before" queries.
    pub fn day_after_report(&self) -> NaiveDate {
        self.report_date + Duration::days(1)
    }

    /// Exclusive upper bound for issues known on `as_of`.
    pub fn day_after_as_of(&self) -> NaiveDate {
        self.as_of + Duration::days(1)
    }
}

/// Build the HTTP client shared by all sources.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(StdDuration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to create HTTP client")
}

/// Send a request, mapping transport failures to readable errors.
pub(crate) async fn dispatch(request: RequestBuilder, service: &str) -> Result<Response> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            anyhow::anyhow!("{} request timed out", service)
        } else if e.is_connect() {
            anyhow::anyhow!("Cannot connect to {}: {}", service, e)
        } else {
            anyhow::anyhow!("Failed to send {} request: {}", service, e)
        }
    })?;

    debug!("{} responded with {}", service, response.status());
    Ok(response)
}

/// Fail on non-2xx statuses, keeping the response body in the error.
pub(crate) async fn ensure_success(response: Response, service: &str) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("{} API error {}: {}", service, status, body));
    }

    Ok(response)
}

/// Send a request and turn transport failures and non-2xx statuses into errors.
pub(crate) async fn send(request: RequestBuilder, service: &str) -> Result<Response> {
    let response = dispatch(request, service).await?;
    ensure_success(response, service).await
}

/// Percent-encode a query value the way browsers do (`%20` for spaces).
pub fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Event reader for storage-format or HTML markup.
///
/// End tag names are not checked: pages mix XHTML with unclosed HTML tags.
pub(crate) fn markup_reader(markup: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().check_end_names = false;
    reader
}

/// Text of a markup node with named and numeric entities resolved.
pub(crate) fn decode_entities(raw: &[u8]) -> String {
    html_escape::decode_html_entities(&String::from_utf8_lossy(raw)).into_owned()
}

/// Strip a trailing slash so paths can be appended with `/`.
pub(crate) fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_period_is_two_weeks_inclusive() {
        let report_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dates = ReportDates::new(report_date, report_date);

        assert_eq!(dates.period_start, NaiveDate::from_ymd_opt(2024, 2, 17).unwrap());
        assert_eq!(dates.day_after_report(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(dates.merged_since, NaiveDate::from_ymd_opt(2024, 2, 16).unwrap());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("Don&rsquo;t &#8220;ship&#8221; &ndash; &amp;&nbsp;".as_bytes()),
            "Don\u{2019}t \u{201c}ship\u{201d} \u{2013} &\u{a0}"
        );
        assert_eq!(decode_entities(b"plain"), "plain");
    }

    #[test]
    fn test_encode_query_value() {
        assert_eq!(
            encode_query_value("project = RS AND created < '2024-03-02 00:00'"),
            "project%20%3D%20RS%20AND%20created%20%3C%20%272024-03-02%2000%3A00%27"
        );
        assert_eq!(encode_query_value("a+b"), "a%2Bb");
    }

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("https://jira.example.com/"), "https://jira.example.com");
        assert_eq!(trim_base("https://jira.example.com"), "https://jira.example.com");
    }

    #[test]
    fn test_send_reports_connection_failure() {
        let client = build_http_client(&HttpConfig {
            timeout_seconds: 5,
            user_agent: "qareport-test".to_string(),
        })
        .unwrap();

        let result = tokio_test::block_on(send(client.get("http://127.0.0.1:1/"), "Jira"));

        let message = result.unwrap_err().to_string();
        assert!(message.contains("Jira"));
    }
}
