//! Jenkins weekly build client.

use super::{decode_entities, markup_reader, send, trim_base};
use crate::models::BuildInfo;
use anyhow::{Context, Result};
use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

/// Path fragment of the published test report links.
const REPORT_LINK_MARKER: &str = "Test_20Report";

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(rename = "lastBuild")]
    last_build: Option<LastBuild>,
}

/// The `lastBuild` object of a job.
#[derive(Debug, Clone, Deserialize)]
pub struct LastBuild {
    /// Start time in milliseconds since the epoch.
    pub timestamp: i64,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` while the build is running.
    #[serde(default)]
    pub result: Option<String>,
}

/// Jenkins REST client.
pub struct JenkinsClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
}

impl JenkinsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        username: Option<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: trim_base(base_url).to_string(),
            username,
            token,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match self.username {
            Some(ref username) => request.basic_auth(username, self.token.as_ref()),
            None => request,
        }
    }

    async fn last_build(&self, job: &str) -> Result<LastBuild> {
        let url = format!("{}/{}/api/json?tree=lastBuild[*]", self.base_url, job);
        debug!("Fetching last build: {}", url);

        let response: JobResponse = send(self.get(&url), "Jenkins")
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse Jenkins response for {}", job))?;

        response
            .last_build
            .with_context(|| format!("Jenkins job {} has no builds", job))
    }

    /// Latest build of `job`, shown under `label`.
    pub async fn latest_build(&self, label: &str, job: &str) -> Result<BuildInfo> {
        let build = self.last_build(job).await?;

        let report_link = match send(self.get(&build.url), "Jenkins").await {
            Ok(response) => {
                let page = response
                    .text()
                    .await
                    .context("Failed to read Jenkins build page")?;
                extract_report_link(&page, &self.base_url)
            }
            Err(e) => {
                warn!("Could not load build page {}: {}", build.url, e);
                None
            }
        };

        Ok(build_info(label, &build, report_link))
    }
}

/// Assemble the table row for one build.
pub fn build_info(label: &str, build: &LastBuild, report_link: Option<String>) -> BuildInfo {
    BuildInfo {
        label: label.to_string(),
        date: format_build_date(build.timestamp),
        report_link,
        version: build
            .description
            .as_deref()
            .and_then(extract_version)
            .unwrap_or_else(|| label.to_string()),
        status: build
            .result
            .clone()
            .unwrap_or_else(|| "IN PROGRESS".to_string()),
    }
}

/// Format a millisecond timestamp as `dd-Mon-YYYY` (UTC).
pub fn format_build_date(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%d-%b-%Y").to_string())
        .unwrap_or_default()
}

/// Decoded value of attribute `name`, tolerating HTML-style attributes.
fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .html_attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .map(|attr| decode_entities(&attr.value))
}

/// First test report link on a build page, made absolute against `base_url`.
pub fn extract_report_link(page: &str, base_url: &str) -> Option<String> {
    let mut reader = markup_reader(page);

    let href = loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"a" => {
                if let Some(href) = attribute(e, b"href") {
                    if href.contains(REPORT_LINK_MARKER) {
                        break href;
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                debug!("Stopped reading build page: {}", e);
                return None;
            }
            _ => {}
        }
    };

    let base = Url::parse(base_url).ok()?;
    base.join(&href).ok().map(String::from)
}

/// Index of the `major`/`minor`/`patch` part an element holds, from its `id`.
fn version_part(element: &BytesStart<'_>) -> Option<usize> {
    match attribute(element, b"id")?.as_str() {
        "version-major" => Some(0),
        "version-minor" => Some(1),
        "version-patch" => Some(2),
        _ => None,
    }
}

/// `major.minor.patch` from the version elements of a build description.
pub fn extract_version(description: &str) -> Option<String> {
    let mut reader = markup_reader(description);
    let mut parts: [Option<String>; 3] = Default::default();
    let mut current = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => current = version_part(e),
            Ok(Event::Text(ref e)) => {
                if let Some(part) = current {
                    let text = decode_entities(e);
                    parts[part].get_or_insert_with(|| text.trim().to_string());
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    let [major, minor, patch] = parts;
    Some(format!("{}.{}.{}", major?, minor?, patch?))
}
