//! Confluence weekly status page client.
//!
//! The status page lists every project by name, each followed by a task
//! list. Task bodies may carry a priority prefix (`HP:`, `MP:`, `LP:`) or
//! be marked `NFR:` (not for report).

use super::{decode_entities, markup_reader, send, trim_base};
use crate::analysis::merge_weekly_tasks;
use crate::models::{Task, TaskPriority, TaskStatus};
use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::{debug, warn};

const TASK_LIST: &[u8] = b"ac:task-list";
const TASK: &[u8] = b"ac:task";
const TASK_STATUS: &[u8] = b"ac:task-status";
const TASK_BODY: &[u8] = b"ac:task-body";

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    results: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    body: ContentBody,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    storage: Storage,
}

#[derive(Debug, Deserialize)]
struct Storage {
    value: String,
}

/// Storage-format bodies of this week's and last week's status pages.
#[derive(Debug, Clone)]
pub struct WeeklyPages {
    pub current: String,
    /// Missing when last week's page could not be loaded.
    pub previous: Option<String>,
}

impl WeeklyPages {
    /// Tasks for one project, merged across both weeks.
    pub fn project_tasks(&self, project_name: &str) -> Vec<Task> {
        let current = parse_project_tasks(&self.current, project_name);
        match self.previous {
            Some(ref previous) => {
                merge_weekly_tasks(current, &parse_project_tasks(previous, project_name))
            }
            None => current,
        }
    }
}

/// Confluence REST client.
pub struct ConfluenceClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    title_prefix: String,
}

impl ConfluenceClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: Option<String>,
        title_prefix: &str,
    ) -> Self {
        Self {
            http,
            base_url: trim_base(base_url).to_string(),
            token,
            title_prefix: title_prefix.to_string(),
        }
    }

    /// Storage-format body of the status page dated `date`.
    pub async fn status_page(&self, date: NaiveDate) -> Result<String> {
        let title = page_title(&self.title_prefix, date);
        let url = format!("{}/rest/api/content", self.base_url);
        debug!("Fetching Confluence page '{}'", title);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("title", title.as_str()), ("expand", "body.storage")]);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response: ContentResponse = send(request, "Confluence")
            .await?
            .json()
            .await
            .context("Failed to parse Confluence response")?;

        response
            .results
            .into_iter()
            .next()
            .map(|content| content.body.storage.value)
            .with_context(|| format!("Confluence page '{}' not found", title))
    }

    /// Load the pages of the last Thursday on or before `report_date` and the week before.
    pub async fn weekly_pages(&self, report_date: NaiveDate) -> Result<WeeklyPages> {
        let this_week = last_thursday(report_date);
        let current = self.status_page(this_week).await?;

        let previous = match self.status_page(this_week - Duration::weeks(1)).await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!("Previous status page unavailable: {:#}", e);
                None
            }
        };

        Ok(WeeklyPages { current, previous })
    }
}

/// Title of the status page for `date`.
pub fn page_title(prefix: &str, date: NaiveDate) -> String {
    format!("{} {}", prefix, date.format("%d/%m/%Y"))
}

/// The most recent Thursday on or before `date`.
pub fn last_thursday(date: NaiveDate) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() as i64
        - Weekday::Thu.num_days_from_monday() as i64)
        .rem_euclid(7);
    date - Duration::days(offset)
}

fn is_block(tag: &[u8]) -> bool {
    matches!(tag, b"p" | b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6")
}

/// Where the walk over a status page currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Looking for the project name outside every task list.
    Name,
    /// Inside the block naming the project, open while the stack is at least `depth` deep.
    Heading { depth: usize },
    /// The block closed; the next element has to be the task list.
    AfterHeading,
    /// Inside the project's task list. Its tasks sit at stack depth `depth`,
    /// and `nesting` task lists are open.
    List { depth: usize, nesting: usize },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Status,
    Body,
}

#[derive(Debug, Default)]
struct PendingTask {
    status: String,
    body: String,
    field: Option<Field>,
}

/// Collects the tasks listed right after the block that names a project.
struct TaskListScanner<'a> {
    project_name: &'a str,
    stack: Vec<Vec<u8>>,
    open_lists: usize,
    scan: Scan,
    task: Option<PendingTask>,
    tasks: Vec<Task>,
}

impl<'a> TaskListScanner<'a> {
    fn new(project_name: &'a str) -> Self {
        Self {
            project_name,
            stack: Vec::new(),
            open_lists: 0,
            scan: Scan::Name,
            task: None,
            tasks: Vec::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.scan == Scan::Done
    }

    fn handle_start(&mut self, tag: &[u8]) {
        let level = self.stack.len();
        if tag == TASK_LIST {
            self.open_lists += 1;
        }

        match self.scan {
            Scan::AfterHeading if tag == TASK_LIST => {
                self.scan = Scan::List {
                    depth: level + 1,
                    nesting: self.open_lists,
                };
            }
            Scan::AfterHeading => self.scan = Scan::Done,
            Scan::List { depth, .. } if level == depth && tag == TASK => {
                self.task = Some(PendingTask::default());
            }
            Scan::List { depth, .. } if level == depth + 1 => {
                if let Some(ref mut task) = self.task {
                    task.field = match tag {
                        TASK_STATUS => Some(Field::Status),
                        TASK_BODY => Some(Field::Body),
                        _ => None,
                    };
                }
            }
            _ => {}
        }

        self.stack.push(tag.to_vec());
    }

    fn handle_empty(&mut self) {
        if self.scan == Scan::AfterHeading {
            self.scan = Scan::Done;
        }
    }

    fn handle_end(&mut self) {
        if self.stack.pop().as_deref() == Some(TASK_LIST) {
            self.open_lists = self.open_lists.saturating_sub(1);
        }
        let level = self.stack.len();

        match self.scan {
            Scan::Heading { depth } if level < depth => self.scan = Scan::AfterHeading,
            Scan::AfterHeading => self.scan = Scan::Done,
            Scan::List { depth, .. } if level < depth => self.scan = Scan::Done,
            Scan::List { depth, .. } if level == depth => self.finish_task(),
            Scan::List { depth, .. } if level == depth + 1 => {
                if let Some(ref mut task) = self.task {
                    task.field = None;
                }
            }
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        match self.scan {
            Scan::Name if self.open_lists == 0 && text.contains(self.project_name) => {
                // The name may sit in inline markup such as <strong>; the
                // enclosing paragraph or heading is what the list follows.
                let depth = match self.stack.iter().rposition(|tag| is_block(tag)) {
                    Some(pos) => pos + 1,
                    None => self.stack.len(),
                };
                self.scan = if depth == 0 {
                    Scan::AfterHeading
                } else {
                    Scan::Heading { depth }
                };
            }
            Scan::AfterHeading if !text.trim().is_empty() => self.scan = Scan::Done,
            Scan::List { nesting, .. } if self.open_lists == nesting => {
                if let Some(ref mut task) = self.task {
                    match task.field {
                        Some(Field::Status) => task.status.push_str(text),
                        Some(Field::Body) => task.body.push_str(text),
                        None => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn finish_task(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Some((description, priority)) = parse_task_body(&task.body) {
            self.tasks.push(Task {
                description,
                status: TaskStatus::from(task.status.as_str()),
                priority,
            });
        }
    }
}

/// Description and priority of a task body; `None` for tasks not meant for the report.
pub fn parse_task_body(text: &str) -> Option<(String, TaskPriority)> {
    let text = text.replace('\u{a0}', "");
    let text = text.trim();

    if text.starts_with("NFR:") {
        return None;
    }

    let (priority, body) = match text.get(..3) {
        Some("HP:") => (TaskPriority::High, &text[3..]),
        Some("MP:") => (TaskPriority::Medium, &text[3..]),
        Some("LP:") => (TaskPriority::Low, &text[3..]),
        _ => (TaskPriority::Unspecified, text),
    };

    let description = body.split(" - ").next().unwrap_or(body).trim();
    if description.is_empty() {
        return None;
    }

    Some((description.to_string(), priority))
}

/// Tasks listed for `project_name` on a status page.
///
/// Only the list directly following the first paragraph or heading that
/// mentions the project outside other task lists is read. Tasks of nested
/// lists are left out.
pub fn parse_project_tasks(page: &str, project_name: &str) -> Vec<Task> {
    let mut reader = markup_reader(page);
    let mut scanner = TaskListScanner::new(project_name);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => scanner.handle_start(e.name().as_ref()),
            Ok(Event::Empty(_)) => scanner.handle_empty(),
            Ok(Event::End(_)) => scanner.handle_end(),
            Ok(Event::Text(ref e)) => scanner.handle_text(&decode_entities(e)),
            Ok(Event::CData(ref e)) => scanner.handle_text(&String::from_utf8_lossy(e)),
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    "Malformed status page markup near byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }

        if scanner.is_done() {
            break;
        }
    }

    if scanner.scan == Scan::Name {
        debug!("No task list for '{}'", project_name);
    }
    scanner.tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<h1>Thursday weekly</h1>
<p><strong>RPR Maya</strong></p>
<ac:task-list>
<ac:task><ac:task-id>1</ac:task-id><ac:task-status>complete</ac:task-status>
<ac:task-body><span>HP: Release 3.6&nbsp;</span> - shipped on Monday</ac:task-body></ac:task>
<ac:task><ac:task-id>2</ac:task-id><ac:task-status>incomplete</ac:task-status>
<ac:task-body>LP: Houdini parity review</ac:task-body></ac:task>
<ac:task><ac:task-id>3</ac:task-id><ac:task-status>complete</ac:task-status>
<ac:task-body>NFR: internal cleanup</ac:task-body></ac:task>
</ac:task-list>
<p>Houdini</p>
<ac:task-list>
<ac:task><ac:task-id>4</ac:task-id><ac:task-status>incomplete</ac:task-status>
<ac:task-body>Support Houdini 20 &amp; Karma</ac:task-body></ac:task>
</ac:task-list>
<p>Solidworks</p>
<p>No updates this week</p>
"#;

    #[test]
    fn test_parse_project_tasks() {
        let tasks = parse_project_tasks(PAGE, "RPR Maya");

        assert_eq!(
            tasks,
            vec![
                Task {
                    description: "Release 3.6".to_string(),
                    status: TaskStatus::Complete,
                    priority: TaskPriority::High,
                },
                Task {
                    description: "Houdini parity review".to_string(),
                    status: TaskStatus::Incomplete,
                    priority: TaskPriority::Low,
                },
            ]
        );
    }

    #[test]
    fn test_name_inside_other_task_list_is_ignored() {
        let tasks = parse_project_tasks(PAGE, "Houdini");

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Support Houdini 20 & Karma");
        assert_eq!(tasks[0].priority, TaskPriority::Unspecified);
    }

    #[test]
    fn test_project_without_task_list() {
        assert!(parse_project_tasks(PAGE, "Solidworks").is_empty());
        assert!(parse_project_tasks(PAGE, "Inventor").is_empty());
    }

    #[test]
    fn test_entities_in_task_bodies_are_decoded() {
        let page = r#"<p>Inventor</p>
<ac:task-list>
<ac:task><ac:task-status>complete</ac:task-status>
<ac:task-body>HP: Don&rsquo;t ship &#8220;Karma&#8221; &ndash; yet</ac:task-body></ac:task>
</ac:task-list>"#;

        let tasks = parse_project_tasks(page, "Inventor");

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Don\u{2019}t ship \u{201c}Karma\u{201d} \u{2013} yet");
        assert_eq!(tasks[0].priority, TaskPriority::High);
        assert_eq!(tasks[0].status, TaskStatus::Complete);
    }

    #[test]
    fn test_nested_task_list_keeps_outer_tasks() {
        let page = r#"<p><strong>Render Studio</strong></p>
<ac:task-list>
<ac:task><ac:task-status>complete</ac:task-status><ac:task-body>HP: Cloud sync<ac:task-list>
<ac:task><ac:task-status>complete</ac:task-status><ac:task-body>Upload queue</ac:task-body></ac:task>
</ac:task-list></ac:task-body></ac:task>
<ac:task><ac:task-status>incomplete</ac:task-status><ac:task-body>MP: Offline mode</ac:task-body></ac:task>
</ac:task-list>
<p>Houdini</p>"#;

        let tasks = parse_project_tasks(page, "Render Studio");

        assert_eq!(
            tasks,
            vec![
                Task {
                    description: "Cloud sync".to_string(),
                    status: TaskStatus::Complete,
                    priority: TaskPriority::High,
                },
                Task {
                    description: "Offline mode".to_string(),
                    status: TaskStatus::Incomplete,
                    priority: TaskPriority::Medium,
                },
            ]
        );
    }

    #[test]
    fn test_parse_task_body() {
        assert_eq!(
            parse_task_body("MP:\u{a0}Docs update - see thread"),
            Some(("Docs update".to_string(), TaskPriority::Medium))
        );
        assert_eq!(parse_task_body("NFR: hidden"), None);
        assert_eq!(parse_task_body("   "), None);
    }

    #[test]
    fn test_last_thursday() {
        let thursday = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(last_thursday(thursday), thursday);
        assert_eq!(last_thursday(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()), thursday);
        assert_eq!(last_thursday(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()), thursday);
        assert_eq!(
            last_thursday(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap()),
            NaiveDate::from_ymd_opt(2024, 2, 22).unwrap()
        );
    }

    #[test]
    fn test_page_title() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(page_title("Thursday weekly", date), "Thursday weekly 29/02/2024");
    }

    #[test]
    fn test_weekly_pages_merge() {
        let previous = r#"<p>Houdini</p>
<ac:task-list>
<ac:task><ac:task-status>complete</ac:task-status><ac:task-body>HP: Fix denoiser</ac:task-body></ac:task>
<ac:task><ac:task-status>incomplete</ac:task-status><ac:task-body>Old plan</ac:task-body></ac:task>
</ac:task-list>"#;
        let pages = WeeklyPages {
            current: PAGE.to_string(),
            previous: Some(previous.to_string()),
        };

        let tasks = pages.project_tasks("Houdini");

        let descriptions: Vec<&str> = tasks.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Support Houdini 20 & Karma", "Fix denoiser"]);
    }
}
