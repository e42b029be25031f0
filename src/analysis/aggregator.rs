//! Report assembly helpers.
//!
//! This module merges weekly task lists, picks the headline tasks and
//! computes the per-project summary rows.

use crate::models::{ProjectReport, SummaryRow, Task, TaskPriority, TaskStatus};
use std::collections::HashSet;

/// Merge this week's tasks with last week's.
///
/// Everything from the current page is kept. Tasks completed on the
/// previous page are appended unless the current page already lists the
/// same description.
pub fn merge_weekly_tasks(current: Vec<Task>, previous: &[Task]) -> Vec<Task> {
    let known: HashSet<String> = current.iter().map(|t| t.description.clone()).collect();
    let mut merged = current;

    for task in previous {
        if task.status == TaskStatus::Complete && !known.contains(&task.description) {
            merged.push(task.clone());
        }
    }

    merged
}

/// Completed high-priority tasks across all projects, first occurrence wins.
pub fn main_tasks(projects: &[ProjectReport]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for task in projects.iter().flat_map(|p| &p.tasks) {
        if task.status == TaskStatus::Complete
            && task.priority == TaskPriority::High
            && seen.insert(task.description.as_str())
        {
            tasks.push(task.description.clone());
        }
    }

    tasks
}

/// Build the summary table, one row per project.
pub fn summary_rows(projects: &[ProjectReport]) -> Vec<SummaryRow> {
    projects
        .iter()
        .map(|p| SummaryRow {
            project: p.name.clone(),
            new_bugs: p.new_bugs.as_ref().map(|b| b.count),
            merged_pull_requests: p.merged_pull_requests.as_ref().map(|m| m.count),
            blockers: p.blockers.len(),
            criticals: p.criticals.len(),
            last_build: p.last_build_date().map(String::from),
        })
        .collect()
}

/// Projects with the most open blockers and criticals first.
pub fn most_affected_projects(projects: &[ProjectReport], n: usize) -> Vec<(&ProjectReport, usize)> {
    let mut affected: Vec<_> = projects
        .iter()
        .map(|p| (p, p.blockers.len() + p.criticals.len()))
        .filter(|(_, count)| *count > 0)
        .collect();

    affected.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    affected.truncate(n);

    affected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildInfo, NewBugs, ProjectId, TrackedIssue};

    fn task(description: &str, status: TaskStatus, priority: TaskPriority) -> Task {
        Task {
            description: description.to_string(),
            status,
            priority,
        }
    }

    fn issue(key: &str) -> TrackedIssue {
        TrackedIssue {
            key: key.to_string(),
            link: format!("https://jira.example.com/browse/{}", key),
            summary: "Crash".to_string(),
        }
    }

    #[test]
    fn test_merge_keeps_previous_completed_only() {
        let current = vec![task("Port to 2025", TaskStatus::Incomplete, TaskPriority::High)];
        let previous = vec![
            task("Port to 2025", TaskStatus::Complete, TaskPriority::High),
            task("Fix installer", TaskStatus::Complete, TaskPriority::Low),
            task("Update docs", TaskStatus::Incomplete, TaskPriority::Low),
        ];

        let merged = merge_weekly_tasks(current, &previous);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].status, TaskStatus::Incomplete);
        assert_eq!(merged[1].description, "Fix installer");
    }

    #[test]
    fn test_main_tasks_deduplicated_in_order() {
        let mut maya = ProjectReport::new(ProjectId::MayaRpr);
        maya.tasks = vec![
            task("Release 3.6", TaskStatus::Complete, TaskPriority::High),
            task("Minor cleanup", TaskStatus::Complete, TaskPriority::Low),
            task("Plan 3.7", TaskStatus::Incomplete, TaskPriority::High),
        ];
        let mut blender = ProjectReport::new(ProjectId::BlenderRpr);
        blender.tasks = vec![
            task("Support Blender 4.1", TaskStatus::Complete, TaskPriority::High),
            task("Release 3.6", TaskStatus::Complete, TaskPriority::High),
        ];

        let tasks = main_tasks(&[maya, blender]);

        assert_eq!(tasks, vec!["Release 3.6", "Support Blender 4.1"]);
    }

    #[test]
    fn test_summary_rows() {
        let mut project = ProjectReport::new(ProjectId::RenderStudio);
        project.new_bugs = Some(NewBugs {
            count: 7,
            link: "https://jira.example.com/issues".to_string(),
        });
        project.blockers = vec![issue("RS-1")];
        project.builds = vec![BuildInfo {
            label: "default".to_string(),
            date: "01-Mar-2024".to_string(),
            report_link: None,
            version: "1.2.3".to_string(),
            status: "SUCCESS".to_string(),
        }];

        let rows = summary_rows(&[project]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].project, "Render Studio");
        assert_eq!(rows[0].new_bugs, Some(7));
        assert_eq!(rows[0].merged_pull_requests, None);
        assert_eq!(rows[0].blockers, 1);
        assert_eq!(rows[0].last_build.as_deref(), Some("01-Mar-2024"));
    }

    #[test]
    fn test_most_affected_projects() {
        let mut a = ProjectReport::new(ProjectId::Houdini);
        a.criticals = vec![issue("RPRHOUD-1")];
        let mut b = ProjectReport::new(ProjectId::HdRpr);
        b.blockers = vec![issue("RPRUSD-1"), issue("RPRUSD-2")];
        let c = ProjectReport::new(ProjectId::Inventor);

        let projects = [a, b, c];
        let affected = most_affected_projects(&projects, 5);

        assert_eq!(affected.len(), 2);
        assert_eq!(affected[0].0.id, ProjectId::HdRpr);
        assert_eq!(affected[0].1, 2);
    }
}
