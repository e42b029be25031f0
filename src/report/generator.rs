//! Markdown report generation.
//!
//! This module renders the weekly QA report as Markdown or JSON.

use crate::analysis::most_affected_projects;
use crate::models::{
    AgingTrend, BuildInfo, ProjectReport, PullRequestStatus, Report, ReportMetadata, SummaryRow,
    TrackedIssue,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Weekly QA Report\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Summary section
    output.push_str(&generate_summary_section(&report.summary, &report.projects));

    // Main tasks
    output.push_str(&generate_main_tasks_section(&report.main_tasks));

    // Blockers across projects
    output.push_str(&generate_all_blockers_section(&report.projects));

    // Per-project sections
    output.push_str("## Projects\n\n");
    for project in &report.projects {
        output.push_str(&generate_project_section(project));
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Period:** {}\n", metadata.period()));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Open issues as of:** {}\n", metadata.as_of));
    section.push_str(&format!(
        "- **Aging window:** {} week interval(s) over {} weeks\n",
        metadata.interval_weeks, metadata.lookback_weeks
    ));
    section.push_str(&format!(
        "- **Collection Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Escape pipes so a value stays inside its table cell.
fn table_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Generate the summary section.
fn generate_summary_section(rows: &[SummaryRow], projects: &[ProjectReport]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Project | New Bugs | Merged PRs | Blockers | Criticals | Last Build |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for row in rows {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            row.project,
            optional(&row.new_bugs),
            optional(&row.merged_pull_requests),
            row.blockers,
            row.criticals,
            optional(&row.last_build),
        ));
    }
    section.push('\n');

    let affected = most_affected_projects(projects, 5);
    if !affected.is_empty() {
        section.push_str("### Most Affected Projects\n\n");
        section.push_str("| Project | Open Blockers + Criticals |\n");
        section.push_str("|:---|:---:|\n");

        for (project, count) in affected {
            section.push_str(&format!("| {} | {} |\n", project.name, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the main tasks section.
fn generate_main_tasks_section(tasks: &[String]) -> String {
    if tasks.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Main Tasks\n\n");
    for task in tasks {
        section.push_str(&format!("- {}\n", task));
    }
    section.push('\n');

    section
}

/// Generate the list of open blockers across all projects.
fn generate_all_blockers_section(projects: &[ProjectReport]) -> String {
    let mut section = String::new();

    section.push_str("## Blockers\n\n");

    let with_blockers: Vec<_> = projects.iter().filter(|p| !p.blockers.is_empty()).collect();
    if with_blockers.is_empty() {
        section.push_str("No open blockers.\n\n");
        return section;
    }

    for project in with_blockers {
        section.push_str(&format!("**{}**\n\n", project.name));
        section.push_str(&generate_issue_list(&project.blockers));
    }

    section
}

/// Generate the section for a single project.
fn generate_project_section(project: &ProjectReport) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {}\n\n", project.name));

    if !project.builds.is_empty() {
        section.push_str(&generate_builds_table(&project.builds));
    }

    let completed: Vec<_> = project.completed_tasks().collect();
    if !completed.is_empty() {
        section.push_str("#### Completed Tasks\n\n");
        for task in completed {
            section.push_str(&format!("- {}\n", task.description));
        }
        section.push('\n');
    }

    let planned: Vec<_> = project.planned_tasks().collect();
    if !planned.is_empty() {
        section.push_str("#### Planned Tasks\n\n");
        for task in planned {
            section.push_str(&format!("- {}\n", task.description));
        }
        section.push('\n');
    }

    if !project.pull_requests.is_empty() {
        section.push_str(&generate_pull_requests_table(&project.pull_requests));
    }
    if let Some(ref merged) = project.merged_pull_requests {
        section.push_str(&format!(
            "Merged pull requests: [{}]({})\n\n",
            merged.count, merged.link
        ));
    }

    if let Some(ref bugs) = project.new_bugs {
        section.push_str(&format!("New bugs: [{}]({})\n\n", bugs.count, bugs.link));
    }

    section.push_str(&generate_tracked_issues(
        "Blockers",
        &project.blockers,
        &project.blockers_link,
    ));
    section.push_str(&generate_tracked_issues(
        "Criticals",
        &project.criticals,
        &project.criticals_link,
    ));

    if let Some(ref trend) = project.trend {
        section.push_str(&generate_trend_table(trend));
    }

    if !project.errors.is_empty() {
        section.push_str("#### Unavailable Data\n\n");
        for error in &project.errors {
            section.push_str(&format!("- ⚠️ {}\n", error));
        }
        section.push('\n');
    }

    section.push_str("---\n\n");

    section
}

/// Generate the build status table.
fn generate_builds_table(builds: &[BuildInfo]) -> String {
    let mut table = String::new();

    table.push_str("#### Builds\n\n");
    table.push_str("| Build | Version | Date | Status | Report |\n");
    table.push_str("|:---|:---:|:---:|:---:|:---:|\n");

    for build in builds {
        let link = build
            .report_link
            .as_ref()
            .map(|url| format!("[Test Report]({})", url))
            .unwrap_or_else(|| "-".to_string());
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            table_cell(&build.label),
            table_cell(&build.version),
            table_cell(&build.date),
            table_cell(&build.status),
            link
        ));
    }
    table.push('\n');

    table
}

/// Generate the pull request table.
fn generate_pull_requests_table(prs: &[PullRequestStatus]) -> String {
    let mut table = String::new();

    table.push_str("#### Pull Requests\n\n");
    table.push_str("| Pull Request | Status |\n");
    table.push_str("|:---|:---:|\n");

    for pr in prs {
        table.push_str(&format!(
            "| {} | {} |\n",
            table_cell(&pr.link.to_markdown()),
            table_cell(&pr.status)
        ));
    }
    table.push('\n');

    table
}

fn generate_issue_list(issues: &[TrackedIssue]) -> String {
    let mut list = String::new();

    for issue in issues {
        list.push_str(&format!("- [{}]({}) {}\n", issue.key, issue.link, issue.summary));
    }
    list.push('\n');

    list
}

/// Generate a blockers or criticals list.
fn generate_tracked_issues(title: &str, issues: &[TrackedIssue], link: &Option<String>) -> String {
    let mut section = String::new();

    match link {
        Some(url) => section.push_str(&format!("#### {} ([view all]({}))\n\n", title, url)),
        None => section.push_str(&format!("#### {}\n\n", title)),
    }

    if issues.is_empty() {
        section.push_str("None.\n\n");
    } else {
        section.push_str(&generate_issue_list(issues));
    }

    section
}

/// Generate the issue-aging trend table.
fn generate_trend_table(trend: &AgingTrend) -> String {
    let mut table = String::new();

    table.push_str("#### Issue Aging\n\n");

    if trend.is_empty() {
        table.push_str("No unresolved issues\n\n");
        return table;
    }

    table.push_str("| Week Ending | Blockers | Criticals |\n");
    table.push_str("|:---|:---:|:---:|\n");

    let rows = trend
        .blockers
        .boundaries()
        .into_iter()
        .zip(trend.blockers.counts())
        .zip(trend.criticals.counts());
    for ((date, blockers), criticals) in rows {
        table.push_str(&format!("| {} | {} | {} |\n", date, blockers, criticals));
    }
    table.push('\n');

    table
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("*Report generated by qareport*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
