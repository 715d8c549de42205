//! Plain-text output for the terminal.

use chrono::{DateTime, Local, TimeZone, Utc};
use monitor_core::model::{Job, JobGroup, JobStats, Node, NodeStats, Page, User};
use monitor_core::{BatchProgress, BatchStatus};

const BAR_WIDTH: usize = 30;

/// Unix milliseconds as local time; `-` when absent or out of range.
pub fn millis(ts: Option<i64>) -> String {
    ts.and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// RFC 3339 timestamp as local time; unparseable input is shown unchanged.
pub fn rfc3339(ts: Option<&str>) -> String {
    match ts {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| {
                dt.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|_| raw.to_string()),
        None => "-".to_string(),
    }
}

/// How long ago an RFC 3339 timestamp was, relative to `now`.
pub fn age(ts: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(then) = ts.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok()) else {
        return "-".to_string();
    };
    let secs = (now - then.with_timezone(&Utc)).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

fn text(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

pub fn job_row(job: &Job) -> String {
    format!(
        "{:<24} {:<10} {:<12} {:<10} {:<19} {}",
        job.job_id,
        text(job.status.as_deref()),
        text(job.framework.as_deref()),
        text(job.node_id.as_deref()),
        millis(job.start_time),
        text(job.job_name.as_deref().or(job.process_name.as_deref())),
    )
}

fn job_header() -> String {
    format!(
        "{:<24} {:<10} {:<12} {:<10} {:<19} {}",
        "JOB", "STATUS", "FRAMEWORK", "NODE", "STARTED", "NAME"
    )
}

fn footer<T>(page: &Page<T>) -> String {
    format!(
        "page {}/{} ({} total)",
        page.pagination.page,
        page.pagination.total_pages.max(1),
        page.pagination.total
    )
}

pub fn jobs(page: &Page<Job>) -> String {
    let mut out = vec![job_header()];
    out.extend(page.items.iter().map(job_row));
    out.push(footer(page));
    out.join("\n")
}

pub fn groups(page: &Page<JobGroup>) -> String {
    let mut out = vec![format!("{} {}", job_header(), "CARDS")];
    for group in &page.items {
        let cards = group
            .card_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "?".to_string());
        out.push(format!("{} {}", job_row(&group.main_job), cards));
        for child in &group.child_jobs {
            out.push(format!("  └ {}", job_row(child)));
        }
    }
    out.push(footer(page));
    out.join("\n")
}

pub fn job_stats(stats: &JobStats) -> String {
    format!(
        "total {}  running {}  completed {}  failed {}  stopped {}  lost {}",
        stats.total, stats.running, stats.completed, stats.failed, stats.stopped, stats.lost
    )
}

pub fn nodes(nodes: &[Node], now: DateTime<Utc>) -> String {
    let mut out = vec![format!(
        "{:<16} {:<20} {:<16} {:<5} {:<9} {}",
        "NODE", "HOST", "IP", "NPUS", "STATUS", "HEARTBEAT"
    )];
    out.extend(nodes.iter().map(|node| {
        format!(
            "{:<16} {:<20} {:<16} {:<5} {:<9} {}",
            node.node_id,
            text(node.hostname.as_deref()),
            text(node.ip_address.as_deref()),
            node.npu_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            text(node.status.as_deref()),
            age(node.last_heartbeat.as_deref(), now),
        )
    }));
    out.join("\n")
}

pub fn node_stats(stats: &NodeStats) -> String {
    format!(
        "total {}  active {}  inactive {}  error {}",
        stats.total, stats.active, stats.inactive, stats.error
    )
}

pub fn users(users: &[User]) -> String {
    let mut out = vec![format!("{:<6} {:<20} {}", "ID", "USERNAME", "CREATED")];
    out.extend(users.iter().map(|user| {
        format!(
            "{:<6} {:<20} {}",
            user.id,
            user.username,
            rfc3339(user.created_at.as_deref())
        )
    }));
    out.join("\n")
}

/// One-line progress bar, e.g. `[#######-------] 3/7 ok 3 failed 0 running`.
pub fn progress(progress: &BatchProgress) -> String {
    let filled = (progress.fraction() * BAR_WIDTH as f64).round() as usize;
    let status = match progress.status {
        BatchStatus::Running => "running",
        BatchStatus::Done => "done",
        BatchStatus::Cancelled => "cancelled",
    };
    format!(
        "[{}{}] {}/{} ok {} failed {} {}",
        "#".repeat(filled.min(BAR_WIDTH)),
        "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
        progress.current,
        progress.total,
        progress.success,
        progress.failed,
        status
    )
}

pub fn failures(progress: &BatchProgress) -> Option<String> {
    if progress.failed_items.is_empty() {
        return None;
    }
    let lines: Vec<String> = progress
        .failed_items
        .iter()
        .map(|item| format!("  {}: {}", item.job_id, item.error))
        .collect();
    Some(format!("failed jobs:\n{}", lines.join("\n")))
}
