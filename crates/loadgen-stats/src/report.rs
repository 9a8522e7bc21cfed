//! Serializable statistics reports and their text renderings.

use crate::stats::{ErrorEntry, RequestStats, StatsEntry, AGGREGATED_NAME};
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use loadgen_core::RequestKind;
use serde::{Deserialize, Serialize};

/// One row of the statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryReport {
    /// `None` for the aggregated row
    #[serde(rename = "type")]
    pub kind: Option<RequestKind>,
    pub name: String,
    pub requests: u64,
    pub failures: u64,
    pub median_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_content_length: f64,
    pub requests_per_sec: f64,
}

impl EntryReport {
    fn from_entry(kind: Option<RequestKind>, name: &str, entry: &StatsEntry, secs: f64) -> Self {
        Self {
            kind,
            name: name.to_string(),
            requests: entry.num_requests,
            failures: entry.num_failures,
            median_ms: entry.median_response_time_ms(),
            p95_ms: entry.percentile(0.95),
            p99_ms: entry.percentile(0.99),
            avg_ms: entry.avg_response_time_ms(),
            min_ms: entry.min_response_time_ms.unwrap_or(0),
            max_ms: entry.max_response_time_ms,
            avg_content_length: entry.avg_content_length(),
            requests_per_sec: if secs > 0.0 {
                entry.num_requests as f64 / secs
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time snapshot of a run's statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub entries: Vec<EntryReport>,
    pub total: EntryReport,
    pub errors: Vec<ErrorEntry>,
}

impl StatsReport {
    pub fn from_stats(stats: &RequestStats) -> Self {
        Self::from_stats_at(stats, Utc::now())
    }

    pub fn from_stats_at(stats: &RequestStats, generated_at: DateTime<Utc>) -> Self {
        let duration_secs = (generated_at - stats.started_at())
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let entries = stats
            .entries()
            .iter()
            .map(|(kind, name, entry)| {
                EntryReport::from_entry(Some(*kind), name, entry, duration_secs)
            })
            .collect();
        let total = EntryReport::from_entry(None, AGGREGATED_NAME, &stats.total(), duration_secs);

        Self {
            started_at: stats.started_at(),
            generated_at,
            duration_secs,
            entries,
            total,
            errors: stats.errors(),
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total.requests
    }

    pub fn total_failures(&self) -> u64 {
        self.total.failures
    }
}

/// Format a report as a table.
pub fn format_table(report: &StatsReport) -> String {
    let mut output = String::new();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Type", "Name", "# reqs", "# fails", "Avg", "Min", "Max", "Med", "95%", "99%",
        "Avg size", "req/s",
    ]);

    for entry in &report.entries {
        table.add_row(entry_cells(entry));
    }

    let mut total = entry_cells(&report.total);
    total[1] = Cell::new(AGGREGATED_NAME).fg(Color::Cyan);
    table.add_row(total);

    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\nDuration: {}  Requests: {}  Failures: {} ({:.2}%)\n",
        format_duration(report.duration_secs),
        format_number(report.total.requests),
        format_number(report.total.failures),
        fail_percent(&report.total)
    ));

    if !report.errors.is_empty() {
        let mut errors = Table::new();
        errors.load_preset(UTF8_FULL);
        errors.set_header(vec!["# occurrences", "Type", "Name", "Error"]);
        for error in &report.errors {
            errors.add_row(vec![
                Cell::new(format_number(error.occurrences)).fg(Color::Red),
                Cell::new(error.kind.to_string()),
                Cell::new(&error.name),
                Cell::new(&error.error),
            ]);
        }
        output.push_str("\nErrors:\n");
        output.push_str(&errors.to_string());
        output.push('\n');
    }

    output
}

fn entry_cells(entry: &EntryReport) -> Vec<Cell> {
    let fails = if entry.failures > 0 {
        Cell::new(format!(
            "{} ({:.2}%)",
            format_number(entry.failures),
            fail_percent(entry)
        ))
        .fg(Color::Red)
    } else {
        Cell::new("0")
    };

    vec![
        Cell::new(entry.kind.map(|k| k.to_string()).unwrap_or_default()),
        Cell::new(&entry.name),
        Cell::new(format_number(entry.requests)),
        fails,
        Cell::new(format!("{:.0}", entry.avg_ms)),
        Cell::new(entry.min_ms),
        Cell::new(entry.max_ms),
        Cell::new(entry.median_ms),
        Cell::new(entry.p95_ms),
        Cell::new(entry.p99_ms),
        Cell::new(format!("{:.1}", entry.avg_content_length)),
        Cell::new(format!("{:.2}", entry.requests_per_sec)),
    ]
}

/// Format a report as markdown.
pub fn format_markdown(report: &StatsReport) -> String {
    let mut output = String::new();

    output.push_str("# Load Test Results\n\n");
    output.push_str(&format!(
        "**Started at:** {}\n\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("## Summary\n\n");
    output.push_str(&format!(
        "- **Duration:** {}\n",
        format_duration(report.duration_secs)
    ));
    output.push_str(&format!(
        "- **Requests:** {}\n",
        format_number(report.total.requests)
    ));
    output.push_str(&format!(
        "- **Failures:** {} ({:.2}%)\n",
        format_number(report.total.failures),
        fail_percent(&report.total)
    ));
    output.push_str(&format!(
        "- **Throughput:** {:.2} req/s\n\n",
        report.total.requests_per_sec
    ));

    output.push_str("## Requests\n\n");
    output.push_str("| Type | Name | # reqs | # fails | Avg | Min | Max | Med | 95% | 99% | req/s |\n");
    output.push_str("|------|------|--------|---------|-----|-----|-----|-----|-----|-----|-------|\n");
    for entry in report.entries.iter().chain(std::iter::once(&report.total)) {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {:.0} | {} | {} | {} | {} | {} | {:.2} |\n",
            entry.kind.map(|k| k.to_string()).unwrap_or_default(),
            escape_markdown(&entry.name),
            format_number(entry.requests),
            format_number(entry.failures),
            entry.avg_ms,
            entry.min_ms,
            entry.max_ms,
            entry.median_ms,
            entry.p95_ms,
            entry.p99_ms,
            entry.requests_per_sec
        ));
    }

    if !report.errors.is_empty() {
        output.push_str("\n## Errors\n\n");
        output.push_str("| # occurrences | Type | Name | Error |\n");
        output.push_str("|---------------|------|------|-------|\n");
        for error in &report.errors {
            output.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                format_number(error.occurrences),
                error.kind,
                escape_markdown(&error.name),
                escape_markdown(&error.error)
            ));
        }
    }

    output
}

/// Format a report as pretty-printed JSON.
pub fn format_json(report: &StatsReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// One-line progress summary for periodic logging.
pub fn format_progress(report: &StatsReport) -> String {
    format!(
        "{} reqs, {} fails, {:.2} req/s, median {} ms, p95 {} ms",
        format_number(report.total.requests),
        format_number(report.total.failures),
        report.total.requests_per_sec,
        report.total.median_ms,
        report.total.p95_ms
    )
}

fn fail_percent(entry: &EntryReport) -> f64 {
    if entry.requests == 0 {
        return 0.0;
    }
    entry.failures as f64 * 100.0 / entry.requests as f64
}

// Statement text may contain pipes and newlines.
fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Format duration in human-readable format.
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs - (mins * 60.0);
        format!("{}m {:02.0}s", mins as u64, remaining_secs)
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - (hours * 3600.0);
        let mins = (remaining / 60.0).floor();
        format!("{}h {:02.0}m", hours as u64, mins as u64)
    }
}

/// Format number with thousands separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5.5), "5.5s");
        assert_eq!(format_duration(65.0), "1m 05s");
        assert_eq!(format_duration(3661.0), "1h 01m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(12345), "12,345");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(
            escape_markdown("MATCH (n)\nRETURN n | x"),
            "MATCH (n) RETURN n \\| x"
        );
    }
}
