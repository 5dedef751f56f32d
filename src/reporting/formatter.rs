use console::style;

use super::record::ScanRecord;
use crate::pipeline::{RuleReport, RuleState};

fn verdict_tag(record: &ScanRecord) -> String {
    match record.verdict {
        Some(true) => style("[VULNERABLE]").red().bold().to_string(),
        Some(false) => style("[NOT VULNERABLE]").green().to_string(),
        None => style("[ERROR]").yellow().bold().to_string(),
    }
}

fn format_rule_line(rule: &RuleReport) -> String {
    let padded = format!("{:<12}", rule.state.to_string());
    let state = match rule.state {
        RuleState::Satisfied => style(padded).green().to_string(),
        RuleState::Failed => style(padded).yellow().to_string(),
        _ => style(padded).dim().to_string(),
    };
    let status = rule.status.map_or_else(|| "-".to_string(), |s| s.to_string());
    let elapsed = rule.elapsed_ms.map_or_else(|| "-".to_string(), |ms| format!("{}ms", ms));

    let mut line = format!("    {:<16} {} {:>5} {:>8}", rule.name, state, status, elapsed);
    if let Some(reason) = &rule.reason {
        line.push_str(&format!("  ({})", reason));
    }
    for warning in &rule.warnings {
        line.push_str(&format!("\n      warning [{}]: {}", warning.stage, warning.message));
    }
    line
}

/// Human-readable block for one scan record.
pub fn format_record(record: &ScanRecord) -> String {
    let mut out = String::new();
    let level = record.metadata.level.as_deref().unwrap_or("unrated");
    out.push_str(&format!(
        "{} {} ({}) against {}\n",
        verdict_tag(record),
        style(&record.poc).bold(),
        level,
        record.target
    ));

    if let Some(cve) = &record.metadata.cve_id {
        out.push_str(&format!("    CVE: {}\n", cve));
    }

    if let Some(report) = &record.report {
        out.push_str(&format!(
            "    {}/{} rules passed, {} warnings, {} ms\n",
            report.passed(),
            report.rules.len(),
            report.warnings(),
            report.duration_ms
        ));
        for rule in &report.rules {
            out.push_str(&format_rule_line(rule));
            out.push('\n');
        }
    }

    if let Some(error) = &record.error {
        match (&error.rule, &error.stage) {
            (Some(rule), Some(stage)) => out.push_str(&format!(
                "    {} in rule '{}' during {}: {}\n",
                error.error_type, rule, stage, error.message
            )),
            _ => out.push_str(&format!("    {}: {}\n", error.error_type, error.message)),
        }
    }

    out
}

pub fn format_scan_summary(records: &[ScanRecord]) -> String {
    let vulnerable = records.iter().filter(|r| r.verdict == Some(true)).count();
    let clean = records.iter().filter(|r| r.verdict == Some(false)).count();
    let errored = records.iter().filter(|r| r.verdict.is_none()).count();

    let mut out = String::new();
    for record in records {
        out.push_str(&format_record(record));
        out.push('\n');
    }
    out.push_str(&format!(
        "Scan complete: {} runs, {} vulnerable, {} not vulnerable, {} errors\n",
        records.len(),
        vulnerable,
        clean,
        errored
    ));
    out
}
