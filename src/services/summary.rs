//! Human-readable change logs and CSV export of change records.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;

use crate::errors::ChecklistError;
use crate::models::audit::{RuleChange, SeveritySummary, UpdateReport};
use crate::models::checklist::Checklist;
use crate::services::store;

/// Group changes by severity in first-seen order, keeping at most
/// `sample_limit` entries of each group as a sample.
///
/// A rule touched by several directives is counted and sampled once.
pub fn summarize_by_severity(changes: &[RuleChange], sample_limit: usize) -> Vec<SeveritySummary> {
    let mut summaries: Vec<SeveritySummary> = Vec::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for change in changes {
        if !seen.insert((change.stig_id.as_str(), change.rule_id.as_str())) {
            continue;
        }
        let index = match summaries.iter().position(|s| s.severity == change.severity) {
            Some(index) => index,
            None => {
                summaries.push(SeveritySummary {
                    severity: change.severity,
                    total_updated: 0,
                    sample: Vec::new(),
                });
                summaries.len() - 1
            }
        };
        let entry = &mut summaries[index];
        entry.total_updated += 1;
        if entry.sample.len() < sample_limit {
            entry.sample.push(change.clone());
        }
    }
    summaries
}

/// Change log for a rule-engine run.
pub fn render_rule_log(report: &UpdateReport) -> String {
    let mut out = String::new();
    match &report.output_path {
        Some(path) => {
            let _ = writeln!(out, "Updated checklist saved to {}", path.display());
            let _ = writeln!(out, "\nUpdated Rules:");
            for change in &report.changes {
                let _ = writeln!(out, "Rule ID: {} (STIG: {})", change.rule_id, change.stig_id);
                let _ = writeln!(
                    out,
                    "  Status: {} → {}",
                    change.original_status, change.new_status
                );
                let _ = writeln!(
                    out,
                    "  Details: {} → {}\n",
                    change.original_details, change.new_details
                );
            }
        }
        None => out.push_str("No matching rules found. No updates made.\n"),
    }
    out
}

/// Change log for a severity-engine run.
pub fn render_severity_log(report: &UpdateReport, summaries: &[SeveritySummary]) -> String {
    let mut out = String::new();
    let Some(path) = &report.output_path else {
        out.push_str("No matching rules found. No updates made.\n");
        return out;
    };

    let _ = writeln!(out, "Updated checklist saved to {}", path.display());
    let _ = writeln!(out, "\nSeverity-based Updates Summary:");
    for summary in summaries {
        let _ = writeln!(
            out,
            "\n{} Severity Rules:",
            summary.severity.as_str().to_uppercase()
        );
        let _ = writeln!(out, "  Total Updated: {}", summary.total_updated);
        let _ = writeln!(out, "  Sample Updates:");
        for change in &summary.sample {
            let _ = writeln!(out, "    Rule ID: {}", change.rule_id);
            let _ = writeln!(
                out,
                "    Status: {} → {}",
                change.original_status, change.new_status
            );
        }
    }
    out
}

/// Current status of every rule, shaped as unchanged change records so a
/// plain snapshot can be exported alongside run reports.
pub fn status_snapshot(checklist: &Checklist) -> Vec<RuleChange> {
    checklist
        .rules()
        .map(|(stig_id, rule)| RuleChange {
            rule_id: rule.rule_id.clone(),
            stig_id: stig_id.to_string(),
            severity: rule.severity,
            original_status: rule.status,
            new_status: rule.status,
            original_details: rule.finding_details.clone(),
            new_details: rule.finding_details.clone(),
        })
        .collect()
}

/// Documents that carry change records: a bare report, the `--json` output of
/// any update command, or a checklist whose current statuses are exported.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChangeSource {
    Report(UpdateReport),
    Command { data: CommandData },
    Checklist(Box<Checklist>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandData {
    Report(UpdateReport),
    WithReport { report: UpdateReport },
    Assessments(Vec<AssessedTarget>),
}

#[derive(Deserialize)]
struct AssessedTarget {
    report: UpdateReport,
}

/// Read change records from a report, command output, or checklist file.
pub fn load_change_records(path: &Path) -> Result<Vec<RuleChange>, ChecklistError> {
    let bytes = store::read_snapshot(path)?;
    let source: ChangeSource = serde_json::from_slice(&bytes).map_err(|_| {
        ChecklistError::Format(format!(
            "{} holds neither an update report, command output, nor a checklist",
            path.display()
        ))
    })?;

    Ok(match source {
        ChangeSource::Report(report) => report.changes,
        ChangeSource::Command { data } => match data {
            CommandData::Report(report) | CommandData::WithReport { report } => report.changes,
            CommandData::Assessments(targets) => targets
                .into_iter()
                .flat_map(|t| t.report.changes)
                .collect(),
        },
        ChangeSource::Checklist(checklist) => status_snapshot(&checklist),
    })
}

/// Write one CSV row per change, with a header row.
pub fn write_csv<W: Write>(changes: &[RuleChange], writer: W) -> Result<(), ChecklistError> {
    let mut csv = csv::Writer::from_writer(writer);
    for change in changes {
        csv.serialize(change)?;
    }
    csv.flush()?;
    Ok(())
}

/// [`write_csv`] to a file, creating parent directories as needed.
pub fn export_csv(changes: &[RuleChange], path: &Path) -> Result<(), ChecklistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    write_csv(changes, file)?;
    tracing::info!(path = %path.display(), rows = changes.len(), "Exported change records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::models::audit::EngineKind;
    use crate::models::checklist::{RuleStatus, Severity};

    fn change(rule_id: &str, severity: Severity) -> RuleChange {
        RuleChange {
            rule_id: rule_id.to_string(),
            stig_id: "PG".to_string(),
            severity,
            original_status: RuleStatus::NotReviewed,
            new_status: RuleStatus::Open,
            original_details: "prior".to_string(),
            new_details: "prior\nchecked".to_string(),
        }
    }

    fn report(changes: Vec<RuleChange>, written: bool) -> UpdateReport {
        UpdateReport {
            engine: EngineKind::RuleUpdate,
            source_path: PathBuf::from("a.cklb"),
            output_path: written.then(|| PathBuf::from("a_updated.cklb")),
            source_digest: String::new(),
            output_digest: None,
            generated_at: Utc::now(),
            changes,
            target_changes: Vec::new(),
        }
    }

    #[test]
    fn groups_in_first_seen_order_with_cap() {
        let changes = vec![
            change("H1", Severity::High),
            change("M1", Severity::Medium),
            change("H2", Severity::High),
            change("H3", Severity::High),
        ];
        let summaries = summarize_by_severity(&changes, 2);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].severity, Severity::High);
        assert_eq!(summaries[0].total_updated, 3);
        assert_eq!(summaries[0].sample.len(), 2);
        assert_eq!(summaries[1].severity, Severity::Medium);
        assert_eq!(summaries[1].total_updated, 1);
    }

    #[test]
    fn rule_hit_twice_counts_once() {
        let mut rhel = change("M1", Severity::Medium);
        rhel.stig_id = "RHEL".to_string();
        let changes = vec![
            change("M1", Severity::Medium),
            change("M2", Severity::Medium),
            change("M1", Severity::Medium),
            rhel,
        ];
        let summaries = summarize_by_severity(&changes, 10);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_updated, 3);
        assert_eq!(summaries[0].sample.len(), 3);
    }

    #[test]
    fn rule_log_lists_before_and_after() {
        let log = render_rule_log(&report(vec![change("SV-1r1", Severity::Low)], true));
        assert!(log.contains("Updated checklist saved to a_updated.cklb"));
        assert!(log.contains("Rule ID: SV-1r1 (STIG: PG)"));
        assert!(log.contains("  Status: not_reviewed → open"));
        assert!(log.contains("  Details: prior → prior\nchecked"));
    }

    #[test]
    fn noop_log() {
        let log = render_rule_log(&report(Vec::new(), false));
        assert_eq!(log, "No matching rules found. No updates made.\n");
    }

    #[test]
    fn severity_log_has_totals() {
        let changes = vec![change("M1", Severity::Medium)];
        let summaries = summarize_by_severity(&changes, 5);
        let log = render_severity_log(&report(changes, true), &summaries);
        assert!(log.contains("MEDIUM Severity Rules:"));
        assert!(log.contains("  Total Updated: 1"));
        assert!(log.contains("    Rule ID: M1"));
    }

    #[test]
    fn csv_has_header_and_one_row_per_change() {
        let mut buf = Vec::new();
        write_csv(
            &[change("R1", Severity::High), change("R2", Severity::Low)],
            &mut buf,
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(
                "rule_id,stig_id,severity,original_status,new_status,original_details,new_details"
            )
        );
        assert!(text.contains("R1,PG,high,not_reviewed,open,prior,"));
        // Embedded newlines are quoted, so rows are counted through the reader.
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        assert_eq!(reader.records().count(), 2);
    }
}
