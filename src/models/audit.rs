//! Change records and run reports produced by the update engines.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::checklist::{Checklist, RuleStatus, Severity};

/// Which engine produced a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    RuleUpdate,
    SeverityUpdate,
    TargetUpdate,
}

impl EngineKind {
    /// Suffix token appended to the source file stem for this engine's output.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            Self::RuleUpdate => "updated",
            Self::SeverityUpdate => "severity_updated",
            Self::TargetUpdate => "database_updated",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleUpdate => write!(f, "rule_update"),
            Self::SeverityUpdate => write!(f, "severity_update"),
            Self::TargetUpdate => write!(f, "target_update"),
        }
    }
}

/// Before/after values for one directive applied to one rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleChange {
    pub rule_id: String,
    pub stig_id: String,
    pub severity: Severity,
    pub original_status: RuleStatus,
    pub new_status: RuleStatus,
    pub original_details: String,
    pub new_details: String,
}

/// Before/after value of one target_data field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// Audit record for one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub engine: EngineKind,
    pub source_path: PathBuf,
    /// Absent when no rule matched and nothing was written.
    pub output_path: Option<PathBuf>,
    /// SHA-256 of the source snapshot bytes.
    pub source_digest: String,
    pub output_digest: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub changes: Vec<RuleChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_changes: Vec<FieldChange>,
}

impl UpdateReport {
    /// Whether the run wrote a new snapshot.
    pub fn is_noop(&self) -> bool {
        self.output_path.is_none()
    }

    /// Number of distinct rules touched by this run.
    pub fn rules_touched(&self) -> usize {
        let mut keys: Vec<(&str, &str)> = self
            .changes
            .iter()
            .map(|c| (c.stig_id.as_str(), c.rule_id.as_str()))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    }
}

/// Result of one engine run: the mutated document and its audit record.
///
/// The checklist is returned whether or not it was persisted.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub checklist: Checklist,
    pub report: UpdateReport,
}

/// Per-severity roll-up for bulk updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeveritySummary {
    pub severity: Severity,
    pub total_updated: usize,
    /// The first few changes for this severity, capped by configuration.
    pub sample: Vec<RuleChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(stig: &str, rule: &str) -> RuleChange {
        RuleChange {
            rule_id: rule.to_string(),
            stig_id: stig.to_string(),
            severity: Severity::High,
            original_status: RuleStatus::NotReviewed,
            new_status: RuleStatus::Open,
            original_details: String::new(),
            new_details: String::new(),
        }
    }

    #[test]
    fn output_suffix_per_engine() {
        assert_eq!(EngineKind::RuleUpdate.output_suffix(), "updated");
        assert_eq!(EngineKind::SeverityUpdate.output_suffix(), "severity_updated");
        assert_eq!(EngineKind::TargetUpdate.output_suffix(), "database_updated");
    }

    #[test]
    fn rules_touched_counts_distinct_rules() {
        let report = UpdateReport {
            engine: EngineKind::RuleUpdate,
            source_path: PathBuf::from("a.cklb"),
            output_path: Some(PathBuf::from("a_updated.cklb")),
            source_digest: String::new(),
            output_digest: None,
            generated_at: Utc::now(),
            changes: vec![change("S", "R1"), change("S", "R1"), change("S", "R2")],
            target_changes: vec![],
        };
        assert_eq!(report.rules_touched(), 2);
        assert!(!report.is_noop());
    }

    #[test]
    fn engine_kind_serialization() {
        let json = serde_json::to_string(&EngineKind::SeverityUpdate).unwrap();
        assert_eq!(json, "\"severity_update\"");
    }
}
