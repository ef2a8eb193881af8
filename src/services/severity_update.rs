//! Bulk status update keyed on rule severity.

use std::path::Path;

use crate::errors::ChecklistError;
use crate::models::audit::{EngineKind, RuleChange, SeveritySummary, UpdateOutcome};
use crate::models::checklist::Checklist;
use crate::models::directive::{SeverityDirective, ValidSeverityDirective};
use crate::services::{merge, store, summary};

/// Outcome of a severity run with its per-severity roll-up.
#[derive(Debug, Clone)]
pub struct SeverityUpdateOutcome {
    pub outcome: UpdateOutcome,
    pub summaries: Vec<SeveritySummary>,
}

pub fn validate_batch(
    directives: &[SeverityDirective],
) -> Result<Vec<ValidSeverityDirective<'_>>, ChecklistError> {
    directives.iter().map(SeverityDirective::validate).collect()
}

/// Apply every directive to every rule of its severity, across all STIGs.
///
/// Status is overwritten unconditionally; details, when given, are appended.
pub fn apply_severity_directives(
    checklist: &mut Checklist,
    directives: &[SeverityDirective],
) -> Result<Vec<RuleChange>, ChecklistError> {
    let batch = validate_batch(directives)?;
    let mut changes = Vec::new();

    for stig in &mut checklist.stigs {
        for rule in &mut stig.rules {
            for directive in batch.iter().filter(|d| d.severity == rule.severity) {
                let original_status = rule.status;
                let original_details = rule.finding_details.clone();

                rule.status = directive.status;
                if let Some(details) = directive.finding_details {
                    merge::append_details(&mut rule.finding_details, details);
                }

                changes.push(RuleChange {
                    rule_id: rule.rule_id.clone(),
                    stig_id: stig.stig_id.clone(),
                    severity: rule.severity,
                    original_status,
                    new_status: rule.status,
                    original_details,
                    new_details: rule.finding_details.clone(),
                });
            }
        }
    }

    Ok(changes)
}

/// Load `source`, apply the batch, and write `<stem>_severity_updated.<ext>`
/// if any rule matched. `sample_limit` caps the per-severity sample.
pub fn update_severity(
    source: &Path,
    directives: &[SeverityDirective],
    sample_limit: usize,
) -> Result<SeverityUpdateOutcome, ChecklistError> {
    validate_batch(directives)?;

    let mut loaded = store::load_with_digest(source)?;
    let changes = apply_severity_directives(&mut loaded.checklist, directives)?;
    let summaries = summary::summarize_by_severity(&changes, sample_limit);

    for s in &summaries {
        tracing::info!(
            severity = %s.severity,
            total_updated = s.total_updated,
            "Severity update applied"
        );
    }

    let outcome = store::persist_update(
        EngineKind::SeverityUpdate,
        source,
        loaded,
        changes,
        Vec::new(),
    )?;

    Ok(SeverityUpdateOutcome { outcome, summaries })
}
