//! Per-rule update engine.
//!
//! Directives are matched on `(rule_id, stig_id)`; several directives may hit
//! the same rule and compound in list order. The whole batch is validated
//! before the first rule is touched, so a bad status never leaves a
//! half-applied document behind.

use std::path::Path;

use crate::errors::ChecklistError;
use crate::models::audit::{EngineKind, RuleChange, UpdateOutcome};
use crate::models::checklist::Checklist;
use crate::models::directive::{RuleDirective, ValidRuleDirective};
use crate::services::{merge, store};

/// Validate every directive, failing on the first invalid entry.
pub fn validate_batch(
    directives: &[RuleDirective],
) -> Result<Vec<ValidRuleDirective<'_>>, ChecklistError> {
    directives
        .iter()
        .enumerate()
        .map(|(index, directive)| {
            directive.validate().map_err(|e| match e {
                ChecklistError::Validation(msg) => {
                    ChecklistError::Validation(format!("directive {index}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Apply a batch in memory and return one change record per effective match.
///
/// On a validation error the checklist is untouched.
pub fn apply_rule_directives(
    checklist: &mut Checklist,
    directives: &[RuleDirective],
) -> Result<Vec<RuleChange>, ChecklistError> {
    let batch = validate_batch(directives)?;
    let mut changes = Vec::new();

    for stig in &mut checklist.stigs {
        for rule in &mut stig.rules {
            let matching: Vec<&ValidRuleDirective<'_>> = batch
                .iter()
                .filter(|d| d.matches(&stig.stig_id, &rule.rule_id) && d.has_effect())
                .collect();

            for directive in matching {
                let original_status = rule.status;
                let original_details = rule.finding_details.clone();

                if let Some(details) = directive.finding_details {
                    merge::append_details(&mut rule.finding_details, details);
                }
                if let Some(status) = directive.status {
                    rule.status = status;
                }

                tracing::debug!(
                    stig_id = %stig.stig_id,
                    rule_id = %rule.rule_id,
                    from = %original_status,
                    to = %rule.status,
                    "Applied rule directive"
                );

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

/// Load `source`, apply the batch, and write `<stem>_updated.<ext>` if any
/// rule changed.
pub fn update_rules(
    source: &Path,
    directives: &[RuleDirective],
) -> Result<UpdateOutcome, ChecklistError> {
    // Reject the batch before touching the filesystem.
    validate_batch(directives)?;

    let mut loaded = store::load_with_digest(source)?;
    let changes = apply_rule_directives(&mut loaded.checklist, directives)?;

    tracing::info!(
        source = %source.display(),
        directives = directives.len(),
        changes = changes.len(),
        "Rule update batch applied"
    );

    store::persist_update(EngineKind::RuleUpdate, source, loaded, changes, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checklist::{Rule, RuleStatus, Severity, Stig, TargetData};

    fn rule(rule_id: &str, details: &str) -> Rule {
        serde_json::from_value(serde_json::json!({
            "rule_id": rule_id,
            "severity": "medium",
            "status": "not_reviewed",
            "finding_details": details,
        }))
        .unwrap()
    }

    fn stig(stig_id: &str, rules: Vec<Rule>) -> Stig {
        Stig {
            stig_name: String::new(),
            display_name: String::new(),
            stig_id: stig_id.to_string(),
            release_info: String::new(),
            uuid: format!("{stig_id}-uuid"),
            reference_identifier: None,
            size: rules.len(),
            rules,
            extra: Default::default(),
        }
    }

    fn checklist(stigs: Vec<Stig>) -> Checklist {
        Checklist {
            title: "test".to_string(),
            cklb_version: "1.0".to_string(),
            id: "doc".to_string(),
            active: true,
            mode: 0,
            has_path: true,
            target_data: TargetData::default(),
            stigs,
            extra: Default::default(),
        }
    }

    #[test]
    fn status_only_leaves_details_empty() {
        let mut doc = checklist(vec![stig("S", vec![rule("R1", "")])]);
        let directives = vec![RuleDirective::new("R1").with_status(RuleStatus::Open)];
        let changes = apply_rule_directives(&mut doc, &directives).unwrap();

        let r = doc.find_rule("S", "R1").unwrap();
        assert_eq!(r.status, RuleStatus::Open);
        assert_eq!(r.finding_details, "");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].original_status, RuleStatus::NotReviewed);
        assert_eq!(changes[0].severity, Severity::Medium);
    }

    #[test]
    fn details_are_appended() {
        let mut doc = checklist(vec![stig("S", vec![rule("R1", "prior")])]);
        let directives = vec![RuleDirective::new("R1").with_details("checked")];
        apply_rule_directives(&mut doc, &directives).unwrap();
        assert_eq!(doc.find_rule("S", "R1").unwrap().finding_details, "prior\nchecked");
    }

    #[test]
    fn matching_directives_compound_in_order() {
        let mut doc = checklist(vec![stig("S", vec![rule("R1", "orig")])]);
        let directives = vec![
            RuleDirective::new("R1")
                .with_details("text")
                .with_status(RuleStatus::Open),
            RuleDirective::new("R1")
                .with_details("text")
                .with_status(RuleStatus::NotAFinding),
        ];
        let changes = apply_rule_directives(&mut doc, &directives).unwrap();

        let r = doc.find_rule("S", "R1").unwrap();
        assert_eq!(r.finding_details, "orig\ntext\ntext");
        assert_eq!(r.status, RuleStatus::NotAFinding);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].original_status, RuleStatus::Open);
        assert_eq!(changes[1].original_details, "orig\ntext");
    }

    #[test]
    fn explicit_stig_restricts_match() {
        let mut doc = checklist(vec![
            stig("A", vec![rule("R1", "")]),
            stig("B", vec![rule("R1", "")]),
        ]);
        let directives = vec![RuleDirective::new("R1")
            .in_stig("B")
            .with_status(RuleStatus::Open)];
        apply_rule_directives(&mut doc, &directives).unwrap();
        assert_eq!(doc.find_rule("A", "R1").unwrap().status, RuleStatus::NotReviewed);
        assert_eq!(doc.find_rule("B", "R1").unwrap().status, RuleStatus::Open);
    }

    #[test]
    fn omitted_stig_hits_every_owner() {
        let mut doc = checklist(vec![
            stig("A", vec![rule("R1", "")]),
            stig("B", vec![rule("R1", "")]),
        ]);
        let directives = vec![RuleDirective::new("R1").with_status(RuleStatus::Open)];
        let changes = apply_rule_directives(&mut doc, &directives).unwrap();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn invalid_status_late_in_batch_mutates_nothing() {
        let mut doc = checklist(vec![stig("S", vec![rule("R1", ""), rule("R2", "")])]);
        let before = doc.clone();
        let directives = vec![
            RuleDirective::new("R1").with_status(RuleStatus::Open),
            RuleDirective {
                status: Some("fixed".to_string()),
                ..RuleDirective::new("R2")
            },
        ];
        let err = apply_rule_directives(&mut doc, &directives).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("directive 1"));
        assert_eq!(doc, before);
    }

    #[test]
    fn unmatched_directive_changes_nothing() {
        let mut doc = checklist(vec![stig("S", vec![rule("R1", "")])]);
        let before = doc.clone();
        let directives = vec![RuleDirective::new("DOES-NOT-EXIST").with_status(RuleStatus::Open)];
        let changes = apply_rule_directives(&mut doc, &directives).unwrap();
        assert!(changes.is_empty());
        assert_eq!(doc, before);
    }

    #[test]
    fn empty_directive_is_not_a_change() {
        let mut doc = checklist(vec![stig("S", vec![rule("R1", "x")])]);
        let changes = apply_rule_directives(&mut doc, &[RuleDirective::new("R1")]).unwrap();
        assert!(changes.is_empty());
    }
}
