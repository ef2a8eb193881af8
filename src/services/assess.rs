//! Per-target assessment runs.
//!
//! For every target a fresh copy of the template checklist is made in the
//! results directory and the parameter checks are applied to it in a single
//! rule-update batch. Targets are processed one after another; a failure on
//! one target is logged and the run moves on.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::ChecklistError;
use crate::models::audit::UpdateOutcome;
use crate::models::checklist::RuleStatus;
use crate::services::identity::Clock;
use crate::services::pg_checks::{self, Diagnostics, ServerParameter, ServerParameters};
use crate::services::{rule_update, severity_update};

/// Parameter listing for one named target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetParameters {
    pub name: String,
    pub parameters: Vec<ServerParameter>,
    /// Raw `psql` output for the query checks.
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Accepted shapes of a parameters file: a list of named targets, or a bare
/// listing for one target.
///
/// Named targets are tried first since a bare entry has no `parameters` key.
/// An empty array therefore means no targets at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParameterFile {
    Targets(Vec<TargetParameters>),
    Single(Vec<ServerParameter>),
}

impl ParameterFile {
    pub fn into_targets(self, default_name: &str) -> Vec<TargetParameters> {
        match self {
            Self::Single(parameters) => vec![TargetParameters {
                name: default_name.to_string(),
                parameters,
                diagnostics: Diagnostics::default(),
            }],
            Self::Targets(targets) => targets,
        }
    }
}

/// Options for an assessment run.
#[derive(Debug, Clone)]
pub struct AssessOptions {
    pub results_dir: PathBuf,
    pub log_line_prefix: String,
    pub summary_sample_limit: usize,
    /// When set, every medium rule is given this status before the checks run.
    pub cat_ii_default: Option<RuleStatus>,
}

impl AssessOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            results_dir: config.results_dir.clone(),
            log_line_prefix: config.log_line_prefix.clone(),
            summary_sample_limit: config.summary_sample_limit,
            cat_ii_default: None,
        }
    }
}

/// Result for one target.
#[derive(Debug)]
pub struct TargetAssessment {
    pub target: String,
    pub baseline: PathBuf,
    pub outcome: UpdateOutcome,
}

/// Target names become file names, so each must be a single plain path
/// component.
fn validate_target_name(name: &str) -> Result<(), ChecklistError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(ChecklistError::Validation(format!(
            "target name '{name}' is not a plain file name"
        )));
    }
    Ok(())
}

/// `<results_dir>/<target>_<YYYYmmdd_HHMMSS>.<template ext>`
fn baseline_path(
    template: &Path,
    options: &AssessOptions,
    target: &str,
    clock: &dyn Clock,
) -> PathBuf {
    let stamp = clock.now().format("%Y%m%d_%H%M%S");
    let ext = template
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cklb".to_string());
    options.results_dir.join(format!("{target}_{stamp}.{ext}"))
}

/// Copy the template for `target` and apply its parameter checks.
pub fn assess_target(
    template: &Path,
    target: &TargetParameters,
    options: &AssessOptions,
    clock: &dyn Clock,
) -> Result<TargetAssessment, ChecklistError> {
    validate_target_name(&target.name)?;
    if !template.exists() {
        return Err(ChecklistError::NotFound(template.display().to_string()));
    }

    let mut baseline = baseline_path(template, options, &target.name, clock);
    fs::create_dir_all(&options.results_dir)?;
    fs::copy(template, &baseline)?;

    if let Some(status) = options.cat_ii_default {
        let directives = [pg_checks::cat_ii_default(status)];
        let severity =
            severity_update::update_severity(&baseline, &directives, options.summary_sample_limit)?;
        if let Some(output) = severity.outcome.report.output_path {
            baseline = output;
        }
    }

    let params = ServerParameters::from_entries(target.parameters.iter().cloned());
    let directives =
        pg_checks::assess_parameters(&params, &target.diagnostics, &options.log_line_prefix);
    let outcome = rule_update::update_rules(&baseline, &directives)?;

    tracing::info!(
        target_name = %target.name,
        directives = directives.len(),
        rules_touched = outcome.report.rules_touched(),
        "Target assessed"
    );

    Ok(TargetAssessment {
        target: target.name.clone(),
        baseline,
        outcome,
    })
}

/// Assess every target in order, skipping those that fail.
pub fn assess_targets(
    template: &Path,
    targets: &[TargetParameters],
    options: &AssessOptions,
    clock: &dyn Clock,
) -> Vec<TargetAssessment> {
    let mut results = Vec::new();
    for target in targets {
        tracing::info!(target_name = %target.name, "Processing target");
        match assess_target(template, target, options, clock) {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(target_name = %target.name, error = %e, "Skipping target");
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_listing_becomes_one_target() {
        let file: ParameterFile =
            serde_json::from_str(r#"[{"name":"ssl","value":"on"},{"name":"port","value":null}]"#)
                .unwrap();
        let targets = file.into_targets("pg01");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "pg01");
        assert_eq!(targets[0].parameters.len(), 2);
    }

    #[test]
    fn target_names_must_stay_inside_results_dir() {
        for bad in ["", ".", "..", "../x", "a/b", "/tmp/x", "a\\b"] {
            let err = validate_target_name(bad).unwrap_err();
            assert!(err.is_validation(), "{bad:?} accepted");
        }
        for good in ["pg01", "pg01_orders", "pg.prod-01"] {
            assert!(validate_target_name(good).is_ok(), "{good:?} rejected");
        }
    }

    #[test]
    fn empty_file_has_no_targets() {
        let file: ParameterFile = serde_json::from_str("[]").unwrap();
        assert!(file.into_targets("pg01").is_empty());
    }

    #[test]
    fn named_targets_are_kept() {
        let file: ParameterFile = serde_json::from_str(
            r#"[{"name":"pg01","parameters":[]},{"name":"pg02","parameters":[{"name":"ssl","value":"off"}]}]"#,
        )
        .unwrap();
        let targets = file.into_targets("ignored");
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["pg01", "pg02"]);
        assert_eq!(targets[0].diagnostics, Diagnostics::default());
    }

    #[test]
    fn named_target_carries_diagnostics() {
        let file: ParameterFile = serde_json::from_str(
            r#"[{"name":"pg01","parameters":[],"diagnostics":{"roles":"postgres","pgcrypto":"1.3"}}]"#,
        )
        .unwrap();
        let targets = file.into_targets("ignored");
        assert_eq!(targets[0].diagnostics.roles.as_deref(), Some("postgres"));
        assert_eq!(targets[0].diagnostics.pgcrypto.as_deref(), Some("1.3"));
        assert!(targets[0].diagnostics.privileges.is_none());
    }
}
