//! Caller-supplied update directives.
//!
//! Directives arrive as loosely typed records (hand-written JSON, check
//! narratives built by an assessment shim), so enum-valued fields are kept as
//! raw strings until an engine validates the whole batch.

use serde::{Deserialize, Serialize};

use crate::errors::ChecklistError;
use crate::models::checklist::{RuleStatus, Severity};

/// Per-rule update: match on `rule_id` (and optionally `stig_id`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuleDirective {
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stig_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RuleDirective {
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            ..Self::default()
        }
    }

    pub fn in_stig(mut self, stig_id: impl Into<String>) -> Self {
        self.stig_id = Some(stig_id.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.finding_details = Some(details.into());
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    /// Check enum-valued fields and borrow the directive in typed form.
    pub fn validate(&self) -> Result<ValidRuleDirective<'_>, ChecklistError> {
        if self.rule_id.trim().is_empty() {
            return Err(ChecklistError::Validation(
                "Rule directive requires a rule_id".to_string(),
            ));
        }
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RuleStatus>)
            .transpose()?;
        Ok(ValidRuleDirective {
            rule_id: &self.rule_id,
            stig_id: self.stig_id.as_deref(),
            finding_details: self.finding_details.as_deref(),
            status,
        })
    }
}

/// A rule directive whose status is known to be in the closed enum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRuleDirective<'a> {
    pub rule_id: &'a str,
    pub stig_id: Option<&'a str>,
    pub finding_details: Option<&'a str>,
    pub status: Option<RuleStatus>,
}

impl ValidRuleDirective<'_> {
    /// An omitted `stig_id` matches whichever STIG owns the rule.
    pub fn matches(&self, stig_id: &str, rule_id: &str) -> bool {
        self.rule_id == rule_id && self.stig_id.unwrap_or(stig_id) == stig_id
    }

    /// Whether applying this directive changes anything at all.
    pub fn has_effect(&self) -> bool {
        self.finding_details.is_some() || self.status.is_some()
    }
}

/// Bulk update for every rule of one severity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeverityDirective {
    pub severity: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_details: Option<String>,
}

impl SeverityDirective {
    pub fn new(severity: Severity, status: RuleStatus) -> Self {
        Self {
            severity: severity.as_str().to_string(),
            status: status.as_str().to_string(),
            finding_details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.finding_details = Some(details.into());
        self
    }

    pub fn validate(&self) -> Result<ValidSeverityDirective<'_>, ChecklistError> {
        Ok(ValidSeverityDirective {
            severity: self.severity.parse()?,
            status: self.status.parse()?,
            finding_details: self.finding_details.as_deref(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidSeverityDirective<'a> {
    pub severity: Severity,
    pub status: RuleStatus,
    pub finding_details: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_stig_matches_any_stig() {
        let directive = RuleDirective::new("SV-1r1");
        let valid = directive.validate().unwrap();
        assert!(valid.matches("PG_STIG", "SV-1r1"));
        assert!(valid.matches("RHEL_9_STIG", "SV-1r1"));
        assert!(!valid.matches("PG_STIG", "SV-2r1"));
    }

    #[test]
    fn explicit_stig_restricts_match() {
        let directive = RuleDirective::new("SV-1r1").in_stig("PG_STIG");
        let valid = directive.validate().unwrap();
        assert!(valid.matches("PG_STIG", "SV-1r1"));
        assert!(!valid.matches("RHEL_9_STIG", "SV-1r1"));
    }

    #[test]
    fn invalid_status_is_rejected() {
        let directive = RuleDirective {
            status: Some("fixed".to_string()),
            ..RuleDirective::new("SV-1r1")
        };
        assert!(directive.validate().unwrap_err().is_validation());
    }

    #[test]
    fn blank_rule_id_is_rejected() {
        assert!(RuleDirective::new("  ").validate().is_err());
    }

    #[test]
    fn directive_without_fields_has_no_effect() {
        let directive = RuleDirective::new("SV-1r1");
        assert!(!directive.validate().unwrap().has_effect());
    }

    #[test]
    fn severity_directive_checks_both_enums() {
        let bad_severity = SeverityDirective {
            severity: "critical".to_string(),
            status: "open".to_string(),
            finding_details: None,
        };
        assert!(bad_severity.validate().is_err());

        let bad_status = SeverityDirective {
            severity: "high".to_string(),
            status: "closed".to_string(),
            finding_details: None,
        };
        assert!(bad_status.validate().is_err());

        let good = SeverityDirective::new(Severity::Medium, RuleStatus::Open);
        let valid = good.validate().unwrap();
        assert_eq!(valid.severity, Severity::Medium);
        assert_eq!(valid.status, RuleStatus::Open);
    }

    #[test]
    fn deserializes_partial_rule_directive() {
        let directive: RuleDirective =
            serde_json::from_str(r#"{"rule_id":"SV-1r1","status":"open"}"#).unwrap();
        assert_eq!(directive.stig_id, None);
        assert_eq!(directive.status.as_deref(), Some("open"));
    }
}
