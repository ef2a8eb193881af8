//! Checklist snapshot model with the closed enums shared by the parser and both engines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ChecklistError;

// -- Closed enums --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient mapping used at parse time: lower-cases the raw attribute and
    /// clamps anything missing or unrecognized to `Unknown`.
    pub fn from_benchmark(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().to_lowercase().parse().ok())
            .unwrap_or(Self::Unknown)
    }
}

impl FromStr for Severity {
    type Err = ChecklistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| {
                ChecklistError::Validation(format!(
                    "Invalid severity: {s}. Must be one of {}",
                    Self::ALL.map(|v| v.as_str()).join(", ")
                ))
            })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RuleStatus {
    #[default]
    #[serde(rename = "not_reviewed")]
    NotReviewed,
    #[serde(rename = "not_applicable")]
    NotApplicable,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "not_a_finding")]
    NotAFinding,
}

impl RuleStatus {
    pub const ALL: [RuleStatus; 4] = [
        Self::NotReviewed,
        Self::NotApplicable,
        Self::Open,
        Self::NotAFinding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReviewed => "not_reviewed",
            Self::NotApplicable => "not_applicable",
            Self::Open => "open",
            Self::NotAFinding => "not_a_finding",
        }
    }
}

impl FromStr for RuleStatus {
    type Err = ChecklistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ChecklistError::Validation(format!(
                    "Invalid status: {s}. Must be one of {}",
                    Self::ALL.map(|v| v.as_str()).join(", ")
                ))
            })
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Checklist document --

fn default_true() -> bool {
    true
}

fn default_cklb_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checklist {
    pub title: String,
    #[serde(default = "default_cklb_version")]
    pub cklb_version: String,
    pub id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub mode: i64,
    #[serde(default = "default_true")]
    pub has_path: bool,
    #[serde(default)]
    pub target_data: TargetData,
    pub stigs: Vec<Stig>,
    /// Fields this model does not name, carried through load/save untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Checklist {
    /// Total number of rules across all STIG sections.
    pub fn rule_count(&self) -> usize {
        self.stigs.iter().map(|s| s.rules.len()).sum()
    }

    /// Look up a rule by its (stig_id, rule_id) identity.
    pub fn find_rule(&self, stig_id: &str, rule_id: &str) -> Option<&Rule> {
        self.stigs
            .iter()
            .filter(|s| s.stig_id == stig_id)
            .flat_map(|s| s.rules.iter())
            .find(|r| r.rule_id == rule_id)
    }

    /// Every rule paired with its owning STIG id, in document order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.stigs
            .iter()
            .flat_map(|s| s.rules.iter().map(move |r| (s.stig_id.as_str(), r)))
    }

    /// (stig_id, rule_id) pairs that appear more than once.
    pub fn duplicate_rule_keys(&self) -> Vec<(String, String)> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for (stig_id, rule) in self.rules() {
            let key = (stig_id.to_string(), rule.rule_id.clone());
            if !seen.insert(key.clone()) && !duplicates.contains(&key) {
                duplicates.push(key);
            }
        }
        duplicates
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TargetData {
    pub target_type: String,
    pub host_name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub fqdn: String,
    pub comments: String,
    pub role: String,
    pub is_web_database: bool,
    pub technology_area: String,
    pub web_db_site: String,
    pub web_db_instance: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stig {
    #[serde(default)]
    pub stig_name: String,
    #[serde(default)]
    pub display_name: String,
    pub stig_id: String,
    #[serde(default)]
    pub release_info: String,
    pub uuid: String,
    #[serde(default)]
    pub reference_identifier: Option<String>,
    #[serde(default)]
    pub size: usize,
    pub rules: Vec<Rule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to the automated check content a rule points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CheckContentRef {
    pub name: String,
    pub href: String,
}

/// One level of the group hierarchy above a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GroupNode {
    pub id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub stig_uuid: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub group_id_src: String,
    pub rule_id: String,
    #[serde(default)]
    pub rule_id_src: String,
    #[serde(default)]
    pub target_key: Option<String>,
    #[serde(default)]
    pub stig_ref: Option<String>,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub classification: String,
    pub severity: Severity,
    #[serde(default)]
    pub rule_version: String,
    #[serde(default)]
    pub rule_title: String,
    #[serde(default)]
    pub fix_text: String,
    #[serde(default)]
    pub reference_identifier: Option<String>,
    #[serde(default)]
    pub group_title: String,
    #[serde(default)]
    pub false_positives: String,
    #[serde(default)]
    pub false_negatives: String,
    #[serde(default)]
    pub discussion: String,
    #[serde(default)]
    pub check_content: String,
    #[serde(default)]
    pub documentable: String,
    #[serde(default)]
    pub mitigations: String,
    #[serde(default)]
    pub potential_impacts: String,
    #[serde(default)]
    pub third_party_tools: String,
    #[serde(default)]
    pub mitigation_control: String,
    #[serde(default)]
    pub responsibility: String,
    #[serde(default)]
    pub security_override_guidance: String,
    #[serde(default)]
    pub ia_controls: String,
    #[serde(default)]
    pub check_content_ref: Option<CheckContentRef>,
    #[serde(default)]
    pub legacy_ids: Vec<String>,
    #[serde(default)]
    pub ccis: Vec<String>,
    #[serde(default)]
    pub group_tree: Vec<GroupNode>,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
    pub status: RuleStatus,
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub finding_details: String,
    #[serde(rename = "STIGUuid", default)]
    pub legacy_stig_uuid: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
