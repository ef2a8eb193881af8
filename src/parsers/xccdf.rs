//! XCCDF benchmark parser.
//!
//! Reads a DISA-style XCCDF 1.1/1.2 benchmark and emits a checklist with a
//! single STIG section. Rule and group identifiers lose their benchmark
//! prefixes, severities are clamped to the closed enum, and the escaped
//! `<VulnDiscussion>` block inside each rule description is unpacked into
//! the individual descriptive fields.

use std::fs;
use std::path::Path;

use crate::errors::ChecklistError;
use crate::models::checklist::{
    CheckContentRef, Checklist, GroupNode, Rule, RuleStatus, Severity, Stig, TargetData,
};
use crate::parsers::xml::{self, XmlElement};
use crate::parsers::BenchmarkParser;
use crate::services::identity::{self, Clock, IdGenerator, SystemClock, UuidGenerator};

/// XCCDF namespaces accepted for element lookup.
pub const XCCDF_NAMESPACES: &[&str] = &[
    "http://checklists.nist.gov/xccdf/1.2",
    "http://checklists.nist.gov/xccdf/1.1",
];

const CCI_SYSTEMS: &[&str] = &["http://cyber.mil/cci", "http://iase.disa.mil/cci"];
const LEGACY_SYSTEMS: &[&str] = &["http://cyber.mil/legacy", "http://legacy-id"];

const RULE_ID_PREFIXES: &[&str] = &["xccdf_mil.disa.stig_rule_", "rule_"];
const RULE_ID_SUFFIX: &str = "_rule";
const GROUP_ID_PREFIX: &str = "xccdf_mil.disa.stig_group_";

/// Parser for XCCDF benchmark XML.
pub struct XccdfParser {
    ids: Box<dyn IdGenerator>,
    clock: Box<dyn Clock>,
}

impl Default for XccdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl XccdfParser {
    pub fn new() -> Self {
        Self::with_sources(Box::new(UuidGenerator), Box::new(SystemClock))
    }

    /// Use caller-supplied identifier and time sources.
    pub fn with_sources(ids: Box<dyn IdGenerator>, clock: Box<dyn Clock>) -> Self {
        Self { ids, clock }
    }

    /// Parse a benchmark file; the file name becomes the checklist title.
    pub fn parse_file(&self, path: &Path) -> Result<Checklist, ChecklistError> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ChecklistError::NotFound(path.display().to_string()),
            _ => ChecklistError::Io(e),
        })?;
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parse(&data, &title)
    }

    fn build_stig(&self, benchmark: &XmlElement) -> Stig {
        let stig_uuid = self.ids.next_id();
        let timestamp = identity::iso_timestamp(self.clock.now());

        let mut located = Vec::new();
        collect_rules(benchmark, &mut Vec::new(), &mut located);

        let rules: Vec<Rule> = located
            .into_iter()
            .map(|(rule, trail)| self.build_rule(rule, &trail, &stig_uuid, &timestamp))
            .collect();

        let stig_name = child_text(benchmark, "title");
        let release_info = benchmark
            .children
            .iter()
            .find(|c| c.is(XCCDF_NAMESPACES, "plain-text") && c.attr("id") == Some("release-info"))
            .map(|c| c.text.clone())
            .unwrap_or_else(|| child_text(benchmark, "version"));

        Stig {
            display_name: stig_name.replace("Security Technical Implementation Guide", "STIG"),
            stig_name,
            stig_id: benchmark.attr("id").unwrap_or_default().to_string(),
            release_info,
            uuid: stig_uuid,
            reference_identifier: None,
            size: rules.len(),
            rules,
            extra: Default::default(),
        }
    }

    fn build_rule(
        &self,
        rule: &XmlElement,
        trail: &[&XmlElement],
        stig_uuid: &str,
        timestamp: &str,
    ) -> Rule {
        let rule_id_src = rule.attr("id").unwrap_or_default().to_string();
        let parent = trail.last();
        let group_id_src = parent
            .and_then(|g| g.attr("id"))
            .unwrap_or(&rule_id_src)
            .to_string();

        // DISA benchmarks carry these as escaped markup inside the description;
        // others use standalone child elements.
        let description = child_text(rule, "description");
        let field = |tag: &str, element: &str| {
            embedded_field(&description, tag).unwrap_or_else(|| child_text(rule, element))
        };

        let (ccis, legacy_ids) = collect_idents(rule);

        Rule {
            uuid: self.ids.next_id(),
            stig_uuid: stig_uuid.to_string(),
            group_id: strip_group_id(&group_id_src),
            group_id_src,
            rule_id: strip_rule_id(&rule_id_src),
            rule_id_src,
            target_key: None,
            stig_ref: None,
            weight: rule.attr("weight").unwrap_or_default().to_string(),
            classification: child_text(rule, "classification"),
            severity: self.map_severity(rule.attr("severity")),
            rule_version: child_text(rule, "version"),
            rule_title: child_text(rule, "title"),
            fix_text: child_text(rule, "fixtext"),
            reference_identifier: None,
            group_title: parent.map(|g| child_text(g, "title")).unwrap_or_default(),
            false_positives: field("FalsePositives", "false-positives"),
            false_negatives: field("FalseNegatives", "false-negatives"),
            documentable: field("Documentable", "documentable"),
            mitigations: field("Mitigations", "mitigations"),
            potential_impacts: field("PotentialImpacts", "potential-impacts"),
            third_party_tools: field("ThirdPartyTools", "third-party-tools"),
            mitigation_control: field("MitigationControl", "mitigation-control"),
            responsibility: field("Responsibility", "responsibility"),
            security_override_guidance: field(
                "SeverityOverrideGuidance",
                "security-override-guidance",
            ),
            ia_controls: field("IAControls", "ia-controls"),
            discussion: embedded_field(&description, "VulnDiscussion")
                .unwrap_or_else(|| description.clone()),
            check_content: rule
                .descendant(XCCDF_NAMESPACES, "check-content")
                .map(|c| c.text.clone())
                .unwrap_or_default(),
            check_content_ref: rule
                .descendant(XCCDF_NAMESPACES, "check-content-ref")
                .map(|c| CheckContentRef {
                    name: c.attr("name").unwrap_or_default().to_string(),
                    href: c.attr("href").unwrap_or_default().to_string(),
                }),
            legacy_ids,
            ccis,
            group_tree: trail
                .iter()
                .map(|g| GroupNode {
                    id: g.attr("id").unwrap_or_default().to_string(),
                    title: child_text(g, "title"),
                    description: child_text(g, "description"),
                })
                .collect(),
            created_at: timestamp.to_string(),
            updated_at: timestamp.to_string(),
            status: RuleStatus::NotReviewed,
            overrides: Default::default(),
            comments: String::new(),
            finding_details: String::new(),
            legacy_stig_uuid: stig_uuid.to_string(),
            extra: Default::default(),
        }
    }
}

impl BenchmarkParser for XccdfParser {
    fn parse(&self, data: &[u8], source_name: &str) -> Result<Checklist, ChecklistError> {
        let root = xml::parse_document(data)?;
        let benchmark = if root.is(XCCDF_NAMESPACES, "Benchmark") {
            &root
        } else {
            root.descendant(XCCDF_NAMESPACES, "Benchmark").ok_or_else(|| {
                ChecklistError::Parse(format!("{source_name}: no XCCDF Benchmark element"))
            })?
        };

        let id = self.ids.next_id();
        let stig = self.build_stig(benchmark);

        tracing::info!(
            source = source_name,
            stig_id = %stig.stig_id,
            rules = stig.size,
            "Parsed XCCDF benchmark"
        );

        Ok(Checklist {
            title: source_name.to_string(),
            cklb_version: "1.0".to_string(),
            id,
            active: true,
            mode: 0,
            has_path: true,
            target_data: TargetData::default(),
            stigs: vec![stig],
            extra: Default::default(),
        })
    }

    fn format_name(&self) -> &str {
        "XCCDF"
    }

    fn map_severity(&self, raw: Option<&str>) -> Severity {
        Severity::from_benchmark(raw)
    }
}

/// Collect every Rule under `element` with the Group trail leading to it,
/// outermost group first.
fn collect_rules<'a>(
    element: &'a XmlElement,
    trail: &mut Vec<&'a XmlElement>,
    out: &mut Vec<(&'a XmlElement, Vec<&'a XmlElement>)>,
) {
    for child in &element.children {
        if child.is(XCCDF_NAMESPACES, "Rule") {
            out.push((child, trail.clone()));
        } else if child.is(XCCDF_NAMESPACES, "Group") {
            trail.push(child);
            collect_rules(child, trail, out);
            trail.pop();
        } else {
            collect_rules(child, trail, out);
        }
    }
}

/// Split `ident` references into (CCI, legacy) sequences in document order.
fn collect_idents(rule: &XmlElement) -> (Vec<String>, Vec<String>) {
    let mut ccis = Vec::new();
    let mut legacy = Vec::new();
    for ident in rule.descendants(XCCDF_NAMESPACES, "ident") {
        let value = ident.text.trim().to_string();
        match ident.attr("system") {
            Some(system) if CCI_SYSTEMS.contains(&system) => ccis.push(value),
            Some(system) if LEGACY_SYSTEMS.contains(&system) => legacy.push(value),
            _ => {}
        }
    }
    (ccis, legacy)
}

/// Text of a direct XCCDF child, or empty when absent.
fn child_text(element: &XmlElement, local: &str) -> String {
    element
        .child(XCCDF_NAMESPACES, local)
        .map(|c| c.text.clone())
        .unwrap_or_default()
}

/// Content of `<tag>...</tag>` inside an already-unescaped description.
fn embedded_field(description: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = description.find(&open)? + open.len();
    let end = start + description[start..].find(&close)?;
    Some(description[start..end].to_string())
}

fn strip_rule_id(raw: &str) -> String {
    let mut id = raw;
    for prefix in RULE_ID_PREFIXES {
        id = id.strip_prefix(prefix).unwrap_or(id);
    }
    id.strip_suffix(RULE_ID_SUFFIX).unwrap_or(id).to_string()
}

fn strip_group_id(raw: &str) -> String {
    raw.strip_prefix(GROUP_ID_PREFIX).unwrap_or(raw).to_string()
}
