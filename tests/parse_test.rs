//! Benchmark parsing against a DISA-style XCCDF fixture.

use stigkit::models::checklist::{RuleStatus, Severity};
use stigkit::parsers::xccdf::XccdfParser;
use stigkit::parsers::BenchmarkParser;
use stigkit::services::identity::{FixedClock, SequentialIdGenerator};
use stigkit::services::store;

const BENCHMARK: &str = include_str!("fixtures/sample_benchmark.xml");

fn parser() -> XccdfParser {
    XccdfParser::with_sources(
        Box::new(SequentialIdGenerator::new()),
        Box::new(FixedClock::at(2024, 7, 24).unwrap()),
    )
}

#[test]
fn every_rule_element_becomes_a_rule() {
    let checklist = parser()
        .parse(BENCHMARK.as_bytes(), "PostgreSQL_9-x_STIG.xml")
        .unwrap();

    let rule_elements = BENCHMARK.matches("<Rule ").count();
    assert_eq!(checklist.stigs.len(), 1);
    let stig = &checklist.stigs[0];
    assert_eq!(stig.rules.len(), rule_elements);
    assert_eq!(stig.size, rule_elements);
    assert_eq!(stig.stig_id, "PostgreSQL_9-x_STIG");
    assert_eq!(stig.display_name, "PostgreSQL 9.x STIG");
}

#[test]
fn rule_fields_come_from_the_benchmark() {
    let checklist = parser().parse(BENCHMARK.as_bytes(), "pg.xml").unwrap();
    let rule = checklist
        .find_rule("PostgreSQL_9-x_STIG", "SV-214048r960966")
        .unwrap();

    assert_eq!(rule.rule_id_src, "SV-214048r960966_rule");
    assert_eq!(rule.group_id, "V-214048");
    assert_eq!(rule.group_title, "SRG-APP-000142-DB-000094");
    assert_eq!(rule.rule_version, "PGS9-00-000100");
    assert_eq!(rule.weight, "10.0");
    assert_eq!(rule.severity, Severity::Medium);
    assert_eq!(rule.ccis, vec!["CCI-000382", "CCI-001762"]);
    assert_eq!(rule.legacy_ids, vec!["SV-87493", "V-72841"]);
    assert_eq!(rule.documentable, "false");
    assert!(rule.discussion.starts_with("In order to prevent unauthorized connection"));
    assert_eq!(rule.check_content, "As the database administrator, run SHOW port;");
    assert_eq!(rule.group_tree.len(), 1);
    assert_eq!(rule.group_tree[0].id, "V-214048");
    assert_eq!(rule.status, RuleStatus::NotReviewed);
    assert_eq!(rule.legacy_stig_uuid, checklist.stigs[0].uuid);
}

#[test]
fn missing_severity_parses_as_unknown() {
    let checklist = parser().parse(BENCHMARK.as_bytes(), "pg.xml").unwrap();
    let rule = checklist
        .find_rule("PostgreSQL_9-x_STIG", "SV-999999r1")
        .unwrap();
    assert_eq!(rule.severity, Severity::Unknown);
    assert_eq!(rule.discussion, "");
    assert!(rule.ccis.is_empty());
}

#[test]
fn identifiers_are_unique() {
    let checklist = parser().parse(BENCHMARK.as_bytes(), "pg.xml").unwrap();
    let mut ids: Vec<&str> = checklist.stigs[0]
        .rules
        .iter()
        .map(|r| r.uuid.as_str())
        .collect();
    ids.push(&checklist.id);
    ids.push(&checklist.stigs[0].uuid);
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn parsed_checklist_survives_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pg.cklb");

    let checklist = parser().parse(BENCHMARK.as_bytes(), "pg.xml").unwrap();
    store::write(&checklist, &path).unwrap();
    let loaded = store::load(&path).unwrap();
    assert_eq!(loaded, checklist);
}

#[test]
fn malformed_benchmark_fails_without_output() {
    let truncated = &BENCHMARK[..BENCHMARK.len() / 2];
    let err = parser().parse(truncated.as_bytes(), "pg.xml").unwrap_err();
    assert_eq!(err.code(), "PARSE_ERROR");
}

#[test]
fn parse_file_uses_file_name_as_title() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("U_PGS_SQL_9-x_STIG_V2R3_Manual-xccdf.xml");
    std::fs::write(&path, BENCHMARK).unwrap();

    let checklist = parser().parse_file(&path).unwrap();
    assert_eq!(checklist.title, "U_PGS_SQL_9-x_STIG_V2R3_Manual-xccdf.xml");
}

#[test]
fn invalid_utf8_benchmark_is_a_parse_error() {
    let mut bytes = BENCHMARK.as_bytes().to_vec();
    let at = BENCHMARK.find("</title>").unwrap();
    bytes.splice(at..at, [0xFF, 0xFE]);

    let err = parser().parse(&bytes, "pg.xml").unwrap_err();
    assert_eq!(err.code(), "PARSE_ERROR");
}
