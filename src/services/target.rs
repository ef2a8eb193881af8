//! Target-data update from a database connection string.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::ChecklistError;
use crate::models::audit::{EngineKind, FieldChange, UpdateOutcome};
use crate::models::checklist::Checklist;
use crate::services::store;

const DEFAULT_SERVER: &str = "localhost";
const DEFAULT_DATABASE: &str = "unknown_database";

/// STIG name fragments marking a database or web benchmark.
const WEB_DB_KEYWORDS: &[&str] = &[
    "database",
    "web",
    "db",
    "sql",
    "mysql",
    "oracle",
    "postgresql",
];

fn server_patterns() -> Result<&'static [Regex], ChecklistError> {
    static PATTERNS: OnceLock<Result<Vec<Regex>, regex::Error>> = OnceLock::new();
    cached(PATTERNS.get_or_init(|| {
        compile(&[r"(?i)server=([^;]+)", r"(?i)host=([^;]+)", r"(?i)datasource=([^;]+)"])
    }))
}

fn database_patterns() -> Result<&'static [Regex], ChecklistError> {
    static PATTERNS: OnceLock<Result<Vec<Regex>, regex::Error>> = OnceLock::new();
    cached(PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)database=([^;]+)",
            r"(?i)initial\s*catalog=([^;]+)",
            r"(?i)db=([^;]+)",
        ])
    }))
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

fn cached(
    compiled: &'static Result<Vec<Regex>, regex::Error>,
) -> Result<&'static [Regex], ChecklistError> {
    compiled
        .as_deref()
        .map_err(|e| ChecklistError::Validation(format!("invalid connection-string pattern: {e}")))
}

/// Server and database names pulled from a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub server_name: String,
    pub database_name: String,
}

/// Extract server and database names; the first matching pattern of each
/// kind wins, with `localhost` / `unknown_database` as fallbacks.
pub fn parse_connection_string(connection: &str) -> Result<DatabaseInfo, ChecklistError> {
    Ok(DatabaseInfo {
        server_name: first_capture(server_patterns()?, connection)
            .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
        database_name: first_capture(database_patterns()?, connection)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
    })
}

fn first_capture(patterns: &[Regex], haystack: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(haystack)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    })
}

fn is_web_db_stig(stig_name: &str) -> bool {
    let name = stig_name.to_lowercase();
    WEB_DB_KEYWORDS.iter().any(|k| name.contains(k))
}

fn set_field(changes: &mut Vec<FieldChange>, field: &str, slot: &mut String, value: String) {
    changes.push(FieldChange {
        field: field.to_string(),
        old_value: std::mem::replace(slot, value.clone()),
        new_value: value,
    });
}

/// Point `target_data` at the database, returning the field-level changes.
///
/// `host_name` and `fqdn` are always set. The web/database fields are set
/// only when some STIG in the document is a database or web benchmark.
pub fn apply_database_info(
    checklist: &mut Checklist,
    info: &DatabaseInfo,
    domain_suffix: &str,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let has_web_db = checklist.stigs.iter().any(|s| is_web_db_stig(&s.stig_name));
    let target = &mut checklist.target_data;

    set_field(&mut changes, "host_name", &mut target.host_name, info.database_name.clone());
    set_field(
        &mut changes,
        "fqdn",
        &mut target.fqdn,
        format!("{}.{domain_suffix}", info.server_name),
    );

    if has_web_db {
        changes.push(FieldChange {
            field: "is_web_database".to_string(),
            old_value: target.is_web_database.to_string(),
            new_value: "true".to_string(),
        });
        target.is_web_database = true;
        set_field(
            &mut changes,
            "web_db_site",
            &mut target.web_db_site,
            info.server_name.clone(),
        );
        set_field(
            &mut changes,
            "web_db_instance",
            &mut target.web_db_instance,
            info.database_name.clone(),
        );
    }

    for stig in checklist.stigs.iter().filter(|s| is_web_db_stig(&s.stig_name)) {
        tracing::debug!(
            stig_id = %stig.stig_id,
            stig_name = %stig.stig_name,
            "Web/database STIG"
        );
    }

    changes
}

/// Load `source`, update its target data from `connection`, and write
/// `<stem>_database_updated.<ext>`.
pub fn update_target(
    source: &Path,
    connection: &str,
    domain_suffix: &str,
) -> Result<UpdateOutcome, ChecklistError> {
    let info = parse_connection_string(connection)?;
    let mut loaded = store::load_with_digest(source)?;
    let target_changes = apply_database_info(&mut loaded.checklist, &info, domain_suffix);

    tracing::info!(
        source = %source.display(),
        server = %info.server_name,
        database = %info.database_name,
        "Target data updated"
    );

    store::persist_update(EngineKind::TargetUpdate, source, loaded, Vec::new(), target_changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist(stig_name: &str) -> Checklist {
        serde_json::from_value(serde_json::json!({
            "title": "t",
            "id": "doc",
            "stigs": [{"stig_id": "S", "stig_name": stig_name, "uuid": "u", "rules": []}]
        }))
        .unwrap()
    }

    #[test]
    fn parses_sql_server_style() {
        let info = parse_connection_string(
            "server=sqlserver.company.com;database=CustomerDB;user=admin;password=pass123",
        )
        .unwrap();
        assert_eq!(info.server_name, "sqlserver.company.com");
        assert_eq!(info.database_name, "CustomerDB");
    }

    #[test]
    fn parses_host_and_initial_catalog() {
        let info =
            parse_connection_string("host=dbserver.local;database=product_db;port=5432").unwrap();
        assert_eq!(info.server_name, "dbserver.local");
        assert_eq!(info.database_name, "product_db");

        let info =
            parse_connection_string("DataSource=oracledb.company.net;Initial Catalog=ORCL")
                .unwrap();
        assert_eq!(info.server_name, "oracledb.company.net");
        assert_eq!(info.database_name, "ORCL");
    }

    #[test]
    fn bad_pattern_is_reported() {
        assert!(compile(&[r"(?i)host=([^;]+)", r"server=("]).is_err());
        assert_eq!(compile(&[r"db=([^;]+)"]).unwrap().len(), 1);
    }

    #[test]
    fn falls_back_to_defaults() {
        let info = parse_connection_string("user=admin").unwrap();
        assert_eq!(info.server_name, "localhost");
        assert_eq!(info.database_name, "unknown_database");
    }

    #[test]
    fn database_stig_sets_web_db_fields() {
        let mut doc = checklist("PostgreSQL 9.x Security Technical Implementation Guide");
        let info = parse_connection_string("host=pg01;database=orders").unwrap();
        let changes = apply_database_info(&mut doc, &info, "localdomain");

        let target = &doc.target_data;
        assert_eq!(target.host_name, "orders");
        assert_eq!(target.fqdn, "pg01.localdomain");
        assert!(target.is_web_database);
        assert_eq!(target.web_db_site, "pg01");
        assert_eq!(target.web_db_instance, "orders");
        assert_eq!(changes.len(), 5);
    }

    #[test]
    fn other_stigs_only_get_host_fields() {
        let mut doc = checklist("Red Hat Enterprise Linux 9");
        let info = parse_connection_string("host=app01;database=x").unwrap();
        let changes = apply_database_info(&mut doc, &info, "example.mil");
        assert_eq!(doc.target_data.fqdn, "app01.example.mil");
        assert!(!doc.target_data.is_web_database);
        assert_eq!(changes.len(), 2);
    }
}
