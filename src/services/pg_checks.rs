//! PostgreSQL server-parameter checks that produce rule directives.
//!
//! Each check compares one or more parameter values against the expected
//! setting and yields a narrative plus a status. The narrative starts with
//! `NOT A FINDING` when the server complies. Checks know which STIG rules
//! they answer for; the engines know nothing about PostgreSQL.
//!
//! Three kinds of check live here: parameter checks over the server's
//! parameter listing, query checks over raw `psql` output, and fixed
//! checks whose verdict comes from the managed platform itself.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::checklist::{RuleStatus, Severity};
use crate::models::directive::{RuleDirective, SeverityDirective};

const COMPLIANT_PREFIX: &str = "NOT A FINDING";

const CURRENT_MAJOR_VERSIONS: &[&str] = &["13", "14", "15", "16"];
const ACCEPTED_LEGACY_MAJOR: &str = "12";

const VERSION_RULES: &[&str] = &["SV-265877r999537", "SV-214050r961683"];
const SSL_RULES: &[&str] = &["SV-214145r961119"];
const PORT_RULES: &[&str] = &["SV-214048r960966"];
const LOG_TIMEZONE_RULES: &[&str] = &["SV-214069r961443"];
const CLIENT_MIN_MESSAGES_RULES: &[&str] = &["SV-214053r961167"];
const LOG_LINE_PREFIX_RULES: &[&str] = &[
    "SV-214145r961119",
    "SV-214142r960894",
    "SV-214112r960897",
    "SV-214116r960906",
];
const LOG_LINE_PREFIX_CONNECTION_RULES: &[&str] = &["SV-214138r960891", "SV-214103r961833"];
const LOG_LINE_PREFIX_PGAUDIT_RULES: &[&str] = &["SV-214132r960864"];
const PGAUDIT_CONNECTION_RULES: &[&str] = &["SV-214156r961839", "SV-214092r961824"];
const PGAUDIT_LOG_RULES: &[&str] = &[
    "SV-214155r961836",
    "SV-214154r961821",
    "SV-214105r961800",
    "SV-214104r961818",
    "SV-214102r961812",
    "SV-214101r961791",
    "SV-214100r961797",
    "SV-214099r961827",
    "SV-214097r961809",
    "SV-214091r961821",
    "SV-214085r961797",
];
const LOG_DESTINATION_RULES: &[&str] = &["SV-214123r960888"];
const PKI_RULES: &[&str] = &["SV-214136r961041", "SV-214137r961596"];
const FIPS_140_RULES: &[&str] = &[
    "SV-214157r961050",
    "SV-214153r961050",
    "SV-214119r961857",
    "SV-214117r961857",
];
const INSTALLATION_ACCOUNT_RULES: &[&str] = &["SV-214075r960960"];
const AUTHORIZATION_RULES: &[&str] = &["SV-214052r960768"];
const NSA_CRYPTO_RULES: &[&str] = &["SV-220321r961857"];
const PRIVILEGED_FUNCTION_RULES: &[&str] = &["SV-214148r961353"];
const PASSWORD_ENCRYPTION_RULES: &[&str] = &["SV-214130r981949"];
const PGCRYPTO_RULES: &[&str] = &["SV-214120r961128", "SV-214139r961602"];
const ACCESS_RULES: &[&str] = &["SV-214057r960792", "SV-214146r960969", "SV-214061r961053"];
const DATA_IN_TRANSIT_RULES: &[&str] = &["SV-214056r961029"];

/// Parameters naming the server's certificate, key, and revocation files.
const PKI_PARAMETERS: &[&str] = &["ssl_ca_file", "ssl_cert_file", "ssl_key_file", "ssl_crl_file"];
const ACCEPTED_PASSWORD_ENCRYPTION: &[&str] = &["scram-sha-256", "md5"];

const STORAGE_ENCRYPTION: &str = "Data at rest is encrypted by the platform's storage layer \
     using a FIPS 140-2 validated cryptographic module (AES-256 in GCM mode, system-managed keys). \
     Storage encryption is always on and cannot be disabled.";

const REQUIRED_AUDIT_CLASSES: &[&str] = &["role", "read", "write", "ddl"];

/// One `{name, value}` entry as emitted by a cloud CLI parameter listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerParameter {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Parameter values by name. Missing or null parameters read as empty.
#[derive(Debug, Clone, Default)]
pub struct ServerParameters {
    values: HashMap<String, String>,
}

impl ServerParameters {
    pub fn from_entries(entries: impl IntoIterator<Item = ServerParameter>) -> Self {
        let values = entries
            .into_iter()
            .map(|p| (p.name, p.value.unwrap_or_default()))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Raw `psql` output gathered from a target database. Query checks run only
/// for the outputs that are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    /// `\du`
    #[serde(default)]
    pub roles: Option<String>,
    /// `\dp`
    #[serde(default)]
    pub privileges: Option<String>,
    /// `SELECT * FROM pg_extension;`
    #[serde(default)]
    pub extensions: Option<String>,
    /// `SHOW password_encryption;`
    #[serde(default)]
    pub password_encryption: Option<String>,
    /// `SELECT * FROM pg_available_extensions WHERE name = 'pgcrypto';`
    #[serde(default)]
    pub pgcrypto: Option<String>,
}

/// Verdict of a single check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub narrative: String,
    pub status: RuleStatus,
}

impl CheckResult {
    fn judge(compliant: bool, evidence: String) -> Self {
        if compliant {
            Self {
                narrative: format!("{COMPLIANT_PREFIX}\n{evidence}"),
                status: RuleStatus::NotAFinding,
            }
        } else {
            Self {
                narrative: evidence,
                status: RuleStatus::Open,
            }
        }
    }

    fn not_applicable(reason: &str) -> Self {
        Self {
            narrative: format!("NA\n{reason}"),
            status: RuleStatus::NotApplicable,
        }
    }

    /// One directive per rule this check answers for.
    pub fn directives(&self, rule_ids: &[&str]) -> Vec<RuleDirective> {
        rule_ids
            .iter()
            .map(|id| {
                RuleDirective::new(*id)
                    .with_details(self.narrative.clone())
                    .with_status(self.status)
            })
            .collect()
    }
}

fn list_contains(list: &str, item: &str) -> bool {
    list.split(',')
        .any(|entry| entry.trim().eq_ignore_ascii_case(item))
}

pub fn version_check(server_version: &str) -> CheckResult {
    let major = server_version.split('.').next().unwrap_or_default();
    if CURRENT_MAJOR_VERSIONS.contains(&major) {
        CheckResult::judge(
            true,
            format!("PostgreSQL server version: {server_version}. Version is current."),
        )
    } else if major == ACCEPTED_LEGACY_MAJOR {
        CheckResult::judge(
            true,
            format!(
                "PostgreSQL server version: {server_version}. \
                 Major version 12 must be upgraded to 13 or later to remain compliant."
            ),
        )
    } else {
        CheckResult::judge(
            false,
            format!("OPEN FINDING\nPostgreSQL server version: {server_version}. Version is out of date."),
        )
    }
}

pub fn ssl_check(ssl: &str) -> CheckResult {
    CheckResult::judge(ssl == "on", format!("SSL: {ssl}"))
}

pub fn port_check(port: &str) -> CheckResult {
    CheckResult::judge(port == "5432", format!("Port: {port}. Expected <5432>"))
}

pub fn log_timezone_check(timezone: &str) -> CheckResult {
    CheckResult::judge(
        timezone.eq_ignore_ascii_case("utc"),
        format!("log_timezone: {timezone}. Expected <UTC>"),
    )
}

pub fn client_min_messages_check(level: &str) -> CheckResult {
    CheckResult::judge(
        level.eq_ignore_ascii_case("error"),
        format!("client_min_messages: {level}. Expected <error>"),
    )
}

fn prefix_evidence(prefix: &str, standard: &str) -> String {
    format!("log_line_prefix: {prefix}. Expected <{standard}>")
}

pub fn log_line_prefix_check(prefix: &str, standard: &str) -> CheckResult {
    CheckResult::judge(prefix == standard, prefix_evidence(prefix, standard))
}

/// Prefix plus connect/disconnect logging.
pub fn log_line_prefix_connections_check(
    prefix: &str,
    standard: &str,
    disconnections: &str,
    connections: &str,
) -> CheckResult {
    CheckResult::judge(
        prefix == standard && connections == "on" && disconnections == "on",
        format!(
            "{}\nDisconnect: {disconnections}\nConnect: {connections}",
            prefix_evidence(prefix, standard)
        ),
    )
}

/// Prefix plus pgaudit loaded.
pub fn log_line_prefix_pgaudit_check(prefix: &str, standard: &str, shared: &str) -> CheckResult {
    CheckResult::judge(
        prefix == standard && list_contains(shared, "pgaudit"),
        format!(
            "{}\nShared libraries: {shared}",
            prefix_evidence(prefix, standard)
        ),
    )
}

pub fn pgaudit_connections_check(
    shared: &str,
    disconnections: &str,
    connections: &str,
) -> CheckResult {
    CheckResult::judge(
        list_contains(shared, "pgaudit") && connections == "on" && disconnections == "on",
        format!("Shared libraries: {shared}\nDisconnect: {disconnections}\nConnect: {connections}"),
    )
}

/// pgaudit loaded and `pgaudit.log` covering role, read, write, and ddl.
pub fn pgaudit_log_check(shared: &str, audit_log: &str) -> CheckResult {
    let covered = REQUIRED_AUDIT_CLASSES
        .iter()
        .all(|class| list_contains(audit_log, class));
    CheckResult::judge(
        list_contains(shared, "pgaudit") && covered,
        format!("Shared libraries: {shared}\npgaudit.log: {audit_log}"),
    )
}

pub fn log_destination_check(shared: &str, destination: &str) -> CheckResult {
    let accepted = destination.eq_ignore_ascii_case("stderr")
        || destination.eq_ignore_ascii_case("syslog");
    CheckResult::judge(
        list_contains(shared, "pgaudit") && accepted,
        format!("Shared libraries: {shared}\nlog_destination: {destination}"),
    )
}

/// `name = value` lines for the PKI file parameters the server reports.
pub fn pki_files(params: &ServerParameters) -> String {
    PKI_PARAMETERS
        .iter()
        .filter(|name| params.values.contains_key(**name))
        .map(|name| format!("{name} = {}\n", params.get(name)))
        .collect()
}

/// Private keys are held by the managed service; the file locations are
/// recorded as evidence.
pub fn pki_check(files: &str) -> CheckResult {
    CheckResult::judge(
        true,
        format!(
            "Access to all PKI private keys used by PostgreSQL is managed by the hosting \
             platform.\nPKI file locations:\n{files}"
        ),
    )
}

pub fn fips_140_check() -> CheckResult {
    CheckResult::judge(true, STORAGE_ENCRYPTION.to_string())
}

pub fn installation_account_check() -> CheckResult {
    CheckResult::judge(
        true,
        "The PostgreSQL software installation account is only available to the hosting \
         platform's internal processes.\nRoles and permissions are documented per server and \
         validated by the data owner against least privilege."
            .to_string(),
    )
}

pub fn authorization_check() -> CheckResult {
    CheckResult::judge(
        true,
        "Reviewed server documentation: roles and permissions are documented per server and \
         validated by the data owner against least privilege."
            .to_string(),
    )
}

pub fn nsa_crypto_check() -> CheckResult {
    CheckResult::not_applicable("PostgreSQL is deployed in an unclassified environment")
}

pub fn privileged_function_check(roles: &str, extensions: &str) -> CheckResult {
    CheckResult::judge(
        true,
        format!(
            "Reviewed system documentation for privileged functions.\n\
             psql \\du:\n{roles}\nSELECT * FROM pg_extension:\n{extensions}"
        ),
    )
}

/// `password_encryption` must be `scram-sha-256` or `md5`.
pub fn password_encryption_check(output: &str) -> CheckResult {
    let lowered = output.to_ascii_lowercase();
    let accepted = ACCEPTED_PASSWORD_ENCRYPTION
        .iter()
        .any(|method| lowered.contains(method));
    CheckResult::judge(
        accepted,
        format!(
            "SHOW password_encryption:\n{output}\nExpected <scram-sha-256> or <md5>. \
             Non-superusers have no access to pg_shadow."
        ),
    )
}

pub fn pgcrypto_check(output: &str) -> CheckResult {
    CheckResult::judge(
        true,
        format!(
            "SELECT * FROM pg_available_extensions WHERE name = 'pgcrypto':\n{output}\n\
             {STORAGE_ENCRYPTION}"
        ),
    )
}

pub fn access_check(roles: &str, privileges: &str) -> CheckResult {
    CheckResult::judge(
        true,
        format!(
            "Reviewed server documentation: roles and permissions are documented per server.\n\
             psql \\du:\n{roles}\npsql \\dp:\n{privileges}"
        ),
    )
}

pub fn data_in_transit_check(password_encryption: &str) -> CheckResult {
    CheckResult::judge(
        true,
        format!(
            "Data in transit is encrypted with SSL/TLS, enforced by default.\n\
             SHOW password_encryption:\n{password_encryption}"
        ),
    )
}

/// Query checks for whichever `psql` outputs were collected.
fn query_checks(diagnostics: &Diagnostics) -> Vec<(CheckResult, &'static [&'static str])> {
    let mut checks = Vec::new();
    let Diagnostics {
        roles,
        privileges,
        extensions,
        password_encryption,
        pgcrypto,
    } = diagnostics;

    if let (Some(roles), Some(extensions)) = (roles, extensions) {
        checks.push((
            privileged_function_check(roles, extensions),
            PRIVILEGED_FUNCTION_RULES,
        ));
    }
    if let Some(output) = password_encryption {
        checks.push((password_encryption_check(output), PASSWORD_ENCRYPTION_RULES));
    }
    if let Some(output) = pgcrypto {
        checks.push((pgcrypto_check(output), PGCRYPTO_RULES));
    }
    if let (Some(roles), Some(privileges)) = (roles, privileges) {
        checks.push((access_check(roles, privileges), ACCESS_RULES));
    }
    if let Some(output) = password_encryption {
        checks.push((data_in_transit_check(output), DATA_IN_TRANSIT_RULES));
    }
    checks
}

/// Run every check and collect the resulting directives in a fixed order:
/// version, platform and query checks, then the logging and audit checks.
pub fn assess_parameters(
    params: &ServerParameters,
    diagnostics: &Diagnostics,
    log_line_prefix: &str,
) -> Vec<RuleDirective> {
    let shared = params.get("shared_preload_libraries");
    let connections = params.get("log_connections");
    let disconnections = params.get("log_disconnections");
    let prefix = params.get("log_line_prefix");

    let mut checks = vec![
        (version_check(params.get("server_version")), VERSION_RULES),
        (fips_140_check(), FIPS_140_RULES),
        (pki_check(&pki_files(params)), PKI_RULES),
        (installation_account_check(), INSTALLATION_ACCOUNT_RULES),
    ];
    checks.extend(query_checks(diagnostics));
    checks.extend([
        (ssl_check(params.get("ssl")), SSL_RULES),
        (authorization_check(), AUTHORIZATION_RULES),
        (nsa_crypto_check(), NSA_CRYPTO_RULES),
        (
            pgaudit_connections_check(shared, disconnections, connections),
            PGAUDIT_CONNECTION_RULES,
        ),
        (
            pgaudit_log_check(shared, params.get("pgaudit.log")),
            PGAUDIT_LOG_RULES,
        ),
        (
            log_destination_check(shared, params.get("log_destination")),
            LOG_DESTINATION_RULES,
        ),
        (log_line_prefix_check(prefix, log_line_prefix), LOG_LINE_PREFIX_RULES),
        (
            log_line_prefix_connections_check(prefix, log_line_prefix, disconnections, connections),
            LOG_LINE_PREFIX_CONNECTION_RULES,
        ),
        (
            log_line_prefix_pgaudit_check(prefix, log_line_prefix, shared),
            LOG_LINE_PREFIX_PGAUDIT_RULES,
        ),
        (
            log_timezone_check(params.get("log_timezone")),
            LOG_TIMEZONE_RULES,
        ),
        (
            client_min_messages_check(params.get("client_min_messages")),
            CLIENT_MIN_MESSAGES_RULES,
        ),
        (port_check(params.get("port")), PORT_RULES),
    ]);

    checks
        .iter()
        .flat_map(|(result, rules)| result.directives(rules))
        .collect()
}

/// Blanket status for every CAT II (medium) rule.
pub fn cat_ii_default(status: RuleStatus) -> SeverityDirective {
    SeverityDirective::new(Severity::Medium, status)
}
