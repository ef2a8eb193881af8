//! Checklist services: identity sources, persistence, the update engines,
//! and the directive producers that feed them.

pub mod assess;
pub mod identity;
pub mod merge;
pub mod pg_checks;
pub mod rule_update;
pub mod severity_update;
pub mod store;
pub mod summary;
pub mod target;
