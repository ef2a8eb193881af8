//! Benchmark parsers that bootstrap a fresh checklist from a source definition.
//!
//! Each parser implements the `BenchmarkParser` trait, producing one canonical
//! `Checklist` whose rules start out `not_reviewed` with empty narratives.

pub mod xccdf;
pub mod xml;

use crate::errors::ChecklistError;
use crate::models::checklist::{Checklist, Severity};

/// Trait for pluggable benchmark parsers.
pub trait BenchmarkParser {
    /// Parse one raw benchmark document. `source_name` becomes the checklist title.
    fn parse(&self, data: &[u8], source_name: &str) -> Result<Checklist, ChecklistError>;

    /// The benchmark format this parser handles.
    fn format_name(&self) -> &str;

    /// Map a raw severity attribute onto the closed severity enum.
    fn map_severity(&self, raw: Option<&str>) -> Severity;
}
