//! Checklist snapshot persistence: strict load, pretty-printed derived writes.
//!
//! Snapshots are never modified in place. Every save goes to a path derived
//! from the source by suffixing the file stem, leaving the source as history.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::errors::ChecklistError;
use crate::models::audit::{EngineKind, FieldChange, RuleChange, UpdateOutcome, UpdateReport};
use crate::models::checklist::Checklist;

/// A loaded snapshot together with the digest of the bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedChecklist {
    pub checklist: Checklist,
    pub digest: String,
}

/// Load a checklist snapshot, rejecting anything that does not match the model.
pub fn load(path: &Path) -> Result<Checklist, ChecklistError> {
    load_with_digest(path).map(|loaded| loaded.checklist)
}

/// Load a checklist snapshot and hash its raw bytes for the audit trail.
pub fn load_with_digest(path: &Path) -> Result<LoadedChecklist, ChecklistError> {
    let bytes = read_snapshot(path)?;
    let checklist: Checklist = serde_json::from_slice(&bytes).map_err(|e| {
        ChecklistError::Format(format!("{} is not a checklist document: {e}", path.display()))
    })?;

    if let Some((stig_id, rule_id)) = checklist.duplicate_rule_keys().into_iter().next() {
        return Err(ChecklistError::Format(format!(
            "{}: rule {rule_id} appears more than once in STIG {stig_id}",
            path.display()
        )));
    }

    tracing::debug!(
        path = %path.display(),
        stigs = checklist.stigs.len(),
        rules = checklist.rule_count(),
        "Loaded checklist snapshot"
    );

    Ok(LoadedChecklist {
        checklist,
        digest: digest(&bytes),
    })
}

/// Read raw snapshot bytes, mapping a missing file to `NotFound`.
pub fn read_snapshot(path: &Path) -> Result<Vec<u8>, ChecklistError> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ChecklistError::NotFound(path.display().to_string()),
        _ => ChecklistError::Io(e),
    })
}

/// `<dir>/<stem>_<suffix>.<ext>`; a source without an extension gets none.
pub fn derive_output_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match source.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    source.with_file_name(file_name)
}

/// Write a new snapshot next to `source`, returning the path and content digest.
///
/// An existing file at the derived path is overwritten.
pub fn save_derived(
    checklist: &Checklist,
    source: &Path,
    suffix: &str,
) -> Result<(PathBuf, String), ChecklistError> {
    let output = derive_output_path(source, suffix);
    let digest = write(checklist, &output)?;
    Ok((output, digest))
}

/// Close out an engine run: write the derived snapshot when anything changed
/// and assemble the audit report. An empty change set writes nothing.
pub fn persist_update(
    engine: EngineKind,
    source: &Path,
    loaded: LoadedChecklist,
    changes: Vec<RuleChange>,
    target_changes: Vec<FieldChange>,
) -> Result<UpdateOutcome, ChecklistError> {
    let LoadedChecklist { checklist, digest } = loaded;

    let (output_path, output_digest) = if changes.is_empty() && target_changes.is_empty() {
        tracing::warn!(
            engine = %engine,
            source = %source.display(),
            "No matching rules found; no snapshot written"
        );
        (None, None)
    } else {
        let (path, output_digest) = save_derived(&checklist, source, engine.output_suffix())?;
        (Some(path), Some(output_digest))
    };

    Ok(UpdateOutcome {
        checklist,
        report: UpdateReport {
            engine,
            source_path: source.to_path_buf(),
            output_path,
            source_digest: digest,
            output_digest,
            generated_at: Utc::now(),
            changes,
            target_changes,
        },
    })
}

/// Serialize a checklist with two-space indentation to `path`, creating parent
/// directories as needed. Returns the SHA-256 of the written bytes.
pub fn write(checklist: &Checklist, path: &Path) -> Result<String, ChecklistError> {
    let bytes = serde_json::to_vec_pretty(checklist)
        .map_err(|e| ChecklistError::Format(format!("Failed to serialize checklist: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved checklist snapshot");
    Ok(digest(&bytes))
}

/// SHA-256 hash of raw bytes, hex-encoded.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
