//! Pipeline diagnostic dump: writes intermediate artifacts to disk.
//!
//! **Activation**:
//! - Dev builds (`is_dev()`): auto-enabled, writes to `{app_data}/diagnostic/`
//! - Prod builds: disabled unless `MEDPARAM_DUMP_DIR` env var is set
//! - `MEDPARAM_DUMP_DIR` overrides the default in both modes
//!
//! **Output structure**:
//! ```text
//! {dump_dir}/{doc_id}/
//!   00-document.txt
//!   01-chunk-{n}.txt
//!   02-prompt-{n}.txt
//!   03-response-{n}.txt
//!   04-malformed-{n}.txt
//!   05-canonical-output.json
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config;

pub const DUMP_DIR_ENV: &str = "MEDPARAM_DUMP_DIR";

/// Diagnostic dump subdirectory name inside app data.
const DIAGNOSTIC_SUBDIR: &str = "diagnostic";

// ──────────────────────────────────────────────
// Dump directory resolution
// ──────────────────────────────────────────────

/// Resolve the base dump directory.
///
/// Priority:
/// 1. `MEDPARAM_DUMP_DIR` env var (explicit override, any build)
/// 2. `{app_data}/diagnostic/` in dev builds (auto-enabled)
/// 3. `None` in production (disabled by default)
pub fn base_dir() -> Option<PathBuf> {
    resolve_base_dir(std::env::var(DUMP_DIR_ENV).ok(), config::is_dev())
}

fn resolve_base_dir(env_override: Option<String>, dev: bool) -> Option<PathBuf> {
    if let Some(dir) = env_override.filter(|d| !d.trim().is_empty()) {
        return Some(PathBuf::from(dir));
    }
    if dev {
        return Some(config::app_data_dir().join(DIAGNOSTIC_SUBDIR));
    }
    None
}

/// Returns the dump directory for a document under `base`.
///
/// Creates the directory tree on first call. Returns `None` (with a warning) if
/// directory creation fails. Never panics, never blocks the pipeline.
pub fn dump_dir_in(base: &Path, doc_id: &Uuid) -> Option<PathBuf> {
    let dir = base.join(doc_id.to_string());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }

    Some(dir)
}

// ──────────────────────────────────────────────
// Dump writers
// ──────────────────────────────────────────────

/// Write a JSON artifact (any serde-serializable value).
///
/// Uses pretty-printing for human readability. Never panics.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(&path, json.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = json.len(),
                "Diagnostic dump: JSON written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write JSON"
            ),
        },
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (chunk, prompt, raw analyzer response).
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
