//! Purpose: Shared model-directory and artifact file-name resolution helpers.
//! Exports: `default_model_dir`, `artifact_slug`, `artifact_file_name`, `lock_file_name`.
//! Role: Keep CLI, store and mirror transports on one naming scheme.
//! Invariants: Default model directory remains `~/.pointseg/models`.
//! Invariants: Slugs never contain `:` or path separators.

use std::path::PathBuf;

pub const MODEL_DIR_ENV: &str = "POINTSEG_MODEL_DIR";
pub const ARTIFACT_EXTENSION: &str = "weights";

pub fn default_model_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".pointseg").join("models")
}

pub fn artifact_slug(model_name: &str) -> String {
    model_name
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '-',
            other => other,
        })
        .collect()
}

pub fn artifact_file_name(model_name: &str) -> String {
    format!("{}.{ARTIFACT_EXTENSION}", artifact_slug(model_name))
}

pub(crate) fn partial_file_name(model_name: &str) -> String {
    format!(
        ".{}.partial-{}",
        artifact_file_name(model_name),
        std::process::id()
    )
}

pub(crate) fn lock_file_name(model_name: &str) -> String {
    format!(".{}.lock", artifact_slug(model_name))
}
