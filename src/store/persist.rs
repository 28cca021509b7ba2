//! Crash-safe persistence for the coordination directory.
//!
//! Writers go through a sibling temp file, `fsync`, and `rename`, so readers
//! only ever see the previous or the next complete document. Readers treat a
//! missing, empty, or unparseable document as the caller's default.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Suffix shared by every in-flight temp file; `validate` counts leftovers.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_bytes(path, &bytes)
}

/// Atomically replace `path` with `data`.
///
/// On any failure the temp file is removed and `path` keeps its previous
/// content.
pub fn write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    let tmp_path = temp_path_for(path);

    if let Err(err) = write_and_sync(&tmp_path, data) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    sync_dir(&parent);
    Ok(())
}

/// Read a JSON document, falling back to `default` when the file is missing,
/// empty, or does not parse as `T`. Corruption is logged, never raised.
pub fn read_json_or_default<T: DeserializeOwned>(path: &Path, default: T) -> T {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return default,
        Err(err) => {
            tracing::warn!(path = %path.display(), "unreadable state file, using default: {err}");
            return default;
        }
    };
    if content.trim().is_empty() {
        return default;
    }
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path.display(), "corrupt state file, using default: {err}");
            default
        }
    }
}

/// Strict variant for callers that must distinguish corruption (e.g. `validate`).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// True for names produced by [`temp_path_for`].
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique = uuid::Uuid::new_v4().simple().to_string();
    parent_dir(path).join(format!(
        ".{name}.{}.{}{TEMP_SUFFIX}",
        std::process::id(),
        &unique[..12]
    ))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_and_sync(tmp_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp_path)?;
    file.write_all(data)?;
    file.flush()?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Persists the rename itself; the data is already durable.
    if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), "directory fsync failed: {err}");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
