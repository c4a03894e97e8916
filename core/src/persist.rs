//! JSON file persistence helpers.
//!
//! RULE: Only the stores and the correlation engine touch data files,
//! and only through these two functions.

use crate::error::{PresenceError, PresenceResult};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Read and parse a JSON file. A missing file is `Ok(None)`; unreadable or
/// malformed content is an error the caller decides how to absorb.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> PresenceResult<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PresenceError::io(path, e)),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write `value` as pretty JSON. Readers see either the old file or the
/// new one, never a partial write: content goes to a sibling temp file
/// which is then renamed over the target.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> PresenceResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, json).map_err(|e| PresenceError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| PresenceError::io(path, e))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(name)
}
