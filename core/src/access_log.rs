//! Raw and enriched access-log records and the files that hold them.
//!
//! Both files are JSON arrays. The raw log is append-only and owned by an
//! external writer; the enriched log is rewritten wholesale under its
//! sidecar lock on every append.

use crate::{
    error::PresenceResult,
    file_lock::FileLock,
    persist,
    types::{ComputerId, RoomName, StaffName},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One computer-access event as written by the external logger.
/// Fields this engine does not interpret are carried through in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLogEntry {
    #[serde(rename = "Username")]
    pub username: StaffName,
    #[serde(rename = "ComputerID")]
    pub computer_id: ComputerId,
    #[serde(rename = "breakStatus", default)]
    pub break_status: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawLogEntry {
    pub fn new(username: impl Into<StaffName>, computer_id: impl Into<ComputerId>, break_status: i64) -> Self {
        Self {
            username:     username.into(),
            computer_id:  computer_id.into(),
            break_status: Some(break_status),
            extra:        serde_json::Map::new(),
        }
    }
}

/// A raw entry plus where everyone was when it was correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLogEntry {
    #[serde(flatten)]
    pub raw: RawLogEntry,
    /// Staff in the computer's room at evaluation time.
    #[serde(rename = "NearbyUsers")]
    pub nearby_users: Vec<StaffName>,
    #[serde(rename = "ActualLocationOfUsername")]
    pub actual_location: Option<RoomName>,
    #[serde(rename = "ComputerRoom")]
    pub computer_room: Option<RoomName>,
    #[serde(rename = "RoomMismatch")]
    pub room_mismatch: bool,
}

/// Reader for the raw log. Holds no offset itself; the caller decides when
/// entries count as consumed.
#[derive(Debug, Clone)]
pub struct RawLogSource {
    path: PathBuf,
}

impl RawLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry currently in the file, unparsed, so one bad entry does
    /// not hide the rest. Missing file reads as empty.
    pub fn read_values(&self) -> PresenceResult<Vec<serde_json::Value>> {
        Ok(persist::read_json(&self.path)?.unwrap_or_default())
    }

    /// Every entry that parses, in file order.
    pub fn read_all(&self) -> PresenceResult<Vec<RawLogEntry>> {
        Ok(self
            .read_values()?
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }
}

/// Writer for the enriched log.
#[derive(Debug, Clone)]
pub struct EnrichedLogSink {
    path:         PathBuf,
    lock:         FileLock,
    lock_timeout: Duration,
}

impl EnrichedLogSink {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        Self {
            lock: FileLock::for_file(&path),
            path,
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-append-rewrite under the sink lock. Existing content that does
    /// not parse is replaced, as if the file were empty.
    pub fn append(&self, entries: &[EnrichedLogEntry]) -> PresenceResult<usize> {
        let _guard = self.lock.acquire(self.lock_timeout)?;
        let mut existing = self.read_values();
        existing.extend(
            entries
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?,
        );
        persist::write_json_atomic(&self.path, &existing)?;
        Ok(existing.len())
    }

    /// Every enriched entry currently in the file.
    pub fn read_all(&self) -> PresenceResult<Vec<EnrichedLogEntry>> {
        Ok(persist::read_json(&self.path)?.unwrap_or_default())
    }

    /// Number of entries currently in the file, zero if unreadable.
    pub fn len(&self) -> usize {
        self.read_values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Kept as raw values so entries written by other tools survive a rewrite.
    fn read_values(&self) -> Vec<serde_json::Value> {
        match persist::read_json::<Vec<serde_json::Value>>(&self.path) {
            Ok(values) => values.unwrap_or_default(),
            Err(e) => {
                log::warn!("enriched log {} unreadable, starting fresh: {e}", self.path.display());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_entry_keeps_unknown_fields() {
        let value = json!({
            "Username": "AS1",
            "ComputerID": "Computer A0",
            "breakStatus": 0,
            "FileDestinationDirectory": "/shared/NON_report.docx"
        });
        let entry: RawLogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(entry.username, "AS1");
        assert_eq!(entry.break_status, Some(0));
        assert_eq!(entry.extra["FileDestinationDirectory"], "/shared/NON_report.docx");
    }

    #[test]
    fn raw_entry_without_break_status_parses() {
        let entry: RawLogEntry =
            serde_json::from_value(json!({ "Username": "AS2", "ComputerID": "Computer D" })).unwrap();
        assert_eq!(entry.break_status, None);
    }

    #[test]
    fn enriched_entry_flattens_raw_fields() {
        let enriched = EnrichedLogEntry {
            raw:             RawLogEntry::new("AS1", "Computer A0", 1),
            nearby_users:    vec!["AS1".into(), "AS2".into()],
            actual_location: Some("Room A".into()),
            computer_room:   Some("Room A".into()),
            room_mismatch:   false,
        };
        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["Username"], "AS1");
        assert_eq!(value["ComputerRoom"], "Room A");
        assert_eq!(value["NearbyUsers"], json!(["AS1", "AS2"]));
    }
}
