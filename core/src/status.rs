//! Duty status tracking.
//!
//! The status file is owned by an external process. This side only polls it
//! under the file's cross-process lock and mirrors the values it recognises
//! into an in-memory table that agents read without further locking of the
//! file.

use crate::{
    cancel::CancelToken,
    clock::Clock,
    error::PresenceError,
    file_lock::FileLock,
    persist,
    types::StaffName,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Coarse activity state driving transition-table selection.
/// Persisted as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum DutyStatus {
    #[default]
    Normal,
    OnBreak,
    OutOfShift,
}

impl DutyStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::Normal     => 0,
            Self::OnBreak    => 1,
            Self::OutOfShift => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Normal),
            1 => Some(Self::OnBreak),
            2 => Some(Self::OutOfShift),
            _ => None,
        }
    }
}

impl TryFrom<i64> for DutyStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown duty status code {code}"))
    }
}

impl From<DutyStatus> for i64 {
    fn from(status: DutyStatus) -> i64 {
        status.code()
    }
}

/// In-memory status table shared between the tracker and the agents.
/// Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    inner: Arc<RwLock<HashMap<StaffName, DutyStatus>>>,
}

impl StatusTable {
    /// A table tracking exactly `names`, all starting at `Normal`.
    pub fn with_staff<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let map = names
            .into_iter()
            .map(|n| (n.to_string(), DutyStatus::Normal))
            .collect();
        Self { inner: Arc::new(RwLock::new(map)) }
    }

    /// Current status; untracked names read as `Normal`.
    pub fn get(&self, name: &str) -> DutyStatus {
        self.read().get(name).copied().unwrap_or_default()
    }

    pub fn set(&self, name: &str, status: DutyStatus) {
        self.write().insert(name.to_string(), status);
    }

    pub fn snapshot(&self) -> BTreeMap<StaffName, DutyStatus> {
        self.read().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Overwrite tracked names present in `raw`. Unknown names are ignored,
    /// tracked names absent from `raw` keep their value, and values that are
    /// not a known status code are skipped. Returns the number applied.
    pub fn apply(&self, raw: &HashMap<String, serde_json::Value>) -> usize {
        let mut table = self.write();
        let mut applied = 0;
        for (name, status) in table.iter_mut() {
            let Some(value) = raw.get(name) else { continue };
            match value.as_i64().and_then(DutyStatus::from_code) {
                Some(parsed) => {
                    *status = parsed;
                    applied += 1;
                }
                None => log::warn!("ignoring status {value} for {name}"),
            }
        }
        applied
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<StaffName, DutyStatus>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<StaffName, DutyStatus>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a single poll of the status file did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(usize),
    Missing,
    LockBusy,
    Unreadable,
}

pub struct StatusTracker {
    path:         PathBuf,
    lock:         FileLock,
    table:        StatusTable,
    poll_period:  Duration,
    lock_timeout: Duration,
    clock:        Arc<dyn Clock>,
}

impl StatusTracker {
    pub fn new(
        path: impl Into<PathBuf>,
        table: StatusTable,
        poll_period: Duration,
        lock_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let path = path.into();
        Self {
            lock: FileLock::for_file(&path),
            path,
            table,
            poll_period,
            lock_timeout,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle to the table this tracker refreshes.
    pub fn table(&self) -> StatusTable {
        self.table.clone()
    }

    /// One poll. Never fails: every fault maps to an outcome that leaves the
    /// table as it was.
    pub fn refresh_once(&self) -> RefreshOutcome {
        let _guard = match self.lock.acquire(self.lock_timeout) {
            Ok(guard) => guard,
            Err(PresenceError::LockTimeout { .. }) => return RefreshOutcome::LockBusy,
            Err(e) => {
                log::debug!("status lock unavailable: {e}");
                return RefreshOutcome::Missing;
            }
        };

        match persist::read_json::<HashMap<String, serde_json::Value>>(&self.path) {
            Ok(Some(raw)) => RefreshOutcome::Applied(self.table.apply(&raw)),
            Ok(None) => RefreshOutcome::Missing,
            Err(e) => {
                log::warn!("status file {} unreadable: {e}", self.path.display());
                RefreshOutcome::Unreadable
            }
        }
    }

    /// Poll until cancelled.
    pub fn run(&self, cancel: &CancelToken) {
        log::info!("status tracker polling {} every {:?}", self.path.display(), self.poll_period);
        while !cancel.is_cancelled() {
            let outcome = self.refresh_once();
            log::debug!("status refresh: {outcome:?}");
            self.clock.sleep(self.poll_period);
        }
        log::info!("status tracker stopped");
    }

    /// Run on a dedicated thread.
    pub fn spawn(self, cancel: CancelToken) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("status-tracker".to_string())
            .spawn(move || self.run(&cancel))
    }
}
