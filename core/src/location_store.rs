//! The shared location table: which staff members are in which room.
//!
//! RULE: every read-modify-write of the location file happens inside
//! `commit`, under the store's lock, from start to finish. Readers in other
//! processes are protected by the atomic rename in `persist`.

use crate::{
    error::PresenceResult,
    persist,
    types::{RoomName, StaffName},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// One observed state of the location table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationSnapshot {
    rooms: BTreeMap<RoomName, BTreeSet<StaffName>>,
}

impl LocationSnapshot {
    /// Every room in `rooms` present and empty.
    pub fn empty<'a>(rooms: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            rooms: rooms.into_iter().map(|r| (r.to_string(), BTreeSet::new())).collect(),
        }
    }

    /// The room `staff` is in, if any.
    pub fn locate(&self, staff: &str) -> Option<&RoomName> {
        self.rooms
            .iter()
            .find(|(_, names)| names.contains(staff))
            .map(|(room, _)| room)
    }

    /// Names in `room`, sorted. Unknown rooms are empty.
    pub fn occupants(&self, room: &str) -> Vec<StaffName> {
        self.rooms
            .get(room)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rooms(&self) -> impl Iterator<Item = (&RoomName, &BTreeSet<StaffName>)> {
        self.rooms.iter()
    }

    /// Remove `staff` from every room, then add it to `room` if given.
    pub fn relocate(&mut self, staff: &str, room: Option<&str>) {
        for names in self.rooms.values_mut() {
            names.remove(staff);
        }
        if let Some(room) = room {
            self.rooms
                .entry(room.to_string())
                .or_default()
                .insert(staff.to_string());
        }
    }

    fn ensure_rooms(&mut self, rooms: &[RoomName]) {
        for room in rooms {
            self.rooms.entry(room.clone()).or_default();
        }
    }
}

pub struct SharedLocationStore {
    path:  PathBuf,
    rooms: Vec<RoomName>,
    lock:  Mutex<()>,
}

impl SharedLocationStore {
    /// Store backed by `path`. `rooms` are always present in loaded
    /// snapshots, even when the file is missing or lacks them.
    pub fn new(path: impl Into<PathBuf>, rooms: impl IntoIterator<Item = RoomName>) -> Self {
        Self {
            path:  path.into(),
            rooms: rooms.into_iter().collect(),
            lock:  Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot. Falls back to the empty-room map when the file is
    /// absent or unreadable.
    pub fn load(&self) -> LocationSnapshot {
        let _guard = self.guard();
        self.read_snapshot()
    }

    /// Names per room in the order the file lists them, for layout.
    /// Fails soft to empty rooms like `load`.
    pub fn listing(&self) -> BTreeMap<RoomName, Vec<StaffName>> {
        let _guard = self.guard();
        let mut listing = match persist::read_json::<BTreeMap<RoomName, Vec<StaffName>>>(&self.path) {
            Ok(Some(listing)) => listing,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                log::warn!("location file {} unreadable, using empty rooms: {e}", self.path.display());
                BTreeMap::new()
            }
        };
        for room in &self.rooms {
            listing.entry(room.clone()).or_default();
        }
        listing
    }

    /// Move `staff` into `room`, or out of every room when `room` is `None`,
    /// and persist. Returns the snapshot that was written.
    pub fn commit(&self, staff: &str, room: Option<&str>) -> PresenceResult<LocationSnapshot> {
        let _guard = self.guard();
        let mut snapshot = self.read_snapshot();
        snapshot.relocate(staff, room);
        persist::write_json_atomic(&self.path, &snapshot)?;
        log::debug!("location commit: {staff} -> {}", room.unwrap_or("outside"));
        Ok(snapshot)
    }

    fn read_snapshot(&self) -> LocationSnapshot {
        let mut snapshot = match persist::read_json::<LocationSnapshot>(&self.path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => LocationSnapshot::default(),
            Err(e) => {
                log::warn!("location file {} unreadable, using empty rooms: {e}", self.path.display());
                LocationSnapshot::default()
            }
        };
        snapshot.ensure_rooms(&self.rooms);
        snapshot
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is the file, which a panicking holder leaves
        // either old or new thanks to the atomic rename.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
