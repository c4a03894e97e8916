//! Correlates raw access-log entries with simulated presence.
//!
//! CYCLE (one call to `poll_once`):
//!   1. Load a location snapshot.
//!   2. Read raw entries past the in-memory offset.
//!   3. None: grow the idle delay toward its ceiling.
//!   4. Some: drop the delay to its floor, enrich each entry, append them
//!      all to the sink in one locked rewrite, advance the offset. Entries
//!      that do not parse are logged and count as consumed.
//!
//! The offset lives only in memory. A restarted engine starts from zero and
//! re-appends entries the sink already holds.

use crate::{
    access_log::{EnrichedLogEntry, EnrichedLogSink, RawLogEntry, RawLogSource},
    cancel::CancelToken,
    clock::Clock,
    location_store::{LocationSnapshot, SharedLocationStore},
    rng::StreamRng,
    types::{ComputerId, RoomName},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Static computer → room lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputerDirectory {
    rooms: HashMap<ComputerId, RoomName>,
}

impl ComputerDirectory {
    pub fn new(rooms: HashMap<ComputerId, RoomName>) -> Self {
        Self { rooms }
    }

    pub fn room_of(&self, computer: &str) -> Option<&RoomName> {
        self.rooms.get(computer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ComputerId, &RoomName)> {
        self.rooms.iter()
    }

    /// Computers of the reference deployment. Room B has none.
    pub fn reference() -> Self {
        let rooms = [
            ("Computer D", "Room D"),
            ("Computer A0", "Room A"),
            ("Computer A1", "Room A"),
            ("Computer A2", "Room A"),
            ("Computer C0", "Room C"),
            ("Computer C1", "Room C"),
            ("Computer C2", "Room C"),
        ]
        .into_iter()
        .map(|(c, r)| (c.to_string(), r.to_string()))
        .collect();
        Self { rooms }
    }
}

/// When the staff member is where their computer is, sometimes pretend they
/// were in `away_room` instead, to seed ambiguous cases for labelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MismatchPolicy {
    pub away_room: RoomName,
    /// Break-status codes that use `elevated_probability`.
    pub elevated_statuses: Vec<i64>,
    pub elevated_probability: f64,
    /// Break-status codes whose probability is drawn from `baseline_band`
    /// on every entry.
    pub baseline_statuses: Vec<i64>,
    pub baseline_band: (f64, f64),
}

impl Default for MismatchPolicy {
    fn default() -> Self {
        Self {
            away_room:            "Room B".to_string(),
            elevated_statuses:    vec![1, 2],
            elevated_probability: 0.9,
            baseline_statuses:    vec![0],
            baseline_band:        (0.05, 0.10),
        }
    }
}

impl MismatchPolicy {
    /// Roll whether to override an entry with this break status. Statuses
    /// in neither list never override and consume no randomness.
    pub fn should_override(&self, break_status: Option<i64>, rng: &mut StreamRng) -> bool {
        let Some(status) = break_status else { return false };
        if self.elevated_statuses.contains(&status) {
            rng.chance(self.elevated_probability)
        } else if self.baseline_statuses.contains(&status) {
            let (low, high) = self.baseline_band;
            let p = rng.uniform(low, high);
            rng.chance(p)
        } else {
            false
        }
    }
}

/// Idle backoff schedule, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub floor_ms:   u64,
    pub step_ms:    u64,
    pub ceiling_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { initial_ms: 500, floor_ms: 10, step_ms: 100, ceiling_ms: 500 }
    }
}

impl BackoffPolicy {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms.min(self.ceiling_ms))
    }

    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }

    /// Delay after an idle poll. Never shrinks, never passes the ceiling
    /// (unless `current` already did).
    pub fn after_idle(&self, current: Duration) -> Duration {
        (current + Duration::from_millis(self.step_ms)).min(self.ceiling().max(current))
    }
}

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No new raw entries.
    Idle,
    /// `count` entries enriched and appended; `skipped` malformed entries
    /// consumed without output.
    Appended { count: usize, skipped: usize },
    /// New entries were seen but could not be written; they are retried
    /// on the next poll.
    Deferred { pending: usize },
}

pub struct LogCorrelationEngine {
    store:     Arc<SharedLocationStore>,
    source:    RawLogSource,
    sink:      EnrichedLogSink,
    directory: ComputerDirectory,
    policy:    MismatchPolicy,
    backoff:   BackoffPolicy,
    rng:       StreamRng,
    clock:     Arc<dyn Clock>,
    offset:    usize,
    delay:     Duration,
}

impl LogCorrelationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SharedLocationStore>,
        source: RawLogSource,
        sink: EnrichedLogSink,
        directory: ComputerDirectory,
        policy: MismatchPolicy,
        backoff: BackoffPolicy,
        rng: StreamRng,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            delay: backoff.initial(),
            store,
            source,
            sink,
            directory,
            policy,
            backoff,
            rng,
            clock,
            offset: 0,
        }
    }

    /// Raw entries consumed so far in this process.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Delay the loop will sleep before the next poll.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Enrich one raw entry against `snapshot`. Draws from the engine's RNG
    /// only when the staff member is found in the computer's room.
    pub fn enrich(&mut self, raw: RawLogEntry, snapshot: &LocationSnapshot) -> EnrichedLogEntry {
        let computer_room = self.directory.room_of(&raw.computer_id).cloned();
        let nearby_users = computer_room
            .as_deref()
            .map(|room| snapshot.occupants(room))
            .unwrap_or_default();

        let mut actual_location = snapshot.locate(&raw.username).cloned();
        let at_own_computer = matches!(
            (&actual_location, &computer_room),
            (Some(actual), Some(computer)) if actual == computer
        );
        if at_own_computer && self.policy.should_override(raw.break_status, &mut self.rng) {
            log::debug!(
                "override: {} at {} reported in {}",
                raw.username, raw.computer_id, self.policy.away_room
            );
            actual_location = Some(self.policy.away_room.clone());
        }

        let room_mismatch = match (&actual_location, &computer_room) {
            (Some(actual), Some(computer)) => actual != computer,
            _ => true,
        };

        EnrichedLogEntry {
            raw,
            nearby_users,
            actual_location,
            computer_room,
            room_mismatch,
        }
    }

    /// One cycle. See module docs.
    pub fn poll_once(&mut self) -> PollOutcome {
        let snapshot = self.store.load();

        let all = match self.source.read_values() {
            Ok(all) => all,
            Err(e) => {
                log::warn!("raw log {} unreadable: {e}", self.source.path().display());
                self.delay = self.backoff.after_idle(self.delay);
                return PollOutcome::Idle;
            }
        };
        if all.len() < self.offset {
            log::warn!(
                "raw log shrank from {} to {} entries; resetting offset",
                self.offset,
                all.len()
            );
            self.offset = all.len();
        }

        let consumed = all.len() - self.offset;
        if consumed == 0 {
            self.delay = self.backoff.after_idle(self.delay);
            return PollOutcome::Idle;
        }

        let mut fresh = Vec::with_capacity(consumed);
        for (index, value) in all.into_iter().enumerate().skip(self.offset) {
            match serde_json::from_value::<RawLogEntry>(value) {
                Ok(raw) => fresh.push(raw),
                Err(e) => log::warn!("skipping malformed raw log entry #{index}: {e}"),
            }
        }
        let skipped = consumed - fresh.len();

        // New entries were seen, so the delay drops to the floor whether or
        // not the sink accepts them.
        self.delay = self.backoff.floor();

        if fresh.is_empty() {
            self.offset += consumed;
            return PollOutcome::Appended { count: 0, skipped };
        }

        let count = fresh.len();
        let enriched: Vec<EnrichedLogEntry> = fresh
            .into_iter()
            .map(|raw| self.enrich(raw, &snapshot))
            .collect();

        match self.sink.append(&enriched) {
            Ok(total) => {
                self.offset += consumed;
                log::debug!("appended {count} enriched entries ({total} in sink)");
                PollOutcome::Appended { count, skipped }
            }
            Err(e) => {
                log::warn!("could not append {count} enriched entries: {e}");
                PollOutcome::Deferred { pending: count }
            }
        }
    }

    /// Poll until cancelled.
    pub fn listen(&mut self, cancel: &CancelToken) {
        self.log_startup();
        while !cancel.is_cancelled() {
            self.poll_once();
            self.clock.sleep(self.delay);
        }
        log::info!("correlation engine stopped at offset {}", self.offset);
    }

    /// Poll exactly `cycles` times, sleeping between polls.
    pub fn run_cycles(&mut self, cycles: u64) {
        self.log_startup();
        for _ in 0..cycles {
            self.poll_once();
            self.clock.sleep(self.delay);
        }
    }

    fn log_startup(&self) {
        log::info!(
            "correlating {} -> {}",
            self.source.path().display(),
            self.sink.path().display()
        );
        if self.offset == 0 && !self.sink.is_empty() {
            log::warn!(
                "enriched log {} is not empty; entries from earlier runs will be appended again",
                self.sink.path().display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_to_ceiling_and_stays() {
        let b = BackoffPolicy::default();
        let mut d = b.floor();
        let mut seen = vec![d];
        for _ in 0..10 {
            d = b.after_idle(d);
            seen.push(d);
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), b.ceiling());
    }

    #[test]
    fn unknown_status_never_overrides() {
        let policy = MismatchPolicy::default();
        let mut rng = StreamRng::new(9, 0);
        assert!((0..100).all(|_| !policy.should_override(Some(7), &mut rng)));
        assert!((0..100).all(|_| !policy.should_override(None, &mut rng)));
    }
}
