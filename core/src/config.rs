use crate::{
    correlation::{BackoffPolicy, ComputerDirectory, MismatchPolicy},
    error::{PresenceError, PresenceResult},
    floor_plan::FloorPlan,
    roster::{reference_roster, StaffMember},
    transition::TransitionTables,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the four data files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPaths {
    /// Room → staff names, rewritten by the simulator.
    pub location_file: PathBuf,
    /// Staff name → duty status code, written by an external process.
    pub status_file: PathBuf,
    /// Raw access log, appended by an external process.
    pub raw_log_file: PathBuf,
    /// Enriched access log, appended by the correlation engine.
    pub enriched_log_file: PathBuf,
}

impl DataPaths {
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            location_file:     dir.join("ual.json"),
            status_file:       dir.join("break_tracker.json"),
            raw_log_file:      dir.join("logs.json"),
            enriched_log_file: dir.join("data_record_logs.json"),
        }
    }

    /// Make relative paths relative to `base` instead of the working directory.
    fn resolve_against(&mut self, base: &Path) {
        for path in [
            &mut self.location_file,
            &mut self.status_file,
            &mut self.raw_log_file,
            &mut self.enriched_log_file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Minimum time between two moves of the same agent.
    pub base_tick_ms:           u64,
    pub status_poll_ms:         u64,
    pub status_lock_timeout_ms: u64,
    pub sink_lock_timeout_ms:   u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_tick_ms:           1_200,
            status_poll_ms:         600,
            status_lock_timeout_ms: 1_000,
            sink_lock_timeout_ms:   1_000,
        }
    }
}

impl TimingConfig {
    pub fn base_tick(&self) -> Duration { Duration::from_millis(self.base_tick_ms) }
    pub fn status_poll(&self) -> Duration { Duration::from_millis(self.status_poll_ms) }
    pub fn status_lock_timeout(&self) -> Duration { Duration::from_millis(self.status_lock_timeout_ms) }
    pub fn sink_lock_timeout(&self) -> Duration { Duration::from_millis(self.sink_lock_timeout_ms) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_seed")]
    pub seed:        u64,
    pub paths:       DataPaths,
    #[serde(default)]
    pub timing:      TimingConfig,
    #[serde(default)]
    pub backoff:     BackoffPolicy,
    #[serde(default = "reference_roster")]
    pub roster:      Vec<StaffMember>,
    #[serde(default = "FloorPlan::reference")]
    pub floor_plan:  FloorPlan,
    #[serde(default = "TransitionTables::reference")]
    pub transitions: TransitionTables,
    #[serde(default = "ComputerDirectory::reference")]
    pub computers:   ComputerDirectory,
    #[serde(default)]
    pub mismatch:    MismatchPolicy,
}

fn default_seed() -> u64 { 42 }

impl PresenceConfig {
    /// The reference four-room deployment with its data files in `data_dir`.
    pub fn reference(data_dir: impl AsRef<Path>) -> Self {
        Self {
            seed:        default_seed(),
            paths:       DataPaths::under(data_dir),
            timing:      TimingConfig::default(),
            backoff:     BackoffPolicy::default(),
            roster:      reference_roster(),
            floor_plan:  FloorPlan::reference(),
            transitions: TransitionTables::reference(),
            computers:   ComputerDirectory::reference(),
            mismatch:    MismatchPolicy::default(),
        }
    }

    /// Load a JSON config. Omitted sections fall back to the reference
    /// deployment; relative data paths resolve against the config's folder.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let mut config: PresenceConfig = serde_json::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.paths.resolve_against(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn room_names(&self) -> Vec<String> {
        self.floor_plan.room_names().cloned().collect()
    }

    /// Reject configs an agent or the correlation engine would trip over
    /// at runtime.
    pub fn validate(&self) -> PresenceResult<()> {
        let invalid = |msg: String| Err(PresenceError::Config(msg));

        if self.floor_plan.rooms.is_empty() {
            return invalid("floor plan has no rooms".into());
        }

        let mut names = HashSet::new();
        for member in &self.roster {
            if !names.insert(member.name.as_str()) {
                return invalid(format!("staff member '{}' listed twice", member.name));
            }
            if self.transitions.roles().all(|(role, _)| role != member.role) {
                return invalid(format!(
                    "no transition tables for role {} of '{}'",
                    member.role.label(),
                    member.name
                ));
            }
        }

        for (role, tables) in self.transitions.roles() {
            for (status, table) in tables.iter() {
                let at = format!("{}/{status:?}", role.label());
                if table.weights.iter().any(|w| !w.weight.is_finite() || w.weight < 0.0) {
                    return invalid(format!("{at}: weights must be finite and non-negative"));
                }
                if table.total_weight() <= 0.0 {
                    return invalid(format!("{at}: weights sum to zero"));
                }
                if let Some(room) = table.rooms().find(|r| !self.floor_plan.contains(r)) {
                    return invalid(format!("{at}: room '{room}' is not on the floor plan"));
                }
                if let Some(dwell) = &table.dwell {
                    if dwell.min_ticks > dwell.max_ticks {
                        return invalid(format!("{at}: dwell min exceeds max"));
                    }
                }
            }
        }

        for (computer, room) in self.computers.iter() {
            if !self.floor_plan.contains(room) {
                return invalid(format!("computer '{computer}' is in unknown room '{room}'"));
            }
        }

        if !self.floor_plan.contains(&self.mismatch.away_room) {
            return invalid(format!("away room '{}' is not on the floor plan", self.mismatch.away_room));
        }
        let (low, high) = self.mismatch.baseline_band;
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return invalid(format!("baseline band ({low}, {high}) is not a probability range"));
        }
        if !(0.0..=1.0).contains(&self.mismatch.elevated_probability) {
            return invalid("elevated probability must be within [0, 1]".into());
        }

        if self.backoff.floor_ms > self.backoff.ceiling_ms {
            return invalid("backoff floor exceeds ceiling".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_is_valid() {
        PresenceConfig::reference("data").validate().expect("valid");
    }

    #[test]
    fn duplicate_staff_is_rejected() {
        let mut config = PresenceConfig::reference("data");
        let dup = config.roster[0].clone();
        config.roster.push(dup);
        assert!(matches!(config.validate(), Err(PresenceError::Config(_))));
    }

    #[test]
    fn away_room_must_exist() {
        let mut config = PresenceConfig::reference("data");
        config.mismatch.away_room = "Roof".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn minimal_json_falls_back_to_reference_sections() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("presence.json");
        std::fs::write(
            &path,
            r#"{
                "seed": 7,
                "paths": {
                    "location_file": "ual.json",
                    "status_file": "break_tracker.json",
                    "raw_log_file": "logs.json",
                    "enriched_log_file": "out/data_record_logs.json"
                }
            }"#,
        )
        .unwrap();

        let config = PresenceConfig::load(&path).expect("load");
        assert_eq!(config.seed, 7);
        assert_eq!(config.roster.len(), 11);
        assert_eq!(config.paths.location_file, dir.path().join("ual.json"));
        assert_eq!(
            config.paths.enriched_log_file,
            dir.path().join("out/data_record_logs.json")
        );
    }
}
