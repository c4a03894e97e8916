//! Role- and status-conditioned room transition tables.
//!
//! Each (role, duty status) pair owns a weighted distribution over rooms
//! plus an optional dwell rule that stretches the next tick when the agent
//! lands in certain rooms.

use crate::{
    rng::StreamRng,
    roster::RoleClass,
    status::DutyStatus,
    types::RoomName,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomWeight {
    pub room:   RoomName,
    pub weight: f64,
}

/// Extra dwell, in whole base ticks, drawn uniformly from
/// `min_ticks..=max_ticks` when the chosen room is in `rooms`.
/// An empty `rooms` list applies to every destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwellRule {
    #[serde(default)]
    pub rooms:     Vec<RoomName>,
    pub min_ticks: u64,
    pub max_ticks: u64,
}

impl DwellRule {
    fn applies_to(&self, room: &str) -> bool {
        self.rooms.is_empty() || self.rooms.iter().any(|r| r == room)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    pub weights: Vec<RoomWeight>,
    #[serde(default)]
    pub dwell:   Option<DwellRule>,
}

impl TransitionTable {
    /// Weighted draw of the next room. `None` if the weights are unusable.
    pub fn choose(&self, rng: &mut StreamRng) -> Option<&RoomName> {
        let weights: Vec<f64> = self.weights.iter().map(|w| w.weight).collect();
        rng.weighted_index(&weights).map(|i| &self.weights[i].room)
    }

    /// Number of extra base ticks to dwell after moving into `room`.
    pub fn dwell_ticks(&self, room: &str, rng: &mut StreamRng) -> u64 {
        match &self.dwell {
            Some(rule) if rule.applies_to(room) => rng.range_inclusive(rule.min_ticks, rule.max_ticks),
            _ => 0,
        }
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomName> {
        self.weights.iter().map(|w| &w.room)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().map(|w| w.weight).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTables {
    pub normal:       TransitionTable,
    pub on_break:     TransitionTable,
    pub out_of_shift: TransitionTable,
}

impl StatusTables {
    pub fn for_status(&self, status: DutyStatus) -> &TransitionTable {
        match status {
            DutyStatus::Normal     => &self.normal,
            DutyStatus::OnBreak    => &self.on_break,
            DutyStatus::OutOfShift => &self.out_of_shift,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DutyStatus, &TransitionTable)> {
        [
            (DutyStatus::Normal, &self.normal),
            (DutyStatus::OnBreak, &self.on_break),
            (DutyStatus::OutOfShift, &self.out_of_shift),
        ]
        .into_iter()
    }
}

/// The table-of-tables, keyed by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionTables {
    by_role: BTreeMap<RoleClass, StatusTables>,
}

impl TransitionTables {
    pub fn new(by_role: BTreeMap<RoleClass, StatusTables>) -> Self {
        Self { by_role }
    }

    pub fn get(&self, role: RoleClass, status: DutyStatus) -> Option<&TransitionTable> {
        self.by_role.get(&role).map(|t| t.for_status(status))
    }

    pub fn roles(&self) -> impl Iterator<Item = (RoleClass, &StatusTables)> {
        self.by_role.iter().map(|(role, tables)| (*role, tables))
    }

    /// Tables of the reference four-room deployment. Room B is the
    /// break room every role drifts to when off duty.
    pub fn reference() -> Self {
        let off_duty = || Some(dwell(&[], 3, 8));
        let mut by_role = BTreeMap::new();

        by_role.insert(RoleClass::FrontLineGroup1, StatusTables {
            normal:       table([0.84, 0.02, 0.10, 0.04], None),
            on_break:     table([0.15, 0.80, 0.03, 0.02], off_duty()),
            out_of_shift: table([0.02, 0.96, 0.01, 0.01], off_duty()),
        });
        by_role.insert(RoleClass::FrontLineGroup2, StatusTables {
            normal:       table([0.10, 0.02, 0.84, 0.04], None),
            on_break:     table([0.03, 0.80, 0.15, 0.02], off_duty()),
            out_of_shift: table([0.01, 0.96, 0.02, 0.01], off_duty()),
        });
        by_role.insert(RoleClass::Manager, StatusTables {
            normal:       table([0.39, 0.02, 0.39, 0.20], Some(dwell(&["Room A", "Room C"], 48, 96))),
            on_break:     table([0.09, 0.80, 0.09, 0.02], off_duty()),
            out_of_shift: table([0.02, 0.95, 0.02, 0.01], off_duty()),
        });
        by_role.insert(RoleClass::Director, StatusTables {
            normal:       table([0.05, 0.02, 0.05, 0.88], Some(dwell(&["Room A", "Room C"], 12, 24))),
            on_break:     table([0.01, 0.87, 0.01, 0.11], off_duty()),
            out_of_shift: table([0.01, 0.96, 0.01, 0.02], off_duty()),
        });

        Self { by_role }
    }
}

const REFERENCE_ROOMS: [&str; 4] = ["Room A", "Room B", "Room C", "Room D"];

/// Weights in A, B, C, D order.
fn table(weights: [f64; 4], dwell: Option<DwellRule>) -> TransitionTable {
    TransitionTable {
        weights: REFERENCE_ROOMS
            .iter()
            .zip(weights)
            .map(|(room, weight)| RoomWeight { room: room.to_string(), weight })
            .collect(),
        dwell,
    }
}

fn dwell(rooms: &[&str], min_ticks: u64, max_ticks: u64) -> DwellRule {
    DwellRule {
        rooms: rooms.iter().map(|r| r.to_string()).collect(),
        min_ticks,
        max_ticks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_covers_every_role_and_status() {
        let tables = TransitionTables::reference();
        for role in RoleClass::ALL {
            for status in [DutyStatus::Normal, DutyStatus::OnBreak, DutyStatus::OutOfShift] {
                let t = tables.get(role, status).expect("table present");
                assert!((t.total_weight() - 1.0).abs() < 1e-9, "{role:?}/{status:?}");
            }
        }
    }

    #[test]
    fn manager_dwells_only_in_work_rooms() {
        let tables = TransitionTables::reference();
        let t = tables.get(RoleClass::Manager, DutyStatus::Normal).unwrap();
        let mut rng = StreamRng::new(3, 0);
        assert_eq!(t.dwell_ticks("Room D", &mut rng), 0);
        assert_eq!(t.dwell_ticks("Room B", &mut rng), 0);
        let d = t.dwell_ticks("Room A", &mut rng);
        assert!((48..=96).contains(&d));
    }

    #[test]
    fn front_line_normal_has_no_dwell() {
        let tables = TransitionTables::reference();
        let t = tables.get(RoleClass::FrontLineGroup1, DutyStatus::Normal).unwrap();
        let mut rng = StreamRng::new(3, 0);
        assert_eq!(t.dwell_ticks("Room A", &mut rng), 0);
    }
}
