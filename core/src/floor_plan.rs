//! Room geometry for presentation: anchors, bounds and jittered placement.
//!
//! Coordinates never reach the location store. They exist so a rendering
//! layer can draw agents and so a dropped avatar can be resolved to a room.

use crate::{
    rng::StreamRng,
    types::{Position, RoomName},
};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle, min edges inclusive, max edges exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn contains(&self, p: Position) -> bool {
        p.x >= self.min_x && p.x < self.max_x && p.y >= self.min_y && p.y < self.max_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub name:   RoomName,
    pub anchor: Position,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
    pub rooms: Vec<RoomSpec>,
    /// Maximum per-axis offset from the anchor for a simulated move.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Spacing and width of the grid used for initial placement.
    #[serde(default = "default_grid_spacing")]
    pub grid_spacing: f64,
    #[serde(default = "default_grid_columns")]
    pub grid_columns: usize,
}

fn default_jitter() -> f64 { 70.0 }
fn default_grid_spacing() -> f64 { 30.0 }
fn default_grid_columns() -> usize { 3 }

impl FloorPlan {
    /// Four quadrants of a 390-unit square at offset 97:
    /// C top-left, D top-right, A bottom-left, B bottom-right.
    pub fn reference() -> Self {
        let (lo, mid, hi) = (97.0, 292.0, 487.0);
        let quad = |min_x, min_y, max_x, max_y| Bounds { min_x, min_y, max_x, max_y };
        let room = |name: &str, anchor: Position, bounds: Bounds| RoomSpec {
            name: name.to_string(),
            anchor,
            bounds,
        };
        Self {
            rooms: vec![
                room("Room A", Position::new(195.0, 390.0), quad(lo, mid, mid, hi)),
                room("Room B", Position::new(390.0, 357.5), quad(mid, mid, hi, hi)),
                room("Room C", Position::new(162.5, 162.5), quad(lo, lo, mid, mid)),
                room("Room D", Position::new(390.0, 162.5), quad(mid, lo, hi, mid)),
            ],
            jitter:       default_jitter(),
            grid_spacing: default_grid_spacing(),
            grid_columns: default_grid_columns(),
        }
    }

    pub fn room_names(&self) -> impl Iterator<Item = &RoomName> {
        self.rooms.iter().map(|r| &r.name)
    }

    pub fn contains(&self, room: &str) -> bool {
        self.spec(room).is_some()
    }

    pub fn anchor(&self, room: &str) -> Option<Position> {
        self.spec(room).map(|r| r.anchor)
    }

    /// Anchor plus a uniform offset in `[-jitter, jitter)` on each axis.
    pub fn jittered_position(&self, room: &str, rng: &mut StreamRng) -> Option<Position> {
        let anchor = self.anchor(room)?;
        let dx = rng.uniform(-self.jitter, self.jitter);
        let dy = rng.uniform(-self.jitter, self.jitter);
        Some(anchor.offset(dx, dy))
    }

    /// Grid slot `slot` near the room's anchor, filled row by row.
    pub fn grid_position(&self, room: &str, slot: usize) -> Option<Position> {
        let anchor = self.anchor(room)?;
        let columns = self.grid_columns.max(1);
        let dx = (slot % columns) as f64 * self.grid_spacing;
        let dy = (slot / columns) as f64 * self.grid_spacing;
        Some(anchor.offset(dx, dy))
    }

    /// The room whose bounds contain `p`, or `None` when outside every room.
    pub fn room_at(&self, p: Position) -> Option<&RoomName> {
        self.rooms.iter().find(|r| r.bounds.contains(p)).map(|r| &r.name)
    }

    fn spec(&self, room: &str) -> Option<&RoomSpec> {
        self.rooms.iter().find(|r| r.name == room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_resolve_to_rooms() {
        let plan = FloorPlan::reference();
        assert_eq!(plan.room_at(Position::new(150.0, 150.0)).map(String::as_str), Some("Room C"));
        assert_eq!(plan.room_at(Position::new(400.0, 150.0)).map(String::as_str), Some("Room D"));
        assert_eq!(plan.room_at(Position::new(150.0, 400.0)).map(String::as_str), Some("Room A"));
        assert_eq!(plan.room_at(Position::new(400.0, 400.0)).map(String::as_str), Some("Room B"));
        assert_eq!(plan.room_at(Position::new(10.0, 10.0)), None);
        assert_eq!(plan.room_at(Position::new(500.0, 300.0)), None);
    }

    #[test]
    fn every_anchor_lies_in_its_own_room() {
        let plan = FloorPlan::reference();
        for spec in &plan.rooms {
            assert_eq!(plan.room_at(spec.anchor), Some(&spec.name));
        }
    }

    #[test]
    fn jitter_stays_within_band() {
        let plan = FloorPlan::reference();
        let anchor = plan.anchor("Room D").unwrap();
        let mut rng = StreamRng::new(5, 0);
        for _ in 0..200 {
            let p = plan.jittered_position("Room D", &mut rng).unwrap();
            assert!((p.x - anchor.x).abs() <= plan.jitter);
            assert!((p.y - anchor.y).abs() <= plan.jitter);
        }
        assert!(plan.jittered_position("Lobby", &mut rng).is_none());
    }

    #[test]
    fn grid_wraps_after_three_columns() {
        let plan = FloorPlan::reference();
        let a = plan.anchor("Room A").unwrap();
        assert_eq!(plan.grid_position("Room A", 2), Some(a.offset(60.0, 0.0)));
        assert_eq!(plan.grid_position("Room A", 3), Some(a.offset(0.0, 30.0)));
    }
}
