//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};

/// A staff member's unique name, e.g. "AS1" or "Manager2".
pub type StaffName = String;

/// A room name as it appears in the location file, e.g. "Room A".
pub type RoomName = String;

/// A computer identifier as it appears in the raw access log.
pub type ComputerId = String;

/// A presentation coordinate on the floor plan. Never committed to the
/// location store; only the room is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}
