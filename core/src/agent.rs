//! One simulated staff member and the loop that moves them between rooms.
//!
//! TICK (fixed order, one call to `step`):
//!   1. Read the agent's duty status.
//!   2. Pick the transition table for (role, status).
//!   3. Draw the next room from the table's weights.
//!   4. Jitter a presentation position around the room's anchor.
//!   5. Commit the room to the shared location store.
//!   6. Compute the delay: base tick plus any dwell the table asks for.
//!
//! The loop then sleeps for that delay. Cancellation is observed only at the
//! top of the loop.

use crate::{
    cancel::CancelToken,
    clock::Clock,
    error::{PresenceError, PresenceResult},
    floor_plan::FloorPlan,
    location_store::SharedLocationStore,
    rng::StreamRng,
    roster::{RoleClass, StaffMember},
    status::{DutyStatus, StatusTable},
    transition::TransitionTables,
    types::{Position, RoomName, StaffName},
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct StaffAgent {
    pub name:     StaffName,
    pub role:     RoleClass,
    pub room:     Option<RoomName>,
    pub position: Option<Position>,
}

impl StaffAgent {
    pub fn new(member: &StaffMember) -> Self {
        Self {
            name:     member.name.clone(),
            role:     member.role,
            room:     None,
            position: None,
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMove {
    pub staff:    StaffName,
    pub status:   DutyStatus,
    pub room:     RoomName,
    pub position: Position,
    /// Time until the next tick, dwell included.
    pub delay:    Duration,
}

/// Latest presentation position of every agent, for a rendering layer.
#[derive(Debug, Clone, Default)]
pub struct PositionBoard {
    inner: Arc<RwLock<HashMap<StaffName, Position>>>,
}

impl PositionBoard {
    pub fn publish(&self, staff: &str, position: Position) {
        self.inner
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(staff.to_string(), position);
    }

    pub fn get(&self, staff: &str) -> Option<Position> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).get(staff).copied()
    }

    pub fn snapshot(&self) -> HashMap<StaffName, Position> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Everything an agent reads or writes besides its own state.
/// Cheap to clone; one copy per agent thread.
#[derive(Clone)]
pub struct AgentContext {
    pub store:      Arc<SharedLocationStore>,
    pub statuses:   StatusTable,
    pub tables:     Arc<TransitionTables>,
    pub floor_plan: Arc<FloorPlan>,
    pub board:      PositionBoard,
    pub clock:      Arc<dyn Clock>,
    pub base_tick:  Duration,
}

pub struct AgentSimulator {
    agent: StaffAgent,
    ctx:   AgentContext,
    rng:   StreamRng,
}

impl AgentSimulator {
    pub fn new(agent: StaffAgent, ctx: AgentContext, rng: StreamRng) -> Self {
        Self { agent, ctx, rng }
    }

    pub fn agent(&self) -> &StaffAgent {
        &self.agent
    }

    /// Advance one tick. See module docs for the order of operations.
    pub fn step(&mut self) -> PresenceResult<AgentMove> {
        let status = self.ctx.statuses.get(&self.agent.name);

        let table = self.ctx.tables.get(self.agent.role, status).ok_or_else(|| {
            PresenceError::Config(format!(
                "no transition table for {} while {status:?}",
                self.agent.role.label()
            ))
        })?;

        let room = table
            .choose(&mut self.rng)
            .ok_or_else(|| {
                PresenceError::Config(format!(
                    "unusable weights for {} while {status:?}",
                    self.agent.role.label()
                ))
            })?
            .clone();

        let position = self
            .ctx
            .floor_plan
            .jittered_position(&room, &mut self.rng)
            .ok_or_else(|| PresenceError::UnknownRoom { name: room.clone() })?;

        self.ctx.store.commit(&self.agent.name, Some(&room))?;

        let dwell_ticks = table.dwell_ticks(&room, &mut self.rng);
        let delay = self.ctx.base_tick + self.ctx.base_tick * dwell_ticks as u32;

        self.agent.room = Some(room.clone());
        self.agent.position = Some(position);
        self.ctx.board.publish(&self.agent.name, position);

        Ok(AgentMove {
            staff: self.agent.name.clone(),
            status,
            room,
            position,
            delay,
        })
    }

    /// Tick until `cancel` is set. Faults are logged and the loop carries on
    /// after a base tick. Returns the agent's final state.
    pub fn run(mut self, cancel: CancelToken) -> StaffAgent {
        log::info!("agent {} started ({})", self.agent.name, self.agent.role.label());
        while !cancel.is_cancelled() {
            let delay = match self.step() {
                Ok(mv) => {
                    log::debug!(
                        "agent {} status={:?} -> {} next in {:?}",
                        mv.staff, mv.status, mv.room, mv.delay
                    );
                    mv.delay
                }
                Err(e) => {
                    log::warn!("agent {} tick failed: {e}", self.agent.name);
                    self.ctx.base_tick
                }
            };
            self.ctx.clock.sleep(delay);
        }
        log::info!("agent {} stopped", self.agent.name);
        self.agent
    }
}
