//! Owns the agent threads.
//!
//! RULES:
//!   - Every running agent has exactly one registry entry, keyed by name.
//!   - start/stop are idempotent: starting a running agent or stopping a
//!     stopped one leaves the registry untouched.
//!   - Stopping only signals; the thread finishes its current sleep and
//!     exits at the top of its loop. `shutdown` joins everything;
//!     `shutdown_within` gives up on threads still asleep after a grace period.

use crate::{
    agent::{AgentContext, AgentSimulator, PositionBoard, StaffAgent},
    cancel::CancelToken,
    error::{PresenceError, PresenceResult},
    location_store::LocationSnapshot,
    rng::RngBank,
    roster::StaffMember,
    types::{Position, RoomName, StaffName},
};
use std::collections::{BTreeMap, HashMap};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

struct AgentHandle {
    cancel: CancelToken,
    thread: JoinHandle<StaffAgent>,
}

pub struct SimulationSupervisor {
    roster:      Vec<StaffMember>,
    ctx:         AgentContext,
    rng_bank:    RngBank,
    live:        BTreeMap<StaffName, AgentHandle>,
    /// Stopped agents whose threads may still be finishing a sleep.
    retired:     Vec<(StaffName, JoinHandle<StaffAgent>)>,
    generations: HashMap<StaffName, u64>,
}

impl SimulationSupervisor {
    /// Build a supervisor and give every roster member already present in
    /// the location file a grid position in their room.
    pub fn new(roster: Vec<StaffMember>, ctx: AgentContext, rng_bank: RngBank) -> Self {
        let supervisor = Self {
            roster,
            ctx,
            rng_bank,
            live: BTreeMap::new(),
            retired: Vec::new(),
            generations: HashMap::new(),
        };
        supervisor.place_initial_positions();
        supervisor
    }

    pub fn roster(&self) -> &[StaffMember] {
        &self.roster
    }

    pub fn board(&self) -> &PositionBoard {
        &self.ctx.board
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.live.contains_key(name)
    }

    /// Names of running agents, sorted.
    pub fn running(&self) -> Vec<StaffName> {
        self.live.keys().cloned().collect()
    }

    /// Start every roster member not already running. Returns the names
    /// actually started.
    pub fn start_all(&mut self) -> Vec<StaffName> {
        let names: Vec<StaffName> = self.roster.iter().map(|m| m.name.clone()).collect();
        let mut started = Vec::new();
        for name in names {
            match self.start(&name) {
                Ok(true) => started.push(name),
                Ok(false) => {}
                Err(e) => log::warn!("could not start {name}: {e}"),
            }
        }
        started
    }

    /// Start one agent. `Ok(false)` if it was already running.
    pub fn start(&mut self, name: &str) -> PresenceResult<bool> {
        self.reap();
        if self.live.contains_key(name) {
            return Ok(false);
        }
        let (index, member) = self.member(name)?;

        let generation = self.generations.entry(member.name.clone()).or_insert(0);
        let rng = self.rng_bank.for_agent(index, *generation, &member.name);
        *generation += 1;

        let mut agent = StaffAgent::new(&member);
        agent.room = self.ctx.store.load().locate(&member.name).cloned();
        agent.position = self.ctx.board.get(&member.name);

        let cancel = CancelToken::new();
        let simulator = AgentSimulator::new(agent, self.ctx.clone(), rng);
        let thread_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name(format!("agent-{}", member.name))
            .spawn(move || simulator.run(thread_cancel))
            .map_err(|e| PresenceError::io(format!("thread agent-{}", member.name), e))?;

        log::info!("started movement for {}", member.name);
        self.live.insert(member.name, AgentHandle { cancel, thread });
        Ok(true)
    }

    /// Signal one agent to stop. `false` if it was not running.
    pub fn stop(&mut self, name: &str) -> bool {
        let Some(handle) = self.live.remove(name) else {
            return false;
        };
        handle.cancel.cancel();
        self.retired.push((name.to_string(), handle.thread));
        log::info!("stopped movement for {name}");
        true
    }

    /// Signal every running agent to stop. Returns the names stopped.
    pub fn stop_all(&mut self) -> Vec<StaffName> {
        let names = self.running();
        for name in &names {
            self.stop(name);
        }
        names
    }

    /// Put a staff member in `room`, or outside every room with `None`,
    /// as a manual drag-and-drop would. A running agent keeps moving
    /// afterwards on its own schedule.
    pub fn place(&mut self, name: &str, room: Option<&str>) -> PresenceResult<LocationSnapshot> {
        self.member(name)?;
        if let Some(room) = room {
            let anchor = self
                .ctx
                .floor_plan
                .anchor(room)
                .ok_or_else(|| PresenceError::UnknownRoom { name: room.to_string() })?;
            self.ctx.board.publish(name, anchor);
        }
        self.ctx.store.commit(name, room)
    }

    /// Drop a staff member's avatar at `position` and commit whichever room
    /// contains it.
    pub fn drop_at(&mut self, name: &str, position: Position) -> PresenceResult<Option<RoomName>> {
        self.member(name)?;
        let room = self.ctx.floor_plan.room_at(position).cloned();
        self.ctx.board.publish(name, position);
        self.ctx.store.commit(name, room.as_deref())?;
        Ok(room)
    }

    /// Stop everything and wait for every agent thread to exit. Returns the
    /// final state of each agent that exited cleanly.
    pub fn shutdown(mut self) -> Vec<StaffAgent> {
        self.stop_all();
        let mut finished = Vec::new();
        for (name, thread) in self.retired.drain(..) {
            match thread.join() {
                Ok(agent) => finished.push(agent),
                Err(_) => log::warn!("agent {name} panicked"),
            }
        }
        finished
    }

    /// Like `shutdown`, but waits at most `grace` for agents to finish their
    /// current sleep. Threads still asleep after that are detached and die
    /// with the process. Returns the agents that exited and the names of
    /// those left behind.
    pub fn shutdown_within(mut self, grace: Duration) -> (Vec<StaffAgent>, Vec<StaffName>) {
        self.stop_all();
        let deadline = Instant::now() + grace;
        let mut finished = Vec::new();
        loop {
            let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
                .into_iter()
                .partition(|(_, thread)| thread.is_finished());
            self.retired = pending;
            for (name, thread) in done {
                match thread.join() {
                    Ok(agent) => finished.push(agent),
                    Err(_) => log::warn!("agent {name} panicked"),
                }
            }
            if self.retired.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(SHUTDOWN_POLL);
        }

        let abandoned: Vec<StaffName> = self.retired.drain(..).map(|(name, _)| name).collect();
        if !abandoned.is_empty() {
            log::info!("leaving {} agents mid-sleep: {}", abandoned.len(), abandoned.join(", "));
        }
        (finished, abandoned)
    }

    /// Join retired threads that have already exited.
    fn reap(&mut self) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|(_, thread)| thread.is_finished());
        self.retired = pending;
        for (name, thread) in done {
            if thread.join().is_err() {
                log::warn!("agent {name} panicked");
            }
        }
    }

    fn member(&self, name: &str) -> PresenceResult<(usize, StaffMember)> {
        self.roster
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .map(|(i, m)| (i, m.clone()))
            .ok_or_else(|| PresenceError::UnknownStaff { name: name.to_string() })
    }

    /// Grid slots go to roster members in the order the location file
    /// lists them.
    fn place_initial_positions(&self) {
        let listing = self.ctx.store.listing();
        for (room, names) in &listing {
            let present = names.iter().filter(|n| self.roster.iter().any(|m| &m.name == *n));
            for (slot, name) in present.enumerate() {
                if let Some(position) = self.ctx.floor_plan.grid_position(room, slot) {
                    self.ctx.board.publish(name, position);
                }
            }
        }
    }
}
