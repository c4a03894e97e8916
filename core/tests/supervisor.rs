//! Supervisor lifecycle: idempotent start/stop, manual placement, shutdown.

use presence_core::{
    agent::{AgentContext, PositionBoard},
    clock::{Clock, ManualClock, SystemClock},
    error::PresenceError,
    floor_plan::FloorPlan,
    location_store::SharedLocationStore,
    rng::RngBank,
    roster::reference_roster,
    status::StatusTable,
    supervisor::SimulationSupervisor,
    transition::TransitionTables,
    types::Position,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn supervisor_in(dir: &Path) -> (SimulationSupervisor, Arc<SharedLocationStore>) {
    supervisor_with(dir, Arc::new(ManualClock::starting_now()), Duration::from_millis(1_200))
}

fn supervisor_with(
    dir: &Path,
    clock: Arc<dyn Clock>,
    base_tick: Duration,
) -> (SimulationSupervisor, Arc<SharedLocationStore>) {
    let roster = reference_roster();
    let plan = FloorPlan::reference();
    let rooms: Vec<String> = plan.room_names().cloned().collect();
    let store = Arc::new(SharedLocationStore::new(dir.join("ual.json"), rooms));
    let ctx = AgentContext {
        store:      store.clone(),
        statuses:   StatusTable::with_staff(roster.iter().map(|m| m.name.as_str())),
        tables:     Arc::new(TransitionTables::reference()),
        floor_plan: Arc::new(plan),
        board:      PositionBoard::default(),
        clock,
        base_tick,
    };
    (SimulationSupervisor::new(roster, ctx, RngBank::new(11)), store)
}

#[test]
fn start_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, _) = supervisor_in(dir.path());

    assert!(sup.start("AS1").unwrap());
    assert!(!sup.start("AS1").unwrap());
    assert_eq!(sup.running(), vec!["AS1".to_string()]);

    let finished = sup.shutdown();
    assert_eq!(finished.len(), 1);
}

#[test]
fn stop_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, _) = supervisor_in(dir.path());

    assert!(!sup.stop("AS2"));
    sup.start("AS2").unwrap();
    assert!(sup.stop("AS2"));
    assert!(!sup.stop("AS2"));
    assert!(!sup.is_running("AS2"));
    sup.shutdown();
}

#[test]
fn restart_after_stop_runs_again() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, _) = supervisor_in(dir.path());

    sup.start("Manager1").unwrap();
    sup.stop("Manager1");
    assert!(sup.start("Manager1").unwrap());
    assert!(sup.is_running("Manager1"));

    // Both the stopped and the restarted thread are joined.
    assert_eq!(sup.shutdown().len(), 2);
}

#[test]
fn start_all_covers_roster_and_shutdown_joins_everyone() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, store) = supervisor_in(dir.path());

    let started = sup.start_all();
    assert_eq!(started.len(), sup.roster().len());
    assert!(sup.start_all().is_empty());

    let finished = sup.shutdown();
    assert_eq!(finished.len(), 11);

    let snapshot = store.load();
    for agent in &finished {
        let rooms = snapshot.rooms().filter(|(_, n)| n.contains(&agent.name)).count();
        assert!(rooms <= 1, "{} in {rooms} rooms", agent.name);
        assert_eq!(snapshot.locate(&agent.name), agent.room.as_ref());
    }
}

#[test]
fn unknown_staff_cannot_start() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, _) = supervisor_in(dir.path());

    let err = sup.start("Nobody").unwrap_err();
    assert!(matches!(err, PresenceError::UnknownStaff { ref name } if name == "Nobody"));
    assert!(sup.running().is_empty());
}

#[test]
fn place_moves_staff_and_sets_anchor_position() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, store) = supervisor_in(dir.path());

    let snapshot = sup.place("AS4", Some("Room D")).unwrap();
    assert_eq!(snapshot.locate("AS4").map(String::as_str), Some("Room D"));
    assert_eq!(store.load().locate("AS4").map(String::as_str), Some("Room D"));
    assert_eq!(sup.board().get("AS4"), FloorPlan::reference().anchor("Room D"));

    let snapshot = sup.place("AS4", None).unwrap();
    assert_eq!(snapshot.locate("AS4"), None);
}

#[test]
fn place_rejects_unknown_room() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, store) = supervisor_in(dir.path());

    let err = sup.place("AS4", Some("Room Z")).unwrap_err();
    assert!(matches!(err, PresenceError::UnknownRoom { .. }));
    assert_eq!(store.load().locate("AS4"), None);
}

#[test]
fn drop_at_resolves_room_from_position() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, store) = supervisor_in(dir.path());
    let plan = FloorPlan::reference();

    let anchor = plan.anchor("Room C").unwrap();
    let room = sup.drop_at("AS7", anchor).unwrap();
    assert_eq!(room.as_deref(), Some("Room C"));
    assert_eq!(store.load().locate("AS7").map(String::as_str), Some("Room C"));
    assert_eq!(sup.board().get("AS7"), Some(anchor));

    // Off the floor plan entirely: outside every room.
    let room = sup.drop_at("AS7", Position::new(5.0, 5.0)).unwrap();
    assert_eq!(room, None);
    assert_eq!(store.load().locate("AS7"), None);
}

#[test]
fn existing_occupants_get_grid_positions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = FloorPlan::reference();
    {
        let rooms: Vec<String> = plan.room_names().cloned().collect();
        let store = SharedLocationStore::new(dir.path().join("ual.json"), rooms);
        store.commit("AS1", Some("Room A")).unwrap();
        store.commit("AS2", Some("Room A")).unwrap();
    }

    let (sup, _) = supervisor_in(dir.path());
    assert_eq!(sup.board().get("AS1"), plan.grid_position("Room A", 0));
    assert_eq!(sup.board().get("AS2"), plan.grid_position("Room A", 1));
    assert_eq!(sup.board().get("AS3"), None);
}

#[test]
fn grid_slots_follow_file_order() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("ual.json"),
        r#"{"Room A": ["AS2", "Visitor", "AS1"], "Room B": [], "Room C": [], "Room D": []}"#,
    )
    .unwrap();

    let (sup, _) = supervisor_in(dir.path());
    let plan = FloorPlan::reference();
    assert_eq!(sup.board().get("AS2"), plan.grid_position("Room A", 0));
    assert_eq!(sup.board().get("AS1"), plan.grid_position("Room A", 1));
    assert_eq!(sup.board().get("Visitor"), None);
}

#[test]
fn bounded_shutdown_joins_agents_that_finish_in_time() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, _) = supervisor_in(dir.path());
    sup.start_all();

    let (finished, abandoned) = sup.shutdown_within(Duration::from_secs(5));
    assert_eq!(finished.len(), 11);
    assert!(abandoned.is_empty());
}

#[test]
fn bounded_shutdown_leaves_sleeping_agents_behind() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut sup, store) = supervisor_with(dir.path(), Arc::new(SystemClock), Duration::from_secs(60));
    sup.start("Director1").unwrap();

    // The first move is committed right before the agent goes to sleep.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while store.load().locate("Director1").is_none() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    std::thread::sleep(Duration::from_millis(20));

    let started = std::time::Instant::now();
    let (finished, abandoned) = sup.shutdown_within(Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(finished.is_empty());
    assert_eq!(abandoned, vec!["Director1".to_string()]);
}
