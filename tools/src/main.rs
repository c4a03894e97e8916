//! presence-runner: headless runner for the presence simulation.
//!
//! Usage:
//!   presence-runner simulate --data-dir ./data --seconds 60
//!   presence-runner simulate --config presence.json --ipc-mode
//!   presence-runner correlate --data-dir ./data [--cycles 100]

use anyhow::{bail, Result};
use presence_core::{
    access_log::{EnrichedLogSink, RawLogSource},
    agent::{AgentContext, PositionBoard},
    cancel::CancelToken,
    clock::{Clock, SystemClock},
    config::PresenceConfig,
    correlation::LogCorrelationEngine,
    location_store::{LocationSnapshot, SharedLocationStore},
    rng::{RngBank, StreamSlot},
    status::{DutyStatus, StatusTable, StatusTracker},
    supervisor::SimulationSupervisor,
    types::{Position, StaffName},
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    StartAll,
    Start { name: String },
    Stop { name: String },
    StopAll,
    Place { name: String, room: Option<String> },
    DropAt { name: String, x: f64, y: f64 },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    running:   Vec<StaffName>,
    rooms:     LocationSnapshot,
    positions: BTreeMap<StaffName, Position>,
    statuses:  BTreeMap<StaffName, DutyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error:     Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("simulate");
    let config = load_config(&args)?;

    match mode {
        "simulate" => simulate(&args, config),
        "correlate" => correlate(&args, config),
        other => bail!("unknown mode '{other}' (expected 'simulate' or 'correlate')"),
    }
}

fn load_config(args: &[String]) -> Result<PresenceConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => PresenceConfig::load(path)?,
        None => {
            let data_dir = flag_value(args, "--data-dir").unwrap_or("./data");
            PresenceConfig::reference(data_dir)
        }
    };
    config.seed = parse_arg(args, "--seed", config.seed);
    config.validate()?;
    Ok(config)
}

fn simulate(args: &[String], config: PresenceConfig) -> Result<()> {
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let seconds = parse_arg(args, "--seconds", 60u64);

    if !ipc_mode {
        println!("Presence simulation — presence-runner");
        println!("  started:   {}", chrono::Utc::now().to_rfc3339());
        println!("  seed:      {}", config.seed);
        println!("  staff:     {}", config.roster.len());
        println!("  seconds:   {seconds}");
        println!("  locations: {}", config.paths.location_file.display());
        println!("  statuses:  {}", config.paths.status_file.display());
        println!();
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SharedLocationStore::new(
        &config.paths.location_file,
        config.room_names(),
    ));

    let statuses = StatusTable::with_staff(config.roster.iter().map(|m| m.name.as_str()));
    let tracker = StatusTracker::new(
        &config.paths.status_file,
        statuses.clone(),
        config.timing.status_poll(),
        config.timing.status_lock_timeout(),
        clock.clone(),
    );
    let tracker_cancel = CancelToken::new();
    let tracker_thread = tracker.spawn(tracker_cancel.clone())?;

    let ctx = AgentContext {
        store:      store.clone(),
        statuses:   statuses.clone(),
        tables:     Arc::new(config.transitions.clone()),
        floor_plan: Arc::new(config.floor_plan.clone()),
        board:      PositionBoard::default(),
        clock:      clock.clone(),
        base_tick:  config.timing.base_tick(),
    };
    let mut supervisor =
        SimulationSupervisor::new(config.roster.clone(), ctx, RngBank::new(config.seed));

    if ipc_mode {
        run_ipc_loop(&mut supervisor, &store, &statuses)?;
    } else {
        supervisor.start_all();
        clock.sleep(Duration::from_secs(seconds));
    }

    let grace = config.timing.base_tick() * 2;
    log::info!("stopping agents; waiting up to {grace:?} for those mid-sleep");
    let (finished, abandoned) = supervisor.shutdown_within(grace);
    tracker_cancel.cancel();
    if tracker_thread.join().is_err() {
        log::warn!("status tracker panicked");
    }

    if !ipc_mode {
        print_summary(&store.load(), finished.len(), abandoned.len());
    }
    Ok(())
}

fn run_ipc_loop(
    supervisor: &mut SimulationSupervisor,
    store: &SharedLocationStore,
    statuses: &StatusTable,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let error = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => None,
            IpcCommand::StartAll => {
                supervisor.start_all();
                None
            }
            IpcCommand::Start { name } => supervisor.start(&name).err().map(|e| e.to_string()),
            IpcCommand::Stop { name } => {
                supervisor.stop(&name);
                None
            }
            IpcCommand::StopAll => {
                supervisor.stop_all();
                None
            }
            IpcCommand::Place { name, room } => supervisor
                .place(&name, room.as_deref())
                .err()
                .map(|e| e.to_string()),
            IpcCommand::DropAt { name, x, y } => supervisor
                .drop_at(&name, Position::new(x, y))
                .err()
                .map(|e| e.to_string()),
        };

        let state = build_ui_state(supervisor, store, statuses, error);
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(
    supervisor: &SimulationSupervisor,
    store: &SharedLocationStore,
    statuses: &StatusTable,
    error: Option<String>,
) -> UiState {
    UiState {
        running:   supervisor.running(),
        rooms:     store.load(),
        positions: supervisor.board().snapshot().into_iter().collect(),
        statuses:  statuses.snapshot(),
        error,
    }
}

fn correlate(args: &[String], config: PresenceConfig) -> Result<()> {
    let cycles = flag_value(args, "--cycles").and_then(|v| v.parse::<u64>().ok());

    println!("Presence simulation — correlation engine");
    println!("  seed:     {}", config.seed);
    println!("  raw log:  {}", config.paths.raw_log_file.display());
    println!("  enriched: {}", config.paths.enriched_log_file.display());
    println!();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SharedLocationStore::new(
        &config.paths.location_file,
        config.room_names(),
    ));
    let mut engine = LogCorrelationEngine::new(
        store,
        RawLogSource::new(&config.paths.raw_log_file),
        EnrichedLogSink::new(&config.paths.enriched_log_file, config.timing.sink_lock_timeout()),
        config.computers.clone(),
        config.mismatch.clone(),
        config.backoff,
        RngBank::new(config.seed).for_stream(StreamSlot::Correlation),
        clock,
    );

    let Some(n) = cycles else {
        // Runs until the process is killed.
        engine.listen(&CancelToken::new());
        return Ok(());
    };

    engine.run_cycles(n);
    println!("=== CORRELATION SUMMARY ===");
    println!("  cycles:           {n}");
    println!("  entries consumed: {}", engine.offset());
    Ok(())
}

fn print_summary(snapshot: &LocationSnapshot, joined: usize, left_asleep: usize) {
    println!("=== RUN SUMMARY ===");
    println!("  agents joined:      {joined}");
    println!("  agents left asleep: {left_asleep}");
    for (room, names) in snapshot.rooms() {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        println!("  {room:<8} {}", names.join(", "));
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
