//! Presence simulation and access-log correlation.
//!
//! Agents move staff members between rooms and commit each move to a shared
//! location file; a correlation engine reads the same file to annotate raw
//! computer-access events with where everyone actually was.

pub mod access_log;
pub mod agent;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod error;
pub mod file_lock;
pub mod floor_plan;
pub mod location_store;
pub mod persist;
pub mod rng;
pub mod roster;
pub mod status;
pub mod supervisor;
pub mod transition;
pub mod types;
