//! Core module - engine loop and snapshot fan-out

mod broadcast;
mod engine;

pub use broadcast::{Broadcaster, Subscription};
pub use engine::Engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide counters maintained by the engine loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub total_cycles: u64,
    pub total_readings: u64,
    pub transport_errors: u64,
    pub last_cycle: Option<DateTime<Utc>>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            running: false,
            total_cycles: 0,
            total_readings: 0,
            transport_errors: 0,
            last_cycle: None,
        }
    }
}
