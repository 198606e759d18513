//! Tick bookkeeping and per-tick results.
//!
//! The simulation is driven from outside: the game loop calls
//! [`World::tick`](crate::world::World::tick) with the elapsed time each frame.

use crate::fleet::Fleet;
use crate::id::{FleetId, PlayerId};

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable clock state tracked by the world.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Number of `tick` calls so far.
    pub tick: u64,
    /// Total simulated seconds.
    pub elapsed: f64,
}

impl SimState {
    /// Create a new simulation state starting at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&mut self, dt: f64) {
        self.tick += 1;
        self.elapsed += dt;
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// How a deployment on a node resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Units joined a garrison of the same owner.
    Reinforced,
    /// Defenders held; the garrison shrank.
    Repelled,
    /// Attackers outnumbered the garrison and took the node.
    Captured { previous_owner: PlayerId },
}

/// A fleet that reached its target during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetArrival {
    pub id: FleetId,
    /// The fleet as it was on arrival.
    pub fleet: Fleet,
    pub outcome: DeployOutcome,
}

/// Result of a [`World::tick`](crate::world::World::tick) call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Fleets advanced this tick, arrived or not.
    pub fleets_stepped: usize,
    /// Arrivals in the order they were resolved.
    pub arrivals: Vec<FleetArrival>,
}
