//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::{GameConfig, LevelConfig};
use crate::geom::Point;
use crate::graph::NodeData;
use crate::id::*;
use crate::level::generate_level;
use crate::world::World;

pub const P1: PlayerId = PlayerId(1);
pub const P2: PlayerId = PlayerId(2);

// ===========================================================================
// Node helpers
// ===========================================================================

pub fn node_at(x: f64, y: f64) -> NodeData {
    NodeData::new(Point::new(x, y))
}

pub fn owned_node(x: f64, y: f64, owner: PlayerId, garrison: u32) -> NodeData {
    NodeData {
        owner,
        garrison,
        ..node_at(x, y)
    }
}

// ===========================================================================
// Commands
// ===========================================================================

/// Select `from`, target `to`, and launch `units` (or the default).
pub fn launch(
    world: &mut World,
    player: PlayerId,
    from: NodeId,
    to: NodeId,
    units: Option<u32>,
) -> Option<FleetId> {
    world.select_node(player, Some(from), true).unwrap();
    world.target_node(player, Some(to), false).unwrap();
    world.move_units_to_target(player, units).unwrap()
}

/// Tick until no fleets remain or `max_ticks` is reached. Returns the
/// number of ticks run.
pub fn run_until_idle(world: &mut World, dt: f64, max_ticks: usize) -> usize {
    let mut ticks = 0;
    while world.active_fleet_count() > 0 && ticks < max_ticks {
        world.tick(dt).unwrap();
        ticks += 1;
    }
    ticks
}

/// Consume every dirty flag.
pub fn clear_dirty(world: &mut World) {
    for flag in crate::dirty::DirtyFlag::ALL {
        world.take_dirty(flag);
    }
}

// ===========================================================================
// Pre-built worlds
// ===========================================================================

/// A(P1, 10) -- B(neutral, 4), plus C(P2, 0) hanging off B.
pub fn build_scenario() -> (World, [NodeId; 3]) {
    let mut world = World::new(&GameConfig::default());
    let a = world.add_node_with(owned_node(0.1, 0.5, P1, 10));
    let b = world.add_node_with(owned_node(0.4, 0.5, PlayerId::NEUTRAL, 4));
    let c = world.add_node_with(owned_node(0.7, 0.5, P2, 0));
    world.connect(a, b).unwrap();
    world.connect(b, c).unwrap();
    clear_dirty(&mut world);
    (world, [a, b, c])
}

/// `length` nodes in a row, 0.1 apart, each linked to the next.
pub fn build_line(length: usize) -> (World, Vec<NodeId>) {
    let mut world = World::new(&GameConfig::default());
    let ids: Vec<NodeId> = (0..length)
        .map(|i| world.add_node(Point::new(0.05 + 0.1 * i as f64, 0.5)))
        .collect();
    for hop in ids.windows(2) {
        world.connect(hop[0], hop[1]).unwrap();
    }
    (world, ids)
}

/// A `rows` x `cols` lattice with links to right and lower neighbors.
pub fn build_grid(rows: usize, cols: usize) -> (World, Vec<Vec<NodeId>>) {
    let mut world = World::new(&GameConfig::default());
    let step_x = 1.0 / (cols + 1) as f64;
    let step_y = 1.0 / (rows + 1) as f64;
    let mut grid: Vec<Vec<NodeId>> = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for c in 0..cols {
            let position = Point::new(step_x * (c + 1) as f64, step_y * (r + 1) as f64);
            row.push(world.add_node(position));
        }
        grid.push(row);
    }
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                world.connect(grid[r][c], grid[r][c + 1]).unwrap();
            }
            if r + 1 < rows {
                world.connect(grid[r][c], grid[r + 1][c]).unwrap();
            }
        }
    }
    (world, grid)
}

/// A generated level sized for tests.
pub fn build_small_level(seed: u64) -> World {
    let config = GameConfig {
        level: LevelConfig {
            nodes: 30,
            radius: 0.3,
            ..LevelConfig::default()
        },
        ..GameConfig::default()
    };
    generate_level(&config, seed).unwrap()
}

/// A generated level with the default parameters.
pub fn build_default_level(seed: u64) -> World {
    generate_level(&GameConfig::default(), seed).unwrap()
}
