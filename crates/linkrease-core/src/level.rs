//! Random level generation.
//!
//! A level is a random geometric graph: points scattered in the unit square,
//! kept apart by a minimum spacing, with a lane between every pair of points
//! within the connection radius. Layouts are regenerated until connected.

use crate::config::{ConfigError, GameConfig, LevelConfig};
use crate::geom::Point;
use crate::graph::{GraphError, NodeData, WorldGraph};
use crate::id::{NodeId, PlayerId};
use crate::rng::SimRng;
use crate::world::World;

/// Candidate points drawn per node before the spacing rule gives up.
pub const PLACEMENT_ATTEMPTS: u32 = 1000;

/// Errors that can occur while generating a level.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("invalid level configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not place node {placed} at least {repel} away from the others")]
    Crowded { placed: usize, repel: f64 },
    #[error("no connected layout found after {attempts} attempts")]
    Disconnected { attempts: u32 },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Generate a connected level and hand out starting nodes.
///
/// The first `players` nodes belong to players `1..=players`, are factories,
/// and hold `starting_garrison` units. All other nodes are neutral and empty.
/// The same `seed` always produces the same level.
pub fn generate_level(config: &GameConfig, seed: u64) -> Result<World, LevelError> {
    config.validate()?;
    let level = &config.level;
    let mut rng = SimRng::new(seed);

    for attempt in 1..=level.max_attempts {
        let points = scatter(level, &mut rng)?;
        let (mut graph, ids) = connect_nearby(&points, level.radius, config.speeds.crease_ratio())?;
        if !graph.is_connected() {
            log::warn!("level layout {attempt} is disconnected, regenerating");
            continue;
        }

        for (index, &node) in ids.iter().enumerate() {
            if index < level.players as usize {
                graph.set_owner(node, PlayerId(index as u32 + 1))?;
                graph.set_factory(node, true)?;
                graph.set_garrison(node, level.starting_garrison)?;
            }
        }
        if level.random_creases {
            crease_by_index(&mut graph, &ids)?;
        }

        log::info!(
            "generated level with {} nodes and {} edges after {attempt} attempt(s)",
            graph.node_count(),
            graph.edge_count()
        );
        return Ok(World::from_graph(graph, config));
    }

    Err(LevelError::Disconnected {
        attempts: level.max_attempts,
    })
}

/// Draw `level.nodes` points, rejecting candidates closer than `repel` to
/// one already placed.
fn scatter(level: &LevelConfig, rng: &mut SimRng) -> Result<Vec<Point>, LevelError> {
    let min_sq = level.repel * level.repel;
    let mut points: Vec<Point> = Vec::with_capacity(level.nodes);

    while points.len() < level.nodes {
        let placed = (0..PLACEMENT_ATTEMPTS)
            .map(|_| rng.next_point())
            .find(|candidate| points.iter().all(|p| p.distance_squared(candidate) >= min_sq));
        match placed {
            Some(point) => points.push(point),
            None => {
                return Err(LevelError::Crowded {
                    placed: points.len(),
                    repel: level.repel,
                });
            }
        }
    }
    Ok(points)
}

fn connect_nearby(
    points: &[Point],
    radius: f64,
    crease_ratio: f64,
) -> Result<(WorldGraph, Vec<NodeId>), GraphError> {
    let mut graph = WorldGraph::new(crease_ratio);
    let ids: Vec<NodeId> = points
        .iter()
        .map(|&p| graph.add_node_with(NodeData::new(p)))
        .collect();

    let radius_sq = radius * radius;
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if points[i].distance_squared(&points[j]) <= radius_sq {
                graph.connect(ids[i], ids[j])?;
            }
        }
    }
    Ok((graph, ids))
}

/// Crease every edge whose endpoints both sit at an index divisible by 3.
fn crease_by_index(graph: &mut WorldGraph, ids: &[NodeId]) -> Result<(), GraphError> {
    let thirds: Vec<NodeId> = ids.iter().step_by(3).copied().collect();
    for (i, &a) in thirds.iter().enumerate() {
        for &b in &thirds[i + 1..] {
            if graph.edge_between(a, b).is_ok() {
                graph.set_creased(a, b, true)?;
            }
        }
    }
    Ok(())
}
