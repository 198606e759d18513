//! Linkrease Core -- the simulation core of a graph-based territory-conquest
//! game.
//!
//! Planets are nodes of an undirected graph, owned by players and holding a
//! garrison of units. Lanes between planets come in two speed classes: plain
//! links and faster creases. Players launch fleets that travel hop by hop
//! along the current shortest path and fight the garrison they land on.
//!
//! # Frame Loop
//!
//! A host drives the core once per frame:
//!
//! 1. **Input** -- Pointer gestures become `select` / `target` / `move`
//!    commands (see [`input::PointerController`]).
//! 2. **Tick** -- [`world::World::tick`] advances every active fleet in
//!    launch order. Arriving fleets leave the world, notify their arrival
//!    listeners, and deploy onto their target.
//! 3. **Redraw** -- The host consumes [`dirty::DirtyFlag`]s and redraws only
//!    what changed.
//!
//! ```rust
//! use linkrease_core::config::GameConfig;
//! use linkrease_core::geom::Point;
//! use linkrease_core::id::PlayerId;
//! use linkrease_core::world::World;
//!
//! let mut world = World::new(&GameConfig::default());
//! let home = world.add_node(Point::new(0.2, 0.5));
//! let away = world.add_node(Point::new(0.4, 0.5));
//! world.connect(home, away).unwrap();
//! world.set_owner(home, PlayerId(1)).unwrap();
//!
//! world.select_node(PlayerId(1), Some(home), true).unwrap();
//! world.target_node(PlayerId(1), Some(away), false).unwrap();
//! world.move_units_to_target(PlayerId(1), None).unwrap();
//!
//! let report = world.tick(10.0).unwrap();
//! assert_eq!(report.arrivals.len(), 1);
//! assert_eq!(world.owner(away).unwrap(), PlayerId(1));
//! ```
//!
//! # Key Types
//!
//! - [`world::World`] -- Owns all state and exposes every command.
//! - [`graph::WorldGraph`] -- Node and edge storage with live edge weights.
//! - [`fleet::Fleet`] -- A group of units in flight.
//! - [`path::RouteView`] -- Read-only routing capability fleets move through.
//! - [`event::ListenerSet`] -- Handle-based, re-entrant listener registry.
//! - [`level::generate_level`] -- Seeded random level generator.
//! - [`config::GameConfig`] -- Speeds, level parameters, TOML loading.

pub mod config;
pub mod dirty;
pub mod event;
pub mod fleet;
pub mod geom;
pub mod graph;
pub mod id;
pub mod input;
pub mod level;
pub mod path;
pub mod rng;
pub mod sim;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
