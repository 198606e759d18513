//! Pointer gestures mapped onto world commands.
//!
//! Coordinates are in the world's normalized `[0,1]²` space; converting from
//! screen pixels is the caller's job.

use crate::graph::GraphError;
use crate::id::{FleetId, NodeId, PlayerId};
use crate::world::World;

/// Press-drag-release controller for one player.
///
/// Pressing on an owned node selects it, dragging points the route at the
/// node nearest the pointer, and releasing launches a fleet if the route
/// leads somewhere. The controller holds no state of its own; selection
/// lives in the [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerController {
    player: PlayerId,
}

impl PointerController {
    pub fn new(player: PlayerId) -> Self {
        Self { player }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Select the node nearest `(x, y)` if the player owns it. Returns the
    /// selected node.
    pub fn press(&self, world: &mut World, x: f64, y: f64) -> Result<Option<NodeId>, GraphError> {
        if self.player.is_neutral() {
            return Ok(None);
        }
        let Some(node) = world.closest_node_to(x, y) else {
            return Ok(None);
        };
        if world.owner(node)? != self.player {
            return Ok(None);
        }
        world.select_node(self.player, Some(node), true)?;
        Ok(Some(node))
    }

    /// Retarget to the node nearest `(x, y)` while a node is selected.
    /// Returns whether the target changed.
    pub fn drag(&self, world: &mut World, x: f64, y: f64) -> Result<bool, GraphError> {
        if world.selected_node(self.player).is_none() {
            return Ok(false);
        }
        match world.closest_node_to(x, y) {
            Some(node) => world.target_node(self.player, Some(node), false),
            None => Ok(false),
        }
    }

    /// Launch along the current route, if any, then drop the selection.
    pub fn release(&self, world: &mut World) -> Result<Option<FleetId>, GraphError> {
        let launched = world.move_units_to_target(self.player, None)?;
        world.select_node(self.player, None, true)?;
        Ok(launched)
    }
}
