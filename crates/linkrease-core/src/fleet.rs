//! In-flight unit groups.
//!
//! A [`Fleet`] is plain data: it moves through the world by querying a
//! [`RouteView`] and never holds a reference back to the world. The
//! [`World`](crate::world::World) owns every active fleet and resolves
//! arrival.

use crate::config::SpeedTable;
use crate::geom::Point;
use crate::graph::GraphError;
use crate::id::{NodeId, PlayerId};
use crate::path::RouteView;

/// Rounding slack when deciding whether a hop has been completed, as a
/// fraction of the hop's weight.
pub const ARRIVAL_TOLERANCE: f64 = 64.0 * f64::EPSILON;

/// Where a fleet is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetStatus {
    Traveling,
    /// At the target. Terminal: the world removes the fleet and deploys it.
    Arrived,
}

/// A group of units travelling hop by hop along a shortest path.
#[derive(Debug, Clone, PartialEq)]
pub struct Fleet {
    units: u32,
    owner: PlayerId,
    /// Node most recently left (or reached, once arrived).
    source: NodeId,
    /// Node being travelled towards. Equal to `source` once arrived.
    next: NodeId,
    target: NodeId,
    /// Distance covered since leaving `source`.
    distance_from_prev: f64,
    /// Weight of the current hop.
    jump_distance: f64,
}

impl Fleet {
    /// Start a fleet at `source` headed for `target`.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoPath`] if `target` cannot be reached. Launching with
    /// `source == target` produces a fleet that arrives on its first step.
    pub fn launch(
        view: &impl RouteView,
        units: u32,
        owner: PlayerId,
        source: NodeId,
        target: NodeId,
    ) -> Result<Self, GraphError> {
        let path = view.shortest_path(source, target)?;
        let (next, jump_distance) = match path.get(1) {
            Some(&next) => (next, view.weight(source, next)?),
            None => (source, 0.0),
        };
        Ok(Self {
            units,
            owner,
            source,
            next,
            target,
            distance_from_prev: 0.0,
            jump_distance,
        })
    }

    pub fn units(&self) -> u32 {
        self.units
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn next(&self) -> NodeId {
        self.next
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn distance_from_prev(&self) -> f64 {
        self.distance_from_prev
    }

    pub fn jump_distance(&self) -> f64 {
        self.jump_distance
    }

    pub fn status(&self) -> FleetStatus {
        if self.source == self.next {
            FleetStatus::Arrived
        } else {
            FleetStatus::Traveling
        }
    }

    /// Advance by `dt` seconds.
    ///
    /// Speed depends on the class of the edge being travelled. When a hop
    /// completes, the next node comes from a fresh shortest-path query, so
    /// weight changes made mid-flight re-route the fleet. Time left over
    /// after a hop carries into the next one at that hop's speed, so a large
    /// `dt` can cross several hops.
    pub fn step_time(
        &mut self,
        view: &impl RouteView,
        speeds: &SpeedTable,
        mut dt: f64,
    ) -> Result<FleetStatus, GraphError> {
        while dt > 0.0 && self.source != self.next {
            let speed = speeds.speed(view.edge_kind(self.source, self.next)?);
            let remaining = self.jump_distance - self.distance_from_prev;
            let travel = speed * dt;
            let slack = self.jump_distance.abs() * ARRIVAL_TOLERANCE;

            if travel + slack >= remaining {
                dt -= remaining.max(0.0) / speed;
                self.source = self.next;
                self.distance_from_prev = 0.0;

                let path = view.shortest_path(self.source, self.target)?;
                match path.get(1) {
                    Some(&next) => {
                        self.next = next;
                        self.jump_distance = view.weight(self.source, next)?;
                    }
                    None => {
                        self.jump_distance = 0.0;
                        break;
                    }
                }
            } else {
                self.distance_from_prev += travel;
                dt = 0.0;
            }
        }
        Ok(self.status())
    }

    /// Interpolated position along the current hop.
    pub fn position(&self, view: &impl RouteView) -> Result<Point, GraphError> {
        let from = view.position(self.source)?;
        if self.source == self.next || self.jump_distance <= 0.0 {
            return Ok(from);
        }
        let to = view.position(self.next)?;
        Ok(from.lerp(&to, self.distance_from_prev / self.jump_distance))
    }
}
