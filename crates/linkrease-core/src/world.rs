//! The game world: owns the graph, per-player selections, active fleets,
//! dirty flags and listeners.
//!
//! # Architecture
//!
//! The `World` owns:
//! - A [`WorldGraph`] (nodes = planets, edges = lanes)
//! - Per-player [`Selection`] state (launch source and route target)
//! - The active-fleet registry, stepped in launch order
//! - [`DirtyFlags`] for presentation layers that redraw incrementally
//! - Listener sets for model changes, fleet launches and fleet arrivals
//!
//! All mutation goes through `&mut self`. Listeners are called synchronously
//! with mutable access to the world; see [`crate::event`] for the
//! re-entrancy rules.

use crate::config::{GameConfig, SpeedTable};
use crate::dirty::{DirtyFlag, DirtyFlags};
use crate::event::ListenerSet;
use crate::fleet::{Fleet, FleetStatus};
use crate::geom::Point;
use crate::graph::{EdgeKind, GraphError, NodeData, NodeKind, WorldGraph};
use crate::id::*;
use crate::path;
use crate::sim::{DeployOutcome, FleetArrival, SimState, TickReport};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, VecDeque};

/// General model-change listener. Carries no payload; the world itself is
/// passed so the listener can read fresh state or mutate it.
pub type ModelListener = dyn FnMut(&mut World);

/// Fleet lifecycle listener (launch or arrival). Receives the fleet's id
/// alongside its state.
pub type FleetListener = dyn FnMut(&mut World, FleetId, &Fleet);

/// Errors raised by world operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("fleet not found: {0:?}")]
    FleetNotFound(FleetId),
}

/// A player's launch source and route target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub selected: Option<NodeId>,
    pub targeted: Option<NodeId>,
}

impl Selection {
    /// The `(source, target)` pair when both are set and distinct.
    pub fn route(&self) -> Option<(NodeId, NodeId)> {
        match (self.selected, self.targeted) {
            (Some(source), Some(target)) if source != target => Some((source, target)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct World {
    graph: WorldGraph,
    speeds: SpeedTable,
    default_units: u32,

    selections: BTreeMap<PlayerId, Selection>,

    /// Active fleets.
    fleets: SlotMap<FleetId, Fleet>,
    /// Launch order of active fleets.
    fleet_order: Vec<FleetId>,
    arrival_listeners: SecondaryMap<FleetId, ListenerSet<FleetListener>>,

    listeners: ListenerSet<ModelListener>,
    fleet_listeners: ListenerSet<FleetListener>,
    /// Nesting depth of `with_notifications_suppressed`.
    suppressed: u32,
    /// A model notification was raised while listeners were running.
    renotify: bool,
    /// Launches not yet delivered to fleet listeners.
    pending_launches: VecDeque<(FleetId, Fleet)>,

    dirty: DirtyFlags,
    sim_state: SimState,
}

impl World {
    /// Create an empty world configured by `config`.
    pub fn new(config: &GameConfig) -> Self {
        Self::from_graph(WorldGraph::new(config.speeds.crease_ratio()), config)
    }

    /// Wrap an existing graph. The graph's crease ratio is kept as is.
    pub fn from_graph(graph: WorldGraph, config: &GameConfig) -> Self {
        let mut dirty = DirtyFlags::new();
        dirty.mark_all();
        Self {
            graph,
            speeds: config.speeds,
            default_units: config.default_units,
            selections: BTreeMap::new(),
            fleets: SlotMap::with_key(),
            fleet_order: Vec::new(),
            arrival_listeners: SecondaryMap::new(),
            listeners: ListenerSet::new(),
            fleet_listeners: ListenerSet::new(),
            suppressed: 0,
            renotify: false,
            pending_launches: VecDeque::new(),
            dirty,
            sim_state: SimState::new(),
        }
    }

    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    pub fn speeds(&self) -> &SpeedTable {
        &self.speeds
    }

    pub fn sim_state(&self) -> &SimState {
        &self.sim_state
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Add an unclaimed node.
    pub fn add_node(&mut self, position: Point) -> NodeId {
        self.dirty.mark(DirtyFlag::Nodes);
        self.graph.add_node(position)
    }

    /// Add a node with explicit starting attributes.
    pub fn add_node_with(&mut self, data: NodeData) -> NodeId {
        self.dirty.mark(DirtyFlag::Nodes);
        self.graph.add_node_with(data)
    }

    /// Connect two nodes with a link.
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> Result<EdgeId, GraphError> {
        let edge = self.graph.connect(a, b)?;
        self.dirty.mark(DirtyFlag::Links);
        Ok(edge)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a model-change listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&mut World) + 'static) -> ListenerId {
        self.listeners.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Register a listener for newly launched fleets.
    pub fn subscribe_fleet(
        &mut self,
        listener: impl FnMut(&mut World, FleetId, &Fleet) + 'static,
    ) -> ListenerId {
        self.fleet_listeners.subscribe(Box::new(listener))
    }

    pub fn unsubscribe_fleet(&mut self, id: ListenerId) -> bool {
        self.fleet_listeners.unsubscribe(id)
    }

    /// Register a listener called when the given fleet reaches its target.
    /// It runs after the fleet has left the active set and before its units
    /// are deployed.
    pub fn on_fleet_arrival(
        &mut self,
        fleet: FleetId,
        listener: impl FnMut(&mut World, FleetId, &Fleet) + 'static,
    ) -> Result<ListenerId, WorldError> {
        if !self.fleets.contains_key(fleet) {
            return Err(WorldError::FleetNotFound(fleet));
        }
        let set = self
            .arrival_listeners
            .entry(fleet)
            .ok_or(WorldError::FleetNotFound(fleet))?
            .or_default();
        Ok(set.subscribe(Box::new(listener)))
    }

    pub fn off_fleet_arrival(&mut self, fleet: FleetId, id: ListenerId) -> bool {
        self.arrival_listeners
            .get_mut(fleet)
            .is_some_and(|set| set.unsubscribe(id))
    }

    /// Run `f` with model-change notifications suppressed. Dirty flags are
    /// still raised; the caller decides whether to notify afterwards.
    pub fn with_notifications_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.suppressed += 1;
        let result = f(self);
        self.suppressed -= 1;
        result
    }

    /// Call every model-change listener, unless suppressed.
    ///
    /// A notification raised by a listener while the others are running is
    /// not dropped: once the current pass finishes, every live listener runs
    /// again, until a pass completes without further changes.
    pub fn notify_listeners(&mut self) {
        if self.suppressed > 0 {
            return;
        }
        if self.listeners.is_delivering() {
            self.renotify = true;
            return;
        }
        loop {
            let mut batch = self.listeners.detach();
            for (id, listener) in batch.iter_mut() {
                if self.listeners.is_live(id) {
                    listener(self);
                }
            }
            self.listeners.reattach(batch);
            if !std::mem::take(&mut self.renotify) {
                break;
            }
        }
    }

    /// Deliver a launch to every fleet listener. Launches made by a fleet
    /// listener are queued and delivered in order after the current one.
    fn notify_fleet_listeners(&mut self, id: FleetId, fleet: Fleet) {
        self.pending_launches.push_back((id, fleet));
        if self.fleet_listeners.is_delivering() {
            return;
        }
        while let Some((id, fleet)) = self.pending_launches.pop_front() {
            let mut batch = self.fleet_listeners.detach();
            for (listener_id, listener) in batch.iter_mut() {
                if self.fleet_listeners.is_live(listener_id) {
                    listener(self, id, &fleet);
                }
            }
            self.fleet_listeners.reattach(batch);
        }
    }

    // -----------------------------------------------------------------------
    // Dirty flags
    // -----------------------------------------------------------------------

    /// Read a dirty flag and clear it.
    pub fn take_dirty(&mut self, flag: DirtyFlag) -> bool {
        self.dirty.take(flag)
    }

    /// Read a dirty flag, clearing it only when `clear` is set.
    pub fn dirty_flag(&mut self, flag: DirtyFlag, clear: bool) -> bool {
        if clear {
            self.dirty.take(flag)
        } else {
            self.dirty.is_dirty(flag)
        }
    }

    pub fn is_dirty(&self, flag: DirtyFlag) -> bool {
        self.dirty.is_dirty(flag)
    }

    // -----------------------------------------------------------------------
    // Node attributes
    // -----------------------------------------------------------------------

    pub fn owner(&self, node: NodeId) -> Result<PlayerId, GraphError> {
        self.graph.owner(node)
    }

    pub fn set_owner(&mut self, node: NodeId, player: PlayerId) -> Result<(), GraphError> {
        self.graph.set_owner(node, player)?;
        self.dirty.mark(DirtyFlag::Nodes);
        self.notify_listeners();
        Ok(())
    }

    pub fn garrison(&self, node: NodeId) -> Result<u32, GraphError> {
        self.graph.garrison(node)
    }

    pub fn set_garrison(&mut self, node: NodeId, garrison: u32) -> Result<(), GraphError> {
        self.graph.set_garrison(node, garrison)?;
        self.dirty.mark(DirtyFlag::Nodes);
        self.dirty.mark(DirtyFlag::Units);
        self.notify_listeners();
        Ok(())
    }

    pub fn factory(&self, node: NodeId) -> Result<bool, GraphError> {
        self.graph.factory(node)
    }

    pub fn set_factory(&mut self, node: NodeId, factory: bool) -> Result<(), GraphError> {
        self.graph.set_factory(node, factory)?;
        self.dirty.mark(DirtyFlag::Nodes);
        self.notify_listeners();
        Ok(())
    }

    pub fn node_kind(&self, node: NodeId) -> Result<NodeKind, GraphError> {
        self.graph.node_kind(node)
    }

    pub fn position(&self, node: NodeId) -> Result<Point, GraphError> {
        self.graph.position(node)
    }

    /// Every node with its position, in construction order.
    pub fn positions(&self) -> impl Iterator<Item = (NodeId, Point)> + '_ {
        self.graph.nodes().map(|(id, node)| (id, node.position))
    }

    // -----------------------------------------------------------------------
    // Edge attributes
    // -----------------------------------------------------------------------

    pub fn creased(&self, n1: NodeId, n2: NodeId) -> Result<bool, GraphError> {
        self.graph.creased(n1, n2)
    }

    /// Change an edge's class. The weight is recomputed; fleets pick up the
    /// change at their next hop.
    pub fn set_creased(&mut self, n1: NodeId, n2: NodeId, creased: bool) -> Result<(), GraphError> {
        self.graph.set_creased(n1, n2, creased)?;
        self.dirty.mark(DirtyFlag::Links);
        self.notify_listeners();
        Ok(())
    }

    pub fn weight(&self, n1: NodeId, n2: NodeId) -> Result<f64, GraphError> {
        self.graph.weight(n1, n2)
    }

    pub fn edge_kind(&self, n1: NodeId, n2: NodeId) -> Result<EdgeKind, GraphError> {
        self.graph.edge_kind(n1, n2)
    }

    pub fn highlighted(&self, n1: NodeId, n2: NodeId) -> Result<bool, GraphError> {
        self.graph.highlighted(n1, n2)
    }

    pub fn set_highlight(
        &mut self,
        n1: NodeId,
        n2: NodeId,
        highlighted: bool,
    ) -> Result<(), GraphError> {
        self.graph.set_highlight(n1, n2, highlighted)?;
        self.dirty.mark(DirtyFlag::Links);
        self.notify_listeners();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn shortest_path(&self, source: NodeId, target: NodeId) -> Result<Vec<NodeId>, GraphError> {
        path::shortest_path(&self.graph, source, target)
    }

    /// Nearest node to a point in normalized map space. Ties resolve to the
    /// node constructed last; callers should not rely on tie order.
    pub fn closest_node_to(&self, x: f64, y: f64) -> Option<NodeId> {
        self.graph.closest_node_to(Point::new(x, y))
    }

    pub fn selection(&self, player: PlayerId) -> Selection {
        self.selections.get(&player).copied().unwrap_or_default()
    }

    pub fn selected_node(&self, player: PlayerId) -> Option<NodeId> {
        self.selection(player).selected
    }

    pub fn targeted_node(&self, player: PlayerId) -> Option<NodeId> {
        self.selection(player).targeted
    }

    pub fn nodes_owned_by(&self, player: PlayerId) -> usize {
        self.graph
            .nodes()
            .filter(|(_, node)| node.owner == player)
            .count()
    }

    /// Units stationed on the player's nodes.
    pub fn total_garrison(&self, player: PlayerId) -> u64 {
        self.graph
            .nodes()
            .filter(|(_, node)| node.owner == player)
            .map(|(_, node)| u64::from(node.garrison))
            .sum()
    }

    /// Garrisoned units plus units in flight.
    pub fn total_units(&self, player: PlayerId) -> u64 {
        let flying: u64 = self
            .fleets
            .values()
            .filter(|fleet| fleet.owner() == player)
            .map(|fleet| u64::from(fleet.units()))
            .sum();
        self.total_garrison(player) + flying
    }

    /// The only player still holding nodes or fleets, if exactly one is left.
    pub fn winner(&self) -> Option<PlayerId> {
        let mut alive = self
            .graph
            .nodes()
            .map(|(_, node)| node.owner)
            .chain(self.fleets.values().map(Fleet::owner))
            .filter(|player| !player.is_neutral());
        let first = alive.next()?;
        alive.all(|player| player == first).then_some(first)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Set a player's launch source. With `set_target`, the route target is
    /// reset to the same node, which seeds a drag gesture.
    pub fn select_node(
        &mut self,
        player: PlayerId,
        node: Option<NodeId>,
        set_target: bool,
    ) -> Result<(), GraphError> {
        if let Some(node) = node {
            self.graph.node(node)?;
        }
        self.selections.entry(player).or_default().selected = node;
        if set_target {
            self.target_node(player, node, false)?;
        }
        Ok(())
    }

    /// Point a player's route at `node`. Only a change (or `force`) stores
    /// the target, raises `links` and `nodes`, re-highlights the route and
    /// notifies listeners. Returns whether anything happened.
    pub fn target_node(
        &mut self,
        player: PlayerId,
        node: Option<NodeId>,
        force: bool,
    ) -> Result<bool, GraphError> {
        if let Some(node) = node {
            self.graph.node(node)?;
        }
        let selection = self.selections.entry(player).or_default();
        if !force && selection.targeted == node {
            return Ok(false);
        }
        selection.targeted = node;
        log::trace!("{player:?} targets {node:?}");

        self.dirty.mark(DirtyFlag::Links);
        self.dirty.mark(DirtyFlag::Nodes);
        self.highlight_route(player)?;
        self.notify_listeners();
        Ok(true)
    }

    /// Clear every highlight, then highlight the edges of the player's
    /// current route. Does not notify.
    pub fn highlight_route(&mut self, player: PlayerId) -> Result<(), GraphError> {
        self.graph.clear_highlights();
        self.dirty.mark(DirtyFlag::Links);

        let Some((source, target)) = self.selection(player).route() else {
            return Ok(());
        };
        let route = path::shortest_path(&self.graph, source, target)?;
        for hop in route.windows(2) {
            self.graph.set_highlight(hop[0], hop[1], true)?;
        }
        Ok(())
    }

    /// Resolve `units` of `player` landing on `node`.
    ///
    /// Friendly units reinforce. Hostile units cancel defenders one for one;
    /// the node changes hands only if attackers are left over, and the
    /// survivors become the new garrison. Listeners are notified once.
    pub fn deploy(
        &mut self,
        node: NodeId,
        units: u32,
        player: PlayerId,
    ) -> Result<DeployOutcome, GraphError> {
        let outcome = self.with_notifications_suppressed(|world| -> Result<_, GraphError> {
            let owner = world.owner(node)?;
            let garrison = world.garrison(node)?;

            if player == owner {
                world.set_garrison(node, garrison.saturating_add(units))?;
                return Ok(DeployOutcome::Reinforced);
            }

            let remaining = i64::from(garrison) - i64::from(units);
            if remaining < 0 {
                let survivors = u32::try_from(-remaining).unwrap_or(u32::MAX);
                world.set_owner(node, player)?;
                world.set_garrison(node, survivors)?;
                log::info!("{player:?} captured {node:?} from {owner:?}, {survivors} units left");
                Ok(DeployOutcome::Captured {
                    previous_owner: owner,
                })
            } else {
                let survivors = u32::try_from(remaining).unwrap_or(u32::MAX);
                world.set_garrison(node, survivors)?;
                Ok(DeployOutcome::Repelled)
            }
        })?;
        self.notify_listeners();
        Ok(outcome)
    }

    /// Launch a fleet along the player's current route.
    ///
    /// No-op (`Ok(None)`) unless the player has a selected node and a
    /// distinct targeted node. `units` defaults to the configured fleet size;
    /// an empty fleet is never launched.
    pub fn move_units_to_target(
        &mut self,
        player: PlayerId,
        units: Option<u32>,
    ) -> Result<Option<FleetId>, GraphError> {
        let Some((source, target)) = self.selection(player).route() else {
            return Ok(None);
        };
        let units = units.unwrap_or(self.default_units);
        if units == 0 {
            log::debug!("{player:?} tried to launch an empty fleet from {source:?}");
            return Ok(None);
        }
        let fleet = Fleet::launch(&self.graph, units, player, source, target)?;
        let id = self.fleets.insert(fleet.clone());
        self.fleet_order.push(id);
        self.dirty.mark(DirtyFlag::Units);
        log::debug!("{player:?} launched {id:?} with {units} units from {source:?} to {target:?}");

        self.notify_listeners();
        self.notify_fleet_listeners(id, fleet);
        Ok(Some(id))
    }

    // -----------------------------------------------------------------------
    // Fleets
    // -----------------------------------------------------------------------

    pub fn fleet(&self, id: FleetId) -> Option<&Fleet> {
        self.fleets.get(id)
    }

    /// Active fleets in launch order.
    pub fn fleets(&self) -> impl Iterator<Item = (FleetId, &Fleet)> {
        self.fleet_order
            .iter()
            .filter_map(|&id| self.fleets.get(id).map(|fleet| (id, fleet)))
    }

    pub fn active_fleet_count(&self) -> usize {
        self.fleets.len()
    }

    /// Interpolated position of an active fleet.
    pub fn fleet_position(&self, id: FleetId) -> Result<Point, WorldError> {
        let fleet = self.fleets.get(id).ok_or(WorldError::FleetNotFound(id))?;
        Ok(fleet.position(&self.graph)?)
    }

    /// Advance one fleet by `dt`. Returns the arrival if it reached its
    /// target.
    pub fn step_fleet(&mut self, id: FleetId, dt: f64) -> Result<Option<FleetArrival>, WorldError> {
        let fleet = self.fleets.get_mut(id).ok_or(WorldError::FleetNotFound(id))?;
        let status = fleet.step_time(&self.graph, &self.speeds, dt)?;
        self.dirty.mark(DirtyFlag::Positions);

        match status {
            FleetStatus::Traveling => Ok(None),
            FleetStatus::Arrived => self.arrive(id).map(Some),
        }
    }

    /// Advance every active fleet by `dt`, in launch order. Fleets launched
    /// by listeners during this tick start moving on the next one.
    pub fn tick(&mut self, dt: f64) -> Result<TickReport, WorldError> {
        let mut report = TickReport::default();
        let order = self.fleet_order.clone();
        for id in order {
            if !self.fleets.contains_key(id) {
                continue;
            }
            report.fleets_stepped += 1;
            if let Some(arrival) = self.step_fleet(id, dt)? {
                report.arrivals.push(arrival);
            }
        }
        self.sim_state.advance(dt);
        Ok(report)
    }

    /// Drop the fleet, notify its arrival listeners, then deploy its units.
    /// The fleet is gone before any listener runs, so a listener cannot
    /// step or arrive it a second time.
    fn arrive(&mut self, id: FleetId) -> Result<FleetArrival, WorldError> {
        let fleet = self.fleets.remove(id).ok_or(WorldError::FleetNotFound(id))?;
        self.fleet_order.retain(|&active| active != id);
        self.dirty.mark(DirtyFlag::Units);
        log::debug!("{id:?} of {:?} arrived at {:?}", fleet.owner(), fleet.target());

        if let Some(mut set) = self.arrival_listeners.remove(id) {
            let mut batch = set.detach();
            for (_, listener) in batch.iter_mut() {
                listener(self, id, &fleet);
            }
        }

        let outcome = self.deploy(fleet.target(), fleet.units(), fleet.owner())?;
        Ok(FleetArrival { id, fleet, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);

    // a - b - c - d in a row, 0.2 apart.
    fn row() -> (World, [NodeId; 4]) {
        let mut world = World::new(&GameConfig::default());
        let ids: Vec<NodeId> = (0..4)
            .map(|i| world.add_node(Point::new(0.1 + 0.2 * f64::from(i), 0.5)))
            .collect();
        for hop in ids.windows(2) {
            world.connect(hop[0], hop[1]).unwrap();
        }
        (world, [ids[0], ids[1], ids[2], ids[3]])
    }

    fn counter(world: &mut World) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        world.subscribe(move |_| seen.set(seen.get() + 1));
        count
    }

    #[test]
    fn new_world_is_dirty_everywhere() {
        let (mut world, _) = row();
        for flag in DirtyFlag::ALL {
            assert!(world.take_dirty(flag));
            assert!(!world.take_dirty(flag));
        }
    }

    #[test]
    fn dirty_flag_can_peek() {
        let (mut world, _) = row();
        assert!(world.dirty_flag(DirtyFlag::Nodes, false));
        assert!(world.dirty_flag(DirtyFlag::Nodes, true));
        assert!(!world.dirty_flag(DirtyFlag::Nodes, true));
    }

    #[test]
    fn set_garrison_raises_nodes_and_units() {
        let (mut world, [a, ..]) = row();
        for flag in DirtyFlag::ALL {
            world.take_dirty(flag);
        }
        world.set_garrison(a, 7).unwrap();
        assert_eq!(world.garrison(a).unwrap(), 7);
        assert!(world.take_dirty(DirtyFlag::Nodes));
        assert!(world.take_dirty(DirtyFlag::Units));
        assert!(!world.is_dirty(DirtyFlag::Links));
    }

    #[test]
    fn setters_notify_unless_suppressed() {
        let (mut world, [a, b, ..]) = row();
        let count = counter(&mut world);

        world.set_owner(a, P1).unwrap();
        world.set_factory(a, true).unwrap();
        world.set_creased(a, b, true).unwrap();
        assert_eq!(count.get(), 3);

        world.with_notifications_suppressed(|w| {
            w.set_owner(b, P1).unwrap();
            w.set_garrison(b, 3).unwrap();
        });
        assert_eq!(count.get(), 3);
        assert_eq!(world.owner(b).unwrap(), P1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let (mut world, [a, ..]) = row();
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        let id = world.subscribe(move |_| seen.set(seen.get() + 1));

        world.set_owner(a, P1).unwrap();
        assert!(world.unsubscribe(id));
        world.set_owner(a, P2).unwrap();
        assert_eq!(count.get(), 1);
        assert!(!world.unsubscribe(id));
    }

    #[test]
    fn listener_can_read_fresh_state_and_mutate() {
        let (mut world, [a, b, ..]) = row();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        world.subscribe(move |w| {
            let owner = w.owner(a).unwrap();
            log.borrow_mut().push(owner);
            // A rule that mirrors ownership of a onto b.
            if w.owner(b).unwrap() != owner {
                w.set_owner(b, owner).unwrap();
            }
        });

        world.set_owner(a, P1).unwrap();
        // The mirrored write is delivered as a second pass.
        assert_eq!(*seen.borrow(), vec![P1, P1]);
        assert_eq!(world.owner(b).unwrap(), P1);
    }

    #[test]
    fn listener_that_already_ran_hears_later_changes() {
        let (mut world, [a, b, ..]) = row();
        let cached = Rc::new(Cell::new(None));
        let cache = Rc::clone(&cached);
        world.subscribe(move |w| cache.set(Some(w.garrison(b).unwrap())));
        world.subscribe(move |w| {
            if w.garrison(b).unwrap() != 99 {
                w.set_garrison(b, 99).unwrap();
            }
        });

        world.set_garrison(a, 5).unwrap();
        assert_eq!(world.garrison(b).unwrap(), 99);
        assert_eq!(cached.get(), Some(99));
    }

    #[test]
    fn nested_changes_coalesce_into_one_extra_pass() {
        let (mut world, [a, b, c, _]) = row();
        let count = counter(&mut world);
        world.subscribe(move |w| {
            if w.owner(b).unwrap() != P1 {
                w.set_owner(b, P1).unwrap();
                w.set_owner(c, P1).unwrap();
            }
        });

        world.set_owner(a, P1).unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn listener_can_unsubscribe_itself() {
        let (mut world, [a, ..]) = row();
        let count = Rc::new(Cell::new(0));
        let handle: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let (seen, me) = (Rc::clone(&count), Rc::clone(&handle));
        let id = world.subscribe(move |w| {
            seen.set(seen.get() + 1);
            if let Some(id) = me.get() {
                w.unsubscribe(id);
            }
        });
        handle.set(Some(id));

        world.set_owner(a, P1).unwrap();
        world.set_owner(a, P2).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn select_with_target_seeds_both() {
        let (mut world, [a, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        assert_eq!(world.selected_node(P1), Some(a));
        assert_eq!(world.targeted_node(P1), Some(a));
        assert_eq!(world.selected_node(P2), None);
    }

    #[test]
    fn select_without_target_keeps_old_target() {
        let (mut world, [a, b, ..]) = row();
        world.target_node(P1, Some(b), false).unwrap();
        world.select_node(P1, Some(a), false).unwrap();
        assert_eq!(world.selection(P1), Selection {
            selected: Some(a),
            targeted: Some(b),
        });
    }

    #[test]
    fn retargeting_same_node_is_a_no_op() {
        let (mut world, [a, _, c, _]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        let count = counter(&mut world);
        world.take_dirty(DirtyFlag::Links);

        assert!(world.target_node(P1, Some(c), false).unwrap());
        assert!(world.take_dirty(DirtyFlag::Links));
        assert!(!world.target_node(P1, Some(c), false).unwrap());
        assert!(!world.is_dirty(DirtyFlag::Links));
        assert_eq!(count.get(), 1);

        assert!(world.target_node(P1, Some(c), true).unwrap());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn targeting_highlights_route_only() {
        let (mut world, [a, b, c, d]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(c), false).unwrap();

        assert!(world.highlighted(a, b).unwrap());
        assert!(world.highlighted(b, c).unwrap());
        assert!(!world.highlighted(c, d).unwrap());

        // Pulling the target back clears the old tail.
        world.target_node(P1, Some(b), false).unwrap();
        assert!(world.highlighted(a, b).unwrap());
        assert!(!world.highlighted(b, c).unwrap());

        // Targeting the selection itself clears everything.
        world.target_node(P1, Some(a), false).unwrap();
        assert!(world.graph().edges().all(|(_, e)| !e.highlighted));
    }

    #[test]
    fn unknown_node_is_rejected() {
        let (mut world, _) = row();
        let (mut other, _) = row();
        let stranger = other.add_node(Point::new(0.0, 0.0));
        assert_eq!(
            world.select_node(P1, Some(stranger), true),
            Err(GraphError::NodeNotFound(stranger))
        );
        assert_eq!(world.owner(stranger), Err(GraphError::NodeNotFound(stranger)));
    }

    #[test]
    fn deploy_capture_arithmetic() {
        let (mut world, [a, b, c, _]) = row();
        for (node, units) in [(a, 15), (b, 7), (c, 10)] {
            world.set_owner(node, P2).unwrap();
            world.set_garrison(node, 10).unwrap();
            let outcome = world.deploy(node, units, P1).unwrap();
            match units {
                15 => {
                    assert_eq!(outcome, DeployOutcome::Captured { previous_owner: P2 });
                    assert_eq!(world.owner(node).unwrap(), P1);
                    assert_eq!(world.garrison(node).unwrap(), 5);
                }
                7 => {
                    assert_eq!(outcome, DeployOutcome::Repelled);
                    assert_eq!(world.owner(node).unwrap(), P2);
                    assert_eq!(world.garrison(node).unwrap(), 3);
                }
                _ => {
                    // An exact tie wipes the garrison out but does not flip ownership.
                    assert_eq!(outcome, DeployOutcome::Repelled);
                    assert_eq!(world.owner(node).unwrap(), P2);
                    assert_eq!(world.garrison(node).unwrap(), 0);
                }
            }
        }
    }

    #[test]
    fn deploy_reinforces_own_node() {
        let (mut world, [a, ..]) = row();
        world.set_owner(a, P1).unwrap();
        world.set_garrison(a, 4).unwrap();
        assert_eq!(world.deploy(a, 5, P1).unwrap(), DeployOutcome::Reinforced);
        assert_eq!(world.garrison(a).unwrap(), 9);
        assert_eq!(world.owner(a).unwrap(), P1);
    }

    #[test]
    fn deploy_notifies_once() {
        let (mut world, [a, ..]) = row();
        world.set_garrison(a, 1).unwrap();
        let count = counter(&mut world);
        world.deploy(a, 3, P1).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn move_without_selection_is_a_no_op() {
        let (mut world, [a, ..]) = row();
        assert_eq!(world.move_units_to_target(P1, None).unwrap(), None);

        world.select_node(P1, Some(a), true).unwrap();
        assert_eq!(world.move_units_to_target(P1, None).unwrap(), None);
        assert_eq!(world.active_fleet_count(), 0);
    }

    #[test]
    fn move_launches_fleet_and_notifies() {
        let (mut world, [a, b, _, d]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(d), false).unwrap();
        world.take_dirty(DirtyFlag::Units);

        let general = counter(&mut world);
        let launched = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&launched);
        world.subscribe_fleet(move |_, id, fleet| log.borrow_mut().push((id, fleet.clone())));

        let id = world.move_units_to_target(P1, None).unwrap().unwrap();
        let fleet = world.fleet(id).unwrap();
        assert_eq!(fleet.units(), 1);
        assert_eq!(fleet.owner(), P1);
        assert_eq!(fleet.source(), a);
        assert_eq!(fleet.next(), b);
        assert_eq!(fleet.target(), d);

        assert!(world.take_dirty(DirtyFlag::Units));
        assert_eq!(general.get(), 1);
        assert_eq!(launched.borrow().len(), 1);
        assert_eq!(launched.borrow()[0].0, id);
        assert_eq!(launched.borrow()[0].1.target(), d);
    }

    #[test]
    fn move_with_explicit_units() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, Some(4)).unwrap().unwrap();
        assert_eq!(world.fleet(id).unwrap().units(), 4);
    }

    #[test]
    fn empty_fleet_is_not_launched() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        world.take_dirty(DirtyFlag::Units);
        let count = counter(&mut world);

        assert_eq!(world.move_units_to_target(P1, Some(0)).unwrap(), None);
        assert_eq!(world.active_fleet_count(), 0);
        assert!(!world.is_dirty(DirtyFlag::Units));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn tick_moves_fleet_and_deploys_on_arrival() {
        let (mut world, [a, b, ..]) = row();
        world.set_garrison(b, 2).unwrap();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, Some(3)).unwrap().unwrap();

        let report = world.tick(1.0).unwrap();
        assert_eq!(report.fleets_stepped, 1);
        assert!(report.arrivals.is_empty());
        assert!(world.take_dirty(DirtyFlag::Positions));
        let pos = world.fleet_position(id).unwrap();
        assert!((pos.x - 0.16).abs() < 1e-9);

        // 0.2 at 0.06/s takes 3.33s in total.
        let report = world.tick(3.0).unwrap();
        assert_eq!(report.arrivals.len(), 1);
        assert_eq!(report.arrivals[0].id, id);
        assert_eq!(
            report.arrivals[0].outcome,
            DeployOutcome::Captured {
                previous_owner: PlayerId::NEUTRAL
            }
        );
        assert_eq!(world.owner(b).unwrap(), P1);
        assert_eq!(world.garrison(b).unwrap(), 1);
        assert_eq!(world.active_fleet_count(), 0);
        assert!(world.fleet(id).is_none());
        assert_eq!(world.fleet_position(id), Err(WorldError::FleetNotFound(id)));
        assert_eq!(world.sim_state().tick, 2);
    }

    #[test]
    fn arrival_listener_runs_after_removal_before_deploy() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, None).unwrap().unwrap();

        let observed = Rc::new(Cell::new(None));
        let slot = Rc::clone(&observed);
        world
            .on_fleet_arrival(id, move |w, arrived, fleet| {
                // Already unregistered, garrison not yet resolved.
                slot.set(Some((
                    arrived == id,
                    w.fleet(arrived).is_some(),
                    w.garrison(fleet.target()).unwrap(),
                )));
            })
            .unwrap();

        world.tick(10.0).unwrap();
        assert_eq!(observed.get(), Some((true, false, 0)));
        assert_eq!(world.owner(b).unwrap(), P1);
    }

    #[test]
    fn arrival_listener_cannot_arrive_its_fleet_twice() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, Some(3)).unwrap().unwrap();

        let restep = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&restep);
        world
            .on_fleet_arrival(id, move |w, arrived, _| {
                *slot.borrow_mut() = Some(w.step_fleet(arrived, 1.0).map(|a| a.is_some()));
            })
            .unwrap();

        let report = world.tick(10.0).unwrap();
        assert_eq!(report.arrivals.len(), 1);
        assert_eq!(*restep.borrow(), Some(Err(WorldError::FleetNotFound(id))));
        assert_eq!(world.garrison(b).unwrap(), 3);
    }

    #[test]
    fn arrival_listener_can_be_removed() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, None).unwrap().unwrap();

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let listener = world.on_fleet_arrival(id, move |_, _, _| flag.set(true)).unwrap();
        assert!(world.off_fleet_arrival(id, listener));
        world.tick(10.0).unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn identical_launches_get_their_own_arrival_listeners() {
        let (mut world, [a, b, ..]) = row();
        let arrivals = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&arrivals);
        world.subscribe_fleet(move |w, id, _| {
            let log = Rc::clone(&log);
            w.on_fleet_arrival(id, move |_, arrived, _| log.borrow_mut().push(arrived))
                .unwrap();
        });

        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let first = world.move_units_to_target(P1, None).unwrap().unwrap();
        let second = world.move_units_to_target(P1, None).unwrap().unwrap();
        assert_eq!(world.fleet(first), world.fleet(second));

        world.tick(10.0).unwrap();
        assert_eq!(*arrivals.borrow(), vec![first, second]);
    }

    #[test]
    fn fleets_step_in_launch_order() {
        let (mut world, [a, b, c, d]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let first = world.move_units_to_target(P1, None).unwrap().unwrap();
        world.select_node(P2, Some(d), true).unwrap();
        world.target_node(P2, Some(c), false).unwrap();
        let second = world.move_units_to_target(P2, None).unwrap().unwrap();

        let order: Vec<FleetId> = world.fleets().map(|(id, _)| id).collect();
        assert_eq!(order, vec![first, second]);

        let report = world.tick(10.0).unwrap();
        let arrived: Vec<FleetId> = report.arrivals.iter().map(|a| a.id).collect();
        assert_eq!(arrived, vec![first, second]);
    }

    #[test]
    fn step_unknown_fleet_fails() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, None).unwrap().unwrap();
        world.tick(10.0).unwrap();
        assert_eq!(world.step_fleet(id, 1.0), Err(WorldError::FleetNotFound(id)));
        assert!(world.on_fleet_arrival(id, |_, _, _| {}).is_err());
    }

    #[test]
    fn step_just_short_of_hop_does_not_arrive() {
        let (mut world, [a, b, ..]) = row();
        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        let id = world.move_units_to_target(P1, None).unwrap().unwrap();

        let hop = world.weight(a, b).unwrap() / world.speeds().link;
        assert!(world.step_fleet(id, hop - 1e-8).unwrap().is_none());
        assert!(world.fleet(id).is_some());
        assert!(world.step_fleet(id, 1e-8).unwrap().is_some());
        assert!(world.fleet(id).is_none());
    }

    #[test]
    fn winner_and_unit_totals() {
        let (mut world, [a, b, c, _]) = row();
        assert_eq!(world.winner(), None);

        world.set_owner(a, P1).unwrap();
        world.set_garrison(a, 10).unwrap();
        world.set_owner(c, P2).unwrap();
        world.set_garrison(c, 1).unwrap();
        assert_eq!(world.winner(), None);
        assert_eq!(world.nodes_owned_by(P1), 1);
        assert_eq!(world.nodes_owned_by(PlayerId::NEUTRAL), 2);

        world.select_node(P1, Some(a), true).unwrap();
        world.target_node(P1, Some(b), false).unwrap();
        world.move_units_to_target(P1, Some(2)).unwrap();
        assert_eq!(world.total_garrison(P1), 10);
        assert_eq!(world.total_units(P1), 12);

        world.deploy(c, 5, P1).unwrap();
        assert_eq!(world.winner(), Some(P1));
    }
}
