use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node (planet or factory) in the world graph.
    pub struct NodeId;

    /// Identifies an undirected edge (link or crease) in the world graph.
    pub struct EdgeId;

    /// Identifies an in-flight fleet in the world's active-fleet registry.
    pub struct FleetId;
}

/// Identifies a player. Cheap to copy and compare.
///
/// [`PlayerId::NEUTRAL`] owns every unclaimed node and never issues commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl PlayerId {
    /// The sentinel owner of unclaimed nodes.
    pub const NEUTRAL: PlayerId = PlayerId(0);

    /// Returns `true` for the neutral sentinel.
    pub fn is_neutral(self) -> bool {
        self == Self::NEUTRAL
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Handle returned by listener registration, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);
