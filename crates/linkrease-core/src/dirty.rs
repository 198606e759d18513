/// A category of model state a presentation layer redraws independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyFlag {
    /// Node ownership, garrison, or kind changed.
    Nodes,
    /// Edge class or highlight changed.
    Links,
    /// Fleets launched or garrisons changed.
    Units,
    /// Fleet positions moved.
    Positions,
}

impl DirtyFlag {
    pub const ALL: [DirtyFlag; 4] = [
        DirtyFlag::Nodes,
        DirtyFlag::Links,
        DirtyFlag::Units,
        DirtyFlag::Positions,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Tracks which categories changed since a reader last consumed them.
///
/// Mutators call [`mark`](DirtyFlags::mark); a renderer calls
/// [`take`](DirtyFlags::take) once per frame, which reports and clears the
/// flag so each change batch is consumed at most once.
#[derive(Debug, Clone, Default)]
pub struct DirtyFlags {
    flags: [bool; 4],
}

impl DirtyFlags {
    /// Create a new tracker with nothing dirty.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, flag: DirtyFlag) {
        self.flags[flag.index()] = true;
    }

    pub fn mark_all(&mut self) {
        self.flags = [true; 4];
    }

    /// Read a flag without clearing it.
    pub fn is_dirty(&self, flag: DirtyFlag) -> bool {
        self.flags[flag.index()]
    }

    /// Read a flag and clear it.
    pub fn take(&mut self, flag: DirtyFlag) -> bool {
        std::mem::take(&mut self.flags[flag.index()])
    }

    pub fn any_dirty(&self) -> bool {
        self.flags.iter().any(|&d| d)
    }

    pub fn clear_all(&mut self) {
        self.flags = [false; 4];
    }
}
