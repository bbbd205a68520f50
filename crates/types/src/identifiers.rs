//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

slotmap::new_key_type! {
    /// Handle to an action inside its model's arena.
    pub struct ActionId;

    /// Handle to a resource inside its model's arena.
    pub struct ResourceId;
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({:?})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({:?})", self.0)
    }
}

/// Opaque back-pointer the activity layer attaches to an action.
///
/// The kernel never interprets it; it is handed back in state-change
/// notifications so the caller can find its own bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityRef(pub u64);

impl fmt::Display for ActivityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Activity({})", self.0)
    }
}

/// Which resource technology a model (and its resources) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Processors: executions and sleeps.
    Cpu,
    /// Network links: communications.
    Network,
    /// Disks: reads and writes.
    Storage,
}

impl ModelKind {
    /// All model kinds, in the order they are resolved each tick.
    pub const ALL: [ModelKind; 3] = [ModelKind::Cpu, ModelKind::Network, ModelKind::Storage];
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Cpu => write!(f, "cpu"),
            ModelKind::Network => write!(f, "network"),
            ModelKind::Storage => write!(f, "storage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_action_id_display() {
        let mut arena: SlotMap<ActionId, ()> = SlotMap::with_key();
        let id = arena.insert(());
        assert!(id.to_string().starts_with("Action("));
    }

    #[test]
    fn test_model_kind_display() {
        assert_eq!(ModelKind::Cpu.to_string(), "cpu");
        assert_eq!(ModelKind::Network.to_string(), "network");
        assert_eq!(ModelKind::Storage.to_string(), "storage");
    }
}
