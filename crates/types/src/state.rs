//! Lifecycle enums shared by the kernel and its callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an action.
///
/// ```text
/// Inited ──start──► Started ──┬──► Finished
///                             └──► Failed
/// Ignored ──cancel──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    /// Created but not yet activated; receives no share.
    Inited,
    /// Running (possibly suspended or sleeping).
    Started,
    /// Terminated by resource failure or cancellation.
    Failed,
    /// Terminated by work exhaustion or deadline.
    Finished,
    /// Excluded from failure detection (infinite sleeps).
    Ignored,
}

impl ActionState {
    /// Every state, in bucket order.
    pub const ALL: [ActionState; 5] = [
        ActionState::Inited,
        ActionState::Started,
        ActionState::Failed,
        ActionState::Finished,
        ActionState::Ignored,
    ];

    /// Position of this state's bucket.
    pub fn index(self) -> usize {
        match self {
            ActionState::Inited => 0,
            ActionState::Started => 1,
            ActionState::Failed => 2,
            ActionState::Finished => 3,
            ActionState::Ignored => 4,
        }
    }

    /// `Finished` or `Failed`. No transition leaves these.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::Finished | ActionState::Failed)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionState::Inited => "inited",
            ActionState::Started => "started",
            ActionState::Failed => "failed",
            ActionState::Finished => "finished",
            ActionState::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

/// Suspension sub-state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SuspendState {
    #[default]
    NotSuspended,
    Suspended,
    /// Idle wait. Suspend and resume are no-ops on a sleeping action.
    Sleeping,
}

/// Why an action sits in the event heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapEntryKind {
    /// Latency has been paid; the real weight applies from this date.
    Latency,
    /// Explicit deadline.
    MaxDuration,
    /// Projected work completion.
    Normal,
    /// No outstanding entry.
    #[default]
    Unset,
}

/// How a model detects state changes of its running actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAlgorithm {
    /// Scan every running action each tick.
    Full,
    /// Wake actions up from the event heap.
    #[default]
    Lazy,
}

impl fmt::Display for UpdateAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateAlgorithm::Full => write!(f, "full"),
            UpdateAlgorithm::Lazy => write!(f, "lazy"),
        }
    }
}
