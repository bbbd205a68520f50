//! Actions: units of work progressing on resources.

use crate::bucket::{BucketLink, BucketMember};
use crate::heap::HeapHandle;
use ressim_lmm::VariableId;
use ressim_types::{
    double_update, ActionState, ActivityRef, HeapEntryKind, Precision, ResourceId, SuspendState,
};

/// Direction of a disk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOp {
    Read,
    Write,
}

/// What an action is doing, and on which resources.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Computation on a processor.
    Execution {
        host: ResourceId,
        requested_cores: u32,
    },
    /// Idle wait on a processor.
    Sleep { host: ResourceId },
    /// Transfer along a route of links.
    Communication {
        route: Vec<ResourceId>,
        /// Latency left to pay before the transfer receives bandwidth.
        latency: f64,
        /// User-requested rate cap.
        rate: Option<f64>,
    },
    /// Read or write on a disk.
    Io { disk: ResourceId, op: IoOp },
}

impl ActionKind {
    /// Resources this action is bound to.
    pub fn resources(&self) -> &[ResourceId] {
        match self {
            ActionKind::Execution { host, .. } | ActionKind::Sleep { host } => {
                std::slice::from_ref(host)
            }
            ActionKind::Communication { route, .. } => route,
            ActionKind::Io { disk, .. } => std::slice::from_ref(disk),
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, ActionKind::Communication { .. })
    }

    /// A communication over no link: it completes once its latency is paid.
    pub fn is_routeless(&self) -> bool {
        matches!(self, ActionKind::Communication { route, .. } if route.is_empty())
    }

    /// Latency still to be paid (zero for non-communications).
    pub fn latency(&self) -> f64 {
        match self {
            ActionKind::Communication { latency, .. } => *latency,
            _ => 0.0,
        }
    }

    pub(crate) fn latency_mut(&mut self) -> Option<&mut f64> {
        match self {
            ActionKind::Communication { latency, .. } => Some(latency),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Execution { .. } => "execution",
            ActionKind::Sleep { .. } => "sleep",
            ActionKind::Communication { .. } => "communication",
            ActionKind::Io { op: IoOp::Read, .. } => "read",
            ActionKind::Io { op: IoOp::Write, .. } => "write",
        }
    }
}

/// A unit of work owned by a [`Model`](crate::Model).
///
/// Read access goes through the getters below; every mutation goes through
/// the owning model, which keeps the solver, the heap and the buckets in step.
#[derive(Debug)]
pub struct Action {
    pub(crate) kind: ActionKind,
    pub(crate) cost: f64,
    pub(crate) remains: f64,
    pub(crate) start_time: f64,
    pub(crate) finish_time: Option<f64>,
    pub(crate) priority: f64,
    pub(crate) bound: f64,
    pub(crate) max_duration: Option<f64>,
    /// Absolute date `max_duration` expires at, used by lazy models.
    pub(crate) deadline: Option<f64>,
    pub(crate) suspended: SuspendState,
    pub(crate) refcount: u32,
    pub(crate) data: Option<ActivityRef>,
    pub(crate) variable: Option<VariableId>,
    pub(crate) last_update: f64,
    pub(crate) last_value: f64,
    pub(crate) heap_handle: Option<HeapHandle>,
    pub(crate) heap_kind: HeapEntryKind,
    pub(crate) in_modified_set: bool,
    pub(crate) link: BucketLink,
}

impl Action {
    pub(crate) fn new(kind: ActionKind, cost: f64, now: f64) -> Self {
        Self {
            kind,
            cost,
            remains: cost,
            start_time: now,
            finish_time: None,
            priority: 1.0,
            bound: 0.0,
            max_duration: None,
            deadline: None,
            suspended: SuspendState::NotSuspended,
            refcount: 1,
            data: None,
            variable: None,
            last_update: now,
            last_value: 0.0,
            heap_handle: None,
            heap_kind: HeapEntryKind::Unset,
            in_modified_set: false,
            link: BucketLink::default(),
        }
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Cached remaining work, without a lazy recompute.
    pub fn remains_no_update(&self) -> f64 {
        self.remains
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Date the action reached a terminal state.
    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    /// Solver weight applied while the action is running.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Rate cap; zero means unbounded.
    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn max_duration(&self) -> Option<f64> {
        self.max_duration
    }

    /// Absolute date the current `max_duration` expires at.
    pub fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    pub fn suspend_state(&self) -> SuspendState {
        self.suspended
    }

    /// True only for the `Suspended` sub-state; sleeping is not suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspended == SuspendState::Suspended
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub fn data(&self) -> Option<ActivityRef> {
        self.data
    }

    pub fn variable(&self) -> Option<VariableId> {
        self.variable
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    /// Reason for the outstanding heap entry, `Unset` if there is none.
    pub fn heap_kind(&self) -> HeapEntryKind {
        self.heap_kind
    }

    pub fn has_heap_entry(&self) -> bool {
        self.heap_handle.is_some()
    }

    /// Scheduled date of the outstanding heap entry.
    pub fn heap_date(&self) -> Option<f64> {
        self.heap_handle.map(|h| h.date())
    }

    /// Current bucket.
    ///
    /// # Panics
    ///
    /// If the action is linked in no bucket: the model's bookkeeping is
    /// corrupt and no answer would be trustworthy.
    pub fn state(&self) -> ActionState {
        match self.link.state() {
            Some(state) => state,
            None => panic!("{} action is not in any state bucket", self.kind.label()),
        }
    }

    /// Started, not suspended or sleeping, and with a positive priority.
    pub fn is_running(&self) -> bool {
        self.state() == ActionState::Started
            && self.suspended == SuspendState::NotSuspended
            && self.priority > 0.0
    }

    /// Weight the solver variable should carry in the current state.
    pub(crate) fn effective_weight(&self) -> f64 {
        let sharing = self.link.state() == Some(ActionState::Started)
            && self.suspended == SuspendState::NotSuspended
            && self.kind.latency() <= 0.0;
        if sharing {
            self.priority
        } else {
            0.0
        }
    }

    /// Subtract progressed work, snapping to zero near exhaustion.
    pub(crate) fn update_remains(&mut self, delta: f64, precision: &Precision) {
        double_update(&mut self.remains, delta, precision.remains());
    }

    /// Subtract elapsed time from the deadline, if any.
    pub(crate) fn update_max_duration(&mut self, delta: f64, precision: &Precision) {
        if let Some(duration) = self.max_duration.as_mut() {
            double_update(duration, delta, precision.surf);
        }
    }
}

impl BucketMember for Action {
    fn link(&self) -> &BucketLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut BucketLink {
        &mut self.link
    }
}
