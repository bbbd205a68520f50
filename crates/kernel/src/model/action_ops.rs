//! Action lifecycle operations.

use super::Model;
use ressim_types::{
    double_positive, double_update, ActionId, ActionState, ActivityRef, HeapEntryKind,
    SuspendState,
};
use tracing::{debug, trace};

impl Model {
    /// Current state of an action.
    ///
    /// # Panics
    ///
    /// If the action does not exist or sits in no bucket.
    pub fn get_state(&self, id: ActionId) -> ActionState {
        self.action_ref(id).state()
    }

    /// Move an action to the bucket for `state`.
    ///
    /// Entering a terminal state drops the heap entry and the modified-set
    /// membership, and disables the solver variable.
    ///
    /// # Panics
    ///
    /// When leaving `Finished` or `Failed`, or leaving `Ignored` for anything
    /// but `Failed`.
    pub fn set_state(&mut self, id: ActionId, state: ActionState) {
        let previous = self.get_state(id);
        if previous == state {
            return;
        }
        if previous.is_terminal() {
            panic!("{id} cannot leave terminal state {previous} for {state}");
        }
        if previous == ActionState::Ignored && state != ActionState::Failed {
            panic!("{id} can only leave {previous} by failing, not for {state}");
        }

        self.buckets.move_to(&mut self.actions, id, state);
        if state.is_terminal() {
            let now = self.now;
            let action = self.action_mut(id);
            action.finish_time.get_or_insert(now);
            self.heap_remove(id);
            self.modified_remove(id);
        }
        self.sync_weight(id);
        self.record(id, previous, state);

        debug!(
            model = %self.kind,
            action = %id,
            kind = self.actions[id].kind.label(),
            %previous,
            %state,
            "Action state changed"
        );
    }

    /// Terminate an action: `finish_time = now`, `remains = 0`.
    ///
    /// # Panics
    ///
    /// If the action is already terminal.
    pub fn finish(&mut self, id: ActionId, state: ActionState) {
        let now = self.now;
        let action = self.action_mut(id);
        let current = action.state();
        if current.is_terminal() {
            panic!("{id} is already {current}, cannot finish it again");
        }
        action.finish_time = Some(now);
        action.remains = 0.0;
        self.set_state(id, state);
    }

    /// Activate an action created through `execution_init`.
    ///
    /// # Panics
    ///
    /// If the action is not `Inited`.
    pub fn start(&mut self, id: ActionId) {
        let state = self.get_state(id);
        assert!(
            state == ActionState::Inited,
            "{id} cannot be started from {state}"
        );
        let now = self.now;
        let action = self.action_mut(id);
        action.start_time = now;
        action.last_update = now;
        action.deadline = action.max_duration.map(|d| now + d);
        self.set_state(id, ActionState::Started);
    }

    /// Take an extra reference.
    pub fn ref_action(&mut self, id: ActionId) {
        self.action_mut(id).refcount += 1;
    }

    /// Drop a reference, destroying the action when none remain.
    ///
    /// Destruction frees the solver variable and any heap entry.
    ///
    /// # Returns
    ///
    /// Whether the action was destroyed.
    pub fn unref(&mut self, id: ActionId) -> bool {
        let action = self.action_mut(id);
        action.refcount -= 1;
        if action.refcount > 0 {
            return false;
        }

        self.buckets.unlink(&mut self.actions, id);
        self.heap_remove(id);
        self.modified_remove(id);
        if let Some(action) = self.actions.remove(id) {
            if let Some(var) = action.variable {
                self.solver.variable_free(var);
            }
        }
        trace!(model = %self.kind, action = %id, "Action destroyed");
        true
    }

    /// Fail an action immediately.
    ///
    /// No-op on `Finished`/`Failed` actions. The action keeps its remains.
    pub fn cancel(&mut self, id: ActionId) {
        let state = self.get_state(id);
        if state.is_terminal() {
            return;
        }
        if self.is_lazy() && self.action_ref(id).is_running() {
            self.update_remains_lazy(id, self.now);
            if self.get_state(id).is_terminal() {
                return;
            }
        }
        let now = self.now;
        self.action_mut(id).finish_time = Some(now);
        self.set_state(id, ActionState::Failed);
    }

    /// Stop an action from receiving any share.
    ///
    /// No-op on sleeping, suspended or terminal actions.
    pub fn suspend(&mut self, id: ActionId) {
        let action = self.action_ref(id);
        if action.suspended != SuspendState::NotSuspended || action.state().is_terminal() {
            return;
        }

        // Account for progress made at the old rate before the weight drops.
        if self.is_lazy() && action.is_running() {
            self.update_remains_lazy(id, self.now);
            if self.get_state(id) != ActionState::Started {
                return;
            }
        }

        self.action_mut(id).suspended = SuspendState::Suspended;
        self.sync_weight(id);
        if self.is_lazy() {
            self.action_mut(id).last_value = 0.0;
            self.heap_remove(id);
            // The deadline keeps running while suspended.
            if self.action_ref(id).deadline.is_some() {
                self.modified_push_back(id);
            }
        }
        debug!(model = %self.kind, action = %id, "Action suspended");
    }

    /// Undo [`suspend`](Model::suspend). No-op unless suspended.
    pub fn resume(&mut self, id: ActionId) {
        if self.action_ref(id).suspended != SuspendState::Suspended {
            return;
        }

        let now = self.now;
        self.action_mut(id).suspended = SuspendState::NotSuspended;
        if self.is_lazy() {
            self.action_mut(id).last_update = now;
            self.heap_remove(id);
            let action = self.action_ref(id);
            let latency = action.kind.latency();
            if action.state() == ActionState::Started {
                if latency > 0.0 || action.kind.is_routeless() {
                    self.schedule_latency(id);
                } else {
                    self.modified_push_back(id);
                }
            }
        }
        self.sync_weight(id);
        debug!(model = %self.kind, action = %id, "Action resumed");
    }

    pub fn is_suspended(&self, id: ActionId) -> bool {
        self.action_ref(id).is_suspended()
    }

    /// Cap the action's rate. Zero or less removes the cap.
    pub fn set_bound(&mut self, id: ActionId, bound: f64) {
        if !self.settle_before_change(id) {
            return;
        }
        self.action_mut(id).bound = bound;
        if let Some(var) = self.action_ref(id).variable {
            self.solver.update_variable_bound(var, bound);
        }
        self.invalidate_projection(id);
    }

    /// Change the solver weight. Zero pauses the action in place.
    pub fn set_priority(&mut self, id: ActionId, priority: f64) {
        if !self.settle_before_change(id) {
            return;
        }
        self.action_mut(id).priority = priority;
        self.sync_weight(id);
        if self.is_lazy() {
            let share = self.share(id);
            self.action_mut(id).last_value = share;
        }
        self.invalidate_projection(id);
    }

    /// Set or clear the wall-clock deadline, counted from now.
    pub fn set_max_duration(&mut self, id: ActionId, duration: Option<f64>) {
        let now = self.now;
        let action = self.action_mut(id);
        action.max_duration = duration;
        action.deadline = duration.map(|d| now + d);
        if self.is_lazy() && awaits_latency(self.action_ref(id)) {
            self.schedule_latency(id);
        } else {
            self.invalidate_projection(id);
        }
    }

    /// Remaining work, brought up to date first in lazy mode.
    pub fn get_remains(&mut self, id: ActionId) -> f64 {
        if self.is_lazy() && self.action_ref(id).is_running() {
            self.update_remains_lazy(id, self.now);
        }
        self.action_ref(id).remains
    }

    /// Cached remaining work.
    pub fn get_remains_no_update(&self, id: ActionId) -> f64 {
        self.action_ref(id).remains
    }

    pub fn get_data(&self, id: ActionId) -> Option<ActivityRef> {
        self.action_ref(id).data
    }

    pub fn set_data(&mut self, id: ActionId, data: Option<ActivityRef>) {
        self.action_mut(id).data = data;
    }

    /// Rate currently assigned by the solver.
    pub fn rate(&self, id: ActionId) -> f64 {
        let _ = self.action_ref(id);
        self.share(id)
    }

    /// Recompute remains from the cached rate since `last_update`.
    ///
    /// Finishes the action when its work is exhausted or its deadline has
    /// passed.
    ///
    /// # Panics
    ///
    /// If the action is not started or has a non-positive priority.
    pub(crate) fn update_remains_lazy(&mut self, id: ActionId, now: f64) {
        let precision = self.precision;
        let action = self.action_ref(id);
        if action.kind.is_communication() && action.suspended != SuspendState::NotSuspended {
            return;
        }
        let state = action.state();
        assert!(
            state == ActionState::Started,
            "{id}: lazy remains update on a {state} action"
        );
        assert!(
            action.priority > 0.0,
            "{id}: lazy remains update with non-positive priority {}",
            action.priority
        );

        let share = self.share(id);
        let weight = self.weight(id);
        let action = self.action_mut(id);
        let delta = now - action.last_update;
        if let Some(latency) = action.kind.latency_mut() {
            if *latency > 0.0 {
                double_update(latency, delta, precision.surf);
            }
        }
        if action.remains > 0.0 {
            action.update_remains(action.last_value * delta, &precision);
        }
        action.last_update = now;
        action.last_value = share;

        let remains = action.remains;
        let exhausted = remains <= 0.0 && weight > 0.0;
        let expired = action
            .deadline
            .is_some_and(|deadline| !double_positive(deadline - now, precision.surf));
        trace!(model = %self.kind, action = %id, remains, share, "Lazy remains update");
        if exhausted || expired {
            self.finish(id, ActionState::Finished);
        }
    }

    /// Bring a running action's remains up to date before its rate changes.
    ///
    /// # Returns
    ///
    /// `false` if the action is (or just became) terminal.
    fn settle_before_change(&mut self, id: ActionId) -> bool {
        if self.get_state(id).is_terminal() {
            return false;
        }
        if self.is_lazy() && self.action_ref(id).is_running() {
            self.update_remains_lazy(id, self.now);
        }
        !self.get_state(id).is_terminal()
    }

    /// Key the heap entry of a communication still paying its latency.
    ///
    /// The entry waits for the end of the latency, or for the deadline when
    /// that comes first.
    pub(crate) fn schedule_latency(&mut self, id: ActionId) {
        let now = self.now;
        let action = self.action_ref(id);
        let mut date = action.last_update + action.kind.latency().max(0.0);
        let mut kind = latency_entry_kind(action);
        if let Some(deadline) = action.deadline {
            if deadline < date {
                date = deadline;
                kind = HeapEntryKind::MaxDuration;
            }
        }
        let date = date.max(now);
        trace!(model = %self.kind, action = %id, date, ?kind, "Latency scheduled");
        self.heap_update(id, date, kind);
    }

    /// Drop the projected date and ask for a new one at the next solve.
    fn invalidate_projection(&mut self, id: ActionId) {
        if !self.is_lazy() || awaits_latency(self.action_ref(id)) {
            return;
        }
        self.heap_remove(id);
        if self.get_state(id) == ActionState::Started {
            self.modified_push_back(id);
        }
    }
}

/// Whether the action's heap entry waits on latency rather than on a rate.
///
/// Such an entry stays put when the rate changes: there is no rate to
/// project from yet. A deadline falling inside the latency keys the entry
/// as `MaxDuration` without ending the wait.
pub(crate) fn awaits_latency(action: &crate::Action) -> bool {
    if action.is_suspended() {
        return false;
    }
    let paying = action.kind.latency() > 0.0 || action.kind.is_routeless();
    match action.heap_kind {
        HeapEntryKind::Latency => true,
        HeapEntryKind::MaxDuration => action.kind.is_communication() && paying,
        HeapEntryKind::Normal => action.kind.is_routeless(),
        HeapEntryKind::Unset => false,
    }
}

/// Heap reason for a communication still paying its latency.
///
/// A transfer over no link has nothing to share, so it completes outright
/// once the latency is paid.
fn latency_entry_kind(action: &crate::Action) -> HeapEntryKind {
    if action.kind.is_routeless() {
        HeapEntryKind::Normal
    } else {
        HeapEntryKind::Latency
    }
}
