//! Models: one per resource technology.
//!
//! A model owns its resources, its actions, a fairness solver and (in lazy
//! mode) an event heap. Every mutation of an action goes through the model so
//! the buckets, the heap and the solver never disagree.

mod action_ops;
mod factory;
mod resource_ops;
mod update;

use crate::action::Action;
use crate::bucket::StateBuckets;
use crate::heap::ActionHeap;
use crate::resource::Resource;
use ressim_lmm::{FairnessSolver, MaxMinSystem};
use ressim_types::{
    ActionId, ActionState, ActivityRef, HeapEntryKind, ModelKind, Precision, ResourceId,
    UpdateAlgorithm,
};
use slotmap::SlotMap;
use std::collections::VecDeque;
use tracing::trace;

/// An action changed bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChange {
    pub model: ModelKind,
    pub action: ActionId,
    pub data: Option<ActivityRef>,
    pub previous: ActionState,
    pub state: ActionState,
    pub time: f64,
}

/// Resource-sharing model.
pub struct Model {
    kind: ModelKind,
    algorithm: UpdateAlgorithm,
    precision: Precision,

    /// Current simulated time.
    now: f64,

    solver: Box<dyn FairnessSolver>,
    actions: SlotMap<ActionId, Action>,
    resources: SlotMap<ResourceId, Resource>,
    buckets: StateBuckets,
    heap: ActionHeap,

    /// Actions whose projected date must be recomputed at the next solve.
    modified: VecDeque<ActionId>,

    /// Transitions not yet collected by the caller.
    state_changes: Vec<StateChange>,
}

impl Model {
    /// Create a model backed by a [`MaxMinSystem`].
    ///
    /// Lazy models enable the solver's selective update.
    pub fn new(kind: ModelKind, algorithm: UpdateAlgorithm, precision: Precision) -> Self {
        let solver = MaxMinSystem::new(algorithm == UpdateAlgorithm::Lazy, precision.maxmin);
        Self::with_solver(kind, algorithm, precision, Box::new(solver))
    }

    /// Create a model backed by any solver.
    pub fn with_solver(
        kind: ModelKind,
        algorithm: UpdateAlgorithm,
        precision: Precision,
        solver: Box<dyn FairnessSolver>,
    ) -> Self {
        Self {
            kind,
            algorithm,
            precision,
            now: 0.0,
            solver,
            actions: SlotMap::with_key(),
            resources: SlotMap::with_key(),
            buckets: StateBuckets::new(),
            heap: ActionHeap::new(),
            modified: VecDeque::new(),
            state_changes: Vec::new(),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn algorithm(&self) -> UpdateAlgorithm {
        self.algorithm
    }

    pub fn is_lazy(&self) -> bool {
        self.algorithm == UpdateAlgorithm::Lazy
    }

    pub fn precision(&self) -> &Precision {
        &self.precision
    }

    /// Set the current simulated time.
    pub fn set_time(&mut self, now: f64) {
        self.now = now;
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.resources.iter()
    }

    pub fn resource_by_name(&self, name: &str) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|(_, r)| r.get_name() == name)
            .map(|(id, _)| id)
    }

    /// Actions currently in the bucket for `state`, in bucket order.
    pub fn actions_in(&self, state: ActionState) -> Vec<ActionId> {
        self.buckets.collect(&self.actions, state)
    }

    pub fn action_count(&self, state: ActionState) -> usize {
        self.buckets.len(state)
    }

    /// Number of live actions across all buckets.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether any action is running on this model.
    pub fn is_used(&self) -> bool {
        !self.buckets.is_empty(ActionState::Started)
    }

    pub fn heap(&self) -> &ActionHeap {
        &self.heap
    }

    pub fn solver(&self) -> &dyn FairnessSolver {
        self.solver.as_ref()
    }

    /// Whether `id` waits in the modified set.
    pub fn is_in_modified_set(&self, id: ActionId) -> bool {
        self.actions.get(id).is_some_and(|a| a.in_modified_set)
    }

    /// Collect and clear the pending state-change notifications.
    pub fn take_state_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.state_changes)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internal helpers
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn action_ref(&self, id: ActionId) -> &Action {
        match self.actions.get(id) {
            Some(action) => action,
            None => panic!("{id} does not exist in the {} model", self.kind),
        }
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> &mut Action {
        match self.actions.get_mut(id) {
            Some(action) => action,
            None => panic!("{id} does not exist in the {} model", self.kind),
        }
    }

    /// Insert a new action in the bucket for `state`.
    pub(crate) fn create_action(&mut self, action: Action, state: ActionState) -> ActionId {
        let now = self.now;
        let id = self.actions.insert(action);
        self.buckets.push_back(&mut self.actions, id, state);

        if state == ActionState::Failed {
            self.actions[id].finish_time = Some(now);
            self.record(id, ActionState::Inited, ActionState::Failed);
        }
        trace!(model = %self.kind, action = %id, %state, "Action created");
        id
    }

    pub(crate) fn record(&mut self, id: ActionId, previous: ActionState, state: ActionState) {
        let data = self.actions[id].data;
        self.state_changes.push(StateChange {
            model: self.kind,
            action: id,
            data,
            previous,
            state,
            time: self.now,
        });
    }

    pub(crate) fn heap_update(&mut self, id: ActionId, date: f64, kind: HeapEntryKind) {
        let action = &mut self.actions[id];
        action.heap_handle = Some(self.heap.update(action.heap_handle, id, date, kind));
        action.heap_kind = kind;
    }

    pub(crate) fn heap_remove(&mut self, id: ActionId) {
        let action = &mut self.actions[id];
        self.heap.remove(action.heap_handle.take());
        action.heap_kind = HeapEntryKind::Unset;
    }

    pub(crate) fn modified_push_back(&mut self, id: ActionId) {
        if let Some(action) = self.actions.get_mut(id) {
            if !action.in_modified_set {
                action.in_modified_set = true;
                self.modified.push_back(id);
            }
        }
    }

    pub(crate) fn modified_push_front(&mut self, id: ActionId) {
        if let Some(action) = self.actions.get_mut(id) {
            if action.in_modified_set {
                self.modified.retain(|m| *m != id);
            }
            action.in_modified_set = true;
            self.modified.push_front(id);
        }
    }

    pub(crate) fn modified_remove(&mut self, id: ActionId) {
        if let Some(action) = self.actions.get_mut(id) {
            if action.in_modified_set {
                action.in_modified_set = false;
                self.modified.retain(|m| *m != id);
            }
        }
    }

    /// Push the weight the action should have in its current state down to
    /// the solver.
    pub(crate) fn sync_weight(&mut self, id: ActionId) {
        let action = &self.actions[id];
        let Some(var) = action.variable else {
            return;
        };
        let weight = action.effective_weight();
        if self.solver.variable_weight(var) != weight {
            self.solver.update_variable_weight(var, weight);
        }
    }

    /// Current rate of the action's variable.
    pub(crate) fn share(&self, id: ActionId) -> f64 {
        self.actions[id]
            .variable
            .map_or(0.0, |var| self.solver.variable_value(var))
    }

    pub(crate) fn weight(&self, id: ActionId) -> f64 {
        self.actions[id]
            .variable
            .map_or(0.0, |var| self.solver.variable_weight(var))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("kind", &self.kind)
            .field("algorithm", &self.algorithm)
            .field("now", &self.now)
            .field("actions", &self.actions.len())
            .field("resources", &self.resources.len())
            .field("heap", &self.heap.len())
            .finish()
    }
}

/// Earlier of an optional running minimum and a candidate.
pub(crate) fn earliest(current: Option<f64>, candidate: f64) -> Option<f64> {
    Some(current.map_or(candidate, |c| c.min(candidate)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Model;
    use ressim_types::{ModelKind, Precision, ResourceId, UpdateAlgorithm};

    pub(crate) const BOTH: [UpdateAlgorithm; 2] = [UpdateAlgorithm::Lazy, UpdateAlgorithm::Full];

    /// A cpu model with one single-core host of 100 flop/s.
    pub(crate) fn cpu_model(algorithm: UpdateAlgorithm) -> (Model, ResourceId) {
        let mut model = Model::new(ModelKind::Cpu, algorithm, Precision::default());
        let host = model.add_cpu("host", 100.0, 1).unwrap();
        (model, host)
    }

    /// A network model with one shared link.
    pub(crate) fn link_model(
        algorithm: UpdateAlgorithm,
        bandwidth: f64,
        latency: f64,
    ) -> (Model, ResourceId) {
        let mut model = Model::new(ModelKind::Network, algorithm, Precision::default());
        let link = model
            .add_link("link", bandwidth, latency, ressim_lmm::SharingPolicy::Shared)
            .unwrap();
        (model, link)
    }

    /// Advance one event, never past `until`. Returns the new date.
    pub(crate) fn step(model: &mut Model, until: f64) -> f64 {
        let now = model.now();
        let delta = match model.next_occurring_event(now) {
            Some(delta) if now + delta <= until => delta,
            _ => until - now,
        };
        let date = now + delta;
        model.set_time(date);
        model.update_actions_state(date, delta);
        date
    }

    /// Advance event by event up to `until`.
    pub(crate) fn run_until(model: &mut Model, until: f64) {
        while step(model, until) < until {}
    }
}
