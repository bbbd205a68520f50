//! Deterministic simulation runner.
//!
//! Each step jumps to the earliest of the next model event, the next trace
//! point and the caller's horizon. Actions submitted through the runner are
//! owned by it: their completion is recorded and their last reference is
//! dropped as soon as they reach `Finished` or `Failed`.

use crate::error::SimulationError;
use crate::event_queue::{EventKey, TraceEvent};
use ressim_kernel::{IoOp, KernelConfig, SimContext, TraceKind};
use ressim_types::{
    double_positive, ActionId, ActionState, ActivityRef, ModelKind, ResourceId,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, trace, warn};

/// Deterministic simulation runner.
///
/// Given the same submissions and traces, produces identical results every
/// run.
pub struct SimulationRunner {
    /// Kernel being driven.
    ctx: SimContext,

    /// Pending load-trace points, ordered deterministically.
    trace_queue: BTreeMap<EventKey, TraceEvent>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Next activity reference handed out by the submit helpers.
    next_activity: u64,

    /// Live actions submitted through the runner.
    owned: HashMap<ActivityRef, Submission>,

    /// Ended submissions, in completion order.
    completions: Vec<Completion>,

    /// Statistics.
    stats: SimulationStats,
}

#[derive(Debug, Clone, Copy)]
struct Submission {
    model: ModelKind,
    action: ActionId,
    label: &'static str,
    submitted_at: f64,
}

/// A submitted action that reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub activity: ActivityRef,
    pub model: ModelKind,
    /// Kind of work, e.g. `"execution"` or `"communication"`.
    pub label: &'static str,
    /// `Finished` or `Failed`.
    pub state: ActionState,
    pub submitted_at: f64,
    pub finished_at: f64,
    /// Work left when the action ended; non-zero only for failures.
    pub remains: f64,
}

impl Completion {
    /// Time from submission to the terminal state.
    pub fn duration(&self) -> f64 {
        self.finished_at - self.submitted_at
    }
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    /// Steps taken.
    pub steps: u64,
    /// Actions submitted through the runner.
    pub submitted: u64,
    /// Trace points applied.
    pub trace_events: u64,
    /// Trace points the kernel rejected.
    pub trace_errors: u64,
    /// State changes observed, owned or not.
    pub state_changes: u64,
    /// Transitions to `Finished`.
    pub finished: u64,
    /// Transitions to `Failed`.
    pub failed: u64,
}

impl SimulationStats {
    /// Share of terminal transitions that were successful.
    pub fn success_rate(&self) -> f64 {
        let total = self.finished + self.failed;
        if total == 0 {
            1.0
        } else {
            self.finished as f64 / total as f64
        }
    }
}

impl SimulationRunner {
    pub fn new(config: KernelConfig) -> Self {
        info!(
            cpu = %config.cpu_algorithm,
            network = %config.network_algorithm,
            storage = %config.storage_algorithm,
            "Simulation runner created"
        );
        Self {
            ctx: SimContext::new(config),
            trace_queue: BTreeMap::new(),
            sequence: 0,
            next_activity: 0,
            owned: HashMap::new(),
            completions: Vec::new(),
            stats: SimulationStats::default(),
        }
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Mutable access to the kernel, for platform setup and direct action
    /// control.
    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    pub fn now(&self) -> f64 {
        self.ctx.now()
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub fn take_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completions)
    }

    /// Number of submitted actions still running.
    pub fn pending(&self) -> usize {
        self.owned.len()
    }

    /// Trace points not applied yet.
    pub fn pending_traces(&self) -> usize {
        self.trace_queue.len()
    }

    /// Model and action backing a live submission.
    pub fn action_of(&self, activity: ActivityRef) -> Option<(ModelKind, ActionId)> {
        self.owned.get(&activity).map(|s| (s.model, s.action))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Traces
    // ═══════════════════════════════════════════════════════════════════════

    /// Replay `points` (date, value) against a resource.
    ///
    /// Subscribes the resource to `kind` and queues every point. Nothing is
    /// queued if any point is invalid.
    pub fn add_trace(
        &mut self,
        model: ModelKind,
        resource: ResourceId,
        kind: TraceKind,
        points: &[(f64, f64)],
    ) -> Result<(), SimulationError> {
        let now = self.now();
        for &(date, value) in points {
            if date < now {
                return Err(SimulationError::TraceInPast { date, now });
            }
            let valid = match kind {
                TraceKind::Availability | TraceKind::Latency => {
                    value.is_finite() && value >= 0.0
                }
                TraceKind::State => value.is_finite(),
            };
            if !valid {
                return Err(SimulationError::InvalidTraceValue { kind, value });
            }
        }
        self.ctx.model_mut(model).subscribe_trace(resource, kind)?;

        for &(date, value) in points {
            self.schedule_trace(
                date,
                TraceEvent {
                    model,
                    resource,
                    kind,
                    value,
                },
            );
        }
        debug!(%model, %resource, %kind, points = points.len(), "Trace added");
        Ok(())
    }

    fn schedule_trace(&mut self, time: f64, event: TraceEvent) -> EventKey {
        let key = EventKey {
            time,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.trace_queue.insert(key, event);
        key
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Submissions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn submit_execution(
        &mut self,
        host: ResourceId,
        flops: f64,
    ) -> Result<ActivityRef, SimulationError> {
        let action = self.ctx.cpu_mut().execute(host, flops)?;
        Ok(self.track(ModelKind::Cpu, action))
    }

    pub fn submit_sleep(
        &mut self,
        host: ResourceId,
        duration: f64,
    ) -> Result<ActivityRef, SimulationError> {
        let action = self.ctx.cpu_mut().sleep(host, Some(duration))?;
        Ok(self.track(ModelKind::Cpu, action))
    }

    pub fn submit_communication(
        &mut self,
        route: &[ResourceId],
        size: f64,
        rate: Option<f64>,
    ) -> Result<ActivityRef, SimulationError> {
        let action = self.ctx.network_mut().communicate(route, size, rate)?;
        Ok(self.track(ModelKind::Network, action))
    }

    pub fn submit_io(
        &mut self,
        disk: ResourceId,
        size: f64,
        op: IoOp,
    ) -> Result<ActivityRef, SimulationError> {
        let action = self.ctx.storage_mut().io_start(disk, size, op)?;
        Ok(self.track(ModelKind::Storage, action))
    }

    /// Fail a live submission now.
    pub fn cancel(&mut self, activity: ActivityRef) -> Result<(), SimulationError> {
        let (model, action) = self
            .action_of(activity)
            .ok_or(SimulationError::UnknownActivity(activity))?;
        self.ctx.model_mut(model).cancel(action);
        self.collect_state_changes();
        Ok(())
    }

    /// Take ownership of a freshly created action.
    fn track(&mut self, model: ModelKind, action: ActionId) -> ActivityRef {
        let activity = ActivityRef(self.next_activity);
        self.next_activity += 1;
        self.stats.submitted += 1;

        let now = self.now();
        let kernel = self.ctx.model_mut(model);
        kernel.set_data(action, Some(activity));
        let submission = Submission {
            model,
            action,
            label: kernel.action(action).map_or("action", |a| a.kind().label()),
            submitted_at: now,
        };

        // Born failed: its state change was recorded before the data was set.
        if kernel.get_state(action).is_terminal() {
            self.complete(activity, submission);
        } else {
            self.owned.insert(activity, submission);
        }
        trace!(%activity, %model, %action, "Submission tracked");
        activity
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stepping
    // ═══════════════════════════════════════════════════════════════════════

    /// Advance to the next event, never past `max_date`.
    ///
    /// # Returns
    ///
    /// The date reached, or `None` when no model has an event, no trace is
    /// pending and no horizon was given.
    pub fn step(&mut self, max_date: Option<f64>) -> Option<f64> {
        let now = self.now();
        let mut next = self.ctx.next_occurring_event().map(|delta| now + delta);
        if let Some((key, _)) = self.trace_queue.first_key_value() {
            next = Some(next.map_or(key.time, |n| n.min(key.time)));
        }
        if let Some(max_date) = max_date {
            next = Some(next.map_or(max_date, |n| n.min(max_date)));
        }
        let date = next?.max(now);

        self.ctx.advance(date - now);
        self.apply_due_traces();
        self.collect_state_changes();
        self.stats.steps += 1;

        trace!(date, pending = self.owned.len(), "Step complete");
        Some(date)
    }

    /// Step until `end_time`. The clock always reaches `end_time`.
    pub fn run_until(&mut self, end_time: f64) {
        trace!(end_time, "Running simulation");
        while let Some(date) = self.step(Some(end_time)) {
            if date >= end_time {
                break;
            }
        }
        debug!(
            now = self.now(),
            steps = self.stats.steps,
            pending = self.owned.len(),
            "Simulation reached horizon"
        );
    }

    /// Step until nothing is left to happen. Returns the final date.
    pub fn run_to_completion(&mut self) -> f64 {
        while self.step(None).is_some() {}
        info!(
            now = self.now(),
            steps = self.stats.steps,
            finished = self.stats.finished,
            failed = self.stats.failed,
            pending = self.owned.len(),
            "Simulation complete"
        );
        self.now()
    }

    fn apply_due_traces(&mut self) {
        let now = self.now();
        let surf = self.ctx.config().precision.surf;
        while let Some(entry) = self.trace_queue.first_entry() {
            if double_positive(entry.key().time - now, surf) {
                break;
            }
            let event = entry.remove();
            self.stats.trace_events += 1;
            let result = self
                .ctx
                .model_mut(event.model)
                .apply_event(event.resource, event.kind, event.value);
            if let Err(err) = result {
                self.stats.trace_errors += 1;
                warn!(resource = %event.resource, kind = %event.kind, %err, "Trace event rejected");
            }
        }
    }

    fn collect_state_changes(&mut self) {
        for change in self.ctx.drain_state_changes() {
            self.stats.state_changes += 1;
            match change.state {
                ActionState::Finished => self.stats.finished += 1,
                ActionState::Failed => self.stats.failed += 1,
                _ => continue,
            }
            let Some(activity) = change.data else {
                continue;
            };
            if let Some(submission) = self.owned.remove(&activity) {
                self.complete(activity, submission);
            }
        }
    }

    /// Record a terminal submission and drop the runner's reference.
    fn complete(&mut self, activity: ActivityRef, submission: Submission) {
        let kernel = self.ctx.model_mut(submission.model);
        let action = submission.action;
        let state = kernel.get_state(action);
        let remains = kernel.get_remains_no_update(action);
        let finished_at = kernel
            .action(action)
            .and_then(|a| a.finish_time())
            .unwrap_or(kernel.now());
        kernel.unref(action);

        debug!(%activity, %state, finished_at, remains, "Activity ended");
        self.completions.push(Completion {
            activity,
            model: submission.model,
            label: submission.label,
            state,
            submitted_at: submission.submitted_at,
            finished_at,
            remains,
        });
    }
}

impl std::fmt::Debug for SimulationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRunner")
            .field("now", &self.now())
            .field("pending", &self.owned.len())
            .field("traces", &self.trace_queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ressim_types::UpdateAlgorithm;
    use tracing_test::traced_test;

    fn runner_with_host(algorithm: UpdateAlgorithm) -> (SimulationRunner, ResourceId) {
        let mut runner = SimulationRunner::new(KernelConfig::uniform(algorithm));
        let host = runner
            .context_mut()
            .cpu_mut()
            .add_cpu("host", 100.0, 1)
            .unwrap();
        (runner, host)
    }

    #[traced_test]
    #[test]
    fn test_owned_actions_are_released_when_done() {
        let (mut runner, host) = runner_with_host(UpdateAlgorithm::Lazy);
        let activity = runner.submit_execution(host, 1000.0).unwrap();
        assert!(runner.action_of(activity).is_some());

        assert_eq!(runner.run_to_completion(), 10.0);
        assert_eq!(runner.pending(), 0);
        assert!(runner.context().cpu().is_empty());
        assert_eq!(runner.completions().len(), 1);
        assert_eq!(runner.completions()[0].duration(), 10.0);
        assert!(runner.action_of(activity).is_none());
    }

    #[traced_test]
    #[test]
    fn test_step_stops_at_horizon() {
        let (mut runner, host) = runner_with_host(UpdateAlgorithm::Full);
        runner.submit_execution(host, 1000.0).unwrap();

        assert_eq!(runner.step(Some(4.0)), Some(4.0));
        assert_eq!(runner.now(), 4.0);
        assert_eq!(runner.pending(), 1);
        assert_eq!(runner.step(None), Some(10.0));
        assert_eq!(runner.step(None), None);
    }

    #[traced_test]
    #[test]
    fn test_run_until_reaches_end_time_when_idle() {
        let (mut runner, _) = runner_with_host(UpdateAlgorithm::Lazy);
        runner.run_until(42.0);
        assert_eq!(runner.now(), 42.0);
    }

    #[traced_test]
    #[test]
    fn test_trace_validation() {
        let (mut runner, host) = runner_with_host(UpdateAlgorithm::Lazy);
        runner.run_until(5.0);
        assert_eq!(
            runner.add_trace(ModelKind::Cpu, host, TraceKind::State, &[(1.0, 0.0)]),
            Err(SimulationError::TraceInPast { date: 1.0, now: 5.0 })
        );
        assert!(matches!(
            runner.add_trace(ModelKind::Cpu, host, TraceKind::Availability, &[(6.0, -0.5)]),
            Err(SimulationError::InvalidTraceValue { .. })
        ));
        assert!(matches!(
            runner.add_trace(ModelKind::Cpu, host, TraceKind::Latency, &[(6.0, 1.0)]),
            Err(SimulationError::Kernel(_))
        ));
        assert_eq!(runner.pending_traces(), 0);
    }

    #[traced_test]
    #[test]
    fn test_cancel_records_failure() {
        let (mut runner, host) = runner_with_host(UpdateAlgorithm::Lazy);
        let activity = runner.submit_execution(host, 1000.0).unwrap();
        runner.run_until(2.0);
        runner.cancel(activity).unwrap();

        let completion = &runner.completions()[0];
        assert_eq!(completion.state, ActionState::Failed);
        assert_eq!(completion.finished_at, 2.0);
        assert_eq!(completion.remains, 800.0);
        assert_eq!(
            runner.cancel(activity),
            Err(SimulationError::UnknownActivity(activity))
        );
    }

    #[traced_test]
    #[test]
    fn test_submission_on_off_host_completes_at_once() {
        let (mut runner, host) = runner_with_host(UpdateAlgorithm::Full);
        runner.context_mut().cpu_mut().turn_off(host).unwrap();
        runner.submit_execution(host, 1000.0).unwrap();

        assert_eq!(runner.pending(), 0);
        assert_eq!(runner.completions()[0].state, ActionState::Failed);
        assert_eq!(runner.completions()[0].remains, 1000.0);
    }
}
