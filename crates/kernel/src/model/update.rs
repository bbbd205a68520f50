//! The per-tick entry points: solve, project, update.
//!
//! ```text
//!   next_occurring_event(now)          update_actions_state(now, delta)
//!   ┌──────────────────────────┐       ┌──────────────────────────────┐
//!   │ Lazy: solve              │       │ Lazy: pop entries due at now │
//!   │   → owners → modified    │       │   Latency     → weight on    │
//!   │   → project → heap       │       │   MaxDuration → finish       │
//!   │   → top_date - now       │       │   Normal      → finish       │
//!   ├──────────────────────────┤       ├──────────────────────────────┤
//!   │ Full: solve              │       │ Full: scan started bucket    │
//!   │   → min over started     │       │   remains -= rate × delta    │
//!   └──────────────────────────┘       └──────────────────────────────┘
//! ```

use super::action_ops::awaits_latency;
use super::{earliest, Model};
use crate::bucket::StateBuckets;
use ressim_types::{
    double_positive, double_update, ActionId, ActionState, HeapEntryKind, SuspendState,
    UpdateAlgorithm,
};
use tracing::trace;

impl Model {
    /// Solve the sharing problem and report the delay until the next event.
    ///
    /// `None` means nothing on this model will ever change state on its own.
    pub fn next_occurring_event(&mut self, now: f64) -> Option<f64> {
        self.now = now;
        match self.algorithm {
            UpdateAlgorithm::Lazy => self.next_occurring_event_lazy(now),
            UpdateAlgorithm::Full => self.next_occurring_event_full(now),
        }
    }

    /// Apply the progress made during the last `delta` seconds, ending at `now`.
    pub fn update_actions_state(&mut self, now: f64, delta: f64) {
        self.now = now;
        match self.algorithm {
            UpdateAlgorithm::Lazy => self.update_actions_state_lazy(now),
            UpdateAlgorithm::Full => self.update_actions_state_full(delta),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lazy
    // ═══════════════════════════════════════════════════════════════════════

    fn next_occurring_event_lazy(&mut self, now: f64) -> Option<f64> {
        for owner in self.solver.solve() {
            self.modified_push_back(owner);
        }

        while let Some(id) = self.modified.pop_front() {
            let Some(action) = self.actions.get_mut(id) else {
                continue;
            };
            action.in_modified_set = false;
            if action.link.state() == Some(ActionState::Started) {
                self.project_lazy(id, now);
            }
        }

        self.heap.top_date().map(|top| (top - now).max(0.0))
    }

    /// Settle the action's remains and schedule its next event.
    fn project_lazy(&mut self, id: ActionId, now: f64) {
        let action = self.action_ref(id);
        if action.priority <= 0.0 || awaits_latency(action) {
            return;
        }

        self.update_remains_lazy(id, now);
        if self.get_state(id) != ActionState::Started {
            return;
        }

        let share = self.share(id);
        let action = self.action_ref(id);
        let mut date = None;
        let mut kind = HeapEntryKind::Normal;
        if share > 0.0 {
            date = Some(now + action.remains / share);
        }
        if let Some(deadline) = action.deadline {
            if date.map_or(true, |d| deadline < d) {
                date = Some(deadline);
                kind = HeapEntryKind::MaxDuration;
            }
        }

        match date {
            Some(date) => {
                let date = date.max(now);
                trace!(model = %self.kind, action = %id, date, ?kind, "Action scheduled");
                self.heap_update(id, date, kind);
            }
            // No rate and no deadline: nothing will happen until it is perturbed.
            None => self.heap_remove(id),
        }
    }

    fn update_actions_state_lazy(&mut self, now: f64) {
        let surf = self.precision.surf;
        while let Some(top) = self.heap.top_date() {
            if double_positive(top - now, surf) {
                break;
            }
            let Some(entry) = self.heap.pop() else {
                break;
            };
            let id = entry.action;
            let action = self.action_mut(id);
            action.heap_handle = None;
            action.heap_kind = HeapEntryKind::Unset;

            match entry.kind {
                HeapEntryKind::Latency => {
                    if let Some(latency) = action.kind.latency_mut() {
                        *latency = 0.0;
                    }
                    action.last_update = now;
                    self.sync_weight(id);
                    self.modified_push_back(id);
                    trace!(model = %self.kind, action = %id, "Latency paid");
                }
                HeapEntryKind::MaxDuration | HeapEntryKind::Normal => {
                    self.finish(id, ActionState::Finished);
                }
                HeapEntryKind::Unset => {
                    panic!("{id} popped from the heap with an unset entry kind")
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Full
    // ═══════════════════════════════════════════════════════════════════════

    fn next_occurring_event_full(&mut self, _now: f64) -> Option<f64> {
        self.solver.solve();
        let surf = self.precision.surf;

        let mut min = None;
        let mut cursor = self.buckets.first(ActionState::Started);
        while let Some(id) = cursor {
            cursor = StateBuckets::next(&self.actions, id);
            let share = self.share(id);
            let action = &self.actions[id];

            if share > 0.0 {
                // Residues finish at the next update, whatever the delta.
                let left = action.remains / share;
                min = earliest(min, if double_positive(left, surf) { left } else { 0.0 });
            }
            if let Some(duration) = action.max_duration {
                min = earliest(min, duration.max(0.0));
            }
            if action.kind.is_communication() && action.suspended != SuspendState::Suspended {
                let latency = action.kind.latency();
                if latency > 0.0 {
                    min = earliest(min, latency);
                } else if action.kind.is_routeless() && action.remains > 0.0 {
                    min = earliest(min, 0.0);
                }
            }
        }
        min
    }

    fn update_actions_state_full(&mut self, delta: f64) {
        let precision = self.precision;
        let mut cursor = self.buckets.first(ActionState::Started);
        while let Some(id) = cursor {
            // Fetch the successor first: finishing unlinks `id`.
            cursor = StateBuckets::next(&self.actions, id);

            let share = self.share(id);
            let action = self.action_mut(id);
            let paused = action.suspended == SuspendState::Suspended;
            let mut latency_paid = false;
            if !paused {
                if let Some(latency) = action.kind.latency_mut() {
                    if *latency > 0.0 {
                        if *latency > delta {
                            double_update(latency, delta, precision.surf);
                        } else {
                            *latency = 0.0;
                        }
                        latency_paid = *latency <= 0.0;
                    }
                }
                if action.kind.is_routeless() && action.kind.latency() <= 0.0 {
                    action.remains = 0.0;
                }
            }
            action.update_remains(share * delta, &precision);
            action.update_max_duration(delta, &precision);

            if latency_paid {
                self.sync_weight(id);
            }

            let weight = self.weight(id);
            let action = self.action_ref(id);
            // Same tolerance as a lazy pop: work due within `surf` is done.
            let exhausted = weight > 0.0
                && (action.remains <= 0.0
                    || (share > 0.0 && !double_positive(action.remains / share, precision.surf)));
            let expired = action.max_duration.is_some_and(|d| d <= 0.0);
            if exhausted || expired {
                self.finish(id, ActionState::Finished);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::testing::{cpu_model, link_model, run_until, step, BOTH};
    use super::*;
    use crate::IoOp;
    use ressim_lmm::SharingPolicy;
    use ressim_types::{ModelKind, Precision};
    use tracing_test::traced_test;

    const EPSILON: f64 = 1e-6;

    #[traced_test]
    #[test]
    fn test_single_action_finishes_at_cost_over_capacity() {
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            let id = model.execute(host, 1000.0).unwrap();

            assert_eq!(model.next_occurring_event(0.0), Some(10.0), "{algorithm}");
            assert_eq!(model.rate(id), 100.0);
            model.set_time(10.0);
            model.update_actions_state(10.0, 10.0);

            assert_eq!(model.get_state(id), ActionState::Finished, "{algorithm}");
            assert_eq!(model.get_remains_no_update(id), 0.0);
            assert_eq!(model.action(id).unwrap().finish_time(), Some(10.0));
        }
    }

    #[traced_test]
    #[test]
    fn test_large_costs_late_in_the_run_still_finish() {
        // Rounding at 1e9 flops leaves residues whose time to completion
        // is below what `now` can still resolve.
        for k in 0..50 {
            let start = 1000.0 + 0.37 * k as f64;
            let small = 1e9 * (1.0 + k as f64 * 1e-3);
            let large = 3.3e9 + 0.123 * k as f64;

            let mut finish = Vec::new();
            for algorithm in BOTH {
                let mut model = Model::new(ModelKind::Cpu, algorithm, Precision::default());
                let host = model.add_cpu("host", 1e9, 1).unwrap();
                model.set_time(start);
                let a = model.execute(host, small).unwrap();
                let b = model.execute(host, large).unwrap();

                let mut steps = 0;
                while model.get_state(b) == ActionState::Started {
                    step(&mut model, start + 100.0);
                    steps += 1;
                    assert!(steps <= 10, "{algorithm} stuck at {} for k={k}", model.now());
                }
                assert_eq!(model.get_state(a), ActionState::Finished, "{algorithm}");
                finish.push([a, b].map(|id| model.action(id).unwrap().finish_time().unwrap()));
            }

            for (lazy, full) in finish[0].iter().zip(&finish[1]) {
                assert!((lazy - full).abs() < EPSILON, "k={k}: lazy {lazy} vs full {full}");
            }
            assert!((finish[1][1] - (start + (small + large) / 1e9)).abs() < EPSILON);
        }
    }

    #[traced_test]
    #[test]
    fn test_equal_actions_share_and_finish_together() {
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            let a = model.execute(host, 1000.0).unwrap();
            let b = model.execute(host, 1000.0).unwrap();

            assert_eq!(model.next_occurring_event(0.0), Some(20.0), "{algorithm}");
            assert_eq!(model.rate(a), 50.0);
            assert_eq!(model.rate(b), 50.0);
            model.set_time(20.0);
            model.update_actions_state(20.0, 20.0);

            let changes = model.take_state_changes();
            assert_eq!(changes.len(), 2, "{algorithm}");
            assert!(changes
                .iter()
                .all(|c| c.state == ActionState::Finished && c.time == 20.0));
        }
    }

    #[traced_test]
    #[test]
    fn test_max_duration_fires_before_completion() {
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            let id = model.execute(host, 1000.0).unwrap();
            model.set_max_duration(id, Some(2.0));

            assert_eq!(model.next_occurring_event(0.0), Some(2.0), "{algorithm}");
            if algorithm == UpdateAlgorithm::Lazy {
                assert_eq!(model.action(id).unwrap().heap_kind(), HeapEntryKind::MaxDuration);
            }
            model.set_time(2.0);
            model.update_actions_state(2.0, 2.0);

            assert_eq!(model.get_state(id), ActionState::Finished, "{algorithm}");
            assert_eq!(model.action(id).unwrap().finish_time(), Some(2.0));
            assert_eq!(model.get_remains_no_update(id), 0.0);
        }
    }

    #[traced_test]
    #[test]
    fn test_lazy_matches_full_at_every_sample() {
        // a and b share 80 while c is capped at 20; b ends at 12.5, a at
        // 18.75, c at 100.
        let samples = [5.0, 12.5, 15.0, 18.75, 50.0, 100.0];
        let mut observed = Vec::new();
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            let a = model.execute(host, 1000.0).unwrap();
            let b = model.execute(host, 500.0).unwrap();
            let c = model.execute(host, 2000.0).unwrap();
            model.set_bound(c, 20.0);

            let mut remains = Vec::new();
            for &t in &samples {
                run_until(&mut model, t);
                remains.push([a, b, c].map(|id| model.get_remains(id)));
            }
            let finish = [a, b, c].map(|id| model.action(id).unwrap().finish_time());
            assert_eq!(finish, [Some(18.75), Some(12.5), Some(100.0)], "{algorithm}");
            observed.push(remains);
        }

        for (lazy, full) in observed[0].iter().zip(&observed[1]) {
            for (l, f) in lazy.iter().zip(full) {
                assert!((l - f).abs() < EPSILON, "lazy {l} vs full {f}");
            }
        }
    }

    #[traced_test]
    #[test]
    fn test_remains_never_increase_while_running() {
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            let id = model.execute(host, 1000.0).unwrap();
            model.execute(host, 300.0).unwrap();

            let mut last = f64::INFINITY;
            for t in [1.0, 2.5, 6.0, 7.0, 9.0, 13.0] {
                run_until(&mut model, t);
                let remains = model.get_remains(id);
                assert!(remains <= last, "{algorithm}: {remains} > {last} at {t}");
                last = remains;
            }
            assert_eq!(model.get_state(id), ActionState::Finished);
            assert_eq!(last, 0.0);
        }
    }

    #[traced_test]
    #[test]
    fn test_communication_pays_latency_first() {
        for algorithm in BOTH {
            let mut model = Model::new(ModelKind::Network, algorithm, Precision::default());
            let link = model
                .add_link("link", 1000.0, 1.0, SharingPolicy::Shared)
                .unwrap();
            let id = model.communicate(&[link], 2000.0, None).unwrap();
            if algorithm == UpdateAlgorithm::Lazy {
                assert_eq!(model.action(id).unwrap().heap_kind(), HeapEntryKind::Latency);
            }

            assert_eq!(model.next_occurring_event(0.0), Some(1.0), "{algorithm}");
            assert_eq!(model.rate(id), 0.0);
            assert_eq!(step(&mut model, 10.0), 1.0);
            assert_eq!(model.action(id).unwrap().kind().latency(), 0.0);

            assert_eq!(model.next_occurring_event(1.0), Some(2.0), "{algorithm}");
            if algorithm == UpdateAlgorithm::Lazy {
                assert_eq!(model.action(id).unwrap().heap_kind(), HeapEntryKind::Normal);
            }
            run_until(&mut model, 3.0);
            assert_eq!(model.get_state(id), ActionState::Finished, "{algorithm}");
        }
    }

    #[traced_test]
    #[test]
    fn test_routeless_communication_completes_at_once() {
        for algorithm in BOTH {
            let mut model = Model::new(ModelKind::Network, algorithm, Precision::default());
            let id = model.communicate(&[], 500.0, None).unwrap();

            assert_eq!(model.next_occurring_event(0.0), Some(0.0), "{algorithm}");
            model.update_actions_state(0.0, 0.0);
            assert_eq!(model.get_state(id), ActionState::Finished, "{algorithm}");
        }
    }

    #[traced_test]
    #[test]
    fn test_fat_pipe_gives_each_flow_full_bandwidth() {
        for algorithm in BOTH {
            let mut model = Model::new(ModelKind::Network, algorithm, Precision::default());
            let link = model
                .add_link("backbone", 100.0, 0.0, SharingPolicy::FatPipe)
                .unwrap();
            let a = model.communicate(&[link], 1000.0, None).unwrap();
            let b = model.communicate(&[link], 1000.0, None).unwrap();

            assert_eq!(model.next_occurring_event(0.0), Some(10.0), "{algorithm}");
            assert_eq!(model.rate(a), 100.0);
            assert_eq!(model.rate(b), 100.0);
            assert_eq!(model.get_load(link).unwrap(), 100.0);
        }
    }

    #[traced_test]
    #[test]
    fn test_io_is_capped_by_direction_bandwidth() {
        for algorithm in BOTH {
            let mut model = Model::new(ModelKind::Storage, algorithm, Precision::default());
            let disk = model.add_disk("disk", 100.0, 80.0, 30.0).unwrap();
            let read = model.io_start(disk, 800.0, IoOp::Read).unwrap();
            let write = model.io_start(disk, 300.0, IoOp::Write).unwrap();

            assert_eq!(model.next_occurring_event(0.0), Some(10.0), "{algorithm}");
            assert!((model.rate(read) - 70.0).abs() < EPSILON);
            assert_eq!(model.rate(write), 30.0);
            run_until(&mut model, 10.0);
            assert_eq!(model.get_state(write), ActionState::Finished);
            assert_eq!(model.get_state(read), ActionState::Started);
            assert!((model.get_remains(read) - 100.0).abs() < EPSILON);
        }
    }

    #[traced_test]
    #[test]
    fn test_sleep_ends_at_its_duration() {
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            let id = model.sleep(host, Some(5.0)).unwrap();

            assert_eq!(model.rate(id), 0.0);
            assert_eq!(model.next_occurring_event(0.0), Some(5.0), "{algorithm}");
            run_until(&mut model, 5.0);
            assert_eq!(model.get_state(id), ActionState::Finished, "{algorithm}");
        }
    }

    #[traced_test]
    #[test]
    fn test_idle_model_reports_no_event() {
        for algorithm in BOTH {
            let (mut model, host) = cpu_model(algorithm);
            assert_eq!(model.next_occurring_event(0.0), None);
            let id = model.sleep(host, None).unwrap();
            assert_eq!(model.get_state(id), ActionState::Ignored);
            assert_eq!(model.next_occurring_event(0.0), None, "{algorithm}");
        }
    }

    #[traced_test]
    #[test]
    fn test_lazy_pops_only_due_entries() {
        let (mut model, host) = cpu_model(UpdateAlgorithm::Lazy);
        let short = model.execute(host, 100.0).unwrap();
        let long = model.execute(host, 1000.0).unwrap();

        assert_eq!(model.next_occurring_event(0.0), Some(2.0));
        model.set_time(2.0);
        model.update_actions_state(2.0, 2.0);
        assert_eq!(model.get_state(short), ActionState::Finished);
        assert_eq!(model.get_state(long), ActionState::Started);
        assert!(!model.action(short).unwrap().has_heap_entry());

        // long had 900 left at t=2 and now runs alone at 100.
        assert_eq!(model.next_occurring_event(2.0), Some(9.0));
        assert_eq!(model.heap().len(), 1);
        assert_eq!(model.action(long).unwrap().heap_date(), Some(11.0));
    }

    fn assert_one_entry_per_action(model: &Model, ids: &[ActionId]) {
        let scheduled = ids
            .iter()
            .filter(|&&id| model.action(id).unwrap().has_heap_entry())
            .count();
        assert_eq!(model.heap().len(), scheduled);
        for &id in ids {
            let action = model.action(id).unwrap();
            assert_eq!(
                action.has_heap_entry(),
                action.heap_kind() != HeapEntryKind::Unset,
                "{id}"
            );
            assert_eq!(action.has_heap_entry(), action.heap_date().is_some(), "{id}");
        }
    }

    #[traced_test]
    #[test]
    fn test_heap_holds_one_entry_per_action() {
        let (mut model, link) = link_model(UpdateAlgorithm::Lazy, 100.0, 1.0);
        let a = model.communicate(&[link], 1000.0, None).unwrap();
        let b = model.communicate(&[link], 500.0, None).unwrap();
        let ids = [a, b];
        assert_one_entry_per_action(&model, &ids);
        assert_eq!(model.heap().len(), 2);

        model.set_max_duration(b, Some(0.5));
        model.set_bound(a, 50.0);
        assert_one_entry_per_action(&model, &ids);
        assert_eq!(model.action(a).unwrap().heap_kind(), HeapEntryKind::Latency);
        assert_eq!(model.action(b).unwrap().heap_kind(), HeapEntryKind::MaxDuration);

        assert_eq!(step(&mut model, 10.0), 0.5);
        assert_eq!(model.get_state(b), ActionState::Finished);
        assert_one_entry_per_action(&model, &ids);
        assert_eq!(model.heap().len(), 1);

        // Latency pop: a waits for the next solve with no entry.
        assert_eq!(step(&mut model, 10.0), 1.0);
        assert_one_entry_per_action(&model, &ids);
        assert!(model.heap().is_empty());

        assert_eq!(model.next_occurring_event(1.0), Some(20.0));
        assert_eq!(model.action(a).unwrap().heap_kind(), HeapEntryKind::Normal);
        assert_one_entry_per_action(&model, &ids);

        model.suspend(a);
        assert_one_entry_per_action(&model, &ids);
        assert!(model.heap().is_empty());
        model.resume(a);
        assert_eq!(model.next_occurring_event(1.0), Some(20.0));
        assert_one_entry_per_action(&model, &ids);
        assert_eq!(model.heap().len(), 1);

        model.set_max_duration(a, Some(5.0));
        assert_eq!(model.next_occurring_event(1.0), Some(5.0));
        assert_eq!(model.action(a).unwrap().heap_kind(), HeapEntryKind::MaxDuration);
        assert_one_entry_per_action(&model, &ids);
        assert_eq!(model.heap().len(), 1);

        run_until(&mut model, 10.0);
        assert_eq!(model.action(a).unwrap().finish_time(), Some(6.0));
        assert_one_entry_per_action(&model, &ids);
        assert!(model.heap().is_empty());
    }
}
