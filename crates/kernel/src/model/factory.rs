//! Action factories.
//!
//! Every factory validates its arguments before touching any state, so an
//! `Err` leaves the model exactly as it was.

use super::Model;
use crate::action::{Action, ActionKind, IoOp};
use crate::error::KernelError;
use crate::resource::{Resource, ResourceKind};
use ressim_types::{ActionId, ActionState, ModelKind, ResourceId, SuspendState};
use tracing::debug;

impl Model {
    /// Start `flops` of computation on `host` using one core.
    pub fn execute(&mut self, host: ResourceId, flops: f64) -> Result<ActionId, KernelError> {
        self.execute_on_cores(host, flops, 1)
    }

    /// Start `flops` of computation on `host` using `requested_cores`.
    pub fn execute_on_cores(
        &mut self,
        host: ResourceId,
        flops: f64,
        requested_cores: u32,
    ) -> Result<ActionId, KernelError> {
        self.new_execution(host, flops, requested_cores, false)
    }

    /// Create an execution in `Inited`; it receives no share until
    /// [`start`](Model::start).
    pub fn execution_init(
        &mut self,
        host: ResourceId,
        flops: f64,
        requested_cores: u32,
    ) -> Result<ActionId, KernelError> {
        self.new_execution(host, flops, requested_cores, true)
    }

    fn new_execution(
        &mut self,
        host: ResourceId,
        flops: f64,
        requested_cores: u32,
        deferred: bool,
    ) -> Result<ActionId, KernelError> {
        self.require_model(ModelKind::Cpu)?;
        check_amount("flops", flops)?;
        let resource = self.lookup(host)?;
        let ResourceKind::Cpu {
            speed_peak,
            speed_scale,
            cores,
        } = resource.kind
        else {
            return Err(wrong_kind(host, "cpu", resource));
        };
        if requested_cores == 0 || requested_cores > cores {
            return Err(KernelError::InvalidArgument(format!(
                "requested {requested_cores} cores on a {cores}-core host"
            )));
        }
        let Some(cnst) = resource.constraint else {
            return Err(KernelError::UnknownResource(host));
        };
        let failed = resource.is_off();

        let priority = 1.0 / f64::from(requested_cores);
        let bound = f64::from(requested_cores) * speed_scale * speed_peak;
        let mut action = Action::new(
            ActionKind::Execution {
                host,
                requested_cores,
            },
            flops,
            self.now,
        );
        action.priority = priority;
        action.bound = bound;

        let state = match (failed, deferred) {
            (true, _) => ActionState::Failed,
            (false, true) => ActionState::Inited,
            (false, false) => ActionState::Started,
        };
        let id = self.create_action(action, state);
        let var = self.solver.variable_new(id, priority, bound, 1);
        self.solver.expand(cnst, var, 1.0);
        self.action_mut(id).variable = Some(var);
        self.sync_weight(id);

        debug!(model = %self.kind, action = %id, %host, flops, requested_cores, deferred, "Execution created");
        Ok(id)
    }

    /// Idle on `host` for `duration` seconds, or forever when `None`.
    ///
    /// An endless sleep is `Ignored`: it never completes on its own and only
    /// ends when cancelled or when the host fails.
    pub fn sleep(&mut self, host: ResourceId, duration: Option<f64>) -> Result<ActionId, KernelError> {
        self.require_model(ModelKind::Cpu)?;
        if let Some(d) = duration {
            check_amount("duration", d)?;
        }
        let resource = self.lookup(host)?;
        let ResourceKind::Cpu {
            speed_peak,
            speed_scale,
            ..
        } = resource.kind
        else {
            return Err(wrong_kind(host, "cpu", resource));
        };
        let Some(cnst) = resource.constraint else {
            return Err(KernelError::UnknownResource(host));
        };
        let failed = resource.is_off();

        let surf = self.precision.surf;
        let duration = duration.map(|d| if d > 0.0 { d.max(surf) } else { d });
        let now = self.now;
        let mut action = Action::new(ActionKind::Sleep { host }, 1.0, now);
        action.max_duration = duration;
        action.deadline = duration.map(|d| now + d);
        action.suspended = SuspendState::Sleeping;

        let state = match (failed, duration) {
            (true, _) => ActionState::Failed,
            (false, None) => ActionState::Ignored,
            (false, Some(_)) => ActionState::Started,
        };
        let id = self.create_action(action, state);
        let var = self
            .solver
            .variable_new(id, 0.0, speed_scale * speed_peak, 1);
        self.solver.expand(cnst, var, 1.0);
        self.action_mut(id).variable = Some(var);
        self.sync_weight(id);

        // The solver ignores weightless variables, so the deadline has to be
        // projected explicitly.
        if self.is_lazy() && state == ActionState::Started {
            self.heap_remove(id);
            self.modified_push_front(id);
        }

        debug!(model = %self.kind, action = %id, %host, ?duration, %state, "Sleep created");
        Ok(id)
    }

    /// Transfer `size` bytes along `route`, optionally capped at `rate`.
    ///
    /// The transfer gets no bandwidth until the summed latency of the route
    /// has elapsed.
    pub fn communicate(
        &mut self,
        route: &[ResourceId],
        size: f64,
        rate: Option<f64>,
    ) -> Result<ActionId, KernelError> {
        self.require_model(ModelKind::Network)?;
        check_amount("size", size)?;
        if let Some(rate) = rate {
            check_amount("rate", rate)?;
        }

        let mut latency = 0.0;
        let mut failed = false;
        let mut constraints = Vec::with_capacity(route.len());
        for &link in route {
            let resource = self.lookup(link)?;
            let ResourceKind::Link {
                latency: link_latency,
                ..
            } = resource.kind
            else {
                return Err(wrong_kind(link, "link", resource));
            };
            let Some(cnst) = resource.constraint else {
                return Err(KernelError::UnknownResource(link));
            };
            latency += link_latency;
            failed |= resource.is_off();
            constraints.push(cnst);
        }

        let now = self.now;
        let mut action = Action::new(
            ActionKind::Communication {
                route: route.to_vec(),
                latency,
                rate,
            },
            size,
            now,
        );
        action.bound = rate.unwrap_or(0.0);

        let state = if failed {
            ActionState::Failed
        } else {
            ActionState::Started
        };
        let id = self.create_action(action, state);
        let var = self
            .solver
            .variable_new(id, 1.0, rate.unwrap_or(0.0), constraints.len());
        for cnst in constraints {
            self.solver.expand_add(cnst, var, 1.0);
        }
        self.action_mut(id).variable = Some(var);
        self.sync_weight(id);

        if self.is_lazy() && state == ActionState::Started {
            let action = self.action_ref(id);
            if latency > 0.0 || action.kind.is_routeless() {
                self.schedule_latency(id);
            }
        }

        debug!(model = %self.kind, action = %id, links = route.len(), size, latency, %state, "Communication created");
        Ok(id)
    }

    /// Read or write `size` bytes on `disk`.
    pub fn io_start(&mut self, disk: ResourceId, size: f64, op: IoOp) -> Result<ActionId, KernelError> {
        self.require_model(ModelKind::Storage)?;
        check_amount("size", size)?;
        let resource = self.lookup(disk)?;
        let ResourceKind::Disk {
            read_bandwidth,
            write_bandwidth,
            ..
        } = resource.kind
        else {
            return Err(wrong_kind(disk, "disk", resource));
        };
        let Some(cnst) = resource.constraint else {
            return Err(KernelError::UnknownResource(disk));
        };
        let failed = resource.is_off();
        let bound = match op {
            IoOp::Read => read_bandwidth,
            IoOp::Write => write_bandwidth,
        };

        let mut action = Action::new(ActionKind::Io { disk, op }, size, self.now);
        action.bound = bound;
        let state = if failed {
            ActionState::Failed
        } else {
            ActionState::Started
        };
        let id = self.create_action(action, state);
        let var = self.solver.variable_new(id, 1.0, bound, 1);
        self.solver.expand(cnst, var, 1.0);
        self.action_mut(id).variable = Some(var);
        self.sync_weight(id);

        debug!(model = %self.kind, action = %id, %disk, size, ?op, %state, "I/O created");
        Ok(id)
    }

    fn require_model(&self, expected: ModelKind) -> Result<(), KernelError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(KernelError::WrongModel {
                expected,
                actual: self.kind,
            })
        }
    }

    pub(crate) fn lookup(&self, id: ResourceId) -> Result<&Resource, KernelError> {
        self.resources
            .get(id)
            .ok_or(KernelError::UnknownResource(id))
    }
}

fn wrong_kind(resource: ResourceId, expected: &'static str, actual: &Resource) -> KernelError {
    KernelError::WrongResourceKind {
        resource,
        expected,
        actual: actual.kind.label(),
    }
}

/// Reject negative and non-finite amounts.
pub(crate) fn check_amount(name: &str, value: f64) -> Result<(), KernelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument(format!(
            "{name} must be a finite non-negative number, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::testing::cpu_model;
    use crate::{ActionKind, IoOp, KernelError, Model, SharingPolicy};
    use ressim_types::{
        ActionState, HeapEntryKind, ModelKind, Precision, ResourceId, SuspendState,
        UpdateAlgorithm,
    };
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_execution_weight_and_bound_follow_cores() {
        let mut model = Model::new(ModelKind::Cpu, UpdateAlgorithm::Lazy, Precision::default());
        let host = model.add_cpu("quad", 10.0, 4).unwrap();
        let id = model.execute_on_cores(host, 100.0, 2).unwrap();

        let action = model.action(id).unwrap();
        assert_eq!(action.priority(), 0.5);
        assert_eq!(action.bound(), 20.0);
        assert!(matches!(
            action.kind(),
            ActionKind::Execution {
                requested_cores: 2,
                ..
            }
        ));
        let var = action.variable().unwrap();
        assert_eq!(model.solver().variable_weight(var), 0.5);

        // Alone on the host, capped by its two cores.
        assert_eq!(model.next_occurring_event(0.0), Some(5.0));
        assert_eq!(model.rate(id), 20.0);
    }

    #[traced_test]
    #[test]
    fn test_execution_rejects_bad_arguments() {
        let (mut model, host) = cpu_model(UpdateAlgorithm::Full);
        assert!(matches!(
            model.execute_on_cores(host, 10.0, 2),
            Err(KernelError::InvalidArgument(_))
        ));
        assert!(matches!(
            model.execute(host, -1.0),
            Err(KernelError::InvalidArgument(_))
        ));
        assert!(matches!(
            model.execute(host, f64::NAN),
            Err(KernelError::InvalidArgument(_))
        ));
        assert!(matches!(
            model.execute(ResourceId::default(), 10.0),
            Err(KernelError::UnknownResource(_))
        ));
        assert!(model.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_factory_on_wrong_model_is_rejected() {
        let (mut model, host) = cpu_model(UpdateAlgorithm::Lazy);
        assert_eq!(
            model.communicate(&[], 10.0, None),
            Err(KernelError::WrongModel {
                expected: ModelKind::Network,
                actual: ModelKind::Cpu,
            })
        );
        assert!(matches!(
            model.io_start(host, 10.0, IoOp::Read),
            Err(KernelError::WrongModel { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn test_sleep_setup() {
        for algorithm in [UpdateAlgorithm::Lazy, UpdateAlgorithm::Full] {
            let (mut model, host) = cpu_model(algorithm);
            let id = model.sleep(host, Some(1e-9)).unwrap();
            let action = model.action(id).unwrap();
            assert_eq!(action.suspend_state(), SuspendState::Sleeping);
            assert_eq!(action.max_duration(), Some(model.precision().surf));
            let var = action.variable().unwrap();
            assert_eq!(model.solver().variable_weight(var), 0.0);
            assert_eq!(
                model.is_in_modified_set(id),
                algorithm == UpdateAlgorithm::Lazy
            );
        }
    }

    #[traced_test]
    #[test]
    fn test_communication_sums_route_latency() {
        let mut model = Model::new(ModelKind::Network, UpdateAlgorithm::Lazy, Precision::default());
        let a = model
            .add_link("a", 100.0, 0.25, SharingPolicy::Shared)
            .unwrap();
        let b = model
            .add_link("b", 50.0, 0.5, SharingPolicy::Shared)
            .unwrap();
        let id = model.communicate(&[a, b], 100.0, Some(40.0)).unwrap();

        let action = model.action(id).unwrap();
        assert_eq!(action.kind().latency(), 0.75);
        assert_eq!(action.kind().resources(), &[a, b]);
        assert_eq!(action.heap_kind(), HeapEntryKind::Latency);
        assert_eq!(action.heap_date(), Some(0.75));
        let var = action.variable().unwrap();
        assert_eq!(model.solver().variable_weight(var), 0.0);
        assert_eq!(model.solver().variable_bound(var), 40.0);
        assert_eq!(model.solver().variable_constraints(var).len(), 2);
    }

    #[traced_test]
    #[test]
    fn test_communication_over_off_link_is_born_failed() {
        let mut model = Model::new(ModelKind::Network, UpdateAlgorithm::Lazy, Precision::default());
        let up = model
            .add_link("up", 100.0, 1.0, SharingPolicy::Shared)
            .unwrap();
        let down = model
            .add_link("down", 100.0, 1.0, SharingPolicy::Shared)
            .unwrap();
        model.turn_off(down).unwrap();

        let id = model.communicate(&[up, down], 100.0, None).unwrap();
        assert_eq!(model.get_state(id), ActionState::Failed);
        assert!(!model.action(id).unwrap().has_heap_entry());
        assert!(model.heap().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_io_bound_follows_direction() {
        let mut model = Model::new(ModelKind::Storage, UpdateAlgorithm::Full, Precision::default());
        let disk = model.add_disk("disk", 100.0, 80.0, 30.0).unwrap();
        let read = model.io_start(disk, 10.0, IoOp::Read).unwrap();
        let write = model.io_start(disk, 10.0, IoOp::Write).unwrap();
        assert_eq!(model.action(read).unwrap().bound(), 80.0);
        assert_eq!(model.action(write).unwrap().bound(), 30.0);
        assert_eq!(model.action(write).unwrap().kind().label(), "write");
    }
}
