//! Resource creation, on/off switching and load-trace events.

use super::factory::check_amount;
use super::Model;
use crate::action::ActionKind;
use crate::error::KernelError;
use crate::resource::{Resource, ResourceKind, TraceKind};
use ressim_lmm::SharingPolicy;
use ressim_types::{ActionState, ResourceId};
use tracing::{debug, info, warn};

impl Model {
    /// Add a processor with `cores` cores of `speed_peak` flop/s each.
    pub fn add_cpu(
        &mut self,
        name: impl Into<String>,
        speed_peak: f64,
        cores: u32,
    ) -> Result<ResourceId, KernelError> {
        check_amount("speed", speed_peak)?;
        if cores == 0 {
            return Err(KernelError::InvalidArgument(
                "a cpu needs at least one core".to_string(),
            ));
        }
        self.add_resource(
            name.into(),
            ResourceKind::Cpu {
                speed_peak,
                speed_scale: 1.0,
                cores,
            },
            SharingPolicy::Shared,
        )
    }

    /// Add a link of `bandwidth` bytes/s and `latency` seconds.
    pub fn add_link(
        &mut self,
        name: impl Into<String>,
        bandwidth: f64,
        latency: f64,
        sharing: SharingPolicy,
    ) -> Result<ResourceId, KernelError> {
        check_amount("bandwidth", bandwidth)?;
        check_amount("latency", latency)?;
        self.add_resource(
            name.into(),
            ResourceKind::Link {
                bandwidth_peak: bandwidth,
                bandwidth_scale: 1.0,
                latency,
                sharing,
            },
            sharing,
        )
    }

    /// Add a disk whose transfers share `bandwidth` bytes/s, each read or
    /// write further capped by its own bandwidth.
    pub fn add_disk(
        &mut self,
        name: impl Into<String>,
        bandwidth: f64,
        read_bandwidth: f64,
        write_bandwidth: f64,
    ) -> Result<ResourceId, KernelError> {
        check_amount("bandwidth", bandwidth)?;
        check_amount("read bandwidth", read_bandwidth)?;
        check_amount("write bandwidth", write_bandwidth)?;
        self.add_resource(
            name.into(),
            ResourceKind::Disk {
                bandwidth_peak: bandwidth,
                bandwidth_scale: 1.0,
                read_bandwidth,
                write_bandwidth,
            },
            SharingPolicy::Shared,
        )
    }

    fn add_resource(
        &mut self,
        name: String,
        kind: ResourceKind,
        sharing: SharingPolicy,
    ) -> Result<ResourceId, KernelError> {
        let expected = kind.model();
        if expected != self.kind {
            return Err(KernelError::WrongModel {
                expected,
                actual: self.kind,
            });
        }
        if self.resource_by_name(&name).is_some() {
            return Err(KernelError::InvalidArgument(format!(
                "a resource named {name} already exists"
            )));
        }

        let capacity = kind.capacity();
        let id = self.resources.insert(Resource::new(name, kind));
        let cnst = self.solver.constraint_new(id, capacity, sharing);
        let resource = &mut self.resources[id];
        resource.constraint = Some(cnst);

        debug!(model = %self.kind, resource = %resource, capacity, "Resource added");
        Ok(id)
    }

    pub fn is_on(&self, id: ResourceId) -> Result<bool, KernelError> {
        Ok(self.lookup(id)?.is_on())
    }

    /// Current load: the summed (or, on a fat pipe, maximum) rate of the
    /// actions using the resource.
    pub fn get_load(&self, id: ResourceId) -> Result<f64, KernelError> {
        let resource = self.lookup(id)?;
        Ok(resource
            .constraint
            .map_or(0.0, |cnst| self.solver.constraint_usage(cnst)))
    }

    /// Bring a resource back. Actions that failed with it stay failed.
    pub fn turn_on(&mut self, id: ResourceId) -> Result<(), KernelError> {
        let resource = self.lookup_mut(id)?;
        if resource.is_on {
            return Ok(());
        }
        resource.is_on = true;
        info!(model = %self.kind, resource = %self.resources[id], "Resource turned on");
        Ok(())
    }

    /// Switch a resource off, failing every non-terminal action bound to it,
    /// `Ignored` ones included.
    ///
    /// Failed actions keep the remains they had at the failure date.
    pub fn turn_off(&mut self, id: ResourceId) -> Result<(), KernelError> {
        let resource = self.lookup_mut(id)?;
        if !resource.is_on {
            return Ok(());
        }
        resource.is_on = false;
        let constraint = resource.constraint;

        let now = self.now;
        let mut failed = 0usize;
        if let Some(cnst) = constraint {
            for var in self.solver.constraint_variables(cnst) {
                let owner = self.solver.variable_owner(var);
                let state = self.get_state(owner);
                if state.is_terminal() {
                    continue;
                }
                if self.is_lazy() && self.action_ref(owner).is_running() {
                    self.update_remains_lazy(owner, now);
                    if self.get_state(owner).is_terminal() {
                        continue;
                    }
                }
                self.action_mut(owner).finish_time = Some(now);
                self.set_state(owner, ActionState::Failed);
                failed += 1;
            }
        }

        info!(model = %self.kind, resource = %self.resources[id], failed, "Resource turned off");
        Ok(())
    }

    /// Declare that a load trace drives `kind` on this resource.
    pub fn subscribe_trace(&mut self, id: ResourceId, kind: TraceKind) -> Result<(), KernelError> {
        let resource = self.lookup_mut(id)?;
        if kind == TraceKind::Latency && !matches!(resource.kind, ResourceKind::Link { .. }) {
            return Err(KernelError::WrongResourceKind {
                resource: id,
                expected: "link",
                actual: resource.kind.label(),
            });
        }
        if !resource.subscriptions.contains(&kind) {
            resource.subscriptions.push(kind);
        }
        Ok(())
    }

    /// Apply one load-trace value.
    ///
    /// * `Availability`: fraction of the peak capacity.
    /// * `Latency`: new link latency, seen by later communications.
    /// * `State`: on when positive, off otherwise.
    pub fn apply_event(
        &mut self,
        id: ResourceId,
        kind: TraceKind,
        value: f64,
    ) -> Result<(), KernelError> {
        let resource = self.lookup(id)?;
        if !resource.is_subscribed(kind) {
            warn!(model = %self.kind, resource = %resource, %kind, "Event on an unsubscribed trace");
        }
        debug!(model = %self.kind, resource = %resource, %kind, value, "Trace event");

        match kind {
            TraceKind::Availability => self.set_availability(id, value),
            TraceKind::Latency => self.set_latency(id, value),
            TraceKind::State if value > 0.0 => self.turn_on(id),
            TraceKind::State => self.turn_off(id),
        }
    }

    fn set_availability(&mut self, id: ResourceId, scale: f64) -> Result<(), KernelError> {
        check_amount("availability", scale)?;
        let resource = self.lookup_mut(id)?;
        let cpu_peak = match &mut resource.kind {
            ResourceKind::Cpu {
                speed_peak,
                speed_scale,
                ..
            } => {
                *speed_scale = scale;
                Some(*speed_peak)
            }
            ResourceKind::Link {
                bandwidth_scale, ..
            }
            | ResourceKind::Disk {
                bandwidth_scale, ..
            } => {
                *bandwidth_scale = scale;
                None
            }
        };
        let capacity = resource.kind.capacity();
        let Some(cnst) = resource.constraint else {
            return Ok(());
        };
        self.solver.update_constraint_bound(cnst, capacity);

        let now = self.now;
        for var in self.solver.constraint_variables(cnst) {
            let owner = self.solver.variable_owner(var);
            let cores = match self.action_ref(owner).kind {
                ActionKind::Execution {
                    requested_cores, ..
                } => Some(requested_cores),
                _ => None,
            };
            if let (Some(peak), Some(cores)) = (cpu_peak, cores) {
                let bound = f64::from(cores) * scale * peak;
                self.action_mut(owner).bound = bound;
                self.solver.update_variable_bound(var, bound);
            }

            // A capacity of zero leaves the owners out of the next solve, so
            // reschedule them here.
            if self.is_lazy() && self.action_ref(owner).is_running() {
                self.update_remains_lazy(owner, now);
                if self.get_state(owner) == ActionState::Started {
                    self.heap_remove(owner);
                    self.modified_push_back(owner);
                }
            }
        }
        Ok(())
    }

    fn set_latency(&mut self, id: ResourceId, value: f64) -> Result<(), KernelError> {
        check_amount("latency", value)?;
        let resource = self.lookup_mut(id)?;
        match &mut resource.kind {
            ResourceKind::Link { latency, .. } => {
                *latency = value;
                Ok(())
            }
            other => Err(KernelError::WrongResourceKind {
                resource: id,
                expected: "link",
                actual: other.label(),
            }),
        }
    }

    fn lookup_mut(&mut self, id: ResourceId) -> Result<&mut Resource, KernelError> {
        self.resources
            .get_mut(id)
            .ok_or(KernelError::UnknownResource(id))
    }
}
