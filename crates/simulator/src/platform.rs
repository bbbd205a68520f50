//! Platform instantiation: resources created from a [`PlatformConfig`].

use crate::config::{PlatformConfig, ScenarioError, TraceConfig};
use ressim_kernel::SharingPolicy;
use ressim_simulation::SimulationRunner;
use ressim_types::{ModelKind, ResourceId};
use std::collections::HashMap;
use tracing::info;

/// Resources of a running scenario, grouped by kind.
#[derive(Debug, Default, Clone)]
pub struct Platform {
    pub cpus: Vec<ResourceId>,
    pub links: Vec<ResourceId>,
    pub disks: Vec<ResourceId>,
    by_name: HashMap<String, (ModelKind, ResourceId)>,
}

impl Platform {
    /// Create every configured resource in the runner's models.
    pub fn build(
        runner: &mut SimulationRunner,
        config: &PlatformConfig,
    ) -> Result<Self, ScenarioError> {
        let mut platform = Self::default();
        let ctx = runner.context_mut();

        for cpu in &config.cpus {
            let id = ctx.cpu_mut().add_cpu(&cpu.name, cpu.speed, cpu.cores)?;
            platform.register(&cpu.name, ModelKind::Cpu, id)?;
            platform.cpus.push(id);
        }
        for link in &config.links {
            let policy = if link.fatpipe {
                SharingPolicy::FatPipe
            } else {
                SharingPolicy::Shared
            };
            let id = ctx
                .network_mut()
                .add_link(&link.name, link.bandwidth, link.latency, policy)?;
            platform.register(&link.name, ModelKind::Network, id)?;
            platform.links.push(id);
        }
        for disk in &config.disks {
            let id = ctx
                .storage_mut()
                .add_disk(&disk.name, disk.bandwidth, disk.read, disk.write)?;
            platform.register(&disk.name, ModelKind::Storage, id)?;
            platform.disks.push(id);
        }

        info!(
            cpus = platform.cpus.len(),
            links = platform.links.len(),
            disks = platform.disks.len(),
            "Platform built"
        );
        Ok(platform)
    }

    /// Names are unique across models.
    fn register(
        &mut self,
        name: &str,
        model: ModelKind,
        id: ResourceId,
    ) -> Result<(), ScenarioError> {
        if self.by_name.insert(name.to_string(), (model, id)).is_some() {
            return Err(ScenarioError::Invalid(format!(
                "resource name {name} is used twice"
            )));
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<(ModelKind, ResourceId)> {
        self.by_name.get(name).copied()
    }

    /// Queue a configured trace on the runner.
    pub fn install_trace(
        &self,
        runner: &mut SimulationRunner,
        trace: &TraceConfig,
    ) -> Result<(), ScenarioError> {
        let (model, resource) = self
            .lookup(&trace.resource)
            .ok_or_else(|| ScenarioError::UnknownResource(trace.resource.clone()))?;
        runner.add_trace(model, resource, trace.kind, &trace.points)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpuConfig, LinkConfig};
    use ressim_kernel::{KernelConfig, TraceKind};

    #[test]
    fn test_build_and_lookup() {
        let mut runner = SimulationRunner::new(KernelConfig::default());
        let config = PlatformConfig {
            cpus: vec![CpuConfig::new("host", 100.0, 2)],
            links: vec![LinkConfig::new("lan", 1000.0, 0.1).with_fatpipe()],
            disks: vec![],
        };
        let platform = Platform::build(&mut runner, &config).unwrap();

        assert_eq!(platform.lookup("host"), Some((ModelKind::Cpu, platform.cpus[0])));
        assert_eq!(platform.lookup("lan"), Some((ModelKind::Network, platform.links[0])));
        assert_eq!(platform.lookup("nope"), None);
        let lan = runner.context().network().resource(platform.links[0]).unwrap();
        assert_eq!(lan.get_name(), "lan");
    }

    #[test]
    fn test_names_are_unique_across_models() {
        let mut runner = SimulationRunner::new(KernelConfig::default());
        let config = PlatformConfig {
            cpus: vec![CpuConfig::new("node", 100.0, 1)],
            links: vec![LinkConfig::new("node", 1000.0, 0.0)],
            disks: vec![],
        };
        assert!(matches!(
            Platform::build(&mut runner, &config),
            Err(ScenarioError::Invalid(_))
        ));
    }

    #[test]
    fn test_trace_targets_must_exist() {
        let mut runner = SimulationRunner::new(KernelConfig::default());
        let config = PlatformConfig {
            cpus: vec![CpuConfig::new("host", 100.0, 1)],
            ..Default::default()
        };
        let platform = Platform::build(&mut runner, &config).unwrap();

        let trace = TraceConfig {
            resource: "ghost".to_string(),
            kind: TraceKind::State,
            points: vec![(1.0, 0.0)],
        };
        assert!(matches!(
            platform.install_trace(&mut runner, &trace),
            Err(ScenarioError::UnknownResource(name)) if name == "ghost"
        ));

        let trace = TraceConfig {
            resource: "host".to_string(),
            ..trace
        };
        platform.install_trace(&mut runner, &trace).unwrap();
        assert_eq!(runner.pending_traces(), 1);
    }
}
