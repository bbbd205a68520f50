//! Simulation context: the clock and one model per resource technology.

use crate::config::KernelConfig;
use crate::model::{Model, StateChange};
use ressim_types::ModelKind;
use tracing::trace;

/// Owns every model of one simulation instance.
///
/// Independent contexts share nothing, so several simulations can run side by
/// side in one process.
#[derive(Debug)]
pub struct SimContext {
    config: KernelConfig,
    now: f64,
    cpu: Model,
    network: Model,
    storage: Model,
}

impl SimContext {
    pub fn new(config: KernelConfig) -> Self {
        let model = |kind| Model::new(kind, config.algorithm(kind), config.precision);
        Self {
            cpu: model(ModelKind::Cpu),
            network: model(ModelKind::Network),
            storage: model(ModelKind::Storage),
            now: 0.0,
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Current simulated time.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn model(&self, kind: ModelKind) -> &Model {
        match kind {
            ModelKind::Cpu => &self.cpu,
            ModelKind::Network => &self.network,
            ModelKind::Storage => &self.storage,
        }
    }

    pub fn model_mut(&mut self, kind: ModelKind) -> &mut Model {
        match kind {
            ModelKind::Cpu => &mut self.cpu,
            ModelKind::Network => &mut self.network,
            ModelKind::Storage => &mut self.storage,
        }
    }

    pub fn cpu(&self) -> &Model {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Model {
        &mut self.cpu
    }

    pub fn network(&self) -> &Model {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Model {
        &mut self.network
    }

    pub fn storage(&self) -> &Model {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Model {
        &mut self.storage
    }

    /// Solve every model and return the smallest delay until one of them has
    /// an event, `None` if all are idle.
    pub fn next_occurring_event(&mut self) -> Option<f64> {
        let now = self.now;
        let mut min: Option<f64> = None;
        for kind in ModelKind::ALL {
            if let Some(delta) = self.model_mut(kind).next_occurring_event(now) {
                trace!(model = %kind, delta, "Next event");
                min = Some(min.map_or(delta, |m| m.min(delta)));
            }
        }
        min
    }

    /// Move the clock forward by `delta` and let every model catch up.
    ///
    /// # Panics
    ///
    /// If `delta` is negative or not finite.
    pub fn advance(&mut self, delta: f64) {
        assert!(
            delta.is_finite() && delta >= 0.0,
            "cannot advance the clock by {delta}"
        );
        self.now += delta;
        let now = self.now;
        for kind in ModelKind::ALL {
            self.model_mut(kind).set_time(now);
        }
        for kind in ModelKind::ALL {
            self.model_mut(kind).update_actions_state(now, delta);
        }
    }

    /// State changes of every model, cpu first, then network, then storage.
    pub fn drain_state_changes(&mut self) -> Vec<StateChange> {
        let mut changes = Vec::new();
        for kind in ModelKind::ALL {
            changes.extend(self.model_mut(kind).take_state_changes());
        }
        changes
    }
}
