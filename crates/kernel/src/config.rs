//! Kernel configuration.

use ressim_types::{ModelKind, Precision, UpdateAlgorithm};
use serde::{Deserialize, Serialize};

/// Configuration shared by every model of a [`SimContext`](crate::SimContext).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Snap thresholds for remaining work, durations and solver values.
    pub precision: Precision,

    /// Update algorithm of the processor model.
    pub cpu_algorithm: UpdateAlgorithm,

    /// Update algorithm of the network model.
    pub network_algorithm: UpdateAlgorithm,

    /// Update algorithm of the storage model.
    pub storage_algorithm: UpdateAlgorithm,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            cpu_algorithm: UpdateAlgorithm::Lazy,
            network_algorithm: UpdateAlgorithm::Lazy,
            storage_algorithm: UpdateAlgorithm::Full,
        }
    }
}

impl KernelConfig {
    /// Use one algorithm for every model.
    pub fn uniform(algorithm: UpdateAlgorithm) -> Self {
        Self {
            cpu_algorithm: algorithm,
            network_algorithm: algorithm,
            storage_algorithm: algorithm,
            ..Default::default()
        }
    }

    /// Set the precision thresholds.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the surf (duration) precision.
    pub fn with_surf_precision(mut self, surf: f64) -> Self {
        self.precision.surf = surf;
        self
    }

    /// Set the solver precision.
    pub fn with_maxmin_precision(mut self, maxmin: f64) -> Self {
        self.precision.maxmin = maxmin;
        self
    }

    /// Set the algorithm of one model.
    pub fn with_algorithm(mut self, model: ModelKind, algorithm: UpdateAlgorithm) -> Self {
        match model {
            ModelKind::Cpu => self.cpu_algorithm = algorithm,
            ModelKind::Network => self.network_algorithm = algorithm,
            ModelKind::Storage => self.storage_algorithm = algorithm,
        }
        self
    }

    /// Algorithm configured for `model`.
    pub fn algorithm(&self, model: ModelKind) -> UpdateAlgorithm {
        match model {
            ModelKind::Cpu => self.cpu_algorithm,
            ModelKind::Network => self.network_algorithm,
            ModelKind::Storage => self.storage_algorithm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.algorithm(ModelKind::Cpu), UpdateAlgorithm::Lazy);
        assert_eq!(config.algorithm(ModelKind::Network), UpdateAlgorithm::Lazy);
        assert_eq!(config.algorithm(ModelKind::Storage), UpdateAlgorithm::Full);
        assert_eq!(config.precision.surf, 1e-5);
    }

    #[test]
    fn test_builders() {
        let config = KernelConfig::uniform(UpdateAlgorithm::Full)
            .with_algorithm(ModelKind::Network, UpdateAlgorithm::Lazy)
            .with_surf_precision(1e-9);
        assert_eq!(config.cpu_algorithm, UpdateAlgorithm::Full);
        assert_eq!(config.network_algorithm, UpdateAlgorithm::Lazy);
        assert_eq!(config.precision.surf, 1e-9);
    }
}
