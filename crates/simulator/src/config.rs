//! Scenario configuration, read from TOML.

use ressim_kernel::{KernelConfig, TraceKind};
use ressim_simulation::SimulationError;
use ressim_types::UpdateAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or instantiating a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize scenario: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(String),

    #[error("Unknown resource in scenario: {0}")]
    UnknownResource(String),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

impl From<ressim_kernel::KernelError> for ScenarioError {
    fn from(err: ressim_kernel::KernelError) -> Self {
        ScenarioError::Simulation(err.into())
    }
}

/// A complete simulation scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Random seed for the workload generator.
    pub seed: u64,

    /// Simulated seconds during which work arrives.
    pub duration: f64,

    /// Keep stepping after `duration` until every submission has ended.
    pub drain: bool,

    pub kernel: KernelConfig,

    pub platform: PlatformConfig,

    pub workload: WorkloadConfig,

    /// Load traces replayed against named resources.
    pub traces: Vec<TraceConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            duration: 60.0,
            drain: false,
            kernel: KernelConfig::default(),
            platform: PlatformConfig::default(),
            workload: WorkloadConfig::default(),
            traces: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    /// Read and validate a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a scenario.
    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ScenarioError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A small platform with every kind of resource, a flaky host and a
    /// mixed workload.
    pub fn sample() -> Self {
        Self {
            platform: PlatformConfig {
                cpus: vec![
                    CpuConfig::new("alpha", 1e9, 4),
                    CpuConfig::new("beta", 5e8, 2),
                ],
                links: vec![
                    LinkConfig::new("backbone", 1.25e9, 1e-4),
                    LinkConfig::new("uplink", 1.25e8, 5e-4),
                    LinkConfig::new("loopback", 1e10, 0.0).with_fatpipe(),
                ],
                disks: vec![DiskConfig::new("ssd", 5e8, 4e8, 2e8)],
            },
            traces: vec![TraceConfig {
                resource: "beta".to_string(),
                kind: TraceKind::State,
                points: vec![(20.0, 0.0), (30.0, 1.0)],
            }],
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_drain(mut self, drain: bool) -> Self {
        self.drain = drain;
        self
    }

    /// Use `algorithm` in every model.
    pub fn with_algorithm(mut self, algorithm: UpdateAlgorithm) -> Self {
        self.kernel = KernelConfig {
            precision: self.kernel.precision,
            ..KernelConfig::uniform(algorithm)
        };
        self
    }

    /// Check the values serde cannot.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(invalid(format!("duration must be positive, got {}", self.duration)));
        }
        self.workload.validate()?;
        if self.platform.cpus.is_empty()
            && self.platform.links.is_empty()
            && self.platform.disks.is_empty()
        {
            return Err(invalid("platform has no resource".to_string()));
        }
        for trace in &self.traces {
            if trace.points.is_empty() {
                return Err(invalid(format!("trace on {} has no point", trace.resource)));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> ScenarioError {
    ScenarioError::Invalid(message)
}

// ═══════════════════════════════════════════════════════════════════════════
// Platform
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub cpus: Vec<CpuConfig>,
    pub links: Vec<LinkConfig>,
    pub disks: Vec<DiskConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuConfig {
    pub name: String,
    /// Peak speed in flop/s.
    pub speed: f64,
    #[serde(default = "default_cores")]
    pub cores: u32,
}

fn default_cores() -> u32 {
    1
}

impl CpuConfig {
    pub fn new(name: &str, speed: f64, cores: u32) -> Self {
        Self {
            name: name.to_string(),
            speed,
            cores,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub name: String,
    /// Bytes per second.
    pub bandwidth: f64,
    /// Seconds.
    #[serde(default)]
    pub latency: f64,
    /// Every flow gets the full bandwidth instead of a share of it.
    #[serde(default)]
    pub fatpipe: bool,
}

impl LinkConfig {
    pub fn new(name: &str, bandwidth: f64, latency: f64) -> Self {
        Self {
            name: name.to_string(),
            bandwidth,
            latency,
            fatpipe: false,
        }
    }

    pub fn with_fatpipe(mut self) -> Self {
        self.fatpipe = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiskConfig {
    pub name: String,
    /// Total bytes per second, shared by reads and writes.
    pub bandwidth: f64,
    pub read: f64,
    pub write: f64,
}

impl DiskConfig {
    pub fn new(name: &str, bandwidth: f64, read: f64, write: f64) -> Self {
        Self {
            name: name.to_string(),
            bandwidth,
            read,
            write,
        }
    }
}

/// Points (date, value) replayed against one resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    pub resource: String,
    pub kind: TraceKind,
    pub points: Vec<(f64, f64)>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Workload
// ═══════════════════════════════════════════════════════════════════════════

/// Parameters of the random workload.
///
/// Arrivals follow a Poisson process. Each arrival is one batch of requests
/// whose kind is drawn with the relative weights below; amounts are drawn
/// uniformly within ±50% of the configured mean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Mean number of batches per simulated second.
    pub arrival_rate: f64,
    pub batch_size: usize,

    pub execution_weight: f64,
    pub communication_weight: f64,
    pub io_weight: f64,
    pub sleep_weight: f64,

    pub mean_flops: f64,
    pub mean_bytes: f64,
    pub mean_io_bytes: f64,
    pub mean_sleep: f64,

    /// Longest route a communication may take.
    pub max_route_hops: usize,
    /// Share of communications capped at `mean_bytes / 2` bytes per second.
    pub rate_capped_ratio: f64,
    /// Share of I/O requests that are writes.
    pub write_ratio: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            arrival_rate: 2.0,
            batch_size: 4,
            execution_weight: 4.0,
            communication_weight: 3.0,
            io_weight: 2.0,
            sleep_weight: 1.0,
            mean_flops: 2e9,
            mean_bytes: 1e8,
            mean_io_bytes: 2e8,
            mean_sleep: 1.0,
            max_route_hops: 2,
            rate_capped_ratio: 0.1,
            write_ratio: 0.3,
        }
    }
}

impl WorkloadConfig {
    pub fn with_arrival_rate(mut self, rate: f64) -> Self {
        self.arrival_rate = rate;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Only computations.
    pub fn executions_only(self) -> Self {
        Self {
            communication_weight: 0.0,
            io_weight: 0.0,
            sleep_weight: 0.0,
            ..self
        }
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if !(self.arrival_rate.is_finite() && self.arrival_rate > 0.0) {
            return Err(invalid(format!(
                "arrival_rate must be positive, got {}",
                self.arrival_rate
            )));
        }
        let weights = [
            self.execution_weight,
            self.communication_weight,
            self.io_weight,
            self.sleep_weight,
        ];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(invalid("workload weights must be non-negative".to_string()));
        }
        let means = [
            self.mean_flops,
            self.mean_bytes,
            self.mean_io_bytes,
            self.mean_sleep,
        ];
        if means.iter().any(|m| !(m.is_finite() && *m >= 0.0)) {
            return Err(invalid("workload means must be non-negative".to_string()));
        }
        for (name, ratio) in [
            ("rate_capped_ratio", self.rate_capped_ratio),
            ("write_ratio", self.write_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(invalid(format!("{name} must be within [0, 1], got {ratio}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_survives_toml() {
        let sample = ScenarioConfig::sample();
        let text = sample.to_toml().unwrap();
        assert_eq!(ScenarioConfig::from_toml_str(&text).unwrap(), sample);
    }

    #[test]
    fn test_minimal_scenario_uses_defaults() {
        let config = ScenarioConfig::from_toml_str(
            r#"
            duration = 10.0

            [[platform.cpus]]
            name = "host"
            speed = 100.0
            "#,
        )
        .unwrap();

        assert_eq!(config.duration, 10.0);
        assert_eq!(config.platform.cpus[0].cores, 1);
        assert_eq!(config.kernel, KernelConfig::default());
        assert_eq!(config.workload, WorkloadConfig::default());
    }

    #[test]
    fn test_kernel_section_selects_algorithms() {
        let config = ScenarioConfig::from_toml_str(
            r#"
            [kernel]
            cpu_algorithm = "full"

            [kernel.precision]
            surf = 1e-9

            [[platform.disks]]
            name = "d"
            bandwidth = 10.0
            read = 5.0
            write = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(config.kernel.cpu_algorithm, UpdateAlgorithm::Full);
        assert_eq!(config.kernel.network_algorithm, UpdateAlgorithm::Lazy);
        assert_eq!(config.kernel.precision.surf, 1e-9);
        assert_eq!(config.kernel.precision.maxmin, 1e-5);
    }

    #[test]
    fn test_validation() {
        let sample = ScenarioConfig::sample();
        assert!(sample.clone().with_duration(0.0).validate().is_err());
        assert!(matches!(
            ScenarioConfig::default().validate(),
            Err(ScenarioError::Invalid(_))
        ));

        let mut bad_ratio = sample.clone();
        bad_ratio.workload.write_ratio = 1.5;
        assert!(bad_ratio.validate().is_err());

        let mut no_rate = sample;
        no_rate.workload = no_rate.workload.with_arrival_rate(0.0);
        assert!(no_rate.validate().is_err());

        assert!(matches!(
            ScenarioConfig::from_toml_str("duration = \"long\""),
            Err(ScenarioError::Parse(_))
        ));
    }

    #[test]
    fn test_with_algorithm_keeps_precision() {
        let mut config = ScenarioConfig::sample();
        config.kernel.precision.surf = 1e-7;
        let config = config.with_algorithm(UpdateAlgorithm::Full);
        assert_eq!(config.kernel.storage_algorithm, UpdateAlgorithm::Full);
        assert_eq!(config.kernel.cpu_algorithm, UpdateAlgorithm::Full);
        assert_eq!(config.kernel.precision.surf, 1e-7);
    }
}
