//! Ressim Simulator
//!
//! Scenario-driven workload simulator built on top of the simulation runner.
//!
//! # Architecture
//!
//! The simulator builds on `ressim-simulation` to provide:
//!
//! - **Scenarios**: platform, kernel options, load traces and workload read
//!   from TOML
//! - **Workload Generation**: seeded Poisson arrivals of executions,
//!   communications, disk I/O and sleeps
//! - **Metrics Collection**: completion latency percentiles and failure
//!   counts per kind of work
//! - **Algorithm Comparison**: the same scenario under lazy and full updates
//!
//! # Example
//!
//! ```ignore
//! use ressim_simulator::{ScenarioConfig, Simulator};
//!
//! let config = ScenarioConfig::sample().with_seed(42).with_duration(120.0);
//! let report = Simulator::new(config)?.run();
//!
//! println!("Throughput: {:.2}/s", report.throughput());
//! println!("P99 latency: {:.4}s", report.p99_latency);
//! ```

pub mod config;
pub mod metrics;
pub mod platform;
pub mod runner;
pub mod workload;

pub use config::{
    CpuConfig, DiskConfig, LinkConfig, PlatformConfig, ScenarioConfig, ScenarioError,
    TraceConfig, WorkloadConfig,
};
pub use metrics::{MetricsCollector, SimulationReport};
pub use platform::Platform;
pub use runner::{compare_algorithms, AlgorithmComparison, Simulator};
pub use workload::{RandomWorkload, WorkRequest, WorkloadGenerator};
