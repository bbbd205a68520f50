//! Scenario simulator: platform, traces and workload on top of the runner.

use crate::config::{ScenarioConfig, ScenarioError};
use crate::metrics::{MetricsCollector, SimulationReport};
use crate::platform::Platform;
use crate::workload::{RandomWorkload, WorkRequest, WorkloadGenerator};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ressim_simulation::{SimulationError, SimulationRunner};
use ressim_types::{ActivityRef, UpdateAlgorithm};
use tracing::{debug, info, warn};

/// Runs one scenario to its end time.
pub struct Simulator {
    config: ScenarioConfig,
    runner: SimulationRunner,
    platform: Platform,
    workload: RandomWorkload,
    rng: ChaCha8Rng,
    metrics: MetricsCollector,
}

impl Simulator {
    /// Build the platform and queue the traces.
    pub fn new(config: ScenarioConfig) -> Result<Self, ScenarioError> {
        config.validate()?;
        let mut runner = SimulationRunner::new(config.kernel.clone());
        let platform = Platform::build(&mut runner, &config.platform)?;
        for trace in &config.traces {
            platform.install_trace(&mut runner, trace)?;
        }

        info!(
            seed = config.seed,
            duration = config.duration,
            traces = config.traces.len(),
            "Simulator initialized"
        );
        Ok(Self {
            workload: RandomWorkload::new(config.workload.clone()),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            metrics: MetricsCollector::new(),
            config,
            runner,
            platform,
        })
    }

    pub fn runner(&self) -> &SimulationRunner {
        &self.runner
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Generate arrivals until the configured duration, optionally drain,
    /// and report.
    pub fn run(mut self) -> SimulationReport {
        let end = self.config.duration;
        let mut next_arrival = self.workload.next_interarrival(&mut self.rng);
        let mut batches = 0u64;

        while next_arrival < end {
            self.runner.run_until(next_arrival);
            self.collect();

            let requests = self.workload.generate_batch(&self.platform, &mut self.rng);
            debug!(time = next_arrival, requests = requests.len(), "Batch arrived");
            for request in requests {
                self.submit(request);
            }
            batches += 1;
            next_arrival += self.workload.next_interarrival(&mut self.rng);
        }

        self.runner.run_until(end);
        if self.config.drain {
            self.runner.run_to_completion();
        }
        self.collect();

        let stats = self.runner.stats().clone();
        info!(
            batches,
            submitted = stats.submitted,
            finished = self.metrics.finished(),
            failed = self.metrics.failed(),
            pending = self.runner.pending(),
            now = self.runner.now(),
            "Scenario complete"
        );
        self.metrics.finish(
            self.config.seed,
            self.runner.now(),
            self.runner.pending(),
            stats,
        )
    }

    fn submit(&mut self, request: WorkRequest) -> Option<ActivityRef> {
        let label = request.label();
        let result: Result<ActivityRef, SimulationError> = match request {
            WorkRequest::Execution { host, flops } => self.runner.submit_execution(host, flops),
            WorkRequest::Communication { route, size, rate } => {
                self.runner.submit_communication(&route, size, rate)
            }
            WorkRequest::Io { disk, size, op } => self.runner.submit_io(disk, size, op),
            WorkRequest::Sleep { host, duration } => self.runner.submit_sleep(host, duration),
        };
        match result {
            Ok(activity) => Some(activity),
            Err(err) => {
                warn!(kind = label, %err, "Request rejected");
                self.metrics.record_rejected();
                None
            }
        }
    }

    fn collect(&mut self) {
        for completion in self.runner.take_completions() {
            self.metrics.record(&completion);
        }
    }
}

/// Outcome of running one scenario under both update algorithms.
#[derive(Debug)]
pub struct AlgorithmComparison {
    pub lazy: SimulationReport,
    pub full: SimulationReport,
    /// Largest finish-date gap over activities that ended in both runs.
    pub max_divergence: f64,
    /// Activities that ended in one run only, or in different states.
    pub mismatched: usize,
}

impl AlgorithmComparison {
    pub fn print_summary(&self) {
        println!("\n=== Lazy vs Full ===");
        println!(
            "Lazy: {} finished, {} failed, {} steps",
            self.lazy.finished, self.lazy.failed, self.lazy.stats.steps
        );
        println!(
            "Full: {} finished, {} failed, {} steps",
            self.full.finished, self.full.failed, self.full.stats.steps
        );
        println!("Max finish-date divergence: {:e}s", self.max_divergence);
        println!("Mismatched outcomes: {}", self.mismatched);
    }
}

/// Run `config` once per update algorithm, draining both runs.
pub fn compare_algorithms(config: &ScenarioConfig) -> Result<AlgorithmComparison, ScenarioError> {
    let run = |algorithm| -> Result<SimulationReport, ScenarioError> {
        let config = config.clone().with_algorithm(algorithm).with_drain(true);
        Ok(Simulator::new(config)?.run())
    };
    let lazy = run(UpdateAlgorithm::Lazy)?;
    let full = run(UpdateAlgorithm::Full)?;

    let mut max_divergence = 0.0f64;
    let mut mismatched = 0;
    for (activity, (lazy_date, lazy_state)) in &lazy.outcomes {
        match full.outcomes.get(activity) {
            Some((full_date, full_state)) if full_state == lazy_state => {
                max_divergence = max_divergence.max((lazy_date - full_date).abs());
            }
            _ => mismatched += 1,
        }
    }
    mismatched += full
        .outcomes
        .keys()
        .filter(|activity| !lazy.outcomes.contains_key(activity))
        .count();

    Ok(AlgorithmComparison {
        lazy,
        full,
        max_divergence,
        mismatched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpuConfig, PlatformConfig, TraceConfig, WorkloadConfig};
    use ressim_kernel::TraceKind;
    use tracing_test::traced_test;

    /// About 5e8 flop/s of demand on a 2e9 flop/s host: work drains as it comes.
    fn small_scenario() -> ScenarioConfig {
        ScenarioConfig {
            duration: 20.0,
            platform: PlatformConfig {
                cpus: vec![CpuConfig::new("host", 1e9, 2)],
                ..Default::default()
            },
            workload: WorkloadConfig {
                mean_flops: 5e8,
                ..WorkloadConfig::default()
                    .executions_only()
                    .with_arrival_rate(0.5)
                    .with_batch_size(2)
            },
            ..Default::default()
        }
    }

    #[traced_test]
    #[test]
    fn test_run_reaches_duration() {
        let report = Simulator::new(small_scenario()).unwrap().run();
        assert_eq!(report.end_time, 20.0);
        assert!(report.finished > 0);
        assert!(report.p50_latency > 0.0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.rejected, 0);
        assert!(logs_contain("Scenario complete"));
    }

    #[traced_test]
    #[test]
    fn test_drain_ends_every_submission() {
        let report = Simulator::new(small_scenario().with_drain(true)).unwrap().run();
        assert_eq!(report.pending, 0);
        assert_eq!(report.finished, report.stats.submitted);
    }

    #[traced_test]
    #[test]
    fn test_same_seed_same_report() {
        let a = Simulator::new(small_scenario()).unwrap().run();
        let b = Simulator::new(small_scenario()).unwrap().run();
        assert_eq!(a.outcomes, b.outcomes);

        let c = Simulator::new(small_scenario().with_seed(99)).unwrap().run();
        assert_ne!(a.outcomes, c.outcomes);
    }

    #[traced_test]
    #[test]
    fn test_host_failure_fails_running_work() {
        // Overloaded, so work is still running when the host goes down.
        let mut config = small_scenario();
        config.workload = WorkloadConfig::default().executions_only();
        config.traces.push(TraceConfig {
            resource: "host".to_string(),
            kind: TraceKind::State,
            points: vec![(10.0, 0.0), (12.0, 1.0)],
        });
        let report = Simulator::new(config).unwrap().run();
        assert!(report.failed > 0);
        assert_eq!(report.stats.trace_events, 2);
    }

    #[traced_test]
    #[test]
    fn test_unknown_trace_target_is_rejected() {
        let mut config = small_scenario();
        config.traces.push(TraceConfig {
            resource: "ghost".to_string(),
            kind: TraceKind::State,
            points: vec![(1.0, 0.0)],
        });
        assert!(matches!(
            Simulator::new(config),
            Err(ScenarioError::UnknownResource(_))
        ));
    }

    #[traced_test]
    #[test]
    fn test_lazy_and_full_agree() {
        let comparison = compare_algorithms(&ScenarioConfig::sample().with_duration(30.0)).unwrap();
        assert_eq!(comparison.mismatched, 0);
        assert!(comparison.max_divergence < 1e-3, "{}", comparison.max_divergence);
        assert_eq!(comparison.lazy.finished, comparison.full.finished);
    }
}
