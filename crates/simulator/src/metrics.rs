//! Completion metrics and the end-of-run report.

use hdrhistogram::Histogram;
use ressim_simulation::{Completion, SimulationStats};
use ressim_types::{ActionState, ActivityRef};
use std::collections::BTreeMap;

/// Durations are recorded in microseconds of simulated time.
const MICROS_PER_SECOND: f64 = 1e6;

/// Collects completions as the simulation advances.
pub struct MetricsCollector {
    latency: Histogram<u64>,
    finished: u64,
    failed: u64,
    rejected: u64,
    /// Finished/failed counts per kind of work.
    by_label: BTreeMap<&'static str, (u64, u64)>,
    /// Finish date and final state of every ended activity.
    outcomes: BTreeMap<ActivityRef, (f64, ActionState)>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            // Auto-resizing, three significant digits.
            latency: Histogram::new(3).expect("3 significant digits is a valid precision"),
            finished: 0,
            failed: 0,
            rejected: 0,
            by_label: BTreeMap::new(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, completion: &Completion) {
        let counts = self.by_label.entry(completion.label).or_default();
        match completion.state {
            ActionState::Finished => {
                self.finished += 1;
                counts.0 += 1;
                let micros = (completion.duration() * MICROS_PER_SECOND).round() as u64;
                self.latency.saturating_record(micros);
            }
            _ => {
                self.failed += 1;
                counts.1 += 1;
            }
        }
        self.outcomes
            .insert(completion.activity, (completion.finished_at, completion.state));
    }

    /// A request the kernel refused to create.
    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn finished(&self) -> u64 {
        self.finished
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Build the report.
    pub fn finish(
        self,
        seed: u64,
        end_time: f64,
        pending: usize,
        stats: SimulationStats,
    ) -> SimulationReport {
        let quantile = |q: f64| {
            if self.latency.is_empty() {
                0.0
            } else {
                self.latency.value_at_quantile(q) as f64 / MICROS_PER_SECOND
            }
        };
        SimulationReport {
            seed,
            end_time,
            finished: self.finished,
            failed: self.failed,
            rejected: self.rejected,
            pending,
            mean_latency: if self.latency.is_empty() {
                0.0
            } else {
                self.latency.mean() / MICROS_PER_SECOND
            },
            p50_latency: quantile(0.50),
            p90_latency: quantile(0.90),
            p99_latency: quantile(0.99),
            max_latency: self.latency.max() as f64 / MICROS_PER_SECOND,
            by_label: self.by_label,
            outcomes: self.outcomes,
            stats,
        }
    }
}

/// Summary of one run. Latencies are in simulated seconds.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub seed: u64,
    pub end_time: f64,
    pub finished: u64,
    pub failed: u64,
    pub rejected: u64,
    /// Submissions still running at the end.
    pub pending: usize,
    pub mean_latency: f64,
    pub p50_latency: f64,
    pub p90_latency: f64,
    pub p99_latency: f64,
    pub max_latency: f64,
    pub by_label: BTreeMap<&'static str, (u64, u64)>,
    pub outcomes: BTreeMap<ActivityRef, (f64, ActionState)>,
    pub stats: SimulationStats,
}

impl SimulationReport {
    /// Finished activities per simulated second.
    pub fn throughput(&self) -> f64 {
        if self.end_time > 0.0 {
            self.finished as f64 / self.end_time
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n=== Simulation Report ===");
        println!("Seed: {}", self.seed);
        println!("Simulated time: {:.3}s", self.end_time);
        println!(
            "Finished: {}  Failed: {}  Rejected: {}  Pending: {}",
            self.finished, self.failed, self.rejected, self.pending
        );
        println!("Throughput: {:.2}/s", self.throughput());
        println!(
            "Latency: mean {:.4}s  p50 {:.4}s  p90 {:.4}s  p99 {:.4}s  max {:.4}s",
            self.mean_latency, self.p50_latency, self.p90_latency, self.p99_latency, self.max_latency
        );
        println!("\n--- By kind ---");
        for (label, (finished, failed)) in &self.by_label {
            println!("{label:>14}: {finished} finished, {failed} failed");
        }
        println!(
            "\nSteps: {}  Trace events: {} ({} rejected)",
            self.stats.steps, self.stats.trace_events, self.stats.trace_errors
        );
    }
}
