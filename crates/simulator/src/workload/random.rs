//! Poisson arrivals of randomly sized work.

use crate::config::WorkloadConfig;
use crate::platform::Platform;
use crate::workload::{WorkRequest, WorkloadGenerator};
use ressim_kernel::IoOp;
use ressim_types::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Execution,
    Communication,
    Io,
    Sleep,
}

/// Draws request kinds by weight and amounts uniformly around their mean.
pub struct RandomWorkload {
    config: WorkloadConfig,
}

impl RandomWorkload {
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Kinds the platform can serve, with their weights.
    fn candidates(&self, platform: &Platform) -> Vec<(Kind, f64)> {
        let c = &self.config;
        [
            (Kind::Execution, c.execution_weight, !platform.cpus.is_empty()),
            (Kind::Communication, c.communication_weight, !platform.links.is_empty()),
            (Kind::Io, c.io_weight, !platform.disks.is_empty()),
            (Kind::Sleep, c.sleep_weight, !platform.cpus.is_empty()),
        ]
        .into_iter()
        .filter(|&(_, weight, available)| available && weight > 0.0)
        .map(|(kind, weight, _)| (kind, weight))
        .collect()
    }

    fn pick_kind(&self, platform: &Platform, rng: &mut impl rand::Rng) -> Option<Kind> {
        let candidates = self.candidates(platform);
        let total: f64 = candidates.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let mut target = rng.gen::<f64>() * total;
        for &(kind, weight) in &candidates {
            if target < weight {
                return Some(kind);
            }
            target -= weight;
        }
        candidates.last().map(|&(kind, _)| kind)
    }

    fn route(&self, links: &[ResourceId], rng: &mut impl rand::Rng) -> Vec<ResourceId> {
        let max_hops = self.config.max_route_hops.clamp(1, links.len());
        let hops = rng.gen_range(1..=max_hops);
        rand::seq::index::sample(rng, links.len(), hops)
            .into_iter()
            .map(|i| links[i])
            .collect()
    }
}

/// Uniform within ±50% of `mean`.
fn around(mean: f64, rng: &mut impl rand::Rng) -> f64 {
    mean * (0.5 + rng.gen::<f64>())
}

fn pick(resources: &[ResourceId], rng: &mut impl rand::Rng) -> ResourceId {
    resources[rng.gen_range(0..resources.len())]
}

impl WorkloadGenerator for RandomWorkload {
    fn next_interarrival(&mut self, rng: &mut impl rand::Rng) -> f64 {
        // Inverse transform of the exponential distribution.
        let u: f64 = rng.gen();
        -(1.0 - u).ln() / self.config.arrival_rate
    }

    fn generate_batch(
        &mut self,
        platform: &Platform,
        rng: &mut impl rand::Rng,
    ) -> Vec<WorkRequest> {
        let mut requests = Vec::with_capacity(self.config.batch_size);
        for _ in 0..self.config.batch_size {
            if let Some(request) = self.generate_one(platform, rng) {
                requests.push(request);
            }
        }
        requests
    }

    fn generate_one(
        &mut self,
        platform: &Platform,
        rng: &mut impl rand::Rng,
    ) -> Option<WorkRequest> {
        let c = &self.config;
        let request = match self.pick_kind(platform, rng)? {
            Kind::Execution => WorkRequest::Execution {
                host: pick(&platform.cpus, rng),
                flops: around(c.mean_flops, rng),
            },
            Kind::Communication => {
                let route = self.route(&platform.links, rng);
                let size = around(c.mean_bytes, rng);
                let rate = (rng.gen::<f64>() < c.rate_capped_ratio)
                    .then(|| c.mean_bytes / 2.0);
                WorkRequest::Communication { route, size, rate }
            }
            Kind::Io => {
                let op = if rng.gen::<f64>() < c.write_ratio {
                    IoOp::Write
                } else {
                    IoOp::Read
                };
                WorkRequest::Io {
                    disk: pick(&platform.disks, rng),
                    size: around(c.mean_io_bytes, rng),
                    op,
                }
            }
            Kind::Sleep => WorkRequest::Sleep {
                host: pick(&platform.cpus, rng),
                duration: around(c.mean_sleep, rng),
            },
        };
        Some(request)
    }
}
