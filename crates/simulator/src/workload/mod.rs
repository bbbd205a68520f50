//! Workload generation for simulations.
//!
//! Generators only draw from the RNG they are given, never from the kernel,
//! so a seed yields the same request stream whatever update algorithm runs
//! underneath.

mod random;

pub use random::RandomWorkload;

use crate::platform::Platform;
use ressim_kernel::IoOp;
use ressim_types::ResourceId;

/// One unit of work to submit.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkRequest {
    Execution {
        host: ResourceId,
        flops: f64,
    },
    Communication {
        route: Vec<ResourceId>,
        size: f64,
        rate: Option<f64>,
    },
    Io {
        disk: ResourceId,
        size: f64,
        op: IoOp,
    },
    Sleep {
        host: ResourceId,
        duration: f64,
    },
}

impl WorkRequest {
    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            WorkRequest::Execution { .. } => "execution",
            WorkRequest::Communication { .. } => "communication",
            WorkRequest::Io { op: IoOp::Read, .. } => "read",
            WorkRequest::Io { op: IoOp::Write, .. } => "write",
            WorkRequest::Sleep { .. } => "sleep",
        }
    }
}

/// Trait for generating request workloads.
pub trait WorkloadGenerator {
    /// Delay until the next batch arrives.
    fn next_interarrival(&mut self, rng: &mut impl rand::Rng) -> f64;

    /// Generate a batch of requests.
    fn generate_batch(&mut self, platform: &Platform, rng: &mut impl rand::Rng)
        -> Vec<WorkRequest>;

    /// Generate a single request, `None` when the platform has no resource
    /// for any enabled kind of work.
    fn generate_one(&mut self, platform: &Platform, rng: &mut impl rand::Rng)
        -> Option<WorkRequest>;
}
