//! Resources: capacity-bearing entities backed by one solver constraint.

use ressim_lmm::{ConstraintId, SharingPolicy};
use ressim_types::ModelKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter a load-trace event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// Fraction of the peak capacity currently available.
    Availability,
    /// Absolute link latency.
    Latency,
    /// On when the value is positive, off otherwise.
    State,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceKind::Availability => write!(f, "availability"),
            TraceKind::Latency => write!(f, "latency"),
            TraceKind::State => write!(f, "state"),
        }
    }
}

/// Technology-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    Cpu {
        speed_peak: f64,
        speed_scale: f64,
        cores: u32,
    },
    Link {
        bandwidth_peak: f64,
        bandwidth_scale: f64,
        latency: f64,
        sharing: SharingPolicy,
    },
    Disk {
        bandwidth_peak: f64,
        bandwidth_scale: f64,
        read_bandwidth: f64,
        write_bandwidth: f64,
    },
}

impl ResourceKind {
    /// Model kind that owns resources of this technology.
    pub fn model(&self) -> ModelKind {
        match self {
            ResourceKind::Cpu { .. } => ModelKind::Cpu,
            ResourceKind::Link { .. } => ModelKind::Network,
            ResourceKind::Disk { .. } => ModelKind::Storage,
        }
    }

    /// Capacity currently offered to the solver.
    pub fn capacity(&self) -> f64 {
        match self {
            ResourceKind::Cpu {
                speed_peak,
                speed_scale,
                cores,
            } => f64::from(*cores) * speed_peak * speed_scale,
            ResourceKind::Link {
                bandwidth_peak,
                bandwidth_scale,
                ..
            }
            | ResourceKind::Disk {
                bandwidth_peak,
                bandwidth_scale,
                ..
            } => bandwidth_peak * bandwidth_scale,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Cpu { .. } => "cpu",
            ResourceKind::Link { .. } => "link",
            ResourceKind::Disk { .. } => "disk",
        }
    }
}

/// A named resource.
#[derive(Debug)]
pub struct Resource {
    pub(crate) name: String,
    pub(crate) kind: ResourceKind,
    pub(crate) is_on: bool,
    pub(crate) constraint: Option<ConstraintId>,
    pub(crate) subscriptions: Vec<TraceKind>,
}

impl Resource {
    pub(crate) fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_on: true,
            constraint: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Model owning this resource.
    pub fn get_model(&self) -> ModelKind {
        self.kind.model()
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn is_off(&self) -> bool {
        !self.is_on
    }

    pub fn constraint(&self) -> Option<ConstraintId> {
        self.constraint
    }

    /// Trace kinds some load trace feeds into this resource.
    pub fn subscriptions(&self) -> &[TraceKind] {
        &self.subscriptions
    }

    pub fn is_subscribed(&self, kind: TraceKind) -> bool {
        self.subscriptions.contains(&kind)
    }

    /// Latency of a link, zero for other resources.
    pub fn latency(&self) -> f64 {
        match self.kind {
            ResourceKind::Link { latency, .. } => latency,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.label(), self.name)
    }
}
