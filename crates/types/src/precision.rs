//! Epsilon-aware floating point helpers.
//!
//! Work amounts and durations are decremented in many small steps, so a
//! quantity that lands within `precision` of zero is treated as exhausted.

use serde::{Deserialize, Serialize};

/// Default threshold for remains and durations.
pub const DEFAULT_SURF_PRECISION: f64 = 1e-5;

/// Default threshold used inside the fairness solver.
pub const DEFAULT_MAXMIN_PRECISION: f64 = 1e-5;

/// The two precision thresholds a model works with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Precision {
    /// Snap threshold for durations and dates.
    pub surf: f64,
    /// Snap threshold for solver quantities.
    pub maxmin: f64,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            surf: DEFAULT_SURF_PRECISION,
            maxmin: DEFAULT_MAXMIN_PRECISION,
        }
    }
}

impl Precision {
    /// Threshold applied to remaining work.
    pub fn remains(&self) -> f64 {
        self.surf * self.maxmin
    }
}

/// `value -= delta`, snapping to zero when the result falls below `precision`.
pub fn double_update(value: &mut f64, delta: f64, precision: f64) {
    *value -= delta;
    if *value < precision {
        *value = 0.0;
    }
}

/// Strictly greater than `precision`.
pub fn double_positive(value: f64, precision: f64) -> bool {
    value > precision
}

/// `|a - b| < precision`.
pub fn double_equals(a: f64, b: f64, precision: f64) -> bool {
    (a - b).abs() < precision
}
