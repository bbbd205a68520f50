//! Runner errors.

use ressim_kernel::{KernelError, TraceKind};
use ressim_types::ActivityRef;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// Trace point dated before the current simulated time.
    #[error("Trace point at {date} is in the past (now is {now})")]
    TraceInPast { date: f64, now: f64 },

    #[error("Invalid {kind} trace value: {value}")]
    InvalidTraceValue { kind: TraceKind, value: f64 },

    /// No live activity with this reference.
    #[error("Unknown activity: {0}")]
    UnknownActivity(ActivityRef),
}
