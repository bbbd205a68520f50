//! Max-min fairness solver.
//!
//! The kernel talks to the solver only through [`FairnessSolver`]; the
//! [`MaxMinSystem`] implementation is the one every model uses by default.
//!
//! # Solve loop
//!
//! ```text
//!  modified constraints ──► usage = Σ consumption / weight
//!                                  │
//!            ┌─────────────────────▼─────────────────────┐
//!            │ min_usage = min(remaining / usage)        │
//!            │ fix saturated variables (bounds first)    │
//!            │ subtract their rate from every constraint │
//!            └─────────────────────┬─────────────────────┘
//!                                  ▼
//!                 repeat while a constraint has slack
//! ```

mod solver;
mod system;

pub use solver::{ConstraintId, FairnessSolver, SharingPolicy, VariableId};
pub use system::MaxMinSystem;
