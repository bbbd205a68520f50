//! Core types for the ressim resource-sharing kernel.
//!
//! Identifiers, lifecycle enums and precision helpers shared by the solver,
//! the kernel and the simulation runner.

mod identifiers;
pub mod precision;
mod state;

pub use identifiers::{ActionId, ActivityRef, ModelKind, ResourceId};
pub use precision::{double_equals, double_positive, double_update, Precision};
pub use state::{ActionState, HeapEntryKind, SuspendState, UpdateAlgorithm};
