//! Resource-sharing kernel.
//!
//! Models contention for processors, links and disks among concurrent
//! actions, and tells the caller when the next action changes state.
//!
//! # Architecture
//!
//! ```text
//!                         SimContext
//!      ┌────────────────┬──────────────────┬────────────────┐
//!      │   cpu Model    │  network Model   │ storage Model  │
//!      └───────┬────────┴────────┬─────────┴───────┬────────┘
//!              ▼                 ▼                 ▼
//!   resources ──constraints──► FairnessSolver ◄──variables── actions
//!                                    │
//!                          owners with new rates
//!                                    ▼
//!                Lazy: ActionHeap          Full: scan Started
//! ```
//!
//! # Tick
//!
//! 1. [`SimContext::next_occurring_event`] solves every model and returns the
//!    delay until the earliest event.
//! 2. [`SimContext::advance`] moves the clock and lets each model finish,
//!    fail or reschedule its actions.
//! 3. [`SimContext::drain_state_changes`] hands the transitions to the caller.
//!
//! Caller mistakes are reported as [`KernelError`]. Broken internal
//! invariants panic: a corrupted schedule must not produce numbers.

mod action;
mod bucket;
mod config;
mod context;
mod error;
mod heap;
mod model;
mod resource;

pub use action::{Action, ActionKind, IoOp};
pub use bucket::{BucketLink, BucketMember, StateBuckets};
pub use config::KernelConfig;
pub use context::SimContext;
pub use error::KernelError;
pub use heap::{ActionHeap, HeapEntry, HeapHandle};
pub use model::{Model, StateChange};
pub use resource::{Resource, ResourceKind, TraceKind};

pub use ressim_lmm::SharingPolicy;
