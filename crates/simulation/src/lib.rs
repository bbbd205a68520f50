//! Deterministic simulation runner.
//!
//! Drives a [`SimContext`](ressim_kernel::SimContext) from one event to the
//! next, replays load traces against its resources and releases the actions
//! it submitted once they end. Given the same inputs, it produces identical
//! results every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │  Trace queue (BTreeMap<EventKey, TraceEvent>)      │ │
//! │  │  Ordered by: time, sequence                        │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │ min(next trace,             │
//! │                           ▼     next model event)       │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │  SimContext: advance → apply due traces            │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │  State changes → completions, unref owned actions  │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod error;
mod event_queue;
mod runner;

pub use error::SimulationError;
pub use event_queue::{EventKey, TraceEvent};
pub use runner::{Completion, SimulationRunner, SimulationStats};
