//! Trace queue with deterministic ordering.

use ressim_kernel::TraceKind;
use ressim_types::{ModelKind, ResourceId};
use std::cmp::Ordering;

/// Key for ordering trace events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for the same time)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventKey {
    /// Simulated date the event applies at.
    pub time: f64,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Eq for EventKey {}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One load-trace value for one resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEvent {
    pub model: ModelKind,
    pub resource: ResourceId,
    pub kind: TraceKind,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_event_key_ordering() {
        let earlier = EventKey {
            time: 1.0,
            sequence: 7,
        };
        let later = EventKey {
            time: 2.0,
            sequence: 1,
        };
        assert!(earlier < later);
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut queue = BTreeMap::new();
        for sequence in [3, 1, 2] {
            queue.insert(
                EventKey {
                    time: 5.0,
                    sequence,
                },
                sequence,
            );
        }
        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
