//! Stable, date-ordered event heap for lazy models.

use ressim_types::{ActionId, HeapEntryKind};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Ordering key: date first, then insertion sequence so equal dates pop in
/// insertion order.
#[derive(Debug, Clone, Copy)]
struct HeapKey {
    date: f64,
    sequence: u64,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapKey {}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .total_cmp(&other.date)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Opaque reference to an outstanding heap entry.
///
/// Returned by [`ActionHeap::insert`] and [`ActionHeap::update`]; the
/// caller keeps it and hands it back to reposition or remove the entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapHandle {
    key: HeapKey,
}

impl HeapHandle {
    /// Date the entry is scheduled at.
    pub fn date(&self) -> f64 {
        self.key.date
    }
}

/// An entry removed from the heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapEntry {
    pub action: ActionId,
    pub date: f64,
    pub kind: HeapEntryKind,
}

/// Event heap over `(date, action)` pairs.
#[derive(Debug, Default)]
pub struct ActionHeap {
    entries: BTreeMap<HeapKey, (ActionId, HeapEntryKind)>,
    next_sequence: u64,
}

impl ActionHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` at `date`.
    pub fn insert(&mut self, action: ActionId, date: f64, kind: HeapEntryKind) -> HeapHandle {
        let key = HeapKey {
            date,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.entries.insert(key, (action, kind));
        HeapHandle { key }
    }

    /// Reposition an existing entry, or insert when `handle` is `None` or
    /// no longer present.
    ///
    /// A repositioned entry keeps its insertion rank among equal dates.
    pub fn update(
        &mut self,
        handle: Option<HeapHandle>,
        action: ActionId,
        date: f64,
        kind: HeapEntryKind,
    ) -> HeapHandle {
        let Some(old) = handle.filter(|h| self.entries.remove(&h.key).is_some()) else {
            return self.insert(action, date, kind);
        };
        let key = HeapKey {
            date,
            sequence: old.key.sequence,
        };
        self.entries.insert(key, (action, kind));
        HeapHandle { key }
    }

    /// Remove an entry. Safe to call with `None` or a stale handle.
    ///
    /// # Returns
    ///
    /// Whether an entry was removed.
    pub fn remove(&mut self, handle: Option<HeapHandle>) -> bool {
        handle.is_some_and(|h| self.entries.remove(&h.key).is_some())
    }

    /// Remove and return the earliest entry.
    pub fn pop(&mut self) -> Option<HeapEntry> {
        self.entries
            .pop_first()
            .map(|(key, (action, kind))| HeapEntry {
                action,
                date: key.date,
                kind,
            })
    }

    /// Earliest scheduled date.
    pub fn top_date(&self) -> Option<f64> {
        self.entries.first_key_value().map(|(key, _)| key.date)
    }

    /// Whether `handle` still refers to a live entry.
    pub fn contains(&self, handle: &HeapHandle) -> bool {
        self.entries.contains_key(&handle.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn actions(n: usize) -> Vec<ActionId> {
        let mut arena: SlotMap<ActionId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn test_pops_in_date_order() {
        let ids = actions(3);
        let mut heap = ActionHeap::new();
        heap.insert(ids[0], 3.0, HeapEntryKind::Normal);
        heap.insert(ids[1], 1.0, HeapEntryKind::Normal);
        heap.insert(ids[2], 2.0, HeapEntryKind::MaxDuration);

        assert_eq!(heap.top_date(), Some(1.0));
        let order: Vec<ActionId> = std::iter::from_fn(|| heap.pop().map(|e| e.action)).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_equal_dates_keep_insertion_order() {
        let ids = actions(4);
        let mut heap = ActionHeap::new();
        for id in &ids {
            heap.insert(*id, 5.0, HeapEntryKind::Normal);
        }

        let order: Vec<ActionId> = std::iter::from_fn(|| heap.pop().map(|e| e.action)).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_update_repositions_entry() {
        let ids = actions(2);
        let mut heap = ActionHeap::new();
        let first = heap.insert(ids[0], 1.0, HeapEntryKind::Normal);
        heap.insert(ids[1], 2.0, HeapEntryKind::Normal);

        let moved = heap.update(Some(first), ids[0], 3.0, HeapEntryKind::MaxDuration);
        assert_eq!(heap.len(), 2);
        assert_eq!(moved.date(), 3.0);
        assert!(!heap.contains(&first));

        let entry = heap.pop().unwrap();
        assert_eq!(entry.action, ids[1]);
        let entry = heap.pop().unwrap();
        assert_eq!(entry.action, ids[0]);
        assert_eq!(entry.kind, HeapEntryKind::MaxDuration);
    }

    #[test]
    fn test_update_keeps_rank_among_equal_dates() {
        let ids = actions(2);
        let mut heap = ActionHeap::new();
        let first = heap.insert(ids[0], 1.0, HeapEntryKind::Normal);
        heap.insert(ids[1], 4.0, HeapEntryKind::Normal);
        heap.update(Some(first), ids[0], 4.0, HeapEntryKind::Normal);

        assert_eq!(heap.pop().unwrap().action, ids[0]);
    }

    #[test]
    fn test_update_without_handle_inserts() {
        let ids = actions(1);
        let mut heap = ActionHeap::new();
        let handle = heap.update(None, ids[0], 7.0, HeapEntryKind::Latency);
        assert!(heap.contains(&handle));
        assert_eq!(heap.top_date(), Some(7.0));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let ids = actions(1);
        let mut heap = ActionHeap::new();
        let handle = heap.insert(ids[0], 1.0, HeapEntryKind::Normal);

        assert!(heap.remove(Some(handle)));
        assert!(!heap.remove(Some(handle)));
        assert!(!heap.remove(None));
        assert!(heap.top_date().is_none());
    }
}
