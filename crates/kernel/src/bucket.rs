//! State buckets: one index-linked list per action state.
//!
//! Each action carries its own `prev`/`next` links and a tag naming the
//! bucket it sits in, so moving it between buckets is an O(1) splice and an
//! action can never be in two buckets at once.

use ressim_types::{ActionId, ActionState};
use slotmap::SlotMap;

/// Per-action bucket membership.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BucketLink {
    state: Option<ActionState>,
    prev: Option<ActionId>,
    next: Option<ActionId>,
}

impl BucketLink {
    /// Bucket currently owning the action.
    pub fn state(&self) -> Option<ActionState> {
        self.state
    }
}

/// Anything stored in the action arena that can sit in a bucket.
pub trait BucketMember {
    fn link(&self) -> &BucketLink;
    fn link_mut(&mut self) -> &mut BucketLink;
}

#[derive(Debug, Default, Clone, Copy)]
struct BucketList {
    head: Option<ActionId>,
    tail: Option<ActionId>,
    len: usize,
}

/// The five buckets of a model.
#[derive(Debug, Default)]
pub struct StateBuckets {
    lists: [BucketList; 5],
}

impl StateBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the bucket for `state`. The action must not already be
    /// linked anywhere.
    pub fn push_back<T: BucketMember>(
        &mut self,
        arena: &mut SlotMap<ActionId, T>,
        id: ActionId,
        state: ActionState,
    ) {
        let list = &mut self.lists[state.index()];
        let tail = list.tail;
        {
            let link = arena[id].link_mut();
            assert!(link.state.is_none(), "{id} is already linked in {:?}", link.state);
            *link = BucketLink {
                state: Some(state),
                prev: tail,
                next: None,
            };
        }
        match tail {
            Some(tail) => arena[tail].link_mut().next = Some(id),
            None => list.head = Some(id),
        }
        list.tail = Some(id);
        list.len += 1;
    }

    /// Detach `id` from whatever bucket holds it.
    ///
    /// # Returns
    ///
    /// The bucket it was in, or `None` if it was not linked.
    pub fn unlink<T: BucketMember>(
        &mut self,
        arena: &mut SlotMap<ActionId, T>,
        id: ActionId,
    ) -> Option<ActionState> {
        let link = *arena[id].link();
        let state = link.state?;
        let list = &mut self.lists[state.index()];

        match link.prev {
            Some(prev) => arena[prev].link_mut().next = link.next,
            None => list.head = link.next,
        }
        match link.next {
            Some(next) => arena[next].link_mut().prev = link.prev,
            None => list.tail = link.prev,
        }
        list.len -= 1;
        *arena[id].link_mut() = BucketLink::default();
        Some(state)
    }

    /// Move `id` to the tail of the bucket for `state`.
    pub fn move_to<T: BucketMember>(
        &mut self,
        arena: &mut SlotMap<ActionId, T>,
        id: ActionId,
        state: ActionState,
    ) -> Option<ActionState> {
        let previous = self.unlink(arena, id);
        self.push_back(arena, id, state);
        previous
    }

    pub fn first(&self, state: ActionState) -> Option<ActionId> {
        self.lists[state.index()].head
    }

    /// Successor of `id` within its bucket.
    pub fn next<T: BucketMember>(arena: &SlotMap<ActionId, T>, id: ActionId) -> Option<ActionId> {
        arena[id].link().next
    }

    pub fn len(&self, state: ActionState) -> usize {
        self.lists[state.index()].len
    }

    pub fn is_empty(&self, state: ActionState) -> bool {
        self.len(state) == 0
    }

    /// Snapshot of the bucket for `state`, in order.
    pub fn collect<T: BucketMember>(
        &self,
        arena: &SlotMap<ActionId, T>,
        state: ActionState,
    ) -> Vec<ActionId> {
        let mut ids = Vec::with_capacity(self.len(state));
        let mut cursor = self.first(state);
        while let Some(id) = cursor {
            ids.push(id);
            cursor = Self::next(arena, id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Node {
        link: BucketLink,
    }

    impl BucketMember for Node {
        fn link(&self) -> &BucketLink {
            &self.link
        }

        fn link_mut(&mut self) -> &mut BucketLink {
            &mut self.link
        }
    }

    fn setup(n: usize) -> (SlotMap<ActionId, Node>, Vec<ActionId>) {
        let mut arena = SlotMap::with_key();
        let ids = (0..n).map(|_| arena.insert(Node::default())).collect();
        (arena, ids)
    }

    #[test]
    fn test_push_preserves_order() {
        let (mut arena, ids) = setup(3);
        let mut buckets = StateBuckets::new();
        for id in &ids {
            buckets.push_back(&mut arena, *id, ActionState::Started);
        }
        assert_eq!(buckets.collect(&arena, ActionState::Started), ids);
        assert_eq!(buckets.len(ActionState::Started), 3);
    }

    #[test]
    fn test_move_splices_middle_element() {
        let (mut arena, ids) = setup(3);
        let mut buckets = StateBuckets::new();
        for id in &ids {
            buckets.push_back(&mut arena, *id, ActionState::Started);
        }

        let previous = buckets.move_to(&mut arena, ids[1], ActionState::Finished);
        assert_eq!(previous, Some(ActionState::Started));
        assert_eq!(
            buckets.collect(&arena, ActionState::Started),
            vec![ids[0], ids[2]]
        );
        assert_eq!(buckets.collect(&arena, ActionState::Finished), vec![ids[1]]);
        assert_eq!(arena[ids[1]].link.state(), Some(ActionState::Finished));
    }

    #[test]
    fn test_unlink_head_and_tail() {
        let (mut arena, ids) = setup(3);
        let mut buckets = StateBuckets::new();
        for id in &ids {
            buckets.push_back(&mut arena, *id, ActionState::Inited);
        }

        buckets.unlink(&mut arena, ids[0]);
        buckets.unlink(&mut arena, ids[2]);
        assert_eq!(buckets.collect(&arena, ActionState::Inited), vec![ids[1]]);
        assert_eq!(buckets.first(ActionState::Inited), Some(ids[1]));
        assert_eq!(arena[ids[0]].link.state(), None);
        assert_eq!(buckets.unlink(&mut arena, ids[0]), None);
    }

    #[test]
    fn test_cursor_survives_removal_of_current() {
        let (mut arena, ids) = setup(4);
        let mut buckets = StateBuckets::new();
        for id in &ids {
            buckets.push_back(&mut arena, *id, ActionState::Started);
        }

        let mut visited = Vec::new();
        let mut cursor = buckets.first(ActionState::Started);
        while let Some(id) = cursor {
            cursor = StateBuckets::next(&arena, id);
            visited.push(id);
            buckets.move_to(&mut arena, id, ActionState::Finished);
        }
        assert_eq!(visited, ids);
        assert!(buckets.is_empty(ActionState::Started));
        assert_eq!(buckets.len(ActionState::Finished), 4);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn test_double_link_panics() {
        let (mut arena, ids) = setup(1);
        let mut buckets = StateBuckets::new();
        buckets.push_back(&mut arena, ids[0], ActionState::Started);
        buckets.push_back(&mut arena, ids[0], ActionState::Failed);
    }
}
