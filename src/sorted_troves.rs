//! # Sorted trove index
//!
//! A doubly linked list over trove receipt ids, ordered descending by
//! collateralization ratio. The list only stores the pointers; the ratio used
//! for ordering is computed on demand by the core component, which owns the
//! ledger and price state. Positioning (hint validation, scan fallback) also
//! lives in the core for the same reason, so this module is limited to the
//! pointer surgery: linking a node between two known neighbors, unlinking it,
//! and neighbor queries.
//!
//! Head is the highest ratio, tail the lowest. Among equal ratios, insertion
//! order is preserved: the core places a new entry behind existing equals and
//! leaves a re-inserted entry in place while it is still validly ordered
//! between its neighbors.

use scrypto::prelude::*;

/// Pointers of one list entry. The ordering ratio is deliberately not stored
/// here; list order reflects the ratio at the time of the last re-insert.
#[derive(ScryptoSbor, Clone, Debug)]
pub struct TroveNode {
    pub prev: Option<NonFungibleLocalId>,
    pub next: Option<NonFungibleLocalId>,
}

/// The descending-by-ratio index over all active troves.
#[derive(ScryptoSbor)]
pub struct SortedTroves {
    nodes: KeyValueStore<NonFungibleLocalId, TroveNode>,
    head: Option<NonFungibleLocalId>,
    tail: Option<NonFungibleLocalId>,
    size: u64,
    max_size: u64,
}

impl SortedTroves {
    pub fn new(max_size: u64) -> Self {
        assert!(max_size > 0, "Sorted trove list size must be positive.");
        Self {
            nodes: KeyValueStore::new(),
            head: None,
            tail: None,
            size: 0,
            max_size,
        }
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size >= self.max_size
    }

    pub fn contains(&self, id: &NonFungibleLocalId) -> bool {
        self.nodes.get(id).is_some()
    }

    pub fn head(&self) -> Option<NonFungibleLocalId> {
        self.head.clone()
    }

    pub fn tail(&self) -> Option<NonFungibleLocalId> {
        self.tail.clone()
    }

    pub fn next_of(&self, id: &NonFungibleLocalId) -> Option<NonFungibleLocalId> {
        self.nodes.get(id).expect("Trove not in sorted list.").next.clone()
    }

    pub fn prev_of(&self, id: &NonFungibleLocalId) -> Option<NonFungibleLocalId> {
        self.nodes.get(id).expect("Trove not in sorted list.").prev.clone()
    }

    /// Links `id` between `prev` and `next`. The caller has already determined
    /// that this position respects the descending ratio order. `prev == None`
    /// makes the node the new head, `next == None` the new tail; the pair must
    /// be adjacent (or the respective end of the list).
    pub fn insert_between(
        &mut self,
        id: NonFungibleLocalId,
        prev: Option<NonFungibleLocalId>,
        next: Option<NonFungibleLocalId>,
    ) {
        assert!(!self.is_full(), "Sorted trove list is full.");
        assert!(!self.contains(&id), "Trove already in sorted list.");

        match &prev {
            Some(prev_id) => {
                let mut prev_node = (*self
                    .nodes
                    .get(prev_id)
                    .expect("Stale predecessor in sorted list insert."))
                .clone();
                assert!(
                    prev_node.next == next,
                    "Sorted list insert position is not adjacent."
                );
                prev_node.next = Some(id.clone());
                self.nodes.insert(prev_id.clone(), prev_node);
            }
            None => {
                assert!(
                    self.head == next,
                    "Sorted list insert position is not adjacent."
                );
                self.head = Some(id.clone());
            }
        }

        match &next {
            Some(next_id) => {
                let mut next_node = (*self
                    .nodes
                    .get(next_id)
                    .expect("Stale successor in sorted list insert."))
                .clone();
                next_node.prev = Some(id.clone());
                self.nodes.insert(next_id.clone(), next_node);
            }
            None => {
                self.tail = Some(id.clone());
            }
        }

        self.nodes.insert(id, TroveNode { prev, next });
        self.size += 1;
    }

    /// Unlinks `id` from the list.
    pub fn remove(&mut self, id: &NonFungibleLocalId) {
        let node = self
            .nodes
            .remove(id)
            .expect("Trove not in sorted list.");

        match &node.prev {
            Some(prev_id) => {
                let mut prev_node = (*self.nodes.get(prev_id).unwrap()).clone();
                prev_node.next = node.next.clone();
                self.nodes.insert(prev_id.clone(), prev_node);
            }
            None => {
                self.head = node.next.clone();
            }
        }

        match &node.next {
            Some(next_id) => {
                let mut next_node = (*self.nodes.get(next_id).unwrap()).clone();
                next_node.prev = node.prev.clone();
                self.nodes.insert(next_id.clone(), next_node);
            }
            None => {
                self.tail = node.prev.clone();
            }
        }

        self.size -= 1;
    }
}
