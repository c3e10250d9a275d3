use crate::{
    error::{Error, NodeKind, Result},
    ord::KeyOrd,
    vecs::FixedCapVec,
};
use allocator_api2::{alloc::Allocator, boxed::Box};
use std::mem;

/// Explicit stack used for paths and cursors.
/// Depth 64 is more than any tree that fits in memory can reach for B >= 2.
pub(crate) type StkVec<T> = arrayvec::ArrayVec<T, 64>;

/// Owning link to a child node, allocated through the map's allocator.
pub(crate) type NodeBox<K, V, const B: usize, A> = Box<Node<K, V, B, A>, A>;

/// Nodes allocated before a split chain starts, consumed bottom-up.
pub(crate) type Spares<K, V, const B: usize, A> = StkVec<NodeBox<K, V, B, A>>;

/// Result of [`Node::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Search {
    pub found: bool,
    /// Matching slot if found, otherwise insertion point / child to descend into.
    pub index: usize,
}

/// Entry that must move up one level, with the new right sibling if there was a split.
pub(crate) struct Promoted<K, V, const B: usize, A: Allocator + Clone> {
    pub key: K,
    pub val: V,
    pub edge: Option<NodeBox<K, V, B, A>>,
}

/// B-tree node. Holds up to `2B-1` keys with their values, and for an internal node
/// exactly `len + 1` children. Edge `i + 1` is the child immediately right of key `i`.
pub(crate) struct Node<K, V, const B: usize, A: Allocator + Clone> {
    keys: FixedCapVec<K, A>,
    vals: FixedCapVec<V, A>,
    edges: FixedCapVec<NodeBox<K, V, B, A>, A>,
}

fn alloc_failed(kind: NodeKind) -> Error {
    tracing::warn!(%kind, "node allocation failed");
    Error::Alloc { kind }
}

// `fetch_put` reserves one spare per full node on the path before splitting any.
fn take_spare<K, V, const B: usize, A: Allocator + Clone>(
    spares: &mut Spares<K, V, B, A>,
) -> NodeBox<K, V, B, A> {
    spares.pop().expect("node reserved before split")
}

impl<K, V, const B: usize, A: Allocator + Clone> Node<K, V, B, A> {
    /// Maximum number of keys.
    pub const CAP: usize = 2 * B - 1;
    /// Minimum number of keys in a non-root node.
    pub const MIN: usize = B - 1;

    /// Allocate an empty node. Leaves reserve no edge storage.
    pub fn try_new(kind: NodeKind, alloc: &A) -> Result<NodeBox<K, V, B, A>> {
        let edge_cap = match kind {
            NodeKind::Leaf => 0,
            NodeKind::Internal => 2 * B,
        };
        let keys = FixedCapVec::try_new_in(Self::CAP, alloc.clone())
            .ok_or_else(|| alloc_failed(kind))?;
        let vals = FixedCapVec::try_new_in(Self::CAP, alloc.clone())
            .ok_or_else(|| alloc_failed(kind))?;
        let edges =
            FixedCapVec::try_new_in(edge_cap, alloc.clone()).ok_or_else(|| alloc_failed(kind))?;
        Box::try_new_in(Self { keys, vals, edges }, alloc.clone()).map_err(|_| alloc_failed(kind))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.edges.cap() == 0
    }

    pub fn kind(&self) -> NodeKind {
        if self.is_leaf() {
            NodeKind::Leaf
        } else {
            NodeKind::Internal
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.keys.is_full()
    }

    #[inline]
    pub fn is_underflow(&self) -> bool {
        self.keys.len() < Self::MIN
    }

    #[inline]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub fn vals(&self) -> &[V] {
        &self.vals
    }

    #[inline]
    pub fn val_mut(&mut self, ix: usize) -> &mut V {
        self.vals.ixm(ix)
    }

    #[inline]
    pub fn edge(&self, ix: usize) -> &Self {
        self.edges.ix(ix)
    }

    #[inline]
    pub fn edge_mut(&mut self, ix: usize) -> &mut Self {
        self.edges.ixm(ix)
    }

    #[cfg(test)]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Append a child without a key, used to give a new root its leftmost edge.
    pub fn push_edge(&mut self, edge: NodeBox<K, V, B, A>) {
        self.edges.push(edge);
    }

    /// Detach the last child, used when tearing down or collapsing the root.
    pub fn pop_edge(&mut self) -> Option<NodeBox<K, V, B, A>> {
        self.edges.pop()
    }

    /// Linear scan for `key`.
    pub fn search(&self, key: &K) -> Search
    where
        K: KeyOrd,
    {
        let mut i = 0;
        while i < self.keys.len() {
            let k = self.keys.ix(i);
            if key.key_eq(k) {
                return Search {
                    found: true,
                    index: i,
                };
            }
            if key.key_lt(k) {
                break;
            }
            i += 1;
        }
        Search {
            found: false,
            index: i,
        }
    }

    /// Insert at `ix`, the edge (if any) becomes the child right of the new key.
    /// Caller guarantees there is room and that order is preserved.
    pub fn insert(&mut self, ix: usize, key: K, val: V, edge: Option<NodeBox<K, V, B, A>>) {
        self.keys.insert(ix, key);
        self.vals.insert(ix, val);
        if let Some(edge) = edge {
            self.edges.insert(ix + 1, edge);
        }
    }

    pub fn insert_at_end(&mut self, key: K, val: V, edge: Option<NodeBox<K, V, B, A>>) {
        self.keys.push(key);
        self.vals.push(val);
        if let Some(edge) = edge {
            self.edges.push(edge);
        }
    }

    /// Insert before the first key, the edge (if any) becomes edge 0.
    pub fn insert_at_beginning(&mut self, key: K, val: V, edge: Option<NodeBox<K, V, B, A>>) {
        self.keys.insert(0, key);
        self.vals.insert(0, val);
        if let Some(edge) = edge {
            self.edges.insert(0, edge);
        }
    }

    /// Insert, splitting first if the node is full. A split takes its new right node
    /// from `spares` and returns the promoted median.
    pub fn insert_or_split(
        &mut self,
        ix: usize,
        key: K,
        val: V,
        edge: Option<NodeBox<K, V, B, A>>,
        spares: &mut Spares<K, V, B, A>,
    ) -> Option<Promoted<K, V, B, A>> {
        if !self.is_full() {
            self.insert(ix, key, val, edge);
            return None;
        }
        let mut up = self.split(take_spare(spares));
        if ix < B {
            self.insert(ix, key, val, edge);
        } else if let Some(right) = up.edge.as_mut() {
            right.insert(ix - B, key, val, edge);
        }
        Some(up)
    }

    /// Split a full node at the median `B-1`. Keys right of the median move to `right`,
    /// which must be an empty node of the same kind.
    pub fn split(&mut self, mut right: NodeBox<K, V, B, A>) -> Promoted<K, V, B, A> {
        debug_assert!(self.is_full() && right.len() == 0);
        debug_assert_eq!(self.kind(), right.kind());
        self.keys.split_off_into(B, &mut right.keys);
        self.vals.split_off_into(B, &mut right.vals);
        if !self.is_leaf() {
            self.edges.split_off_into(B, &mut right.edges);
        }
        let key = self.keys.remove(B - 1);
        let val = self.vals.remove(B - 1);
        tracing::trace!(kind = %self.kind(), "node split");
        Promoted {
            key,
            val,
            edge: Some(right),
        }
    }

    /// Remove slot `ix` and, for an internal node, the edge right of it.
    pub fn remove(&mut self, ix: usize) -> (K, V, Option<NodeBox<K, V, B, A>>) {
        let key = self.keys.remove(ix);
        let val = self.vals.remove(ix);
        let edge = if self.is_leaf() {
            None
        } else {
            Some(self.edges.remove(ix + 1))
        };
        (key, val, edge)
    }

    /// Remove the last slot together with the last edge.
    pub fn remove_from_end(&mut self) -> (K, V, Option<NodeBox<K, V, B, A>>) {
        self.remove(self.len() - 1)
    }

    /// Remove the first slot together with edge 0 (its *left* edge).
    pub fn remove_from_beginning(&mut self) -> (K, V, Option<NodeBox<K, V, B, A>>) {
        let key = self.keys.remove(0);
        let val = self.vals.remove(0);
        let edge = if self.is_leaf() {
            None
        } else {
            Some(self.edges.remove(0))
        };
        (key, val, edge)
    }

    pub fn swap_val(&mut self, ix: usize, val: V) -> V {
        mem::replace(self.vals.ixm(ix), val)
    }

    pub fn swap_kv(&mut self, ix: usize, key: K, val: V) -> (K, V) {
        (
            mem::replace(self.keys.ixm(ix), key),
            mem::replace(self.vals.ixm(ix), val),
        )
    }

    /// Child `ix` has underflowed. Rotate the first entry of child `ix + 1` through
    /// separator `ix`. Returns false, changing nothing, if that sibling has none to spare.
    pub fn borrow_from_right(&mut self, ix: usize) -> bool {
        if ix >= self.len() {
            return false;
        }
        let (left, right) = self.edges.split_at_mut(ix + 1);
        let (child, sib) = (&mut left[ix], &mut right[0]);
        if sib.len() <= Self::MIN {
            return false;
        }
        let (key, val, edge) = sib.remove_from_beginning();
        let key = mem::replace(self.keys.ixm(ix), key);
        let val = mem::replace(self.vals.ixm(ix), val);
        child.insert_at_end(key, val, edge);
        true
    }

    /// Mirror of [`Node::borrow_from_right`], taking the last entry of child `ix - 1`.
    pub fn borrow_from_left(&mut self, ix: usize) -> bool {
        if ix == 0 || ix > self.len() {
            return false;
        }
        let (left, right) = self.edges.split_at_mut(ix);
        let (sib, child) = (&mut left[ix - 1], &mut right[0]);
        if sib.len() <= Self::MIN {
            return false;
        }
        let (key, val, edge) = sib.remove_from_end();
        let key = mem::replace(self.keys.ixm(ix - 1), key);
        let val = mem::replace(self.vals.ixm(ix - 1), val);
        child.insert_at_beginning(key, val, edge);
        true
    }

    /// Fuse child `left_ix`, separator `left_ix` and child `left_ix + 1` into
    /// child `left_ix`. The right child is freed.
    pub fn merge_edges(&mut self, left_ix: usize) {
        let (key, val, right) = self.remove(left_ix);
        let Some(mut right) = right else {
            debug_assert!(false, "merge_edges on a leaf");
            return;
        };
        let left = self.edges.ixm(left_ix);
        left.keys.push(key);
        left.vals.push(val);
        left.keys.append(&mut right.keys);
        left.vals.append(&mut right.vals);
        left.edges.append(&mut right.edges);
        tracing::trace!(len = left.len(), "siblings merged");
    }

    /// Assert the invariants that can be checked on a single node.
    #[cfg(test)]
    pub fn check_local(&self, is_root: bool)
    where
        K: KeyOrd,
    {
        assert!(self.len() <= Self::CAP, "node overflow: {}", self.len());
        if is_root {
            assert!(self.len() >= 1, "empty root left in tree");
        } else {
            assert!(self.len() >= Self::MIN, "node underflow: {}", self.len());
        }
        assert_eq!(self.keys.len(), self.vals.len());
        for w in self.keys.windows(2) {
            assert!(w[0].key_lt(&w[1]), "keys out of order");
        }
        if self.is_leaf() {
            assert!(self.edges.is_empty());
        } else {
            assert_eq!(self.edges.len(), self.len() + 1, "child count mismatch");
        }
    }
}
