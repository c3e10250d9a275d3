use crate::{
    error::{NodeKind, Result},
    node::{Node, NodeBox, Promoted, Spares, StkVec},
    ord::KeyOrd,
};
use allocator_api2::alloc::{Allocator, Global};
use std::{fmt, iter::FusedIterator};

/// Ordered map backed by a B-tree where the branching parameter `B` can be specified.
/// Every node except the root holds between `B-1` and `2B-1` keys.
///
/// General guide to implementation:
///
/// [`BTreeMap`] owns an optional root node (`None` means the map is empty), the allocator
/// used for every node, and the number of entries.
///
/// Node level primitives (search, split, borrow, merge) live in the node module. The map
/// drives them with an explicit stack of raw pointer/index pairs recording the path from
/// the root, so insertion and removal repair the tree bottom-up without recursion.
///
/// Nodes are allocated through `A`. Allocation can fail, in which case
/// [`fetch_put`](BTreeMap::fetch_put) returns [`Error::Alloc`](crate::Error::Alloc) and
/// the map is unchanged.
pub struct BTreeMap<K, V, const B: usize, A: Allocator + Clone = Global> {
    len: usize,
    root: Option<NodeBox<K, V, B, A>>,
    alloc: A,
}

impl<K: KeyOrd, V, const B: usize> Default for BTreeMap<K, V, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeyOrd, V, const B: usize> BTreeMap<K, V, B> {
    /// Returns a new, empty map using the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<K, V, const B: usize, A: Allocator + Clone> Drop for BTreeMap<K, V, B, A> {
    fn drop(&mut self) {
        self.free_nodes();
    }
}

impl<K, V, const B: usize, A: Allocator + Clone> BTreeMap<K, V, B, A> {
    /// This should produce a compile-time error if B is too small.
    const CHECK_B: usize = {
        assert!(B >= 2);
        0
    };

    /// Returns a new, empty map which allocates its nodes from `alloc`.
    /// No node is allocated until the first insertion.
    #[must_use]
    pub fn new_in(alloc: A) -> Self
    where
        K: KeyOrd,
    {
        Self {
            len: Self::CHECK_B,
            root: None,
            alloc,
        }
    }

    /// Get number of key-value pairs in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the map empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get reference to the allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Clear the map, freeing every node.
    pub fn clear(&mut self) {
        self.free_nodes();
        self.len = 0;
    }

    /// Teardown with an explicit stack. Each node is freed once, as soon as its children
    /// have been detached onto the stack.
    fn free_nodes(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        let mut stack = vec![root];
        while let Some(mut node) = stack.pop() {
            while let Some(child) = node.pop_edge() {
                stack.push(child);
            }
        }
    }

    /// Get iterator of references to key-value pairs, in ascending key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V, B, A> {
        let mut stack = StkVec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push((root, 0));
        }
        Iter {
            len: self.len,
            stack,
            backwards: false,
        }
    }

    /// Get iterator of references to keys.
    #[must_use]
    pub fn keys(&self) -> Keys<'_, K, V, B, A> {
        Keys(self.iter())
    }

    /// Get iterator of references to values.
    #[must_use]
    pub fn values(&self) -> Values<'_, K, V, B, A> {
        Values(self.iter())
    }

    /// Get references to first key and value.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while !node.is_leaf() {
            node = node.edge(0);
        }
        Some((&node.keys()[0], &node.vals()[0]))
    }

    /// Get references to last key and value.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while !node.is_leaf() {
            node = node.edge(node.len());
        }
        let i = node.len() - 1;
        Some((&node.keys()[i], &node.vals()[i]))
    }

    #[cfg(test)]
    pub(crate) fn root_node(&self) -> Option<&Node<K, V, B, A>> {
        self.root.as_deref()
    }
}

impl<K: KeyOrd, V, const B: usize, A: Allocator + Clone> BTreeMap<K, V, B, A> {
    /// Get reference to the value corresponding to the key.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut node = self.root.as_deref()?;
        loop {
            let s = node.search(key);
            if s.found {
                return Some(&node.vals()[s.index]);
            }
            if node.is_leaf() {
                return None;
            }
            node = node.edge(s.index);
        }
    }

    /// Get a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let mut node = self.root.as_deref_mut()?;
        loop {
            let s = node.search(key);
            if s.found {
                return Some(node.val_mut(s.index));
            }
            if node.is_leaf() {
                return None;
            }
            node = node.edge_mut(s.index);
        }
    }

    /// Does the map have an entry for the specified key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert key-value pair into map, or if key is already in map, replaces value and
    /// returns old value. Replacing a value never changes the shape of the tree.
    ///
    /// # Errors
    ///
    /// [`Error::Alloc`](crate::Error::Alloc) if a node needed for the insertion cannot be
    /// allocated. Every node a split chain needs is allocated before the tree is touched,
    /// so on error the map is unchanged.
    pub fn fetch_put(&mut self, key: K, val: V) -> Result<Option<V>> {
        let mut node: *mut Node<K, V, B, A> = match self.root.as_deref_mut() {
            Some(root) => root,
            None => {
                let mut leaf = Node::try_new(NodeKind::Leaf, &self.alloc)?;
                leaf.insert_at_end(key, val, None);
                self.root = Some(leaf);
                self.len = 1;
                return Ok(None);
            }
        };

        // Phase 1: descend, recording the path.
        let mut stack: StkVec<(*mut Node<K, V, B, A>, usize)> = StkVec::new();
        unsafe {
            loop {
                let n = &mut *node;
                let s = n.search(&key);
                if s.found {
                    return Ok(Some(n.swap_val(s.index, val)));
                }
                stack.push((node, s.index));
                if n.is_leaf() {
                    break;
                }
                node = n.edge_mut(s.index);
            }
        }

        // Phase 2: every full node from the leaf upwards will split.
        let depth = stack.len();
        let splits = stack
            .iter()
            .rev()
            .take_while(|(n, _)| unsafe { (**n).is_full() })
            .count();
        let mut spares: Spares<K, V, B, A> = StkVec::new();
        if splits == depth {
            spares.push(Node::try_new(NodeKind::Internal, &self.alloc)?);
        }
        for level in depth - splits..depth {
            let kind = if level + 1 == depth {
                NodeKind::Leaf
            } else {
                NodeKind::Internal
            };
            spares.push(Node::try_new(kind, &self.alloc)?);
        }

        let mut up = Promoted {
            key,
            val,
            edge: None,
        };
        while let Some((n, ix)) = stack.pop() {
            match unsafe { (*n).insert_or_split(ix, up.key, up.val, up.edge, &mut spares) } {
                None => {
                    self.len += 1;
                    return Ok(None);
                }
                Some(p) => up = p,
            }
        }

        // The promotion passed the root: the tree grows by one level. Phase 2 reserved
        // the new root first when every node on the path was full.
        let mut root = spares.pop().expect("node reserved for new root");
        if let Some(old) = self.root.take() {
            root.push_edge(old);
        }
        root.insert_at_end(up.key, up.val, up.edge);
        self.root = Some(root);
        self.len += 1;
        tracing::debug!(height = depth + 1, len = self.len, "root split");
        Ok(None)
    }

    /// Remove key-value pair from map, returning the pair that was stored.
    ///
    /// Removing an absent key leaves the tree untouched. Removal never allocates.
    pub fn fetch_remove(&mut self, key: &K) -> Option<(K, V)> {
        let mut node: *mut Node<K, V, B, A> = self.root.as_deref_mut()?;
        // Each entry is a parent and the index of the child the descent took.
        let mut stack: StkVec<(*mut Node<K, V, B, A>, usize)> = StkVec::new();
        let kv = unsafe {
            let found = loop {
                let n = &mut *node;
                let s = n.search(key);
                if s.found {
                    break s.index;
                }
                if n.is_leaf() {
                    return None;
                }
                stack.push((node, s.index));
                node = n.edge_mut(s.index);
            };

            if (*node).is_leaf() {
                let (k, v, _) = (*node).remove(found);
                (k, v)
            } else {
                // Replace the match with its in-order successor: the first entry of the
                // leftmost leaf right of the match.
                let target = node;
                stack.push((target, found + 1));
                let mut leaf = (*target).edge_mut(found + 1) as *mut Node<K, V, B, A>;
                while !(*leaf).is_leaf() {
                    stack.push((leaf, 0));
                    leaf = (*leaf).edge_mut(0);
                }
                let (k, v, _) = (*leaf).remove_from_beginning();
                node = leaf;
                (*target).swap_kv(found, k, v)
            }
        };
        self.len -= 1;

        // Repair underflow bottom-up.
        let mut child = node;
        while let Some((parent, ix)) = stack.pop() {
            unsafe {
                if !(*child).is_underflow() {
                    break;
                }
                let p = &mut *parent;
                if p.borrow_from_right(ix) || p.borrow_from_left(ix) {
                    break;
                }
                if ix == p.len() {
                    p.merge_edges(ix - 1);
                } else {
                    p.merge_edges(ix);
                }
            }
            child = parent;
        }

        self.shrink_root();
        Some(kv)
    }

    /// An empty internal root is replaced by its only child, an empty leaf root by nothing.
    fn shrink_root(&mut self) {
        let Some(root) = self.root.as_mut() else {
            return;
        };
        if root.len() > 0 {
            return;
        }
        let next = root.pop_edge();
        if next.is_some() {
            tracing::debug!(len = self.len, "root collapsed");
        }
        self.root = next;
    }

    /// Insert every pair from `iter`, stopping at the first allocation failure.
    ///
    /// # Errors
    ///
    /// [`Error::Alloc`](crate::Error::Alloc) as for [`fetch_put`](BTreeMap::fetch_put).
    /// Pairs inserted before the failure stay in the map.
    pub fn try_extend<I>(&mut self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in iter {
            self.fetch_put(k, v)?;
        }
        Ok(())
    }

    /// Check all structural invariants, panicking on the first violation.
    #[cfg(test)]
    pub(crate) fn check(&self) {
        let Some(root) = self.root.as_deref() else {
            assert_eq!(self.len, 0);
            return;
        };
        let mut count = 0;
        let mut leaf_depth = None;
        let mut stack: Vec<(&Node<K, V, B, A>, usize, Option<&K>, Option<&K>)> =
            vec![(root, 0, None, None)];
        while let Some((n, depth, lo, hi)) = stack.pop() {
            n.check_local(depth == 0);
            count += n.len();
            let keys = n.keys();
            if let Some(lo) = lo {
                assert!(lo.key_lt(&keys[0]), "key below subtree bound");
            }
            if let Some(hi) = hi {
                assert!(keys[keys.len() - 1].key_lt(hi), "key above subtree bound");
            }
            if n.is_leaf() {
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(d) => assert_eq!(d, depth, "leaves at different depths"),
                }
            } else {
                for i in 0..=n.len() {
                    let lo = if i == 0 { lo } else { Some(&keys[i - 1]) };
                    let hi = if i == n.len() { hi } else { Some(&keys[i]) };
                    stack.push((n.edge(i), depth + 1, lo, hi));
                }
            }
        }
        assert_eq!(count, self.len, "len does not match reachable entries");
    }
}

impl<'a, K, V, const B: usize, A: Allocator + Clone> IntoIterator for &'a BTreeMap<K, V, B, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, B, A>;
    fn into_iter(self) -> Iter<'a, K, V, B, A> {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, const B: usize, A: Allocator + Clone> fmt::Debug
    for BTreeMap<K, V, B, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator returned by [`BTreeMap::iter`].
///
/// Keeps its own stack of (node, index) pairs. Borrowing the map for `'a` stops the
/// tree changing under the iterator.
pub struct Iter<'a, K, V, const B: usize, A: Allocator + Clone = Global> {
    len: usize,
    stack: StkVec<(&'a Node<K, V, B, A>, usize)>,
    // Set after a subtree is exhausted, so the parent yields its key instead of descending.
    backwards: bool,
}

impl<'a, K, V, const B: usize, A: Allocator + Clone> Clone for Iter<'a, K, V, B, A> {
    fn clone(&self) -> Self {
        Self {
            len: self.len,
            stack: self.stack.clone(),
            backwards: self.backwards,
        }
    }
}

impl<'a, K, V, const B: usize, A: Allocator + Clone> fmt::Debug for Iter<'a, K, V, B, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("len", &self.len)
            .field("depth", &self.stack.len())
            .finish()
    }
}

impl<'a, K, V, const B: usize, A: Allocator + Clone> Iterator for Iter<'a, K, V, B, A> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, ix) = *self.stack.last()?;
            if !node.is_leaf() && !self.backwards {
                self.stack.push((node.edge(ix), 0));
                continue;
            }
            if ix < node.len() {
                if let Some(top) = self.stack.last_mut() {
                    top.1 += 1;
                }
                self.backwards = false;
                self.len -= 1;
                return Some((&node.keys()[ix], &node.vals()[ix]));
            }
            self.stack.pop();
            self.backwards = true;
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}
impl<'a, K, V, const B: usize, A: Allocator + Clone> ExactSizeIterator for Iter<'a, K, V, B, A> {
    fn len(&self) -> usize {
        self.len
    }
}
impl<'a, K, V, const B: usize, A: Allocator + Clone> FusedIterator for Iter<'a, K, V, B, A> {}

/// Iterator returned by [`BTreeMap::keys`].
#[derive(Clone, Debug)]
pub struct Keys<'a, K, V, const B: usize, A: Allocator + Clone = Global>(Iter<'a, K, V, B, A>);
impl<'a, K, V, const B: usize, A: Allocator + Clone> Iterator for Keys<'a, K, V, B, A> {
    type Item = &'a K;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.0)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<'a, K, V, const B: usize, A: Allocator + Clone> ExactSizeIterator for Keys<'a, K, V, B, A> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<'a, K, V, const B: usize, A: Allocator + Clone> FusedIterator for Keys<'a, K, V, B, A> {}

/// Iterator returned by [`BTreeMap::values`].
#[derive(Clone, Debug)]
pub struct Values<'a, K, V, const B: usize, A: Allocator + Clone = Global>(Iter<'a, K, V, B, A>);
impl<'a, K, V, const B: usize, A: Allocator + Clone> Iterator for Values<'a, K, V, B, A> {
    type Item = &'a V;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.1)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<'a, K, V, const B: usize, A: Allocator + Clone> ExactSizeIterator for Values<'a, K, V, B, A> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<'a, K, V, const B: usize, A: Allocator + Clone> FusedIterator for Values<'a, K, V, B, A> {}
