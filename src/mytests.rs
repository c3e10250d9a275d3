use crate::*;

use allocator_api2::alloc::{AllocError, Allocator, Global};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{alloc::Layout, cell::Cell, ptr::NonNull};

/// Allocator that fails once its budget of allocations is spent, and counts live blocks.
struct Budget {
    left: Cell<usize>,
    live: Cell<isize>,
}

impl Budget {
    fn new(left: usize) -> Self {
        Self {
            left: Cell::new(left),
            live: Cell::new(0),
        }
    }
}

unsafe impl Allocator for Budget {
    fn allocate(&self, layout: Layout) -> std::result::Result<NonNull<[u8]>, AllocError> {
        let left = self.left.get();
        if left == 0 {
            return Err(AllocError);
        }
        self.left.set(left - 1);
        let p = Global.allocate(layout)?;
        self.live.set(self.live.get() + 1);
        Ok(p)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.live.set(self.live.get() - 1);
        Global.deallocate(ptr, layout);
    }
}

fn pairs<K: Copy, V: Copy, const B: usize, A: Allocator + Clone>(
    m: &gb::BTreeMap<K, V, B, A>,
) -> Vec<(K, V)> {
    m.iter().map(|(k, v)| (*k, *v)).collect()
}

#[test]
fn test_split_shape() {
    let mut m = BTreeMap::<u32, u32>::new();
    for i in 1..=11 {
        assert_eq!(m.fetch_put(i, i * 10).unwrap(), None);
    }
    let root = m.root_node().unwrap();
    assert!(root.is_leaf());
    assert_eq!(root.len(), 11);

    // The 12th key overflows the root leaf.
    m.fetch_put(12, 120).unwrap();
    m.check();
    let root = m.root_node().unwrap();
    assert!(!root.is_leaf());
    assert_eq!(root.keys(), &[6]);
    assert_eq!(root.vals(), &[60]);
    assert_eq!(root.edge_count(), 2);
    assert_eq!(root.edge(0).keys(), &[1, 2, 3, 4, 5]);
    assert_eq!(root.edge(1).keys(), &[7, 8, 9, 10, 11, 12]);
    assert_eq!(m.len(), 12);
}

fn random_insert_remove<const B: usize>(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let keys: Vec<u16> = (0..10000).map(|_| rng.gen()).collect();
    let mut m = gb::BTreeMap::<u16, u32, B>::new();
    let mut model = std::collections::BTreeMap::new();
    for &k in &keys {
        assert_eq!(m.fetch_put(k, u32::from(k) + 1).unwrap(), model.insert(k, u32::from(k) + 1));
        m.check();
    }
    assert_eq!(m.len(), model.len());

    let mut order = keys.clone();
    order.shuffle(&mut rng);
    for k in order {
        let expected = model.remove(&k).map(|v| (k, v));
        assert_eq!(m.fetch_remove(&k), expected);
        m.check();
    }
    assert!(m.is_empty());
    assert_eq!(m.len(), 0);
    assert!(m.root_node().is_none());
}

#[test]
fn test_random_insert_remove() {
    random_insert_remove::<{ DB }>(0x5eed);
}

#[test]
fn test_random_insert_remove_small_nodes() {
    for seed in 1..=4 {
        random_insert_remove::<2>(seed);
    }
}

#[test]
fn test_overwrite_returns_previous() {
    let mut m = BTreeMap::<u32, u32>::new();
    assert_eq!(m.fetch_put(11111, 99999).unwrap(), None);
    assert_eq!(m.fetch_put(11111, 0).unwrap(), Some(99999));
    assert_eq!(m.get(&11111), Some(&0));
    assert_eq!(m.len(), 1);
}

#[test]
fn test_put_remove_get() {
    let mut m = BTreeMap::<u32, u32>::new();
    m.fetch_put(22222, 88888).unwrap();
    assert_eq!(m.fetch_remove(&22222), Some((22222, 88888)));
    assert_eq!(m.get(&22222), None);
    assert!(m.is_empty());
}

#[test]
fn test_overwrite_keeps_shape() {
    let mut m = gb::BTreeMap::<u32, u32, 2>::new();
    for i in 0..200 {
        m.fetch_put(i, i).unwrap();
    }
    let before_root = m.root_node().unwrap().keys().to_vec();
    for i in (0..200).step_by(3) {
        assert_eq!(m.fetch_put(i, i + 1000).unwrap(), Some(i));
    }
    m.check();
    assert_eq!(m.len(), 200);
    assert_eq!(m.root_node().unwrap().keys(), &before_root[..]);
    for (k, v) in m.iter() {
        let expected = if k % 3 == 0 { k + 1000 } else { *k };
        assert_eq!(*v, expected);
    }
}

#[test]
fn test_remove_absent_is_noop() {
    let mut m = gb::BTreeMap::<u32, u32, 3>::new();
    for i in (0..500).map(|i| i * 2) {
        m.fetch_put(i, i).unwrap();
    }
    let before = pairs(&m);
    let root_before = m.root_node().unwrap().keys().to_vec();
    for i in (0..500).map(|i| i * 2 + 1) {
        assert_eq!(m.fetch_remove(&i), None);
    }
    assert_eq!(m.fetch_remove(&5000), None);
    m.check();
    assert_eq!(pairs(&m), before);
    assert_eq!(m.root_node().unwrap().keys(), &root_before[..]);

    let mut empty = BTreeMap::<u32, u32>::new();
    assert_eq!(empty.fetch_remove(&1), None);
    assert!(empty.is_empty());
}

fn remove_all<const B: usize>(n: u32, order: impl Iterator<Item = u32>) {
    let mut m = gb::BTreeMap::<u32, String, B>::new();
    for i in 0..n {
        m.fetch_put(i, i.to_string()).unwrap();
    }
    m.check();
    for i in order {
        assert_eq!(m.fetch_remove(&i), Some((i, i.to_string())));
        assert!(!m.contains_key(&i));
        m.check();
    }
    assert!(m.is_empty());
}

#[test]
fn test_remove_all_orders() {
    remove_all::<2>(300, 0..300);
    remove_all::<2>(300, (0..300).rev());
    remove_all::<3>(500, (0..500).map(|i| (i * 7) % 500));
    remove_all::<6>(2000, 0..2000);
    remove_all::<6>(2000, (0..2000).rev());
    remove_all::<11>(3000, (0..3000).filter(|i| i % 2 == 0).chain((0..3000).filter(|i| i % 2 == 1)));
}

#[test]
fn test_iter() {
    let mut m = gb::BTreeMap::<u32, u32, 2>::new();
    {
        let mut empty = m.iter();
        assert_eq!(empty.next(), None);
        assert_eq!(empty.next(), None);
    }

    for i in (0..1000).rev() {
        m.fetch_put(i, i * 2).unwrap();
    }
    let mut partial = m.iter();
    assert_eq!(partial.len(), 1000);
    for i in 0..10 {
        assert_eq!(partial.next(), Some((&i, &(i * 2))));
    }
    assert_eq!(partial.len(), 990);

    // Independent cursors over the same map.
    let other = m.iter();
    assert_eq!(other.count(), 1000);
    assert_eq!(partial.count(), 990);

    let keys: Vec<u32> = m.keys().copied().collect();
    assert_eq!(keys, (0..1000).collect::<Vec<_>>());
    let vals: Vec<u32> = m.values().copied().collect();
    assert_eq!(vals, (0..1000).map(|i| i * 2).collect::<Vec<_>>());

    let mut n = 0;
    for (k, v) in &m {
        assert_eq!(*v, k * 2);
        n += 1;
    }
    assert_eq!(n, 1000);
}

#[test]
fn test_accessors() {
    let mut m = gb::BTreeMap::<i64, i64, 3>::new();
    assert_eq!(m.first_key_value(), None);
    assert_eq!(m.last_key_value(), None);
    for i in -300..300 {
        m.fetch_put(i, -i).unwrap();
    }
    assert_eq!(m.first_key_value(), Some((&-300, &300)));
    assert_eq!(m.last_key_value(), Some((&299, &-299)));
    *m.get_mut(&7).unwrap() = 70;
    assert_eq!(m.get(&7), Some(&70));
    assert_eq!(m.get_mut(&1000), None);
    assert!(m.contains_key(&-300));
    assert!(!m.contains_key(&300));

    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.len(), 0);
    m.fetch_put(1, 1).unwrap();
    assert_eq!(format!("{:?}", m), "{1: 1}");
}

#[test]
fn test_composite_keys() {
    let mut m = BTreeMap::<Option<(String, Vec<u8>)>, u32>::new();
    m.fetch_put(Some(("b".to_string(), vec![1])), 1).unwrap();
    m.fetch_put(Some(("a".to_string(), vec![2, 0])), 2).unwrap();
    m.fetch_put(None, 3).unwrap();
    m.fetch_put(Some(("a".to_string(), vec![2])), 4).unwrap();
    m.fetch_put(Some(("".to_string(), vec![])), 5).unwrap();
    assert_eq!(m.fetch_put(None, 6).unwrap(), Some(3));
    let vals: Vec<u32> = m.values().copied().collect();
    assert_eq!(vals, vec![6, 5, 4, 2, 1]);
    assert_eq!(m.get(&Some(("a".to_string(), vec![2]))), Some(&4));
}

#[test]
fn test_alloc_failure_leaves_map_unchanged() {
    let budget = Budget::new(0);
    let mut m = gb::BTreeMap::<u32, u32, 2, &Budget>::new_in(&budget);
    assert_eq!(
        m.fetch_put(1, 1),
        Err(Error::Alloc {
            kind: NodeKind::Leaf
        })
    );
    assert!(m.is_empty());

    // Leaf is keys + values + node.
    budget.left.set(3);
    for i in 1..=3 {
        m.fetch_put(i, i).unwrap();
    }
    assert_eq!(budget.left.get(), 0);

    // Splitting the full root leaf needs a new internal root (4) and a new leaf (3).
    budget.left.set(6);
    assert_eq!(
        m.fetch_put(4, 4),
        Err(Error::Alloc {
            kind: NodeKind::Leaf
        })
    );
    m.check();
    assert_eq!(pairs(&m), vec![(1, 1), (2, 2), (3, 3)]);
    assert!(m.root_node().unwrap().is_leaf());

    // Overwrites never allocate.
    budget.left.set(0);
    assert_eq!(m.fetch_put(2, 20).unwrap(), Some(2));

    budget.left.set(7);
    m.fetch_put(4, 4).unwrap();
    m.check();
    let root = m.root_node().unwrap();
    assert_eq!(root.keys(), &[2]);
    assert_eq!(root.edge(0).keys(), &[1]);
    assert_eq!(root.edge(1).keys(), &[3, 4]);
    assert_eq!(budget.left.get(), 0);
}

#[test]
fn test_alloc_failure_deep_chain() {
    let budget = Budget::new(usize::MAX);
    let mut m = gb::BTreeMap::<u32, u32, 2, &Budget>::new_in(&budget);
    let mut i = 0;
    // Grow until every node on the rightmost path is full, so the next append splits
    // the whole path and the root.
    loop {
        m.fetch_put(i, i).unwrap();
        i += 1;
        let mut node = m.root_node().unwrap();
        let mut all_full = node.len() == 3;
        while all_full && !node.is_leaf() {
            node = node.edge(node.len());
            all_full = node.len() == 3;
        }
        if all_full && !m.root_node().unwrap().is_leaf() {
            break;
        }
    }
    // Two internal nodes (4 blocks each) and a leaf (3 blocks).
    let before = pairs(&m);
    for left in 0..11 {
        budget.left.set(left);
        assert!(m.fetch_put(i, i).is_err());
        m.check();
        assert_eq!(pairs(&m), before);
    }
    budget.left.set(usize::MAX);
    m.fetch_put(i, i).unwrap();
    m.check();
    assert_eq!(m.len(), before.len() + 1);
}

#[test]
fn test_teardown_frees_every_node() {
    let budget = Budget::new(usize::MAX);
    {
        let mut m = gb::BTreeMap::<u32, String, 2, &Budget>::new_in(&budget);
        for i in 0..5000 {
            m.fetch_put(i, i.to_string()).unwrap();
        }
        for i in (0..5000).step_by(3) {
            m.fetch_remove(&i);
        }
        m.check();
        assert!(budget.live.get() > 0);
        m.clear();
        assert_eq!(budget.live.get(), 0);
        for i in 0..5000 {
            m.fetch_put(i, i.to_string()).unwrap();
        }
    }
    assert_eq!(budget.live.get(), 0);
}

#[test]
fn test_try_extend() {
    let mut m = BTreeMap::<u32, u32>::new();
    m.try_extend((0..100).map(|i| (i, i))).unwrap();
    m.try_extend((50..150).map(|i| (i, i + 1))).unwrap();
    assert_eq!(m.len(), 150);
    assert_eq!(m.get(&49), Some(&49));
    assert_eq!(m.get(&50), Some(&51));
    m.check();
}

#[test]
fn test_random_budgets_never_leak() {
    let mut rng = StdRng::seed_from_u64(42);
    let budget = Budget::new(0);
    {
        let mut m = gb::BTreeMap::<u32, u32, 2, &Budget>::new_in(&budget);
        let mut model = std::collections::BTreeMap::new();
        for _ in 0..2000 {
            let k = rng.gen_range(0..3000);
            budget.left.set(rng.gen_range(0..12));
            match m.fetch_put(k, k) {
                Ok(old) => assert_eq!(old, model.insert(k, k)),
                Err(Error::Alloc { .. }) => {}
            }
            m.check();
            assert_eq!(pairs(&m), model.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>());
        }
    }
    assert_eq!(budget.live.get(), 0);
}
