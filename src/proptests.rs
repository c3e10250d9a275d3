use crate::gb;

use proptest::prelude::*;
use std::collections::BTreeMap as StdMap;

#[derive(Debug, Clone)]
enum Op {
    Put(u16, u32),
    Remove(u16),
    Get(u16),
}

fn ops_strategy(key_space: u16) -> impl Strategy<Value = Vec<Op>> {
    let key = 0..key_space;
    let op = prop_oneof![
        50 => (key.clone(), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        35 => key.clone().prop_map(Op::Remove),
        15 => key.prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=600)
}

fn run_ops<const B: usize>(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut t = gb::BTreeMap::<u16, u32, B>::new();
    let mut m: StdMap<u16, u32> = StdMap::new();

    for op in ops {
        match op {
            Op::Put(k, v) => {
                let old_t = t.fetch_put(k, v).unwrap();
                let old_m = m.insert(k, v);
                prop_assert_eq!(old_t, old_m);
            }
            Op::Remove(k) => {
                let old_t = t.fetch_remove(&k);
                let old_m = m.remove(&k).map(|v| (k, v));
                prop_assert_eq!(old_t, old_m);
            }
            Op::Get(k) => {
                prop_assert_eq!(t.get(&k), m.get(&k));
            }
        }
        t.check();
        prop_assert_eq!(t.len(), m.len());
        prop_assert_eq!(t.is_empty(), m.is_empty());
    }

    let got: Vec<(u16, u32)> = t.iter().map(|(k, v)| (*k, *v)).collect();
    let expected: Vec<(u16, u32)> = m.iter().map(|(k, v)| (*k, *v)).collect();
    prop_assert_eq!(got, expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_b2(ops in ops_strategy(200)) {
        run_ops::<2>(ops)?;
    }

    #[test]
    fn prop_equivalence_b3(ops in ops_strategy(400)) {
        run_ops::<3>(ops)?;
    }

    #[test]
    fn prop_equivalence_default_b(ops in ops_strategy(1000)) {
        run_ops::<{ crate::DB }>(ops)?;
    }

    #[test]
    fn prop_remove_all_empties(keys in prop::collection::vec(any::<u16>(), 0..600), seed in any::<u64>()) {
        use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

        let mut t = gb::BTreeMap::<u16, u16, 3>::new();
        for &k in &keys {
            t.fetch_put(k, k).unwrap();
        }
        let mut order = keys.clone();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        for k in order {
            // Duplicates were stored once, the second removal finds nothing.
            let removed = t.fetch_remove(&k);
            prop_assert!(removed.is_none() || removed == Some((k, k)));
            prop_assert_eq!(t.get(&k), None);
            t.check();
        }
        prop_assert!(t.is_empty());
        prop_assert_eq!(t.len(), 0);
        prop_assert_eq!(t.iter().next(), None);
    }

    #[test]
    fn prop_iter_strictly_increasing(keys in prop::collection::vec(any::<i32>(), 0..800)) {
        let mut t = gb::BTreeMap::<i32, (), 4>::new();
        t.try_extend(keys.iter().map(|&k| (k, ()))).unwrap();
        let seen: Vec<i32> = t.keys().copied().collect();
        prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(seen.len(), t.len());
    }
}
