#![cfg(test)]

// Property tests for the dictionary internals, kept inside the crate so
// they can inspect table shapes and the rehash state directly.

use proptest::prelude::*;
use std::collections::HashMap;

use crate::dict::{Dict, RehashState};
use crate::types::HashType;

type Sut = Dict<HashType<String, i64>>;

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// keys, the pool shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i64),
    Replace(usize, i64),
    Remove(usize),
    Take(usize),
    Find(usize),
    Mutate(usize, i64),
    Rehash(usize),
    ExpandDouble,
    Shrink,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            (idx.clone(), any::<i64>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            (idx.clone(), any::<i64>()).prop_map(|(i, v)| OpI::Replace(i, v)),
            idx.clone().prop_map(OpI::Remove),
            idx.clone().prop_map(OpI::Take),
            idx.clone().prop_map(OpI::Find),
            (idx.clone(), any::<i64>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            (0usize..4).prop_map(OpI::Rehash),
            Just(OpI::ExpandDouble),
            Just(OpI::Shrink),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Structural invariants that must hold between any two operations.
fn check_shape(d: &Sut, model: &HashMap<String, i64>) -> Result<(), TestCaseError> {
    for t in 0..2 {
        let table = &d.ht[t];
        let size = table.size();
        prop_assert!(size == 0 || size.is_power_of_two(), "table {} size {}", t, size);
        if size > 0 {
            prop_assert_eq!(table.sizemask, size - 1);
        } else {
            prop_assert_eq!(table.sizemask, 0);
        }
        prop_assert!(table.used <= model.len());
    }
    prop_assert_eq!(d.len(), model.len());

    match d.rehash {
        RehashState::Idle => {
            prop_assert!(d.ht[1].is_unallocated(), "second table allocated while idle");
        }
        RehashState::Rehashing { index } => {
            prop_assert!(d.ht[1].size() > 0);
            prop_assert!(index < d.ht[0].size());
            for b in 0..index {
                prop_assert!(
                    d.ht[0].buckets[b].is_none(),
                    "bucket {} below the cursor is non-empty",
                    b
                );
            }
        }
    }

    // Each model key is findable and stored in exactly one table.
    for (k, v) in model {
        prop_assert_eq!(d.get(k), Some(v));
        let mut hits = 0;
        for t in 0..2 {
            for bucket in &d.ht[t].buckets {
                let mut cur = bucket.as_deref();
                while let Some(e) = cur {
                    if e.key() == k {
                        hits += 1;
                    }
                    cur = e.next_entry();
                }
            }
        }
        prop_assert_eq!(hits, 1, "key {:?} stored {} times", k, hits);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_internal_invariants((pool, ops) in arb_scenario()) {
        let mut sut: Sut = Dict::new();
        let mut model: HashMap<String, i64> = HashMap::new();

        for op in ops {
            match op {
                OpI::Insert(i, v) => {
                    let k = pool[i].clone();
                    let already = model.contains_key(&k);
                    match sut.insert(k.clone(), v) {
                        Ok(()) => {
                            prop_assert!(!already, "insert must fail on duplicate");
                            model.insert(k, v);
                        }
                        Err(_) => prop_assert!(already, "duplicate error only when key exists"),
                    }
                }
                OpI::Replace(i, v) => {
                    let k = pool[i].clone();
                    let already = model.contains_key(&k);
                    let outcome = sut.replace(k.clone(), v);
                    prop_assert_eq!(
                        outcome == crate::dict::Replaced::Updated,
                        already,
                        "replace outcome must match prior presence"
                    );
                    model.insert(k, v);
                }
                OpI::Remove(i) => {
                    let k = pool[i].clone();
                    prop_assert_eq!(sut.delete(&k), model.remove(&k).is_some());
                }
                OpI::Take(i) => {
                    let k = pool[i].clone();
                    match (sut.take(&k), model.remove(&k)) {
                        (Some((tk, tv)), Some(mv)) => {
                            prop_assert_eq!(tk, k);
                            prop_assert_eq!(tv, mv);
                        }
                        (None, None) => {}
                        (got, want) => {
                            prop_assert!(false, "take mismatch: {:?} vs {:?}", got, want);
                        }
                    }
                }
                OpI::Find(i) => {
                    let k = pool[i].clone();
                    let found = sut.find(&k).map(|e| *e.value());
                    prop_assert_eq!(found, model.get(&k).copied());
                }
                OpI::Mutate(i, delta) => {
                    let k = pool[i].clone();
                    match (sut.get_mut(&k), model.get_mut(&k)) {
                        (Some(v), Some(mv)) => {
                            *v = v.saturating_add(delta);
                            *mv = mv.saturating_add(delta);
                        }
                        (None, None) => {}
                        _ => prop_assert!(false, "get_mut disagrees with the model"),
                    }
                }
                OpI::Rehash(n) => {
                    sut.rehash(n);
                }
                OpI::ExpandDouble => {
                    // Capped: repeated doublings on a near-empty dictionary
                    // must not balloon the allocation.
                    let target = (sut.slots().max(2) * 2).min(1 << 12);
                    let _ = sut.expand(target);
                }
                OpI::Shrink => {
                    let _ = sut.shrink_to_fit();
                }
            }

            check_shape(&sut, &model)?;
        }

        // Drain any in-flight migration and re-check from a settled state.
        while sut.rehash(100) {}
        check_shape(&sut, &model)?;
    }
}
