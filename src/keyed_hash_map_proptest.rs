#![cfg(test)]

// Property tests for KeyedHashMap kept inside the crate so they can reach the
// structural `assert_consistent` check.

use crate::error::InsertError;
use crate::keyed_hash_map::{KeyedHashMap, MapKey, ScanState};
use crate::pool::ArrayPool;
use crate::storage::Storage;
use crate::Entry;
use hashbrown::{HashMap, HashSet};
use proptest::prelude::*;
use std::fmt;
use std::hash::Hash;

// Key newtype hashing like a plain string.
#[derive(Clone, Eq, PartialEq, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl MapKey for Key {
    fn stable_hash(&self) -> u64 {
        self.0.stable_hash()
    }
}

// Every key lands in one bucket, so all lookups resolve by equality alone.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct CollidingKey(String);
impl MapKey for CollidingKey {
    fn stable_hash(&self) -> u64 {
        0
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}
impl From<String> for CollidingKey {
    fn from(s: String) -> Self {
        CollidingKey(s)
    }
}

// Pool-indexed operations to improve shrinking.
#[derive(Clone, Debug)]
enum OpI {
    AddUnique(usize, i32),
    Set(usize, i32),
    Remove(usize),
    RemoveNoClear(usize),
    Find(usize),
    Contains(String),
    Modify(usize, i32),
    Reserve(usize),
    Clear,
    Scan,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,4}", 1..=12).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::AddUnique(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Set(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::RemoveNoClear),
            2 => idx.clone().prop_map(OpI::Find),
            1 => "[a-z]{0,4}".prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Modify(i, v)),
            1 => (0usize..40).prop_map(OpI::Reserve),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Scan),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn run_model<K, B, E>(
    mut sut: KeyedHashMap<K, i32, B, E>,
    pool: Vec<String>,
    ops: Vec<OpI>,
) -> Result<(), TestCaseError>
where
    K: MapKey + From<String> + Clone + Hash + fmt::Debug,
    B: Storage<u32>,
    E: Storage<Entry<K, i32>>,
{
    let key = |i: usize| K::from(pool[i].clone());
    let mut model: HashMap<K, i32> = HashMap::new();
    // Entry indices stay put across growth.
    let mut slots: HashMap<K, u32> = HashMap::new();

    for op in ops {
        let version = sut.version();
        let mut structural = false;
        match op {
            OpI::AddUnique(i, v) => {
                let k = key(i);
                match sut.add_with_unique_check(k.clone(), v) {
                    Ok(index) => {
                        prop_assert!(model.insert(k.clone(), v).is_none());
                        slots.insert(k, index);
                        structural = true;
                    }
                    Err(InsertError::DuplicateKey) => {
                        prop_assert!(model.contains_key(&k));
                    }
                }
            }
            OpI::Set(i, v) => {
                let k = key(i);
                let prev = sut.set(k.clone(), v);
                prop_assert_eq!(prev, model.insert(k.clone(), v));
                if prev.is_none() {
                    let index = sut.index_of(&k).expect("set key is present");
                    slots.insert(k, index);
                    structural = true;
                }
            }
            OpI::Remove(i) => {
                let k = key(i);
                let got = sut.remove(&k);
                prop_assert_eq!(got, model.remove(&k));
                structural = slots.remove(&k).is_some();
            }
            OpI::RemoveNoClear(i) => {
                let k = key(i);
                let removed = sut.try_remove_no_value_clear(&k);
                prop_assert_eq!(removed, model.remove(&k).is_some());
                if let Some(index) = slots.remove(&k) {
                    prop_assert!(sut.entry_at(index).is_none(), "stale pair stays hidden");
                }
                structural = removed;
            }
            OpI::Find(i) => {
                let k = key(i);
                prop_assert_eq!(sut.get(&k), model.get(&k));
                prop_assert_eq!(sut.index_of(&k), slots.get(&k).copied());
            }
            OpI::Contains(s) => {
                let k = K::from(s);
                prop_assert_eq!(sut.contains_key(&k), model.contains_key(&k));
            }
            OpI::Modify(i, v) => {
                let k = key(i);
                let modified = sut.try_modify_value(&k, v);
                prop_assert_eq!(modified, model.contains_key(&k));
                if let Some(mv) = model.get_mut(&k) {
                    *mv = v;
                }
            }
            OpI::Reserve(n) => {
                let cap = sut.capacity();
                sut.reserve(n);
                prop_assert!(sut.capacity() >= cap.max(n));
                structural = sut.capacity() > cap;
            }
            OpI::Clear => {
                sut.clear();
                model.clear();
                slots.clear();
                structural = true;
            }
            OpI::Scan => {
                let mut cursor = sut.cursor();
                let mut seen: HashSet<K> = HashSet::new();
                loop {
                    match sut.move_next(&mut cursor) {
                        ScanState::FoundEntry(i) => {
                            let (k, v) = sut.entry_at(i).expect("scan yields live entries");
                            prop_assert_eq!(model.get(k), Some(v));
                            prop_assert!(seen.insert(k.clone()), "scan yields each entry once");
                        }
                        ScanState::InvalidVersion => prop_assert!(false, "no mutation during scan"),
                        ScanState::End => break,
                    }
                }
                prop_assert_eq!(seen.len(), model.len());
            }
        }

        // Post-conditions after each op
        sut.assert_consistent();
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        if structural {
            prop_assert_ne!(sut.version(), version);
        } else {
            prop_assert_eq!(sut.version(), version);
        }
        for (k, &index) in &slots {
            prop_assert_eq!(sut.key_at(index), Some(k));
        }
    }
    Ok(())
}

// Property: state-machine equivalence against hashbrown::HashMap.
// - Duplicate keys are rejected by the unique-checked add without mutation.
// - get/index_of parity; an entry keeps its index across growth.
// - Cursor scans yield each live entry once.
// - The structure version moves exactly on structural changes.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_model(KeyedHashMap::<Key, i32>::new(), pool, ops)?;
    }

    #[test]
    fn prop_state_machine_collisions((pool, ops) in arb_scenario()) {
        run_model(KeyedHashMap::<CollidingKey, i32>::with_capacity(5), pool, ops)?;
    }

    #[test]
    fn prop_state_machine_pooled((pool, ops) in arb_scenario()) {
        let buckets = ArrayPool::new();
        let entries = ArrayPool::new();
        run_model(KeyedHashMap::<Key, i32, _, _>::new_in(&buckets, &entries, 0), pool, ops)?;
    }

    #[test]
    fn prop_state_machine_raw((pool, ops) in arb_scenario()) {
        run_model(KeyedHashMap::<CollidingKey, i32, _, _>::new_raw(0), pool, ops)?;
    }
}
