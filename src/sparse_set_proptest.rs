#![cfg(test)]

// Property tests for SparseSet kept inside the crate so they can reach the
// structural `assert_consistent` check.

use crate::pool::ArrayPool;
use crate::sparse_set::SparseSet;
use crate::storage::Storage;
use hashbrown::HashMap;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    AddUnchecked,
    AddWithExpandCheck(usize),
    Remove(usize),
    RemoveStale(usize),
    BoundsLookup(u32),
    Expand(usize),
    Reserve(usize),
    Clear,
    ClearReset,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        3 => Just(Op::AddUnchecked),
        3 => (0usize..4).prop_map(Op::AddWithExpandCheck),
        3 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::RemoveStale),
        1 => (0u32..40).prop_map(Op::BoundsLookup),
        1 => (0usize..5).prop_map(Op::Expand),
        1 => (0usize..40).prop_map(Op::Reserve),
        1 => Just(Op::Clear),
        1 => Just(Op::ClearReset),
    ];
    proptest::collection::vec(op, 1..120)
}

#[derive(Clone, Copy, Debug)]
struct Live {
    handle: u32,
    version: u32,
    token: u64,
}

// Drives any backend through `ops` while mirroring a parallel payload array
// the way an external caller would.
fn run_model<S: Storage<u32>>(
    mut set: SparseSet<S>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut versions: Vec<u32> = Vec::new();
    set.sync_versions(&mut versions);
    let mut payload: Vec<u64> = Vec::new();
    let mut live: Vec<Live> = Vec::new();
    let mut stale: Vec<(u32, u32)> = Vec::new();
    let mut next_token = 0u64;

    for op in ops {
        match op {
            Op::AddUnchecked => {
                if set.is_full() {
                    continue;
                }
                let (slot, version) = set.add_unchecked_versioned(&versions);
                prop_assert_eq!(slot.dense as usize, payload.len());
                payload.push(next_token);
                live.push(Live { handle: slot.sparse, version, token: next_token });
                next_token += 1;
            }
            Op::AddWithExpandCheck(grow) => {
                let was_full = set.is_full();
                let cap = set.capacity();
                let (expanded, slot, version) =
                    set.add_with_expand_check_versioned(grow, &mut versions);
                prop_assert_eq!(expanded, was_full);
                prop_assert!(set.capacity() >= cap);
                prop_assert_eq!(slot.dense as usize, payload.len());
                payload.push(next_token);
                live.push(Live { handle: slot.sparse, version, token: next_token });
                next_token += 1;
            }
            Op::Remove(pick) => {
                if live.is_empty() {
                    continue;
                }
                let victim = live.swap_remove(pick % live.len());
                let old_len = set.len() as u32;
                let mut index = Some(victim.handle);
                let swap = set
                    .remove_with_bounds_and_version_check(&mut index, victim.version, &mut versions)
                    .expect("live handle removes");
                prop_assert_eq!(index, None);
                prop_assert_eq!(swap.from, old_len - 1);
                let removed = payload.swap_remove(swap.to as usize);
                prop_assert_eq!(removed, victim.token);
                if swap.from != swap.to {
                    let moved = set.sparse_index_at(swap.to).expect("moved entry is live");
                    prop_assert_eq!(set.dense_index_with_bounds_check(moved), Some(swap.to));
                }
                prop_assert_eq!(versions[victim.handle as usize], victim.version.wrapping_add(1));
                stale.push((victim.handle, victim.version));
            }
            Op::RemoveStale(pick) => {
                if stale.is_empty() {
                    continue;
                }
                let (handle, version) = stale[pick % stale.len()];
                let mut index = Some(handle);
                prop_assert!(set
                    .remove_with_version_check(&mut index, version, &mut versions)
                    .is_none());
                prop_assert_eq!(index, Some(handle));
            }
            Op::BoundsLookup(handle) => {
                let expected = live.iter().position(|l| l.handle == handle);
                let got = set.dense_index_with_bounds_check(handle);
                prop_assert_eq!(got.is_some(), expected.is_some());
            }
            Op::Expand(n) => {
                let cap = set.capacity();
                set.expand_with_versions(n, &mut versions);
                prop_assert_eq!(set.capacity(), cap + n);
            }
            Op::Reserve(n) => {
                let cap = set.capacity();
                set.reserve_with_versions(n, &mut versions);
                prop_assert_eq!(set.capacity(), cap.max(n));
            }
            Op::Clear => {
                set.clear_with_versions(&mut versions);
                stale.extend(live.drain(..).map(|l| (l.handle, l.version)));
                payload.clear();
            }
            Op::ClearReset => {
                // Generations restart, so previously stale pairs may match again.
                set.clear_with_version_array_reset(&mut versions);
                live.clear();
                stale.clear();
                payload.clear();
            }
        }

        set.assert_consistent();
        prop_assert_eq!(set.len(), live.len());
        prop_assert_eq!(versions.len(), set.capacity());
        let mut by_handle: HashMap<u32, Live> = HashMap::new();
        for l in &live {
            prop_assert!(by_handle.insert(l.handle, *l).is_none(), "handle issued twice");
            let dense = set
                .dense_index_with_bounds_and_version_check(l.handle, l.version, &versions)
                .expect("live handle resolves");
            prop_assert_eq!(payload[dense as usize], l.token);
        }
        for &(handle, version) in &stale {
            prop_assert!(set
                .dense_index_with_version_check(handle, version, &versions)
                .is_none());
        }
    }
    Ok(())
}

// Property: identity, swap-back and stale-handle rejection hold for any
// interleaving of adds, removes, growth and clears, on every backend.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_sparse_set_vec(cap in 0usize..6, ops in arb_ops()) {
        run_model(SparseSet::with_capacity(cap), ops)?;
    }

    #[test]
    fn prop_sparse_set_raw(cap in 0usize..6, ops in arb_ops()) {
        run_model(SparseSet::new_raw(cap), ops)?;
    }

    #[test]
    fn prop_sparse_set_pooled(cap in 0usize..6, ops in arb_ops()) {
        let pool = ArrayPool::new();
        run_model(SparseSet::new_in(&pool, cap), ops)?;
    }
}
