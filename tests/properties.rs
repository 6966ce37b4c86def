//! Property tests for the load-bearing invariants.
//!
//! Random mutation sequences against a small set of entities must preserve:
//! non-overlap of effective intervals, monotonic tightening of `removed_at`,
//! and well-defined point-in-time reads at arbitrary instants.

use proptest::prelude::*;
use revlog::{EntityId, Revision, RevisionId, RevisionInput, Store, StoreConfig, Timestamp};
use std::collections::HashMap;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Insert { slot: usize, at: i64 },
    Delete { slot: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..3usize, 0..50i64).prop_map(|(slot, at)| Op::Insert {
            slot,
            at: 1_000 + at * 100,
        }),
        1 => (0..3usize).prop_map(|slot| Op::Delete { slot }),
    ]
}

fn check_non_overlap(revisions: &[Revision]) -> Result<(), TestCaseError> {
    let mut ordered: Vec<&Revision> = revisions.iter().collect();
    ordered.sort_by_key(|r| (r.added_at, r.id));

    for pair in ordered.windows(2) {
        let removed = pair[0].removed_at;
        prop_assert!(
            removed.is_some(),
            "revision {} left open before successor {}",
            pair[0].id,
            pair[1].id
        );
        prop_assert!(
            removed.unwrap() <= pair[1].added_at,
            "revision {} overlaps successor {}",
            pair[0].id,
            pair[1].id
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_mutation_sequences_preserve_invariants(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        let dir = TempDir::new().unwrap();
        let store = Store::create(StoreConfig {
            path: dir.path().join("store"),
            ..Default::default()
        })
        .unwrap();

        let mut slots: Vec<Option<EntityId>> = vec![None; 3];
        let mut seen_removed: HashMap<RevisionId, Timestamp> = HashMap::new();

        for op in &ops {
            match *op {
                Op::Insert { slot, at } => {
                    let mut input =
                        RevisionInput::raw(format!("{:?}", op).into_bytes())
                            .with_added_at(Timestamp(at));
                    if let Some(entity) = slots[slot] {
                        input = input.with_entity(entity);
                    }
                    let revision = store.insert(input).unwrap();
                    slots[slot] = Some(revision.entity);
                }
                Op::Delete { slot } => {
                    if let Some(entity) = slots[slot] {
                        store.delete(entity).unwrap();
                    }
                }
            }

            for entity in slots.iter().flatten() {
                let revisions = store.revisions_of(*entity).unwrap();
                check_non_overlap(&revisions)?;

                // removed_at, once set, only ever moves earlier
                for revision in &revisions {
                    if let Some(removed) = revision.removed_at {
                        if let Some(&earlier) = seen_removed.get(&revision.id) {
                            prop_assert!(
                                removed <= earlier,
                                "revision {} loosened from {:?} to {:?}",
                                revision.id,
                                earlier,
                                removed
                            );
                        }
                        seen_removed.insert(revision.id, removed);
                    } else {
                        prop_assert!(
                            !seen_removed.contains_key(&revision.id),
                            "revision {} reopened",
                            revision.id
                        );
                    }
                }
            }
        }

        // Point-in-time reads stay well-defined at arbitrary instants,
        // including before, between, and after every synthetic timestamp.
        for t in (900..7_000).step_by(250) {
            let snapshot = store.as_of(Timestamp(t)).unwrap();
            prop_assert!(snapshot.len() <= 3);
        }
        store.as_of(Timestamp::now()).unwrap();
    }

    #[test]
    fn prop_same_instant_inserts_leave_one_visible(
        count in 2..6usize,
        at in 1_000..2_000i64,
    ) {
        let dir = TempDir::new().unwrap();
        let store = Store::create(StoreConfig {
            path: dir.path().join("store"),
            ..Default::default()
        })
        .unwrap();

        let first = store
            .insert(RevisionInput::raw(vec![0]).with_added_at(Timestamp(at)))
            .unwrap();
        for i in 1..count {
            store
                .insert(
                    RevisionInput::raw(vec![i as u8])
                        .with_entity(first.entity)
                        .with_added_at(Timestamp(at)),
                )
                .unwrap();
        }

        let revisions = store.revisions_of(first.entity).unwrap();
        prop_assert_eq!(revisions.len(), count);

        // All but the highest id collapse to zero-length intervals
        let open: Vec<_> = revisions
            .iter()
            .filter(|r| r.removed_at.is_none())
            .collect();
        prop_assert_eq!(open.len(), 1);
        prop_assert_eq!(open[0].id, revisions.iter().map(|r| r.id).max().unwrap());

        let visible = store
            .entity_as_of(first.entity, Timestamp(at))
            .unwrap()
            .unwrap();
        prop_assert_eq!(visible.id, open[0].id);
    }
}
