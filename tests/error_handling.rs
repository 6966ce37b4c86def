//! Error handling and policy edge cases.

use revlog::{
    DuplicatePolicy, EntityId, IdentityChangePolicy, RevisionId, RevisionInput, Store, StoreConfig,
    StoreError, Timestamp,
};
use tempfile::TempDir;

fn test_store(dir: &TempDir) -> Store {
    Store::create(StoreConfig {
        path: dir.path().join("store"),
        ..Default::default()
    })
    .unwrap()
}

// --- Constraint Violations ---

#[test]
fn test_explicit_entity_above_next_revision_id_rejected() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    // First revision will get id 1; entity 99 would violate entity <= id
    let result = store.insert(RevisionInput::raw(vec![]).with_entity(EntityId(99)));
    assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));

    // The failed append consumed nothing
    let rev = store.insert(RevisionInput::raw(vec![])).unwrap();
    assert_eq!(rev.id, RevisionId(1));
}

#[test]
fn test_update_of_unknown_high_entity_is_a_constraint_violation() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    // Update appends under the given id, so the same invariant applies
    let result = store.update(EntityId(50), RevisionInput::raw(vec![]));
    assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
}

#[test]
fn test_inverted_interval_rejected() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let result = store.insert(
        RevisionInput::raw(vec![])
            .with_added_at(Timestamp(200))
            .with_removed_at(Timestamp(100)),
    );
    assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
}

#[test]
fn test_zero_length_interval_accepted_but_invisible() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let rev = store
        .insert(
            RevisionInput::raw(b"ghost".to_vec())
                .with_added_at(Timestamp(100))
                .with_removed_at(Timestamp(100)),
        )
        .unwrap();

    assert!(store
        .entity_as_of(rev.entity, Timestamp(100))
        .unwrap()
        .is_none());
    assert_eq!(store.revisions_of(rev.entity).unwrap().len(), 1);
}

// --- Duplicate Identifier Policy ---

#[test]
fn test_duplicate_identifier_rejected_when_configured() {
    let dir = TempDir::new().unwrap();
    let store = Store::create(StoreConfig {
        path: dir.path().join("store"),
        on_duplicate_identifier: DuplicatePolicy::Reject,
        ..Default::default()
    })
    .unwrap();

    let rev = store
        .insert(RevisionInput::raw(b"v1".to_vec()).with_added_at(Timestamp(100)))
        .unwrap();

    let result = store.insert(RevisionInput::raw(b"v2".to_vec()).with_entity(rev.entity));
    assert!(matches!(
        result,
        Err(StoreError::DuplicateIdentifier(e)) if e == rev.entity
    ));

    // After a delete the id is free again
    store.delete(rev.entity).unwrap().unwrap();
    store
        .insert(RevisionInput::raw(b"v2".to_vec()).with_entity(rev.entity))
        .unwrap();
}

#[test]
fn test_duplicate_identifier_allowed_by_default() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let rev = store
        .insert(RevisionInput::raw(b"v1".to_vec()).with_added_at(Timestamp(100)))
        .unwrap();
    store
        .insert(
            RevisionInput::raw(b"v2".to_vec())
                .with_entity(rev.entity)
                .with_added_at(Timestamp(200)),
        )
        .unwrap();

    assert_eq!(store.revisions_of(rev.entity).unwrap().len(), 2);
}

// --- Identity Change Policy ---

#[test]
fn test_identity_change_rejected_when_configured() {
    let dir = TempDir::new().unwrap();
    let store = Store::create(StoreConfig {
        path: dir.path().join("store"),
        on_identity_change: IdentityChangePolicy::Reject,
        ..Default::default()
    })
    .unwrap();

    let rev = store.insert(RevisionInput::raw(b"v1".to_vec())).unwrap();
    let other = store.insert(RevisionInput::raw(b"x".to_vec())).unwrap();

    let result = store.update(
        rev.entity,
        RevisionInput::raw(b"v2".to_vec()).with_entity(other.entity),
    );
    assert!(matches!(
        result,
        Err(StoreError::IdentityChangeRejected { from, to })
            if from == rev.entity && to == other.entity
    ));

    // The old identity is untouched by the rejected update
    let current = store
        .entity_as_of(rev.entity, Timestamp::now())
        .unwrap()
        .unwrap();
    assert_eq!(current.payload, b"v1");
}

// --- Missing Things ---

#[test]
fn test_missing_revision_reads_as_none() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    assert!(store.revision(RevisionId(999)).unwrap().is_none());
    assert!(store.revisions_of(EntityId(999)).unwrap().is_empty());
    assert!(store
        .entity_as_of(EntityId(999), Timestamp::now())
        .unwrap()
        .is_none());
}
