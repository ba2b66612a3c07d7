use treelock::{LockError, NodeId, Operation, TreeLockService, TreeStore};

/// A -> {B, C}, B -> {D}
fn abcd() -> TreeLockService {
    let tree = TreeStore::from_edges([
        ("A", None),
        ("B", Some("A")),
        ("C", Some("A")),
        ("D", Some("B")),
    ])
    .unwrap();
    TreeLockService::new(tree)
}

fn dump(svc: &TreeLockService) -> String {
    svc.with_tree(|t| format!("{:?}", t))
}

#[test]
fn lock_leaf_counts_on_every_ancestor() {
    let svc = abcd();
    assert_eq!(svc.execute(Operation::Lock, "D", 1), Ok(()));

    svc.with_tree(|t| {
        assert_eq!(t.locked_by("D").unwrap(), Some(1));
        assert_eq!(t.locked_descendant_count("B").unwrap(), 1);
        assert_eq!(t.locked_descendant_count("A").unwrap(), 1);
        assert_eq!(t.locked_descendant_count("C").unwrap(), 0);
    });
}

#[test]
fn lock_over_locked_descendant_is_rejected_without_change() {
    let svc = abcd();
    svc.execute(Operation::Lock, "D", 1).unwrap();
    let before = dump(&svc);

    assert_eq!(svc.execute(Operation::Lock, "B", 2), Err(LockError::DescendantLocked));
    assert_eq!(dump(&svc), before);
    assert_eq!(svc.generation(), 1);
}

#[test]
fn unlock_by_other_user_is_rejected() {
    let svc = abcd();
    svc.execute(Operation::Lock, "D", 1).unwrap();

    assert_eq!(svc.execute(Operation::Unlock, "D", 2), Err(LockError::NotLockedByUser));
    svc.with_tree(|t| assert_eq!(t.locked_by("D").unwrap(), Some(1)));
}

#[test]
fn upgrade_moves_lock_up() {
    let svc = abcd();
    svc.execute(Operation::Lock, "D", 1).unwrap();

    assert_eq!(svc.execute(Operation::Upgrade, "B", 1), Ok(()));
    svc.with_tree(|t| {
        assert_eq!(t.locked_by("D").unwrap(), None);
        assert_eq!(t.locked_by("B").unwrap(), Some(1));
        assert_eq!(t.locked_descendant_count("B").unwrap(), 0);
        assert_eq!(t.locked_descendant_count("A").unwrap(), 1);
        assert!(t.locked_descendants("B").unwrap().is_empty());
        let above: Vec<&str> = t.locked_descendants("A").unwrap().iter().map(|id| id.as_str()).collect();
        assert_eq!(above, vec!["B"]);
        t.verify().unwrap();
    });
}

#[test]
fn upgrade_without_locked_descendants_is_rejected() {
    let svc = abcd();
    assert_eq!(svc.execute(Operation::Upgrade, "B", 1), Err(LockError::NoLockedDescendants));
    assert_eq!(svc.execute(Operation::Upgrade, "D", 1), Err(LockError::NoLockedDescendants));
}

#[test]
fn upgrade_with_mixed_owners_is_rejected() {
    let svc = abcd();
    svc.execute(Operation::Lock, "D", 1).unwrap();
    svc.execute(Operation::Lock, "C", 2).unwrap();
    let before = dump(&svc);

    assert_eq!(svc.execute(Operation::Upgrade, "A", 1), Err(LockError::MixedOwnership));
    assert_eq!(dump(&svc), before);
}

#[test]
fn upgrade_absorbs_every_lock_of_the_owner() {
    let svc = abcd();
    svc.execute(Operation::Lock, "D", 7).unwrap();
    svc.execute(Operation::Lock, "C", 7).unwrap();

    assert_eq!(svc.execute(Operation::Upgrade, "A", 7), Ok(()));
    svc.with_tree(|t| {
        assert_eq!(t.locked_by("A").unwrap(), Some(7));
        assert_eq!(t.locked_by("C").unwrap(), None);
        assert_eq!(t.locked_by("D").unwrap(), None);
        assert_eq!(t.locked_descendant_count("B").unwrap(), 0);
        t.verify().unwrap();
    });
    assert_eq!(svc.metrics().snapshot().absorbed_locks, 2);
}

#[test]
fn root_behaves_like_any_node() {
    let svc = abcd();
    assert_eq!(svc.execute(Operation::Lock, "A", 3), Ok(()));
    assert_eq!(svc.execute(Operation::Lock, "D", 4), Err(LockError::AncestorLocked));
    assert_eq!(svc.execute(Operation::Upgrade, "B", 3), Err(LockError::AncestorLocked));
    assert_eq!(svc.execute(Operation::Unlock, "A", 3), Ok(()));
    assert_eq!(svc.execute(Operation::Unlock, "A", 3), Err(LockError::NotLocked));
}

#[test]
fn unknown_node_is_an_ordinary_failure() {
    let svc = abcd();
    for op in Operation::ALL {
        assert_eq!(
            svc.execute(op, "Z", 1),
            Err(LockError::NodeNotFound("Z".to_string()))
        );
    }
    assert_eq!(svc.generation(), 0);
}

#[test]
fn snapshot_follows_committed_state() {
    let svc = abcd();
    let empty = svc.snapshot();
    svc.execute(Operation::Lock, "C", 5).unwrap();
    let after = svc.snapshot();

    assert!(!empty.is_current(svc.generation()));
    assert!(after.is_current(svc.generation()));
    assert_eq!(empty.get("C").unwrap().locked_by, None);
    assert_eq!(after.get("C").unwrap().locked_by, Some(5));
    assert_eq!(after.get("B").unwrap().children, vec![NodeId::from("D")]);
    assert_eq!(after.get("A").unwrap().parent, None);
}

#[test]
fn persisted_state_restores_counters() {
    let svc = abcd();
    svc.execute(Operation::Lock, "D", 1).unwrap();
    svc.execute(Operation::Lock, "C", 2).unwrap();

    let json = svc.persist().to_json().unwrap();
    let restored = treelock::persist::PersistedTree::from_json(&json)
        .unwrap()
        .restore()
        .unwrap();
    restored.verify().unwrap();
    assert_eq!(restored.locked_descendant_count("A").unwrap(), 2);

    let svc = TreeLockService::new(restored);
    assert_eq!(svc.execute(Operation::Lock, "B", 1), Err(LockError::DescendantLocked));
    assert_eq!(svc.execute(Operation::Unlock, "D", 1), Ok(()));
}
