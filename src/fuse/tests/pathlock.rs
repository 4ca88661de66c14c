#![cfg(test)]

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::fuse::pathlock::{OpClass, PathGuard, PathLocks};

fn keys<'g>(guard: &'g PathGuard<'_>) -> Vec<&'g str> {
    guard.keys().iter().map(String::as_str).collect()
}

#[test]
fn lock_covers_exactly_the_prefix_chain() {
    let locks = PathLocks::new();
    let guard = locks.lock("a/b/c", OpClass::Access);
    assert_eq!(keys(&guard), ["a", "a/b", "a/b/c"]);
    assert_eq!(locks.entry_count(), 3);
}

#[test]
fn root_operations_take_a_single_entry() {
    let locks = PathLocks::new();
    let guard = locks.lock(".", OpClass::Access);
    assert_eq!(keys(&guard), ["."]);
}

#[test]
fn entries_are_reclaimed_when_the_last_guard_drops() {
    let locks = PathLocks::new();
    let one = locks.lock("a/b", OpClass::Access);
    let two = locks.lock("a/c", OpClass::Access);
    assert_eq!(locks.entry_count(), 3, "a, a/b, a/c");
    drop(one);
    assert_eq!(locks.entry_count(), 2, "a stays referenced by the other guard");
    drop(two);
    assert_eq!(locks.entry_count(), 0);
}

#[test]
fn readers_on_overlapping_prefixes_run_in_parallel() {
    let locks = PathLocks::new();
    let _one = locks.lock("a/b", OpClass::Access);
    // Same prefix, different leaf: must not block.
    let _two = locks.lock("a/c", OpClass::Modify);
    // Same leaf, both readers: must not block either.
    let _three = locks.lock("a/b", OpClass::Access);
}

#[test]
fn a_writer_on_a_prefix_blocks_descendants() {
    let locks = Arc::new(PathLocks::new());
    let guard = locks.lock("a", OpClass::CreateOrDelete);

    let (tx, rx) = mpsc::channel();
    let worker = {
        let locks = Arc::clone(&locks);
        std::thread::spawn(move || {
            let _descendant = locks.lock("a/b", OpClass::Access);
            tx.send(()).unwrap();
        })
    };

    assert!(
        rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "descendant proceeded under an exclusive ancestor"
    );
    drop(guard);
    rx.recv_timeout(Duration::from_secs(5)).expect("descendant unblocked");
    worker.join().unwrap();
}

#[test]
fn rename_takes_both_pairs_and_the_shared_parent_once() {
    let locks = PathLocks::new();
    let guard = locks.lock_rename("a/old", "a/new");
    assert_eq!(keys(&guard), ["a", "a/new", "a/old"]);
    drop(guard);
    assert_eq!(locks.entry_count(), 0);
}

#[test]
fn cross_directory_moves_cover_both_chains() {
    let locks = PathLocks::new();
    let guard = locks.lock_rename("a/b/x", "c/y");
    assert_eq!(keys(&guard), ["a", "a/b", "a/b/x", "c", "c/y"]);
}

#[test]
fn disjoint_subtrees_do_not_contend() {
    let locks = Arc::new(PathLocks::new());
    let _left = locks.lock("a/x", OpClass::CreateOrDelete);

    let (tx, rx) = mpsc::channel();
    let locks2 = Arc::clone(&locks);
    std::thread::spawn(move || {
        let _right = locks2.lock("b/y", OpClass::CreateOrDelete);
        tx.send(()).unwrap();
    });
    rx.recv_timeout(Duration::from_secs(5)).expect("disjoint writer proceeded");
}
