#![cfg(test)]

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};

use crate::error::Kind;
use crate::ninep::AT_REMOVEDIR;
use crate::nodes::{Directory, FileTable, Node, NodeRef, RegularFile};

use super::{root, IDENT};

fn file() -> NodeRef {
    let orphan: Weak<dyn Node> = Weak::<Directory>::new();
    RegularFile::new(Arc::new(AtomicU64::new(0)), orphan, 0o644, IDENT)
}

#[test]
fn link_is_exclusive() {
    let table = FileTable::new();
    table.link("x", file()).unwrap();
    let err = table.link("x", file()).unwrap_err();
    assert_eq!(err.kind(), Kind::Exist);
}

#[test]
fn concurrent_links_have_exactly_one_winner() {
    let table = Arc::new(FileTable::new());
    let mut workers = Vec::new();
    for _ in 0..8 {
        let table = Arc::clone(&table);
        workers.push(std::thread::spawn(move || table.link("x", file()).is_ok()));
    }
    let wins: usize =
        workers.into_iter().map(|worker| worker.join().unwrap() as usize).sum();
    assert_eq!(wins, 1);
    assert_eq!(table.len(), 1);
}

#[test]
fn dot_names_are_rejected() {
    let table = FileTable::new();
    for bad in [".", "..", "", "a/b"] {
        assert_eq!(table.link(bad, file()).unwrap_err().kind(), Kind::InvalidItem, "{bad:?}");
    }
}

#[test]
fn delete_missing_is_not_exist() {
    let table = FileTable::new();
    assert_eq!(table.delete("x", 0).unwrap_err().kind(), Kind::NotExist);
}

#[tokio::test]
async fn delete_checks_flags_against_node_type() {
    let parent = root();
    let dir = parent.mkdir("d", 0o755, IDENT).await.unwrap();
    dir.mkdir("inner", 0o755, IDENT).await.unwrap();

    let table = FileTable::new();
    table.link("d", dir.clone()).unwrap();
    table.link("f", file()).unwrap();

    assert_eq!(table.delete("d", 0).unwrap_err().kind(), Kind::IsDir);
    assert_eq!(table.delete("f", AT_REMOVEDIR).unwrap_err().kind(), Kind::NotDir);
    assert_eq!(table.delete("d", AT_REMOVEDIR).unwrap_err().kind(), Kind::NotEmpty);

    dir.unlink_at("inner", AT_REMOVEDIR).await.unwrap();
    let (_, now_empty) = table.delete("d", AT_REMOVEDIR).unwrap();
    assert!(!now_empty, "f is still present");
}

#[test]
fn read_dir_is_sorted_with_one_based_offsets() {
    let table = FileTable::new();
    for name in ["b", "a", "c"] {
        table.link(name, file()).unwrap();
    }
    let listed: Vec<(String, u64)> =
        table.read_dir(0, usize::MAX).into_iter().map(|e| (e.name, e.offset)).collect();
    assert_eq!(
        listed,
        vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)]
    );
}

#[test]
fn read_dir_resumes_from_the_last_offset() {
    let table = FileTable::new();
    for name in ["d", "b", "a", "c"] {
        table.link(name, file()).unwrap();
    }

    let head = table.read_dir(0, 2);
    assert_eq!(head.len(), 2);
    let tail = table.read_dir(head.last().unwrap().offset, usize::MAX);

    let mut names: Vec<String> =
        head.into_iter().chain(tail).map(|entry| entry.name).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"], "no duplicates, nothing missing");
    names.dedup();
    assert_eq!(names.len(), 4);
}
