#![cfg(test)]

use crate::ninep::messages::SetAttr;
use crate::ninep::{getattr, setattr, TimeSpec, S_IFDIR, S_IFREG};
use crate::nodes::OpenFlags;

use super::{root, IDENT};

#[tokio::test]
async fn path_ids_are_unique_across_the_tree() {
    let root = root();
    let a = root.mkdir("a", 0o755, IDENT).await.unwrap();
    let b = root.mkdir("b", 0o755, IDENT).await.unwrap();
    let c = a.mkdir("c", 0o755, IDENT).await.unwrap();
    let f = c.create("f", OpenFlags::new(0), 0o644, IDENT).await.unwrap();

    let mut paths: Vec<u64> =
        [&root, &a, &b, &c, &f].iter().map(|node| node.qid().path).collect();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), 5, "every node draws a distinct path id");
}

#[tokio::test]
async fn descendants_share_the_root_counter() {
    let root = root();
    let a = root.mkdir("a", 0o755, IDENT).await.unwrap();
    let before = root.meta().counter().load(std::sync::atomic::Ordering::Relaxed);
    let deep = a.mkdir("deep", 0o755, IDENT).await.unwrap();
    let after = root.meta().counter().load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(after, before + 1);
    assert_eq!(deep.qid().path, after);
}

#[test]
fn size_is_not_valid_for_directories() {
    let root = root();
    let (valid, _) = root.get_attr(getattr::ALL);
    assert_eq!(valid & getattr::SIZE, 0);
    assert_ne!(valid & getattr::MODE, 0);
}

#[tokio::test]
async fn set_then_get_round_trips_masked_fields() {
    let root = root();
    let file = root.create("f", OpenFlags::new(0), 0o644, IDENT).await.unwrap();

    let update = SetAttr {
        mode: 0o600,
        uid: 7,
        gid: 8,
        atime: TimeSpec { sec: 100, nsec: 1 },
        mtime: TimeSpec { sec: 200, nsec: 2 },
        ..Default::default()
    };
    let valid = setattr::MODE
        | setattr::UID
        | setattr::GID
        | setattr::ATIME
        | setattr::ATIME_SET
        | setattr::MTIME
        | setattr::MTIME_SET;
    file.set_attr(valid, &update).unwrap();

    let (_, stat) = file.get_attr(getattr::BASIC);
    assert_eq!(stat.mode & 0o7777, 0o600);
    assert_eq!(stat.mode & S_IFREG, S_IFREG, "type bits survive mode updates");
    assert_eq!(stat.uid, 7);
    assert_eq!(stat.gid, 8);
    assert_eq!(stat.atime, TimeSpec { sec: 100, nsec: 1 });
    assert_eq!(stat.mtime, TimeSpec { sec: 200, nsec: 2 });
}

#[tokio::test]
async fn server_time_is_substituted_without_the_set_flags() {
    let root = root();
    let file = root.create("f", OpenFlags::new(0), 0o644, IDENT).await.unwrap();
    let stale = SetAttr { atime: TimeSpec { sec: 1, nsec: 0 }, ..Default::default() };

    let before = TimeSpec::now().sec;
    file.set_attr(setattr::ATIME | setattr::CTIME, &stale).unwrap();
    let (_, stat) = file.get_attr(getattr::BASIC);

    assert!(stat.atime.sec >= before, "atime was taken from the wall clock");
    assert!(stat.ctime.sec >= before, "requested ctime always takes the wall clock");
}

#[test]
fn directory_mode_carries_the_type_bit() {
    let root = root();
    let (_, stat) = root.get_attr(getattr::BASIC);
    assert_eq!(stat.mode & S_IFDIR, S_IFDIR);
}
