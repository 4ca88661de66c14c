#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Kind, Result};
use crate::fsys::FsId;
use crate::ninep::{getattr, AT_REMOVEDIR};
use crate::nodes::{
    Attacher, Detach, EphemeralDir, MountData, Mounter, Node, NodeRef, OpenFlags,
};

use super::{root, IDENT};

struct NullAttacher;

#[async_trait]
impl Attacher for NullAttacher {
    async fn attach(&self, _fsid: FsId, _data: &MountData) -> Result<Detach> {
        Ok(Box::new(|| Ok(())))
    }
}

fn mounter(parent: &NodeRef) -> NodeRef {
    Mounter::new(parent, Arc::new(NullAttacher), IDENT)
}

#[tokio::test]
async fn mounts_only_accepts_known_host_apis() {
    let base = root();
    let mounts = mounter(&base);
    assert_eq!(mounts.mkdir("nfs", 0o755, IDENT).await.unwrap_err().kind(), Kind::InvalidItem);
    let fuse = mounts.mkdir("fuse", 0o755, IDENT).await.unwrap();
    assert!(fuse.qid().is_dir());
}

#[tokio::test]
async fn fsid_directories_carry_their_id_as_rdev() {
    let base = root();
    let mounts = mounter(&base);
    let fuse = mounts.mkdir("fuse", 0o755, IDENT).await.unwrap();

    for (name, fsid) in
        [("ipfs", FsId::Ipfs), ("ipns", FsId::Ipns), ("pinfs", FsId::PinFs), ("keyfs", FsId::KeyFs)]
    {
        let dir = fuse.mkdir(name, 0o755, IDENT).await.unwrap();
        let (valid, stat) = dir.get_attr(getattr::ALL);
        assert_ne!(valid & getattr::RDEV, 0);
        assert_eq!(stat.rdev, fsid.rdev(), "{name}");
    }

    assert_eq!(fuse.mkdir("mfs", 0o755, IDENT).await.unwrap_err().kind(), Kind::InvalidItem);
}

#[tokio::test]
async fn fsid_directories_allocate_controllers() {
    let base = root();
    let mounts = mounter(&base);
    let fuse = mounts.mkdir("fuse", 0o755, IDENT).await.unwrap();
    let ipfs = fuse.mkdir("ipfs", 0o755, IDENT).await.unwrap();

    let controller = ipfs.create("docs", OpenFlags::new(0), 0o644, IDENT).await.unwrap();
    assert!(!controller.qid().is_dir());
    assert_eq!(ipfs.child("docs").unwrap().qid(), controller.qid());

    // mknod is the second allocation path and shares the name table.
    assert_eq!(ipfs.mknod("docs", 0o644, IDENT).await.unwrap_err().kind(), Kind::Exist);
    let other = ipfs.mknod("media", 0o644, IDENT).await.unwrap();
    assert!(!other.qid().is_dir());
}

#[tokio::test]
async fn group_and_other_write_bits_are_stripped() {
    let base = root();
    let dir = base.mkdir("d", 0o777, IDENT).await.unwrap();
    let (_, stat) = dir.get_attr(getattr::BASIC);
    assert_eq!(stat.mode & 0o777, 0o755);
}

#[tokio::test]
async fn emptied_ephemeral_directories_collapse_upward() {
    let base = root();
    let ip4 = EphemeralDir::new(&base, "ip4", 0o755, IDENT);
    base.link("ip4", ip4.clone()).unwrap();
    let host: NodeRef = ip4.mkdir("127.0.0.1", 0o755, IDENT).await.unwrap();
    let tcp: NodeRef = host.mkdir("tcp", 0o755, IDENT).await.unwrap();
    tcp.create("564", OpenFlags::new(0), 0o444, IDENT).await.unwrap_err();

    // Ephemeral directories take links, not creates; insert a leaf file.
    let leaf = crate::nodes::RegularFile::new(
        tcp.meta().counter(),
        Arc::downgrade(&tcp),
        0o444,
        IDENT,
    );
    tcp.link("564", leaf).unwrap();

    tcp.unlink_at("564", 0).await.unwrap();
    assert_eq!(base.child("ip4").unwrap_err().kind(), Kind::NotExist, "chain collapsed");
}

#[tokio::test]
async fn populated_ephemeral_directories_stay() {
    let base = root();
    let dir = EphemeralDir::new(&base, "e", 0o755, IDENT);
    base.link("e", dir.clone()).unwrap();
    dir.mkdir("one", 0o755, IDENT).await.unwrap();
    dir.mkdir("two", 0o755, IDENT).await.unwrap();

    dir.unlink_at("one", AT_REMOVEDIR).await.unwrap();
    assert!(base.child("e").is_ok(), "a non-empty directory never collapses");

    dir.unlink_at("two", AT_REMOVEDIR).await.unwrap();
    assert_eq!(base.child("e").unwrap_err().kind(), Kind::NotExist);
}

#[tokio::test]
async fn remove_style_reverse_lookup_finds_names() {
    let base = root();
    let child = base.mkdir("sub", 0o755, IDENT).await.unwrap();
    assert_eq!(base.name_of(&child), Some("sub".to_string()));
    let stranger = root();
    assert_eq!(base.name_of(&stranger), None);
}
