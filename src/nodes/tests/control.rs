#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Kind, Result};
use crate::fsys::FsId;
use crate::nodes::{Attacher, Detach, FsidDir, MountData, NodeRef, OpenFlags};

use super::{root, IDENT};

const WRITE: u32 = crate::ninep::O_WRONLY;
const READ: u32 = crate::ninep::O_RDONLY;

/// Records every attach and counts detaches.
#[derive(Default)]
struct RecordingAttacher {
    attaches: Mutex<Vec<(FsId, MountData)>>,
    detaches: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Attacher for RecordingAttacher {
    async fn attach(&self, fsid: FsId, data: &MountData) -> Result<Detach> {
        if self.fail {
            return Err(Error::msg(Kind::Io, "refusing to mount"));
        }
        self.attaches.lock().push((fsid, data.clone()));
        let detaches = Arc::clone(&self.detaches);
        Ok(Box::new(move || {
            detaches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }
}

fn controller_fixture(fail: bool) -> (NodeRef, NodeRef, Arc<RecordingAttacher>) {
    let base = root();
    let attacher = Arc::new(RecordingAttacher { fail, ..Default::default() });
    let fsid_dir: NodeRef = FsidDir::new(&base, FsId::Ipfs, attacher.clone(), 0o755, IDENT);
    base.link("ipfs", fsid_dir.clone()).unwrap();
    (base, fsid_dir, attacher)
}

const DOC: &[u8] = br#"{"ApiMaddr":"/ip4/127.0.0.1/tcp/5001","Target":"/tmp/x"}"#;

#[tokio::test]
async fn close_commits_and_mounts_with_the_written_values() {
    let (_base, dir, attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    controller.open(OpenFlags::new(WRITE)).await.unwrap();
    controller.write_at(0, DOC).await.unwrap();
    controller.close(OpenFlags::new(WRITE)).await.unwrap();

    let attaches = attacher.attaches.lock();
    assert_eq!(attaches.len(), 1);
    let (fsid, data) = &attaches[0];
    assert_eq!(*fsid, FsId::Ipfs);
    assert_eq!(data.api_maddr, "/ip4/127.0.0.1/tcp/5001");
    assert_eq!(data.target, "/tmp/x");

    assert!(dir.child("test").is_ok(), "the controller file stays in place");
}

#[tokio::test]
async fn failed_mounts_unlink_the_controller_and_surface_io() {
    let (_base, dir, _attacher) = controller_fixture(true);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    controller.write_at(0, DOC).await.unwrap();
    let err = controller.close(OpenFlags::new(WRITE)).await.unwrap_err();
    assert_eq!(err.kind(), Kind::Io);
    assert_eq!(dir.child("test").unwrap_err().kind(), Kind::NotExist);
}

#[tokio::test]
async fn only_contiguous_writes_are_accepted() {
    let (_base, dir, _attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    // Two writers at the same offset model two fids over one controller:
    // whichever lands second no longer matches the staged length.
    controller.write_at(0, b"A").await.unwrap();
    let err = controller.write_at(0, b"B").await.unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidItem);

    controller.write_at(1, b"B").await.unwrap();
    assert_eq!(controller.meta().size(), 2);
}

#[tokio::test]
async fn reads_serve_the_committed_document_not_the_buffer() {
    let (_base, dir, _attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    controller.write_at(0, DOC).await.unwrap();
    controller.close(OpenFlags::new(WRITE)).await.unwrap();

    let expected = serde_json::to_vec(&MountData {
        api_maddr: "/ip4/127.0.0.1/tcp/5001".to_string(),
        target: "/tmp/x".to_string(),
    })
    .unwrap();

    let first = controller.read_at(0, 16).await.unwrap();
    let rest = controller.read_at(16, 4096).await.unwrap();
    let together = [first, rest].concat();
    assert_eq!(together, expected, "read-back equals the encoded mount data");
}

#[tokio::test]
async fn malformed_documents_are_rejected_and_the_file_stays() {
    let (_base, dir, _attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    controller.write_at(0, b"{not json").await.unwrap();
    let err = controller.close(OpenFlags::new(WRITE)).await.unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidItem);
    assert!(dir.child("test").is_ok());

    // The buffer was consumed; an empty close is a no-op again.
    controller.close(OpenFlags::new(WRITE)).await.unwrap();
}

#[tokio::test]
async fn unlink_detaches_exactly_once() {
    let (_base, dir, attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    controller.write_at(0, DOC).await.unwrap();
    controller.close(OpenFlags::new(WRITE)).await.unwrap();

    dir.unlink_at("test", 0).await.unwrap();
    assert_eq!(attacher.detaches.load(Ordering::SeqCst), 1);

    assert_eq!(dir.unlink_at("test", 0).await.unwrap_err().kind(), Kind::NotExist);
    assert_eq!(attacher.detaches.load(Ordering::SeqCst), 1, "unmount never doubles");
}

#[tokio::test]
async fn recommitting_detaches_the_previous_mount_first() {
    let (_base, dir, attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(WRITE), 0o644, IDENT).await.unwrap();

    controller.write_at(0, DOC).await.unwrap();
    controller.close(OpenFlags::new(WRITE)).await.unwrap();

    controller.open(OpenFlags::new(WRITE | crate::ninep::O_TRUNC)).await.unwrap();
    controller.write_at(0, DOC).await.unwrap();
    controller.close(OpenFlags::new(WRITE)).await.unwrap();

    assert_eq!(attacher.attaches.lock().len(), 2);
    assert_eq!(attacher.detaches.load(Ordering::SeqCst), 1);

    dir.unlink_at("test", 0).await.unwrap();
    assert_eq!(attacher.detaches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_close_does_not_mount() {
    let (_base, dir, attacher) = controller_fixture(false);
    let controller =
        dir.create("test", OpenFlags::new(READ), 0o644, IDENT).await.unwrap();
    controller.close(OpenFlags::new(READ)).await.unwrap();
    assert!(attacher.attaches.lock().is_empty());
}
