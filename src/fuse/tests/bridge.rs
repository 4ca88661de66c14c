#![cfg(test)]

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Error, Kind, Result};
use crate::fsys::{EntryKind, FileInfo, FileSystem, FsDirEntry, FsFile, ListDir};
use crate::fuse::{Bridge, Handle};

fn file_info(name: &str, size: u64) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size,
        kind: EntryKind::File,
        perm: 0o444,
        mtime: SystemTime::UNIX_EPOCH,
        atime: None,
        ctime: None,
        btime: None,
        uid: None,
        gid: None,
    }
}

/// A tiny in-memory filesystem: one directory level, optional streaming.
struct FakeFs {
    entries: Vec<FsDirEntry>,
    files: HashMap<String, Vec<u8>>,
    streaming: bool,
}

impl FakeFs {
    fn new(streaming: bool) -> FakeFs {
        let files: HashMap<String, Vec<u8>> = [
            ("alpha".to_string(), b"alpha content".to_vec()),
            ("beta".to_string(), b"beta!".to_vec()),
            ("gamma".to_string(), b"gamma?".to_vec()),
        ]
        .into();
        let entries = vec![
            // One entry carries info (readdir-plus), one does not.
            FsDirEntry { name: "alpha".to_string(), info: Some(file_info("alpha", 13)) },
            FsDirEntry { name: "beta".to_string(), info: None },
        ];
        FakeFs { entries, files, streaming }
    }
}

enum CloseBehavior {
    Clean,
    Fail,
    Panic,
}

struct FakeFile {
    info: FileInfo,
    content: Vec<u8>,
    on_close: CloseBehavior,
}

impl FsFile for FakeFile {
    fn info(&self) -> Result<FileInfo> {
        Ok(self.info.clone())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (offset as usize).min(self.content.len());
        let end = (start + buf.len()).min(self.content.len());
        buf[..end - start].copy_from_slice(&self.content[start..end]);
        Ok(end - start)
    }

    fn close(&mut self) -> Result<()> {
        match self.on_close {
            CloseBehavior::Clean => Ok(()),
            CloseBehavior::Fail => Err(Error::msg(Kind::Io, "close failed")),
            CloseBehavior::Panic => panic!("close blew up"),
        }
    }
}

impl FileSystem for FakeFs {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        if name == "." {
            return Ok(FileInfo::synthetic_dir("."));
        }
        match self.files.get(name) {
            Some(content) => Ok(file_info(name, content.len() as u64)),
            None => Err(Error::msg(Kind::NotExist, name)),
        }
    }

    fn open(&self, name: &str) -> Result<Box<dyn FsFile>> {
        if name == "." {
            let info = FileInfo::synthetic_dir(".");
            return Ok(Box::new(if self.streaming {
                ListDir::streaming(info, self.entries.clone())
            } else {
                ListDir::new(info, self.entries.clone())
            }));
        }
        let content = self
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| Error::msg(Kind::NotExist, name))?;
        let on_close = match name {
            "beta" => CloseBehavior::Fail,
            "gamma" => CloseBehavior::Panic,
            _ => CloseBehavior::Clean,
        };
        Ok(Box::new(FakeFile { info: file_info(name, content.len() as u64), content, on_close }))
    }
}

fn bridge(streaming: bool) -> Bridge {
    Bridge::new(
        Arc::new(FakeFs::new(streaming)),
        "m4rk3r".to_string(),
        1000,
        1000,
        crate::fuse::handles::HANDLE_MAX,
    )
}

#[test]
fn names_join_against_the_root_dot() {
    assert_eq!(Bridge::join_name(".", OsStr::new("a")).unwrap(), "a");
    assert_eq!(Bridge::join_name("a", OsStr::new("b")).unwrap(), "a/b");
    assert_eq!(Bridge::join_name("a/b", OsStr::new("c")).unwrap(), "a/b/c");
}

#[test]
fn malformed_names_are_invalid_items() {
    for bad in ["", "x/y"] {
        let err = Bridge::join_name(".", OsStr::new(bad)).unwrap_err();
        assert_eq!(err.kind(), Kind::InvalidItem, "{bad:?}");
    }
}

#[test]
fn batched_directories_fill_their_cache_in_order() {
    let bridge = bridge(false);
    let mut dir = bridge.open_dir_stream(".", 1, 2).unwrap();
    assert!(dir.fill_to(10), "ran to end without a stream error");
    let names: Vec<&str> = dir.cache.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, ["alpha", "beta"]);
    assert!(dir.file.is_none(), "the producer thread owns the handle");
}

#[test]
fn streaming_directories_use_the_native_stream() {
    let bridge = bridge(true);
    let mut dir = bridge.open_dir_stream(".", 1, 2).unwrap();
    assert!(dir.file.is_some(), "streamed handles stay with the consumer");
    assert!(dir.fill_to(10));
    assert_eq!(dir.cache.len(), 2);
}

#[test]
fn dir_stat_prefers_carried_info_and_inherits_identity() {
    let bridge = bridge(false);
    let mut dir = bridge.open_dir_stream(".", 42, 43).unwrap();
    dir.fill_to(10);

    let with_info = bridge.dir_stat(".", &dir.cache[0], dir.uid, dir.gid).unwrap();
    assert_eq!(with_info.size, 13);
    assert_eq!((with_info.uid, with_info.gid), (42, 43), "opendir identity inherited");

    let stat_fallback = bridge.dir_stat(".", &dir.cache[1], dir.uid, dir.gid).unwrap();
    assert_eq!(stat_fallback.size, 5, "entries without info fall back to stat");
}

#[test]
fn release_drops_the_slot_even_when_close_fails() {
    let bridge = bridge(false);
    let file = bridge.fs.open("beta").unwrap();
    let fh = bridge.handles.add(Handle::File(file)).unwrap();

    let err = bridge.release_handle(fh).unwrap_err();
    assert_eq!(err.kind(), Kind::Io, "the close error is propagated");
    assert_eq!(bridge.handles.get(fh).unwrap_err().kind(), Kind::Closed, "slot is gone");
}

#[test]
fn release_drops_the_slot_even_when_close_panics() {
    let bridge = bridge(false);
    let file = bridge.fs.open("gamma").unwrap();
    let fh = bridge.handles.add(Handle::File(file)).unwrap();

    let err = bridge.release_handle(fh).unwrap_err();
    assert_eq!(err.kind(), Kind::Io, "the panic is reported as an i/o failure");
    assert_eq!(bridge.handles.get(fh).unwrap_err().kind(), Kind::Closed, "slot is gone");
}

#[test]
fn marker_names_never_collide_with_content() {
    let bridge = bridge(false);
    assert!(bridge.fs.stat(&bridge.marker).is_err());
}
