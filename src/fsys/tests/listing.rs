#![cfg(test)]

use crate::fsys::client::LsLink;
use crate::fsys::ipfs::link_entry;
use crate::fsys::{EntryKind, FileInfo, FsDirEntry, FsFile, ListDir};

fn entries(n: usize) -> Vec<FsDirEntry> {
    (0..n).map(|i| FsDirEntry { name: format!("entry{i:02}"), info: None }).collect()
}

#[test]
fn read_dir_hands_out_batches_until_empty() {
    let mut dir = ListDir::new(FileInfo::synthetic_dir("."), entries(5));
    assert_eq!(dir.read_dir(2).unwrap().len(), 2);
    assert_eq!(dir.read_dir(2).unwrap().len(), 2);
    assert_eq!(dir.read_dir(2).unwrap().len(), 1);
    assert!(dir.read_dir(2).unwrap().is_empty(), "empty batch marks the end");
}

#[test]
fn plain_listings_do_not_stream() {
    let mut dir = ListDir::new(FileInfo::synthetic_dir("."), entries(1));
    assert!(dir.stream_dir().is_none());
}

#[test]
fn streaming_listings_deliver_the_remainder() {
    let mut dir = ListDir::streaming(FileInfo::synthetic_dir("."), entries(40));
    let consumed = dir.read_dir(10).unwrap();
    assert_eq!(consumed.len(), 10);

    let stream = dir.stream_dir().expect("streaming listing offers a channel");
    let rest: Vec<String> =
        stream.into_iter().map(|entry| entry.unwrap().name).collect();
    assert_eq!(rest.len(), 30);
    assert_eq!(rest.first().map(String::as_str), Some("entry10"));
}

#[test]
fn dropping_the_stream_cancels_the_producer() {
    let mut dir = ListDir::streaming(FileInfo::synthetic_dir("."), entries(1000));
    let stream = dir.stream_dir().unwrap();
    let first = stream.recv().unwrap().unwrap();
    assert_eq!(first.name, "entry00");
    drop(stream);
    // The producer notices the closed channel and exits; nothing to
    // observe beyond not hanging.
}

#[test]
fn unixfs_link_types_map_to_entry_kinds() {
    let link = |typ| LsLink { name: "x".to_string(), hash: "Qm".to_string(), size: 7, typ };
    assert_eq!(link_entry(link(1)).info.unwrap().kind, EntryKind::Directory);
    assert_eq!(link_entry(link(5)).info.unwrap().kind, EntryKind::Directory);
    assert_eq!(link_entry(link(4)).info.unwrap().kind, EntryKind::Symlink);
    assert_eq!(link_entry(link(2)).info.unwrap().kind, EntryKind::File);
    assert_eq!(link_entry(link(0)).info.unwrap().kind, EntryKind::File);
}
