#![cfg(test)]

use crate::fsys::client::{KeyInfo, LsLink, StatResponse};

#[test]
fn stat_bodies_decode() {
    let body = br#"{
        "Blocks": 2,
        "CumulativeSize": 1049,
        "Hash": "QmfDmsHjXCbiKBpNQNKWQjyFRKpbcr24g5rkD2U6yKNqfp",
        "Size": 1024,
        "Type": "file"
    }"#;
    let stat: StatResponse = serde_json::from_slice(body).unwrap();
    assert_eq!(stat.hash, "QmfDmsHjXCbiKBpNQNKWQjyFRKpbcr24g5rkD2U6yKNqfp");
    assert_eq!(stat.size, 1024);
    assert_eq!(stat.cumulative_size, 1049);
    assert_eq!(stat.typ, "file");
    assert_eq!(stat.blocks, 2);
}

#[test]
fn stat_bodies_tolerate_missing_optionals() {
    let body = br#"{"Hash": "Qm", "Size": 0, "Type": "directory"}"#;
    let stat: StatResponse = serde_json::from_slice(body).unwrap();
    assert_eq!(stat.typ, "directory");
    assert_eq!(stat.blocks, 0);
}

#[test]
fn directory_links_decode() {
    let body = br#"{
        "Name": "readme.md",
        "Hash": "QmPZ9gcCEpqKTo6aq61g2nXGUhM4iCL3ewB6LDXZCtioEB",
        "Size": 1717,
        "Type": 2,
        "Target": ""
    }"#;
    let link: LsLink = serde_json::from_slice(body).unwrap();
    assert_eq!(link.name, "readme.md");
    assert_eq!(link.size, 1717);
    assert_eq!(link.typ, 2);
}

#[test]
fn key_entries_decode() {
    let body = br#"{"Name": "self", "Id": "k51qzi5uqu5dkkciu33khkzbcmxtyhn376i1e83tya8kuy7z9euedzyr5nhoew"}"#;
    let key: KeyInfo = serde_json::from_slice(body).unwrap();
    assert_eq!(key.name, "self");
    assert!(key.id.starts_with("k51"));
}
