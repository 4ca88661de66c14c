#![cfg(test)]

use std::io::Cursor;

use crate::error::Kind;
use crate::ninep::messages::{Rmessage, Stat, Tmessage};
use crate::ninep::{
    parser, serializer, Dirent, MsgType, Qid, TimeSpec, HEADERSZ, QTDIR, QTFILE,
};

const MAX_PAYLOAD: usize = 128 * 1024;

/// Strips the `size[4]` prefix and parses the rest as a request body.
fn parse_t(frame: &[u8]) -> (u16, Tmessage) {
    let mut src = Cursor::new(&frame[4..]);
    parser::t_message(&mut src, MAX_PAYLOAD).expect("request should parse")
}

fn parse_r(frame: &[u8]) -> (u16, Rmessage) {
    let mut src = Cursor::new(&frame[4..]);
    parser::r_message(&mut src, MAX_PAYLOAD).expect("response should parse")
}

#[test]
fn frame_header_carries_size_type_tag() {
    let frame = serializer::t_message(7, &Tmessage::Clunk { fid: 3 });
    assert_eq!(frame.len(), HEADERSZ + 4);
    assert_eq!(u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]), frame.len() as u32);
    assert_eq!(frame[4], MsgType::Tclunk as u8);
    assert_eq!(u16::from_le_bytes([frame[5], frame[6]]), 7);
}

#[test]
fn version_negotiation_round_trip() {
    let frame = serializer::t_message(
        u16::MAX,
        &Tmessage::Version { msize: 8192, version: "9P2000.L".to_string() },
    );
    let (tag, msg) = parse_t(&frame);
    assert_eq!(tag, u16::MAX);
    assert_eq!(msg, Tmessage::Version { msize: 8192, version: "9P2000.L".to_string() });
}

#[test]
fn walk_names_round_trip() {
    let wnames = vec!["mounts".to_string(), "fuse".to_string(), "ipfs".to_string()];
    let frame = serializer::t_message(1, &Tmessage::Walk { fid: 0, newfid: 1, wnames: wnames.clone() });
    match parse_t(&frame).1 {
        Tmessage::Walk { fid: 0, newfid: 1, wnames: parsed } => assert_eq!(parsed, wnames),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn write_payload_round_trip() {
    let data = br#"{"ApiMaddr":"/ip4/127.0.0.1/tcp/5001","Target":"/tmp/x"}"#.to_vec();
    let frame = serializer::t_message(2, &Tmessage::Write { fid: 4, offset: 0, data: data.clone() });
    match parse_t(&frame).1 {
        Tmessage::Write { fid: 4, offset: 0, data: parsed } => assert_eq!(parsed, data),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn write_payload_over_limit_is_rejected() {
    let frame = serializer::t_message(2, &Tmessage::Write { fid: 4, offset: 0, data: vec![0; 64] });
    let mut src = Cursor::new(&frame[4..]);
    let err = parser::t_message(&mut src, 32).unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidItem);
}

#[test]
fn truncated_body_is_invalid() {
    let frame = serializer::t_message(9, &Tmessage::GetAttr { fid: 1, request_mask: 0x7ff });
    let mut src = Cursor::new(&frame[4..frame.len() - 2]);
    let err = parser::t_message(&mut src, MAX_PAYLOAD).unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidItem);
}

#[test]
fn unknown_type_is_invalid() {
    let mut src = Cursor::new(vec![0xee, 0x01, 0x00]);
    let err = parser::t_message(&mut src, MAX_PAYLOAD).unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidItem);
}

#[test]
fn getattr_response_round_trip() {
    let stat = Stat {
        mode: 0o040755,
        uid: 1000,
        gid: 1000,
        nlink: 1,
        size: 4096,
        atime: TimeSpec { sec: 10, nsec: 20 },
        mtime: TimeSpec { sec: 30, nsec: 40 },
        ctime: TimeSpec { sec: 50, nsec: 60 },
        ..Default::default()
    };
    let qid = Qid { typ: QTDIR, version: 0, path: 42 };
    let frame = serializer::r_message(3, &Rmessage::GetAttr { valid: 0x7ff, qid, stat });
    let (tag, msg) = parse_r(&frame);
    assert_eq!(tag, 3);
    match msg {
        Rmessage::GetAttr { valid, qid: parsed_qid, stat: parsed } => {
            assert_eq!(valid, 0x7ff);
            assert_eq!(parsed_qid, qid);
            assert_eq!(parsed, stat);
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn readdir_entries_round_trip() {
    let entries = vec![
        Dirent {
            qid: Qid { typ: QTFILE, version: 0, path: 5 },
            offset: 1,
            typ: crate::ninep::DT_REG,
            name: "a".to_string(),
        },
        Dirent {
            qid: Qid { typ: QTDIR, version: 0, path: 6 },
            offset: 2,
            typ: crate::ninep::DT_DIR,
            name: "b".to_string(),
        },
    ];
    let frame = serializer::r_message(4, &Rmessage::ReadDir { entries: entries.clone() });
    match parse_r(&frame).1 {
        Rmessage::ReadDir { entries: parsed } => assert_eq!(parsed, entries),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn dirent_wire_size_matches_serialized_length() {
    let entry = Dirent {
        qid: Qid { typ: QTFILE, version: 0, path: 9 },
        offset: 7,
        typ: crate::ninep::DT_REG,
        name: "endpoint".to_string(),
    };
    let mut buf = Vec::new();
    serializer::dirent(&mut buf, &entry).unwrap();
    assert_eq!(buf.len(), entry.wire_size());
}
