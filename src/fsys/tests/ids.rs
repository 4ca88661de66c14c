#![cfg(test)]

use num_traits::FromPrimitive;

use crate::error::Kind;
use crate::fsys::FsId;

#[test]
fn names_round_trip() {
    for fsid in [FsId::Ipfs, FsId::Ipns, FsId::PinFs, FsId::KeyFs] {
        assert_eq!(fsid.to_string().parse::<FsId>().unwrap(), fsid);
    }
}

#[test]
fn unknown_names_are_invalid() {
    for bad in ["mfs", "IPFS", "", "fuse"] {
        assert_eq!(bad.parse::<FsId>().unwrap_err().kind(), Kind::InvalidItem, "{bad:?}");
    }
}

#[test]
fn rdev_matches_the_numeric_id() {
    assert_eq!(FsId::Ipfs.rdev(), 1);
    assert_eq!(FsId::Ipns.rdev(), 2);
    assert_eq!(FsId::PinFs.rdev(), 3);
    assert_eq!(FsId::KeyFs.rdev(), 4);
}

#[test]
fn numeric_ids_resolve_back() {
    assert_eq!(FsId::from_u32(2), Some(FsId::Ipns));
    assert_eq!(FsId::from_u32(9), None);
}
