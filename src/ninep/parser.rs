//! Frame-body parsing for both message directions.
//!
//! Callers hand in one complete frame body (everything after the leading
//! `size[4]`); the functions here pull the type byte and tag and decode the
//! typed message. Primitive readers operate on any `Read` source so tests
//! can drive them from byte cursors.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use num_traits::FromPrimitive;

use crate::error::{Error, Kind, Result};

use super::messages::{Flock, GetFlock, SetAttr, Tmessage};
use super::{MsgType, Qid, TimeSpec};

/// Longest string the parser will accept, a protocol sanity bound.
const MAX_STRING_LEN: usize = 4096;

pub fn u8(src: &mut impl Read) -> Result<u8> {
    src.read_u8().map_err(eof)
}

pub fn u16(src: &mut impl Read) -> Result<u16> {
    src.read_u16::<LittleEndian>().map_err(eof)
}

pub fn u32(src: &mut impl Read) -> Result<u32> {
    src.read_u32::<LittleEndian>().map_err(eof)
}

pub fn u64(src: &mut impl Read) -> Result<u64> {
    src.read_u64::<LittleEndian>().map_err(eof)
}

/// Parses a length-prefixed UTF-8 string (`len[2] bytes`).
pub fn string(src: &mut impl Read) -> Result<String> {
    let len = u16(src)? as usize;
    if len > MAX_STRING_LEN {
        return Err(Error::msg(Kind::InvalidItem, format!("string length {len} exceeds limit")));
    }
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf).map_err(eof)?;
    String::from_utf8(buf).map_err(|e| Error::wrap(Kind::InvalidItem, "string is not utf-8", e))
}

/// Parses a length-prefixed byte payload (`count[4] bytes`).
pub fn bytes(src: &mut impl Read, max: usize) -> Result<Vec<u8>> {
    let len = u32(src)? as usize;
    if len > max {
        return Err(Error::msg(Kind::InvalidItem, format!("payload of {len} bytes exceeds limit")));
    }
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf).map_err(eof)?;
    Ok(buf)
}

pub fn qid(src: &mut impl Read) -> Result<Qid> {
    Ok(Qid { typ: u8(src)?, version: u32(src)?, path: u64(src)? })
}

pub fn time_spec(src: &mut impl Read) -> Result<TimeSpec> {
    Ok(TimeSpec { sec: u64(src)?, nsec: u64(src)? })
}

fn flock(src: &mut impl Read) -> Result<Flock> {
    Ok(Flock {
        typ: u8(src)?,
        flags: u32(src)?,
        start: u64(src)?,
        length: u64(src)?,
        proc_id: u32(src)?,
        client_id: string(src)?,
    })
}

fn get_flock(src: &mut impl Read) -> Result<GetFlock> {
    Ok(GetFlock {
        typ: u8(src)?,
        start: u64(src)?,
        length: u64(src)?,
        proc_id: u32(src)?,
        client_id: string(src)?,
    })
}

fn set_attr(src: &mut impl Read) -> Result<SetAttr> {
    Ok(SetAttr {
        mode: u32(src)?,
        uid: u32(src)?,
        gid: u32(src)?,
        size: u64(src)?,
        atime: time_spec(src)?,
        mtime: time_spec(src)?,
    })
}

/// Parses a request frame body: `type[1] tag[2] message`.
pub fn t_message(src: &mut impl Read, max_payload: usize) -> Result<(u16, Tmessage)> {
    let typ = u8(src)?;
    let tag = u16(src)?;
    let msg_type = MsgType::from_u8(typ)
        .ok_or_else(|| Error::msg(Kind::InvalidItem, format!("unknown message type {typ}")))?;

    let body = match msg_type {
        MsgType::Tversion => Tmessage::Version { msize: u32(src)?, version: string(src)? },
        MsgType::Tauth => Tmessage::Auth {
            afid: u32(src)?,
            uname: string(src)?,
            aname: string(src)?,
            n_uname: u32(src)?,
        },
        MsgType::Tattach => Tmessage::Attach {
            fid: u32(src)?,
            afid: u32(src)?,
            uname: string(src)?,
            aname: string(src)?,
            n_uname: u32(src)?,
        },
        MsgType::Tflush => Tmessage::Flush { oldtag: u16(src)? },
        MsgType::Twalk => {
            let fid = u32(src)?;
            let newfid = u32(src)?;
            let count = u16(src)? as usize;
            let mut wnames = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                wnames.push(string(src)?);
            }
            Tmessage::Walk { fid, newfid, wnames }
        }
        MsgType::Tlopen => Tmessage::Open { fid: u32(src)?, flags: u32(src)? },
        MsgType::Tlcreate => Tmessage::Create {
            fid: u32(src)?,
            name: string(src)?,
            flags: u32(src)?,
            mode: u32(src)?,
            gid: u32(src)?,
        },
        MsgType::Tsymlink => Tmessage::Symlink {
            fid: u32(src)?,
            name: string(src)?,
            symtgt: string(src)?,
            gid: u32(src)?,
        },
        MsgType::Tmknod => Tmessage::Mknod {
            dfid: u32(src)?,
            name: string(src)?,
            mode: u32(src)?,
            major: u32(src)?,
            minor: u32(src)?,
            gid: u32(src)?,
        },
        MsgType::Trename => {
            Tmessage::Rename { fid: u32(src)?, dfid: u32(src)?, name: string(src)? }
        }
        MsgType::Treadlink => Tmessage::Readlink { fid: u32(src)? },
        MsgType::Tgetattr => Tmessage::GetAttr { fid: u32(src)?, request_mask: u64(src)? },
        MsgType::Tsetattr => {
            Tmessage::SetAttr { fid: u32(src)?, valid: u32(src)?, attr: set_attr(src)? }
        }
        MsgType::Txattrwalk => {
            Tmessage::XattrWalk { fid: u32(src)?, newfid: u32(src)?, name: string(src)? }
        }
        MsgType::Txattrcreate => Tmessage::XattrCreate {
            fid: u32(src)?,
            name: string(src)?,
            attr_size: u64(src)?,
            flags: u32(src)?,
        },
        MsgType::Treaddir => {
            Tmessage::ReadDir { fid: u32(src)?, offset: u64(src)?, count: u32(src)? }
        }
        MsgType::Tfsync => Tmessage::Fsync { fid: u32(src)?, datasync: u32(src)? },
        MsgType::Tlock => Tmessage::Lock { fid: u32(src)?, lock: flock(src)? },
        MsgType::Tgetlock => Tmessage::GetLock { fid: u32(src)?, lock: get_flock(src)? },
        MsgType::Tlink => Tmessage::Link { dfid: u32(src)?, fid: u32(src)?, name: string(src)? },
        MsgType::Tmkdir => Tmessage::Mkdir {
            dfid: u32(src)?,
            name: string(src)?,
            mode: u32(src)?,
            gid: u32(src)?,
        },
        MsgType::Trenameat => Tmessage::RenameAt {
            olddirfid: u32(src)?,
            oldname: string(src)?,
            newdirfid: u32(src)?,
            newname: string(src)?,
        },
        MsgType::Tunlinkat => {
            Tmessage::UnlinkAt { dirfd: u32(src)?, name: string(src)?, flags: u32(src)? }
        }
        MsgType::Tstatfs => Tmessage::StatFs { fid: u32(src)? },
        MsgType::Tread => Tmessage::Read { fid: u32(src)?, offset: u64(src)?, count: u32(src)? },
        MsgType::Twrite => {
            let fid = u32(src)?;
            let offset = u64(src)?;
            let data = bytes(src, max_payload)?;
            Tmessage::Write { fid, offset, data }
        }
        MsgType::Tclunk => Tmessage::Clunk { fid: u32(src)? },
        MsgType::Tremove => Tmessage::Remove { fid: u32(src)? },
        other => {
            return Err(Error::msg(
                Kind::InvalidItem,
                format!("{other:?} is not a request message"),
            ))
        }
    };

    Ok((tag, body))
}

/// Parses a response frame body. The server never consumes responses; this
/// direction exists for client-side use and the integration tests.
pub fn r_message(src: &mut impl Read, max_payload: usize) -> Result<(u16, super::messages::Rmessage)> {
    use super::messages::Rmessage;

    let typ = u8(src)?;
    let tag = u16(src)?;
    let msg_type = MsgType::from_u8(typ)
        .ok_or_else(|| Error::msg(Kind::InvalidItem, format!("unknown message type {typ}")))?;

    let body = match msg_type {
        MsgType::Rlerror => Rmessage::LError { ecode: u32(src)? },
        MsgType::Rversion => Rmessage::Version { msize: u32(src)?, version: string(src)? },
        MsgType::Rauth => Rmessage::Auth { aqid: qid(src)? },
        MsgType::Rattach => Rmessage::Attach { qid: qid(src)? },
        MsgType::Rflush => Rmessage::Flush,
        MsgType::Rwalk => {
            let count = u16(src)? as usize;
            let mut wqids = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                wqids.push(qid(src)?);
            }
            Rmessage::Walk { wqids }
        }
        MsgType::Rlopen => Rmessage::Open { qid: qid(src)?, iounit: u32(src)? },
        MsgType::Rlcreate => Rmessage::Create { qid: qid(src)?, iounit: u32(src)? },
        MsgType::Rsymlink => Rmessage::Symlink { qid: qid(src)? },
        MsgType::Rmknod => Rmessage::Mknod { qid: qid(src)? },
        MsgType::Rrename => Rmessage::Rename,
        MsgType::Rreadlink => Rmessage::Readlink { target: string(src)? },
        MsgType::Rgetattr => {
            let valid = u64(src)?;
            let qid = qid(src)?;
            let mut stat = super::messages::Stat {
                mode: u32(src)?,
                uid: u32(src)?,
                gid: u32(src)?,
                nlink: u64(src)?,
                rdev: u64(src)?,
                size: u64(src)?,
                blksize: u64(src)?,
                blocks: u64(src)?,
                atime: time_spec(src)?,
                mtime: time_spec(src)?,
                ctime: time_spec(src)?,
                btime: time_spec(src)?,
                ..Default::default()
            };
            stat.gen = u64(src)?;
            stat.data_version = u64(src)?;
            Rmessage::GetAttr { valid, qid, stat }
        }
        MsgType::Rsetattr => Rmessage::SetAttr,
        MsgType::Rxattrwalk => Rmessage::XattrWalk { size: u64(src)? },
        MsgType::Rxattrcreate => Rmessage::XattrCreate,
        MsgType::Rreaddir => {
            let mut payload = std::io::Cursor::new(bytes(src, max_payload)?);
            let total = payload.get_ref().len() as u64;
            let mut entries = Vec::new();
            while payload.position() < total {
                let qid = qid(&mut payload)?;
                let offset = u64(&mut payload)?;
                let typ = u8(&mut payload)?;
                let name = string(&mut payload)?;
                entries.push(super::Dirent { qid, offset, typ, name });
            }
            Rmessage::ReadDir { entries }
        }
        MsgType::Rfsync => Rmessage::Fsync,
        MsgType::Rlock => Rmessage::Lock { status: u8(src)? },
        MsgType::Rgetlock => Rmessage::GetLock { lock: get_flock(src)? },
        MsgType::Rlink => Rmessage::Link,
        MsgType::Rmkdir => Rmessage::Mkdir { qid: qid(src)? },
        MsgType::Rrenameat => Rmessage::RenameAt,
        MsgType::Runlinkat => Rmessage::UnlinkAt,
        MsgType::Rstatfs => Rmessage::StatFs {
            stat: super::messages::StatFs {
                typ: u32(src)?,
                bsize: u32(src)?,
                blocks: u64(src)?,
                bfree: u64(src)?,
                bavail: u64(src)?,
                files: u64(src)?,
                ffree: u64(src)?,
                fsid: u64(src)?,
                namelen: u32(src)?,
            },
        },
        MsgType::Rread => Rmessage::Read { data: bytes(src, max_payload)? },
        MsgType::Rwrite => Rmessage::Write { count: u32(src)? },
        MsgType::Rclunk => Rmessage::Clunk,
        MsgType::Rremove => Rmessage::Remove,
        other => {
            return Err(Error::msg(
                Kind::InvalidItem,
                format!("{other:?} is not a response message"),
            ))
        }
    };

    Ok((tag, body))
}

fn eof(err: std::io::Error) -> Error {
    Error::wrap(Kind::InvalidItem, "truncated message", err)
}
