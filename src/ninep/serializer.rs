//! Frame serialization for both message directions.
//!
//! Each function emits a complete frame, `size[4] type[1] tag[2] body`,
//! into a byte vector; the stream writer task copies frames to the socket
//! verbatim.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::messages::{Flock, GetFlock, Rmessage, SetAttr, Stat, StatFs, Tmessage};
use super::{Dirent, MsgType, Qid, TimeSpec};

pub fn u8(dest: &mut impl Write, n: u8) -> io::Result<()> {
    dest.write_u8(n)
}

pub fn u16(dest: &mut impl Write, n: u16) -> io::Result<()> {
    dest.write_u16::<LittleEndian>(n)
}

pub fn u32(dest: &mut impl Write, n: u32) -> io::Result<()> {
    dest.write_u32::<LittleEndian>(n)
}

pub fn u64(dest: &mut impl Write, n: u64) -> io::Result<()> {
    dest.write_u64::<LittleEndian>(n)
}

pub fn string(dest: &mut impl Write, s: &str) -> io::Result<()> {
    u16(dest, s.len() as u16)?;
    dest.write_all(s.as_bytes())
}

pub fn bytes(dest: &mut impl Write, b: &[u8]) -> io::Result<()> {
    u32(dest, b.len() as u32)?;
    dest.write_all(b)
}

pub fn qid(dest: &mut impl Write, q: &Qid) -> io::Result<()> {
    u8(dest, q.typ)?;
    u32(dest, q.version)?;
    u64(dest, q.path)
}

pub fn time_spec(dest: &mut impl Write, t: &TimeSpec) -> io::Result<()> {
    u64(dest, t.sec)?;
    u64(dest, t.nsec)
}

pub fn dirent(dest: &mut impl Write, entry: &Dirent) -> io::Result<()> {
    qid(dest, &entry.qid)?;
    u64(dest, entry.offset)?;
    u8(dest, entry.typ)?;
    string(dest, &entry.name)
}

fn flock(dest: &mut impl Write, lock: &Flock) -> io::Result<()> {
    u8(dest, lock.typ)?;
    u32(dest, lock.flags)?;
    u64(dest, lock.start)?;
    u64(dest, lock.length)?;
    u32(dest, lock.proc_id)?;
    string(dest, &lock.client_id)
}

fn get_flock(dest: &mut impl Write, lock: &GetFlock) -> io::Result<()> {
    u8(dest, lock.typ)?;
    u64(dest, lock.start)?;
    u64(dest, lock.length)?;
    u32(dest, lock.proc_id)?;
    string(dest, &lock.client_id)
}

fn stat(dest: &mut impl Write, s: &Stat) -> io::Result<()> {
    u32(dest, s.mode)?;
    u32(dest, s.uid)?;
    u32(dest, s.gid)?;
    u64(dest, s.nlink)?;
    u64(dest, s.rdev)?;
    u64(dest, s.size)?;
    u64(dest, s.blksize)?;
    u64(dest, s.blocks)?;
    time_spec(dest, &s.atime)?;
    time_spec(dest, &s.mtime)?;
    time_spec(dest, &s.ctime)?;
    time_spec(dest, &s.btime)?;
    u64(dest, s.gen)?;
    u64(dest, s.data_version)
}

fn set_attr(dest: &mut impl Write, s: &SetAttr) -> io::Result<()> {
    u32(dest, s.mode)?;
    u32(dest, s.uid)?;
    u32(dest, s.gid)?;
    u64(dest, s.size)?;
    time_spec(dest, &s.atime)?;
    time_spec(dest, &s.mtime)
}

fn stat_fs(dest: &mut impl Write, s: &StatFs) -> io::Result<()> {
    u32(dest, s.typ)?;
    u32(dest, s.bsize)?;
    u64(dest, s.blocks)?;
    u64(dest, s.bfree)?;
    u64(dest, s.bavail)?;
    u64(dest, s.files)?;
    u64(dest, s.ffree)?;
    u64(dest, s.fsid)?;
    u32(dest, s.namelen)
}

/// Wraps a serialized body in the frame header.
fn frame(msg_type: MsgType, tag: u16, body: Vec<u8>) -> Vec<u8> {
    let size = super::HEADERSZ + body.len();
    let mut out = Vec::with_capacity(size);
    // Frame writes into a Vec cannot fail; unwrap-free via expect would
    // still be unreachable, so errors are ignored by construction.
    let _ = u32(&mut out, size as u32);
    let _ = u8(&mut out, msg_type as u8);
    let _ = u16(&mut out, tag);
    out.extend_from_slice(&body);
    out
}

/// Serializes one response frame.
pub fn r_message(tag: u16, msg: &Rmessage) -> Vec<u8> {
    let mut body = Vec::new();
    let msg_type = match msg {
        Rmessage::LError { ecode } => {
            let _ = u32(&mut body, *ecode);
            MsgType::Rlerror
        }
        Rmessage::Version { msize, version } => {
            let _ = u32(&mut body, *msize);
            let _ = string(&mut body, version);
            MsgType::Rversion
        }
        Rmessage::Auth { aqid } => {
            let _ = qid(&mut body, aqid);
            MsgType::Rauth
        }
        Rmessage::Attach { qid: q } => {
            let _ = qid(&mut body, q);
            MsgType::Rattach
        }
        Rmessage::Flush => MsgType::Rflush,
        Rmessage::Walk { wqids } => {
            let _ = u16(&mut body, wqids.len() as u16);
            for q in wqids {
                let _ = qid(&mut body, q);
            }
            MsgType::Rwalk
        }
        Rmessage::Open { qid: q, iounit } => {
            let _ = qid(&mut body, q);
            let _ = u32(&mut body, *iounit);
            MsgType::Rlopen
        }
        Rmessage::Create { qid: q, iounit } => {
            let _ = qid(&mut body, q);
            let _ = u32(&mut body, *iounit);
            MsgType::Rlcreate
        }
        Rmessage::Symlink { qid: q } => {
            let _ = qid(&mut body, q);
            MsgType::Rsymlink
        }
        Rmessage::Mknod { qid: q } => {
            let _ = qid(&mut body, q);
            MsgType::Rmknod
        }
        Rmessage::Rename => MsgType::Rrename,
        Rmessage::Readlink { target } => {
            let _ = string(&mut body, target);
            MsgType::Rreadlink
        }
        Rmessage::GetAttr { valid, qid: q, stat: s } => {
            let _ = u64(&mut body, *valid);
            let _ = qid(&mut body, q);
            let _ = stat(&mut body, s);
            MsgType::Rgetattr
        }
        Rmessage::SetAttr => MsgType::Rsetattr,
        Rmessage::XattrWalk { size } => {
            let _ = u64(&mut body, *size);
            MsgType::Rxattrwalk
        }
        Rmessage::XattrCreate => MsgType::Rxattrcreate,
        Rmessage::ReadDir { entries } => {
            let mut payload = Vec::new();
            for entry in entries {
                let _ = dirent(&mut payload, entry);
            }
            let _ = bytes(&mut body, &payload);
            MsgType::Rreaddir
        }
        Rmessage::Fsync => MsgType::Rfsync,
        Rmessage::Lock { status } => {
            let _ = u8(&mut body, *status);
            MsgType::Rlock
        }
        Rmessage::GetLock { lock } => {
            let _ = get_flock(&mut body, lock);
            MsgType::Rgetlock
        }
        Rmessage::Link => MsgType::Rlink,
        Rmessage::Mkdir { qid: q } => {
            let _ = qid(&mut body, q);
            MsgType::Rmkdir
        }
        Rmessage::RenameAt => MsgType::Rrenameat,
        Rmessage::UnlinkAt => MsgType::Runlinkat,
        Rmessage::StatFs { stat: s } => {
            let _ = stat_fs(&mut body, s);
            MsgType::Rstatfs
        }
        Rmessage::Read { data } => {
            let _ = bytes(&mut body, data);
            MsgType::Rread
        }
        Rmessage::Write { count } => {
            let _ = u32(&mut body, *count);
            MsgType::Rwrite
        }
        Rmessage::Clunk => MsgType::Rclunk,
        Rmessage::Remove => MsgType::Rremove,
    };
    frame(msg_type, tag, body)
}

/// Serializes one request frame. The server never sends requests; this
/// direction exists for client-side use and the integration tests.
pub fn t_message(tag: u16, msg: &Tmessage) -> Vec<u8> {
    let mut body = Vec::new();
    let msg_type = match msg {
        Tmessage::Version { msize, version } => {
            let _ = u32(&mut body, *msize);
            let _ = string(&mut body, version);
            MsgType::Tversion
        }
        Tmessage::Auth { afid, uname, aname, n_uname } => {
            let _ = u32(&mut body, *afid);
            let _ = string(&mut body, uname);
            let _ = string(&mut body, aname);
            let _ = u32(&mut body, *n_uname);
            MsgType::Tauth
        }
        Tmessage::Attach { fid, afid, uname, aname, n_uname } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *afid);
            let _ = string(&mut body, uname);
            let _ = string(&mut body, aname);
            let _ = u32(&mut body, *n_uname);
            MsgType::Tattach
        }
        Tmessage::Flush { oldtag } => {
            let _ = u16(&mut body, *oldtag);
            MsgType::Tflush
        }
        Tmessage::Walk { fid, newfid, wnames } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *newfid);
            let _ = u16(&mut body, wnames.len() as u16);
            for name in wnames {
                let _ = string(&mut body, name);
            }
            MsgType::Twalk
        }
        Tmessage::Open { fid, flags } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *flags);
            MsgType::Tlopen
        }
        Tmessage::Create { fid, name, flags, mode, gid } => {
            let _ = u32(&mut body, *fid);
            let _ = string(&mut body, name);
            let _ = u32(&mut body, *flags);
            let _ = u32(&mut body, *mode);
            let _ = u32(&mut body, *gid);
            MsgType::Tlcreate
        }
        Tmessage::Symlink { fid, name, symtgt, gid } => {
            let _ = u32(&mut body, *fid);
            let _ = string(&mut body, name);
            let _ = string(&mut body, symtgt);
            let _ = u32(&mut body, *gid);
            MsgType::Tsymlink
        }
        Tmessage::Mknod { dfid, name, mode, major, minor, gid } => {
            let _ = u32(&mut body, *dfid);
            let _ = string(&mut body, name);
            let _ = u32(&mut body, *mode);
            let _ = u32(&mut body, *major);
            let _ = u32(&mut body, *minor);
            let _ = u32(&mut body, *gid);
            MsgType::Tmknod
        }
        Tmessage::Rename { fid, dfid, name } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *dfid);
            let _ = string(&mut body, name);
            MsgType::Trename
        }
        Tmessage::Readlink { fid } => {
            let _ = u32(&mut body, *fid);
            MsgType::Treadlink
        }
        Tmessage::GetAttr { fid, request_mask } => {
            let _ = u32(&mut body, *fid);
            let _ = u64(&mut body, *request_mask);
            MsgType::Tgetattr
        }
        Tmessage::SetAttr { fid, valid, attr } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *valid);
            let _ = set_attr(&mut body, attr);
            MsgType::Tsetattr
        }
        Tmessage::XattrWalk { fid, newfid, name } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *newfid);
            let _ = string(&mut body, name);
            MsgType::Txattrwalk
        }
        Tmessage::XattrCreate { fid, name, attr_size, flags } => {
            let _ = u32(&mut body, *fid);
            let _ = string(&mut body, name);
            let _ = u64(&mut body, *attr_size);
            let _ = u32(&mut body, *flags);
            MsgType::Txattrcreate
        }
        Tmessage::ReadDir { fid, offset, count } => {
            let _ = u32(&mut body, *fid);
            let _ = u64(&mut body, *offset);
            let _ = u32(&mut body, *count);
            MsgType::Treaddir
        }
        Tmessage::Fsync { fid, datasync } => {
            let _ = u32(&mut body, *fid);
            let _ = u32(&mut body, *datasync);
            MsgType::Tfsync
        }
        Tmessage::Lock { fid, lock } => {
            let _ = u32(&mut body, *fid);
            let _ = flock(&mut body, lock);
            MsgType::Tlock
        }
        Tmessage::GetLock { fid, lock } => {
            let _ = u32(&mut body, *fid);
            let _ = get_flock(&mut body, lock);
            MsgType::Tgetlock
        }
        Tmessage::Link { dfid, fid, name } => {
            let _ = u32(&mut body, *dfid);
            let _ = u32(&mut body, *fid);
            let _ = string(&mut body, name);
            MsgType::Tlink
        }
        Tmessage::Mkdir { dfid, name, mode, gid } => {
            let _ = u32(&mut body, *dfid);
            let _ = string(&mut body, name);
            let _ = u32(&mut body, *mode);
            let _ = u32(&mut body, *gid);
            MsgType::Tmkdir
        }
        Tmessage::RenameAt { olddirfid, oldname, newdirfid, newname } => {
            let _ = u32(&mut body, *olddirfid);
            let _ = string(&mut body, oldname);
            let _ = u32(&mut body, *newdirfid);
            let _ = string(&mut body, newname);
            MsgType::Trenameat
        }
        Tmessage::UnlinkAt { dirfd, name, flags } => {
            let _ = u32(&mut body, *dirfd);
            let _ = string(&mut body, name);
            let _ = u32(&mut body, *flags);
            MsgType::Tunlinkat
        }
        Tmessage::StatFs { fid } => {
            let _ = u32(&mut body, *fid);
            MsgType::Tstatfs
        }
        Tmessage::Read { fid, offset, count } => {
            let _ = u32(&mut body, *fid);
            let _ = u64(&mut body, *offset);
            let _ = u32(&mut body, *count);
            MsgType::Tread
        }
        Tmessage::Write { fid, offset, data } => {
            let _ = u32(&mut body, *fid);
            let _ = u64(&mut body, *offset);
            let _ = bytes(&mut body, data);
            MsgType::Twrite
        }
        Tmessage::Clunk { fid } => {
            let _ = u32(&mut body, *fid);
            MsgType::Tclunk
        }
        Tmessage::Remove { fid } => {
            let _ = u32(&mut body, *fid);
            MsgType::Tremove
        }
    };
    frame(msg_type, tag, body)
}
