//! The walk engine.
//!
//! `walk` resolves a name sequence against a starting node and yields the
//! qids visited plus the final node. Three cases, decided purely by the
//! name list:
//!
//! 1. an empty list clones the starting fid without producing a qid;
//! 2. a single `.` clones with a qid, and a single `..` moves to the parent
//!    when there is one (a parentless node treats `..` as `.`);
//! 3. anything else resolves component by component through child tables,
//!    which never contain dot entries.
//!
//! A failure partway through reports the error together with the qids
//! gathered so far, which is how 9P expects partial walks to surface.

use crate::error::{Error, Result};
use crate::ninep::Qid;

use super::NodeRef;

/// Outcome of a walk: the qids of every component actually traversed, and
/// either the node reached or the error that stopped the traversal.
pub struct Walked {
    pub wqids: Vec<Qid>,
    pub end: Result<NodeRef>,
}

impl Walked {
    fn done(wqids: Vec<Qid>, node: NodeRef) -> Walked {
        Walked { wqids, end: Ok(node) }
    }

    fn stopped(wqids: Vec<Qid>, err: Error) -> Walked {
        Walked { wqids, end: Err(err) }
    }
}

/// Walks `names` starting from `start`.
pub fn walk(start: &NodeRef, names: &[String]) -> Walked {
    if names.is_empty() {
        return Walked::done(Vec::new(), start.clone());
    }

    if names.len() == 1 {
        match names[0].as_str() {
            "." => return Walked::done(vec![start.qid()], start.clone()),
            ".." => {
                if let Some(parent) = start.parent() {
                    return Walked::done(vec![parent.qid()], parent);
                }
                return Walked::done(vec![start.qid()], start.clone());
            }
            _ => {}
        }
    }

    let mut current = start.clone();
    let mut wqids = Vec::with_capacity(names.len());
    for name in names {
        match current.child(name) {
            Ok(child) => {
                wqids.push(child.qid());
                current = child;
            }
            Err(err) => return Walked::stopped(wqids, err),
        }
    }
    Walked::done(wqids, current)
}
