mod attr;
mod control;
mod table;
mod tree;
mod walk;

use super::{Directory, Ident, NodeRef};

pub(super) const IDENT: Ident = Ident { uid: 1000, gid: 1000 };

pub(super) fn root() -> NodeRef {
    Directory::root(IDENT)
}
