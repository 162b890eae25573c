use failure::Fail;
use std::fmt;

/// Ways a `delete` can be refused.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum Delete {
    /// Nothing lives at the path.
    #[fail(display = "no such node")]
    NoNode,

    /// The node's data version did not match the one given.
    #[fail(display = "version mismatch (expected {})", expected)]
    BadVersion {
        /// Version the caller asked for.
        expected: i32,
    },

    /// Only leaves can be deleted.
    #[fail(display = "target node still has children")]
    NotEmpty,
}

/// Ways a `set_data` can be refused.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum SetData {
    /// Nothing lives at the path.
    #[fail(display = "no such node")]
    NoNode,

    /// The node's data version did not match the one given.
    #[fail(display = "version mismatch (expected {})", expected)]
    BadVersion {
        /// Version the caller asked for.
        expected: i32,
    },

    /// The node's ACL does not let this session write it.
    #[fail(display = "insufficient authentication")]
    NoAuth,
}

/// Ways a `create` can be refused.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum Create {
    /// Something already lives at the requested path.
    #[fail(display = "node already exists")]
    NodeExists,

    /// The parent is missing.
    #[fail(display = "parent node does not exist")]
    NoNode,

    /// Ephemeral nodes cannot have children.
    #[fail(display = "parent node is ephemeral")]
    NoChildrenForEphemerals,

    /// The ACL was empty or malformed.
    #[fail(display = "the given ACL is invalid")]
    InvalidAcl,

    /// The parent's ACL does not let this session create children.
    #[fail(display = "not authorized to create the node")]
    AuthFailed,
}

/// Ways a `get_data` can fail.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum GetData {
    /// Nothing lives at the path.
    #[fail(display = "no such node")]
    NoNode,
}

/// Ways a `get_children` can fail.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum GetChildren {
    /// Nothing lives at the path.
    #[fail(display = "no such node")]
    NoNode,
}

/// Ways a `sync` can fail.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum Sync {
    /// Nothing lives at the path.
    #[fail(display = "no such node")]
    NoNode,
}

/// The step of a subtree deletion that went wrong.
#[derive(Debug)]
pub enum SubtreeFailure {
    /// A node could not be deleted.
    Delete(Delete),
    /// The children of a node could not be listed.
    GetChildren(GetChildren),
    /// The request did not get an answer (connection loss, timeout, expired session, ...).
    Request(failure::Error),
}

impl fmt::Display for SubtreeFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SubtreeFailure::Delete(ref e) => write!(f, "delete failed: {}", e),
            SubtreeFailure::GetChildren(ref e) => write!(f, "listing children failed: {}", e),
            SubtreeFailure::Request(ref e) => write!(f, "request failed: {}", e),
        }
    }
}

/// A subtree deletion that stopped part way.
///
/// Nodes listed in `deleted` are gone; everything else under the root may still exist.
#[derive(Debug)]
pub struct DeleteSubtree {
    /// The node the deletion stopped at.
    pub path: String,
    /// What went wrong there.
    pub reason: SubtreeFailure,
    /// Paths this call deleted before stopping, in deletion order.
    pub deleted: Vec<String>,
}

impl fmt::Display for DeleteSubtree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "subtree deletion stopped at {} after deleting {} nodes: {}",
            self.path,
            self.deleted.len(),
            self.reason
        )
    }
}

impl Fail for DeleteSubtree {}
