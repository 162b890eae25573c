mod acl;
pub use self::acl::*;

mod watch;
pub use self::watch::*;

mod session;
pub use self::session::*;

/// Metadata the service keeps for every node.
///
/// Every write to the tree is stamped with a zxid, a transaction id that totally orders all
/// changes. The three version counters each count writes to one aspect of the node and back
/// conditional updates. The two timestamps are informational only.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Stat {
    /// zxid of the write that created the node.
    pub czxid: i64,
    /// zxid of the most recent write to the node's data.
    pub mzxid: i64,
    /// Creation time, in milliseconds since the epoch.
    pub ctime: i64,
    /// Time of the most recent data write, in milliseconds since the epoch.
    pub mtime: i64,
    /// Data version, bumped by every successful `set_data`.
    pub version: i32,
    /// Child version, bumped whenever a child is added or removed.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Owning session of an ephemeral node, `0` otherwise. See [`Stat::owner`].
    pub ephemeral_owner: i64,
    /// Size of the node's data in bytes.
    pub data_length: i32,
    /// Number of direct children.
    pub num_children: i32,
    /// zxid of the most recent change to the set of children.
    pub pzxid: i64,
}

impl Stat {
    /// The owning session of an ephemeral node, or `None` for any other node.
    pub fn owner(&self) -> Option<i64> {
        if self.ephemeral_owner == 0 {
            None
        } else {
            Some(self.ephemeral_owner)
        }
    }
}

/// Lifetime and naming of a node being created.
///
/// Discriminants are the flag values used on the wire.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// Lives until deleted.
    Persistent = 0,
    /// Removed by the service when the creating session ends.
    Ephemeral = 1,
    /// Persistent, and the service appends a ten digit, zero padded counter taken from the
    /// parent's child version to the requested name.
    PersistentSequential = 2,
    /// Ephemeral with a sequence suffix.
    EphemeralSequential = 3,
    /// Persistent, but removed by the service once it has gone unmodified for its time-to-live
    /// and has no children.
    PersistentWithTTL = 5,
    /// TTL node with a sequence suffix.
    PersistentSequentialWithTTL = 6,
}

impl CreateMode {
    /// Does the service append a sequence suffix to the requested path?
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential
                | CreateMode::EphemeralSequential
                | CreateMode::PersistentSequentialWithTTL
        )
    }

    /// Is the node's lifetime bound to the creating session?
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Does this mode need a time-to-live?
    pub fn is_ttl(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentWithTTL | CreateMode::PersistentSequentialWithTTL
        )
    }
}
