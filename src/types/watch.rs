/// A notification delivered to a watcher.
///
/// Node events carry the path that changed. Connection-state events have no path and an
/// `event_type` of [`WatchedEventType::None`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedEvent {
    /// What happened.
    pub event_type: WatchedEventType,
    /// Connection state of the session when the event was generated.
    pub keeper_state: KeeperState,
    /// Node the event concerns.
    pub path: Option<String>,
}

impl WatchedEvent {
    /// A pure connection-state notification.
    pub(crate) fn state(keeper_state: KeeperState) -> Self {
        WatchedEvent {
            event_type: WatchedEventType::None,
            keeper_state,
            path: None,
        }
    }
}

/// Connection state reported alongside every [`WatchedEvent`].
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeeperState {
    /// No server is currently reachable. The session may still be resumed.
    Disconnected = 0,
    /// Connected to a server that is part of the quorum.
    SyncConnected = 3,
    /// The service rejected the client's credentials.
    AuthFailed = 4,
    /// Connected to a server that is partitioned from the quorum and only serves reads.
    ConnectedReadOnly = 5,
    /// SASL authentication succeeded.
    SaslAuthenticated = 6,
    /// The session was ended with [`ZooKeeper::close`](crate::ZooKeeper::close). Never sent by
    /// the service.
    Closed = 7,
    /// The service expired the session. A new client has to be built to continue.
    Expired = -112,
}

impl KeeperState {
    /// Decodes a keeper state from the wire, or `None` for an unknown value.
    pub(crate) fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => KeeperState::Disconnected,
            3 => KeeperState::SyncConnected,
            4 => KeeperState::AuthFailed,
            5 => KeeperState::ConnectedReadOnly,
            6 => KeeperState::SaslAuthenticated,
            7 => KeeperState::Closed,
            -112 => KeeperState::Expired,
            _ => return None,
        })
    }
}

/// Kind of change a watch reports.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchedEventType {
    /// Only the connection state changed.
    None = -1,
    /// The node came into existence.
    NodeCreated = 1,
    /// The node was removed.
    NodeDeleted = 2,
    /// The node's data was written. The bytes may be unchanged.
    NodeDataChanged = 3,
    /// A child was added or removed. Writes to a child's data do not count.
    NodeChildrenChanged = 4,
    /// A data watch was removed.
    DataWatchRemoved = 5,
    /// A child watch was removed.
    ChildWatchRemoved = 6,
}

impl WatchedEventType {
    /// Decodes an event type from the wire, or `None` for an unknown value.
    pub(crate) fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => WatchedEventType::None,
            1 => WatchedEventType::NodeCreated,
            2 => WatchedEventType::NodeDeleted,
            3 => WatchedEventType::NodeDataChanged,
            4 => WatchedEventType::NodeChildrenChanged,
            5 => WatchedEventType::DataWatchRemoved,
            6 => WatchedEventType::ChildWatchRemoved,
            _ => return None,
        })
    }
}
