use std::fmt;

/// Status codes returned by the coordination service.
///
/// The integer values are the ones used on the wire, so a `ZkError` can be decoded from (and
/// encoded to) a reply header without any translation table on the server side. `ZkError::Ok` is
/// the success status carried by [`Completion`](crate::Completion)s; it is never produced as the
/// error of a failed request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ZkError {
    /// Everything is fine.
    Ok,
    /// This code is never returned from the server. It should not be used other than to indicate a
    /// range. Specifically error codes greater than this value are API errors (while values less
    /// than this indicate a system error.
    APIError,
    /// Client authentication failed.
    AuthFailed,
    /// Invalid arguments.
    BadArguments,
    /// Version conflict in `set` operation. In case of reconfiguration: reconfig requested from
    /// config version X but last seen config has a different version Y.
    BadVersion,
    /// Connection to the server has been lost.
    ConnectionLoss,
    /// A data inconsistency was found.
    DataInconsistency,
    /// Attempt to create ephemeral node on a local session.
    EphemeralOnLocalSession,
    /// Invalid `Acl` specified.
    InvalidACL,
    /// Invalid callback specified.
    InvalidCallback,
    /// Error while marshalling or unmarshalling data.
    MarshallingError,
    /// Not authenticated.
    NoAuth,
    /// Ephemeral nodes may not have children.
    NoChildrenForEphemerals,
    /// Request to create node that already exists.
    NodeExists,
    /// Attempted to read a node that does not exist.
    NoNode,
    /// The node has children.
    NotEmpty,
    /// State-changing request is passed to read-only server.
    NotReadOnly,
    /// Attempt to remove a non-existing watcher.
    NoWatcher,
    /// Operation timeout.
    OperationTimeout,
    /// A runtime inconsistency was found.
    RuntimeInconsistency,
    /// The session has been expired by the server.
    SessionExpired,
    /// Session moved to another server, so operation is ignored.
    SessionMoved,
    /// System and server-side errors. This is never thrown by the server, it shouldn't be used
    /// other than to indicate a range. Specifically error codes greater than this value, but lesser
    /// than `APIError`, are system errors.
    SystemError,
    /// Operation is unimplemented.
    Unimplemented,
    /// A code this client does not know about.
    Unknown(i32),
}

/// Coarse classification of a [`ZkError`], used to decide how a caller may react to it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The request succeeded.
    Success,
    /// The link to the service is impaired. Recoverable by reconnecting or resuming the session,
    /// but non-idempotent requests may or may not have been applied.
    Connectivity,
    /// A deterministic outcome of the current tree state. Retrying without changing the tree
    /// gives the same answer.
    Precondition,
    /// The request was rejected for lack of permission.
    Authorization,
    /// Anything else (protocol or server-side faults).
    Other,
}

impl ZkError {
    /// The wire value of this status.
    pub fn code(&self) -> i32 {
        match *self {
            ZkError::Ok => 0,
            ZkError::APIError => -100,
            ZkError::AuthFailed => -115,
            ZkError::BadArguments => -8,
            ZkError::BadVersion => -103,
            ZkError::ConnectionLoss => -4,
            ZkError::DataInconsistency => -3,
            ZkError::EphemeralOnLocalSession => -120,
            ZkError::InvalidACL => -114,
            ZkError::InvalidCallback => -113,
            ZkError::MarshallingError => -5,
            ZkError::NoAuth => -102,
            ZkError::NoChildrenForEphemerals => -108,
            ZkError::NodeExists => -110,
            ZkError::NoNode => -101,
            ZkError::NotEmpty => -111,
            ZkError::NotReadOnly => -119,
            ZkError::NoWatcher => -121,
            ZkError::OperationTimeout => -7,
            ZkError::RuntimeInconsistency => -2,
            ZkError::SessionExpired => -112,
            ZkError::SessionMoved => -118,
            ZkError::SystemError => -1,
            ZkError::Unimplemented => -6,
            ZkError::Unknown(code) => code,
        }
    }

    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            ZkError::Ok => ErrorKind::Success,
            ZkError::ConnectionLoss
            | ZkError::OperationTimeout
            | ZkError::SessionExpired
            | ZkError::SessionMoved => ErrorKind::Connectivity,
            ZkError::NoNode
            | ZkError::NodeExists
            | ZkError::NotEmpty
            | ZkError::BadVersion
            | ZkError::NoChildrenForEphemerals => ErrorKind::Precondition,
            ZkError::AuthFailed | ZkError::NoAuth | ZkError::InvalidACL => {
                ErrorKind::Authorization
            }
            _ => ErrorKind::Other,
        }
    }
}

impl From<i32> for ZkError {
    fn from(code: i32) -> Self {
        match code {
            0 => ZkError::Ok,
            -100 => ZkError::APIError,
            -115 => ZkError::AuthFailed,
            -8 => ZkError::BadArguments,
            -103 => ZkError::BadVersion,
            -4 => ZkError::ConnectionLoss,
            -3 => ZkError::DataInconsistency,
            -120 => ZkError::EphemeralOnLocalSession,
            -114 => ZkError::InvalidACL,
            -113 => ZkError::InvalidCallback,
            -5 => ZkError::MarshallingError,
            -102 => ZkError::NoAuth,
            -108 => ZkError::NoChildrenForEphemerals,
            -110 => ZkError::NodeExists,
            -101 => ZkError::NoNode,
            -111 => ZkError::NotEmpty,
            -119 => ZkError::NotReadOnly,
            -121 => ZkError::NoWatcher,
            -7 => ZkError::OperationTimeout,
            -2 => ZkError::RuntimeInconsistency,
            -112 => ZkError::SessionExpired,
            -118 => ZkError::SessionMoved,
            -1 => ZkError::SystemError,
            -6 => ZkError::Unimplemented,
            code => ZkError::Unknown(code),
        }
    }
}

impl fmt::Display for ZkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ZkError::Unknown(code) => write!(f, "unknown status code {}", code),
            ref e => write!(f, "{:?} ({})", e, e.code()),
        }
    }
}

impl failure::Fail for ZkError {}
