use std::fmt;
use std::time::Duration;

/// The connection state of a session, as tracked by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The link to the service was lost; the client is trying to re-establish it within the
    /// session timeout.
    Disconnected,
    /// The initial handshake has not completed yet.
    Connecting,
    /// A handshake completed and requests are flowing.
    Connected,
    /// The service expired the session, or the client could not reach it before the session
    /// timeout ran out. No further operations are accepted.
    Expired,
    /// The session was ended with [`ZooKeeper::close`](crate::ZooKeeper::close).
    Closed,
}

impl SessionState {
    /// Is this a state no session ever leaves?
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Closed)
    }
}

/// The pair a client presents to resume an existing session.
///
/// This is a credential: anyone holding it can take over the session (and its ephemeral nodes).
/// The `Debug` implementation therefore never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// The service-assigned session identifier.
    pub session_id: i64,
    /// The service-assigned session secret.
    pub password: Vec<u8>,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("session_id", &format_args!("{:#x}", self.session_id))
            .field("password", &format_args!("<{} bytes>", self.password.len()))
            .finish()
    }
}

/// What the client knows about the session it is currently using.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// Identity and secret of the session.
    pub credentials: SessionCredentials,
    /// The session timeout the service agreed to.
    pub timeout: Duration,
    /// `true` if the client asked to resume a session and the service accepted. `false` for fresh
    /// sessions, including the case where resumption was requested but refused.
    pub resumed: bool,
    /// `true` if the session is served by a read-only server.
    pub read_only: bool,
}

impl SessionInfo {
    /// The session identifier.
    pub fn id(&self) -> i64 {
        self.credentials.session_id
    }
}
