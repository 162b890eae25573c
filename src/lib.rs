//! This crate provides a client for interacting with a [ZooKeeper]-style coordination service, a
//! highly available, hierarchical store of small data nodes used for configuration, naming,
//! leader election and other coordination tasks.
//!
//! The client owns one session with the service. A session is established with a handshake,
//! survives transient connection loss (the client fails over between the addresses it was given
//! and resumes the session), and ends when it is closed explicitly or when the service expires
//! it. Nodes created in `Ephemeral` mode live exactly as long as the session that created them.
//!
//! # Operations
//!
//! Each node operation exists in two forms:
//!
//!  - an awaitable form on [`ZooKeeper`] (`create`, `delete`, `exists`, `get_data`, `set_data`,
//!    `get_children`, `sync`), bounded by the builder's operation timeout;
//!  - a non-blocking form, [`ZooKeeper::submit`], that hands a [`Completion`] carrying the status
//!    code, path, a caller-supplied context value and the payload to a callback.
//!
//! Requests are queued when the call is made, so requests issued one after the other on one
//! session are processed by the service in that order.
//!
//! Results are nested: the outer `Result` fails when the request could not be answered (lost
//! connection, timeout, expired session; the status is available as a [`ZkError`] through
//! `failure::Error::downcast_ref`), while the inner `Result` carries the failures that follow
//! from the state of the tree (a node that does not exist, a version that does not match, ...).
//! Nothing is retried behind the caller's back: in particular, a `Sequential` create whose
//! response was lost may or may not have created a node, see [`ZooKeeper::find_sequential`].
//!
//! # Watches
//!
//! Reads can leave a one-shot watch behind. [`ZooKeeper::watch`] arms watches whose
//! notification goes to the default watcher stream returned when connecting, and
//! [`ZooKeeper::with_watcher`] arms watches with their own one-shot receiver. A watch fires at
//! most once; to keep observing a node, read it again with a new watch. Watches survive a
//! reconnect to the same session, but not the end of the session: when the session expires or is
//! closed, every outstanding watch receives a final event carrying that state.
//!
//! Connection state changes (`SyncConnected`, `Disconnected`, `Expired`, `Closed`) are delivered
//! to the default watcher stream. All events are delivered in the order the client received
//! them.
//!
//! # Trees
//!
//! [`ZooKeeper::list_subtree`] walks every node below a path, and
//! [`ZooKeeper::delete_subtree`] removes a whole subtree. Neither is a transactional snapshot.
//!
//! # Example
//!
//! ```no_run
//! use tokio_zkcore::*;
//! use futures::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), failure::Error> {
//! let (zk, default_watcher) = ZooKeeper::connect(&"127.0.0.1:2181".parse().unwrap()).await?;
//!
//! let path = zk
//!     .create(
//!         "/example",
//!         &b"Hello world"[..],
//!         Acl::open_unsafe(),
//!         CreateMode::Persistent,
//!     )
//!     .await?;
//! assert_eq!(path.as_deref(), Ok("/example"));
//!
//! let (watch, data) = zk.with_watcher().get_data("/example").await?.unwrap();
//! assert_eq!(data.0, b"Hello world".to_vec());
//!
//! zk.set_data("/example", Some(data.1.version), &b"Bye world"[..])
//!     .await?
//!     .unwrap();
//! let event = watch.await?;
//! assert_eq!(event.event_type, WatchedEventType::NodeDataChanged);
//!
//! zk.delete_subtree("/example").await?;
//! zk.close().await?;
//! drop(default_watcher);
//! # Ok(())
//! # }
//! ```
//!
//! [ZooKeeper]: https://zookeeper.apache.org/
#![warn(missing_docs)]

use failure::{bail, format_err};
use futures::channel::{mpsc, oneshot};
use futures::Stream;
use slog::{debug, trace};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;

mod callback;
pub mod error;
pub mod path;
mod proto;
mod transform;
mod tree;
mod types;

pub use crate::callback::{Completion, Op, OpPayload};
pub use crate::proto::{ErrorKind, ZkError, ZooKeeperTransport};
pub use crate::types::{
    Acl, CreateMode, KeeperState, Permission, SessionCredentials, SessionInfo, SessionState,
    Stat, WatchedEvent, WatchedEventType,
};

use crate::proto::{Enqueuer, Packetizer, Request, SessionParams, Watch};

/// Session timeout asked for when none is configured.
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection to ZooKeeper.
///
/// All interactions with ZooKeeper are performed by calling the methods of a `ZooKeeper` instance.
/// All clones of the same `ZooKeeper` instance use the same underlying session. Once a session
/// has been closed or has expired, it cannot be used again; build a new `ZooKeeper` (possibly
/// resuming the old session, see [`ZooKeeperBuilder::set_session`]) instead.
#[derive(Debug, Clone)]
pub struct ZooKeeper {
    connection: Enqueuer,
    logger: slog::Logger,
}

/// Builder that allows customizing options for ZooKeeper connections.
#[derive(Debug, Clone)]
pub struct ZooKeeperBuilder {
    session_timeout: Duration,
    operation_timeout: Option<Duration>,
    session: Option<SessionCredentials>,
    read_only: bool,
    logger: slog::Logger,
}

impl Default for ZooKeeperBuilder {
    fn default() -> Self {
        let drain = slog::Discard;
        let root = slog::Logger::root(drain, slog::o!());

        ZooKeeperBuilder {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            operation_timeout: None,
            session: None,
            read_only: false,
            logger: root,
        }
    }
}

impl ZooKeeperBuilder {
    /// Set the ZooKeeper [session expiry
    /// timeout](https://zookeeper.apache.org/doc/r3.4.12/zookeeperProgrammers.html#ch_zkSessions).
    ///
    /// The service may negotiate a different value. The initial handshake, and every attempt to
    /// get a lost connection back, give up once this much time has passed.
    pub fn set_timeout(&mut self, t: Duration) -> &mut Self {
        self.session_timeout = t;
        self
    }

    /// Set how long an awaited operation waits for its response before resolving to
    /// [`ZkError::OperationTimeout`]. Defaults to the session timeout.
    pub fn set_operation_timeout(&mut self, t: Duration) -> &mut Self {
        self.operation_timeout = Some(t);
        self
    }

    /// Ask to resume an existing session instead of starting a new one.
    ///
    /// The service may refuse (most commonly because the session has expired). The client then
    /// starts a fresh session, and reports it through [`SessionInfo::resumed`] being `false`.
    pub fn set_session(&mut self, credentials: SessionCredentials) -> &mut Self {
        self.session = Some(credentials);
        self
    }

    /// Allow the session to be served by a read-only server.
    pub fn set_read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = read_only;
        self
    }

    /// Set the logger that should be used internally in the ZooKeeper client.
    ///
    /// By default, all logging is disabled. See also [the `slog`
    /// documentation](https://docs.rs/slog).
    pub fn set_logger(&mut self, l: slog::Logger) -> &mut Self {
        self.logger = l;
        self
    }

    /// Start a session against the ensemble at `addrs` over transport `S`, without waiting for
    /// it to be established.
    ///
    /// The returned handle is in state [`SessionState::Connecting`]. Requests made through it are
    /// queued until the handshake completes. The stream yields connection state changes (the
    /// first one being `SyncConnected`) and watch events of globally watched nodes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(
        self,
        addrs: Vec<S::Addr>,
    ) -> Result<(ZooKeeper, impl Stream<Item = WatchedEvent>), failure::Error>
    where
        S: ZooKeeperTransport,
    {
        if addrs.is_empty() {
            bail!("at least one address is required");
        }
        if self.session_timeout.as_millis() > i32::MAX as u128 {
            bail!("session timeout {:?} is too large", self.session_timeout);
        }

        debug!(self.logger, "starting session"; "addrs" => ?addrs, "resume" => ?self.session);

        let (tx, rx) = mpsc::unbounded();
        let params = SessionParams::new(self.session_timeout, self.session, self.read_only);
        let operation_timeout = self.operation_timeout.unwrap_or(self.session_timeout);
        let connection = Packetizer::<S>::start(
            addrs,
            params,
            operation_timeout,
            self.logger.clone(),
            tx,
        );

        Ok((
            ZooKeeper {
                connection,
                logger: self.logger,
            },
            rx,
        ))
    }

    /// Connect to a ZooKeeper server instance at the given address, and wait for the session to
    /// be established.
    ///
    /// See [`ZooKeeper::connect`].
    pub async fn connect(
        self,
        addr: &SocketAddr,
    ) -> Result<(ZooKeeper, impl Stream<Item = WatchedEvent>), failure::Error> {
        self.connect_any(&[*addr]).await
    }

    /// Connect to whichever of the given servers answers first, and wait for the session to be
    /// established. On connection loss, the client fails over to the other addresses.
    pub async fn connect_any(
        self,
        addrs: &[SocketAddr],
    ) -> Result<(ZooKeeper, impl Stream<Item = WatchedEvent>), failure::Error> {
        let (zk, watcher) = self.start::<TcpStream>(addrs.to_vec())?;
        zk.wait_connected().await?;
        Ok((zk, watcher))
    }
}

impl ZooKeeper {
    /// Connect to a ZooKeeper server instance at the given address.
    ///
    /// Session establishment is asynchronous: this waits for the handshake to complete, or fails
    /// once the default session timeout has passed without a server accepting the session.
    ///
    /// Along with the `ZooKeeper` instance, this returns the default watcher stream. It yields
    /// every connection state change, and the notifications of watches armed through
    /// [`ZooKeeper::watch`].
    ///
    /// To customize the connection, use [`ZooKeeperBuilder`].
    pub async fn connect(
        addr: &SocketAddr,
    ) -> Result<(Self, impl Stream<Item = WatchedEvent>), failure::Error> {
        ZooKeeperBuilder::default().connect(addr).await
    }

    /// The current state of the session.
    pub fn state(&self) -> SessionState {
        self.connection.status().state
    }

    /// Identity and parameters of the session, once a handshake has completed.
    ///
    /// The returned credentials can be handed to [`ZooKeeperBuilder::set_session`] to resume the
    /// session from another client. Treat them as a secret.
    pub fn session(&self) -> Option<SessionInfo> {
        self.connection.status().session
    }

    /// Wait until the session is connected.
    ///
    /// Fails if the session ends (expires, or is closed) first.
    pub async fn wait_connected(&self) -> Result<SessionInfo, failure::Error> {
        let status = self
            .connection
            .wait_for(|state| state == SessionState::Connected || state.is_terminal())
            .await;
        match (status.state, status.session) {
            (SessionState::Connected, Some(info)) => Ok(info),
            (state, _) => Err(format_err!("session is not connected ({:?})", state)),
        }
    }

    /// Create a node with the given `path` with `data` as its contents.
    ///
    /// The `mode` argument specifies additional options for the newly created node. The TTL
    /// modes need a time-to-live, see [`ZooKeeper::create_ttl`].
    ///
    /// If `mode` is set to `CreateMode::Ephemeral` (or `CreateMode::EphemeralSequential`), the
    /// node will be removed by the ZooKeeper automatically when the session associated with the
    /// creation of the node expires or is closed.
    ///
    /// If `mode` is set to `CreateMode::PersistentSequential` or
    /// `CreateMode::EphemeralSequential`, the actual path name of a sequential node will be the
    /// given `path` plus a suffix `i` where `i` is the current sequential number of the node. The
    /// sequence number is always fixed length of 10 digits, 0 padded. Once such a node is created,
    /// the sequential number will be incremented by one. The newly created node's full name is
    /// returned when the future is resolved.
    ///
    /// If a node with the same actual path already exists in the ZooKeeper, the returned future
    /// resolves with an error of [`error::Create::NodeExists`]. Note that since a different actual
    /// path is used for each invocation of creating sequential nodes with the same `path`
    /// argument, calls with sequential modes will never return `NodeExists`.
    ///
    /// If the parent node does not exist in the ZooKeeper, [`error::Create::NoNode`] will be
    /// returned. An ephemeral node cannot have children. If the parent node of the given `path` is
    /// ephemeral, [`error::Create::NoChildrenForEphemerals`] will be returned.
    ///
    /// If a node is created successfully, the ZooKeeper will trigger the watches on the `path`
    /// left by `exists` calls, and the watches on the parent of the node by `get_children` calls.
    ///
    /// The maximum allowable size of the data array is 1 MB (1,048,576 bytes).
    pub fn create<D, A>(
        &self,
        path: &str,
        data: D,
        acl: A,
        mode: CreateMode,
    ) -> impl Future<Output = Result<Result<String, error::Create>, failure::Error>>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        let res = if mode.is_ttl() {
            Err(format_err!("{:?} needs a time-to-live; use create_ttl", mode))
        } else {
            self.create_node(path, data.into(), acl.into(), mode, None)
        };
        async move { transform::create(res?.await?) }
    }

    /// Create a node that the service removes once it has gone `ttl` without modification and
    /// has no children. Only the `PersistentWithTTL` and `PersistentSequentialWithTTL` modes are
    /// accepted.
    ///
    /// Otherwise behaves like [`ZooKeeper::create`].
    pub fn create_ttl<D, A>(
        &self,
        path: &str,
        data: D,
        acl: A,
        mode: CreateMode,
        ttl: Duration,
    ) -> impl Future<Output = Result<Result<String, error::Create>, failure::Error>>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        let res = if !mode.is_ttl() {
            Err(format_err!("{:?} does not take a time-to-live", mode))
        } else if ttl.as_millis() == 0 || ttl.as_millis() > i64::MAX as u128 {
            Err(format_err!("time-to-live {:?} is out of range", ttl))
        } else {
            self.create_node(
                path,
                data.into(),
                acl.into(),
                mode,
                Some(ttl.as_millis() as i64),
            )
        };
        async move { transform::create(res?.await?) }
    }

    fn create_node(
        &self,
        path: &str,
        data: Cow<'static, [u8]>,
        acl: Cow<'static, [Acl]>,
        mode: CreateMode,
        ttl: Option<i64>,
    ) -> Result<
        impl Future<Output = Result<Result<proto::Response, ZkError>, failure::Error>>,
        failure::Error,
    > {
        path::validate(path, mode.is_sequential())?;
        trace!(self.logger, "create"; "path" => path, "mode" => ?mode, "dlen" => data.len());
        Ok(self.connection.enqueue(Request::Create {
            path: path.to_string(),
            data,
            acl,
            mode,
            ttl,
        }))
    }

    /// Set the data for the node at the given `path`.
    ///
    /// The call will succeed if such a node exists, and the given `version` matches the version
    /// of the node (if the given `version` is `None`, it matches any version). On success, the
    /// updated [`Stat`] of the node is returned; its `version` is one more than before.
    ///
    /// This operation, if successful, will trigger all the watches on the node of the given
    /// `path` left by `get_data` calls.
    ///
    /// A failed call (no such node, or version mismatch) leaves the node unchanged.
    ///
    /// The maximum allowable size of the `data` array is 1 MB (1,048,576 bytes).
    pub fn set_data<D>(
        &self,
        path: &str,
        version: Option<i32>,
        data: D,
    ) -> impl Future<Output = Result<Result<Stat, error::SetData>, failure::Error>>
    where
        D: Into<Cow<'static, [u8]>>,
    {
        let data = data.into();
        let version = version.unwrap_or(-1);
        trace!(self.logger, "set_data"; "path" => path, "version" => version, "dlen" => data.len());
        let res = path::validate(path, false).map(|()| {
            self.connection.enqueue(Request::SetData {
                path: path.to_string(),
                version,
                data,
            })
        });
        async move { transform::set_data(version, res?.await?) }
    }

    /// Delete the node at the given `path`.
    ///
    /// The call will succeed if such a node exists, and the given `version` matches the node's
    /// version (if the given `version` is `None`, it matches any versions).
    ///
    /// This operation, if successful, will trigger all the watches on the node of the given `path`
    /// left by `exists` API calls, and the watches on the parent node left by `get_children` API
    /// calls.
    pub fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> impl Future<Output = Result<Result<(), error::Delete>, failure::Error>> {
        let version = version.unwrap_or(-1);
        trace!(self.logger, "delete"; "path" => path, "version" => version);
        let res = path::validate(path, false).map(|()| {
            self.connection.enqueue(Request::Delete {
                path: path.to_string(),
                version,
            })
        });
        async move { transform::delete(version, res?.await?) }
    }

    fn exists_w(
        &self,
        path: &str,
        watch: Watch,
    ) -> impl Future<Output = Result<Option<Stat>, failure::Error>> {
        trace!(self.logger, "exists"; "path" => path, "watch" => ?watch);
        let res = path::validate(path, false).map(|()| {
            self.connection.enqueue(Request::Exists {
                path: path.to_string(),
                watch,
            })
        });
        async move { transform::exists(res?.await?) }
    }

    /// Return the [`Stat`] of the node of the given `path`, or `None` if the node does not exist.
    pub fn exists(&self, path: &str) -> impl Future<Output = Result<Option<Stat>, failure::Error>> {
        self.exists_w(path, Watch::None)
    }

    fn get_children_w(
        &self,
        path: &str,
        watch: Watch,
    ) -> impl Future<Output = Result<Result<Vec<String>, error::GetChildren>, failure::Error>> {
        trace!(self.logger, "get_children"; "path" => path, "watch" => ?watch);
        let res = path::validate(path, false).map(|()| {
            self.connection.enqueue(Request::GetChildren {
                path: path.to_string(),
                watch,
            })
        });
        async move { transform::get_children(res?.await?) }
    }

    /// Return the names of the children of the node at the given `path`.
    ///
    /// The names are not paths, and come in no particular order.
    pub fn get_children(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Result<Vec<String>, error::GetChildren>, failure::Error>> {
        self.get_children_w(path, Watch::None)
    }

    fn get_data_w(
        &self,
        path: &str,
        watch: Watch,
    ) -> impl Future<Output = Result<Result<(Vec<u8>, Stat), error::GetData>, failure::Error>> {
        trace!(self.logger, "get_data"; "path" => path, "watch" => ?watch);
        let res = path::validate(path, false).map(|()| {
            self.connection.enqueue(Request::GetData {
                path: path.to_string(),
                watch,
            })
        });
        async move { transform::get_data(res?.await?) }
    }

    /// Return the data and the [`Stat`] of the node at the given `path`.
    pub fn get_data(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Result<(Vec<u8>, Stat), error::GetData>, failure::Error>> {
        self.get_data_w(path, Watch::None)
    }

    /// Wait until the server this session is connected to has caught up with the leader for
    /// `path`, so that a following read observes every write committed before this call.
    pub fn sync(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Result<(), error::Sync>, failure::Error>> {
        trace!(self.logger, "sync"; "path" => path);
        let res = path::validate(path, false).map(|()| {
            self.connection.enqueue(Request::Sync {
                path: path.to_string(),
            })
        });
        async move { transform::sync(res?.await?) }
    }

    /// Read the node at `path` as a configuration value: its data is decoded as UTF-8, trimmed,
    /// and parsed into `T`.
    ///
    /// A payload that does not parse is an error of the outer `Result`.
    pub fn get_value<T>(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Result<T, error::GetData>, failure::Error>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let data = self.get_data(path);
        let path = path.to_string();
        async move {
            let bytes = match data.await? {
                Ok((bytes, _)) => bytes,
                Err(e) => return Ok(Err(e)),
            };
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| format_err!("value at {} is not UTF-8: {}", path, e))?;
            text.trim()
                .parse::<T>()
                .map(Ok)
                .map_err(|e| format_err!("cannot decode value at {}: {}", path, e))
        }
    }

    /// Close the session.
    ///
    /// The service removes the ephemeral nodes of the session. Once the service has acknowledged
    /// the close, the default watcher receives a `Closed` event, and every outstanding watch is
    /// resolved with one.
    pub async fn close(self) -> Result<(), failure::Error> {
        debug!(self.logger, "closing session");
        let res = self.connection.enqueue(Request::CloseSession).await?;
        if let Err(e) = res {
            return Err(e.into());
        }
        self.connection.wait_for(SessionState::is_terminal).await;
        Ok(())
    }

    /// Add a global watch for the next chained operation.
    pub fn watch(&self) -> WatchGlobally<'_> {
        WatchGlobally(self)
    }

    /// Add a watch for the next chained operation, and return a future for any received event
    /// along with the operation's (successful) result.
    pub fn with_watcher(&self) -> WithWatcher<'_> {
        WithWatcher(self)
    }
}

/// Proxy for [`ZooKeeper`] that adds watches for initiated operations.
///
/// Triggered watches produce events on the global watcher stream.
#[derive(Debug, Clone)]
pub struct WatchGlobally<'a>(&'a ZooKeeper);

impl<'a> WatchGlobally<'a> {
    /// Return the [`Stat`] of the node of the given `path`, or `None` if the node does not exist.
    ///
    /// If no errors occur, a watch is left on the node at the given `path`. The watch is
    /// triggered by any successful operation that creates or deletes the node, or sets the node's
    /// data. When the watch triggers, an event will be sent to the global watcher stream.
    pub fn exists(self, path: &str) -> impl Future<Output = Result<Option<Stat>, failure::Error>> {
        self.0.exists_w(path, Watch::Global)
    }

    /// Return the names of the children of the node at the given `path`.
    ///
    /// If no errors occur, a watch is left on the node at the given `path`. The watch is
    /// triggered by any successful operation that deletes the node at the given `path`, or
    /// creates or deletes a child of that node.
    pub fn get_children(
        self,
        path: &str,
    ) -> impl Future<Output = Result<Result<Vec<String>, error::GetChildren>, failure::Error>> {
        self.0.get_children_w(path, Watch::Global)
    }

    /// Return the data and the [`Stat`] of the node at the given `path`.
    ///
    /// If no errors occur, a watch is left on the node at the given `path`. The watch is
    /// triggered by any successful operation that sets the node's data, or deletes it.
    pub fn get_data(
        self,
        path: &str,
    ) -> impl Future<Output = Result<Result<(Vec<u8>, Stat), error::GetData>, failure::Error>> {
        self.0.get_data_w(path, Watch::Global)
    }

    /// Create a node like [`ZooKeeper::create`], then leave an exists watch on the node that was
    /// created.
    pub async fn create<D, A>(
        self,
        path: &str,
        data: D,
        acl: A,
        mode: CreateMode,
    ) -> Result<Result<String, error::Create>, failure::Error>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        let created = match self.0.create(path, data, acl, mode).await? {
            Ok(created) => created,
            Err(e) => return Ok(Err(e)),
        };
        self.0.exists_w(&created, Watch::Global).await?;
        Ok(Ok(created))
    }
}

/// Proxy for [`ZooKeeper`] that adds non-global watches for initiated operations.
///
/// Events from triggered watches are yielded through returned `oneshot` channels. All events are
/// also produced on the global watcher stream unless a custom watch claimed them.
#[derive(Debug, Clone)]
pub struct WithWatcher<'a>(&'a ZooKeeper);

impl<'a> WithWatcher<'a> {
    /// Return the [`Stat`] of the node of the given `path`, or `None` if the node does not exist.
    ///
    /// If no errors occur, a watch will be left on the node at the given `path`. The watch is
    /// triggered by any successful operation that creates or deletes the node, or sets the data
    /// on the node, and in turn causes the included `oneshot::Receiver` to resolve.
    pub fn exists(
        self,
        path: &str,
    ) -> impl Future<Output = Result<(oneshot::Receiver<WatchedEvent>, Option<Stat>), failure::Error>>
    {
        let (tx, rx) = oneshot::channel();
        let stat = self.0.exists_w(path, Watch::Custom(tx));
        async move { Ok((rx, stat.await?)) }
    }

    /// Return the names of the children of the node at the given `path`.
    ///
    /// If no errors occur, a watch is left on the node at the given `path`. The watch is
    /// triggered by any successful operation that deletes the node at the given `path`, or
    /// creates or deletes a child of that node, and in turn causes the included
    /// `oneshot::Receiver` to resolve.
    pub fn get_children(
        self,
        path: &str,
    ) -> impl Future<
        Output = Result<
            Result<(oneshot::Receiver<WatchedEvent>, Vec<String>), error::GetChildren>,
            failure::Error,
        >,
    > {
        let (tx, rx) = oneshot::channel();
        let children = self.0.get_children_w(path, Watch::Custom(tx));
        async move { Ok(children.await?.map(move |children| (rx, children))) }
    }

    /// Return the data and the [`Stat`] of the node at the given `path`.
    ///
    /// If no errors occur, a watch is left on the node at the given `path`. The watch is
    /// triggered by any successful operation that sets the node's data, or deletes it, and in
    /// turn causes the included `oneshot::Receiver` to resolve.
    pub fn get_data(
        self,
        path: &str,
    ) -> impl Future<
        Output = Result<
            Result<(oneshot::Receiver<WatchedEvent>, (Vec<u8>, Stat)), error::GetData>,
            failure::Error,
        >,
    > {
        let (tx, rx) = oneshot::channel();
        let data = self.0.get_data_w(path, Watch::Custom(tx));
        async move { Ok(data.await?.map(move |data| (rx, data))) }
    }

    /// Create a node like [`ZooKeeper::create`], then leave an exists watch on the node that was
    /// created. The watch resolves when the node's data changes or the node is deleted.
    pub async fn create<D, A>(
        self,
        path: &str,
        data: D,
        acl: A,
        mode: CreateMode,
    ) -> Result<Result<(oneshot::Receiver<WatchedEvent>, String), error::Create>, failure::Error>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        let created = match self.0.create(path, data, acl, mode).await? {
            Ok(created) => created,
            Err(e) => return Ok(Err(e)),
        };
        let (rx, _) = self.0.with_watcher().exists(&created).await?;
        Ok(Ok((rx, created)))
    }
}
