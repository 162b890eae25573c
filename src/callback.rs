//! The non-blocking form of the node operations.

use slog::trace;
use std::borrow::Cow;

use crate::proto::{Request, Response, Watch};
use crate::{path, Acl, CreateMode, Stat, ZkError, ZooKeeper};

/// A node operation to hand to [`ZooKeeper::submit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// See [`ZooKeeper::create`].
    Create {
        /// Requested path; for sequential modes, the prefix of the final name.
        path: String,
        /// Initial contents.
        data: Vec<u8>,
        /// Access control list of the new node. Must not be empty.
        acl: Vec<Acl>,
        /// Lifetime and naming of the new node. TTL modes are not accepted here.
        mode: CreateMode,
    },
    /// See [`ZooKeeper::delete`].
    Delete {
        /// Node to delete.
        path: String,
        /// Version the node must have, or `None` for any.
        version: Option<i32>,
    },
    /// See [`ZooKeeper::exists`].
    Exists {
        /// Node to look up.
        path: String,
    },
    /// See [`ZooKeeper::get_data`].
    GetData {
        /// Node to read.
        path: String,
    },
    /// See [`ZooKeeper::set_data`].
    SetData {
        /// Node to write.
        path: String,
        /// New contents.
        data: Vec<u8>,
        /// Version the node must have, or `None` for any.
        version: Option<i32>,
    },
    /// See [`ZooKeeper::get_children`].
    GetChildren {
        /// Node whose children to list.
        path: String,
    },
    /// See [`ZooKeeper::sync`].
    Sync {
        /// Path to synchronize.
        path: String,
    },
}

impl Op {
    /// The path the operation targets.
    pub fn path(&self) -> &str {
        match *self {
            Op::Create { ref path, .. }
            | Op::Delete { ref path, .. }
            | Op::Exists { ref path }
            | Op::GetData { ref path }
            | Op::SetData { ref path, .. }
            | Op::GetChildren { ref path }
            | Op::Sync { ref path } => path,
        }
    }

    fn into_request(self) -> Result<Request, failure::Error> {
        let sequential = matches!(&self, Op::Create { mode, .. } if mode.is_sequential());
        path::validate(self.path(), sequential)?;

        Ok(match self {
            Op::Create {
                path,
                data,
                acl,
                mode,
            } => {
                if mode.is_ttl() {
                    failure::bail!("{:?} needs a time-to-live; use create_ttl", mode);
                }
                Request::Create {
                    path,
                    data: Cow::Owned(data),
                    acl: Cow::Owned(acl),
                    mode,
                    ttl: None,
                }
            }
            Op::Delete { path, version } => Request::Delete {
                path,
                version: version.unwrap_or(-1),
            },
            Op::Exists { path } => Request::Exists {
                path,
                watch: Watch::None,
            },
            Op::GetData { path } => Request::GetData {
                path,
                watch: Watch::None,
            },
            Op::SetData {
                path,
                data,
                version,
            } => Request::SetData {
                path,
                data: Cow::Owned(data),
                version: version.unwrap_or(-1),
            },
            Op::GetChildren { path } => Request::GetChildren {
                path,
                watch: Watch::None,
            },
            Op::Sync { path } => Request::Sync { path },
        })
    }
}

/// The result an operation completed with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpPayload {
    /// The operation failed, or succeeded without a result (delete, sync).
    None,
    /// The final path of a created node.
    Path(String),
    /// The node's metadata (exists, set_data).
    Stat(Stat),
    /// The node's contents and metadata.
    Data(Vec<u8>, Stat),
    /// The names of the node's children.
    Children(Vec<String>),
}

impl OpPayload {
    fn from_response(response: Response) -> Self {
        match response {
            Response::Stat(stat) => OpPayload::Stat(stat),
            Response::GetData { bytes, stat } => OpPayload::Data(bytes, stat),
            Response::Strings(children) => OpPayload::Children(children),
            Response::String(path) => OpPayload::Path(path),
            Response::Empty | Response::Connect { .. } => OpPayload::None,
        }
    }
}

/// What a completion callback receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion<C> {
    /// [`ZkError::Ok`] on success, otherwise what went wrong.
    pub code: ZkError,
    /// The path the operation was submitted with. For a sequential create, the final path is in
    /// the payload.
    pub path: String,
    /// The context value given to `submit`.
    pub ctx: C,
    /// The operation's result; [`OpPayload::None`] unless `code` is `Ok`.
    pub payload: OpPayload,
}

impl ZooKeeper {
    /// Queue `op` without waiting for it.
    ///
    /// `callback` is invoked exactly once, on the client's background task, with the outcome and
    /// `ctx`. Completions run in the order the service answered, which for one session is the
    /// order the operations were submitted. A callback should return quickly: no other response
    /// or watch event of the session is processed while it runs.
    ///
    /// `submit` returns before the callback runs, even on an expired or closed session.
    /// Connectivity failures are reported through the callback too (`ConnectionLoss`,
    /// `SessionExpired`). Only a malformed path, or a background task that is no longer running,
    /// fails the call itself; the callback is then dropped without being called. No operation
    /// timeout applies: if the connection is lost, the callback sees `ConnectionLoss`.
    pub fn submit<C, F>(&self, op: Op, ctx: C, callback: F) -> Result<(), failure::Error>
    where
        C: Send + 'static,
        F: FnOnce(Completion<C>) + Send + 'static,
    {
        let path = op.path().to_string();
        let request = op.into_request()?;
        trace!(self.logger, "submit {:?}", request);

        self.connection.submit(
            request,
            Box::new(move |res| {
                let (code, payload) = match res {
                    Ok(response) => (ZkError::Ok, OpPayload::from_response(response)),
                    Err(e) => (e, OpPayload::None),
                };
                callback(Completion {
                    code,
                    path,
                    ctx,
                    payload,
                })
            }),
        )
    }
}
