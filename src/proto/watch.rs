use super::request::{OpCode, Request};
use crate::{KeeperState, WatchedEvent, WatchedEventType, ZkError};
use futures::channel::{mpsc, oneshot};
use slog::{debug, trace};
use std::collections::HashMap;
use std::mem;

#[derive(Debug)]
pub(crate) enum Watch {
    None,
    Global,
    Custom(oneshot::Sender<WatchedEvent>),
}

impl Watch {
    pub(crate) fn to_u8(&self) -> u8 {
        if let Watch::None = *self {
            0
        } else {
            1
        }
    }
}

/// Describes what a `Watch` is looking for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum WatchType {
    /// Watching for changes to children.
    Child,
    /// Watching for changes to data.
    Data,
    /// Watching for the creation of a node at the given path.
    Exist,
}

impl WatchType {
    const ALL: [WatchType; 3] = [WatchType::Data, WatchType::Exist, WatchType::Child];

    fn triggered_by(self, event: WatchedEventType) -> bool {
        match (self, event) {
            (WatchType::Child, WatchedEventType::NodeDeleted)
            | (WatchType::Child, WatchedEventType::NodeChildrenChanged) => true,
            (WatchType::Child, _) => false,
            (WatchType::Data, WatchedEventType::NodeDeleted)
            | (WatchType::Data, WatchedEventType::NodeDataChanged) => true,
            (WatchType::Data, _) => false,
            (WatchType::Exist, WatchedEventType::NodeCreated)
            | (WatchType::Exist, WatchedEventType::NodeDataChanged)
            | (WatchType::Exist, WatchedEventType::NodeDeleted) => true,
            (WatchType::Exist, _) => false,
        }
    }
}

/// A watch that has been armed but not yet fired.
#[derive(Debug)]
enum Target {
    /// Deliver to the default watcher.
    Global,
    Custom(oneshot::Sender<WatchedEvent>),
}

/// Routes notifications to one-shot watches and the default watcher.
///
/// Owned by the packetizer task, so every event (and every completion callback) is handled on
/// one logical thread in the order the transport received it.
pub(crate) struct WatchDispatcher {
    /// Armed watches, by (path, class).
    watchers: HashMap<(String, WatchType), Vec<Target>>,

    /// Watches whose request is still in flight (xid -> watch to arm on success).
    pending: HashMap<i32, (String, Target, WatchType)>,

    /// Watcher to send session events, global watches and unclaimed events to.
    default_watcher: mpsc::UnboundedSender<WatchedEvent>,

    logger: slog::Logger,
}

impl WatchDispatcher {
    pub(crate) fn new(
        default_watcher: mpsc::UnboundedSender<WatchedEvent>,
        logger: slog::Logger,
    ) -> Self {
        WatchDispatcher {
            watchers: Default::default(),
            pending: Default::default(),
            default_watcher,
            logger,
        }
    }

    /// Takes the watch out of a watch-capable request so it can be armed once the request
    /// succeeds. The request keeps a `Watch::Global` marker so the flag still goes on the wire.
    pub(crate) fn take_pending(&mut self, xid: i32, item: &mut Request) {
        let (path, watch, wtype) = match *item {
            Request::GetData {
                ref path,
                ref mut watch,
            } => (path, watch, WatchType::Data),
            Request::GetChildren {
                ref path,
                ref mut watch,
            } => (path, watch, WatchType::Child),
            Request::Exists {
                ref path,
                ref mut watch,
            } => (path, watch, WatchType::Exist),
            _ => return,
        };

        let target = match mem::replace(watch, Watch::Global) {
            Watch::None => {
                *watch = Watch::None;
                return;
            }
            Watch::Global => Target::Global,
            Watch::Custom(tx) => Target::Custom(tx),
        };

        trace!(
            self.logger,
            "adding pending watcher";
            "xid" => xid,
            "path" => path,
            "wtype" => ?wtype
        );
        self.pending.insert(xid, (path.to_string(), target, wtype));
    }

    /// Arms (or drops) the watch that rode along with request `xid`.
    ///
    /// Watches are only added for successful operations, except for an `exists` call that fails
    /// with `NoNode`: that one waits for the node to be created.
    pub(crate) fn settle(&mut self, xid: i32, opcode: OpCode, err: Option<ZkError>) {
        if let Some((path, target, wtype)) = self.pending.remove(&xid) {
            if err.is_none() || (opcode == OpCode::Exists && err == Some(ZkError::NoNode)) {
                trace!(self.logger, "pending watcher turned into real watcher"; "xid" => xid);
                self.watchers
                    .entry((path, wtype))
                    .or_insert_with(Vec::new)
                    .push(target);
            } else {
                trace!(self.logger,
                       "pending watcher not turned into real watcher: {:?}",
                       err;
                       "xid" => xid
                );
            }
        }
    }

    /// Delivers a node event to every watch it triggers, and discards those watches.
    ///
    /// The default watcher sees the event if a global watch claimed it, or if no custom watch
    /// did.
    pub(crate) fn dispatch(&mut self, e: WatchedEvent) {
        let path = match e.path {
            Some(ref path) => path.clone(),
            None => {
                self.notify_default(e);
                return;
            }
        };

        let mut claimed = false;
        let mut global = false;
        for wtype in WatchType::ALL.iter() {
            if !wtype.triggered_by(e.event_type) {
                continue;
            }

            if let Some(targets) = self.watchers.remove(&(path.clone(), *wtype)) {
                trace!(self.logger,
                       "found waiting watchers";
                       "n" => targets.len(), "wtype" => ?wtype
                );
                for target in targets {
                    match target {
                        Target::Global => global = true,
                        Target::Custom(tx) => {
                            claimed = true;
                            // NOTE: ignore the case where the receiver has been dropped
                            let _ = tx.send(e.clone());
                        }
                    }
                }
            }
        }

        if global || !claimed {
            self.notify_default(e);
        }
    }

    /// Reports a connection-state change to the default watcher.
    pub(crate) fn connection_state(&mut self, state: KeeperState) {
        debug!(self.logger, "session state changed"; "state" => ?state);
        self.notify_default(WatchedEvent::state(state));
    }

    /// Forgets the watches of requests that will never be answered.
    pub(crate) fn abandon(&mut self, xid: i32) {
        self.pending.remove(&xid);
    }

    /// Builds the request that re-registers every armed watch on a new connection to the same
    /// session.
    pub(crate) fn rearm(&self, relative_zxid: i64) -> Option<Request> {
        if self.watchers.is_empty() {
            return None;
        }

        let mut data_watches = Vec::new();
        let mut exist_watches = Vec::new();
        let mut child_watches = Vec::new();
        for (path, wtype) in self.watchers.keys() {
            match *wtype {
                WatchType::Data => data_watches.push(path.clone()),
                WatchType::Exist => exist_watches.push(path.clone()),
                WatchType::Child => child_watches.push(path.clone()),
            }
        }

        Some(Request::SetWatches {
            relative_zxid,
            data_watches,
            exist_watches,
            child_watches,
        })
    }

    /// Ends the session for every watch: custom watches receive a final event carrying `state`,
    /// then the default watcher does.
    pub(crate) fn terminate(&mut self, state: KeeperState) {
        let armed = mem::take(&mut self.watchers)
            .into_iter()
            .flat_map(|((path, _), targets)| targets.into_iter().map(move |t| (path.clone(), t)));
        let pending = mem::take(&mut self.pending)
            .into_iter()
            .map(|(_, (path, target, _))| (path, target));

        for (path, target) in armed.chain(pending) {
            if let Target::Custom(tx) = target {
                let _ = tx.send(WatchedEvent {
                    event_type: WatchedEventType::None,
                    keeper_state: state,
                    path: Some(path),
                });
            }
        }

        self.connection_state(state);
    }

    fn notify_default(&mut self, e: WatchedEvent) {
        // NOTE: ignoring error, because the user may not care about events
        let _ = self.default_watcher.unbounded_send(e);
    }
}
