use super::{
    active_packetizer::ActivePacketizer,
    handshake::{self, EstablishError, Established, SessionParams},
    watch::WatchDispatcher,
    Reply, Request, Response, ZooKeeperTransport,
};
use crate::{KeeperState, SessionInfo, SessionState, WatchedEvent, ZkError};
use failure::format_err;
use futures::{
    channel::{mpsc, oneshot},
    future::Either,
    ready, StreamExt, TryFutureExt,
};
use pin_project::pin_project;
use slog::{debug, error, info, trace, warn};
use std::{
    future::{self, Future},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::watch;
use tokio::time::Instant;

/// What callers can observe about the session without talking to the packetizer task.
#[derive(Clone, Debug)]
pub(crate) struct Status {
    pub(crate) state: SessionState,
    pub(crate) session: Option<SessionInfo>,
}

type Connecting<S> =
    Pin<Box<dyn Future<Output = Result<Established<S>, EstablishError>> + Send + 'static>>;

/// Owns the session: runs handshakes, frames requests onto the live connection, fails over
/// between addresses, and decides when the session is over.
#[pin_project]
pub(crate) struct Packetizer<S>
where
    S: ZooKeeperTransport,
{
    /// Ensemble addresses
    addrs: Vec<S::Addr>,

    /// Index into `addrs` of the server we are (or were last) connected to
    addr_index: usize,

    /// Current state
    #[pin]
    state: PacketizerState<S>,

    /// Session identity, negotiated timeout and last zxid, for re-connection
    params: SessionParams,

    /// Routes watch events and session events
    dispatcher: WatchDispatcher,

    /// Incoming requests
    rx: mpsc::UnboundedReceiver<(Request, Reply)>,

    /// Published session state
    status: watch::Sender<Status>,

    /// Next xid to issue
    xid: i32,

    logger: slog::Logger,

    exiting: bool,
}

impl<S> Packetizer<S>
where
    S: ZooKeeperTransport,
{
    /// Spawns the packetizer for a new session and returns the entry point for submitting
    /// requests to it. The session starts out `Connecting`; requests submitted before the
    /// handshake completes are sent once it does.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(
        addrs: Vec<S::Addr>,
        params: SessionParams,
        operation_timeout: Duration,
        log: slog::Logger,
        default_watcher: mpsc::UnboundedSender<WatchedEvent>,
    ) -> Enqueuer {
        let (tx, rx) = mpsc::unbounded();
        let (status, status_rx) = watch::channel(Status {
            state: SessionState::Connecting,
            session: None,
        });

        let connecting: Connecting<S> = Box::pin(handshake::establish_initial::<S>(
            addrs.clone(),
            params.clone(),
            log.clone(),
        ));

        let exitlogger = log.clone();
        tokio::spawn(
            Packetizer {
                addrs,
                addr_index: 0,
                state: PacketizerState::Connecting(connecting),
                params,
                dispatcher: WatchDispatcher::new(default_watcher, log.clone()),
                rx,
                status,
                xid: 1,
                logger: log,
                exiting: false,
            }
            .map_err(move |e| {
                error!(exitlogger, "packetizer exiting: {:?}", e);
                drop(e);
            }),
        );

        Enqueuer {
            tx,
            status: status_rx,
            operation_timeout,
        }
    }
}

#[pin_project(project = PacketizerStateProj)]
enum PacketizerState<S> {
    Connecting(Connecting<S>),
    Connected(#[pin] ActivePacketizer<S>),
    /// The session is over. Requests still arriving are answered with the code.
    Terminated(ZkError),
}

fn next_xid(xid: &mut i32) -> i32 {
    let issued = *xid;
    // negative xids are reserved for notifications and heartbeats
    *xid = xid.wrapping_add(1).max(1);
    issued
}

impl<S> Packetizer<S>
where
    S: ZooKeeperTransport,
{
    /// Moves queued requests onto the wire. Returns `Ready(Err(()))` once every handle to the
    /// session is gone, and `Ready(Ok(()))` once a `CloseSession` has been queued.
    fn poll_enqueue(
        ap: &mut ActivePacketizer<S>,
        rx: &mut mpsc::UnboundedReceiver<(Request, Reply)>,
        dispatcher: &mut WatchDispatcher,
        xid: &mut i32,
        logger: &slog::Logger,
        cx: &mut Context,
    ) -> Poll<Result<(), ()>> {
        loop {
            let (mut item, reply) = match ready!(rx.poll_next_unpin(cx)) {
                Some((request, reply)) => (request, reply),
                None => return Poll::Ready(Err(())),
            };
            let xid = next_xid(xid);
            debug!(logger, "enqueueing request {:?}", item; "xid" => xid);

            dispatcher.take_pending(xid, &mut item);

            let closing = matches!(item, Request::CloseSession);
            ap.enqueue(xid, item, reply);
            if closing {
                return Poll::Ready(Ok(()));
            }
        }
    }

    /// The handshake completed: start framing on the new connection.
    fn install(self: Pin<&mut Self>, established: Established<S>) {
        let mut this = self.project();
        let Established {
            stream,
            params,
            info,
            addr_index,
        } = established;

        let relative_zxid = this.params.last_zxid_seen;
        *this.addr_index = addr_index;
        *this.params = params;

        let mut ap = ActivePacketizer::new(stream, this.params.timeout, relative_zxid);

        // watches armed on an earlier connection of this session must be re-registered
        if let Some(request) = this.dispatcher.rearm(relative_zxid) {
            let xid = next_xid(this.xid);
            trace!(this.logger, "re-registering watches"; "xid" => xid, "zxid" => relative_zxid);
            let log = this.logger.clone();
            ap.enqueue(
                xid,
                request,
                Reply::Callback(Box::new(move |r| {
                    if let Err(e) = r {
                        warn!(log, "failed to re-register watches: {:?}", e);
                    }
                })),
            );
        }

        this.state.set(PacketizerState::Connected(ap));
        this.dispatcher.connection_state(if info.read_only {
            KeeperState::ConnectedReadOnly
        } else {
            KeeperState::SyncConnected
        });
        this.status.send_replace(Status {
            state: SessionState::Connected,
            session: Some(info),
        });
    }

    /// The connection broke: fail what is in flight and start looking for a server that will
    /// take the session back before it times out.
    fn reconnect(self: Pin<&mut Self>, e: failure::Error) {
        let mut this = self.project();
        if let PacketizerStateProj::Connected(ap) = this.state.as_mut().project() {
            let ap = ap.get_mut();
            ap.fail_outstanding(ZkError::ConnectionLoss, this.dispatcher);
            this.params.last_zxid_seen = ap.last_zxid_seen;
        }

        info!(this.logger, "connection lost; reconnecting: {}", e;
              "session_id" => this.params.session_id,
              "last_zxid" => this.params.last_zxid_seen
        );

        this.dispatcher.connection_state(KeeperState::Disconnected);
        this.status
            .send_modify(|status| status.state = SessionState::Disconnected);

        let deadline = Instant::now() + this.params.timeout;
        let retry = handshake::establish::<S>(
            this.addrs.clone(),
            *this.addr_index + 1,
            this.params.clone(),
            true,
            deadline,
            this.logger.clone(),
        );

        // dropping the old state will also close the old connection
        this.state
            .set(PacketizerState::Connecting(Box::pin(retry)));
    }

    /// The session is over, either expired or closed. Every request and watch still waiting is
    /// resolved, and no further request will be accepted.
    fn terminate(self: Pin<&mut Self>, state: SessionState) {
        let mut this = self.project();
        let (code, keeper_state) = match state {
            SessionState::Expired => (ZkError::SessionExpired, KeeperState::Expired),
            _ => (ZkError::ConnectionLoss, KeeperState::Closed),
        };

        if let PacketizerStateProj::Connected(ap) = this.state.as_mut().project() {
            ap.get_mut().fail_outstanding(code, this.dispatcher);
        }
        this.state.set(PacketizerState::Terminated(code));

        this.dispatcher.terminate(keeper_state);
        this.status.send_modify(|status| status.state = state);
    }
}

impl<S> Future for Packetizer<S>
where
    S: ZooKeeperTransport,
{
    type Output = Result<(), failure::Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        loop {
            trace!(self.logger, "packetizer polled");
            let mut this = self.as_mut().project();
            match this.state.as_mut().project() {
                PacketizerStateProj::Connecting(connecting) => {
                    match ready!(connecting.as_mut().poll(cx)) {
                        Ok(established) => self.as_mut().install(established),
                        Err(EstablishError::Expired) => {
                            info!(self.logger, "session expired");
                            self.as_mut().terminate(SessionState::Expired);
                        }
                        Err(EstablishError::Unreachable(e)) => {
                            error!(self.logger, "could not reach the service: {}", e);
                            self.as_mut().terminate(SessionState::Expired);
                        }
                    }
                }
                PacketizerStateProj::Connected(ap) => {
                    let ap = ap.get_mut();
                    if !*this.exiting {
                        trace!(this.logger, "poll_enqueue");
                        match Self::poll_enqueue(
                            ap,
                            this.rx,
                            this.dispatcher,
                            this.xid,
                            this.logger,
                            cx,
                        ) {
                            Poll::Pending => {}
                            Poll::Ready(Ok(())) => {
                                debug!(this.logger, "session close requested");
                                *this.exiting = true;
                            }
                            Poll::Ready(Err(())) => {
                                // no more requests will be enqueued
                                debug!(this.logger, "all handles dropped; closing session");
                                *this.exiting = true;
                                let xid = next_xid(this.xid);
                                let log = this.logger.clone();
                                ap.enqueue(
                                    xid,
                                    Request::CloseSession,
                                    Reply::Callback(Box::new(move |r| {
                                        trace!(log, "close response: {:?}", r);
                                    })),
                                );
                            }
                        }
                    }

                    match ap.poll(cx, *this.exiting, this.logger, this.dispatcher) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Ok(())) => {
                            self.as_mut().terminate(SessionState::Closed);
                        }
                        Poll::Ready(Err(e)) => {
                            if *this.exiting {
                                debug!(this.logger, "connection lost during exit; not reconnecting: {}", e);
                                self.as_mut().terminate(SessionState::Closed);
                            } else {
                                self.as_mut().reconnect(e);
                            }
                        }
                    }
                }
                PacketizerStateProj::Terminated(code) => {
                    // keep answering on this task until every handle is gone
                    let code = *code;
                    while let Some((request, reply)) = ready!(this.rx.poll_next_unpin(cx)) {
                        trace!(this.logger, "refusing request {:?}: {}", request, code);
                        reply.send(Err(code));
                    }
                    debug!(this.logger, "all handles dropped; packetizer exiting");
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Enqueuer {
    tx: mpsc::UnboundedSender<(Request, Reply)>,
    status: watch::Receiver<Status>,
    operation_timeout: Duration,
}

impl Enqueuer {
    /// Requests against a finished session are answered here, without any I/O.
    fn refuse(&self) -> Option<Result<Result<Response, ZkError>, failure::Error>> {
        match self.status.borrow().state {
            SessionState::Expired => Some(Ok(Err(ZkError::SessionExpired))),
            SessionState::Closed => Some(Err(format_err!("session has been closed"))),
            _ => None,
        }
    }

    /// Queues `request` right away, so requests are sent in the order this is called, and
    /// returns a future for the response.
    ///
    /// The future gives up with `OperationTimeout` after the operation timeout. The request may
    /// still reach the service and take effect after that.
    pub(crate) fn enqueue(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Result<Response, ZkError>, failure::Error>> {
        if let Some(refused) = self.refuse() {
            return Either::Right(future::ready(refused));
        }

        let (tx, rx) = oneshot::channel();
        match self.tx.unbounded_send((request, Reply::Waiter(tx))) {
            Ok(()) => {
                let operation_timeout = self.operation_timeout;
                Either::Left(async move {
                    match tokio::time::timeout(operation_timeout, rx).await {
                        Ok(Ok(response)) => Ok(response),
                        // the packetizer went away with our request
                        Ok(Err(oneshot::Canceled)) => Ok(Err(ZkError::ConnectionLoss)),
                        Err(_) => Ok(Err(ZkError::OperationTimeout)),
                    }
                })
            }
            Err(e) => Either::Right(future::ready(Err(format_err!(
                "failed to enqueue new request: {:?}",
                e
            )))),
        }
    }

    /// Queues `request` and hands its outcome to `callback` on the packetizer task, never on
    /// the caller. Once the session is over the packetizer answers with the terminal code.
    ///
    /// Fails, dropping `callback` uncalled, only if the packetizer task itself is gone.
    pub(crate) fn submit(
        &self,
        request: Request,
        callback: Box<dyn FnOnce(Result<Response, ZkError>) + Send + 'static>,
    ) -> Result<(), failure::Error> {
        self.tx
            .unbounded_send((request, Reply::Callback(callback)))
            .map_err(|e| format_err!("session task has stopped: {:?}", e.into_inner().0))
    }

    pub(crate) fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Waits until the session state satisfies `done`, or the packetizer is gone.
    pub(crate) async fn wait_for<F>(&self, done: F) -> Status
    where
        F: Fn(SessionState) -> bool,
    {
        let mut status = self.status.clone();
        loop {
            {
                let current = status.borrow_and_update();
                if done(current.state) {
                    return current.clone();
                }
            }
            if status.changed().await.is_err() {
                return status.borrow().clone();
            }
        }
    }
}
