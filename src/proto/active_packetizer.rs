use super::request::{OpCode, Request};
use super::response::ReadFrom;
use super::watch::WatchDispatcher;
use super::{Reply, Response};
use crate::{WatchedEvent, ZkError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use failure::{bail, format_err};
use slog::{debug, info, trace};
use std::collections::HashMap;
use std::io;
use std::ops::Range;
use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// xid the service uses for watch notifications.
const WATCH_XID: i32 = -1;
/// xid of heartbeats.
const PING_XID: i32 = -2;

/// How much to grow the inbox by when a frame is incomplete.
const READ_CHUNK: usize = 4096;

/// Appends one length-prefixed request frame to `outbox`.
fn frame_request(outbox: &mut Vec<u8>, xid: i32, request: &Request) -> io::Result<()> {
    let start = outbox.len();
    // length, patched below
    outbox.extend_from_slice(&[0; 4]);
    outbox.write_i32::<BigEndian>(xid)?;
    outbox.write_i32::<BigEndian>(request.opcode() as i32)?;
    request.serialize_into(outbox)?;

    let written = outbox.len() - start - 4;
    let mut length = &mut outbox[start..start + 4];
    length.write_i32::<BigEndian>(written as i32)
}

/// Appends a heartbeat frame, which is all header.
fn frame_ping(outbox: &mut Vec<u8>) -> io::Result<()> {
    outbox.write_i32::<BigEndian>(8)?;
    outbox.write_i32::<BigEndian>(PING_XID)?;
    outbox.write_i32::<BigEndian>(OpCode::Ping as i32)
}

/// Framing state for one live connection of a session.
pub(super) struct ActivePacketizer<S> {
    stream: Pin<Box<S>>,

    heartbeat: Pin<Box<Sleep>>,
    heartbeat_every: Duration,

    /// Fires when nothing at all has been received for `read_timeout`.
    silence: Pin<Box<Sleep>>,
    read_timeout: Duration,

    /// Framed requests, sent up to `outstart`.
    outbox: Vec<u8>,
    outstart: usize,

    /// Received bytes, consumed up to `instart`.
    inbox: Vec<u8>,
    instart: usize,

    /// Requests on the wire, by xid.
    awaiting: HashMap<i32, (OpCode, Reply)>,

    /// Highest zxid the service has told us about.
    pub(super) last_zxid_seen: i64,
}

impl<S> ActivePacketizer<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Wraps a stream whose handshake has completed.
    ///
    /// The connection is given up on once nothing has been received for two thirds of the
    /// negotiated session timeout, which leaves the last third to find another server before the
    /// service expires the session. Heartbeats go out after half that long without write
    /// traffic, so a healthy server always has something to answer in time.
    pub(super) fn new(stream: S, session_timeout: Duration, last_zxid_seen: i64) -> Self {
        let read_timeout = session_timeout * 2 / 3;
        let heartbeat_every = read_timeout / 2;
        ActivePacketizer {
            stream: Box::pin(stream),
            heartbeat: Box::pin(tokio::time::sleep(heartbeat_every)),
            heartbeat_every,
            silence: Box::pin(tokio::time::sleep(read_timeout)),
            read_timeout,
            outbox: Vec::new(),
            outstart: 0,
            inbox: Vec::new(),
            instart: 0,
            awaiting: HashMap::new(),
            last_zxid_seen,
        }
    }

    pub(super) fn enqueue(&mut self, xid: i32, request: Request, reply: Reply) {
        let rollback = self.outbox.len();
        if frame_request(&mut self.outbox, xid, &request).is_err() {
            self.outbox.truncate(rollback);
            reply.send(Err(ZkError::MarshallingError));
            return;
        }

        let old = self.awaiting.insert(xid, (request.opcode(), reply));
        debug_assert!(old.is_none(), "xid {} issued twice", xid);
    }

    /// Fails every request still waiting for a response. Their watches are never armed.
    pub(super) fn fail_outstanding(&mut self, err: ZkError, dispatcher: &mut WatchDispatcher) {
        for (xid, (_, reply)) in self.awaiting.drain() {
            dispatcher.abandon(xid);
            reply.send(Err(err));
        }
    }

    fn reset_heartbeat(&mut self) {
        let next = Instant::now() + self.heartbeat_every;
        self.heartbeat.as_mut().reset(next);
    }

    fn poll_write(
        &mut self,
        cx: &mut Context,
        exiting: bool,
        logger: &slog::Logger,
    ) -> Poll<Result<(), failure::Error>> {
        if self.outstart < self.outbox.len() {
            while self.outstart < self.outbox.len() {
                let n = ready!(self
                    .stream
                    .as_mut()
                    .poll_write(cx, &self.outbox[self.outstart..])?);
                if n == 0 {
                    return Poll::Ready(Err(format_err!("connection refused further writes")));
                }
                self.outstart += n;
            }
            self.outbox.clear();
            self.outstart = 0;

            // heartbeats are due after a quiet period on the write side
            trace!(logger, "resetting heartbeat timer");
            self.reset_heartbeat();
        }

        ready!(self.stream.as_mut().poll_flush(cx)?);

        if exiting {
            debug!(logger, "shutting down writer");
            ready!(self.stream.as_mut().poll_shutdown(cx)?);
        }

        Poll::Ready(Ok(()))
    }

    /// Reads until a whole frame is buffered and returns where its body sits in the inbox, or
    /// `None` once the service closed the stream cleanly.
    fn poll_frame(&mut self, cx: &mut Context) -> Poll<Result<Option<Range<usize>>, failure::Error>> {
        loop {
            let buffered = &self.inbox[self.instart..];
            if buffered.len() >= 4 {
                let length = (&buffered[..4]).read_i32::<BigEndian>()?;
                if length < 0 {
                    return Poll::Ready(Err(format_err!("negative frame length {}", length)));
                }
                let end = self.instart + 4 + length as usize;
                if self.inbox.len() >= end {
                    let body = self.instart + 4..end;
                    self.instart = end;
                    return Poll::Ready(Ok(Some(body)));
                }
            }

            self.inbox.drain(..self.instart);
            self.instart = 0;

            let filled = self.inbox.len();
            self.inbox.resize(filled + READ_CHUNK, 0);
            let mut buf = ReadBuf::new(&mut self.inbox[filled..]);
            let res = self.stream.as_mut().poll_read(cx, &mut buf);
            let n = buf.filled().len();
            self.inbox.truncate(filled + n);

            ready!(res)?;
            if n == 0 {
                let left = self.inbox.len() - self.instart;
                if left == 0 {
                    return Poll::Ready(Ok(None));
                }
                return Poll::Ready(Err(format_err!("connection closed with {} bytes of a frame buffered", left)));
            }
        }
    }

    /// Routes one reply or notification.
    fn handle_frame(
        &mut self,
        body: Range<usize>,
        dispatcher: &mut WatchDispatcher,
        logger: &slog::Logger,
    ) -> Result<(), failure::Error> {
        let mut buf = &self.inbox[body];
        let xid = buf.read_i32::<BigEndian>()?;
        let zxid = buf.read_i64::<BigEndian>()?;
        let code = ZkError::from(buf.read_i32::<BigEndian>()?);

        if zxid > self.last_zxid_seen {
            trace!(logger, "zxid advanced"; "from" => self.last_zxid_seen, "to" => zxid);
            self.last_zxid_seen = zxid;
        }

        match xid {
            WATCH_XID => {
                let event = WatchedEvent::read_from(&mut buf)?;
                trace!(logger, "got watcher event {:?}", event);
                dispatcher.dispatch(event);
            }
            PING_XID if code == ZkError::Ok => trace!(logger, "heartbeat acknowledged"),
            PING_XID => bail!("bad response to heartbeat: {}", code),
            _ => {
                let (opcode, reply) = self
                    .awaiting
                    .remove(&xid)
                    .ok_or_else(|| format_err!("response to unknown request (xid {})", xid))?;

                if code != ZkError::Ok {
                    dispatcher.settle(xid, opcode, Some(code));
                    info!(logger, "request failed: {}", code; "xid" => xid, "opcode" => ?opcode);
                    reply.send(Err(code));
                    return Ok(());
                }

                match Response::parse(opcode, &mut buf) {
                    Ok(response) => {
                        dispatcher.settle(xid, opcode, None);
                        debug!(logger, "handling server response: {:?}", response;
                               "xid" => xid, "opcode" => ?opcode);
                        reply.send(Ok(response));
                    }
                    Err(e) => {
                        dispatcher.abandon(xid);
                        reply.send(Err(ZkError::MarshallingError));
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    fn poll_read(
        &mut self,
        cx: &mut Context,
        dispatcher: &mut WatchDispatcher,
        logger: &slog::Logger,
    ) -> Poll<Result<(), failure::Error>> {
        loop {
            match ready!(self.poll_frame(cx))? {
                Some(body) => {
                    let next = Instant::now() + self.read_timeout;
                    self.silence.as_mut().reset(next);
                    self.handle_frame(body, dispatcher, logger)?;
                }
                None => {
                    debug!(logger, "server closed connection");
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }

    /// Drives the connection. Resolves with `Ok` once the service closed it after we asked to
    /// exit, and with an error if it went away otherwise.
    pub(super) fn poll(
        &mut self,
        cx: &mut Context,
        exiting: bool,
        logger: &slog::Logger,
        dispatcher: &mut WatchDispatcher,
    ) -> Poll<Result<(), failure::Error>> {
        let read = self.poll_read(cx, dispatcher, logger)?;

        // a half-open connection or a partitioned server never says goodbye
        if self.silence.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(format_err!(
                "nothing received from server for {:?}",
                self.read_timeout
            )));
        }

        if self.heartbeat.as_mut().poll(cx).is_ready() {
            // pending requests already count as traffic
            if self.outbox.is_empty() {
                trace!(logger, "sending heartbeat");
                frame_ping(&mut self.outbox)?;
            }
            self.reset_heartbeat();
        }

        let write = self.poll_write(cx, exiting, logger)?;

        // a reset timer only registers for its new deadline when polled again
        if self.heartbeat.as_mut().poll(cx).is_ready() {
            cx.waker().wake_by_ref();
        }

        match (read, write) {
            (Poll::Ready(()), Poll::Ready(())) if exiting => {
                debug!(logger, "connection closed after exit");
                Poll::Ready(Ok(()))
            }
            (Poll::Ready(()), Poll::Ready(())) => Poll::Ready(Err(format_err!(
                "server closed the connection"
            ))),
            (Poll::Ready(()), Poll::Pending) => Poll::Ready(Err(format_err!(
                "server closed the connection with requests unsent"
            ))),
            _ => Poll::Pending,
        }
    }
}
