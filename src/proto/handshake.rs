use super::request::{OpCode, Request};
use super::{Response, ZooKeeperTransport};
use crate::{SessionCredentials, SessionInfo};
use byteorder::{BigEndian, WriteBytesExt};
use failure::{bail, format_err};
use slog::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// Upper bound on a single handshake frame; a connect response is a few dozen bytes.
const MAX_HANDSHAKE_FRAME: usize = 1024;

/// Pause between two connection attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Everything the client presents (and learns) when it establishes a session.
#[derive(Clone)]
pub(crate) struct SessionParams {
    pub(crate) session_id: i64,
    pub(crate) password: Vec<u8>,
    /// Requested session timeout before the first handshake, negotiated timeout afterwards.
    pub(crate) timeout: Duration,
    pub(crate) last_zxid_seen: i64,
    pub(crate) read_only: bool,
}

impl SessionParams {
    pub(crate) fn new(
        timeout: Duration,
        resume: Option<SessionCredentials>,
        read_only: bool,
    ) -> Self {
        let (session_id, password) = match resume {
            Some(creds) => (creds.session_id, creds.password),
            None => (0, Vec::new()),
        };
        SessionParams {
            session_id,
            password,
            timeout,
            last_zxid_seen: 0,
            read_only,
        }
    }

    fn connect_request(&self) -> Request {
        Request::Connect {
            protocol_version: 0,
            last_zxid_seen: self.last_zxid_seen,
            timeout: self.timeout.as_millis() as i32,
            session_id: self.session_id,
            passwd: self.password.clone(),
            read_only: self.read_only,
        }
    }

    pub(crate) fn credentials(&self) -> SessionCredentials {
        SessionCredentials {
            session_id: self.session_id,
            password: self.password.clone(),
        }
    }
}

/// Why a session could not be (re-)established.
#[derive(Debug)]
pub(crate) enum EstablishError {
    /// The service refused the session we presented.
    Expired,
    /// No server accepted a handshake before the deadline.
    Unreachable(failure::Error),
}

/// A stream on which the handshake has completed.
pub(crate) struct Established<S> {
    pub(crate) stream: S,
    pub(crate) params: SessionParams,
    pub(crate) info: SessionInfo,
    /// Index of the address that answered, so failover can start from the next one.
    pub(crate) addr_index: usize,
}

async fn handshake<S>(stream: &mut S, params: &SessionParams) -> Result<Response, failure::Error>
where
    S: ZooKeeperTransport,
{
    // dummy length
    let mut outbox = vec![0; 4];
    params.connect_request().serialize_into(&mut outbox)?;
    let written = outbox.len() - 4;
    let mut length = &mut outbox[..4];
    length.write_i32::<BigEndian>(written as i32)?;

    stream.write_all(&outbox).await?;
    stream.flush().await?;

    let length = stream.read_i32().await?;
    if length < 0 || length as usize > MAX_HANDSHAKE_FRAME {
        bail!("bad handshake response length {}", length);
    }
    let mut inbox = vec![0; length as usize];
    stream.read_exact(&mut inbox).await?;
    Response::parse(OpCode::CreateSession, &mut &inbox[..])
}

/// Tries the addresses round-robin, starting at `start`, until one completes a handshake or
/// `deadline` passes.
pub(crate) async fn establish<S>(
    addrs: Vec<S::Addr>,
    start: usize,
    mut params: SessionParams,
    resuming: bool,
    deadline: Instant,
    logger: slog::Logger,
) -> Result<Established<S>, EstablishError>
where
    S: ZooKeeperTransport,
{
    if addrs.is_empty() {
        return Err(EstablishError::Unreachable(format_err!(
            "no addresses to connect to"
        )));
    }

    // a server that accepts the connection but never answers gets its share of the session
    // timeout before the next one is tried
    let per_server = params.timeout / addrs.len() as u32;
    let mut attempt = start;
    loop {
        let addr = addrs[attempt % addrs.len()].clone();
        debug!(logger, "attempting handshake"; "addr" => ?addr, "session_id" => params.session_id);

        let connecting = async {
            let mut stream = S::connect(addr.clone())
                .await
                .map_err(Into::<failure::Error>::into)?;
            let response = handshake(&mut stream, &params).await?;
            Ok::<_, failure::Error>((stream, response))
        };

        let attempt_deadline = deadline.min(Instant::now() + per_server);
        match tokio::time::timeout_at(attempt_deadline, connecting).await {
            Err(_) if attempt_deadline >= deadline => {
                return Err(EstablishError::Unreachable(format_err!(
                    "no server answered within the session timeout"
                )));
            }
            Err(_) => {
                info!(logger, "no handshake response; trying the next server"; "addr" => ?addr);
                attempt += 1;
            }
            Ok(Err(e)) => {
                info!(logger, "handshake failed: {}", e; "addr" => ?addr);
                if Instant::now() + RETRY_BACKOFF >= deadline {
                    return Err(EstablishError::Unreachable(e));
                }
                tokio::time::sleep(RETRY_BACKOFF).await;
                attempt += 1;
            }
            Ok(Ok((stream, response))) => {
                let (timeout, session_id, password, read_only) = match response {
                    Response::Connect {
                        timeout,
                        session_id,
                        password,
                        read_only,
                        ..
                    } => (timeout, session_id, password, read_only),
                    r => {
                        return Err(EstablishError::Unreachable(format_err!(
                            "got non-connect response to handshake: {:?}",
                            r
                        )))
                    }
                };

                if timeout <= 0 {
                    warn!(logger, "service refused session";
                          "session_id" => params.session_id, "addr" => ?addr);
                    return Err(EstablishError::Expired);
                }

                let resumed = resuming && session_id == params.session_id;
                params.session_id = session_id;
                params.password = password;
                params.timeout = Duration::from_millis(timeout as u64);
                params.read_only = read_only;

                info!(logger, "session established";
                      "session_id" => session_id,
                      "timeout_ms" => timeout,
                      "resumed" => resumed,
                      "addr" => ?addr
                );

                let info = SessionInfo {
                    credentials: params.credentials(),
                    timeout: params.timeout,
                    resumed,
                    read_only,
                };
                return Ok(Established {
                    stream,
                    params,
                    info,
                    addr_index: attempt % addrs.len(),
                });
            }
        }
    }
}

/// The first handshake of a session. A refused resumption falls back to a fresh session, which
/// the returned `SessionInfo` reports as not resumed.
pub(crate) async fn establish_initial<S>(
    addrs: Vec<S::Addr>,
    mut params: SessionParams,
    logger: slog::Logger,
) -> Result<Established<S>, EstablishError>
where
    S: ZooKeeperTransport,
{
    let deadline = Instant::now() + params.timeout;
    let resuming = params.session_id != 0;
    match establish(addrs.clone(), 0, params.clone(), resuming, deadline, logger.clone()).await {
        Err(EstablishError::Expired) if resuming => {
            warn!(logger, "session could not be resumed; starting a fresh one";
                  "session_id" => params.session_id);
            params.session_id = 0;
            params.password = Vec::new();
            params.last_zxid_seen = 0;
            establish(addrs, 0, params, false, deadline, logger).await
        }
        r => r,
    }
}
