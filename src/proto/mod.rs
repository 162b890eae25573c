use async_trait::async_trait;
use futures::channel::oneshot;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

mod active_packetizer;
mod error;
mod handshake;
mod packetizer;
mod request;
mod response;
mod watch;

pub use self::error::{ErrorKind, ZkError};
pub(crate) use self::handshake::SessionParams;
pub(crate) use self::packetizer::{Enqueuer, Packetizer};
pub(crate) use self::request::Request;
pub(crate) use self::response::Response;
pub(crate) use self::watch::Watch;

/// A byte stream that can carry a session to the coordination service.
#[async_trait]
pub trait ZooKeeperTransport: AsyncRead + AsyncWrite + Unpin + Sized + Send + 'static {
    /// How to reach one server of the ensemble.
    type Addr: Send + Sync + Clone + fmt::Debug + 'static;
    /// The error `connect` fails with.
    type ConnectError: Into<failure::Error> + Send + 'static;

    /// Opens a new stream to `addr`.
    async fn connect(addr: Self::Addr) -> Result<Self, Self::ConnectError>;
}

#[async_trait]
impl ZooKeeperTransport for TcpStream {
    type Addr = SocketAddr;
    type ConnectError = tokio::io::Error;

    async fn connect(addr: SocketAddr) -> Result<Self, Self::ConnectError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Where the answer to a request goes.
pub(crate) enum Reply {
    /// A caller awaiting the response.
    Waiter(oneshot::Sender<Result<Response, ZkError>>),
    /// A completion callback, run on the packetizer task.
    Callback(Box<dyn FnOnce(Result<Response, ZkError>) + Send + 'static>),
}

impl Reply {
    pub(crate) fn send(self, response: Result<Response, ZkError>) {
        match self {
            // if receiver doesn't care, we don't either
            Reply::Waiter(tx) => {
                let _ = tx.send(response);
            }
            Reply::Callback(f) => f(response),
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Reply::Waiter(_) => write!(f, "Reply::Waiter"),
            Reply::Callback(_) => write!(f, "Reply::Callback"),
        }
    }
}
