//! RPC substrate: bincode-framed values over TCP, one call per connection.
//!
//! A [`Stub`] is the client half: it opens a fresh connection, writes the
//! serialized request, half-closes its write side, and reads back a single
//! response value. A [`Skeleton`] is the server half: it owns a listening
//! socket, accepts connections on a dedicated task, and services every
//! accepted connection on its own task through a [`Dispatch`] implementation.
//!
//! Server-side failures are not transported here; each interface encodes
//! them in its response payload. This layer only reports transport faults,
//! as [`RpcError`].

use crate::error::RpcError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

/// A remote interface: a marker type tying together the request and response
/// enums exchanged on the wire.
pub trait RemoteInterface: Send + Sync + 'static {
    const NAME: &'static str;
    type Request: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Server-side dispatch for one remote interface.
#[async_trait]
pub trait Dispatch<I: RemoteInterface>: Send + Sync + 'static {
    async fn dispatch(&self, request: I::Request) -> I::Response;
}

/// Writes one bincode-serialized value to a stream.
#[async_trait]
pub trait SendMessageExt {
    async fn send_message<M: Serialize + Send + Sync>(
        &mut self,
        message: &M,
    ) -> Result<usize, RpcError>;
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> SendMessageExt for W {
    async fn send_message<M: Serialize + Send + Sync>(
        &mut self,
        message: &M,
    ) -> Result<usize, RpcError> {
        let bytes = bincode::serialize(message)?;
        self.write_all(&bytes).await?;
        self.flush().await?;
        Ok(bytes.len())
    }
}

/// Reads one bincode-serialized value; the peer delimits it by closing (or
/// half-closing) its write side.
#[async_trait]
pub trait FetchMessageExt {
    async fn fetch_message<M: DeserializeOwned>(&mut self) -> Result<M, RpcError>;
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FetchMessageExt for R {
    async fn fetch_message<M: DeserializeOwned>(&mut self) -> Result<M, RpcError> {
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; 4096];

        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Ok(bincode::deserialize(&buf)?)
    }
}

/// Client-side proxy for a remote interface at a fixed address.
///
/// The address is the stub's only state: stubs are serializable, and two
/// stubs are equal iff they name the same interface and the same address.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Stub<I: RemoteInterface> {
    addr: SocketAddr,
    #[serde(skip)]
    _interface: PhantomData<fn() -> I>,
}

impl<I: RemoteInterface> Stub<I> {
    pub fn new(addr: SocketAddr) -> Self {
        Stub { addr, _interface: PhantomData }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Performs one remote invocation: connect, send the request, half-close,
    /// read the single response.
    pub async fn call(&self, request: I::Request) -> Result<I::Response, RpcError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.send_message(&request).await?;
        stream.shutdown().await?;
        stream.fetch_message().await
    }
}

impl<I: RemoteInterface> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Stub::new(self.addr)
    }
}

impl<I: RemoteInterface> PartialEq for Stub<I> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<I: RemoteInterface> Eq for Stub<I> {}

impl<I: RemoteInterface> Hash for Stub<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl<I: RemoteInterface> fmt::Debug for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stub<{}>({})", I::NAME, self.addr)
    }
}

/// Server-side endpoint for one remote interface.
///
/// Dropping the skeleton (or calling [`Skeleton::stop`]) closes the acceptor;
/// connections already being serviced run to completion.
pub struct Skeleton<I: RemoteInterface> {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    _interface: PhantomData<fn() -> I>,
}

impl<I: RemoteInterface> Skeleton<I> {
    /// Binds a listening socket (port 0 for system-chosen) and starts the
    /// acceptor task.
    pub async fn bind<D: Dispatch<I>>(
        dispatcher: Arc<D>,
        addr: SocketAddr,
    ) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, mut stopping) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopping.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                if let Err(err) =
                                    serve_connection::<I, D>(stream, dispatcher).await
                                {
                                    debug!(interface = I::NAME, %peer, "connection failed: {err}");
                                }
                            });
                        }
                        Err(err) => {
                            warn!(interface = I::NAME, "accept failed, closing listener: {err}");
                            break;
                        }
                    },
                }
            }
            debug!(interface = I::NAME, addr = %local_addr, "listener closed");
        });

        Ok(Skeleton { local_addr, shutdown, _interface: PhantomData })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A stub for this skeleton's bound address. Only meaningful when the
    /// bind address is routable by the intended callers; servers advertising
    /// themselves remotely should use [`Skeleton::stub_at`].
    pub fn stub(&self) -> Stub<I> {
        Stub::new(self.local_addr)
    }

    /// A stub carrying an externally visible host with this skeleton's port.
    pub fn stub_at(&self, host: IpAddr) -> Stub<I> {
        Stub::new(SocketAddr::new(host, self.local_addr.port()))
    }

    /// Closes the acceptor. Idempotent; in-flight service tasks finish.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn serve_connection<I: RemoteInterface, D: Dispatch<I>>(
    mut stream: TcpStream,
    dispatcher: Arc<D>,
) -> Result<(), RpcError> {
    let request: I::Request = stream.fetch_message().await?;
    let response = dispatcher.dispatch(request).await;
    stream.send_message(&response).await?;
    stream.shutdown().await?;
    Ok(())
}
