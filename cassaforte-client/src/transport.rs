/// Socket-backed transport shared by the remote stub
///
/// The transport owns the endpoint, the runtime used to block on network
/// futures and the open channel. `RemoteCassandra` holds a second handle to
/// the same socket so both always share one lifetime.
///
/// Each `open` dials exactly one TCP connection. When that connection is
/// lost the channel is not re-dialed behind the caller's back: the socket
/// is closed and the caller decides whether to open it again.
use crate::config::ClientConfig;
use crate::error::TransportError;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tonic::transport::{Channel, Endpoint, Uri};
use tracing::debug;

/// Connection lifecycle
pub trait Transport {
    /// Open the connection; fails if it is already open or unreachable
    fn open(&mut self) -> Result<(), TransportError>;

    /// Release the connection. Closing a closed transport does nothing.
    fn close(&mut self);

    /// Push buffered output to the peer
    fn flush(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;
}

pub(crate) struct Socket {
    address: String,
    peer: String,
    endpoint: Endpoint,
    runtime: Runtime,
    channel: Mutex<Option<Channel>>,
    max_frame_size: usize,
    tcp_nodelay: bool,
}

impl Socket {
    pub(crate) fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let address = config.endpoint_uri();

        let mut endpoint = Endpoint::from_shared(address.clone())
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", address, e)))?;
        let peer = endpoint
            .uri()
            .authority()
            .map(|authority| authority.to_string())
            .ok_or_else(|| TransportError::InvalidAddress(address.clone()))?;

        if let Some(timeout) = config.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }

        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            address,
            peer,
            endpoint,
            runtime,
            channel: Mutex::new(None),
            max_frame_size: config.max_frame_size,
            tcp_nodelay: config.tcp_nodelay,
        })
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    /// Channel of the open connection
    pub(crate) fn channel(&self) -> Result<Channel, TransportError> {
        self.channel.lock().clone().ok_or(TransportError::NotOpen)
    }

    pub(crate) fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Run a network future to completion on the calling thread
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Drop the open channel, returning whether there was one
    pub(crate) fn disconnect(&self) -> bool {
        self.channel.lock().take().is_some()
    }

    /// Dial the peer once and build a channel over that connection
    async fn connect(&self) -> Result<Channel, tonic::transport::Error> {
        let peer = self.peer.clone();
        let nodelay = self.tcp_nodelay;
        let mut dialed = false;

        let connector = tower::service_fn(move |_: Uri| {
            let first = !std::mem::replace(&mut dialed, true);
            let peer = peer.clone();
            async move {
                if !first {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "connection lost, transport must be reopened",
                    ));
                }
                let stream = TcpStream::connect(peer.as_str()).await?;
                stream.set_nodelay(nodelay)?;
                Ok::<_, io::Error>(stream)
            }
        });

        self.endpoint.connect_with_connector(connector).await
    }
}

/// Transport over a TCP connection to one node
pub struct SocketTransport {
    socket: Arc<Socket>,
}

impl SocketTransport {
    pub(crate) fn new(socket: Arc<Socket>) -> Self {
        Self { socket }
    }

    /// URI of the peer (e.g., "http://127.0.0.1:9160")
    pub fn address(&self) -> &str {
        &self.socket.address
    }
}

impl Transport for SocketTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut channel = self.socket.channel.lock();
        if channel.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        debug!(address = %self.socket.address, "Opening transport");
        let connected = self
            .socket
            .block_on(self.socket.connect())
            .map_err(|e| {
                TransportError::ConnectFailed(format!("{}: {}", self.socket.address, error_chain(&e)))
            })?;

        *channel = Some(connected);
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.disconnect() {
            debug!(address = %self.socket.address, "Closed transport");
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        // Calls are written through as they are issued, nothing is buffered
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }

    fn is_open(&self) -> bool {
        self.socket.channel.lock().is_some()
    }
}

/// Render an error together with its sources
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
