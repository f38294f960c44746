//! TCP transport: the [`Listener`] abstraction the accept loop runs on, a
//! [`ClosableListener`] that can be shut from outside the accept loop, and
//! the connection-serving unit spawned for every accepted stream.
//!
//! A connection is served sequentially: read one record-marked RPC record,
//! dispatch it, write the reply, repeat. It ends when the client closes the
//! stream, on a framing or decoding error, or when the server's lifecycle
//! token is cancelled.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::rpc;

/// Source of client connections for [`Server::serve`](crate::server::Server::serve).
#[async_trait]
pub trait Listener: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Waits for the next connection and returns it with the peer address.
    async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;

    /// Stops accepting. Called exactly once, when `serve` returns; not
    /// called if the `serve` future is dropped before completing.
    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Listener for TcpListener {
    type Stream = tokio::net::TcpStream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        let (socket, addr) = TcpListener::accept(self).await?;
        let _ = socket.set_nodelay(true);
        Ok((socket, addr.to_string()))
    }

    // The socket is released when the listener is dropped right after.
}

/// Wraps a [`Listener`] so it can be closed while an accept is pending.
///
/// Once any [`CloseHandle`] of it is closed, `accept` fails with
/// `NotConnected`. The accept loop treats that as fatal, so `serve` closes
/// the listener and returns. This is the way to stop a server: dropping the
/// `serve` future instead skips [`Listener::close`] and leaves the server
/// in the `Serving` state.
#[derive(Debug)]
pub struct ClosableListener<L> {
    inner: L,
    closed: CancellationToken,
}

impl<L: Listener> ClosableListener<L> {
    pub fn new(inner: L) -> Self {
        Self { inner, closed: CancellationToken::new() }
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(self.closed.clone())
    }

    pub fn get_ref(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: Listener> Listener for ClosableListener<L> {
    type Stream = L::Stream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(listener_closed()),
            accepted = self.inner.accept() => accepted,
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed.cancel();
        self.inner.close().await
    }
}

/// Closes a [`ClosableListener`] from another task.
#[derive(Clone, Debug)]
pub struct CloseHandle(CancellationToken);

impl CloseHandle {
    pub fn close(&self) {
        self.0.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_cancelled()
    }
}

fn listener_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}

/// Generates a local loopback IP address from a 16-bit host number
/// in the 127.88.x.y range.
pub fn generate_host_ip(hostnum: u16) -> String {
    format!("127.88.{}.{}", ((hostnum >> 8) & 0xFF) as u8, (hostnum & 0xFF) as u8)
}

/// Binds a TCP listener to `"ip:port"`.
///
/// The special host `auto` picks the first bindable address in the
/// 127.88.x.y loopback range, which lets several servers share a port on
/// one machine.
pub async fn bind(ipstr: &str) -> io::Result<ClosableListener<TcpListener>> {
    let (ip, port) = ipstr.split_once(':').ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "IP Address must be of form ip:port")
    })?;
    let port = port.parse::<u16>().map_err(|_| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "Port not in range 0..=65535")
    })?;

    if ip != "auto" {
        let listener = TcpListener::bind((ip, port)).await?;
        info!("Listening on {:?}", listener.local_addr()?);
        return Ok(ClosableListener::new(listener));
    }

    const NUM_TRIES: u16 = 32;
    for try_ip in 1..=NUM_TRIES {
        let ip = generate_host_ip(try_ip);
        if let Ok(listener) = TcpListener::bind((ip.as_str(), port)).await {
            info!("Listening on {:?}", listener.local_addr()?);
            return Ok(ClosableListener::new(listener));
        }
    }

    Err(io::Error::other("Can't bind automatically"))
}

/// Serves RPC calls arriving on `socket` until it closes.
pub async fn process_socket<S>(socket: S, context: rpc::Context) -> Result<(), anyhow::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut reader, mut writer) = tokio::io::split(socket);
    loop {
        let record = tokio::select! {
            _ = context.lifecycle.cancelled() => {
                debug!("Server shutting down, closing connection from {}", context.client_addr);
                return Ok(());
            }
            record = rpc::read_record(&mut reader) => record?,
        };
        let Some(record) = record else {
            debug!("Connection from {} closed", context.client_addr);
            return Ok(());
        };
        let reply = rpc::handle_rpc(record, &context).await?;
        rpc::write_fragment(&mut writer, &reply).await?;
    }
}
