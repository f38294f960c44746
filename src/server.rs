//! The listening server: identity, lifecycle and the accept loop.
//!
//! A [`Server`] moves through `Unstarted -> Serving -> Stopped`. Serving
//! starts when [`Server::serve`] is called:
//!
//! 1. the server draws a random 8-byte identity unless one was configured;
//! 2. it freezes the handler registry it will dispatch with;
//! 3. it accepts connections until the listener fails for good, spawning
//!    one connection-serving task per accepted stream.
//!
//! Transient accept errors are retried after an exponential backoff
//! (5 ms doubling up to 1 s, reset by the next successful accept). Any
//! other accept error ends the loop and is returned. The listener is
//! closed on every exit path.
//!
//! Spawned connection tasks are not tracked: the accept loop does not wait
//! for them, and nothing bounds how many run at once. Cancelling the
//! lifecycle token asks them to stop, but `serve` returning does not mean
//! they have finished. The accept loop itself only stops through the
//! listener; cancelling the token does not interrupt it. Use a
//! [`ClosableListener`](crate::tcp::ClosableListener) to stop it from
//! another task. Dropping the `serve` future skips closing the listener and
//! leaves the server `Serving`.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handler::Handler;
use crate::protocol::rpc;
use crate::registry::{self, HandleContext, HandlerRegistry};
use crate::tcp::{self, Listener};

/// First delay after a transient accept error
pub const MIN_ACCEPT_DELAY: Duration = Duration::from_millis(5);
/// Upper bound for the delay between accept retries
pub const MAX_ACCEPT_DELAY: Duration = Duration::from_secs(1);

/// Fills a buffer with random bytes for the server identity.
pub type IdentitySource = fn(&mut [u8]) -> io::Result<()>;

/// Draws from the operating system CSPRNG.
pub fn os_identity(buf: &mut [u8]) -> io::Result<()> {
    OsRng.try_fill_bytes(buf).map_err(io::Error::other)
}

/// Server construction parameters.
#[derive(Clone)]
pub struct ServerConfig {
    /// Application capability passed to every handler function
    pub handler: Arc<dyn Handler>,
    /// Fixed server identity; a random one is drawn when unset or all-zero
    pub identity: Option<[u8; 8]>,
    /// Randomness used when an identity has to be drawn
    pub identity_source: IdentitySource,
    /// Cancellation root for everything the server spawns
    pub lifecycle: Option<CancellationToken>,
    /// Procedures to dispatch to; defaults to the process-wide registry
    pub registry: Option<Arc<HandlerRegistry>>,
}

impl ServerConfig {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            identity: None,
            identity_source: os_identity,
            lifecycle: None,
            registry: None,
        }
    }

    pub fn with_identity(mut self, identity: [u8; 8]) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_identity_source(mut self, source: IdentitySource) -> Self {
        self.identity_source = source;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: CancellationToken) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_registry(mut self, registry: impl Into<Arc<HandlerRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerState {
    Unstarted,
    Serving,
    Stopped,
}

pub struct Server {
    handler: Arc<dyn Handler>,
    id: [u8; 8],
    identity_source: IdentitySource,
    lifecycle: Option<CancellationToken>,
    registry: Option<Arc<HandlerRegistry>>,
    state: ServerState,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            handler: config.handler,
            id: config.identity.unwrap_or_default(),
            identity_source: config.identity_source,
            lifecycle: config.lifecycle,
            registry: config.registry,
            state: ServerState::Unstarted,
        }
    }

    /// Server identity. All-zero until serving starts, unless configured.
    pub fn id(&self) -> [u8; 8] {
        self.id
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Resolves the handler for `(prog, proc)`.
    ///
    /// Uses the configured registry. Without one, it reads the process-wide
    /// table until serving starts and the snapshot taken at that point
    /// afterwards, so it agrees with what connections dispatch to.
    pub fn handler_for(&self, prog: u32, proc: u32) -> Option<HandleContext> {
        match &self.registry {
            Some(registry) => registry.lookup(prog, proc),
            None => registry::registered_handler(prog, proc),
        }
    }

    /// Accepts connections from `listener` and serves each on its own task.
    ///
    /// Returns when the listener fails with a non-transient error, or if no
    /// identity could be generated. The listener is always closed first.
    pub async fn serve<L: Listener>(&mut self, mut listener: L) -> io::Result<()> {
        self.state = ServerState::Serving;
        let result = self.accept_loop(&mut listener).await;
        let closed = listener.close().await;
        drop(listener);
        self.state = ServerState::Stopped;
        result?;
        closed
    }

    async fn accept_loop<L: Listener>(&mut self, listener: &mut L) -> io::Result<()> {
        if self.id == [0; 8] {
            (self.identity_source)(&mut self.id)?;
        }
        let lifecycle = self.lifecycle.clone().unwrap_or_default();
        let registry = self
            .registry
            .get_or_insert_with(|| Arc::new(registry::registered_handlers()))
            .clone();
        info!("Serving as {} with {} procedures", ServerId(self.id), registry.len());

        let mut backoff = Backoff::default();
        loop {
            let (socket, client_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    let delay = backoff.next_delay();
                    warn!("Accept error: {}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    return Err(e);
                }
            };
            backoff.reset();

            let context = rpc::Context {
                client_addr,
                server_id: self.id,
                handler: self.handler.clone(),
                registry: registry.clone(),
                lifecycle: lifecycle.clone(),
            };
            info!("Accepting connection from {}", context.client_addr);
            tokio::spawn(async move {
                let client_addr = context.client_addr.clone();
                if let Err(e) = tcp::process_socket(socket, context).await {
                    debug!("Connection from {} ended: {:?}", client_addr, e);
                }
            });
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &ServerId(self.id))
            .field("state", &self.state)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Serves `listener` with a default [`Server`] around `handler`.
pub async fn serve<L: Listener>(listener: L, handler: Arc<dyn Handler>) -> io::Result<()> {
    Server::new(ServerConfig::new(handler)).serve(listener).await
}

/// Hex rendering of a server identity for logs.
struct ServerId([u8; 8]);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Delay between accept retries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Backoff {
    delay: Duration,
}

impl Backoff {
    /// Advances to and returns the next delay: 5 ms, then doubling, capped at 1 s.
    pub fn next_delay(&mut self) -> Duration {
        self.delay = if self.delay.is_zero() {
            MIN_ACCEPT_DELAY
        } else {
            (self.delay * 2).min(MAX_ACCEPT_DELAY)
        };
        self.delay
    }

    pub fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }

    /// The last delay handed out, zero after a reset.
    pub fn current(&self) -> Duration {
        self.delay
    }
}

/// Whether an accept error is worth retrying.
pub fn is_transient(e: &io::Error) -> bool {
    use io::ErrorKind;

    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
    ) || out_of_descriptors(e)
}

// ENFILE and EMFILE share their numbers across Unix flavors.
#[cfg(unix)]
fn out_of_descriptors(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn out_of_descriptors(_e: &io::Error) -> bool {
    false
}
