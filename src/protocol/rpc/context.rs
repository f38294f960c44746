//! Per-connection state shared by every call received on one connection.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::handler::Handler;
use crate::registry::{HandleContext, HandlerRegistry};

/// State a connection needs to dispatch calls.
///
/// Built by the accept loop for each accepted connection. The registry is
/// the frozen snapshot the server took when it started serving, and
/// `lifecycle` is the server's cancellation root: once it is cancelled the
/// connection stops reading new calls.
#[derive(Clone)]
pub struct Context {
    /// Client's network address (IP:port) used for logging
    pub client_addr: String,

    /// Identity of the server that accepted the connection
    pub server_id: [u8; 8],

    /// Application capability passed to every handler function
    pub handler: Arc<dyn Handler>,

    /// Procedures this connection can dispatch to
    pub registry: Arc<HandlerRegistry>,

    /// Server-wide cancellation root
    pub lifecycle: CancellationToken,
}

impl Context {
    /// Resolves the handler for a decoded call, if one was registered.
    pub fn handler_for(&self, prog: u32, proc: u32) -> Option<HandleContext> {
        self.registry.lookup(prog, proc)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rpc::Context")
            .field("client_addr", &self.client_addr)
            .field("server_id", &self.server_id)
            .field("registry", &self.registry)
            .finish()
    }
}
