//! NFS Dispatch - the RPC front end of an NFS server.
//!
//! This library accepts TCP connections, gives each server a random
//! identity, and routes every incoming ONC RPC call, identified by its
//! program and procedure numbers, to a handler function registered for
//! that pair. What the procedures do is up to the protocol layer that
//! registers them and to the application [`Handler`] they are given.
//!
//! ## Main Components
//!
//! - `registry`: the [`HandlerRegistry`] mapping `(program, procedure)`
//!   pairs to [`HandleFunc`]s, and the process-wide table filled by
//!   [`register_handler`].
//!
//! - `server`: the [`Server`] with its identity and lifecycle, and the
//!   accept loop with exponential backoff on transient errors.
//!
//! - `tcp`: the [`Listener`] abstraction and the per-connection task that
//!   reads record-marked calls and writes replies.
//!
//! - `protocol`: XDR encoding, RPC message types and call dispatch.
//!
//! ## Usage
//!
//! Register a handler function for every supported procedure, then serve:
//!
//! ```ignore
//! register_handler(nfs3::PROGRAM, 0, |_ctx, reply: ResponseWriter, _fs| async move {
//!     reply.reply_void()?;
//!     Ok(())
//! })?;
//! let listener = tcp::bind("127.0.0.1:2049").await?;
//! let shutdown = listener.close_handle();
//! // `shutdown.close()` from another task makes `serve` return.
//! serve(listener, Arc::new(MyFs::default())).await?;
//! ```
//!
//! ## Standards Compliance
//!
//! - RFC 5531: RPC: Remote Procedure Call Protocol Specification Version 2
//! - RFC 4506: XDR: External Data Representation Standard
//! - RFC 1813: NFS Version 3 Protocol Specification (program and procedure numbers)

pub mod handler;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tcp;

pub use handler::Handler;
pub use protocol::rpc::{CallContext, GarbageArgs, ResponseWriter};
pub use protocol::xdr;
pub use registry::{
    register_handler, registered_handlers, HandleContext, HandleFunc, HandlerId, HandlerRegistry,
    RegistrationError,
};
pub use server::{serve, IdentitySource, Server, ServerConfig, ServerState};
pub use tcp::{ClosableListener, CloseHandle, Listener};
