//! ONC RPC version 2 (RFC 5531) plumbing between an accepted connection
//! and the registered procedure handlers.
//!
//! - `wire`: record marking over TCP and dispatch of a decoded call.
//! - `context`: state shared by all calls of one connection.
//! - `call`: the per-call view given to handler functions.

mod call;
mod context;
mod wire;

pub use call::{CallContext, GarbageArgs, ResponseWriter};
pub use context::Context;
pub use wire::{
    handle_rpc, read_fragment, read_record, write_fragment, MAX_RPC_RECORD_LENGTH,
};
