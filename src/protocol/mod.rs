//! Wire-level pieces of the ONC RPC protocol family served by this crate.
//!
//! - `xdr`: External Data Representation (RFC 4506) used to decode call
//!   headers and encode replies, plus program and procedure numbers of the
//!   NFS and MOUNT protocols.
//! - `rpc`: record marking, per-connection context and the call dispatch
//!   that routes each call to its registered handler.

pub mod rpc;
pub mod xdr;
