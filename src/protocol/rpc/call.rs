//! What a handler function sees of a single call: the decoded call header
//! with its undecoded arguments, and a writer for the reply.

use std::io::{self, Cursor};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::protocol::xdr::{self, Deserialize, Serialize};

/// Initial size of a reply buffer
const DEFAULT_RESPONSE_BUFFER_CAPACITY: usize = 8192;

/// Returned by [`CallContext::args`] when the arguments do not decode.
///
/// The connection answers calls that fail with this error with
/// `GARBAGE_ARGS` instead of `SYSTEM_ERR`.
#[derive(Debug, Error)]
#[error("cannot decode procedure arguments: {0}")]
pub struct GarbageArgs(#[source] pub io::Error);

/// A single decoded RPC call.
#[derive(Debug)]
pub struct CallContext {
    /// Transaction id of the call
    pub xid: u32,
    /// Call header: program, version, procedure and credentials
    pub call: xdr::rpc::call_body,
    /// Identity of the server handling the call
    pub server_id: [u8; 8],
    /// Client's network address (IP:port)
    pub client_addr: String,
    /// Cancelled when the server shuts down
    pub cancel: CancellationToken,
    args: Cursor<Vec<u8>>,
}

impl CallContext {
    pub fn new(
        xid: u32,
        call: xdr::rpc::call_body,
        args: Vec<u8>,
        server_id: [u8; 8],
        client_addr: String,
        cancel: CancellationToken,
    ) -> Self {
        Self { xid, call, server_id, client_addr, cancel, args: Cursor::new(args) }
    }

    /// Decodes the next argument value.
    pub fn args<T: Deserialize + Default>(&mut self) -> Result<T, GarbageArgs> {
        xdr::deserialize(&mut self.args).map_err(GarbageArgs)
    }

    /// Argument bytes not decoded yet.
    pub fn remaining_args(&self) -> &[u8] {
        let pos = (self.args.position() as usize).min(self.args.get_ref().len());
        &self.args.get_ref()[pos..]
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One-shot writer for the reply to a call.
///
/// Every `reply*` method consumes the writer and hands a complete RPC reply
/// message (header and body) to the connection. Dropping the writer
/// without replying lets the connection pick a reply from the handler's
/// result.
#[derive(Debug)]
pub struct ResponseWriter {
    xid: u32,
    sink: oneshot::Sender<Vec<u8>>,
}

impl ResponseWriter {
    /// Creates a writer for `xid` and the receiver its reply arrives on.
    pub fn new(xid: u32) -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (sink, receiver) = oneshot::channel();
        (Self { xid, sink }, receiver)
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// Replies `SUCCESS` followed by the encoded `body`.
    pub fn reply<T: Serialize + ?Sized>(self, body: &T) -> io::Result<()> {
        let mut buffer = Vec::with_capacity(DEFAULT_RESPONSE_BUFFER_CAPACITY);
        xdr::rpc::make_success_reply(self.xid).serialize(&mut buffer)?;
        body.serialize(&mut buffer)?;
        self.send(buffer)
    }

    /// Replies `SUCCESS` with no results.
    pub fn reply_void(self) -> io::Result<()> {
        let msg = xdr::rpc::make_success_reply(self.xid);
        self.reply_message(&msg)
    }

    /// Replies with an accepted-but-failed status such as `GARBAGE_ARGS`.
    pub fn reply_error(self, status: xdr::rpc::accept_body) -> io::Result<()> {
        let msg = xdr::rpc::accepted_reply_message(self.xid, status);
        self.reply_message(&msg)
    }

    /// Sends a prebuilt reply message.
    pub fn reply_message(self, msg: &xdr::rpc::rpc_msg) -> io::Result<()> {
        let mut buffer = Vec::new();
        msg.serialize(&mut buffer)?;
        self.send(buffer)
    }

    fn send(self, buffer: Vec<u8>) -> io::Result<()> {
        self.sink.send(buffer).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "connection no longer awaits this reply")
        })
    }
}
