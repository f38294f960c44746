//! RPC over TCP: record marking (RFC 5531 section 11) and call dispatch.
//!
//! A record is sent as one or more fragments, each prefixed by a 4-byte
//! big-endian header whose highest bit marks the last fragment and whose
//! lower 31 bits carry the fragment length.

use std::io::Cursor;

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

use crate::protocol::rpc::{self, CallContext, GarbageArgs, ResponseWriter};
use crate::protocol::xdr::{self, deserialize, Serialize};
use crate::registry::HandlerId;

/// Largest RPC record accepted from a client, across all its fragments.
pub const MAX_RPC_RECORD_LENGTH: usize = 16 * 1024 * 1024;

const LAST_FRAGMENT: u32 = 1 << 31;

/// Reads a single record-marked fragment and appends it to `append_to`.
///
/// Returns true if this was the last fragment of the record.
pub async fn read_fragment<R: AsyncRead + Unpin>(
    socket: &mut R,
    append_to: &mut Vec<u8>,
) -> Result<bool, anyhow::Error> {
    let mut header_buf = [0_u8; 4];
    socket.read_exact(&mut header_buf).await?;
    let fragment_header = u32::from_be_bytes(header_buf);
    let is_last = fragment_header & LAST_FRAGMENT != 0;
    let length = (fragment_header & !LAST_FRAGMENT) as usize;
    trace!("Reading fragment length:{}, last:{}", length, is_last);
    if append_to.len().saturating_add(length) > MAX_RPC_RECORD_LENGTH {
        return Err(anyhow!("RPC record length {} exceeds max {}", length, MAX_RPC_RECORD_LENGTH));
    }
    let start_offset = append_to.len();
    append_to.resize(start_offset + length, 0);
    socket.read_exact(&mut append_to[start_offset..]).await?;
    Ok(is_last)
}

/// Reads fragments until a whole record is assembled.
///
/// Returns `None` if the peer closed the stream between records.
pub async fn read_record<R: AsyncRead + Unpin>(
    socket: &mut R,
) -> Result<Option<Vec<u8>>, anyhow::Error> {
    let mut record = Vec::new();
    loop {
        match read_fragment(socket, &mut record).await {
            Ok(true) => return Ok(Some(record)),
            Ok(false) => {}
            Err(e) if record.is_empty() && is_eof(&e) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

fn is_eof(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::UnexpectedEof)
}

/// Writes `buf` as record-marked fragments.
pub async fn write_fragment<W: AsyncWrite + Unpin>(
    socket: &mut W,
    buf: &[u8],
) -> Result<(), anyhow::Error> {
    const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

    // An empty record is still one (last) fragment.
    let mut chunks = buf.chunks(MAX_FRAGMENT_SIZE).peekable();
    if chunks.peek().is_none() {
        socket.write_all(&LAST_FRAGMENT.to_be_bytes()).await?;
    }
    while let Some(chunk) = chunks.next() {
        let is_last = chunks.peek().is_none();
        let fragment_header =
            if is_last { chunk.len() as u32 | LAST_FRAGMENT } else { chunk.len() as u32 };
        trace!("Writing fragment length:{}, last:{}", chunk.len(), is_last);
        socket.write_all(&fragment_header.to_be_bytes()).await?;
        socket.write_all(chunk).await?;
    }
    socket.flush().await?;
    Ok(())
}

/// Dispatches one RPC record and returns the encoded reply.
///
/// 1. Decodes the call header; a REPLY message is a protocol error.
/// 2. Rejects RPC versions other than 2.
/// 3. Resolves `(prog, proc)` through the connection's registry. Unknown
///    programs get `PROG_UNAVAIL`, unknown procedures of a served program
///    get `PROC_UNAVAIL`.
/// 4. Runs the handler function. If it did not reply itself, an `Ok`
///    result becomes an empty `SUCCESS`, an argument decoding failure
///    becomes `GARBAGE_ARGS` and any other error `SYSTEM_ERR`.
pub async fn handle_rpc(
    record: Vec<u8>,
    context: &rpc::Context,
) -> Result<Vec<u8>, anyhow::Error> {
    let mut input = Cursor::new(record);
    let recv = deserialize::<xdr::rpc::rpc_msg>(&mut input)?;
    let xid = recv.xid;
    let xdr::rpc::rpc_body::CALL(call) = recv.body else {
        error!("Unexpectedly received a Reply instead of a Call");
        return Err(anyhow!("Bad RPC Call format"));
    };

    let mut output = Vec::new();
    if call.rpcvers != xdr::rpc::RPC_VERSION {
        warn!("Invalid RPC version {} != {}", call.rpcvers, xdr::rpc::RPC_VERSION);
        xdr::rpc::rpc_vers_mismatch(xid).serialize(&mut output)?;
        return Ok(output);
    }

    let Some(handle) = context.handler_for(call.prog, call.proc) else {
        let reply = if context.registry.serves_program(call.prog) {
            warn!("No handler for {}", HandlerId::new(call.prog, call.proc));
            xdr::rpc::proc_unavail_reply_message(xid)
        } else {
            warn!("Unknown RPC Program number {}", call.prog);
            xdr::rpc::prog_unavail_reply_message(xid)
        };
        reply.serialize(&mut output)?;
        return Ok(output);
    };

    let args_start = input.position() as usize;
    let mut args = input.into_inner();
    args.drain(..args_start.min(args.len()));

    debug!("{} xid:{} from {}", handle.id, xid, context.client_addr);
    let ctx = CallContext::new(
        xid,
        call,
        args,
        context.server_id,
        context.client_addr.clone(),
        context.lifecycle.child_token(),
    );
    let (writer, reply) = ResponseWriter::new(xid);
    let result = handle.invoke(ctx, writer, context.handler.clone()).await;

    match (reply.await, result) {
        (Ok(reply), Ok(())) => Ok(reply),
        (Ok(reply), Err(e)) => {
            error!("{} xid:{} failed after replying: {:?}", handle.id, xid, e);
            Ok(reply)
        }
        (Err(_), Ok(())) => {
            xdr::rpc::make_success_reply(xid).serialize(&mut output)?;
            Ok(output)
        }
        (Err(_), Err(e)) if e.downcast_ref::<GarbageArgs>().is_some() => {
            warn!("{} xid:{}: {}", handle.id, xid, e);
            xdr::rpc::garbage_args_reply_message(xid).serialize(&mut output)?;
            Ok(output)
        }
        (Err(_), Err(e)) => {
            error!("{} xid:{} failed: {:?}", handle.id, xid, e);
            xdr::rpc::system_err_reply_message(xid).serialize(&mut output)?;
            Ok(output)
        }
    }
}
