#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use nfs_dispatch::protocol::rpc;
use nfs_dispatch::xdr::{self, Serialize};
use nfs_dispatch::{Handler, Listener};

/// Application capability used by the tests.
#[derive(Default)]
pub struct DemoFS {
    pub export: String,
}

impl Handler for DemoFS {}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Encodes a CALL message followed by already encoded `args`.
pub fn call_record(xid: u32, prog: u32, proc: u32, args: &[u8]) -> Vec<u8> {
    call_record_with_version(xid, 2, prog, proc, args)
}

pub fn call_record_with_version(
    xid: u32,
    rpcvers: u32,
    prog: u32,
    proc: u32,
    args: &[u8],
) -> Vec<u8> {
    let call = xdr::rpc::call_body {
        rpcvers,
        prog,
        vers: 3,
        proc,
        cred: xdr::rpc::opaque_auth::default(),
        verf: xdr::rpc::opaque_auth::default(),
    };
    let msg = xdr::rpc::rpc_msg { xid, body: xdr::rpc::rpc_body::CALL(call) };
    let mut buf = Vec::new();
    msg.serialize(&mut buf).expect("serialize rpc_msg");
    buf.extend_from_slice(args);
    buf
}

/// Sends `record` as a single last fragment.
pub async fn send_record<W: tokio::io::AsyncWrite + Unpin>(stream: &mut W, record: &[u8]) {
    let fragment_header = (1_u32 << 31) | (record.len() as u32);
    stream.write_all(&fragment_header.to_be_bytes()).await.expect("write fragment header");
    stream.write_all(record).await.expect("write fragment body");
}

/// Reads one reply record and decodes its header. Returns the header and
/// the bytes that follow it.
pub async fn recv_reply<R: tokio::io::AsyncRead + Unpin>(
    stream: &mut R,
) -> (xdr::rpc::rpc_msg, Vec<u8>) {
    let record = rpc::read_record(stream)
        .await
        .expect("read reply record")
        .expect("connection closed before reply");
    let mut cursor = Cursor::new(record);
    let msg = xdr::deserialize::<xdr::rpc::rpc_msg>(&mut cursor).expect("deserialize reply");
    let rest = cursor.get_ref()[cursor.position() as usize..].to_vec();
    (msg, rest)
}

/// Extracts the accept status of an accepted reply.
pub fn accept_stat(msg: &xdr::rpc::rpc_msg) -> xdr::rpc::accept_body {
    match &msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            accepted.reply_data.clone()
        }
        other => panic!("expected MSG_ACCEPTED, got {:?}", other),
    }
}

pub fn per_connection_context(registry: nfs_dispatch::HandlerRegistry) -> rpc::Context {
    rpc::Context {
        client_addr: "127.0.0.1:1234".to_string(),
        server_id: [1, 2, 3, 4, 5, 6, 7, 8],
        handler: Arc::new(DemoFS { export: "/demo".to_string() }),
        registry: Arc::new(registry),
        lifecycle: CancellationToken::new(),
    }
}

/// One scripted outcome of [`ScriptedListener::accept`].
pub enum Step {
    Accept(DuplexStream),
    Fail(io::Error),
}

/// Listener replaying a fixed script. Once the script runs out every
/// accept fails with "listener closed".
#[derive(Clone, Default)]
pub struct ScriptedListener {
    steps: Arc<Mutex<VecDeque<Step>>>,
    pub accept_times: Arc<Mutex<Vec<Instant>>>,
    pub closes: Arc<AtomicUsize>,
}

impl ScriptedListener {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self { steps: Arc::new(Mutex::new(steps.into_iter().collect())), ..Default::default() }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn accept_times(&self) -> Vec<Instant> {
        self.accept_times.lock().unwrap().clone()
    }
}

pub fn timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "accept timed out")
}

pub fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}

#[async_trait]
impl Listener for ScriptedListener {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
        self.accept_times.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept(stream)) => Ok((stream, "10.0.0.1:700".to_string())),
            Some(Step::Fail(e)) => Err(e),
            None => Err(closed_error()),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
