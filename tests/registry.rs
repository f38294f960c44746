use std::sync::Arc;
use std::time::Duration;

mod support;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use nfs_dispatch::xdr::rpc::accept_body;
use nfs_dispatch::{
    register_handler, registered_handlers, CallContext, Handler, HandlerId, RegistrationError,
    ResponseWriter, Server, ServerConfig,
};

use support::{accept_stat, call_record, recv_reply, send_record, DemoFS, ScriptedListener, Step};

// The process-wide table is shared by every test in this binary, so each
// test registers under its own program number.

async fn echo_proc(
    ctx: CallContext,
    reply: ResponseWriter,
    _h: Arc<dyn Handler>,
) -> anyhow::Result<()> {
    reply.reply(&ctx.call.proc)?;
    Ok(())
}

#[test]
fn duplicate_global_registration_fails() {
    register_handler(400_001, 1, echo_proc).expect("first registration");
    let err = register_handler(400_001, 1, echo_proc).expect_err("second registration");
    assert_eq!(err, RegistrationError::AlreadyRegistered(HandlerId::new(400_001, 1)));
    assert_eq!(err.to_string(), "400001 1 already registered");
}

#[test]
fn snapshot_contains_registered_procedures() {
    register_handler(400_002, 0, echo_proc).expect("register 0");
    register_handler(400_002, 7, echo_proc).expect("register 7");

    let snapshot = registered_handlers();
    assert!(snapshot.lookup(400_002, 0).is_some());
    assert!(snapshot.lookup(400_002, 7).is_some());
    assert!(snapshot.lookup(400_002, 1).is_none());
    assert!(snapshot.serves_program(400_002));

    // Later registrations do not show up in an existing snapshot.
    register_handler(400_002, 8, echo_proc).expect("register 8");
    assert!(snapshot.lookup(400_002, 8).is_none());
    assert!(registered_handlers().lookup(400_002, 8).is_some());
}

#[test]
fn server_resolves_against_global_table_by_default() {
    register_handler(400_003, 2, echo_proc).expect("register");

    let server = Server::new(ServerConfig::new(Arc::new(DemoFS::default())));
    let found = server.handler_for(400_003, 2).expect("registered handler");
    assert_eq!(found.id, HandlerId::new(400_003, 2));
    assert!(server.handler_for(400_003, 3).is_none());

    assert!(server.handler_for(400_003, 4).is_none());
    register_handler(400_003, 4, echo_proc).expect("register before serving");
    assert!(server.handler_for(400_003, 4).is_some());

    let isolated = Server::new(
        ServerConfig::new(Arc::new(DemoFS::default()))
            .with_registry(nfs_dispatch::HandlerRegistry::new()),
    );
    assert!(isolated.handler_for(400_003, 2).is_none());
}

#[tokio::test]
async fn serving_dispatches_globally_registered_procedures() {
    register_handler(400_004, 9, echo_proc).expect("register");

    let (mut client, server_end) = tokio::io::duplex(64 * 1024);
    let lifecycle = CancellationToken::new();
    let mut server = Server::new(
        ServerConfig::new(Arc::new(DemoFS::default())).with_lifecycle(lifecycle.clone()),
    );
    server.serve(ScriptedListener::new([Step::Accept(server_end)])).await.expect_err("script ends");

    send_record(&mut client, &call_record(5, 400_004, 9, &[])).await;
    let (msg, rest) = timeout(Duration::from_secs(1), recv_reply(&mut client))
        .await
        .expect("reply timeout");
    assert_eq!(accept_stat(&msg), accept_body::SUCCESS);
    assert_eq!(rest, 9_u32.to_be_bytes());

    send_record(&mut client, &call_record(6, 400_004, 10, &[])).await;
    let (msg, _) = recv_reply(&mut client).await;
    assert_eq!(accept_stat(&msg), accept_body::PROC_UNAVAIL);

    lifecycle.cancel();
}

#[tokio::test]
async fn handler_for_uses_the_serving_snapshot() {
    register_handler(400_005, 1, echo_proc).expect("register");

    let mut server = Server::new(ServerConfig::new(Arc::new(DemoFS::default())));
    server.serve(ScriptedListener::new([])).await.expect_err("script ends");

    register_handler(400_005, 2, echo_proc).expect("register after serving");
    assert!(registered_handlers().lookup(400_005, 2).is_some());
    assert!(server.handler_for(400_005, 1).is_some());
    assert!(server.handler_for(400_005, 2).is_none());
}
