use std::io::Cursor;

use nfs_dispatch::xdr::rpc::{self, accept_body, call_body, opaque_auth, rpc_body, rpc_msg};
use nfs_dispatch::xdr::{deserialize, nfs3, Serialize};

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

#[test]
fn decodes_call_header_from_wire_bytes() {
    // xid, CALL, rpcvers, prog, vers, proc, cred (AUTH_UNIX, 4 bytes), verf (AUTH_NULL)
    let mut bytes = words(&[7, 0, 2, nfs3::PROGRAM, 3, 1, rpc::AUTH_UNIX, 4]);
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    bytes.extend(words(&[rpc::AUTH_NULL, 0]));
    bytes.extend(words(&[99]));

    let mut input = Cursor::new(bytes);
    let msg = deserialize::<rpc_msg>(&mut input).expect("decode call");
    assert_eq!(msg.xid, 7);
    let rpc_body::CALL(call) = msg.body else { panic!("expected CALL") };
    assert_eq!(
        call,
        call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: 3,
            proc: 1,
            cred: opaque_auth { flavor: rpc::AUTH_UNIX, body: vec![0xde, 0xad, 0xbe, 0xef] },
            verf: opaque_auth::default(),
        }
    );
    // Procedure arguments are left in the stream.
    assert_eq!(deserialize::<u32>(&mut input).expect("decode args"), 99);
}

#[test]
fn unknown_auth_flavors_still_decode() {
    let mut bytes = words(&[1, 0, 2, nfs3::PROGRAM, 3, 0, 6, 0]);
    bytes.extend(words(&[0, 0]));

    let msg = deserialize::<rpc_msg>(&mut Cursor::new(bytes)).expect("decode call");
    let rpc_body::CALL(call) = msg.body else { panic!("expected CALL") };
    assert_eq!(call.cred.flavor, 6);
}

#[test]
fn encodes_proc_unavail_reply() {
    let mut out = Vec::new();
    rpc::proc_unavail_reply_message(9).serialize(&mut out).expect("encode reply");
    // xid, REPLY, MSG_ACCEPTED, verf AUTH_NULL + empty body, PROC_UNAVAIL
    assert_eq!(out, words(&[9, 1, 0, 0, 0, 3]));
}

#[test]
fn encodes_rpc_version_mismatch() {
    let mut out = Vec::new();
    rpc::rpc_vers_mismatch(5).serialize(&mut out).expect("encode reply");
    // xid, REPLY, MSG_DENIED, RPC_MISMATCH, low, high
    assert_eq!(out, words(&[5, 1, 1, 0, 2, 2]));
}

#[test]
fn opaque_data_is_padded_to_four_bytes() {
    let mut out = Vec::new();
    vec![1_u8, 2, 3, 4, 5].serialize(&mut out).expect("encode opaque");
    assert_eq!(out, [0, 0, 0, 5, 1, 2, 3, 4, 5, 0, 0, 0]);

    let back = deserialize::<Vec<u8>>(&mut Cursor::new(out)).expect("decode opaque");
    assert_eq!(back, [1, 2, 3, 4, 5]);
}

#[test]
fn truncated_opaque_is_an_error() {
    // Claims 4096 bytes but carries 2.
    let mut bytes = words(&[4096]);
    bytes.extend_from_slice(&[1, 2]);
    let err = deserialize::<Vec<u8>>(&mut Cursor::new(bytes)).expect_err("short opaque");
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn rejects_invalid_bool_and_non_ascii_strings() {
    let err = deserialize::<bool>(&mut Cursor::new(words(&[2]))).expect_err("bool 2");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

    let mut bytes = words(&[2]);
    bytes.extend_from_slice(&[0xc3, 0xa9, 0, 0]);
    let err = deserialize::<String>(&mut Cursor::new(bytes)).expect_err("non-ascii");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn decodes_accept_stats() {
    let reply = words(&[3, 1, 0, 0, 0, 5]);
    let msg = deserialize::<rpc_msg>(&mut Cursor::new(reply)).expect("decode reply");
    match msg.body {
        rpc_body::REPLY(rpc::reply_body::MSG_ACCEPTED(accepted)) => {
            assert_eq!(accepted.reply_data, accept_body::SYSTEM_ERR);
        }
        other => panic!("expected MSG_ACCEPTED, got {:?}", other),
    }
}
