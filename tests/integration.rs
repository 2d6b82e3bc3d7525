//! Integration tests for arraybridge.
//!
//! Two sessions talk to each other over an in-memory pipe: a `worker` that
//! serves requests with `run()` and a `caller` that issues them. Both run on
//! the test task through `tokio::join!`.

use std::time::Duration;

use arraybridge::protocol::{
    read_frame, write_frame, Message, MessageType, DEFAULT_MAX_PAYLOAD_SIZE,
};
use arraybridge::script::{exec_source, HostObject};
use arraybridge::session::PeerDialect;
use arraybridge::transport::{in_memory_pair, MemoryTransport};
use arraybridge::value::{json, TypeHint};
use arraybridge::{Array, BridgeError, Host, HostValue, Result, Session, SessionBuilder, Value};

fn worker(transport: MemoryTransport) -> Session<MemoryTransport> {
    SessionBuilder::new()
        .poll_interval(Duration::from_millis(5))
        .without_interrupter()
        .build(transport)
}

/// Dialect for a peer that is another arraybridge session.
fn script_dialect() -> PeerDialect {
    PeerDialect {
        access: "APL.access('{id}').{name}".into(),
        release: "APL.release".into(),
        monadic: "({fn})(⎕)".into(),
        dyadic: "({fn})(⎕, ⎕)".into(),
        ..PeerDialect::default()
    }
}

fn caller(transport: MemoryTransport) -> Session<MemoryTransport> {
    SessionBuilder::new()
        .sign_on(false)
        .poll_interval(Duration::from_millis(5))
        .dialect(script_dialect())
        .without_interrupter()
        .build(transport)
}

fn pair() -> (Session<MemoryTransport>, Session<MemoryTransport>) {
    let (a, b) = in_memory_pair(64 * 1024);
    (worker(a), caller(b))
}

#[tokio::test]
async fn test_sign_on_and_stop_handshake() {
    let (mut worker, mut caller) = pair();

    let calls = async {
        let pid = caller.await_peer_pid().await.unwrap();
        assert_eq!(pid, std::process::id());
        caller.stop().await.unwrap();
    };
    let (served, ()) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert!(worker.is_stopped());
    assert!(caller.is_stopped());
    assert!(matches!(caller.repr("1").await, Err(BridgeError::Stopped)));
}

#[tokio::test]
async fn test_eval_sums_arguments() {
    let (mut worker, mut caller) = pair();

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let result = caller
            .eval("⎕+⎕", vec![Value::from(2i64), Value::from(3i64)])
            .await
            .unwrap();
        caller.stop().await.unwrap();
        result
    };
    let (served, result) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert_eq!(json::encode(&result).unwrap(), br#"{"r":[],"d":[5],"t":0}"#);
}

/// The worker calls back into the caller while serving the caller's request.
#[tokio::test]
async fn test_reentrant_eval() {
    let (mut worker, mut caller) = pair();

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let result = caller
            .eval("APL.eval('⎕ * 10', ⎕) + 1", vec![Value::from(4i64)])
            .await
            .unwrap();
        caller.stop().await.unwrap();
        result
    };
    let (served, result) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert_eq!(result, Value::Array(Array::scalar(41i64)));
}

#[tokio::test]
async fn test_nested_reentry_three_levels() {
    let (mut worker, mut caller) = pair();
    exec_source(&mut caller, "base = 5").await.unwrap();

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        // worker -> caller -> worker
        let result = caller
            .eval_host("APL.eval(\"APL.eval('⎕ + 1', base)\") * 2", vec![])
            .await
            .unwrap();
        caller.stop().await.unwrap();
        result
    };
    let (served, result) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert_eq!(result, HostValue::Int(12));
}

#[tokio::test]
async fn test_remote_error_then_recovery() {
    let (mut worker, mut caller) = pair();

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let failed = caller.eval("1 // 0", vec![]).await;
        let recovered = caller.repr("1 + 1").await;
        caller.stop().await.unwrap();
        (failed, recovered)
    };
    let (served, (failed, recovered)) = tokio::join!(worker.run(), calls);

    served.unwrap();
    match failed {
        Err(BridgeError::Remote { message, .. }) => {
            assert!(message.contains("ZeroDivisionError"), "{}", message)
        }
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(recovered.unwrap(), "2");
}

#[tokio::test]
async fn test_exec_persists_between_requests() {
    let (mut worker, mut caller) = pair();

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let ok = caller.exec("total = 10\nname = 'bridge'").await.unwrap();
        let scaled = caller
            .eval_host("total * ⎕", vec![HostValue::Int(3)])
            .await
            .unwrap();
        let name = caller.eval_host("name.upper()", vec![]).await.unwrap();
        caller.stop().await.unwrap();
        (ok, scaled, name)
    };
    let (served, (ok, scaled, name)) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert_eq!(ok, "");
    assert_eq!(scaled, HostValue::Int(30));
    assert_eq!(name, HostValue::str("BRIDGE"));
    assert_eq!(worker.env().get("total"), Some(&HostValue::Int(10)));
}

#[tokio::test]
async fn test_ping_and_debug_roundtrip() {
    let (mut worker, mut caller) = pair();
    let matrix = Value::Array(
        Array::reshape(vec![2, 2], vec![Value::from(1i64)], TypeHint::Numeric).unwrap(),
    );

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let echo = caller.ping(b"are you there").await.unwrap();
        let back = caller.debug_roundtrip(&matrix).await.unwrap();
        caller.stop().await.unwrap();
        (echo, back)
    };
    let (served, (echo, back)) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert_eq!(echo.as_ref(), b"are you there");
    assert_eq!(back, matrix);
}

#[derive(Debug)]
struct Greeter;

impl HostObject for Greeter {
    fn type_name(&self) -> &str {
        "Greeter"
    }

    fn attributes(&self) -> Vec<String> {
        vec!["greeting".into()]
    }

    fn operations(&self) -> Vec<String> {
        vec!["greet".into()]
    }

    fn get(&self, name: &str) -> Option<HostValue> {
        (name == "greeting").then(|| HostValue::str("hello"))
    }

    fn call(&self, method: &str, args: Vec<HostValue>) -> Result<HostValue> {
        match (method, args.as_slice()) {
            ("greet", [HostValue::Str(who)]) => Ok(HostValue::Str(format!("hello {}", who))),
            _ => Err(BridgeError::Runtime(format!("TypeError: bad call to {}", method))),
        }
    }
}

#[tokio::test]
async fn test_remote_object_proxy() {
    let (mut worker, mut caller) = pair();
    worker.env().define("greeter", HostValue::object(Greeter));

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let result = exec_source(
            &mut caller,
            "g = APL.eval('greeter')\n\
             r = g.greet('you') + ' / ' + g.greeting\n\
             APL.release(g)\n\
             r",
        )
        .await
        .unwrap();
        caller.stop().await.unwrap();
        result
    };
    let (served, result) = tokio::join!(worker.run(), calls);

    served.unwrap();
    assert_eq!(result, HostValue::str("hello you / hello"));
    assert!(worker.store().is_empty());
}

#[tokio::test]
async fn test_object_reference_is_single_use() {
    let (mut worker, mut caller) = pair();
    worker.env().define("greeter", HostValue::object(Greeter));

    let calls = async {
        caller.await_peer_pid().await.unwrap();
        let reference = caller.eval("greeter", vec![]).await.unwrap();
        caller.stop().await.unwrap();
        reference
    };
    let (served, reference) = tokio::join!(worker.run(), calls);
    served.unwrap();

    let Value::Object(reference) = reference else {
        panic!("expected an object reference, got {:?}", reference);
    };
    assert_eq!(reference.class(), Some("Greeter"));
    assert_eq!(reference.operations(), ["greet".to_string()]);

    let store = caller.store();
    let value = Value::Object(reference);
    assert!(arraybridge::value::to_host_value(&value, store).is_ok());
    assert!(matches!(
        arraybridge::value::to_host_value(&value, store),
        Err(BridgeError::ReferenceConsumed(_))
    ));
}

/// A raw peer that speaks the wire protocol by hand.
#[tokio::test]
async fn test_unknown_tag_and_stray_reply() {
    let (local, mut peer) = in_memory_pair(4096);
    let mut worker = worker(local);

    let peer_side = async {
        let sign_on = Message::from(read_frame(&mut peer, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap());
        assert_eq!(sign_on.kind, MessageType::Pid);

        // a late reply for a call that no longer exists: no answer
        write_frame(&mut peer, MessageType::EvalRet.as_u8(), b"{}").await.unwrap();

        write_frame(&mut peer, 42, b"what").await.unwrap();
        let reply = Message::from(read_frame(&mut peer, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap());
        assert!(reply.is_error());
        assert_eq!(reply.text(), "unknown message type #42 / data:what");

        write_frame(&mut peer, MessageType::Stop.as_u8(), b"STOP").await.unwrap();
        let ack = Message::from(read_frame(&mut peer, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap());
        assert_eq!(ack.kind, MessageType::Stop);
    };
    let (served, ()) = tokio::join!(worker.run(), peer_side);

    served.unwrap();
    assert!(worker.is_stopped());
}

#[tokio::test]
async fn test_peer_disconnect_ends_run() {
    let (local, peer) = in_memory_pair(4096);
    let mut worker = worker(local);

    let peer_side = async move {
        let mut peer = peer;
        read_frame(&mut peer, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        drop(peer);
    };
    let (served, ()) = tokio::join!(worker.run(), peer_side);

    served.unwrap();
    assert!(worker.is_stopped());
}
