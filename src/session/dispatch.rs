//! Inbound message dispatch.
//!
//! Every request gets exactly one reply. Failures while serving a request
//! become an ERROR reply; only transport failures escape.

use tracing::{debug, warn};

use super::{Session, SessionState};
use crate::error::{BridgeError, Result};
use crate::evaluator;
use crate::protocol::{Message, MessageType};
use crate::script::BoxFuture;
use crate::transport::Transport;
use crate::value::{json, Array, Value};

impl<T: Transport> Session<T> {
    /// Serve one incoming message.
    ///
    /// Boxed because serving EVAL can call back into the peer, which
    /// dispatches again while waiting for the answer.
    pub(crate) fn dispatch(&mut self, message: Message) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug!(
                "Dispatching {} ({} bytes)",
                message.kind,
                message.payload.len()
            );
            match message.kind {
                MessageType::Ok => self.send(MessageType::Ok, &message.payload).await,
                MessageType::Pid => {
                    let pid = std::process::id().to_string();
                    self.send(MessageType::Pid, pid.as_bytes()).await
                }
                MessageType::Stop => {
                    self.send(MessageType::Stop, b"STOP").await?;
                    debug!("Peer requested STOP");
                    self.state = SessionState::Stopped;
                    Ok(())
                }
                MessageType::Repr => {
                    let result = evaluator::repr(&mut *self, &message.text()).await;
                    self.reply(MessageType::ReprRet, result.map(String::into_bytes))
                        .await
                }
                MessageType::Exec => {
                    let result = evaluator::exec(&mut *self, &message.text()).await;
                    self.reply(MessageType::Ok, result.map(|()| Vec::new())).await
                }
                MessageType::Eval => {
                    let result = self.serve_eval(&message.payload).await;
                    self.reply(MessageType::EvalRet, result).await
                }
                MessageType::DebugRoundTrip => {
                    let result = json::decode(&message.payload).and_then(|value| {
                        debug!("Round trip value: {:?}", value);
                        json::encode(&value)
                    });
                    self.reply(MessageType::DebugRoundTrip, result).await
                }
                MessageType::EvalRet | MessageType::ReprRet | MessageType::Error => {
                    warn!("Ignoring stray {} message", message.kind);
                    Ok(())
                }
                MessageType::Unknown(tag) => {
                    warn!("Unknown message type #{}", tag);
                    let text = format!(
                        "{} / data:{}",
                        BridgeError::UnknownMessageType(tag),
                        message.text()
                    );
                    self.send(MessageType::Error, text.as_bytes()).await
                }
            }
        })
    }

    async fn serve_eval(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let request = json::decode(payload)?;
        let (code, args) = eval_request(request)?;
        let result = evaluator::evaluate(&mut *self, &code, &args).await?;
        json::encode(&result)
    }

    /// Send `kind` with the result, or ERROR with the failure text.
    async fn reply(&mut self, kind: MessageType, result: Result<Vec<u8>>) -> Result<()> {
        match result {
            Ok(payload) => self.send(kind, &payload).await,
            Err(e) if e.is_fatal() && self.is_stopped() => Err(e),
            Err(e) => {
                debug!("Request failed: {}", e);
                self.send(MessageType::Error, e.to_string().as_bytes()).await
            }
        }
    }
}

/// Split an EVAL payload into code and argument vector.
fn eval_request(request: Value) -> Result<(String, Array)> {
    let Value::Array(array) = request else {
        return Err(BridgeError::MalformedMessage(
            "EVAL expects a ⍴=2 array".into(),
        ));
    };
    if array.shape() != [2] {
        return Err(BridgeError::MalformedMessage(
            "EVAL expects a ⍴=2 array".into(),
        ));
    }
    let mut parts = array.into_data().into_iter();
    let (Some(code), Some(args)) = (parts.next(), parts.next()) else {
        return Err(BridgeError::MalformedMessage(
            "EVAL expects a ⍴=2 array".into(),
        ));
    };
    let code = code.to_text().ok_or_else(|| {
        BridgeError::TypeMismatch("first element of EVAL must be the code string".into())
    })?;
    match args {
        Value::Array(args) if args.rank() == 1 => Ok((code, args)),
        _ => Err(BridgeError::TypeMismatch(
            "second element of EVAL must be a vector of arguments".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_frame, DEFAULT_MAX_PAYLOAD_SIZE};
    use crate::script::{exec_source, Host};
    use crate::session::SessionBuilder;
    use crate::transport::{in_memory_pair, MemoryTransport};
    use crate::value::text_value;
    use std::time::Duration;

    struct Harness {
        session: Session<MemoryTransport>,
        peer: MemoryTransport,
    }

    impl Harness {
        fn new() -> Self {
            let (local, peer) = in_memory_pair(64 * 1024);
            let session = SessionBuilder::new()
                .sign_on(false)
                .poll_interval(Duration::from_millis(5))
                .without_interrupter()
                .build(local);
            Self { session, peer }
        }

        /// Deliver one frame to the session and return its reply.
        async fn roundtrip(&mut self, kind: MessageType, payload: &[u8]) -> Message {
            self.session.start().await.unwrap();
            self.session
                .dispatch(Message::new(kind, payload.to_vec()))
                .await
                .unwrap();
            Message::from(
                read_frame(&mut self.peer, DEFAULT_MAX_PAYLOAD_SIZE)
                    .await
                    .unwrap(),
            )
        }
    }

    fn eval_payload(code: &str, args: Vec<Value>) -> Vec<u8> {
        let request = Value::Array(Array::vector(vec![
            text_value(code, false),
            Value::Array(Array::vector(args)),
        ]));
        json::encode(&request).unwrap()
    }

    #[tokio::test]
    async fn test_ok_echoes_payload() {
        let mut h = Harness::new();
        let reply = h.roundtrip(MessageType::Ok, b"hello").await;
        assert_eq!(reply.kind, MessageType::Ok);
        assert_eq!(reply.text(), "hello");
    }

    #[tokio::test]
    async fn test_pid_reports_own_process() {
        let mut h = Harness::new();
        let reply = h.roundtrip(MessageType::Pid, b"").await;
        assert_eq!(reply.text(), std::process::id().to_string());
    }

    #[tokio::test]
    async fn test_stop_acknowledges_and_stops() {
        let mut h = Harness::new();
        let reply = h.roundtrip(MessageType::Stop, b"STOP").await;
        assert_eq!(reply.kind, MessageType::Stop);
        assert!(h.session.is_stopped());
    }

    #[tokio::test]
    async fn test_exec_then_repr_share_environment() {
        let mut h = Harness::new();
        let reply = h.roundtrip(MessageType::Exec, b"x = [1, 2]\ny = 'a'").await;
        assert_eq!(reply.kind, MessageType::Ok);
        assert_eq!(reply.text(), "");

        let reply = h.roundtrip(MessageType::Repr, b"(x, y)").await;
        assert_eq!(reply.kind, MessageType::ReprRet);
        assert_eq!(reply.text(), "[[1, 2], 'a']");
    }

    #[tokio::test]
    async fn test_repr_failure_replies_error() {
        let mut h = Harness::new();
        let reply = h.roundtrip(MessageType::Repr, b"1 // 0").await;
        assert!(reply.is_error());
        assert!(reply.text().contains("ZeroDivisionError"));
        assert!(!h.session.is_stopped());
    }

    #[tokio::test]
    async fn test_eval_adds_arguments() {
        let mut h = Harness::new();
        let payload = eval_payload("⎕+⎕", vec![Value::from(2i64), Value::from(3i64)]);
        let reply = h.roundtrip(MessageType::Eval, &payload).await;
        assert_eq!(reply.kind, MessageType::EvalRet);
        assert_eq!(reply.text(), r#"{"r":[],"d":[5],"t":0}"#);
    }

    #[tokio::test]
    async fn test_eval_arity_mismatch() {
        let mut h = Harness::new();
        let payload = eval_payload("⎕", vec![Value::from(1i64), Value::from(2i64)]);
        let reply = h.roundtrip(MessageType::Eval, &payload).await;
        assert!(reply.is_error());
        assert!(reply.text().contains("expression argument length mismatch"));
    }

    #[tokio::test]
    async fn test_eval_rejects_bad_payloads() {
        let mut h = Harness::new();

        let reply = h.roundtrip(MessageType::Eval, b"not json").await;
        assert!(reply.is_error());

        let three = json::encode(&Value::Array(Array::vector(vec![
            Value::from(1i64),
            Value::from(2i64),
            Value::from(3i64),
        ])))
        .unwrap();
        let reply = h.roundtrip(MessageType::Eval, &three).await;
        assert!(reply.text().contains("EVAL expects a ⍴=2 array"));
    }

    #[tokio::test]
    async fn test_eval_returns_namespace() {
        let mut h = Harness::new();
        exec_source(&mut h.session, "items = {'a': 1}").await.unwrap();
        let payload = eval_payload("items", vec![]);
        let reply = h.roundtrip(MessageType::Eval, &payload).await;
        assert_eq!(reply.text(), r#"{"ns":{"a":{"r":[],"d":[1],"t":0}}}"#);
    }

    #[tokio::test]
    async fn test_debug_roundtrip() {
        let mut h = Harness::new();
        let payload = br#"{"r":[2],"d":[1,2],"t":0}"#;
        let reply = h.roundtrip(MessageType::DebugRoundTrip, payload).await;
        assert_eq!(reply.kind, MessageType::DebugRoundTrip);
        assert_eq!(reply.payload.as_ref(), payload);
    }

    #[tokio::test]
    async fn test_deeply_nested_repr_replies_error() {
        let mut h = Harness::new();
        let code = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let reply = h.roundtrip(MessageType::Repr, code.as_bytes()).await;
        assert!(reply.is_error());
        assert!(reply.text().contains("nested too deeply"), "{}", reply.text());

        let code = format!("{}1{}", "(".repeat(60), ")".repeat(60));
        let reply = h.roundtrip(MessageType::Repr, code.as_bytes()).await;
        assert_eq!(reply.kind, MessageType::ReprRet);
        assert_eq!(reply.text(), "1");
    }

    #[tokio::test]
    async fn test_huge_shape_replies_error() {
        let mut h = Harness::new();
        let payload = br#"{"r":[4611686018427387904],"d":[1]}"#;
        let reply = h.roundtrip(MessageType::DebugRoundTrip, payload).await;
        assert!(reply.is_error());
        assert!(!h.session.is_stopped());

        let reply = h.roundtrip(MessageType::Ok, b"still here").await;
        assert_eq!(reply.text(), "still here");
    }

    #[tokio::test]
    async fn test_unknown_tag_replies_error() {
        let mut h = Harness::new();
        let reply = h.roundtrip(MessageType::Unknown(42), b"zz").await;
        assert!(reply.is_error());
        assert_eq!(reply.text(), "unknown message type #42 / data:zz");
    }

    #[tokio::test]
    async fn test_stray_replies_are_ignored() {
        let mut h = Harness::new();
        h.session.start().await.unwrap();
        h.session
            .dispatch(Message::new(MessageType::EvalRet, b"{}".to_vec()))
            .await
            .unwrap();

        // nothing was sent for the stray reply; the next frame is the echo
        let reply = h.roundtrip(MessageType::Ok, b"after").await;
        assert_eq!(reply.text(), "after");
        assert_eq!(h.session.env().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_request() {
        let mut h = Harness::new();
        h.session.interrupt_handle().trigger();
        let reply = h.roundtrip(MessageType::Exec, b"x = 1").await;
        assert!(reply.is_error());
        assert_eq!(reply.text(), "Interrupt");
        assert!(!h.session.env().contains("x"));

        let reply = h.roundtrip(MessageType::Exec, b"x = 1").await;
        assert_eq!(reply.kind, MessageType::Ok);
    }
}
