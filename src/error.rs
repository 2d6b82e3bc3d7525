//! Error types for arraybridge.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Truncated or oversized frame. The stream is desynchronized.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A message tag outside the protocol's closed set.
    #[error("unknown message type #{0}")]
    UnknownMessageType(u8),

    /// A value did not have the expected shape or kind.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Placeholder count does not match the number of supplied arguments.
    #[error("expression argument length mismatch: {found} placeholders, {expected} arguments")]
    Arity {
        /// Leading shape element of the argument array.
        expected: usize,
        /// Placeholders found outside string literals.
        found: usize,
    },

    /// Wrong rank or out-of-range index.
    #[error("Index error: {0}")]
    Index(String),

    /// The peer answered a request with ERROR.
    #[error("Remote error: {message}")]
    Remote {
        /// Message text reported by the peer.
        message: String,
        /// Structured diagnostic, when the peer sent one.
        diagnostic: Option<serde_json::Value>,
    },

    /// Object store has no entry for this reference.
    #[error("No object with reference: {0}")]
    UnknownReference(String),

    /// A decoded object reference was dereferenced a second time.
    #[error("Tried to use the same reference more than once: {0}")]
    ReferenceConsumed(String),

    /// Host script failed to parse.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Host script failed while running.
    #[error("{0}")]
    Runtime(String),

    /// A local interrupt cancelled the current operation.
    #[error("Interrupt")]
    Interrupted,

    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session has been stopped; nothing more can be sent.
    #[error("Session stopped")]
    Stopped,
}

impl BridgeError {
    /// Build a [`BridgeError::Remote`] from an ERROR payload.
    ///
    /// Payloads of the form `{"Message": .., "DMX": {..}}` are unpacked;
    /// anything else is taken as plain text.
    pub fn remote(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload).into_owned();

        let parsed: Option<serde_json::Value> = serde_json::from_str(&text).ok();
        let Some(obj) = parsed.as_ref().and_then(|v| v.as_object()) else {
            return BridgeError::Remote {
                message: text,
                diagnostic: None,
            };
        };

        let mut message = obj
            .get("Message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        let diagnostic = obj.get("DMX").cloned();

        if let Some(dmx_message) = diagnostic
            .as_ref()
            .and_then(|d| d.get("Message"))
            .and_then(|m| m.as_str())
        {
            if !dmx_message.trim().is_empty() {
                message.push_str(": ");
                message.push_str(dmx_message);
            }
        }

        BridgeError::Remote {
            message,
            diagnostic,
        }
    }

    /// True for failures that leave the byte stream unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::MalformedMessage(_)
                | BridgeError::ConnectionClosed
                | BridgeError::Stopped
        )
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_plain_text() {
        match BridgeError::remote(b"ZeroDivisionError('division by zero')") {
            BridgeError::Remote {
                message,
                diagnostic,
            } => {
                assert_eq!(message, "ZeroDivisionError('division by zero')");
                assert!(diagnostic.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_remote_structured_with_dmx() {
        let payload = br#"{"Message":"DOMAIN ERROR","DMX":{"Message":"Divide by zero","EN":11}}"#;
        match BridgeError::remote(payload) {
            BridgeError::Remote {
                message,
                diagnostic,
            } => {
                assert_eq!(message, "DOMAIN ERROR: Divide by zero");
                assert_eq!(diagnostic.unwrap()["EN"], 11);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_remote_blank_dmx_message_is_not_appended() {
        let payload = br#"{"Message":"VALUE ERROR","DMX":{"Message":"  "}}"#;
        let err = BridgeError::remote(payload);
        assert_eq!(err.to_string(), "Remote error: VALUE ERROR");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::ConnectionClosed.is_fatal());
        assert!(BridgeError::MalformedMessage("short".into()).is_fatal());
        assert!(!BridgeError::Interrupted.is_fatal());
        assert!(!BridgeError::Arity {
            expected: 1,
            found: 2
        }
        .is_fatal());
    }
}
