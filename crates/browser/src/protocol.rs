//! Chrome DevTools Protocol message envelopes and parser.
//!
//! The browser sends JSON frames of two shapes: command responses
//! (carrying the `id` of the command they answer) and events (carrying
//! a `method`). This module classifies incoming frames and types the
//! event payloads the runner cares about.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event fired when an in-page binding installed via
/// `Runtime.addBinding` is called.
pub const EVENT_BINDING_CALLED: &str = "Runtime.bindingCalled";

/// Event fired when the page's load event fires.
pub const EVENT_LOAD_FIRED: &str = "Page.loadEventFired";

/// Event fired for every page console call.
pub const EVENT_CONSOLE_CALLED: &str = "Runtime.consoleAPICalled";

/// Outgoing command frame.
#[derive(Debug, Serialize)]
pub struct CommandEnvelope<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Error payload attached to a failed command response.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFailure {
    pub code: i64,
    pub message: String,
}

/// One classified incoming frame.
#[derive(Debug)]
pub enum IncomingMessage {
    /// Answer to a previously issued command.
    Response {
        id: u64,
        outcome: Result<Value, CommandFailure>,
    },
    /// Unsolicited event.
    Event { method: String, params: Value },
}

/// Errors raised while parsing incoming frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is neither a command response nor an event")]
    UnknownShape,
}

/// Classify a raw text frame.
pub fn classify(frame: &str) -> Result<IncomingMessage, ProtocolError> {
    #[derive(Deserialize)]
    struct RawFrame {
        id: Option<u64>,
        result: Option<Value>,
        error: Option<CommandFailure>,
        method: Option<String>,
        params: Option<Value>,
    }

    let raw: RawFrame = serde_json::from_str(frame)?;
    match (raw.id, raw.method) {
        (Some(id), _) => {
            let outcome = match raw.error {
                Some(failure) => Err(failure),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            Ok(IncomingMessage::Response { id, outcome })
        }
        (None, Some(method)) => Ok(IncomingMessage::Event {
            method,
            params: raw.params.unwrap_or(Value::Null),
        }),
        (None, None) => Err(ProtocolError::UnknownShape),
    }
}

/// Payload of [`EVENT_BINDING_CALLED`].
#[derive(Debug, Deserialize)]
pub struct BindingCalled {
    pub name: String,
    /// Argument the page passed to the binding (always a string).
    pub payload: String,
}

/// Payload of [`EVENT_CONSOLE_CALLED`].
#[derive(Debug, Deserialize)]
pub struct ConsoleCalled {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
}

/// A remote object reference as sent in console events. Only the
/// by-value representation is used.
#[derive(Debug, Deserialize)]
pub struct RemoteObject {
    #[serde(default)]
    pub value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn response_with_result_is_classified() {
        let msg = classify(r#"{"id":3,"result":{"nodeId":12}}"#).expect("parses");
        assert_matches!(msg, IncomingMessage::Response { id: 3, outcome: Ok(value) } => {
            assert_eq!(value["nodeId"], 12);
        });
    }

    #[test]
    fn response_with_error_is_classified() {
        let msg = classify(r#"{"id":4,"error":{"code":-32000,"message":"boom"}}"#)
            .expect("parses");
        assert_matches!(msg, IncomingMessage::Response { id: 4, outcome: Err(failure) } => {
            assert_eq!(failure.code, -32000);
            assert_eq!(failure.message, "boom");
        });
    }

    #[test]
    fn event_is_classified() {
        let msg = classify(r#"{"method":"Page.loadEventFired","params":{"timestamp":1.5}}"#)
            .expect("parses");
        assert_matches!(msg, IncomingMessage::Event { method, params } => {
            assert_eq!(method, EVENT_LOAD_FIRED);
            assert_eq!(params["timestamp"], 1.5);
        });
    }

    #[test]
    fn binding_called_payload_parses() {
        let msg = classify(
            r#"{"method":"Runtime.bindingCalled","params":{"name":"__nestrunProgress","payload":"{\"iterations\":2}","executionContextId":1}}"#,
        )
        .expect("parses");
        let IncomingMessage::Event { params, .. } = msg else {
            panic!("expected event");
        };
        let binding: BindingCalled = serde_json::from_value(params).expect("payload parses");
        assert_eq!(binding.name, "__nestrunProgress");
        assert_eq!(binding.payload, r#"{"iterations":2}"#);
    }

    #[test]
    fn shapeless_frame_is_rejected() {
        assert_matches!(classify(r#"{"result":{}}"#), Err(ProtocolError::UnknownShape));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert_matches!(classify("not json"), Err(ProtocolError::Json(_)));
    }

    #[test]
    fn null_params_are_skipped_on_serialize() {
        let frame = serde_json::to_string(&CommandEnvelope {
            id: 1,
            method: "Page.enable",
            params: Value::Null,
        })
        .expect("serializes");
        assert_eq!(frame, r#"{"id":1,"method":"Page.enable"}"#);
    }
}
