// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Socket abstraction under [`Communication`](super::Communication).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Client-to-server authentication event. Ack: `bool`.
pub const EVENT_LOGIN: &str = "v1/login";
/// Message relay event, both directions. Payload: `{message: <JWT>}`.
/// Ack: `{status: "success", details}` or `{status: "error", error}`.
pub const EVENT_MESSAGE_RELAY: &str = "v1/message/relay";
/// Server-pushed verification notifications.
pub const EVENT_VERIFICATION_NOTIFY: &str = "v1/verification/notify";

/// What the connection reports to the channel's reader task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket is (re)connected.
    Connected,
    Disconnected,
    /// Server-pushed event.
    Event {
        name: String,
        payload: serde_json::Value,
    },
}

/// A socket with acknowledged emits.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the socket. Inbound events, `Connected` first, arrive on the
    /// returned receiver until the socket is closed.
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Emit `event` and wait for the server's acknowledgement.
    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<serde_json::Value>;

    /// Close the socket. Closing a closed socket is a no-op.
    async fn close(&self);
}

/// Acknowledgement of a relayed message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RelayAck {
    Success {
        #[serde(default)]
        details: serde_json::Value,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acks_use_status_tag() {
        let ack: RelayAck =
            serde_json::from_value(serde_json::json!({"status": "error", "error": "offline"})).unwrap();
        assert_eq!(ack, RelayAck::Error { error: "offline".into() });

        let ack: RelayAck = serde_json::from_value(serde_json::json!({"status": "success"})).unwrap();
        assert_eq!(ack, RelayAck::Success { details: serde_json::Value::Null });
    }
}
