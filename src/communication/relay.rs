// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process relay server.
//!
//! Implements the server side of the wire events for peers living in one
//! process (tests and local tooling):
//!
//! - `v1/login` verifies the authentication message through the resolver
//!   and binds the connection to the sender DID
//! - `v1/message/relay` verifies the message, checks that its issuer is the
//!   DID the connection logged in as, and forwards it to every other
//!   connection logged in as the recipient DID
//!
//! Routing uses bare DIDs, so every session of one account receives the
//! account's messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use super::messages::AuthenticationMessage;
use super::transport::{
    Transport, TransportEvent, EVENT_LOGIN, EVENT_MESSAGE_RELAY, EVENT_VERIFICATION_NOTIFY,
};
use crate::did::{DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::vc::{UntypedCredential, VerifyOptions};

struct RelayConnection {
    sender: mpsc::UnboundedSender<TransportEvent>,
    /// Bare DID the connection logged in as
    did: Option<String>,
}

struct RelayInner {
    resolver: Arc<Resolver>,
    options: VerifyOptions,
    connections: Mutex<HashMap<u64, RelayConnection>>,
    next_id: AtomicU64,
}

/// In-process relay. Cheap to clone.
#[derive(Clone)]
pub struct LocalRelay {
    inner: Arc<RelayInner>,
}

impl LocalRelay {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self::with_options(resolver, VerifyOptions::default())
    }

    pub fn with_options(resolver: Arc<Resolver>, options: VerifyOptions) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                resolver,
                options,
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// A fresh client-side transport attached to this relay.
    pub fn transport(&self) -> LocalTransport {
        LocalTransport {
            relay: self.inner.clone(),
            connection: Mutex::new(None),
        }
    }

    /// Drop and re-establish every connection logged in as `did`.
    ///
    /// The connections lose their login and receive `Disconnected` then
    /// `Connected`, as after a network blip.
    pub fn reset_connection(&self, did: &DidUrl) {
        let did = did.did();
        let Ok(mut connections) = self.inner.connections.lock() else {
            return;
        };
        for connection in connections.values_mut() {
            if connection.did.as_deref() != Some(did.as_str()) {
                continue;
            }
            connection.did = None;
            let _ = connection.sender.send(TransportEvent::Disconnected);
            let _ = connection.sender.send(TransportEvent::Connected);
        }
        tracing::debug!(did = %did, "Relay reset connections");
    }

    /// Whether some connection is logged in as `did`.
    pub fn is_logged_in(&self, did: &DidUrl) -> bool {
        let did = did.did();
        self.inner
            .connections
            .lock()
            .map(|connections| {
                connections
                    .values()
                    .any(|c| c.did.as_deref() == Some(did.as_str()))
            })
            .unwrap_or(false)
    }

    /// Push a verification notification to the connections of `did`.
    pub fn notify_verification(&self, did: &DidUrl, payload: serde_json::Value) -> usize {
        self.inner.broadcast(&did.did(), None, EVENT_VERIFICATION_NOTIFY, payload)
    }

    pub fn connection_count(&self) -> usize {
        self.inner
            .connections
            .lock()
            .map(|connections| connections.len())
            .unwrap_or(0)
    }
}

impl RelayInner {
    fn bound_did(&self, id: u64) -> Option<String> {
        self.connections
            .lock()
            .ok()?
            .get(&id)
            .and_then(|c| c.did.clone())
    }

    /// Send to every connection bound to `did` except `skip`.
    fn broadcast(&self, did: &str, skip: Option<u64>, name: &str, payload: serde_json::Value) -> usize {
        let Ok(connections) = self.connections.lock() else {
            return 0;
        };
        connections
            .iter()
            .filter(|(id, c)| Some(**id) != skip && c.did.as_deref() == Some(did))
            .filter(|(_, c)| {
                c.sender
                    .send(TransportEvent::Event {
                        name: name.to_string(),
                        payload: payload.clone(),
                    })
                    .is_ok()
            })
            .count()
    }

    async fn login(&self, id: u64, payload: &serde_json::Value) -> bool {
        let Some(jwt) = payload.get("message").and_then(|m| m.as_str()) else {
            return false;
        };
        let message = match AuthenticationMessage::from_jwt(jwt) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Relay rejected malformed login");
                return false;
            }
        };
        match message.verify_with(&self.resolver, &self.options).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(did = %message.issuer(), "Relay rejected login signature");
                return false;
            }
            Err(e) => {
                tracing::warn!(did = %message.issuer(), error = %e, "Relay could not verify login");
                return false;
            }
        }

        let did = message.issuer().did();
        let Ok(mut connections) = self.connections.lock() else {
            return false;
        };
        match connections.get_mut(&id) {
            Some(connection) => {
                tracing::debug!(connection = id, did = %did, "Relay login");
                connection.did = Some(did);
                true
            }
            None => false,
        }
    }

    async fn relay(&self, id: u64, payload: &serde_json::Value) -> Result<serde_json::Value> {
        let Some(sender_did) = self.bound_did(id) else {
            return Ok(error_ack("not logged in"));
        };
        let Some(jwt) = payload.get("message").and_then(|m| m.as_str()) else {
            return Ok(error_ack("missing message"));
        };
        let message = match UntypedCredential::from_jwt(jwt) {
            Ok(message) => message,
            Err(e) => return Ok(error_ack(&e.to_string())),
        };
        if message.issuer().did() != sender_did {
            return Ok(error_ack("issuer is not the logged in DID"));
        }
        let Some(recipient) = message.subject() else {
            return Ok(error_ack("message has no recipient"));
        };
        if !message.verify_with(&self.resolver, &self.options).await? {
            return Ok(error_ack("message signature is not valid"));
        }

        let delivered = self.broadcast(
            &recipient.did(),
            Some(id),
            EVENT_MESSAGE_RELAY,
            json!({ "message": jwt }),
        );
        tracing::debug!(
            from = %sender_did,
            to = %recipient,
            kind = %message.credential_subject().kind,
            delivered,
            "Relayed message"
        );
        Ok(json!({ "status": "success", "details": { "delivered": delivered } }))
    }
}

fn error_ack(error: &str) -> serde_json::Value {
    json!({ "status": "error", "error": error })
}

/// Client end of a [`LocalRelay`].
pub struct LocalTransport {
    relay: Arc<RelayInner>,
    connection: Mutex<Option<u64>>,
}

impl LocalTransport {
    fn connection_id(&self) -> Option<u64> {
        self.connection.lock().ok().and_then(|id| *id)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<TransportEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        sender
            .send(TransportEvent::Connected)
            .map_err(|_| SdkError::CommunicationNotConnected)?;

        let id = self.relay.next_id.fetch_add(1, Ordering::Relaxed);
        self.relay
            .connections
            .lock()
            .map_err(|_| SdkError::Internal("relay registry poisoned".to_string()))?
            .insert(id, RelayConnection { sender, did: None });

        let previous = self
            .connection
            .lock()
            .map_err(|_| SdkError::Internal("transport state poisoned".to_string()))?
            .replace(id);
        if let Some(previous) = previous {
            if let Ok(mut connections) = self.relay.connections.lock() {
                connections.remove(&previous);
            }
        }
        Ok(receiver)
    }

    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let id = self
            .connection_id()
            .ok_or(SdkError::CommunicationNotConnected)?;
        match event {
            EVENT_LOGIN => Ok(serde_json::Value::Bool(self.relay.login(id, &payload).await)),
            EVENT_MESSAGE_RELAY => self.relay.relay(id, &payload).await,
            other => Ok(error_ack(&format!("unknown event {other}"))),
        }
    }

    async fn close(&self) {
        let id = self.connection.lock().ok().and_then(|mut id| id.take());
        if let Some(id) = id {
            if let Ok(mut connections) = self.relay.connections.lock() {
                connections.remove(&id);
            }
        }
    }
}
