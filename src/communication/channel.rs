// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The shared communication channel.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::messages::{AuthenticationMessage, Message};
use super::transport::{
    RelayAck, Transport, TransportEvent, EVENT_LOGIN, EVENT_MESSAGE_RELAY,
    EVENT_VERIFICATION_NOTIFY,
};
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::vc::{peek_type, CredentialPayload};

/// A relayed message, decoded as far as its type tag.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    jwt: String,
    message_type: String,
}

impl InboundMessage {
    pub fn from_jwt(jwt: impl Into<String>) -> Result<Self> {
        let jwt = jwt.into();
        let message_type = peek_type(&jwt)?;
        Ok(Self { jwt, message_type })
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    pub fn decode<T: CredentialPayload>(&self) -> Result<Message<T>> {
        Message::<T>::from_jwt(&self.jwt)
    }
}

type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
type VerificationHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

enum Listener {
    Message {
        message_type: Option<String>,
        handler: MessageHandler,
    },
    Verification(VerificationHandler),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

#[derive(Default)]
struct AuthState {
    logged_in: bool,
    /// Replayed on reconnect
    auth_message: Option<String>,
}

struct Connection {
    cancel: CancellationToken,
}

struct Shared {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    registry: Mutex<Registry>,
    auth: Mutex<AuthState>,
    connection: tokio::sync::Mutex<Option<Connection>>,
}

/// Handle to one shared transport.
///
/// Cheap to clone; all clones share the connection, the login state and
/// the listener registry. Created by the application and passed to every
/// component that talks to other peers.
#[derive(Clone)]
pub struct Communication {
    shared: Arc<Shared>,
}

impl Communication {
    /// `timeout` bounds connect, login and every acknowledged emit.
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                timeout,
                registry: Mutex::new(Registry::default()),
                auth: Mutex::new(AuthState::default()),
                connection: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &SdkConfig) -> Self {
        Self::new(transport, config.communication_timeout)
    }

    /// Open the transport and wait for its connect acknowledgement.
    /// Connecting a connected channel is a no-op.
    pub async fn connect(&self) -> Result<()> {
        let mut connection = self.shared.connection.lock().await;
        if connection.is_some() {
            return Ok(());
        }

        let mut events = self.shared.transport.connect().await?;
        match tokio::time::timeout(self.shared.timeout, events.recv()).await {
            Ok(Some(TransportEvent::Connected)) => {}
            Ok(_) => {
                self.shared.transport.close().await;
                return Err(SdkError::CommunicationNotConnected);
            }
            Err(_) => {
                self.shared.transport.close().await;
                return Err(SdkError::CommunicationTimeout("connect".to_string()));
            }
        }

        let cancel = CancellationToken::new();
        tokio::spawn(run_reader(
            Arc::downgrade(&self.shared),
            events,
            cancel.clone(),
        ));
        *connection = Some(Connection { cancel });
        tracing::debug!("Communication channel connected");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.connection.lock().await.is_some()
    }

    pub fn is_logged_in(&self) -> bool {
        self.shared
            .auth
            .lock()
            .map(|auth| auth.logged_in)
            .unwrap_or(false)
    }

    /// Authenticate as the sender of `message`, connecting first if needed.
    ///
    /// The message is cached and replayed whenever the transport reconnects.
    pub async fn login(&self, message: &AuthenticationMessage) -> Result<()> {
        self.connect().await?;
        if !self.shared.emit_login(message.jwt()).await? {
            tracing::warn!(did = %message.issuer(), "Communication login rejected");
            return Err(SdkError::CommunicationNotLoggedIn);
        }

        if let Ok(mut auth) = self.shared.auth.lock() {
            auth.logged_in = true;
            auth.auth_message = Some(message.jwt().to_string());
        }
        tracing::info!(did = %message.issuer(), "Logged in to communication channel");
        Ok(())
    }

    /// Relay a signed message. Returns the acknowledgement details.
    pub async fn send_message(&self, jwt: &str) -> Result<serde_json::Value> {
        if !self.is_logged_in() {
            return Err(SdkError::CommunicationNotLoggedIn);
        }
        let ack = self
            .shared
            .emit(EVENT_MESSAGE_RELAY, json!({ "message": jwt }))
            .await?;
        match serde_json::from_value(ack)? {
            RelayAck::Success { details } => Ok(details),
            RelayAck::Error { error } => Err(SdkError::MessageSendFailed(error)),
        }
    }

    /// Typed convenience over [`send_message`](Self::send_message).
    pub async fn send<T: CredentialPayload>(&self, message: &Message<T>) -> Result<serde_json::Value> {
        self.send_message(message.jwt()).await
    }

    /// Register `handler` for inbound messages, optionally only those of
    /// `message_type`. Returns the id for [`unsubscribe_message`](Self::unsubscribe_message).
    pub fn subscribe_message<F>(&self, handler: F, message_type: Option<&str>) -> u64
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.add_listener(Listener::Message {
            message_type: message_type.map(str::to_string),
            handler: Arc::new(handler),
        })
    }

    /// Remove a message listener. Returns whether it was registered.
    pub fn unsubscribe_message(&self, id: u64) -> bool {
        self.shared.remove_listener(id)
    }

    /// Register `handler` for out-of-band verification notifications.
    pub fn subscribe_verification<F>(&self, handler: F) -> u64
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.shared
            .add_listener(Listener::Verification(Arc::new(handler)))
    }

    pub fn unsubscribe_verification(&self, id: u64) -> bool {
        self.shared.remove_listener(id)
    }

    /// Number of registered listeners of any kind.
    pub fn listener_count(&self) -> usize {
        self.shared
            .registry
            .lock()
            .map(|registry| registry.listeners.len())
            .unwrap_or(0)
    }

    /// Register a one-shot listener for the first `message_type` message
    /// accepted by `predicate`.
    ///
    /// The listener exists from this call on, so it can be set up before
    /// the message that triggers the reply is sent. It is removed when the
    /// returned [`PendingMessage`] resolves, times out or is dropped.
    pub fn expect_message<F>(&self, message_type: &str, predicate: F) -> PendingMessage
    where
        F: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.subscribe_message(
            move |message| {
                if !predicate(message) {
                    return;
                }
                let sender = slot.lock().ok().and_then(|mut slot| slot.take());
                if let Some(sender) = sender {
                    let _ = sender.send(message.clone());
                }
            },
            Some(message_type),
        );

        PendingMessage {
            message_type: message_type.to_string(),
            rx,
            guard: ListenerGuard {
                shared: Arc::downgrade(&self.shared),
                id,
            },
        }
    }

    /// Tear down the transport and forget the login. Idempotent.
    pub async fn disconnect(&self) {
        let connection = self.shared.connection.lock().await.take();
        if let Ok(mut auth) = self.shared.auth.lock() {
            *auth = AuthState::default();
        }
        if let Some(connection) = connection {
            connection.cancel.cancel();
            self.shared.transport.close().await;
            tracing::info!("Communication channel disconnected");
        }
    }
}

impl Shared {
    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        tokio::time::timeout(self.timeout, self.transport.emit(event, payload))
            .await
            .map_err(|_| SdkError::CommunicationTimeout(event.to_string()))?
    }

    async fn emit_login(&self, jwt: &str) -> Result<bool> {
        let ack = self.emit(EVENT_LOGIN, json!({ "message": jwt })).await?;
        Ok(ack.as_bool().unwrap_or(false))
    }

    fn add_listener(&self, listener: Listener) -> u64 {
        let Ok(mut registry) = self.registry.lock() else {
            return 0;
        };
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.insert(id, listener);
        id
    }

    fn remove_listener(&self, id: u64) -> bool {
        self.registry
            .lock()
            .map(|mut registry| registry.listeners.remove(&id).is_some())
            .unwrap_or(false)
    }

    fn is_registered(&self, id: u64) -> bool {
        self.registry
            .lock()
            .map(|registry| registry.listeners.contains_key(&id))
            .unwrap_or(false)
    }

    /// Replay the cached login after the transport reconnected.
    async fn resume_session(&self) {
        let cached = self
            .auth
            .lock()
            .ok()
            .and_then(|auth| auth.auth_message.clone());
        let Some(jwt) = cached else {
            return;
        };

        match self.emit_login(&jwt).await {
            Ok(true) => {
                if let Ok(mut auth) = self.auth.lock() {
                    auth.logged_in = true;
                }
                tracing::info!("Communication session resumed");
            }
            Ok(false) => tracing::warn!("Session resumption rejected by server"),
            Err(e) => tracing::warn!(error = %e, "Session resumption failed"),
        }
    }

    fn dispatch(&self, name: &str, payload: &serde_json::Value) {
        match name {
            EVENT_MESSAGE_RELAY => {
                let Some(jwt) = payload.get("message").and_then(|m| m.as_str()) else {
                    tracing::warn!("Relayed event without message");
                    return;
                };
                let message = match InboundMessage::from_jwt(jwt) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping undecodable relayed message");
                        return;
                    }
                };
                let handlers: Vec<(u64, MessageHandler)> = match self.registry.lock() {
                    Ok(registry) => registry
                        .listeners
                        .iter()
                        .filter_map(|(id, listener)| match listener {
                            Listener::Message {
                                message_type,
                                handler,
                            } if message_type
                                .as_deref()
                                .is_none_or(|t| t == message.message_type()) =>
                            {
                                Some((*id, handler.clone()))
                            }
                            _ => None,
                        })
                        .collect(),
                    Err(_) => return,
                };
                for (id, handler) in handlers {
                    // A handler may have unsubscribed another one.
                    if self.is_registered(id) {
                        handler(&message);
                    }
                }
            }
            EVENT_VERIFICATION_NOTIFY => {
                let handlers: Vec<(u64, VerificationHandler)> = match self.registry.lock() {
                    Ok(registry) => registry
                        .listeners
                        .iter()
                        .filter_map(|(id, listener)| match listener {
                            Listener::Verification(handler) => Some((*id, handler.clone())),
                            Listener::Message { .. } => None,
                        })
                        .collect(),
                    Err(_) => return,
                };
                for (id, handler) in handlers {
                    if self.is_registered(id) {
                        handler(payload);
                    }
                }
            }
            other => tracing::debug!(event = other, "Ignoring unknown event"),
        }
    }
}

async fn run_reader(
    shared: Weak<Shared>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };
        let Some(shared) = shared.upgrade() else {
            return;
        };

        match event {
            Some(TransportEvent::Connected) => shared.resume_session().await,
            Some(TransportEvent::Disconnected) => {
                if let Ok(mut auth) = shared.auth.lock() {
                    auth.logged_in = false;
                }
                tracing::debug!("Transport disconnected, waiting for reconnect");
            }
            Some(TransportEvent::Event { name, payload }) => shared.dispatch(&name, &payload),
            None => {
                // Transport closed underneath us.
                if !cancel.is_cancelled() {
                    shared.connection.lock().await.take();
                    if let Ok(mut auth) = shared.auth.lock() {
                        auth.logged_in = false;
                    }
                    tracing::warn!("Communication transport closed");
                }
                return;
            }
        }
    }
}

/// Removes its listener when dropped.
struct ListenerGuard {
    shared: Weak<Shared>,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_listener(self.id);
        }
    }
}

/// A one-shot wait registered by [`Communication::expect_message`].
pub struct PendingMessage {
    message_type: String,
    rx: oneshot::Receiver<InboundMessage>,
    guard: ListenerGuard,
}

impl PendingMessage {
    /// Listener id, for diagnostics.
    pub fn listener_id(&self) -> u64 {
        self.guard.id
    }

    /// Wait up to `timeout` for the message. The listener is released on
    /// every outcome; a message arriving later is ignored.
    pub async fn recv(self, timeout: Duration) -> Result<InboundMessage> {
        let PendingMessage {
            message_type,
            rx,
            guard,
        } = self;
        let outcome = tokio::time::timeout(timeout, rx).await;
        drop(guard);

        match outcome {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(SdkError::Internal(format!(
                "listener for {message_type} dropped its sender"
            ))),
            Err(_) => Err(SdkError::CommunicationTimeout(message_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::communication::messages::{sign_message, AuthenticationPayload, IdentifyPayload};
    use crate::communication::LocalRelay;
    use crate::testing::{jwk_issuer, jwk_resolver};
    use crate::vc::Issuer;

    const TIMEOUT: Duration = Duration::from_millis(500);

    async fn logged_in(relay: &LocalRelay, issuer: &Issuer) -> Communication {
        let communication = Communication::new(Arc::new(relay.transport()), TIMEOUT);
        let auth = sign_message(AuthenticationPayload {}, issuer, &issuer.did_url)
            .await
            .unwrap();
        communication.login(&auth).await.unwrap();
        communication
    }

    async fn identify(from: &Issuer, to: &Issuer) -> String {
        sign_message(
            IdentifyPayload {
                account_name: "alice".parse().unwrap(),
            },
            from,
            &to.did_url,
        )
        .await
        .unwrap()
        .jwt()
        .to_string()
    }

    #[tokio::test]
    async fn send_requires_login() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let communication = Communication::new(Arc::new(relay.transport()), TIMEOUT);
        let err = communication.send_message("a.b.c").await.unwrap_err();
        assert_eq!(err.code(), "CommunicationNotLoggedIn");
    }

    #[tokio::test]
    async fn relay_refusal_is_a_send_failure() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let (alice, bob, mallory) = (jwk_issuer(), jwk_issuer(), jwk_issuer());
        let alice_channel = logged_in(&relay, &alice).await;
        let _bob_channel = logged_in(&relay, &bob).await;

        // Signed by someone other than the logged in DID.
        let err = alice_channel
            .send_message(&identify(&mallory, &bob).await)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MessageSendFailed");
        assert!(err.to_string().contains("issuer"));

        let err = alice_channel.send_message("a.b.c").await.unwrap_err();
        assert_eq!(err.code(), "MessageSendFailed");

        alice_channel.send_message(&identify(&alice, &bob).await).await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let (alice, bob) = (jwk_issuer(), jwk_issuer());
        let alice_channel = logged_in(&relay, &alice).await;
        let bob_channel = logged_in(&relay, &bob).await;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = bob_channel.subscribe_message(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Some(IdentifyPayload::TYPE),
        );

        let pending = bob_channel.expect_message(IdentifyPayload::TYPE, |_| true);
        alice_channel.send_message(&identify(&alice, &bob).await).await.unwrap();
        pending.recv(TIMEOUT).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(bob_channel.unsubscribe_message(id));
        assert!(!bob_channel.unsubscribe_message(id));

        let pending = bob_channel.expect_message(IdentifyPayload::TYPE, |_| true);
        alice_channel.send_message(&identify(&alice, &bob).await).await.unwrap();
        pending.recv(TIMEOUT).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn type_filter_skips_other_messages() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let (alice, bob) = (jwk_issuer(), jwk_issuer());
        let alice_channel = logged_in(&relay, &alice).await;
        let bob_channel = logged_in(&relay, &bob).await;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bob_channel.subscribe_message(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Some("LinkAuthRequestMessage"),
        );

        let pending = bob_channel.expect_message(IdentifyPayload::TYPE, |_| true);
        alice_channel.send_message(&identify(&alice, &bob).await).await.unwrap();
        let message = pending.recv(TIMEOUT).await.unwrap();
        assert_eq!(message.message_type(), IdentifyPayload::TYPE);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expect_message_releases_listener_on_timeout() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let channel = logged_in(&relay, &jwk_issuer()).await;
        let before = channel.listener_count();

        let pending = channel.expect_message(IdentifyPayload::TYPE, |_| true);
        assert_eq!(channel.listener_count(), before + 1);
        let err = pending.recv(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.code(), "CommunicationTimeout");
        assert_eq!(channel.listener_count(), before);

        drop(channel.expect_message(IdentifyPayload::TYPE, |_| true));
        assert_eq!(channel.listener_count(), before);
    }

    #[tokio::test]
    async fn reconnect_resumes_session() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let (alice, bob) = (jwk_issuer(), jwk_issuer());
        let alice_channel = logged_in(&relay, &alice).await;
        let bob_channel = logged_in(&relay, &bob).await;

        relay.reset_connection(&bob.did_url);
        // The reader replays the cached login on the reconnect event.
        for _ in 0..50 {
            if relay.is_logged_in(&bob.did_url) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(relay.is_logged_in(&bob.did_url));

        let pending = bob_channel.expect_message(IdentifyPayload::TYPE, |_| true);
        alice_channel.send_message(&identify(&alice, &bob).await).await.unwrap();
        pending.recv(TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let channel = logged_in(&relay, &jwk_issuer()).await;
        assert!(channel.is_logged_in());

        channel.disconnect().await;
        channel.disconnect().await;
        assert!(!channel.is_logged_in());
        assert!(!channel.is_connected().await);
        assert_eq!(
            channel.send_message("a.b.c").await.unwrap_err().code(),
            "CommunicationNotLoggedIn"
        );
    }

    #[tokio::test]
    async fn verification_notifications_reach_subscribers() {
        let relay = LocalRelay::new(Arc::new(jwk_resolver()));
        let issuer = jwk_issuer();
        let channel = logged_in(&relay, &issuer).await;

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = channel.subscribe_verification(move |payload| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(payload.clone());
            }
        });

        relay.notify_verification(&issuer.did_url, json!({"status": "approved"}));
        let payload = tokio::time::timeout(TIMEOUT, rx).await.unwrap().unwrap();
        assert_eq!(payload["status"], "approved");
        assert!(channel.unsubscribe_verification(id));
    }
}
