// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Communication
//!
//! One shared, lazily connected transport per application, passed
//! explicitly to every component that talks to other peers.
//!
//! ## Wire events
//!
//! | Event | Direction | Payload | Ack |
//! |-------|-----------|---------|-----|
//! | `v1/login` | client → server | `{message: <AuthenticationMessage JWT>}` | `bool` |
//! | `v1/message/relay` | both | `{message: <JWT>}` | `{status, details \| error}` |
//! | `v1/verification/notify` | server → client | notification object | none |
//!
//! ## Listeners
//!
//! Every wait on an inbound message is a one-shot listener raced against a
//! timer ([`Communication::expect_message`]). The listener is released on
//! both sides of the race, and a message arriving after its waiter gave up
//! is ignored.

pub mod channel;
pub mod messages;
pub mod relay;
pub mod transport;

pub use channel::{Communication, InboundMessage, PendingMessage};
pub use messages::{
    sign_message, AuthenticationMessage, AuthenticationPayload, IdentifyMessage, IdentifyPayload,
    LinkAuthRequestMessage, LinkAuthRequestPayload, LinkAuthRequestResponseMessage,
    LinkAuthResponsePayload, LoginRequestResponseMessage, LoginRequestResponsePayload,
    LoginRequestsMessage, LoginRequestsPayload, Message, MESSAGE_TTL,
};
pub use relay::{LocalRelay, LocalTransport};
pub use transport::{
    RelayAck, Transport, TransportEvent, EVENT_LOGIN, EVENT_MESSAGE_RELAY,
    EVENT_VERIFICATION_NOTIFY,
};
