// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The dual-wallet login handshake.
//!
//! ```text
//! relying party          broker                      wallet
//!   start() ── redirect ──▶ from_redirect()
//!                           open_session()  ◀── IdentifyMessage ── connect()
//!                           send_requests() ── LoginRequestsMessage ──▶
//!                                                     accept() / decline()
//!                           await_response() ◀── LoginRequestResponseMessage
//!   handle_callback() ◀──── finish() / fail()
//! ```
//!
//! Each peer tracks its progress in a [`HandshakeState`].

mod external;
mod payload;
mod sso;
mod state;
mod wallet;

pub use external::{ExternalLogin, ExternalLoginOptions, ExternalSession, SSO_LOGIN_PATH};
pub use payload::{
    append_payload, read_payload, CallbackPayload, Delivered, Delivery, RequestsUrlPayload,
    PAYLOAD_PARAM,
};
pub use sso::{SsoContext, SsoLogin};
pub use state::HandshakeState;
pub use wallet::WalletConsent;
