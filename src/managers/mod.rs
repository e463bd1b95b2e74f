// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request / Response Managers
//!
//! Built per login attempt from a URL or message payload and dropped after
//! hand-off. Nothing here is persisted.
//!
//! - [`RequestsManager`] - decode, categorize and verify a request bundle
//! - [`ResponsesManager`] - pair requests with apps and signed responses
//! - [`DualWalletRequests`] / [`DualWalletResponse`] - the broker and
//!   relying-party legs of one handshake

pub mod dual;
pub mod requests;
pub mod responses;

pub use dual::{
    DualWalletRequests, DualWalletRequestsPayload, DualWalletResponse, DualWalletResponsePayload,
};
pub use requests::RequestsManager;
pub use responses::{PairsPayload, RequestMeta, RequestResponsePair, ResponsesManager};
