// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request / Response Credentials
//!
//! | Tag | Payload | Signed by |
//! |-----|---------|-----------|
//! | `LoginRequest` | `{randomString, origin, publicKey, callbackPath?}` | app (`did:jwk`) |
//! | `DataSharingRequest` | `{username}` | app (`did:jwk`) |
//! | `LoginResponse` | `{accountName}` | wallet (account DID) |
//! | `DataResponse` | `{data: {username?}}` | wallet (account DID) |
//!
//! [`WalletRequest::from_jwt`] and [`WalletResponse::from_jwt`] are the only
//! places that look at the tag; everything past them matches on the enums.

pub mod requests;
pub mod responses;

pub use requests::{
    DataSharingRequest, DataSharingRequestPayload, LoginRequest, LoginRequestPayload,
    WalletRequest, DATA_SHARING_REQUEST_TYPE, LOGIN_REQUEST_TYPE,
};
pub use responses::{
    DataResponse, DataResponsePayload, LoginResponse, LoginResponsePayload, SharedData,
    WalletResponse, DATA_RESPONSE_TYPE, LOGIN_RESPONSE_TYPE,
};
