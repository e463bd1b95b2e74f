// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational ID SDK - DID Wallet Authentication
//!
//! Signed verifiable credentials, a shared message channel and the
//! dual-wallet login handshake between a relying party, an SSO broker and
//! the user's wallet.
//!
//! ## Modules
//!
//! - `keys` - key levels, key storage and signing (secp256k1)
//! - `did` - DID URLs and resolution (`did:jwk`, chain account DIDs)
//! - `vc` - JWT verifiable credentials
//! - `credentials` - typed login and data sharing requests/responses
//! - `managers` - request/response bundles and their cross-checks
//! - `communication` - authenticated pub/sub message channel
//! - `handshake` - relying party, broker and wallet sides of the login
//! - `link_auth` - just-in-time permission linking
//! - `user` - the wallet user: keys, session and on-chain identity
//! - `chain`, `storage` - collaborator interfaces with in-memory backends

pub mod chain;
pub mod communication;
pub mod config;
pub mod credentials;
pub mod did;
pub mod encoding;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod link_auth;
pub mod managers;
pub mod storage;
pub mod telemetry;
pub mod user;
pub mod vc;

#[cfg(test)]
mod testing;

pub use config::SdkConfig;
pub use error::{ErrorBody, ErrorCategory, Result, SdkError};
