// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verifiable Credentials
//!
//! JWT-encoded credentials signed with ES256K, verified against keys
//! resolved from the issuer's DID.
//!
//! ```text
//! header  {"alg":"ES256K","typ":"JWT","kid":"<issuer DID URL>"}
//! claims  {iss, sub?, nbf, iat, exp?, jti,
//!          vc: {"@context", type, credentialSubject}}
//! ```
//!
//! [`TypedCredential`] adds a `{payload, type}` subject so that one decode
//! step can dispatch on the tag.

pub mod credential;
pub mod jws;
pub mod typed;

pub use credential::{Issuer, JwtClaims, SignOptions, VerifiableCredential, VerifyOptions};
pub use typed::{peek_type, CredentialPayload, TypedCredential, TypedSubject, UntypedCredential};
