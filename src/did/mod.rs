// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Decentralized Identifiers
//!
//! Only the subset the handshake needs:
//!
//! | Family | Form | Keys |
//! |--------|------|------|
//! | key-embedded | `did:jwk:<base64url(JWK)>#0` | the embedded key |
//! | chain account | `did:<method>:<chain_id>:<account>#<permission>` | the permission's keys |
//!
//! Resolution goes through [`Resolver`], a registry of per-method
//! [`DidResolver`]s fronted by an LRU cache.

pub mod chain;
pub mod jwk;
pub mod resolver;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use chain::{ChainDid, ChainDidResolver};
pub use jwk::{did_from_public_key, JwkDidResolver, JWK_DID_METHOD};
pub use resolver::Resolver;

use crate::error::{Result, SdkError};
use crate::keys::PublicKey;

/// A DID, optionally with a `#fragment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DidUrl {
    method: String,
    id: String,
    fragment: Option<String>,
}

impl DidUrl {
    pub fn new(method: impl Into<String>, id: impl Into<String>, fragment: Option<String>) -> Self {
        Self {
            method: method.into(),
            id: id.into(),
            fragment,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Method-specific id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// The bare DID, without fragment.
    pub fn did(&self) -> String {
        format!("did:{}:{}", self.method, self.id)
    }

    pub fn with_fragment(&self, fragment: impl Into<String>) -> Self {
        Self {
            fragment: Some(fragment.into()),
            ..self.clone()
        }
    }

    pub fn without_fragment(&self) -> Self {
        Self {
            fragment: None,
            ..self.clone()
        }
    }

    /// Whether both name the same DID, ignoring fragments.
    pub fn same_did(&self, other: &DidUrl) -> bool {
        self.method == other.method && self.id == other.id
    }
}

impl FromStr for DidUrl {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| SdkError::InvalidDid(s.to_string()))?;
        let (body, fragment) = match rest.split_once('#') {
            Some((body, fragment)) if !fragment.is_empty() => (body, Some(fragment.to_string())),
            Some(_) => return Err(SdkError::InvalidDid(s.to_string())),
            None => (rest, None),
        };
        let (method, id) = body
            .split_once(':')
            .ok_or_else(|| SdkError::InvalidDid(s.to_string()))?;

        let method_ok = !method.is_empty()
            && method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !method_ok || id.is_empty() || id.contains(char::is_whitespace) {
            return Err(SdkError::InvalidDid(s.to_string()));
        }

        Ok(Self::new(method, id, fragment))
    }
}

impl fmt::Display for DidUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.id)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl Serialize for DidUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DidUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A key listed by a DID document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMethod {
    /// Full DID URL, fragment included
    pub id: DidUrl,
    pub public_key: PublicKey,
}

/// Resolved DID document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidDocument {
    pub id: DidUrl,
    pub verification_methods: Vec<VerificationMethod>,
}

impl DidDocument {
    /// Keys usable for `url`: the ones under its fragment, or every key
    /// when it has none.
    pub fn keys_for(&self, url: &DidUrl) -> Vec<&PublicKey> {
        self.verification_methods
            .iter()
            .filter(|vm| match url.fragment() {
                Some(fragment) => vm.id.fragment() == Some(fragment),
                None => true,
            })
            .map(|vm| &vm.public_key)
            .collect()
    }
}

/// Resolver for one DID method.
#[async_trait]
pub trait DidResolver: Send + Sync {
    /// Method name this resolver handles (`jwk`, `antelope`, ...).
    fn method(&self) -> &str;

    async fn resolve(&self, did: &DidUrl) -> Result<DidDocument>;
}
