// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing handles used for JWT issuance and chain actions.

use std::sync::Arc;

use async_trait::async_trait;
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::{Signature, SigningKey};

use super::{KeyLevel, KeyManager, PublicKey, SignatureFormat, SignedData};
use crate::error::{Result, SdkError};

/// Anything that can produce ES256K signatures.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key matching the signatures.
    async fn public_key(&self) -> Result<PublicKey>;

    /// ECDSA over SHA-256 of `data`.
    async fn sign(&self, data: &[u8]) -> Result<Signature>;
}

/// Signer over an in-memory key.
///
/// Used for short-lived keys that never touch a [`KeyManager`].
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey::from_signing_key(&self.key))
    }

    async fn sign(&self, data: &[u8]) -> Result<Signature> {
        Ok(self.key.sign(data))
    }
}

/// Signer bound to one level of a [`KeyManager`].
pub struct KeyManagerSigner {
    keys: Arc<dyn KeyManager>,
    level: KeyLevel,
    challenge: Option<String>,
}

impl KeyManagerSigner {
    pub fn new(keys: Arc<dyn KeyManager>, level: KeyLevel) -> Self {
        Self {
            keys,
            level,
            challenge: None,
        }
    }

    /// Attach the PIN / password for challenge-protected levels.
    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn level(&self) -> KeyLevel {
        self.level
    }
}

#[async_trait]
impl Signer for KeyManagerSigner {
    async fn public_key(&self) -> Result<PublicKey> {
        self.keys.get_key(self.level).await
    }

    async fn sign(&self, data: &[u8]) -> Result<Signature> {
        let signed = self
            .keys
            .sign_data(self.level, data, self.challenge.as_deref(), SignatureFormat::Raw)
            .await?;
        match signed {
            SignedData::Raw(signature) => Ok(signature),
            SignedData::Jws(_) => Err(SdkError::Internal(
                "Key manager returned a JWS signature for a raw request".to_string(),
            )),
        }
    }
}
