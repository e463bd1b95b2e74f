// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key manager: private keys bound to security levels.
//!
//! ## Storage Layout
//!
//! ```text
//! keymanager/
//!   key.PASSWORD   # { level, privateKey (PKCS#8 PEM), publicKey, salt, hashedSaltedChallenge }
//!   key.LOCAL      # { level, privateKey, publicKey }
//! ```
//!
//! ## Security
//!
//! - Private keys never leave this module; callers only get signatures
//! - PIN / password levels keep an HMAC-SHA256 of the challenge under a
//!   random salt, never the challenge itself
//! - Challenge comparison is constant time

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use k256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use k256::SecretKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{KeyLevel, PublicKey};
use crate::encoding::b64url_encode;
use crate::error::{Result, SdkError};
use crate::storage::{Storage, StorageFactory};

type HmacSha256 = Hmac<Sha256>;

/// Storage scope used by [`StorageKeyManager`].
pub const KEY_MANAGER_SCOPE: &str = "keymanager";

/// Salt length for challenge MACs.
const CHALLENGE_SALT_LEN: usize = 16;

/// Output encoding of [`KeyManager::sign_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    /// ECDSA signature value
    Raw,
    /// base64url `r || s`, ready to be the third segment of a compact JWS
    Jws,
}

/// Result of [`KeyManager::sign_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedData {
    Raw(Signature),
    Jws(String),
}

/// Holds private keys bound to [`KeyLevel`]s.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Store `private_key` at `level`, replacing any previous key.
    ///
    /// PIN and password levels require `challenge`.
    async fn store_key(
        &self,
        level: KeyLevel,
        private_key: &SigningKey,
        challenge: Option<&str>,
    ) -> Result<PublicKey>;

    /// Sign `data` with the key at `level`.
    async fn sign_data(
        &self,
        level: KeyLevel,
        data: &[u8],
        challenge: Option<&str>,
        format: SignatureFormat,
    ) -> Result<SignedData>;

    /// Public key stored at `level`.
    async fn get_key(&self, level: KeyLevel) -> Result<PublicKey>;

    /// Whether `challenge` matches the one the key was stored with.
    async fn check_key(&self, level: KeyLevel, challenge: &str) -> Result<bool>;

    /// Delete the key at `level`. Deleting a missing key is not an error.
    async fn remove_key(&self, level: KeyLevel) -> Result<()>;

    /// Delete every key.
    async fn remove_all_keys(&self) -> Result<()> {
        for level in KeyLevel::ALL {
            self.remove_key(level).await?;
        }
        Ok(())
    }

    /// Whether a key is stored at `level`.
    async fn has_key(&self, level: KeyLevel) -> Result<bool> {
        match self.get_key(level).await {
            Ok(_) => Ok(true),
            Err(SdkError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Persisted form of one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    level: KeyLevel,
    private_key: String,
    public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hashed_salted_challenge: Option<String>,
}

/// [`KeyManager`] backed by a [`Storage`] scope.
pub struct StorageKeyManager {
    storage: Arc<dyn Storage>,
}

impl StorageKeyManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Use the `keymanager` scope of a factory.
    pub fn from_factory(factory: &dyn StorageFactory) -> Self {
        Self::new(factory.create(KEY_MANAGER_SCOPE))
    }

    fn storage_key(level: KeyLevel) -> String {
        format!("key.{}", level.as_str())
    }

    async fn load(&self, level: KeyLevel) -> Result<StoredKey> {
        self.storage
            .retrieve_json::<StoredKey>(&Self::storage_key(level))
            .await?
            .ok_or(SdkError::KeyNotFound(level))
    }

    /// Verify the challenge for protected levels.
    fn check_challenge(stored: &StoredKey, challenge: Option<&str>) -> Result<()> {
        if !stored.level.requires_challenge() {
            return Ok(());
        }
        let challenge = challenge.ok_or_else(|| {
            SdkError::MissingParams(format!("challenge is required for {}", stored.level))
        })?;
        if challenge_matches(stored, challenge)? {
            Ok(())
        } else {
            Err(SdkError::PasswordInvalid)
        }
    }
}

#[async_trait]
impl KeyManager for StorageKeyManager {
    async fn store_key(
        &self,
        level: KeyLevel,
        private_key: &SigningKey,
        challenge: Option<&str>,
    ) -> Result<PublicKey> {
        let public_key = PublicKey::from_signing_key(private_key);
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SdkError::Internal(format!("Failed to encode private key: {e}")))?;

        let mut stored = StoredKey {
            level,
            private_key: pem.to_string(),
            public_key: public_key.clone(),
            salt: None,
            hashed_salted_challenge: None,
        };

        if level.requires_challenge() {
            let challenge = challenge.ok_or_else(|| {
                SdkError::MissingParams(format!("challenge is required for {level}"))
            })?;
            let mut salt = [0u8; CHALLENGE_SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            stored.hashed_salted_challenge = Some(hex::encode(challenge_mac(&salt, challenge)?));
            stored.salt = Some(hex::encode(&salt));
        }

        self.storage
            .store_json(&Self::storage_key(level), &stored)
            .await?;

        tracing::debug!(level = %level, "Stored key");
        Ok(public_key)
    }

    async fn sign_data(
        &self,
        level: KeyLevel,
        data: &[u8],
        challenge: Option<&str>,
        format: SignatureFormat,
    ) -> Result<SignedData> {
        let stored = self.load(level).await?;
        Self::check_challenge(&stored, challenge)?;

        let key = signing_key_from_pem(&stored.private_key)?;
        let signature: Signature = key.sign(data);

        Ok(match format {
            SignatureFormat::Raw => SignedData::Raw(signature),
            SignatureFormat::Jws => SignedData::Jws(b64url_encode(&signature.to_bytes())),
        })
    }

    async fn get_key(&self, level: KeyLevel) -> Result<PublicKey> {
        Ok(self.load(level).await?.public_key)
    }

    async fn check_key(&self, level: KeyLevel, challenge: &str) -> Result<bool> {
        let stored = self.load(level).await?;
        if !level.requires_challenge() {
            return Err(SdkError::InvalidData(format!(
                "{level} keys are not challenge protected"
            )));
        }
        challenge_matches(&stored, challenge)
    }

    async fn remove_key(&self, level: KeyLevel) -> Result<()> {
        self.storage.remove(&Self::storage_key(level)).await?;
        Ok(())
    }
}

fn challenge_mac(salt: &[u8], challenge: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(salt)
        .map_err(|e| SdkError::Internal(format!("HMAC key: {e}")))?;
    mac.update(challenge.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn challenge_matches(stored: &StoredKey, challenge: &str) -> Result<bool> {
    let (Some(salt), Some(expected)) = (&stored.salt, &stored.hashed_salted_challenge) else {
        return Err(SdkError::Internal(format!(
            "{} key was stored without a challenge",
            stored.level
        )));
    };
    let salt = hex::decode(salt)?;
    let expected = hex::decode(expected)?;

    let mut mac = HmacSha256::new_from_slice(&salt)
        .map_err(|e| SdkError::Internal(format!("HMAC key: {e}")))?;
    mac.update(challenge.as_bytes());
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Parse a PEM private key (PKCS#8, or SEC1 for older records).
fn signing_key_from_pem(pem_str: &str) -> Result<SigningKey> {
    let pem = pem::parse(pem_str)
        .map_err(|e| SdkError::Internal(format!("Invalid stored PEM: {e}")))?;

    let secret_key = SecretKey::from_pkcs8_der(pem.contents())
        .map_err(|e| e.to_string())
        .or_else(|_| SecretKey::from_sec1_der(pem.contents()).map_err(|e| e.to_string()))
        .map_err(|e| SdkError::Internal(format!("Invalid stored key format: {e}")))?;

    Ok(SigningKey::from(secret_key))
}
