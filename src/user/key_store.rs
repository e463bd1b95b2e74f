// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The wallet's keys, one per level.

use std::collections::BTreeMap;
use std::sync::Arc;

use k256::ecdsa::SigningKey;

use crate::error::Result;
use crate::keys::{generate_random_private_key, KeyLevel, KeyManager, KeyManagerSigner, PublicKey};

/// Handle on the user's [`KeyManager`].
#[derive(Clone)]
pub struct KeyStore {
    keys: Arc<dyn KeyManager>,
}

impl KeyStore {
    pub fn new(keys: Arc<dyn KeyManager>) -> Self {
        Self { keys }
    }

    pub fn manager(&self) -> &Arc<dyn KeyManager> {
        &self.keys
    }

    /// Store a fresh random key at `level`.
    pub async fn generate(&self, level: KeyLevel, challenge: Option<&str>) -> Result<PublicKey> {
        self.store(level, &generate_random_private_key(), challenge).await
    }

    pub async fn store(
        &self,
        level: KeyLevel,
        private_key: &SigningKey,
        challenge: Option<&str>,
    ) -> Result<PublicKey> {
        self.keys.store_key(level, private_key, challenge).await
    }

    pub async fn public_key(&self, level: KeyLevel) -> Result<PublicKey> {
        self.keys.get_key(level).await
    }

    pub async fn check(&self, level: KeyLevel, challenge: &str) -> Result<bool> {
        self.keys.check_key(level, challenge).await
    }

    /// Public keys of every stored chain-bound level.
    pub async fn chain_keys(&self) -> Result<BTreeMap<KeyLevel, PublicKey>> {
        let mut keys = BTreeMap::new();
        for level in KeyLevel::chain_bound() {
            if self.keys.has_key(level).await? {
                keys.insert(level, self.keys.get_key(level).await?);
            }
        }
        Ok(keys)
    }

    pub fn signer(&self, level: KeyLevel) -> KeyManagerSigner {
        KeyManagerSigner::new(self.keys.clone(), level)
    }

    pub async fn clear(&self) -> Result<()> {
        self.keys.remove_all_keys().await
    }
}
