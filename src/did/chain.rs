// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain-account DIDs: `did:<method>:<chain_id>:<account>#<permission>`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DidDocument, DidResolver, DidUrl, VerificationMethod};
use crate::chain::{AccountName, ChainClient};
use crate::error::{Result, SdkError};
use crate::keys::KeyLevel;

/// Parsed chain-account DID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDid {
    pub chain_id: String,
    pub account: AccountName,
    /// Permission named by the fragment, if any
    pub permission: Option<String>,
}

impl ChainDid {
    pub fn new(chain_id: impl Into<String>, account: AccountName) -> Self {
        Self {
            chain_id: chain_id.into(),
            account,
            permission: None,
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Parse `url` as a DID of the chain method `method`.
    pub fn from_url(url: &DidUrl, method: &str) -> Result<Self> {
        if url.method() != method {
            return Err(SdkError::InvalidDid(format!(
                "{url} is not a did:{method} account"
            )));
        }
        let (chain_id, account) = url
            .id()
            .rsplit_once(':')
            .filter(|(chain_id, _)| !chain_id.is_empty())
            .ok_or_else(|| SdkError::InvalidDid(url.to_string()))?;
        let account = account
            .parse()
            .map_err(|_| SdkError::InvalidDid(url.to_string()))?;

        Ok(Self {
            chain_id: chain_id.to_string(),
            account,
            permission: url.fragment().map(str::to_string),
        })
    }

    /// Parse `kid` as one of the wallet's own keys on a chain account.
    ///
    /// Only fragments naming a wallet key level pass; app permissions and
    /// bare account DIDs are `SenderNotAuthorized`.
    pub fn from_wallet_key(kid: &DidUrl, method: &str) -> Result<(Self, KeyLevel)> {
        let did = Self::from_url(kid, method)
            .map_err(|_| SdkError::SenderNotAuthorized(format!("{kid} is not a chain account key")))?;
        let level = did
            .permission
            .as_deref()
            .and_then(KeyLevel::from_permission)
            .ok_or_else(|| SdkError::SenderNotAuthorized(format!("{kid} is not a wallet key")))?;
        Ok((did, level))
    }

    pub fn to_url(&self, method: &str) -> DidUrl {
        DidUrl::new(
            method,
            format!("{}:{}", self.chain_id, self.account),
            self.permission.clone(),
        )
    }
}

/// Resolves chain-account DIDs into the account's permission keys.
pub struct ChainDidResolver {
    chain: Arc<dyn ChainClient>,
    method: String,
    chain_id: String,
}

impl ChainDidResolver {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        method: impl Into<String>,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            method: method.into(),
            chain_id: chain_id.into(),
        }
    }
}

#[async_trait]
impl DidResolver for ChainDidResolver {
    fn method(&self) -> &str {
        &self.method
    }

    async fn resolve(&self, did: &DidUrl) -> Result<DidDocument> {
        let parsed = ChainDid::from_url(did, &self.method)?;
        if parsed.chain_id != self.chain_id {
            return Err(SdkError::InvalidDid(format!(
                "{did} belongs to chain {}, expected {}",
                parsed.chain_id, self.chain_id
            )));
        }

        let account = self.chain.get_account(&parsed.account).await?;
        let id = did.without_fragment();
        let verification_methods = account
            .permissions
            .iter()
            .flat_map(|permission| {
                let vm_id = id.with_fragment(&permission.name);
                permission.keys.iter().map(move |key| VerificationMethod {
                    id: vm_id.clone(),
                    public_key: key.clone(),
                })
            })
            .collect();

        Ok(DidDocument {
            id,
            verification_methods,
        })
    }
}
