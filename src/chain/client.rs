// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain collaborator interface.

use async_trait::async_trait;

use super::types::*;
use crate::error::Result;
use crate::keys::Signer;

/// Read and write access to the identity contracts.
///
/// Contract semantics live on chain; the SDK only depends on this surface.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Person record by username or account.
    async fn get_person(&self, lookup: &PersonLookup) -> Result<Person>;

    /// App record by origin, account or username.
    async fn get_app(&self, lookup: &AppLookup) -> Result<App>;

    /// Account with its permission tree.
    async fn get_account(&self, account: &AccountName) -> Result<Account>;

    /// Sign `action` with `signer` and push it.
    async fn push_action(&self, action: ChainAction, signer: &dyn Signer) -> Result<()>;
}

/// Errors reported by the blockchain collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("No row found: {0}")]
    DataQueryNoRowDataFound(String),

    #[error("Username not found: {0}")]
    UsernameNotFound(String),

    #[error("Account does not exist: {0}")]
    AccountDoesntExist(String),

    #[error("Missing required authority: {0}")]
    MissingAuthority(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

impl ChainError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::DataQueryNoRowDataFound(_) => "DataQueryNoRowDataFound",
            ChainError::UsernameNotFound(_) => "UsernameNotFound",
            ChainError::AccountDoesntExist(_) => "AccountDoesntExist",
            ChainError::MissingAuthority(_) => "MissingAuthority",
            ChainError::TransactionFailed(_) => "TransactionFailed",
            ChainError::Rpc(_) => "Rpc",
        }
    }
}
