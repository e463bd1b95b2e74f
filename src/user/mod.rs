// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet User
//!
//! The identity holder. [`WalletUser`] composes independently owned parts:
//!
//! - [`KeyStore`] - the private keys, one per [`KeyLevel`]
//! - [`SessionState`] - who the wallet is signed in as
//! - the chain and resolver handles used to answer requests
//!
//! ## Key levels on chain
//!
//! Every stored chain-bound level must be present on chain under its
//! permission and vice versa. A divergence means the account was set up on
//! another device and is reported as `AccountKeysMismatch`, never merged.

pub mod key_store;
pub mod session;

use std::sync::Arc;

use crate::chain::{AccountName, App, ChainAction, ChainClient, PersonLookup};
use crate::config::SdkConfig;
use crate::did::{ChainDid, DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::keys::{
    generate_private_key_from_password, KeyLevel, KeyManagerSigner, PublicKey, StorageKeyManager,
};
use crate::storage::StorageFactory;
use crate::vc::Issuer;

pub use key_store::KeyStore;
pub use session::{SessionRecord, SessionState, SESSION_SCOPE};

/// Permission app keys are authorized under.
pub const APP_PERMISSION_PARENT: &str = "local";

/// A wallet user.
pub struct WalletUser {
    config: SdkConfig,
    chain: Arc<dyn ChainClient>,
    resolver: Arc<Resolver>,
    keys: KeyStore,
    session: SessionState,
}

impl WalletUser {
    pub fn new(
        config: SdkConfig,
        chain: Arc<dyn ChainClient>,
        resolver: Arc<Resolver>,
        storage: &dyn StorageFactory,
    ) -> Self {
        Self {
            config,
            chain,
            resolver,
            keys: KeyStore::new(Arc::new(StorageKeyManager::from_factory(storage))),
            session: SessionState::from_factory(storage),
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Account of the signed-in user.
    pub async fn account_name(&self) -> Result<AccountName> {
        self.session
            .load()
            .await?
            .account_name
            .ok_or_else(|| SdkError::MissingParams("account name; no user is signed in".to_string()))
    }

    pub async fn username(&self) -> Result<Option<String>> {
        Ok(self.session.load().await?.username)
    }

    /// The account's DID, without permission.
    pub async fn did(&self) -> Result<DidUrl> {
        let account = self.account_name().await?;
        Ok(ChainDid::new(&self.config.chain_id, account).to_url(&self.config.chain_did_method))
    }

    /// Issuer signing with `level`, named `did#<permission>`.
    pub async fn issuer(&self, level: KeyLevel) -> Result<Issuer> {
        self.issuer_with_signer(self.keys.signer(level)).await
    }

    /// Issuer for challenge-protected levels.
    pub async fn issuer_with_challenge(&self, level: KeyLevel, challenge: &str) -> Result<Issuer> {
        self.issuer_with_signer(self.keys.signer(level).with_challenge(challenge))
            .await
    }

    async fn issuer_with_signer(&self, signer: KeyManagerSigner) -> Result<Issuer> {
        let permission = signer
            .level()
            .permission()
            .ok_or_else(|| SdkError::InvalidKeyLevel(signer.level().to_string()))?;
        let did_url = self.did().await?.with_fragment(permission);
        Ok(Issuer::new(did_url, Arc::new(signer)))
    }

    pub fn signer(&self, level: KeyLevel) -> KeyManagerSigner {
        self.keys.signer(level)
    }

    /// Look `username` up on chain and remember it as the signed-in user.
    pub async fn save_username(&self, username: &str) -> Result<AccountName> {
        let person = self
            .chain
            .get_person(&PersonLookup::Username(username.to_string()))
            .await?;
        self.session
            .save(&SessionRecord::from_person(&person, username))
            .await?;
        tracing::info!(account = %person.account_name, "Saved username");
        Ok(person.account_name)
    }

    /// Derive the owner key from `password` and store it at PASSWORD.
    pub async fn save_password(&self, password: &str) -> Result<PublicKey> {
        let salt = self
            .session
            .load()
            .await?
            .password_salt
            .ok_or_else(|| SdkError::MissingParams("password salt; save a username first".to_string()))?;
        let private_key = generate_private_key_from_password(password, &salt)?;
        self.keys
            .store(KeyLevel::Password, &private_key, Some(password))
            .await
    }

    pub async fn save_pin(&self, pin: &str) -> Result<PublicKey> {
        if pin.is_empty() {
            return Err(SdkError::MissingParams("pin".to_string()));
        }
        self.keys.generate(KeyLevel::Pin, Some(pin)).await
    }

    pub async fn check_pin(&self, pin: &str) -> Result<bool> {
        self.keys.check(KeyLevel::Pin, pin).await
    }

    /// Generate the device-local key.
    pub async fn save_local(&self) -> Result<PublicKey> {
        self.keys.generate(KeyLevel::Local, None).await
    }

    /// Sign in on this device with username and password.
    ///
    /// Fails with `PasswordInvalid` unless the derived key is an `owner`
    /// key of the account. Nothing is persisted on failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<AccountName> {
        let person = self
            .chain
            .get_person(&PersonLookup::Username(username.to_string()))
            .await?;
        let private_key = generate_private_key_from_password(password, &person.password_salt)?;
        let public_key = PublicKey::from_signing_key(&private_key);

        let account = self.chain.get_account(&person.account_name).await?;
        if !account.has_key("owner", &public_key) {
            tracing::warn!(account = %person.account_name, "Login with wrong password");
            return Err(SdkError::PasswordInvalid);
        }

        self.session
            .save(&SessionRecord::from_person(&person, username))
            .await?;
        self.keys
            .store(KeyLevel::Password, &private_key, Some(password))
            .await?;
        tracing::info!(account = %person.account_name, "User logged in");
        Ok(person.account_name)
    }

    /// Publish every stored chain-bound key, signed by the owner key.
    pub async fn update_keys(&self, password: &str) -> Result<()> {
        let account = self.account_name().await?;
        let keys = self.keys.chain_keys().await?;
        let levels = keys.len();
        let signer = self.keys.signer(KeyLevel::Password).with_challenge(password);
        self.chain
            .push_action(
                ChainAction::UpdateKeysPer {
                    account: account.clone(),
                    keys,
                },
                &signer,
            )
            .await?;
        self.resolver.invalidate(&self.did().await?);
        tracing::info!(account = %account, levels, "Updated on-chain keys");
        Ok(())
    }

    /// Check that local key levels and on-chain permissions agree.
    pub async fn check_keys_match(&self) -> Result<()> {
        let account = self.chain.get_account(&self.account_name().await?).await?;
        let local = self.keys.chain_keys().await?;

        for level in KeyLevel::chain_bound() {
            let Some(permission) = level.permission() else {
                continue;
            };
            let on_chain = account
                .permission(permission)
                .is_some_and(|p| !p.keys.is_empty());
            let mismatch = match local.get(&level) {
                Some(key) => !account.has_key(permission, key),
                None => on_chain,
            };
            if mismatch {
                tracing::warn!(account = %account.name, level = %level, "Local keys diverge from chain");
                return Err(SdkError::AccountKeysMismatch(format!(
                    "{level} does not match {}@{permission}",
                    account.name
                )));
            }
        }
        Ok(())
    }

    /// Authorize `key` under a permission named after `app`, signed by LOCAL.
    pub async fn login_with_app(&self, app: &App, key: &PublicKey) -> Result<()> {
        let account = self.account_name().await?;
        self.chain
            .push_action(
                ChainAction::LoginWithApp {
                    account: account.clone(),
                    app: app.account_name.clone(),
                    parent: APP_PERMISSION_PARENT.to_string(),
                    key: key.clone(),
                },
                &self.keys.signer(KeyLevel::Local),
            )
            .await?;
        self.resolver.invalidate(&self.did().await?);
        tracing::info!(account = %account, app = %app.account_name, "Logged in with app");
        Ok(())
    }

    /// Allow `permission` to run `contract::action`, signed by LOCAL.
    pub async fn link_auth(&self, permission: &str, contract: &AccountName, action: &str) -> Result<()> {
        let account = self.account_name().await?;
        self.chain
            .push_action(
                ChainAction::LinkAuth {
                    account: account.clone(),
                    permission: permission.to_string(),
                    contract: contract.clone(),
                    action: action.to_string(),
                },
                &self.keys.signer(KeyLevel::Local),
            )
            .await?;
        tracing::info!(account = %account, permission, contract = %contract, action, "Linked permission");
        Ok(())
    }

    /// Forget every key and the session.
    pub async fn logout(&self) -> Result<()> {
        let account = self.session.load().await?.account_name;
        self.keys.clear().await?;
        self.session.clear().await?;
        tracing::info!(account = ?account, "User logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorageFactory;
    use crate::testing::TestNetwork;

    #[tokio::test]
    async fn login_checks_password_against_owner_key() {
        let net = TestNetwork::new().await;
        net.wallet_user().await;

        let device = net.fresh_user(&InMemoryStorageFactory::new());
        let err = device
            .login(TestNetwork::USERNAME, "wrong password")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PasswordInvalid");
        assert!(device.account_name().await.is_err());

        let account = device
            .login(TestNetwork::USERNAME, TestNetwork::PASSWORD)
            .await
            .unwrap();
        assert_eq!(device.account_name().await.unwrap(), account);
        assert_eq!(
            device.username().await.unwrap().as_deref(),
            Some(TestNetwork::USERNAME)
        );
    }

    #[tokio::test]
    async fn second_device_diverges_until_keys_are_updated() {
        let net = TestNetwork::new().await;
        let first = net.wallet_user().await;
        first.check_keys_match().await.unwrap();

        let device = net.fresh_user(&InMemoryStorageFactory::new());
        device
            .login(TestNetwork::USERNAME, TestNetwork::PASSWORD)
            .await
            .unwrap();
        device.save_local().await.unwrap();
        device.save_pin("2468").await.unwrap();
        let err = device.check_keys_match().await.unwrap_err();
        assert_eq!(err.code(), "AccountKeysMismatch");

        device.update_keys(TestNetwork::PASSWORD).await.unwrap();
        device.check_keys_match().await.unwrap();
        assert_eq!(
            first.check_keys_match().await.unwrap_err().code(),
            "AccountKeysMismatch"
        );
    }

    #[tokio::test]
    async fn pin_is_checked_without_persisting_it() {
        let net = TestNetwork::new().await;
        let user = net.wallet_user().await;
        assert!(user.check_pin(TestNetwork::PIN).await.unwrap());
        assert!(!user.check_pin("0000").await.unwrap());
        assert_eq!(user.save_pin("").await.unwrap_err().code(), "MissingParams");
    }

    #[tokio::test]
    async fn issuer_names_the_level_permission() {
        let net = TestNetwork::new().await;
        let user = net.wallet_user().await;

        let issuer = user.issuer(KeyLevel::Local).await.unwrap();
        assert_eq!(issuer.did_url.fragment(), Some("local"));
        assert_eq!(issuer.did_url.without_fragment(), user.did().await.unwrap());

        let err = user
            .issuer(KeyLevel::BrowserSessionStorage)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidKeyLevel");
    }

    #[tokio::test]
    async fn logout_forgets_keys_and_session() {
        let net = TestNetwork::new().await;
        let user = net.wallet_user().await;
        user.logout().await.unwrap();

        assert!(user.account_name().await.is_err());
        assert!(user.keys().chain_keys().await.unwrap().is_empty());
        user.logout().await.unwrap();
    }
}
