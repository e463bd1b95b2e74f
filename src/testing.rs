// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared test fixtures.

use std::sync::Arc;

use crate::chain::{hash_username, AccountName, App, AppStatus, InMemoryChain};
use crate::communication::{sign_message, AuthenticationPayload, Communication, LocalRelay};
use crate::config::{parse_origin, SdkConfig};
use crate::credentials::{
    DataSharingRequest, DataSharingRequestPayload, LoginRequest, LoginRequestPayload,
};
use crate::did::{did_from_public_key, ChainDid, JwkDidResolver, Resolver};
use crate::keys::{
    generate_private_key_from_password, generate_random_private_key, generate_salt, KeyLevel,
    KeyManager, LocalSigner, PublicKey, StorageKeyManager,
};
use crate::storage::{InMemoryStorageFactory, StorageFactory};
use crate::user::WalletUser;
use crate::vc::{Issuer, SignOptions, VerifyOptions};

/// Issuer with a fresh `did:jwk` key.
pub(crate) fn jwk_issuer() -> Issuer {
    let private_key = generate_random_private_key();
    let did_url = did_from_public_key(&PublicKey::from_signing_key(&private_key)).unwrap();
    Issuer::new(did_url, Arc::new(LocalSigner::new(private_key)))
}

/// Key manager on fresh in-memory storage.
pub(crate) fn key_manager() -> Arc<dyn KeyManager> {
    Arc::new(StorageKeyManager::from_factory(&InMemoryStorageFactory::new()))
}

/// Resolver for `did:jwk` only.
pub(crate) fn jwk_resolver() -> Resolver {
    Resolver::new().register(Arc::new(JwkDidResolver))
}

pub(crate) async fn sign_login_request(issuer: &Issuer, origin: &str) -> LoginRequest {
    let public_key = issuer.signer.public_key().await.unwrap();
    LoginRequest::sign(
        LoginRequestPayload::new(origin, public_key),
        issuer,
        SignOptions::default().expires_in(std::time::Duration::from_secs(300)),
    )
    .await
    .unwrap()
}

pub(crate) async fn sign_data_sharing_request(issuer: &Issuer) -> DataSharingRequest {
    DataSharingRequest::sign(
        DataSharingRequestPayload { username: true },
        issuer,
        SignOptions::default(),
    )
    .await
    .unwrap()
}

pub(crate) fn test_app(account: &str, origin: &str) -> App {
    App {
        account_name: account.parse().unwrap(),
        app_name: format!("App {account}"),
        username_hash: hash_username(account),
        origin: origin.to_string(),
        description: String::new(),
        logo_url: format!("{origin}/logo.png"),
        background_color: "#ffffff".into(),
        accent_color: "#0052ff".into(),
        status: AppStatus::Ready,
    }
}

/// A chain with two apps, a resolver over it and a relay.
pub(crate) struct TestNetwork {
    pub chain: InMemoryChain,
    pub resolver: Arc<Resolver>,
    pub config: SdkConfig,
    pub relay: LocalRelay,
}

impl TestNetwork {
    /// Relying party origin.
    pub const ORIGIN_A: &'static str = "https://app.example";
    /// Broker origin.
    pub const ORIGIN_B: &'static str = "https://sso.example";
    pub const APP_A: &'static str = "app.a";
    pub const APP_B: &'static str = "sso.app";
    pub const USERNAME: &'static str = "alice";
    pub const SECOND_USERNAME: &'static str = "bob";
    pub const PASSWORD: &'static str = "correct horse battery";
    pub const PIN: &'static str = "1357";

    pub async fn new() -> Self {
        let chain = InMemoryChain::new();
        let config = SdkConfig {
            sso_origin: parse_origin(Self::ORIGIN_B).unwrap(),
            ..SdkConfig::default()
        };
        let resolver = Arc::new(Resolver::standard(&config, Arc::new(chain.clone())));

        for (account, origin) in [(Self::APP_A, Self::ORIGIN_A), (Self::APP_B, Self::ORIGIN_B)] {
            let key = PublicKey::from_signing_key(&generate_random_private_key());
            chain.create_app(test_app(account, origin), &key).await;
        }

        let relay = LocalRelay::with_options(resolver.clone(), VerifyOptions::from(&config));
        Self {
            chain,
            resolver,
            config,
            relay,
        }
    }

    /// A user with no keys or session, on its own storage.
    pub fn fresh_user(&self, storage: &dyn StorageFactory) -> WalletUser {
        WalletUser::new(
            self.config.clone(),
            Arc::new(self.chain.clone()),
            self.resolver.clone(),
            storage,
        )
    }

    /// `alice`, signed up with PASSWORD, LOCAL and PIN keys.
    pub async fn wallet_user(&self) -> WalletUser {
        self.sign_up(Self::USERNAME).await
    }

    /// `bob`, set up like [`wallet_user`](Self::wallet_user).
    pub async fn second_wallet_user(&self) -> WalletUser {
        self.sign_up(Self::SECOND_USERNAME).await
    }

    async fn sign_up(&self, username: &str) -> WalletUser {
        let account: AccountName = username.parse().unwrap();
        let salt = generate_salt();
        let owner = generate_private_key_from_password(Self::PASSWORD, &salt).unwrap();
        self.chain
            .create_person(
                &account,
                username,
                &salt,
                &[(KeyLevel::Password, PublicKey::from_signing_key(&owner))],
            )
            .await;

        let user = self.fresh_user(&InMemoryStorageFactory::new());
        user.save_username(username).await.unwrap();
        user.save_password(Self::PASSWORD).await.unwrap();
        user.save_local().await.unwrap();
        user.save_pin(Self::PIN).await.unwrap();
        user.update_keys(Self::PASSWORD).await.unwrap();
        user
    }

    /// Authorize a fresh key for `user` under [`APP_A`](Self::APP_A) and
    /// return it as an issuer on the user's account.
    pub async fn app_issuer(&self, user: &WalletUser) -> Issuer {
        let private_key = generate_random_private_key();
        user.login_with_app(
            &test_app(Self::APP_A, Self::ORIGIN_A),
            &PublicKey::from_signing_key(&private_key),
        )
        .await
        .unwrap();
        let did = ChainDid::new(&self.config.chain_id, user.account_name().await.unwrap())
            .with_permission(Self::APP_A)
            .to_url(&self.config.chain_did_method);
        Issuer::new(did, Arc::new(LocalSigner::new(private_key)))
    }

    /// A channel on the relay, logged in as `issuer`.
    pub async fn channel(&self, issuer: &Issuer) -> Communication {
        let communication = Communication::from_config(Arc::new(self.relay.transport()), &self.config);
        let auth = sign_message(AuthenticationPayload {}, issuer, &issuer.did_url)
            .await
            .unwrap();
        communication.login(&auth).await.unwrap();
        communication
    }
}
