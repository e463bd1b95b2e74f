// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relying party side of the handshake.

use std::sync::Arc;

use url::Url;

use super::payload::{append_payload, read_payload, CallbackPayload, RequestsUrlPayload};
use super::state::HandshakeState;
use crate::chain::AccountName;
use crate::config::SdkConfig;
use crate::credentials::{
    requests::validate_origin, DataSharingRequest, DataSharingRequestPayload, LoginRequest,
    LoginRequestPayload, WalletRequest,
};
use crate::did::{did_from_public_key, DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::keys::{generate_random_private_key, KeyLevel, KeyManager, KeyManagerSigner};
use crate::managers::{RequestsManager, ResponsesManager};
use crate::vc::{Issuer, SignOptions, VerifyOptions};

/// Path of the broker's login page.
pub const SSO_LOGIN_PATH: &str = "/login";

/// What the relying party asks for.
#[derive(Debug, Clone, Default)]
pub struct ExternalLoginOptions {
    /// Path on the relying party origin the broker redirects back to
    pub callback_path: Option<String>,
    /// Also ask for the username
    pub request_username: bool,
}

impl ExternalLoginOptions {
    pub fn callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = Some(path.into());
        self
    }

    pub fn request_username(mut self) -> Self {
        self.request_username = true;
        self
    }
}

/// Session established by a successful callback.
#[derive(Debug, Clone)]
pub struct ExternalSession {
    pub account_name: AccountName,
    pub username: Option<String>,
    /// The app key's DID, now authorized on the user's account
    pub did: DidUrl,
    pub responses: ResponsesManager,
}

/// Drives the relying party through `Init -> Redirected -> ExternalCallback
/// -> Terminal`.
pub struct ExternalLogin {
    config: SdkConfig,
    keys: Arc<dyn KeyManager>,
    resolver: Arc<Resolver>,
    origin: String,
    state: HandshakeState,
    did: Option<DidUrl>,
    requests: Option<RequestsManager>,
}

impl ExternalLogin {
    pub fn new(
        config: SdkConfig,
        keys: Arc<dyn KeyManager>,
        resolver: Arc<Resolver>,
        origin: impl Into<String>,
    ) -> Result<Self> {
        let origin = origin.into();
        validate_origin(&origin)?;
        Ok(Self {
            config,
            keys,
            resolver,
            origin,
            state: HandshakeState::Init,
            did: None,
            requests: None,
        })
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Requests signed by [`start`](Self::start).
    pub fn requests(&self) -> Option<&RequestsManager> {
        self.requests.as_ref()
    }

    /// Sign the requests under a fresh app key and build the broker URL.
    pub async fn start(&mut self, options: ExternalLoginOptions) -> Result<Url> {
        let level = KeyLevel::BrowserLocalStorage;
        let public_key = self
            .keys
            .store_key(level, &generate_random_private_key(), None)
            .await?;
        let did = did_from_public_key(&public_key)?;
        let issuer = Issuer::new(
            did.clone(),
            Arc::new(KeyManagerSigner::new(self.keys.clone(), level)),
        );
        let sign_options = || SignOptions::default().expires_in(self.config.request_ttl);

        let mut payload = LoginRequestPayload::new(&self.origin, public_key);
        if let Some(path) = options.callback_path {
            payload = payload.with_callback_path(path);
        }
        let mut requests: Vec<WalletRequest> =
            vec![LoginRequest::sign(payload, &issuer, sign_options()).await?.into()];
        if options.request_username {
            let payload = DataSharingRequestPayload { username: true };
            requests.push(DataSharingRequest::sign(payload, &issuer, sign_options()).await?.into());
        }
        let requests = RequestsManager::new(requests);

        let url = append_payload(
            &self.config.sso_url(SSO_LOGIN_PATH)?,
            &RequestsUrlPayload {
                requests: requests.to_jwts().into_iter().map(Some).collect(),
            },
        )?;
        self.state = self.state.advance(HandshakeState::Redirected)?;
        tracing::info!(origin = %self.origin, did = %did, count = requests.len(), "Redirecting to SSO");
        self.did = Some(did);
        self.requests = Some(requests);
        Ok(url)
    }

    /// Verify the broker's callback and establish the session.
    pub async fn handle_callback(&mut self, url: &Url) -> Result<ExternalSession> {
        self.state = self.state.advance(HandshakeState::ExternalCallback)?;
        match self.accept_callback(url).await {
            Ok(session) => {
                self.state = self.state.advance(HandshakeState::Terminal)?;
                tracing::info!(account = %session.account_name, origin = %self.origin, "External login complete");
                Ok(session)
            }
            Err(e) => {
                self.state = self.state.advance(HandshakeState::Failed)?;
                tracing::warn!(origin = %self.origin, error = %e, "External login failed");
                Err(e)
            }
        }
    }

    async fn accept_callback(&self, url: &Url) -> Result<ExternalSession> {
        let (Some(sent), Some(did)) = (&self.requests, &self.did) else {
            return Err(SdkError::MissingParams("callback before start".to_string()));
        };
        let payload: CallbackPayload = read_payload(url)?;
        let responses = payload.decode_outcome()?;

        if responses.requests().to_jwts() != sent.to_jwts() {
            return Err(SdkError::InvalidData(
                "callback answers requests this page did not send".to_string(),
            ));
        }
        responses
            .verify(&self.resolver, &VerifyOptions::from(&self.config))
            .await?;

        let account_name = responses
            .account_name()
            .cloned()
            .ok_or_else(|| SdkError::MissingParams("login response".to_string()))?;
        Ok(ExternalSession {
            account_name,
            username: responses.username().map(str::to_string),
            did: did.clone(),
            responses,
        })
    }
}
