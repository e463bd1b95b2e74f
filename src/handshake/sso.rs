// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Broker side of the handshake.
//!
//! ```text
//! from_redirect   verify the relying party's bundle, build the broker leg
//! open_session    log in to the channel, listen for the wallet
//! wait_for_wallet IdentifyMessage from the wallet
//! send_requests   LoginRequestsMessage with both legs
//! await_response  LoginRequestResponseMessage, verified and split
//! accept_redirect the same answer delivered by redirect
//! finish / fail   redirect to the relying party's callback
//! ```

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::payload::{append_payload, read_payload, CallbackPayload, Delivered, RequestsUrlPayload};
use super::state::HandshakeState;
use crate::communication::{
    sign_message, AuthenticationPayload, Communication, IdentifyPayload,
    LoginRequestResponsePayload, LoginRequestsPayload, PendingMessage,
};
use crate::config::SdkConfig;
use crate::credentials::{
    DataSharingRequest, DataSharingRequestPayload, LoginRequest, LoginRequestPayload,
};
use crate::did::{did_from_public_key, ChainDid, DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::keys::{generate_random_private_key, KeyLevel, KeyManager, KeyManagerSigner};
use crate::managers::{
    DualWalletRequests, DualWalletResponse, DualWalletResponsePayload, RequestsManager,
    ResponsesManager,
};
use crate::vc::{CredentialPayload, Issuer, SignOptions, VerifyOptions};

/// What the broker needs from its host.
#[derive(Clone)]
pub struct SsoContext {
    pub config: SdkConfig,
    pub keys: Arc<dyn KeyManager>,
    pub resolver: Arc<Resolver>,
    pub communication: Communication,
}

/// One broker-side handshake.
pub struct SsoLogin {
    ctx: SsoContext,
    issuer: Issuer,
    requests: DualWalletRequests,
    state: HandshakeState,
    identify: Option<PendingMessage>,
    wallet: Option<DidUrl>,
    reply: Option<PendingMessage>,
    response: Option<DualWalletResponse>,
}

impl SsoLogin {
    /// Accept the relying party's redirect.
    ///
    /// Verifies every request, binds them to `referrer` and signs the
    /// broker's own leg under a fresh session key.
    pub async fn from_redirect(ctx: SsoContext, url: &Url, referrer: &str) -> Result<Self> {
        let payload: RequestsUrlPayload = read_payload(url)?;
        let external = RequestsManager::from_jwts(payload.requests.iter().map(Option::as_deref))?;
        if external.get_login_requests().is_empty() {
            return Err(SdkError::MissingParams("login request".to_string()));
        }
        external
            .verify(&ctx.resolver, &VerifyOptions::from(&ctx.config))
            .await?;
        external.check_referrer_origin(referrer)?;

        let level = KeyLevel::BrowserSessionStorage;
        let public_key = ctx
            .keys
            .store_key(level, &generate_random_private_key(), None)
            .await?;
        let issuer = Issuer::new(
            did_from_public_key(&public_key)?,
            Arc::new(KeyManagerSigner::new(ctx.keys.clone(), level)),
        );
        let options = || SignOptions::default().expires_in(ctx.config.request_ttl);
        let sso = RequestsManager::new(vec![
            LoginRequest::sign(
                LoginRequestPayload::new(ctx.config.sso_origin(), public_key),
                &issuer,
                options(),
            )
            .await?
            .into(),
            DataSharingRequest::sign(DataSharingRequestPayload { username: true }, &issuer, options())
                .await?
                .into(),
        ]);

        let requests = DualWalletRequests::new(sso, Some(external));
        requests.check()?;
        let state = HandshakeState::Init.advance(HandshakeState::Redirected)?;
        tracing::info!(did = %issuer.did_url, referrer, "SSO accepted redirect");

        Ok(Self {
            ctx,
            issuer,
            requests,
            state,
            identify: None,
            wallet: None,
            reply: None,
            response: None,
        })
    }

    /// The broker's session DID, which the wallet addresses.
    pub fn did(&self) -> &DidUrl {
        &self.issuer.did_url
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn requests(&self) -> &DualWalletRequests {
        &self.requests
    }

    /// The broker's own leg, once the wallet answered.
    pub fn session(&self) -> Option<&ResponsesManager> {
        self.response.as_ref()?.sso.as_ref()
    }

    /// Log in to the channel and start listening for the wallet.
    pub async fn open_session(&mut self) -> Result<()> {
        let auth = sign_message(AuthenticationPayload {}, &self.issuer, &self.issuer.did_url).await?;
        self.ctx.communication.login(&auth).await?;

        let own = self.issuer.did_url.clone();
        self.identify = Some(self.ctx.communication.expect_message(
            IdentifyPayload::TYPE,
            move |message| {
                message
                    .decode::<IdentifyPayload>()
                    .is_ok_and(|m| m.subject().is_some_and(|s| s.same_did(&own)))
            },
        ));
        self.state = self.state.advance(HandshakeState::WaitingForAgent)?;
        Ok(())
    }

    /// Wait for the wallet's IdentifyMessage and return the wallet DID.
    pub async fn wait_for_wallet(&mut self, timeout: Duration) -> Result<DidUrl> {
        let pending = self
            .identify
            .take()
            .ok_or_else(|| SdkError::MissingParams("open session first".to_string()))?;
        let result = self.accept_identify(pending, timeout).await;
        self.settle(result)
    }

    async fn accept_identify(&mut self, pending: PendingMessage, timeout: Duration) -> Result<DidUrl> {
        let message = pending.recv(timeout).await?.decode::<IdentifyPayload>()?;
        if !message
            .verify_with(&self.ctx.resolver, &VerifyOptions::from(&self.ctx.config))
            .await?
        {
            return Err(SdkError::JwtNotValid("IdentifyMessage".to_string()));
        }
        let (sender, _) = ChainDid::from_wallet_key(message.key_id(), &self.ctx.config.chain_did_method)?;
        if sender.account != message.payload().account_name {
            return Err(SdkError::SenderNotAuthorized(format!(
                "{} identified as {}",
                message.issuer(),
                message.payload().account_name
            )));
        }
        let wallet = message.issuer().clone();
        tracing::info!(wallet = %wallet, "Wallet identified");
        self.wallet = Some(wallet.clone());
        Ok(wallet)
    }

    /// Forward both legs to the wallet. The reply listener is registered
    /// before the message leaves.
    pub async fn send_requests(&mut self) -> Result<()> {
        let wallet = self
            .wallet
            .clone()
            .ok_or_else(|| SdkError::MissingParams("wallet DID; wait for the wallet first".to_string()))?;
        let message = sign_message(
            LoginRequestsPayload {
                requests: self.requests.to_payload(),
            },
            &self.issuer,
            &wallet,
        )
        .await?;

        let request_id = message.id().to_string();
        self.reply = Some(self.ctx.communication.expect_message(
            LoginRequestResponsePayload::TYPE,
            move |reply| {
                reply
                    .decode::<LoginRequestResponsePayload>()
                    .is_ok_and(|r| r.payload().request_id == request_id)
            },
        ));
        let sent = self.ctx.communication.send(&message).await;
        self.settle(sent)?;
        self.state = self.state.advance(HandshakeState::RequestSent)?;
        tracing::info!(wallet = %wallet, id = message.id(), "Sent login requests");
        Ok(())
    }

    /// Wait for the wallet's answer, verify it and split it into legs.
    pub async fn await_response(&mut self, timeout: Duration) -> Result<&DualWalletResponse> {
        let pending = self
            .reply
            .take()
            .ok_or_else(|| SdkError::MissingParams("send requests first".to_string()))?;
        let result = self.accept_response(pending, timeout).await;
        let response = self.settle(result)?;
        self.state = self.state.advance(HandshakeState::Callback)?;
        Ok(&*self.response.insert(response))
    }

    async fn accept_response(&self, pending: PendingMessage, timeout: Duration) -> Result<DualWalletResponse> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| SdkError::MissingParams("wallet DID".to_string()))?;
        let message = pending
            .recv(timeout)
            .await?
            .decode::<LoginRequestResponsePayload>()?;
        if !message.issuer().same_did(wallet) {
            return Err(SdkError::SenderNotAuthorized(message.issuer().to_string()));
        }
        ChainDid::from_wallet_key(message.key_id(), &self.ctx.config.chain_did_method)?;
        if !message
            .verify_with(&self.ctx.resolver, &VerifyOptions::from(&self.ctx.config))
            .await?
        {
            return Err(SdkError::JwtNotValid("LoginRequestResponseMessage".to_string()));
        }
        self.check_response(&message.payload().response).await
    }

    /// Accept a wallet answer delivered by redirect instead of a message.
    pub async fn accept_redirect(&mut self, url: &Url) -> Result<&DualWalletResponse> {
        let result = match read_payload::<DualWalletResponsePayload>(url) {
            Ok(payload) => self.check_response(&payload).await,
            Err(e) => Err(e),
        };
        let response = self.settle(result)?;
        self.reply = None;
        self.state = self.state.advance(HandshakeState::Callback)?;
        Ok(&*self.response.insert(response))
    }

    async fn check_response(&self, payload: &DualWalletResponsePayload) -> Result<DualWalletResponse> {
        let response = DualWalletResponse::from_payload(payload)?.into_result()?;
        response
            .verify(&self.ctx.resolver, &VerifyOptions::from(&self.ctx.config))
            .await?;

        let answered = |leg: Option<&ResponsesManager>| leg.map(|l| l.requests().to_jwts());
        let sent_external = self.requests.external.as_ref().map(RequestsManager::to_jwts);
        if answered(response.sso.as_ref()) != Some(self.requests.sso.to_jwts())
            || answered(response.external.as_ref()) != sent_external
        {
            return Err(SdkError::InvalidData(
                "response does not answer the forwarded requests".to_string(),
            ));
        }
        if let Some(wallet) = &self.wallet {
            let identified = ChainDid::from_url(wallet, &self.ctx.config.chain_did_method)?;
            if response.account_name() != Some(&identified.account) {
                return Err(SdkError::SenderNotAuthorized(format!(
                    "{wallet} answered for {:?}",
                    response.account_name()
                )));
            }
        }
        tracing::info!(account = ?response.account_name(), "Wallet responded");
        Ok(response)
    }

    /// Redirect the relying party to its callback with its leg.
    pub fn finish(&mut self) -> Result<Delivered> {
        let external = self
            .response
            .as_ref()
            .and_then(|r| r.external.as_ref())
            .ok_or_else(|| SdkError::MissingParams("external responses".to_string()))?;
        let url = append_payload(&self.external_callback()?, &CallbackPayload::from_responses(external)?)?;
        self.state = self.state.advance(HandshakeState::Terminal)?;
        Ok(Delivered::Redirect(url))
    }

    /// Redirect the relying party to its callback with `error`.
    pub fn fail(&mut self, error: &SdkError) -> Result<Delivered> {
        let url = append_payload(
            &self.external_callback()?,
            &CallbackPayload::failure(error.to_body()),
        )?;
        if !self.state.is_final() {
            self.state = self.state.advance(HandshakeState::Failed)?;
        }
        Ok(Delivered::Redirect(url))
    }

    fn external_callback(&self) -> Result<Url> {
        let external = self
            .requests
            .external
            .as_ref()
            .ok_or_else(|| SdkError::MissingParams("external requests".to_string()))?;
        let login = external
            .get_login_requests_with_different_origin(&self.ctx.config.sso_origin())
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::OriginNotFound("external login request".to_string()))?;
        login.payload().callback_url()
    }

    /// Record a failed step: a decline ends in `Declined`, anything else in
    /// `Failed`.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let next = match e {
                SdkError::UserDeclined(_) => HandshakeState::Declined,
                _ => HandshakeState::Failed,
            };
            if self.state.can_advance(next) {
                self.state = next;
            }
            tracing::warn!(state = ?self.state, error = %e, "SSO handshake step failed");
        }
        result
    }
}
