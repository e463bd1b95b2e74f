// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet side of the handshake: receive both legs, ask the user, answer.

use std::sync::Arc;
use std::time::Duration;

use super::payload::{append_payload, Delivered, Delivery};
use super::state::HandshakeState;
use crate::chain::App;
use crate::communication::{
    sign_message, AuthenticationPayload, Communication, IdentifyPayload,
    LoginRequestResponsePayload, LoginRequestsPayload,
};
use crate::did::DidUrl;
use crate::error::{Result, SdkError};
use crate::keys::KeyLevel;
use crate::managers::{DualWalletRequests, DualWalletResponse, ResponsesManager};
use crate::user::WalletUser;
use crate::vc::{CredentialPayload, VerifyOptions};

/// Channel and message id a message delivery answers.
struct ReplyTo {
    communication: Communication,
    sso: DidUrl,
    request_id: String,
}

/// Requests awaiting the user's decision.
pub struct WalletConsent {
    user: Arc<WalletUser>,
    requests: DualWalletRequests,
    sso: ResponsesManager,
    external: Option<ResponsesManager>,
    state: HandshakeState,
    reply: Option<ReplyTo>,
}

impl WalletConsent {
    /// Identify to the broker at `sso` and wait for its requests.
    pub async fn connect(
        user: Arc<WalletUser>,
        communication: &Communication,
        sso: &DidUrl,
        timeout: Duration,
    ) -> Result<Self> {
        let issuer = user.issuer(KeyLevel::Local).await?;
        let auth = sign_message(AuthenticationPayload {}, &issuer, &issuer.did_url).await?;
        communication.login(&auth).await?;

        let broker = sso.clone();
        let pending = communication.expect_message(LoginRequestsPayload::TYPE, move |message| {
            message
                .decode::<LoginRequestsPayload>()
                .is_ok_and(|m| m.issuer().same_did(&broker))
        });
        let identify = IdentifyPayload {
            account_name: user.account_name().await?,
        };
        communication
            .send(&sign_message(identify, &issuer, sso).await?)
            .await?;

        let message = pending
            .recv(timeout)
            .await?
            .decode::<LoginRequestsPayload>()?;
        if !message
            .verify_with(user.resolver(), &VerifyOptions::from(user.config()))
            .await?
        {
            return Err(SdkError::JwtNotValid("LoginRequestsMessage".to_string()));
        }
        let requests = DualWalletRequests::from_payload(&message.payload().requests)?;

        let mut consent = Self::new(user, requests).await?;
        consent.reply = Some(ReplyTo {
            communication: communication.clone(),
            sso: message.issuer().clone(),
            request_id: message.id().to_string(),
        });
        Ok(consent)
    }

    /// Verify `requests` and resolve the app behind every leg.
    pub async fn new(user: Arc<WalletUser>, requests: DualWalletRequests) -> Result<Self> {
        requests.check()?;
        requests
            .verify(user.resolver(), &VerifyOptions::from(user.config()))
            .await?;

        let account = user.account_name().await.ok();
        let mut sso = ResponsesManager::new(requests.sso.clone());
        sso.fetch_meta(user.chain().as_ref(), account.as_ref()).await?;
        let external = match &requests.external {
            Some(leg) => {
                let mut leg = ResponsesManager::new(leg.clone());
                leg.fetch_meta(user.chain().as_ref(), account.as_ref()).await?;
                Some(leg)
            }
            None => None,
        };

        let state = HandshakeState::RequestSent.advance(HandshakeState::Consent)?;
        tracing::info!(
            account = ?account,
            requests = requests.sso.len() + requests.external.as_ref().map_or(0, |r| r.len()),
            "Awaiting consent"
        );
        Ok(Self {
            user,
            requests,
            sso,
            external,
            state,
            reply: None,
        })
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn requests(&self) -> &DualWalletRequests {
        &self.requests
    }

    /// Apps asking, broker first.
    pub fn apps(&self) -> Vec<&App> {
        let mut apps = self.sso.apps();
        if let Some(external) = &self.external {
            apps.extend(external.apps());
        }
        apps
    }

    /// Whether any leg needs an app key authorized on chain.
    pub fn requires_login(&self) -> bool {
        self.sso.requires_login() || self.external.as_ref().is_some_and(ResponsesManager::requires_login)
    }

    /// The broker this consent answers over the channel, if any.
    pub fn reply_to(&self) -> Option<&DidUrl> {
        self.reply.as_ref().map(|r| &r.sso)
    }

    /// Sign responses for both legs and deliver them.
    pub async fn accept(&mut self, delivery: Delivery) -> Result<Delivered> {
        if self.state != HandshakeState::Consent {
            return Err(SdkError::InvalidData(format!(
                "cannot accept in state {:?}",
                self.state
            )));
        }
        self.check_delivery(&delivery)?;
        let signed = self.sign_responses().await;
        if let Err(e) = &signed {
            self.state = self.state.advance(HandshakeState::Failed)?;
            tracing::warn!(error = %e, "Could not sign responses");
        }
        signed?;

        let response = DualWalletResponse::success(self.sso.clone(), self.external.clone());
        let delivered = self.deliver(&response, delivery).await?;
        self.state = self.state.advance(HandshakeState::ResponseSent)?;
        Ok(delivered)
    }

    async fn sign_responses(&mut self) -> Result<()> {
        self.sso.create_responses(&self.user).await?;
        if let Some(external) = &mut self.external {
            external.create_responses(&self.user).await?;
        }
        Ok(())
    }

    /// Tell the broker the user said no.
    pub async fn decline(&mut self, reason: impl Into<String>, delivery: Delivery) -> Result<Delivered> {
        if !self.state.can_advance(HandshakeState::Declined) {
            return Err(SdkError::InvalidData(format!(
                "cannot decline in state {:?}",
                self.state
            )));
        }
        self.check_delivery(&delivery)?;
        let response = DualWalletResponse::failure(SdkError::UserDeclined(reason.into()).to_body());
        let delivered = self.deliver(&response, delivery).await?;
        self.state = self.state.advance(HandshakeState::Declined)?;
        tracing::info!("User declined");
        Ok(delivered)
    }

    fn check_delivery(&self, delivery: &Delivery) -> Result<()> {
        if matches!(delivery, Delivery::Message(_)) && self.reply.is_none() {
            return Err(SdkError::CommunicationNotConnected);
        }
        Ok(())
    }

    async fn deliver(&self, response: &DualWalletResponse, delivery: Delivery) -> Result<Delivered> {
        let payload = response.to_payload()?;
        match delivery {
            Delivery::Redirect(url) => Ok(Delivered::Redirect(append_payload(&url, &payload)?)),
            Delivery::Message(recipient) => {
                let reply = self
                    .reply
                    .as_ref()
                    .ok_or(SdkError::CommunicationNotConnected)?;
                let issuer = self.user.issuer(KeyLevel::Local).await?;
                let message = sign_message(
                    LoginRequestResponsePayload {
                        request_id: reply.request_id.clone(),
                        response: payload,
                    },
                    &issuer,
                    &recipient,
                )
                .await?;
                reply.communication.send(&message).await?;
                Ok(Delivered::Message {
                    recipient,
                    message_id: message.id().to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::credentials::{LoginResponse, LoginResponsePayload};
    use crate::handshake::{CallbackPayload, ExternalLogin, ExternalLoginOptions, SsoContext, SsoLogin};
    use crate::managers::PairsPayload;
    use crate::testing::{jwk_issuer, key_manager, TestNetwork};
    use crate::vc::SignOptions;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn redirect_to_sso(net: &TestNetwork) -> (ExternalLogin, SsoLogin, Communication) {
        let mut external = ExternalLogin::new(
            net.config.clone(),
            key_manager(),
            net.resolver.clone(),
            TestNetwork::ORIGIN_A,
        )
        .unwrap();
        let url = external
            .start(
                ExternalLoginOptions::default()
                    .callback_path("/callback")
                    .request_username(),
            )
            .await
            .unwrap();
        assert_eq!(url.path(), "/login");

        let communication = Communication::from_config(Arc::new(net.relay.transport()), &net.config);
        let ctx = SsoContext {
            config: net.config.clone(),
            keys: key_manager(),
            resolver: net.resolver.clone(),
            communication: communication.clone(),
        };
        let sso = SsoLogin::from_redirect(ctx, &url, "https://app.example/login")
            .await
            .unwrap();
        (external, sso, communication)
    }

    #[tokio::test]
    async fn handshake_over_the_channel() {
        let net = TestNetwork::new().await;
        let user = Arc::new(net.wallet_user().await);
        let (mut external, mut sso, _) = redirect_to_sso(&net).await;
        sso.open_session().await.unwrap();
        assert_eq!(sso.state(), HandshakeState::WaitingForAgent);

        let wallet_channel = Communication::from_config(Arc::new(net.relay.transport()), &net.config);
        let sso_did = sso.did().clone();
        let (broker, consent) = tokio::join!(
            async {
                let wallet = sso.wait_for_wallet(TIMEOUT).await?;
                sso.send_requests().await?;
                Ok::<_, SdkError>(wallet)
            },
            WalletConsent::connect(user.clone(), &wallet_channel, &sso_did, TIMEOUT),
        );
        assert_eq!(broker.unwrap(), user.did().await.unwrap());
        let mut consent = consent.unwrap();

        let apps: Vec<_> = consent.apps().iter().map(|a| a.account_name.to_string()).collect();
        assert_eq!(apps, [TestNetwork::APP_B, TestNetwork::APP_A]);
        assert!(consent.requires_login());
        assert!(consent.reply_to().is_some_and(|did| did.same_did(&sso_did)));

        let delivered = consent.accept(Delivery::Message(sso_did.clone())).await.unwrap();
        assert!(delivered.redirect_url().is_none());
        assert_eq!(consent.state(), HandshakeState::ResponseSent);

        let response = sso.await_response(TIMEOUT).await.unwrap();
        assert_eq!(response.account_name().unwrap().as_str(), TestNetwork::USERNAME);
        assert_eq!(sso.session().unwrap().username(), Some(TestNetwork::USERNAME));

        let Delivered::Redirect(callback) = sso.finish().unwrap() else {
            panic!("finish redirects");
        };
        assert_eq!(callback.as_str().split('?').next(), Some("https://app.example/callback"));
        assert_eq!(sso.state(), HandshakeState::Terminal);

        let session = external.handle_callback(&callback).await.unwrap();
        assert_eq!(session.account_name.as_str(), TestNetwork::USERNAME);
        assert_eq!(session.username.as_deref(), Some(TestNetwork::USERNAME));
        assert_eq!(external.state(), HandshakeState::Terminal);
    }

    #[tokio::test]
    async fn decline_reaches_the_relying_party() {
        let net = TestNetwork::new().await;
        let user = Arc::new(net.wallet_user().await);
        let (mut external, mut sso, _) = redirect_to_sso(&net).await;
        sso.open_session().await.unwrap();

        let wallet_channel = Communication::from_config(Arc::new(net.relay.transport()), &net.config);
        let sso_did = sso.did().clone();
        let (broker, consent) = tokio::join!(
            async {
                sso.wait_for_wallet(TIMEOUT).await?;
                sso.send_requests().await
            },
            WalletConsent::connect(user, &wallet_channel, &sso_did, TIMEOUT),
        );
        broker.unwrap();
        let mut consent = consent.unwrap();

        consent.decline("not today", Delivery::Message(sso_did)).await.unwrap();
        assert_eq!(consent.state(), HandshakeState::Declined);
        assert!(consent.accept(Delivery::Redirect(Url::parse("https://sso.example/").unwrap())).await.is_err());

        let err = sso.await_response(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SdkError::UserDeclined(ref reason) if reason == "not today"));
        assert_eq!(sso.state(), HandshakeState::Declined);

        let Delivered::Redirect(callback) = sso.fail(&err).unwrap() else {
            panic!("fail redirects");
        };
        let err = external.handle_callback(&callback).await.unwrap_err();
        assert_eq!(err.code(), "UserDeclined");
        assert_eq!(external.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn answer_by_redirect() {
        let net = TestNetwork::new().await;
        let user = Arc::new(net.wallet_user().await);
        let (mut external, mut sso, _) = redirect_to_sso(&net).await;

        let mut consent = WalletConsent::new(user, sso.requests().clone()).await.unwrap();
        assert!(consent.reply_to().is_none());
        let err = consent
            .accept(Delivery::Message(sso.did().clone()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CommunicationNotConnected");
        assert_eq!(consent.state(), HandshakeState::Consent);

        let back = Url::parse("https://sso.example/wallet-return").unwrap();
        let delivered = consent.accept(Delivery::Redirect(back)).await.unwrap();
        let url = delivered.redirect_url().unwrap();

        sso.accept_redirect(url).await.unwrap();
        assert_eq!(sso.state(), HandshakeState::Callback);
        let callback = sso.finish().unwrap();
        let session = external
            .handle_callback(callback.redirect_url().unwrap())
            .await
            .unwrap();
        assert_eq!(session.account_name.as_str(), TestNetwork::USERNAME);
    }

    #[tokio::test]
    async fn wrong_referrer_is_refused() {
        let net = TestNetwork::new().await;
        let mut external = ExternalLogin::new(
            net.config.clone(),
            key_manager(),
            net.resolver.clone(),
            TestNetwork::ORIGIN_A,
        )
        .unwrap();
        let url = external.start(ExternalLoginOptions::default()).await.unwrap();

        let ctx = SsoContext {
            config: net.config.clone(),
            keys: key_manager(),
            resolver: net.resolver.clone(),
            communication: Communication::from_config(Arc::new(net.relay.transport()), &net.config),
        };
        let err = SsoLogin::from_redirect(ctx, &url, "https://evil.example/")
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "WrongOrigin");
    }

    #[tokio::test]
    async fn forged_callback_is_refused() {
        let net = TestNetwork::new().await;
        let mut external = ExternalLogin::new(
            net.config.clone(),
            key_manager(),
            net.resolver.clone(),
            TestNetwork::ORIGIN_A,
        )
        .unwrap();
        external.start(ExternalLoginOptions::default()).await.unwrap();
        let request = external.requests().unwrap().get_login_requests()[0].clone();

        // A throwaway key claims the user's account.
        let response = LoginResponse::sign(
            LoginResponsePayload {
                account_name: TestNetwork::USERNAME.parse().unwrap(),
            },
            &jwk_issuer(),
            SignOptions::default().subject(request.issuer().clone()),
        )
        .await
        .unwrap();
        let responses = ResponsesManager::from_payload(&PairsPayload {
            requests: vec![request.jwt().to_string()],
            responses: vec![response.jwt().to_string()],
        })
        .unwrap();
        let callback = append_payload(
            &Url::parse("https://app.example/callback").unwrap(),
            &CallbackPayload::from_responses(&responses).unwrap(),
        )
        .unwrap();

        let err = external.handle_callback(&callback).await.unwrap_err();
        assert_eq!(err.code(), "SenderNotAuthorized");
        assert_eq!(external.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn app_key_cannot_identify_as_the_wallet() {
        let net = TestNetwork::new().await;
        let user = net.wallet_user().await;
        let (_, mut sso, _) = redirect_to_sso(&net).await;
        sso.open_session().await.unwrap();

        let app = net.app_issuer(&user).await;
        let app_channel = net.channel(&app).await;
        let identify = IdentifyPayload {
            account_name: user.account_name().await.unwrap(),
        };
        app_channel
            .send(&sign_message(identify, &app, sso.did()).await.unwrap())
            .await
            .unwrap();

        let err = sso.wait_for_wallet(TIMEOUT).await.unwrap_err();
        assert_eq!(err.code(), "SenderNotAuthorized");
        assert_eq!(sso.state(), HandshakeState::Failed);
    }
}
