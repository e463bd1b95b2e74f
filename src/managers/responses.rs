// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request / response pairs, app resolution and response signing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::requests::RequestsManager;
use crate::chain::{AccountName, App, AppLookup, ChainClient};
use crate::credentials::{
    DataResponse, DataResponsePayload, LoginResponse, LoginResponsePayload, SharedData,
    WalletRequest, WalletResponse,
};
use crate::did::{ChainDid, Resolver};
use crate::error::{Result, SdkError};
use crate::keys::KeyLevel;
use crate::user::WalletUser;
use crate::vc::{SignOptions, VerifyOptions};

/// App context of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub app: App,
    /// Whether the request's key still has to be authorized on chain.
    /// `None` while the account is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_login: Option<bool>,
}

/// One request with its (optional) response and app context.
#[derive(Debug, Clone)]
pub struct RequestResponsePair {
    pub request: WalletRequest,
    pub response: Option<WalletResponse>,
    pub meta: Option<RequestMeta>,
}

/// Wire form: `requests[i]` pairs with `responses[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairsPayload {
    pub requests: Vec<String>,
    pub responses: Vec<String>,
}

/// Wraps a [`RequestsManager`] 1:1 with responses.
#[derive(Debug, Clone, Default)]
pub struct ResponsesManager {
    pairs: Vec<RequestResponsePair>,
}

impl From<RequestsManager> for ResponsesManager {
    fn from(requests: RequestsManager) -> Self {
        Self::new(requests)
    }
}

impl ResponsesManager {
    pub fn new(requests: RequestsManager) -> Self {
        let pairs = requests
            .into_requests()
            .into_iter()
            .map(|request| RequestResponsePair {
                request,
                response: None,
                meta: None,
            })
            .collect();
        Self { pairs }
    }

    /// Rebuild from the wire form, checking that every response is
    /// addressed to its request's issuer.
    pub fn from_payload(payload: &PairsPayload) -> Result<Self> {
        if payload.requests.len() != payload.responses.len() {
            return Err(SdkError::InvalidData(format!(
                "{} requests but {} responses",
                payload.requests.len(),
                payload.responses.len()
            )));
        }
        let pairs = payload
            .requests
            .iter()
            .zip(&payload.responses)
            .map(|(request, response)| {
                let pair = RequestResponsePair {
                    request: WalletRequest::from_jwt(request)?,
                    response: Some(WalletResponse::from_jwt(response)?),
                    meta: None,
                };
                check_pairing(&pair)?;
                Ok(pair)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pairs })
    }

    /// Wire form. Fails when a response is missing.
    pub fn to_payload(&self) -> Result<PairsPayload> {
        let mut payload = PairsPayload::default();
        for pair in &self.pairs {
            let response = pair
                .response
                .as_ref()
                .ok_or_else(|| SdkError::MissingParams(format!("response to {}", pair.request.kind())))?;
            payload.requests.push(pair.request.jwt().to_string());
            payload.responses.push(response.jwt().to_string());
        }
        Ok(payload)
    }

    pub fn pairs(&self) -> &[RequestResponsePair] {
        &self.pairs
    }

    pub fn requests(&self) -> RequestsManager {
        RequestsManager::new(self.pairs.iter().map(|p| p.request.clone()).collect())
    }

    /// Distinct apps, in request order. Empty before [`fetch_meta`](Self::fetch_meta).
    pub fn apps(&self) -> Vec<&App> {
        let mut apps: Vec<&App> = Vec::new();
        for meta in self.pairs.iter().filter_map(|p| p.meta.as_ref()) {
            if !apps.iter().any(|a| a.account_name == meta.app.account_name) {
                apps.push(&meta.app);
            }
        }
        apps
    }

    /// Whether any login request still needs on-chain authorization.
    pub fn requires_login(&self) -> bool {
        self.pairs
            .iter()
            .filter_map(|p| p.meta.as_ref())
            .any(|m| m.requires_login == Some(true))
    }

    /// Resolve every request's app and, when `account` is known, whether
    /// its key still has to be authorized.
    ///
    /// Requests sharing an issuer must resolve to one app; a data sharing
    /// request inherits the app of its issuer's login request.
    pub async fn fetch_meta(
        &mut self,
        chain: &dyn ChainClient,
        account: Option<&AccountName>,
    ) -> Result<()> {
        let mut apps_by_issuer: HashMap<String, App> = HashMap::new();
        for request in self.pairs.iter().filter_map(|p| p.request.as_login()) {
            let app = chain
                .get_app(&AppLookup::Origin(request.payload().origin.clone()))
                .await?;
            let issuer = request.issuer().did();
            match apps_by_issuer.get(&issuer) {
                Some(existing) if existing.account_name != app.account_name => {
                    tracing::warn!(issuer = %issuer, "Requests from one issuer resolve to different apps");
                    return Err(SdkError::IssuerAppMismatch { issuer });
                }
                Some(_) => {}
                None => {
                    apps_by_issuer.insert(issuer, app);
                }
            }
        }

        let on_chain = match account {
            Some(account) => Some(chain.get_account(account).await?),
            None => None,
        };

        for pair in &mut self.pairs {
            let issuer = pair.request.issuer().did();
            let app = apps_by_issuer
                .get(&issuer)
                .cloned()
                .ok_or_else(|| SdkError::OriginNotFound(format!("no login request from {issuer}")))?;
            let requires_login = match (&pair.request, &on_chain) {
                (WalletRequest::Login(request), Some(account)) => {
                    Some(!account.has_key(app.account_name.as_str(), &request.payload().public_key))
                }
                _ => None,
            };
            pair.meta = Some(RequestMeta { app, requires_login });
        }
        Ok(())
    }

    /// Sign a response for every request as `user`.
    ///
    /// Login requests are authorized on chain first iff they require it.
    /// When [`fetch_meta`](Self::fetch_meta) ran without the account, the
    /// status is looked up again for `user`'s account. Data responses carry
    /// only the requested fields.
    pub async fn create_responses(&mut self, user: &WalletUser) -> Result<()> {
        let account_name = user.account_name().await?;
        let issuer = user.issuer(KeyLevel::Local).await?;
        let ttl = user.config().request_ttl;

        let unknown = self.pairs.iter().any(|p| {
            p.request.as_login().is_some() && p.meta.as_ref().is_some_and(|m| m.requires_login.is_none())
        });
        if unknown {
            self.fetch_meta(user.chain().as_ref(), Some(&account_name)).await?;
        }

        for pair in &mut self.pairs {
            let meta = pair
                .meta
                .as_ref()
                .ok_or_else(|| SdkError::MissingParams("request meta; call fetch_meta first".to_string()))?;
            let options = SignOptions::default()
                .subject(pair.request.issuer().clone())
                .expires_in(ttl);

            let response = match &pair.request {
                WalletRequest::Login(request) => {
                    if meta.requires_login == Some(true) {
                        user.login_with_app(&meta.app, &request.payload().public_key)
                            .await?;
                    }
                    let payload = LoginResponsePayload {
                        account_name: account_name.clone(),
                    };
                    LoginResponse::sign(payload, &issuer, options).await?.into()
                }
                WalletRequest::DataSharing(request) => {
                    let username = if request.payload().username {
                        user.username().await?
                    } else {
                        None
                    };
                    let payload = DataResponsePayload {
                        data: SharedData { username },
                    };
                    DataResponse::sign(payload, &issuer, options).await?.into()
                }
            };
            pair.response = Some(response);
        }
        tracing::info!(account = %account_name, count = self.pairs.len(), "Signed responses");
        Ok(())
    }

    /// Verify both halves of every pair.
    ///
    /// Every response must be signed by a wallet key of one chain account,
    /// and login responses must name that account.
    pub async fn verify(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<()> {
        self.requests().verify(resolver, options).await?;
        let mut signer: Option<AccountName> = None;
        for pair in &self.pairs {
            let response = pair
                .response
                .as_ref()
                .ok_or_else(|| SdkError::MissingParams(format!("response to {}", pair.request.kind())))?;
            check_pairing(pair)?;
            let account = check_signer(response, &options.chain_did_method)?;
            match &signer {
                Some(first) if *first != account => {
                    return Err(SdkError::SenderNotAuthorized(format!(
                        "responses signed by both {first} and {account}"
                    )));
                }
                Some(_) => {}
                None => signer = Some(account),
            }
            if !response.verify(resolver, options).await? {
                return Err(SdkError::JwtNotValid(format!(
                    "{} from {} is not valid",
                    response.kind(),
                    response.issuer()
                )));
            }
        }
        Ok(())
    }

    /// Account named by the first login response.
    pub fn account_name(&self) -> Option<&AccountName> {
        self.pairs
            .iter()
            .filter_map(|p| p.response.as_ref()?.as_login())
            .map(|r| &r.payload().account_name)
            .next()
    }

    /// Username shared by the first data response.
    pub fn username(&self) -> Option<&str> {
        self.pairs
            .iter()
            .filter_map(|p| p.response.as_ref()?.as_data())
            .find_map(|r| r.payload().data.username.as_deref())
    }
}

/// The account whose wallet key signed `response`.
fn check_signer(response: &WalletResponse, method: &str) -> Result<AccountName> {
    let (signer, _) = ChainDid::from_wallet_key(response.key_id(), method)?;
    if let Some(login) = response.as_login() {
        let claimed = &login.payload().account_name;
        if *claimed != signer.account {
            tracing::warn!(kid = %response.key_id(), claimed = %claimed, "Login response names another account");
            return Err(SdkError::SenderNotAuthorized(format!(
                "{} cannot log in as {claimed}",
                response.key_id()
            )));
        }
    }
    Ok(signer.account)
}

fn check_pairing(pair: &RequestResponsePair) -> Result<()> {
    let Some(response) = &pair.response else {
        return Ok(());
    };
    let kinds_match = matches!(
        (&pair.request, response),
        (WalletRequest::Login(_), WalletResponse::Login(_))
            | (WalletRequest::DataSharing(_), WalletResponse::Data(_))
    );
    if !kinds_match {
        return Err(SdkError::InvalidData(format!(
            "{} cannot answer {}",
            response.kind(),
            pair.request.kind()
        )));
    }
    match response.subject() {
        Some(subject) if subject.same_did(pair.request.issuer()) => Ok(()),
        _ => Err(SdkError::JwtNotValid(format!(
            "{} is not addressed to {}",
            response.kind(),
            pair.request.issuer()
        ))),
    }
}
