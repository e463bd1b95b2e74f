// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The two legs of one handshake: the broker's own (`sso`) and the relying
//! party's (`external`).

use serde::{Deserialize, Serialize};

use super::requests::RequestsManager;
use super::responses::{PairsPayload, ResponsesManager};
use crate::chain::AccountName;
use crate::did::Resolver;
use crate::error::{ErrorBody, Result, SdkError};
use crate::vc::VerifyOptions;

/// Wire form of [`DualWalletRequests`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualWalletRequestsPayload {
    pub sso: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<Vec<String>>,
}

/// Requests of both legs.
#[derive(Debug, Clone)]
pub struct DualWalletRequests {
    pub sso: RequestsManager,
    pub external: Option<RequestsManager>,
}

impl DualWalletRequests {
    pub fn new(sso: RequestsManager, external: Option<RequestsManager>) -> Self {
        Self { sso, external }
    }

    pub fn to_payload(&self) -> DualWalletRequestsPayload {
        DualWalletRequestsPayload {
            sso: self.sso.to_jwts(),
            external: self.external.as_ref().map(RequestsManager::to_jwts),
        }
    }

    pub fn from_payload(payload: &DualWalletRequestsPayload) -> Result<Self> {
        let sso = RequestsManager::from_jwts(payload.sso.iter().map(|jwt| Some(jwt.as_str())))?;
        let external = payload
            .external
            .as_ref()
            .map(|jwts| RequestsManager::from_jwts(jwts.iter().map(|jwt| Some(jwt.as_str()))))
            .transpose()?;
        let requests = Self { sso, external };
        requests.check()?;
        Ok(requests)
    }

    /// Each leg carries a login request and the legs do not share an origin.
    pub fn check(&self) -> Result<()> {
        if self.sso.get_login_requests().is_empty() {
            return Err(SdkError::MissingParams("sso login request".to_string()));
        }
        let Some(external) = &self.external else {
            return Ok(());
        };
        if external.get_login_requests().is_empty() {
            return Err(SdkError::MissingParams("external login request".to_string()));
        }
        if let Some(shared) = self
            .sso
            .origins()
            .into_iter()
            .find(|origin| external.get_login_request_with_origin(origin).is_some())
        {
            return Err(SdkError::WrongOrigin(format!(
                "sso and external legs both request {shared}"
            )));
        }
        Ok(())
    }

    pub async fn verify(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<()> {
        self.sso.verify(resolver, options).await?;
        if let Some(external) = &self.external {
            external.verify(resolver, options).await?;
        }
        Ok(())
    }
}

/// Wire form of [`DualWalletResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualWalletResponsePayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso: Option<PairsPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<PairsPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Outcome of the wallet's consent, for both legs.
#[derive(Debug, Clone)]
pub struct DualWalletResponse {
    pub success: bool,
    pub sso: Option<ResponsesManager>,
    pub external: Option<ResponsesManager>,
    pub error: Option<ErrorBody>,
}

impl DualWalletResponse {
    pub fn success(sso: ResponsesManager, external: Option<ResponsesManager>) -> Self {
        Self {
            success: true,
            sso: Some(sso),
            external,
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            sso: None,
            external: None,
            error: Some(error),
        }
    }

    pub fn to_payload(&self) -> Result<DualWalletResponsePayload> {
        Ok(DualWalletResponsePayload {
            success: self.success,
            sso: self.sso.as_ref().map(ResponsesManager::to_payload).transpose()?,
            external: self.external.as_ref().map(ResponsesManager::to_payload).transpose()?,
            error: self.error.clone(),
        })
    }

    pub fn from_payload(payload: &DualWalletResponsePayload) -> Result<Self> {
        if !payload.success {
            let error = payload
                .error
                .clone()
                .ok_or_else(|| SdkError::MissingParams("error of failed response".to_string()))?;
            return Ok(Self::failure(error));
        }
        let sso = payload
            .sso
            .as_ref()
            .ok_or_else(|| SdkError::MissingParams("sso responses".to_string()))?;
        Ok(Self::success(
            ResponsesManager::from_payload(sso)?,
            payload
                .external
                .as_ref()
                .map(ResponsesManager::from_payload)
                .transpose()?,
        ))
    }

    /// Turn a failure into its error. A decline comes back as
    /// [`SdkError::UserDeclined`], anything else as [`SdkError::Remote`].
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let error = self.error.unwrap_or_else(|| ErrorBody::new("Internal", "failure without error"));
        Err(error.into())
    }

    /// Verify both legs and that they log in one account.
    pub async fn verify(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<()> {
        let sso = self
            .sso
            .as_ref()
            .ok_or_else(|| SdkError::MissingParams("sso responses".to_string()))?;
        sso.verify(resolver, options).await?;

        if let Some(external) = &self.external {
            external.verify(resolver, options).await?;
            if external.account_name() != sso.account_name() {
                return Err(SdkError::InvalidData(format!(
                    "legs log in different accounts ({:?} and {:?})",
                    sso.account_name(),
                    external.account_name()
                )));
            }
        }
        Ok(())
    }

    pub fn account_name(&self) -> Option<&AccountName> {
        self.sso.as_ref().and_then(ResponsesManager::account_name)
    }
}
