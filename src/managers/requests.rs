// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bundle of wallet requests built from one URL or message payload.

use url::Url;

use crate::credentials::{DataSharingRequest, LoginRequest, WalletRequest};
use crate::did::{DidUrl, Resolver};
use crate::error::{Result, SdkError};
use crate::vc::VerifyOptions;

/// Validates and categorizes a bundle of requests.
#[derive(Debug, Clone, Default)]
pub struct RequestsManager {
    requests: Vec<WalletRequest>,
}

impl RequestsManager {
    pub fn new(requests: Vec<WalletRequest>) -> Self {
        Self { requests }
    }

    /// Decode raw JWTs, skipping `None` entries.
    pub fn from_jwts<'a, I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let requests = raw
            .into_iter()
            .flatten()
            .map(WalletRequest::from_jwt)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requests })
    }

    pub fn requests(&self) -> &[WalletRequest] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<WalletRequest> {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn to_jwts(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.jwt().to_string()).collect()
    }

    pub fn get_login_requests(&self) -> Vec<&LoginRequest> {
        self.requests.iter().filter_map(WalletRequest::as_login).collect()
    }

    pub fn get_data_sharing_requests(&self) -> Vec<&DataSharingRequest> {
        self.requests
            .iter()
            .filter_map(WalletRequest::as_data_sharing)
            .collect()
    }

    pub fn get_login_request_with_origin(&self, origin: &str) -> Option<&LoginRequest> {
        let origin = origin.trim_end_matches('/');
        self.get_login_requests()
            .into_iter()
            .find(|r| r.payload().origin.trim_end_matches('/') == origin)
    }

    pub fn get_login_requests_with_different_origin(&self, origin: &str) -> Vec<&LoginRequest> {
        let origin = origin.trim_end_matches('/');
        self.get_login_requests()
            .into_iter()
            .filter(|r| r.payload().origin.trim_end_matches('/') != origin)
            .collect()
    }

    /// Origins declared by the bundle's login requests, in order.
    pub fn origins(&self) -> Vec<&str> {
        self.get_login_requests()
            .into_iter()
            .map(|r| r.payload().origin.as_str())
            .collect()
    }

    /// Origin declared by `issuer`'s login request, if any.
    pub fn origin_of(&self, issuer: &DidUrl) -> Option<&str> {
        self.get_login_requests()
            .into_iter()
            .find(|r| r.issuer().same_did(issuer))
            .map(|r| r.payload().origin.as_str())
    }

    /// Verify every request, failing on the first one that does not verify.
    pub async fn verify(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<()> {
        for request in &self.requests {
            if !request.verify(resolver, options).await? {
                let origin = self.origin_of(request.issuer()).unwrap_or("unknown origin");
                tracing::warn!(kind = request.kind(), origin, "Request failed verification");
                return Err(SdkError::JwtNotValid(format!(
                    "{} for {origin} is not valid",
                    request.kind()
                )));
            }
        }
        Ok(())
    }

    /// At least one login request must declare the origin of `referrer`.
    pub fn check_referrer_origin(&self, referrer: &str) -> Result<()> {
        let referrer_origin = Url::parse(referrer)
            .map(|url| url.origin().ascii_serialization())
            .map_err(|_| SdkError::WrongOrigin(format!("referrer `{referrer}` is not a URL")))?;

        if self.get_login_request_with_origin(&referrer_origin).is_some() {
            return Ok(());
        }
        Err(SdkError::WrongOrigin(format!(
            "{referrer_origin} does not match any of {:?}",
            self.origins()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jwk_issuer, jwk_resolver, sign_data_sharing_request, sign_login_request};

    #[tokio::test]
    async fn from_jwts_filters_nulls_and_categorizes() {
        let issuer = jwk_issuer();
        let login = sign_login_request(&issuer, "https://app.example").await;
        let data = sign_data_sharing_request(&issuer).await;

        let manager =
            RequestsManager::from_jwts([Some(login.jwt()), None, Some(data.jwt()), None]).unwrap();
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.get_login_requests().len(), 1);
        assert_eq!(manager.get_data_sharing_requests().len(), 1);
        assert_eq!(manager.origin_of(&issuer.did_url), Some("https://app.example"));
        assert!(manager.verify(&jwk_resolver(), &VerifyOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_tag_is_rejected() {
        let issuer = jwk_issuer();
        let response = crate::credentials::LoginResponse::sign(
            crate::credentials::LoginResponsePayload {
                account_name: "alice".parse().unwrap(),
            },
            &issuer,
            Default::default(),
        )
        .await
        .unwrap();
        let err = RequestsManager::from_jwts([Some(response.jwt())]).unwrap_err();
        assert_eq!(err.code(), "InvalidRequestType");
    }

    #[tokio::test]
    async fn referrer_must_match_some_origin() {
        let a = sign_login_request(&jwk_issuer(), "https://a.example").await;
        let b = sign_login_request(&jwk_issuer(), "https://b.example").await;
        let manager = RequestsManager::new(vec![a.into(), b.into()]);

        assert!(manager.check_referrer_origin("https://b.example/login?x=1").is_ok());
        assert!(manager.check_referrer_origin("https://a.example").is_ok());

        let err = manager.check_referrer_origin("https://evil.example/").unwrap_err();
        assert_eq!(err.code(), "WrongOrigin");
        let err = manager.check_referrer_origin("not a url").unwrap_err();
        assert_eq!(err.code(), "WrongOrigin");
    }

    #[tokio::test]
    async fn verify_failure_names_the_origin() {
        let issuer = jwk_issuer();
        let mut impostor = jwk_issuer();
        impostor.did_url = issuer.did_url.clone();
        let forged = sign_login_request(&impostor, "https://a.example").await;

        let manager = RequestsManager::new(vec![forged.into()]);
        let err = manager
            .verify(&jwk_resolver(), &VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::JwtNotValid(ref m) if m.contains("https://a.example")));
    }

    #[tokio::test]
    async fn origin_helpers_split_bundle() {
        let a = sign_login_request(&jwk_issuer(), "https://a.example").await;
        let b = sign_login_request(&jwk_issuer(), "https://b.example").await;
        let manager = RequestsManager::new(vec![a.into(), b.into()]);

        assert!(manager.get_login_request_with_origin("https://a.example/").is_some());
        let others = manager.get_login_requests_with_different_origin("https://a.example");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].payload().origin, "https://b.example");
    }
}
