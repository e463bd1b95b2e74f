// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Requests an app sends to the wallet.

use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::did::Resolver;
use crate::error::{Result, SdkError};
use crate::keys::PublicKey;
use crate::vc::{peek_type, CredentialPayload, TypedCredential, VerifyOptions};

pub const LOGIN_REQUEST_TYPE: &str = "LoginRequest";
pub const DATA_SHARING_REQUEST_TYPE: &str = "DataSharingRequest";

/// Bytes of entropy in a login request's random string.
const RANDOM_STRING_BYTES: usize = 32;

/// Ask the wallet to log the user in to `origin` and authorize `public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequestPayload {
    pub random_string: String,
    pub origin: String,
    /// App key to authorize under the user's account
    pub public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_path: Option<String>,
}

impl LoginRequestPayload {
    /// New payload with a fresh random string.
    pub fn new(origin: impl Into<String>, public_key: PublicKey) -> Self {
        let mut bytes = [0u8; RANDOM_STRING_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            random_string: hex::encode(bytes),
            origin: origin.into(),
            public_key,
            callback_path: None,
        }
    }

    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = Some(path.into());
        self
    }

    /// Absolute callback URL on the requesting origin.
    pub fn callback_url(&self) -> Result<Url> {
        let origin = Url::parse(&self.origin)?;
        Ok(origin.join(self.callback_path.as_deref().unwrap_or("/"))?)
    }
}

impl CredentialPayload for LoginRequestPayload {
    const TYPE: &'static str = LOGIN_REQUEST_TYPE;

    fn validate(&self) -> Result<()> {
        if self.random_string.is_empty() {
            return Err(SdkError::MissingParams("randomString".to_string()));
        }
        validate_origin(&self.origin)?;
        if let Some(path) = &self.callback_path {
            if !path.starts_with('/') || path.starts_with("//") {
                return Err(SdkError::InvalidData(format!(
                    "callbackPath must be an absolute path, got `{path}`"
                )));
            }
        }
        Ok(())
    }
}

/// Ask the wallet to share profile fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSharingRequestPayload {
    #[serde(default)]
    pub username: bool,
}

impl CredentialPayload for DataSharingRequestPayload {
    const TYPE: &'static str = DATA_SHARING_REQUEST_TYPE;

    fn validate(&self) -> Result<()> {
        if !self.username {
            return Err(SdkError::MissingParams(
                "data sharing request asks for no field".to_string(),
            ));
        }
        Ok(())
    }
}

pub type LoginRequest = TypedCredential<LoginRequestPayload>;
pub type DataSharingRequest = TypedCredential<DataSharingRequestPayload>;

/// Any request, decoded once by its tag.
#[derive(Debug, Clone)]
pub enum WalletRequest {
    Login(LoginRequest),
    DataSharing(DataSharingRequest),
}

impl WalletRequest {
    /// Decode a request JWT. Unknown tags are [`SdkError::InvalidRequestType`].
    pub fn from_jwt(jwt: &str) -> Result<Self> {
        match peek_type(jwt)?.as_str() {
            LOGIN_REQUEST_TYPE => Ok(Self::Login(LoginRequest::from_jwt(jwt)?)),
            DATA_SHARING_REQUEST_TYPE => Ok(Self::DataSharing(DataSharingRequest::from_jwt(jwt)?)),
            other => Err(SdkError::InvalidRequestType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Login(_) => LOGIN_REQUEST_TYPE,
            Self::DataSharing(_) => DATA_SHARING_REQUEST_TYPE,
        }
    }

    pub fn jwt(&self) -> &str {
        match self {
            Self::Login(r) => r.jwt(),
            Self::DataSharing(r) => r.jwt(),
        }
    }

    pub fn issuer(&self) -> &crate::did::DidUrl {
        match self {
            Self::Login(r) => r.issuer(),
            Self::DataSharing(r) => r.issuer(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Login(r) => r.id(),
            Self::DataSharing(r) => r.id(),
        }
    }

    pub fn as_login(&self) -> Option<&LoginRequest> {
        match self {
            Self::Login(r) => Some(r),
            Self::DataSharing(_) => None,
        }
    }

    pub fn as_data_sharing(&self) -> Option<&DataSharingRequest> {
        match self {
            Self::DataSharing(r) => Some(r),
            Self::Login(_) => None,
        }
    }

    pub async fn verify(&self, resolver: &Resolver, options: &VerifyOptions) -> Result<bool> {
        match self {
            Self::Login(r) => r.verify_with(resolver, options).await,
            Self::DataSharing(r) => r.verify_with(resolver, options).await,
        }
    }
}

impl From<LoginRequest> for WalletRequest {
    fn from(value: LoginRequest) -> Self {
        Self::Login(value)
    }
}

impl From<DataSharingRequest> for WalletRequest {
    fn from(value: DataSharingRequest) -> Self {
        Self::DataSharing(value)
    }
}

/// `origin` must be a bare `http(s)://host[:port]`.
pub(crate) fn validate_origin(origin: &str) -> Result<()> {
    let url = Url::parse(origin)
        .map_err(|_| SdkError::InvalidData(format!("origin `{origin}` is not a URL")))?;
    let bare = url.origin().ascii_serialization();
    if !matches!(url.scheme(), "http" | "https") || bare != origin.trim_end_matches('/') {
        return Err(SdkError::InvalidData(format!(
            "origin `{origin}` must be an http(s) origin"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_random_private_key;

    fn key() -> PublicKey {
        PublicKey::from_signing_key(&generate_random_private_key())
    }

    #[test]
    fn login_payload_validation() {
        let ok = LoginRequestPayload::new("https://app.example", key()).with_callback_path("/callback");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.random_string.len(), 64);
        assert_eq!(ok.callback_url().unwrap().as_str(), "https://app.example/callback");

        let mut bad = ok.clone();
        bad.random_string.clear();
        assert_eq!(bad.validate().unwrap_err().code(), "MissingParams");

        for origin in ["app.example", "ftp://app.example", "https://app.example/path"] {
            let bad = LoginRequestPayload::new(origin, key());
            assert_eq!(bad.validate().unwrap_err().code(), "InvalidData", "{origin}");
        }

        let bad = LoginRequestPayload::new("https://app.example", key())
            .with_callback_path("//evil.example/steal");
        assert_eq!(bad.validate().unwrap_err().code(), "InvalidData");
    }

    #[test]
    fn data_sharing_must_ask_for_something() {
        assert!(DataSharingRequestPayload { username: true }.validate().is_ok());
        assert!(DataSharingRequestPayload::default().validate().is_err());
    }

    #[test]
    fn login_payload_uses_camel_case() {
        let payload = LoginRequestPayload::new("https://app.example", key());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("randomString").is_some());
        assert!(json.get("publicKey").is_some());
        assert!(json.get("callbackPath").is_none());
    }
}
