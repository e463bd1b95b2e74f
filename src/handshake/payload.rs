// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! URL payloads and delivery targets.
//!
//! Redirects carry `?payload=<base64url(JSON)>`. The broker receives
//! [`RequestsUrlPayload`], the relying party receives [`CallbackPayload`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::chain::AccountName;
use crate::did::DidUrl;
use crate::encoding::{b64url_decode_json, b64url_encode_json};
use crate::error::{ErrorBody, Result, SdkError};
use crate::managers::{PairsPayload, ResponsesManager};

/// Query parameter holding the payload.
pub const PAYLOAD_PARAM: &str = "payload";

/// Append `payload` to `url` as `?payload=<base64url(JSON)>`.
pub fn append_payload<T: Serialize>(url: &Url, payload: &T) -> Result<Url> {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair(PAYLOAD_PARAM, &b64url_encode_json(payload)?);
    Ok(url)
}

/// Read the `payload` parameter of `url`.
pub fn read_payload<T: DeserializeOwned>(url: &Url) -> Result<T> {
    let (_, encoded) = url
        .query_pairs()
        .find(|(key, _)| key == PAYLOAD_PARAM)
        .ok_or_else(|| SdkError::MissingParams(format!("`{PAYLOAD_PARAM}` query parameter")))?;
    b64url_decode_json(&encoded)
}

/// Relying party to broker: `{requests: [<JWT> | null, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestsUrlPayload {
    pub requests: Vec<Option<String>>,
}

/// Broker to relying party. `requests[i]` pairs with `responses[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub success: bool,
    #[serde(default)]
    pub requests: Vec<String>,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<AccountName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CallbackPayload {
    pub fn from_responses(responses: &ResponsesManager) -> Result<Self> {
        let PairsPayload {
            requests,
            responses: signed,
        } = responses.to_payload()?;
        Ok(Self {
            success: true,
            requests,
            responses: signed,
            account_name: responses.account_name().cloned(),
            username: responses.username().map(str::to_string),
            error: None,
        })
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            requests: Vec::new(),
            responses: Vec::new(),
            account_name: None,
            username: None,
            error: Some(error),
        }
    }

    /// The paired responses on success, the peer's error otherwise.
    ///
    /// The account and username fields are only hints; they must agree
    /// with the signed responses.
    pub fn decode_outcome(&self) -> Result<ResponsesManager> {
        if !self.success {
            let error = self
                .error
                .clone()
                .ok_or_else(|| SdkError::MissingParams("error of failed callback".to_string()))?;
            return Err(error.into());
        }

        let responses = ResponsesManager::from_payload(&PairsPayload {
            requests: self.requests.clone(),
            responses: self.responses.clone(),
        })?;
        if self.account_name.is_some() && self.account_name.as_ref() != responses.account_name() {
            return Err(SdkError::InvalidData(
                "callback account does not match its login response".to_string(),
            ));
        }
        if self.username.is_some() && self.username.as_deref() != responses.username() {
            return Err(SdkError::InvalidData(
                "callback username does not match its data response".to_string(),
            ));
        }
        Ok(responses)
    }
}

/// Where a peer hands its outcome to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Browser redirect; the payload is appended to the URL
    Redirect(Url),
    /// Signed message over the communication channel
    Message(DidUrl),
}

/// A completed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    /// The URL to navigate to
    Redirect(Url),
    Message { recipient: DidUrl, message_id: String },
}

impl Delivered {
    pub fn redirect_url(&self) -> Option<&Url> {
        match self {
            Delivered::Redirect(url) => Some(url),
            Delivered::Message { .. } => None,
        }
    }
}
