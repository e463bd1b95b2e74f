// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! base64url helpers shared by the JOSE, DID and URL payload codecs.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, SdkError};

/// base64url without padding.
pub fn b64url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Decode base64url, tolerating trailing `=` padding.
pub fn b64url_decode(s: &str) -> Result<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(s.trim_end_matches('='))
        .map_err(|e| SdkError::InvalidData(format!("Invalid base64url: {e}")))
}

/// Serialize to JSON then base64url.
pub fn b64url_encode_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(b64url_encode(&json))
}

/// base64url then JSON.
pub fn b64url_decode_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    let bytes = b64url_decode(s)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64url_is_unpadded_and_url_safe() {
        let encoded = b64url_encode(&[0xfb, 0xff, 0xfe]);
        assert_eq!(encoded, "-__-");
        assert_eq!(b64url_decode(&encoded).unwrap(), vec![0xfb, 0xff, 0xfe]);
    }

    #[test]
    fn b64url_accepts_padding() {
        assert_eq!(b64url_decode("YQ==").unwrap(), b"a".to_vec());
    }
}
