// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the SDK. Hosts either build an [`SdkConfig`] directly or load
//! it from the environment at startup with [`SdkConfig::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CHAIN_DID_METHOD` | DID method of chain accounts | `antelope` |
//! | `CHAIN_ID` | Chain id embedded in account DIDs | `local` |
//! | `SSO_ORIGIN` | Origin of the SSO broker website | `http://localhost:3000` |
//! | `COMMUNICATION_TIMEOUT_MS` | Connect, login and ack timeout | `5000` |
//! | `LINK_AUTH_TIMEOUT_MS` | Link-auth round trip timeout | `5000` |
//! | `CLOCK_SKEW_LEEWAY_SECS` | Tolerance for `nbf` / `exp` checks | `60` |
//! | `REQUEST_TTL_SECS` | Lifetime of signed login requests | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::time::Duration;

use url::{Host, Origin, Url};

use crate::error::{Result, SdkError};
use crate::telemetry::LogFormat;

/// Environment variable name for the chain-account DID method.
pub const CHAIN_DID_METHOD_ENV: &str = "CHAIN_DID_METHOD";

/// Environment variable name for the chain id.
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";

/// Environment variable name for the SSO broker origin.
pub const SSO_ORIGIN_ENV: &str = "SSO_ORIGIN";

/// Environment variable name for the communication timeout.
pub const COMMUNICATION_TIMEOUT_ENV: &str = "COMMUNICATION_TIMEOUT_MS";

/// Environment variable name for the link-auth timeout.
pub const LINK_AUTH_TIMEOUT_ENV: &str = "LINK_AUTH_TIMEOUT_MS";

/// Environment variable name for the clock skew leeway.
pub const CLOCK_SKEW_LEEWAY_ENV: &str = "CLOCK_SKEW_LEEWAY_SECS";

/// Environment variable name for the login request lifetime.
pub const REQUEST_TTL_ENV: &str = "REQUEST_TTL_SECS";

/// Environment variable name for the log format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_CHAIN_DID_METHOD: &str = "antelope";
pub const DEFAULT_CHAIN_ID: &str = "local";
pub const DEFAULT_SSO_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_SSO_HOST: &str = "localhost";
const DEFAULT_SSO_PORT: u16 = 3000;
pub const DEFAULT_COMMUNICATION_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_LINK_AUTH_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_CLOCK_SKEW_LEEWAY: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(300);

/// SDK configuration shared by every peer of the handshake.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// DID method name of chain accounts (`did:<method>:<chain_id>:<account>`)
    pub chain_did_method: String,
    /// Chain id embedded in account DIDs
    pub chain_id: String,
    /// Origin of the SSO broker website
    pub sso_origin: Origin,
    /// Timeout for connect, login and acknowledged emits
    pub communication_timeout: Duration,
    /// Timeout for the link-auth round trip
    pub link_auth_timeout: Duration,
    /// Tolerance applied to `nbf` and `exp`
    pub clock_skew_leeway: Duration,
    /// Lifetime of signed login requests
    pub request_ttl: Duration,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            chain_did_method: DEFAULT_CHAIN_DID_METHOD.to_string(),
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            sso_origin: Origin::Tuple(
                "http".to_string(),
                Host::Domain(DEFAULT_SSO_HOST.to_string()),
                DEFAULT_SSO_PORT,
            ),
            communication_timeout: DEFAULT_COMMUNICATION_TIMEOUT,
            link_auth_timeout: DEFAULT_LINK_AUTH_TIMEOUT,
            clock_skew_leeway: DEFAULT_CLOCK_SKEW_LEEWAY,
            request_ttl: DEFAULT_REQUEST_TTL,
            log_format: LogFormat::Pretty,
        }
    }
}

impl SdkConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(method) = lookup(CHAIN_DID_METHOD_ENV) {
            config.chain_did_method = method;
        }
        if let Some(chain_id) = lookup(CHAIN_ID_ENV) {
            config.chain_id = chain_id;
        }
        if let Some(origin) = lookup(SSO_ORIGIN_ENV) {
            config.sso_origin = parse_origin(&origin)?;
        }
        if let Some(ms) = lookup(COMMUNICATION_TIMEOUT_ENV) {
            config.communication_timeout = Duration::from_millis(parse_number(COMMUNICATION_TIMEOUT_ENV, &ms)?);
        }
        if let Some(ms) = lookup(LINK_AUTH_TIMEOUT_ENV) {
            config.link_auth_timeout = Duration::from_millis(parse_number(LINK_AUTH_TIMEOUT_ENV, &ms)?);
        }
        if let Some(secs) = lookup(CLOCK_SKEW_LEEWAY_ENV) {
            config.clock_skew_leeway = Duration::from_secs(parse_number(CLOCK_SKEW_LEEWAY_ENV, &secs)?);
        }
        if let Some(secs) = lookup(REQUEST_TTL_ENV) {
            config.request_ttl = Duration::from_secs(parse_number(REQUEST_TTL_ENV, &secs)?);
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            config.log_format = format.parse()?;
        }

        if config.chain_did_method.is_empty() || config.chain_id.is_empty() {
            return Err(SdkError::MissingParams(
                "chain DID method and chain id must not be empty".to_string(),
            ));
        }

        Ok(config)
    }

    /// The SSO origin as a string without trailing slash.
    pub fn sso_origin(&self) -> String {
        self.sso_origin.ascii_serialization()
    }

    /// `path` on the SSO origin.
    pub fn sso_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&self.sso_origin())?.join(path)?)
    }
}

/// Origin of `url`. Opaque origins (`data:`, `file:`) are rejected.
pub fn parse_origin(url: &str) -> Result<Origin> {
    let origin = Url::parse(url)?.origin();
    if !origin.is_tuple() {
        return Err(SdkError::InvalidData(format!("{url} has no web origin")));
    }
    Ok(origin)
}

fn parse_number(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| SdkError::InvalidData(format!("{name} must be a number, got `{raw}`")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = SdkConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.chain_did_method, "antelope");
        assert_eq!(config.link_auth_timeout, Duration::from_millis(5000));
        assert_eq!(config.sso_origin(), "http://localhost:3000");
    }

    #[test]
    fn default_origin_matches_its_constant() {
        let config = SdkConfig::default();
        assert_eq!(config.sso_origin(), DEFAULT_SSO_ORIGIN);
        assert_eq!(config.sso_origin, parse_origin(DEFAULT_SSO_ORIGIN).unwrap());
        assert_eq!(config.sso_url("/login").unwrap().as_str(), "http://localhost:3000/login");

        let err = SdkConfig::from_lookup(lookup(&[(SSO_ORIGIN_ENV, "data:text/plain,hi")])).unwrap_err();
        assert_eq!(err.code(), "InvalidData");
    }

    #[test]
    fn variables_override_defaults() {
        let config = SdkConfig::from_lookup(lookup(&[
            (CHAIN_ID_ENV, "aca376f2"),
            (SSO_ORIGIN_ENV, "https://accounts.example.com/"),
            (LINK_AUTH_TIMEOUT_ENV, "250"),
            (LOG_FORMAT_ENV, "json"),
        ]))
        .unwrap();
        assert_eq!(config.chain_id, "aca376f2");
        assert_eq!(config.sso_origin(), "https://accounts.example.com");
        assert_eq!(config.link_auth_timeout, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = SdkConfig::from_lookup(lookup(&[(REQUEST_TTL_ENV, "soon")])).unwrap_err();
        assert_eq!(err.code(), "InvalidData");
    }
}
