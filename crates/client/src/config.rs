//! Client configuration.
//!
//! Each value resolves from: explicit arg > environment > built-in default.

use std::time::Duration;

use reqwest::Url;

use crate::error::ClientError;

pub const DEFAULT_API_URL: &str = "https://site-ai.onrender.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const API_URL_ENV: &str = "SITEAI_API_URL";
const TIMEOUT_ENV: &str = "SITEAI_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    /// Covers the whole request; prompt posts wait on model generation.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Resolve from explicit values, then `SITEAI_*` env vars, then defaults.
    pub fn resolve(
        explicit_url: Option<&str>,
        explicit_timeout_secs: Option<u64>,
    ) -> Result<Self, ClientError> {
        let raw_url = explicit_url
            .map(str::to_string)
            .or_else(|| std::env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = parse_api_url(&raw_url)?;

        let request_timeout = explicit_timeout_secs
            .or_else(|| {
                std::env::var(TIMEOUT_ENV)
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
            })
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Ok(Self {
            api_url,
            request_timeout,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_API_URL).expect("default API url is valid"))
    }
}

/// Parse a base URL; only http(s) bases that can carry path segments are accepted.
pub fn parse_api_url(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ClientError::InvalidConfig(format!("bad API url {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ClientError::InvalidConfig(format!(
            "bad API url {raw:?}: expected http(s)"
        )));
    }
    Ok(url)
}
