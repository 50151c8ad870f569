//! Identity-provider integration.
//!
//! The daemon never checks passwords itself; it hands the opaque credential
//! to the configured verification endpoint and trusts the subject id that
//! comes back.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use reqwest::Client;
use serde_json::json;
use zeroize::Zeroize;

use crate::config::AuthConfig;
use crate::traits::{TokenVerifier, VerifiedIdentity};

pub struct HttpTokenVerifier {
    client: Client,
    verify_url: String,
    api_key: String,
}

impl Drop for HttpTokenVerifier {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl HttpTokenVerifier {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            verify_url: config.verify_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<VerifiedIdentity> {
        let mut req = self
            .client
            .post(&self.verify_url)
            .json(&json!({ "token": token }));
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Identity provider rejected credential ({})", status);
        }

        let identity: VerifiedIdentity = resp.json().await?;
        if identity.uid.is_empty() {
            anyhow::bail!("Identity provider returned an empty subject id");
        }
        Ok(identity)
    }
}

/// Pull the credential from the `Authorization: Bearer` header, falling back
/// to the `token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if !bearer.is_empty() {
            return Some(bearer.to_string());
        }
    }

    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                pair.trim()
                    .strip_prefix("token=")
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_string())
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        headers.insert(header::COOKIE, HeaderValue::from_static("token=cookie-tok"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=cookie-tok; lang=en"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-tok"));
    }

    #[test]
    fn missing_token_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_token(&headers), None);
    }
}
