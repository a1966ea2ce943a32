//! HTTP client for parcel detail pages
//!
//! Thin wrapper around `reqwest` with timeout, user agent and compression set
//! from configuration. Status handling is left to the caller.

use anyhow::{anyhow, Result};
use thiserror::Error;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

use crate::infrastructure::config::ConsultConfig;

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Whether to follow redirects
    pub follow_redirects: bool,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment
    pub use_system_proxy: bool,
}

impl HttpClientConfig {
    pub fn from_consult_config(consult: &ConsultConfig) -> Self {
        Self {
            timeout_seconds: consult.request_timeout_secs,
            user_agent: consult.user_agent.clone(),
            follow_redirects: true,
            use_system_proxy: true,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_consult_config(&ConsultConfig::default())
    }
}

/// Transport-level failures; HTTP status codes are not errors here
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    Send(#[source] reqwest::Error),

    #[error("{0}")]
    Body(#[source] reqwest::Error),
}

/// A fetched page: status plus decoded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPage {
    pub status: u16,
    pub body: String,
}

impl HttpPage {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new();
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .gzip(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET an HTML page, optionally sending a raw `Cookie` header.
    /// Non-2xx responses are returned as pages, only transport errors fail.
    pub async fn get_html(&self, url: &str, cookie_header: Option<&str>) -> Result<HttpPage, HttpError> {
        debug!("🌐 GET {}", url);

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9,en;q=0.8");
        if let Some(cookies) = cookie_header.filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await.map_err(HttpError::Send)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(HttpError::Body)?;

        debug!("📥 {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpPage { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn config_follows_consult_settings() {
        let consult = ConsultConfig {
            request_timeout_secs: 5,
            user_agent: "ua-test".into(),
            ..ConsultConfig::default()
        };
        let config = HttpClientConfig::from_consult_config(&consult);
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.user_agent, "ua-test");
        assert!(HttpClient::with_config(config).is_ok());
    }

    #[rstest]
    #[case(200, true)]
    #[case(204, true)]
    #[case(302, false)]
    #[case(404, false)]
    #[case(500, false)]
    fn success_is_2xx(#[case] status: u16, #[case] expected: bool) {
        let page = HttpPage { status, body: String::new() };
        assert_eq!(page.is_success(), expected);
    }
}
