//! Network fetchers.

use super::{Method, Request, Response};
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::debug;

/// Performs a network round trip for a request.
///
/// Implementations return `Err` only for transport failures. An HTTP error
/// status is a successful fetch and comes back as an `Ok(Response)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a fetcher from network settings.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Timeouts during send or body read both become `Error::Timeout`.
    fn map_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout_secs)
        } else {
            Error::from(err)
        }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Copy response headers, keeping values that are not valid UTF-8.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .http
            .request(Self::method(request.method), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(e))?
            .to_vec();

        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
