// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP content authority
//!
//! Talks to the content service over HTTPS:
//! - `GET {base}/manifest?since={version}` returns the manifest JSON
//! - `GET {base}/content/{category}/{id}` returns the opaque item payload

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use super::authority::{ContentAuthority, FetchError};
use crate::content::ContentCategory;
use crate::sync::UpdateManifest;

/// Connection settings for [`HttpAuthority`]
#[derive(Debug, Clone)]
pub struct HttpAuthorityConfig {
    /// Base URL of the content service
    pub base_url: String,

    /// HTTP timeout for a whole request
    pub timeout: Duration,

    /// Maximum accepted payload size (bytes)
    pub max_content_size: u64,

    /// Proxy URL (http, https or socks5)
    pub proxy_url: Option<String>,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpAuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://content.agrisync.app/v1".to_string(),
            timeout: Duration::from_secs(30),
            max_content_size: 5 * 1024 * 1024, // 5 MB
            proxy_url: None,
            user_agent: default_user_agent(),
        }
    }
}

/// `Agrisync/<crate version>`
pub fn default_user_agent() -> String {
    format!("Agrisync/{}", env!("CARGO_PKG_VERSION"))
}

/// Fetches manifests and items from the remote content service
pub struct HttpAuthority {
    client: Client,
    base: Url,
    base_url: String,
    max_content_size: u64,
}

impl HttpAuthority {
    /// Create a new authority client from config
    pub fn new(config: &HttpAuthorityConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str());

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(to_fetch_error)?;
            builder = builder.proxy(proxy);
        }

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| FetchError::NetworkError(format!("invalid base URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::NetworkError(format!(
                "base URL {} cannot carry a path",
                base_url
            )));
        }

        Ok(Self {
            client: builder.build().map_err(to_fetch_error)?,
            base,
            base_url,
            max_content_size: config.max_content_size,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl ContentAuthority for HttpAuthority {
    async fn fetch_manifest(&self, current_version: u64) -> Result<UpdateManifest, FetchError> {
        let url = self.endpoint(&["manifest"]);
        let response = self
            .client
            .get(url)
            .query(&[("since", current_version)])
            .send()
            .await
            .map_err(to_fetch_error)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpError(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(to_fetch_error)?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_item(
        &self,
        category: &ContentCategory,
        id: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.endpoint(&["content", category.as_str(), id]);
        let response = self.client.get(url).send().await.map_err(to_fetch_error)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(format!("{}:{}", category, id))),
            status => return Err(FetchError::HttpError(status.as_u16())),
        }

        // Check content length before downloading
        if let Some(len) = response.content_length() {
            if len > self.max_content_size {
                return Err(FetchError::TooLarge {
                    size: len,
                    max: self.max_content_size,
                });
            }
        }

        let data = response.bytes().await.map_err(to_fetch_error)?.to_vec();

        // Verify size after download (in case content-length was missing)
        if data.len() as u64 > self.max_content_size {
            return Err(FetchError::TooLarge {
                size: data.len() as u64,
                max: self.max_content_size,
            });
        }

        Ok(data)
    }
}

fn to_fetch_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::NetworkError(format!("timeout: {}", err))
    } else if let Some(status) = err.status() {
        FetchError::HttpError(status.as_u16())
    } else {
        FetchError::NetworkError(err.to_string())
    }
}
