//! HTTP access to external sources.
//!
//! Providers talk to sources through the [`SourceClient`] trait so the
//! selection logic can be exercised against canned responses. The production
//! implementation, [`HttpSourceClient`], wraps a `reqwest` client configured
//! with bounded timeouts and a static credential.

use std::time::Duration;

use async_trait::async_trait;
use linkwatch_common::config::AppConfig;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::ProviderError;

/// A decoded JSON response plus its pagination hint.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResponse {
    pub body: Value,
    /// Target of the `rel="last"` link, if the source paginates this listing.
    pub last_page: Option<Url>,
}

impl SourceResponse {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            last_page: None,
        }
    }

    pub fn with_last_page(mut self, last_page: Url) -> Self {
        self.last_page = Some(last_page);
        self
    }
}

/// Read-only JSON access to one external source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Base URL that relative endpoint paths are resolved against.
    fn base_url(&self) -> &Url;

    /// GET `url` and decode the JSON body. Non-2xx statuses are errors.
    async fn get_json(&self, url: &Url) -> Result<SourceResponse, ProviderError>;

    /// Resolve `path` against the base URL and append `params` to its query.
    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let mut url = self
            .base_url()
            .join(path)
            .map_err(|e| ProviderError::InvalidUrl(format!("{path}: {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter().copied());
        }
        Ok(url)
    }
}

/// Settings for one [`HttpSourceClient`].
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub accept: &'static str,
    /// Query parameters appended to every request (e.g. an API key).
    pub default_query: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl SourceSettings {
    /// GitHub REST v3 settings.
    pub fn github(config: &AppConfig) -> Self {
        Self {
            base_url: config.github_api_url.clone(),
            bearer_token: config.github_token.clone(),
            accept: "application/vnd.github+json",
            default_query: Vec::new(),
            connect_timeout: Duration::from_millis(config.source_connect_timeout_ms),
            read_timeout: Duration::from_millis(config.source_read_timeout_ms),
        }
    }

    /// Stack Exchange API settings.
    pub fn stackoverflow(config: &AppConfig) -> Self {
        Self {
            base_url: config.stackoverflow_api_url.clone(),
            bearer_token: None,
            accept: "application/json",
            default_query: config
                .stackoverflow_key
                .iter()
                .map(|key| ("key".to_string(), key.clone()))
                .collect(),
            connect_timeout: Duration::from_millis(config.source_connect_timeout_ms),
            read_timeout: Duration::from_millis(config.source_read_timeout_ms),
        }
    }
}

/// `reqwest`-backed [`SourceClient`].
#[derive(Clone)]
pub struct HttpSourceClient {
    http: Client,
    base_url: Url,
    default_query: Vec<(String, String)>,
}

impl std::fmt::Debug for HttpSourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSourceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpSourceClient {
    pub fn new(settings: SourceSettings) -> Result<Self, ProviderError> {
        let mut base_url = Url::parse(&settings.base_url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {e}", settings.base_url)))?;
        // `Url::join` drops the last path segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(settings.accept));
        if let Some(token) = &settings.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ProviderError::InvalidConfig("token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(concat!("linkwatch/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            default_query: settings.default_query,
        })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json(&self, url: &Url) -> Result<SourceResponse, ProviderError> {
        let mut request = self.http.get(url.clone());
        if !self.default_query.is_empty() {
            request = request.query(&self.default_query);
        }

        let res = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(url, e))?;

        let status = res.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Source returned error status");
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let last_page = res
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_last_link);

        let body: Value = res
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(url, e))?;

        Ok(SourceResponse { body, last_page })
    }
}

/// Extract the `rel="last"` target from an RFC 8288 `Link` header.
///
/// ```text
/// <https://api.github.com/repositories/1/issues/2/comments?per_page=1&page=2>; rel="next",
/// <https://api.github.com/repositories/1/issues/2/comments?per_page=1&page=9>; rel="last"
/// ```
pub fn parse_last_link(header: &str) -> Option<Url> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_last = parts.any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };
            name.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_ascii_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("last"))
        });

        if is_last { Url::parse(target).ok() } else { None }
    })
}
