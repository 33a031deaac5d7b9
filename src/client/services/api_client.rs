use log::{debug, warn};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::common::error::{ClientError, Result};
use crate::common::models::TokenPair;

/// Process-wide token pair. Written by the auth session, read by every request.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<TokenPair>>>,
}

impl TokenCache {
    pub async fn get(&self) -> Option<TokenPair> {
        self.inner.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|t| t.access.clone())
    }

    pub async fn set(&self, tokens: Option<TokenPair>) {
        *self.inner.write().await = tokens;
    }
}

/// The single HTTP client every domain call goes through.
#[derive(Debug, Clone)]
pub struct RestGateway {
    http: reqwest::Client,
    base: Url,
    tokens: TokenCache,
}

impl RestGateway {
    pub fn new(base_url: &str, timeout: Duration, tokens: TokenCache) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') { base_url.to_string() } else { format!("{}/", base_url) };
        let base = Url::parse(&normalized)
            .map_err(|e| ClientError::validation(format!("Invalid API url '{}': {}", base_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transient(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, base, tokens })
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::validation(format!("Invalid path '{}': {}", path, e)))
    }

    /// Starts a request with the cached bearer token attached, if there is one.
    pub async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        let builder = self.http.request(method, url);
        Ok(match self.tokens.access_token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Same as [`request`](Self::request) but with an explicit token, for calls
    /// made after the cache has already been cleared.
    pub fn request_with_token(&self, method: Method, path: &str, access: &str) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?).bearer_auth(access))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, fallback: &str) -> Result<T> {
        let response = Self::check(builder.send().await?, fallback).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!("Undecodable response body: {}", e);
            ClientError::Decode(e.to_string())
        })
    }

    /// Sends and discards whatever body comes back.
    pub async fn send_empty(&self, builder: RequestBuilder, fallback: &str) -> Result<()> {
        Self::check(builder.send().await?, fallback).await?;
        Ok(())
    }

    async fn check(response: Response, fallback: &str) -> Result<Response> {
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url().path());
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<serde_json::Value>(&text).ok();
        Err(ClientError::from_status(status.as_u16(), payload, fallback))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, fallback: &str) -> Result<T> {
        let builder = self.request(Method::GET, path).await?;
        self.send_json(builder, fallback).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B, fallback: &str) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::POST, path).await?.json(body);
        self.send_json(builder, fallback).await
    }
}
