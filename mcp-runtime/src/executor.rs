use std::sync::Arc;

use apibridge_core::{
    BridgeConfig, Clock, QueryValue, RequestError, RequestResult, ResponseCache,
    SlidingWindowRateLimiter, SystemClock, cache_key,
};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::{Value, json};

pub const EMPTY_RESPONSE_MESSAGE: &str = "Operation completed successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// One outbound call. `use_cache` only matters for GET.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: HttpMethod,
    pub query: Vec<(String, QueryValue)>,
    pub body: Option<Value>,
    pub use_cache: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            query: Vec::new(),
            body: None,
            use_cache: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    fn is_cacheable(&self) -> bool {
        self.method == HttpMethod::Get && self.use_cache
    }

    fn cache_key(&self) -> String {
        cache_key(&self.endpoint, &self.query)
    }
}

/// Seam between tool handlers and the network.
#[async_trait]
pub trait ApiExecutor: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> RequestResult;

    /// Entries held by the response cache, stale ones included.
    fn cache_entries(&self) -> usize;
}

/// Payloads with nothing worth caching or displaying: `null`, `false`, zero,
/// `""`, `{}` and `[]`.
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
    }
}

pub struct RequestExecutor {
    config: BridgeConfig,
    http: reqwest::Client,
    cache: ResponseCache,
    limiter: SlidingWindowRateLimiter,
}

impl RequestExecutor {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = ResponseCache::new(config.cache_ttl(), Arc::clone(&clock));
        let limiter = SlidingWindowRateLimiter::new(
            config.rate_limit_requests,
            config.rate_limit_window(),
            clock,
        );
        Self {
            config,
            http: reqwest::Client::new(),
            cache,
            limiter,
        }
    }

    async fn send(&self, request: &ApiRequest) -> RequestResult {
        let url = self.config.endpoint_url(&request.endpoint);
        tracing::info!(method = request.method.as_str(), %url, "Making request");

        let mut builder = self
            .http
            .request(request.method.to_reqwest(), &url)
            .timeout(self.config.request_timeout())
            .header(USER_AGENT, &self.config.user_agent)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if !request.query.is_empty() {
            let pairs: Vec<(&str, String)> = request
                .query
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_query_string()))
                .collect();
            builder = builder.query(&pairs);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let result = match builder.send().await {
            Ok(response) => normalize_response(response).await,
            Err(e) => Err(RequestError::Transport(e.to_string())),
        };
        if let Err(err) = &result {
            tracing::error!(%url, code = err.code(), error = %err, "Request error");
        }
        result
    }
}

async fn normalize_response(response: reqwest::Response) -> RequestResult {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RequestError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(RequestError::HttpStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    if status == reqwest::StatusCode::NO_CONTENT || bytes.is_empty() {
        return Ok(json!({
            "success": true,
            "message": EMPTY_RESPONSE_MESSAGE,
        }));
    }
    serde_json::from_slice(&bytes).map_err(|e| RequestError::InvalidBody(e.to_string()))
}

#[async_trait]
impl ApiExecutor for RequestExecutor {
    async fn execute(&self, request: ApiRequest) -> RequestResult {
        let cacheable = request.is_cacheable();
        let key = cacheable.then(|| request.cache_key());

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).filter(|v| !is_empty_payload(v)) {
                tracing::info!(endpoint = %request.endpoint, "Cache hit");
                return Ok(hit);
            }
        }

        if !self.limiter.try_admit() {
            tracing::warn!(
                endpoint = %request.endpoint,
                max_requests = self.limiter.max_requests(),
                in_window = self.limiter.in_window(),
                "Rate limit exceeded"
            );
            return Err(RequestError::RateLimited);
        }

        let payload = self.send(&request).await?;
        if let Some(key) = key {
            if !is_empty_payload(&payload) {
                self.cache.set(key, payload.clone());
                tracing::info!(endpoint = %request.endpoint, "Cached response");
            }
        }
        Ok(payload)
    }

    fn cache_entries(&self) -> usize {
        self.cache.len()
    }
}
