//! Cached outbound HTTP
//!
//! Information Hiding:
//! - One shared reqwest client; callers describe requests with `FetchRequest`
//! - Only GET requests with a positive TTL are ever cached
//! - Every failure (transport, timeout, non-success status) collapses to `None`
//!
//! Expired entries read as misses. A full sweep of expired entries runs
//! opportunistically on access once `sweep_interval` has passed.

use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{timeout, Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A response body: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    fn parse(body: String) -> Self {
        match serde_json::from_str(&body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(body),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub params: BTreeMap<String, String>,
    pub ttl: Duration,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    /// A GET cached for an hour unless told otherwise.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            params: BTreeMap::new(),
            ttl: DEFAULT_TTL,
            body: None,
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A JSON POST. Never cached.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ttl: Duration::ZERO,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_ttl_secs(self, secs: u64) -> Self {
        self.with_ttl(Duration::from_secs(secs))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && !self.ttl.is_zero()
    }

    /// Method, URL and parameters in key order.
    pub fn fingerprint(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("-");
        format!("{} {}:{}", self.method, self.url, params)
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Payload,
    expiry: Instant,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    last_sweep: Instant,
}

impl CacheState {
    fn sweep_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expiry);
        self.last_sweep = now;
        before - self.entries.len()
    }
}

/// Shared by cloning; every clone sees the same entries.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    client: Client,
    state: Arc<Mutex<CacheState>>,
    sweep_interval: Duration,
}

impl ResponseCache {
    pub fn new(sweep_interval: Duration) -> Self {
        Self::with_client(Client::new(), sweep_interval)
    }

    pub fn with_client(client: Client, sweep_interval: Duration) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            sweep_interval,
        }
    }

    // The lock is never held across an await, so a poisoned lock only means a
    // panic mid-update of a plain map; keep using it.
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn fetch(&self, request: FetchRequest) -> Option<Payload> {
        let cache_key = request.is_cacheable().then(|| request.fingerprint());

        if let Some(key) = &cache_key {
            if let Some(value) = self.lookup(key) {
                tracing::debug!("Cache hit for {}", request.url);
                return Some(value);
            }
        }

        let payload = self.send(&request).await?;

        if let Some(key) = cache_key {
            match Instant::now().checked_add(request.ttl) {
                Some(expiry) => {
                    self.state().entries.insert(
                        key,
                        CacheEntry {
                            value: payload.clone(),
                            expiry,
                        },
                    );
                }
                None => tracing::warn!(
                    "TTL {:?} for {} is out of range, not caching",
                    request.ttl,
                    request.url
                ),
            }
        }

        Some(payload)
    }

    fn lookup(&self, key: &str) -> Option<Payload> {
        let now = Instant::now();
        let mut state = self.state();

        if now.duration_since(state.last_sweep) >= self.sweep_interval {
            let removed = state.sweep_expired(now);
            if removed > 0 {
                tracing::debug!("Cleared {} expired cache items", removed);
            }
        }

        match state.entries.get(key) {
            Some(entry) if now < entry.expiry => Some(entry.value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn send(&self, request: &FetchRequest) -> Option<Payload> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let request_future = async move {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match timeout(request.timeout, request_future).await {
            Ok(Ok((status, body))) => {
                if status.is_success() {
                    Some(Payload::parse(body))
                } else {
                    tracing::warn!("API returned status {} for {}", status, request.url);
                    None
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("HTTP error for {}: {}", request.url, e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Request to {} timed out after {:?}",
                    request.url,
                    request.timeout
                );
                None
            }
        }
    }

    /// Removes every expired entry now, regardless of the sweep interval.
    pub fn sweep_expired(&self) -> usize {
        self.state().sweep_expired(Instant::now())
    }

    pub fn clear(&self) {
        let mut state = self.state();
        let size = state.entries.len();
        state.entries.clear();
        tracing::debug!("Cleared all {} cache entries", size);
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
