//! Small JSON-over-HTTP client shared by the LLM providers and fact sources.
//!
//! - Base URL anchoring with per-request options: auth, headers, query,
//!   timeout, retry budget
//! - 429/5xx and transport failures are retried with exponential backoff
//!   (honouring `Retry-After`) until the budget is spent
//! - Secrets are never logged: auth values and secret-looking query params
//!   are redacted
//! - `VIRALWATCH_HTTP_RAW=1` additionally dumps truncated request/response
//!   bodies under the `http.raw` target
//!
//! ```no_run
//! # async fn demo() -> Result<(), viralwatch_http::HttpError> {
//! use std::time::Duration;
//! use viralwatch_http::{HttpClient, RequestOpts};
//!
//! let client = HttpClient::new("https://api.llama.fi")?;
//! let chains: serde_json::Value = client
//!     .get_json(
//!         "v2/chains",
//!         RequestOpts {
//!             timeout: Some(Duration::from_secs(10)),
//!             retries: Some(0),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;

const RAW_ENV: &str = "VIRALWATCH_HTTP_RAW";
const RAW_MAX_BODY: usize = 16 * 1024;
const SNIPPET_MAX: usize = 500;

const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "api_key",
    "apikey",
    "auth",
    "authorization",
    "key",
    "secret",
    "token",
    "x_cg_demo_api_key",
];

fn raw_enabled() -> bool {
    matches!(
        std::env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// HTTP status of an API error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

/// Authentication strategies.
///
/// ```
/// use viralwatch_http::Auth;
///
/// let auth = Auth::Bearer("token");
/// assert_eq!(auth.kind(), "bearer");
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <token>`
    Bearer(&'a str),
    /// Provider-specific header, e.g. `x-api-key`.
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    /// Key passed as a query parameter.
    Query { name: &'a str, value: Cow<'a, str> },
    None,
}

impl Auth<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Header { .. } => "header",
            Auth::Query { .. } => "query",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs; unset fields fall back to the client defaults.
///
/// ```
/// use std::time::Duration;
/// use viralwatch_http::RequestOpts;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(10)),
///     retries: Some(0),
///     ..Default::default()
/// };
/// assert_eq!(opts.retries, Some(0));
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to `base`.
    ///
    /// A trailing slash is added when missing so that relative paths extend
    /// the base path instead of replacing its last segment.
    ///
    /// ```
    /// use std::time::Duration;
    /// use viralwatch_http::HttpClient;
    ///
    /// let client = HttpClient::new("https://api.coingecko.com/api/v3")?;
    /// assert_eq!(client.base_url().as_str(), "https://api.coingecko.com/api/v3/");
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), viralwatch_http::HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let base = Url::parse(&normalized).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.request_json::<(), T>(Method::GET, path, None, opts)
            .await
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, path, Some(body), opts)
            .await
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpError::Url(e.to_string()))?;
        let body_bytes = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        let mut query: Vec<(&str, &str)> = opts
            .query
            .as_ref()
            .map(|q| q.iter().map(|(k, v)| (*k, v.as_ref())).collect())
            .unwrap_or_default();
        if let Some(Auth::Query { name, value }) = &opts.auth {
            query.push((*name, value.as_ref()));
        }
        let bearer = match &opts.auth {
            Some(Auth::Bearer(tok)) => Some(sanitize_api_key(tok)?),
            _ => None,
        };

        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");
        let req_id = uuid::Uuid::new_v4().simple().to_string();
        let mut attempt = 0usize;

        loop {
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout)
                .query(&query);
            if let Some(bytes) = &body_bytes {
                rb = rb
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }
            if let Some(Auth::Header { name, value }) = &opts.auth {
                rb = rb.header(name, value);
            }
            if let Some(tok) = &bearer {
                rb = rb.bearer_auth(tok);
            }

            tracing::debug!(
                req_id = %req_id,
                attempt = attempt + 1,
                max_retries,
                method = %method,
                host_path = %format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query = ?redact_query(&query),
                timeout_ms = timeout.as_millis() as u64,
                auth_kind,
                "http.request.start"
            );
            if raw_enabled() {
                if let Some(bytes) = &body_bytes {
                    tracing::debug!(target: "http.raw", %req_id, body = %truncate_lossy(bytes, RAW_MAX_BODY), "request");
                }
            }

            let started = Instant::now();
            let sent = rb.send().await;
            let resp = match sent {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(req_id = %req_id, attempt, backoff_ms = delay.as_millis() as u64, error = %err, "http.retrying.network");
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id = %req_id, attempt, error = %err, timeout = err.is_timeout(), "http.network_error");
                    return Err(HttpError::Network(err.to_string()));
                }
            };

            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(req_id = %req_id, attempt, backoff_ms = delay.as_millis() as u64, error = %err, "http.retrying.body");
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id = %req_id, attempt, error = %err, "http.network_error.body");
                    return Err(HttpError::Network(err.to_string()));
                }
            };
            let snippet = truncate_lossy(&bytes, SNIPPET_MAX);

            tracing::debug!(
                req_id = %req_id,
                %status,
                duration_ms = started.elapsed().as_millis() as u64,
                body_len = bytes.len(),
                "http.response"
            );
            if raw_enabled() {
                tracing::debug!(target: "http.raw", %req_id, %status, body = %truncate_lossy(&bytes, RAW_MAX_BODY), "response");
            }

            if status.is_success() {
                return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                    tracing::warn!(req_id = %req_id, serde_err = %e, body_snippet = %snippet, "http.response.decode_error");
                    HttpError::Decode(e.to_string(), snippet)
                });
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < max_retries {
                attempt += 1;
                let delay = retry_after(&headers).unwrap_or_else(|| backoff(attempt));
                tracing::warn!(req_id = %req_id, %status, attempt, backoff_ms = delay.as_millis() as u64, "http.retrying.status");
                sleep(delay).await;
                continue;
            }

            let message = extract_error_message(&bytes);
            let request_id = headers
                .get("x-request-id")
                .or_else(|| headers.get("request-id"))
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();
            tracing::warn!(req_id = %req_id, %status, message = %message, x_request_id = %request_id, "http.error");
            return Err(HttpError::Api {
                status,
                message,
                request_id,
            });
        }
    }
}

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(6)))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

fn redact_query(query: &[(&str, &str)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| {
            let secret = SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str());
            (
                (*k).to_string(),
                if secret {
                    "<redacted>".to_string()
                } else {
                    (*v).to_string()
                },
            )
        })
        .collect()
}

fn truncate_lossy(body: &[u8], max: usize) -> String {
    let mut text = String::from_utf8_lossy(body).into_owned();
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

/// Pull a human-readable message out of the common provider error envelopes.
fn extract_error_message(body: &[u8]) -> String {
    // {"error":{"message":"..."}} (OpenAI, Anthropic)
    #[derive(Deserialize)]
    struct Nested {
        error: NestedDetail,
    }
    #[derive(Deserialize)]
    struct NestedDetail {
        message: String,
    }
    // {"message":"..."} / {"error":"..."} / {"status":{"error_message":"..."}} (CoinGecko)
    #[derive(Deserialize)]
    struct Flat {
        #[serde(default)]
        message: String,
        #[serde(default)]
        error: String,
        #[serde(default)]
        status: Option<FlatStatus>,
    }
    #[derive(Deserialize)]
    struct FlatStatus {
        #[serde(default)]
        error_message: String,
    }

    if let Ok(nested) = serde_json::from_slice::<Nested>(body) {
        return nested.error.message;
    }
    if let Ok(flat) = serde_json::from_slice::<Flat>(body) {
        let from_status = flat.status.map(|s| s.error_message).unwrap_or_default();
        if let Some(msg) = [flat.message, flat.error, from_status]
            .into_iter()
            .find(|m| !m.is_empty())
        {
            return msg;
        }
    }
    truncate_lossy(body, SNIPPET_MAX)
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut key = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    key.retain(|ch| !ch.is_ascii_whitespace());

    if !key.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if key.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }
    HeaderValue::from_str(&format!("Bearer {key}"))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_secret_query_params() {
        let redacted = redact_query(&[("ids", "bitcoin"), ("api_key", "s3cr3t")]);
        assert_eq!(redacted[0].1, "bitcoin");
        assert_eq!(redacted[1].1, "<redacted>");
    }

    #[test]
    fn sanitizes_api_keys() {
        assert_eq!(sanitize_api_key(" 'sk-abc def'\n").unwrap(), "sk-abcdef");
        assert!(sanitize_api_key("ключ").is_err());
    }

    #[test]
    fn extracts_error_messages_from_known_envelopes() {
        assert_eq!(
            extract_error_message(br#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(
            extract_error_message(br#"{"status":{"error_message":"rate limited"}}"#),
            "rate limited"
        );
        assert_eq!(extract_error_message(b"Protocol not found"), "Protocol not found");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ППППП".as_bytes();
        let out = truncate_lossy(text, 3);
        assert_eq!(out, "П...");
    }
}
