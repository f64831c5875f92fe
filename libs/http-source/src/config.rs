use crate::error::{ConfigBlock, HttpError, InvalidUriKind};
use crate::layers::RetryPolicy;
use crate::model::{Method, ProxyDirective, RequestSpec, TlsOptions};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("http-source/", env!("CARGO_PKG_VERSION"));

/// Delay before the first retry when `min_delay_ms` is not set
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on retry delays when `max_delay_ms` is not set
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Conditions that may trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Transport-level errors (connection refused, DNS failure, reset, etc.)
    TransportError,
    /// Specific HTTP status code
    Status(u16),
    /// Error that is never retryable (certificate rejection, bad request, etc.)
    NonRetryable,
}

/// Exponential backoff configuration for retries
///
/// Retry `n` (0-based) waits `min(initial * 2^n, max)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (default: 1s)
    pub initial: Duration,

    /// Maximum backoff duration (default: 30s)
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

/// Bounded retry policy.
///
/// Retries transport failures, 429 and every 5xx except 501, up to
/// `max_retries` times. POST requests are retried exactly like GET and HEAD:
/// a 5xx answer to a POST may already have produced a side effect on the
/// server, and retrying repeats it. Callers needing at-most-once delivery
/// should leave retries disabled for POST.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (0 = no retries)
    pub max_retries: usize,

    /// Backoff strategy configuration
    pub backoff: ExponentialBackoff,
}

impl RetryConfig {
    /// Create a policy with `max_retries` retries and the default 1s..30s window
    #[must_use]
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: ExponentialBackoff::default(),
        }
    }

    /// Returns `true` if the status code is worth another attempt.
    #[must_use]
    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || ((500..=599).contains(&status) && status != 501)
    }
}

impl RetryPolicy for RetryConfig {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn should_retry(&self, trigger: RetryTrigger) -> bool {
        match trigger {
            RetryTrigger::TransportError => true,
            RetryTrigger::Status(status) => Self::is_retryable_status(status),
            RetryTrigger::NonRetryable => false,
        }
    }

    fn next_delay(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| crate::layers::calculate_backoff(&self.backoff, attempt))
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Per-invocation client settings that are not part of the request itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Sent only when the request does not carry its own `User-Agent`
    pub user_agent: String,
    /// Root store used when no `ca_cert_pem` is supplied
    pub tls_roots: TlsRootConfig,
    /// Longest redirect chain followed; 0 returns the first 3xx as-is
    pub max_redirects: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            tls_roots: TlsRootConfig::default(),
            max_redirects: 10,
        }
    }
}

/// `retry` block as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryBlock {
    /// Number of retries, not counting the first attempt
    pub attempts: Option<i64>,
    pub min_delay_ms: Option<i64>,
    pub max_delay_ms: Option<i64>,
}

/// `proxy` block as written by the user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyBlock {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_env: Option<bool>,
}

impl std::fmt::Debug for ProxyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyBlock")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_env", &self.from_env)
            .finish()
    }
}

/// Request arguments as received from the configuration tool.
///
/// Every field is optional except `url`; [`RequestConfig::validate`] checks
/// them together and produces an immutable [`RequestSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    pub url: String,
    pub method: Option<String>,
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<String>,
    pub request_timeout_ms: Option<i64>,
    pub retry: Option<RetryBlock>,
    pub ca_cert_pem: Option<String>,
    pub client_cert_pem: Option<String>,
    pub client_key_pem: Option<String>,
    pub insecure: Option<bool>,
    pub proxy: Option<ProxyBlock>,
}

impl RequestConfig {
    /// Shorthand for a GET of `url` with everything else unset.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Validate every field and build the request value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (see [`HttpError::is_configuration`]) for a
    /// bad URL or scheme, an unsupported method, invalid headers, a
    /// non-positive timeout, inconsistent retry bounds, conflicting TLS options
    /// or an inconsistent proxy block.
    pub fn validate(&self) -> Result<RequestSpec, HttpError> {
        let uri = validate_url(&self.url)?;
        let method = self
            .method
            .as_deref()
            .map_or(Ok(Method::Get), str::parse)?;

        Ok(RequestSpec {
            url: self.url.clone(),
            uri,
            method,
            headers: header_map(&self.request_headers)?,
            body: self.request_body.clone().map(Bytes::from),
            timeout: validate_timeout(self.request_timeout_ms)?,
            tls: self.tls_options()?,
            retry: self
                .retry
                .as_ref()
                .map_or_else(|| Ok(RetryConfig::default()), validate_retry)?,
            proxy: self
                .proxy
                .as_ref()
                .map_or(Ok(ProxyDirective::FromEnvironment), validate_proxy)?,
        })
    }

    fn tls_options(&self) -> Result<TlsOptions, HttpError> {
        let insecure = self.insecure.unwrap_or(false);
        let ca_cert_pem = self.ca_cert_pem.clone().filter(|pem| !pem.is_empty());

        if insecure && ca_cert_pem.is_some() {
            return Err(HttpError::config(
                ConfigBlock::Tls,
                "ca_cert_pem cannot be combined with insecure = true",
            ));
        }

        match (&self.client_cert_pem, &self.client_key_pem) {
            (Some(_), None) => Err(HttpError::config(
                ConfigBlock::Tls,
                "client_cert_pem requires client_key_pem",
            )),
            (None, Some(_)) => Err(HttpError::config(
                ConfigBlock::Tls,
                "client_key_pem requires client_cert_pem",
            )),
            _ => Ok(TlsOptions {
                ca_cert_pem,
                client_cert_pem: self.client_cert_pem.clone(),
                client_key_pem: self.client_key_pem.clone(),
                insecure,
            }),
        }
    }
}

/// Parse the URL and require a host and an `http`/`https` scheme.
pub(crate) fn validate_url(url: &str) -> Result<Uri, HttpError> {
    if url.is_empty() {
        return Err(HttpError::InvalidUri {
            url: String::new(),
            kind: InvalidUriKind::Empty,
            reason: "URL must not be empty".to_owned(),
        });
    }

    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            });
        }
        None => {
            return Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(uri)
}

/// Convert user headers into a `HeaderMap`, last write wins per name.
pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        map.insert(name, value);
    }
    Ok(map)
}

fn validate_timeout(timeout_ms: Option<i64>) -> Result<Option<Duration>, HttpError> {
    match timeout_ms {
        None => Ok(None),
        Some(ms) if ms >= 1 => Ok(Some(Duration::from_millis(ms.cast_unsigned()))),
        Some(ms) => Err(HttpError::config(
            ConfigBlock::Timeout,
            format!("request_timeout_ms must be at least 1, got {ms}"),
        )),
    }
}

fn non_negative(value: Option<i64>, field: &str) -> Result<Option<u64>, HttpError> {
    match value {
        None => Ok(None),
        Some(v) if v >= 0 => Ok(Some(v.cast_unsigned())),
        Some(v) => Err(HttpError::config(
            ConfigBlock::Retry,
            format!("{field} must be at least 0, got {v}"),
        )),
    }
}

fn validate_retry(block: &RetryBlock) -> Result<RetryConfig, HttpError> {
    let attempts = non_negative(block.attempts, "attempts")?.unwrap_or(0);
    let min_delay = non_negative(block.min_delay_ms, "min_delay_ms")?;
    let max_delay = non_negative(block.max_delay_ms, "max_delay_ms")?;

    if let (Some(min), Some(max)) = (min_delay, max_delay)
        && max < min
    {
        return Err(HttpError::config(
            ConfigBlock::Retry,
            format!("max_delay_ms ({max}) must be greater than or equal to min_delay_ms ({min})"),
        ));
    }

    Ok(RetryConfig {
        max_retries: usize::try_from(attempts).unwrap_or(usize::MAX),
        backoff: ExponentialBackoff::new(
            min_delay.map_or(DEFAULT_MIN_DELAY, Duration::from_millis),
            max_delay.map_or(DEFAULT_MAX_DELAY, Duration::from_millis),
        ),
    })
}

/// Resolve the `proxy` block into a directive.
///
/// Without a `url` the environment decides, unless `from_env = false` opts
/// out explicitly.
fn validate_proxy(block: &ProxyBlock) -> Result<ProxyDirective, HttpError> {
    let has_credentials = block.username.is_some() || block.password.is_some();

    if block.password.is_some() && block.username.is_none() {
        return Err(HttpError::config(
            ConfigBlock::Proxy,
            "password requires username",
        ));
    }

    match (&block.url, block.from_env) {
        (Some(_), Some(true)) => Err(HttpError::config(
            ConfigBlock::Proxy,
            "url cannot be combined with from_env = true",
        )),
        (None, Some(true)) if has_credentials => Err(HttpError::config(
            ConfigBlock::Proxy,
            "username and password cannot be combined with from_env = true",
        )),
        (None, _) if has_credentials => Err(HttpError::config(
            ConfigBlock::Proxy,
            "username and password require url",
        )),
        (None, Some(false)) => Ok(ProxyDirective::None),
        (None, _) => Ok(ProxyDirective::FromEnvironment),
        (Some(url), _) => {
            let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
                HttpError::config(ConfigBlock::Proxy, format!("invalid url '{url}': {e}"))
            })?;
            if uri.scheme_str() != Some("http") || uri.host().is_none() {
                return Err(HttpError::config(
                    ConfigBlock::Proxy,
                    format!("url '{url}' must be an http:// URL with a host"),
                ));
            }
            Ok(ProxyDirective::Explicit {
                url: uri,
                username: block.username.clone(),
                password: block.password.clone(),
            })
        }
    }
}
