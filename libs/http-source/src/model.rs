//! Typed request and response values.
//!
//! A [`RequestSpec`] is produced by [`RequestConfig::validate`](crate::RequestConfig::validate)
//! and never changes afterwards. A [`ResponseResult`] is produced once per
//! executed request.

use crate::config::RetryConfig;
use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Uri};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// HTTP methods a request may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
}

impl Method {
    #[must_use]
    pub fn as_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Head => http::Method::HEAD,
            Self::Post => http::Method::POST,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
        }
    }
}

impl FromStr for Method {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            _ => Err(HttpError::UnsupportedMethod(s.to_owned())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS trust material and client identity for one request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// PEM bundle replacing the default root store
    pub ca_cert_pem: Option<String>,
    /// PEM client certificate chain, always paired with `client_key_pem`
    pub client_cert_pem: Option<String>,
    pub client_key_pem: Option<String>,
    /// Skip server certificate verification entirely
    pub insecure: bool,
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("ca_cert_pem", &self.ca_cert_pem.as_ref().map(|_| "<pem>"))
            .field(
                "client_cert_pem",
                &self.client_cert_pem.as_ref().map(|_| "<pem>"),
            )
            .field(
                "client_key_pem",
                &self.client_key_pem.as_ref().map(|_| "<redacted>"),
            )
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// Where outbound connections are routed.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum ProxyDirective {
    /// Connect directly, ignoring the proxy environment
    None,
    /// Always use this proxy, optionally with basic-auth credentials
    Explicit {
        url: Uri,
        username: Option<String>,
        password: Option<String>,
    },
    /// Resolve from `HTTP_PROXY`, `HTTPS_PROXY`, `ALL_PROXY` and `NO_PROXY`
    #[default]
    FromEnvironment,
}

impl fmt::Debug for ProxyDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Explicit { url, username, .. } => f
                .debug_struct("Explicit")
                .field("url", url)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::FromEnvironment => f.write_str("FromEnvironment"),
        }
    }
}

/// A fully validated request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub(crate) url: String,
    pub(crate) uri: Uri,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) tls: TlsOptions,
    pub(crate) retry: RetryConfig,
    pub(crate) proxy: ProxyDirective,
}

impl RequestSpec {
    /// The URL exactly as configured; doubles as the result identity.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Host` header override, when one was supplied.
    #[must_use]
    pub fn host_override(&self) -> Option<&HeaderValue> {
        self.headers.get(http::header::HOST)
    }

    /// `None` means no body is sent at all.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn tls(&self) -> &TlsOptions {
        &self.tls
    }

    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    #[must_use]
    pub fn proxy(&self) -> &ProxyDirective {
        &self.proxy
    }

    /// Adds headers that apply unless the request already sets them.
    #[must_use]
    pub fn with_default_headers(mut self, defaults: &HeaderMap) -> Self {
        for (name, value) in defaults {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        self
    }
}

/// Outcome of one executed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseResult {
    pub status_code: u16,
    /// Canonical header names; repeated values joined with `", "`
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 with invalid sequences replaced
    pub body: String,
    /// Standard base64 of the raw body bytes
    pub body_base64: String,
    pub body_is_utf8: bool,
}
