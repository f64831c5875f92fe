use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL is empty
    Empty,
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors produced while validating, building and executing a request.
///
/// Variants split into two groups: configuration errors, raised before any
/// network I/O (see [`HttpError::is_configuration`]), and execution errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Invalid URL (failed to parse, or missing host or scheme)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is a
    /// diagnostic message for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// URL scheme other than `http` or `https`
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// Method outside GET, HEAD and POST
    #[error("unsupported HTTP method '{0}': only GET, HEAD and POST are allowed")]
    UnsupportedMethod(String),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// A nested configuration block (`retry`, `tls`, `proxy`, timeout) is invalid
    #[error("invalid {block} configuration: {reason}")]
    InvalidConfig { block: ConfigBlock, reason: String },

    /// TLS client configuration could not be assembled
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The whole request, retries included, did not finish in time
    #[error("request exceeded the specified timeout: {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, TLS handshake, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The server certificate was rejected by the verifier
    #[error("certificate verification failed: {0}")]
    Certificate(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body could not be read to the end
    #[error("Error reading response body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The redirect chain was longer than the configured limit
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    /// Retries ran out on a transport failure
    #[error("{method} {url} giving up after {attempts} attempt(s): {source}")]
    GaveUp {
        method: http::Method,
        url: String,
        attempts: usize,
        #[source]
        source: Box<HttpError>,
    },

    /// Retries ran out while the server kept answering with a retryable status
    #[error("{method} {url} giving up after {attempts} attempt(s): last response status {status}")]
    RetriesExhausted {
        method: http::Method,
        url: String,
        attempts: usize,
        status: http::StatusCode,
    },
}

/// Configuration block that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigBlock {
    Retry,
    Tls,
    Proxy,
    Timeout,
}

impl std::fmt::Display for ConfigBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Retry => "retry",
            Self::Tls => "TLS",
            Self::Proxy => "proxy",
            Self::Timeout => "timeout",
        })
    }
}

impl HttpError {
    pub(crate) fn config(block: ConfigBlock, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            block,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors raised before any network attempt.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidUri { .. }
                | Self::InvalidScheme { .. }
                | Self::UnsupportedMethod(_)
                | Self::InvalidHeaderName(_)
                | Self::InvalidHeaderValue(_)
                | Self::RequestBuild(_)
                | Self::InvalidConfig { .. }
                | Self::Tls(_)
        )
    }

    /// Returns `true` when the server certificate was not trusted.
    #[must_use]
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, Self::Certificate(_))
    }

    /// Returns `true` when the configured timeout elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        if find_certificate_error(&err).is_some() {
            HttpError::Certificate(Box::new(err))
        } else {
            HttpError::Transport(Box::new(err))
        }
    }
}

/// Walks the source chain looking for a rustls certificate rejection.
///
/// hyper-rustls reports handshake failures as `io::Error` wrapping the
/// `rustls::Error`, and `io::Error::source` skips the wrapped value, so
/// custom io errors are unwrapped through `get_ref`.
pub(crate) fn find_certificate_error<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a rustls::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        let rustls_err = e.downcast_ref::<rustls::Error>().or_else(|| {
            e.downcast_ref::<std::io::Error>()
                .and_then(std::io::Error::get_ref)
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        });
        if let Some(rustls_err) = rustls_err
            && matches!(rustls_err, rustls::Error::InvalidCertificate(_))
        {
            return Some(rustls_err);
        }
        current = e.source();
    }
    None
}
