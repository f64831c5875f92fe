#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Single-request HTTP pipeline behind the `http` data source, resource and
//! ephemeral resource.
//!
//! One invocation validates a [`RequestConfig`] into a [`RequestSpec`], builds
//! a fresh hyper-based client for it and issues exactly one logical request:
//! - TLS via rustls with an optional custom CA, client certificate or
//!   disabled verification
//! - explicit, environment-derived or no proxy (CONNECT tunnel for HTTPS)
//! - bounded retries with exponential backoff and `Retry-After` support
//! - redirect following with credential stripping across hosts
//! - **transparent response decompression** (gzip, brotli, deflate)
//! - a timeout covering the whole exchange
//!
//! The response is read in full and mapped into a [`ResponseResult`]. The
//! [`provider`] surfaces wrap this in an [`Outcome`] carrying diagnostics
//! instead of errors.
//!
//! # Example
//!
//! ```ignore
//! use http_source::{HttpClientConfig, RequestConfig, execute};
//!
//! let spec = RequestConfig::get("https://checkpoint-api.hashicorp.com/v1/check/terraform")
//!     .validate()?;
//! let result = execute(&HttpClientConfig::default(), &spec).await?;
//! println!("{} {}", result.status_code, result.body);
//! ```

mod builder;
mod client;
mod config;
pub mod diagnostics;
mod error;
mod layers;
mod model;
pub mod provider;
mod proxy;
mod request;
mod response;
mod tls;

#[cfg(test)]
mod testing;

pub use builder::HttpClientBuilder;
pub use client::{HttpClient, execute};
pub use config::{
    DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_USER_AGENT, ExponentialBackoff,
    HttpClientConfig, ProxyBlock, RequestConfig, RetryBlock, RetryConfig, RetryTrigger,
    TlsRootConfig,
};
pub use diagnostics::{Diagnostic, Diagnostics, Outcome, Severity};
pub use error::{ConfigBlock, HttpError, InvalidUriKind};
pub use layers::{
    ContentDecodingService, RedirectPolicy, RetryLayer, RetryPolicy, RetryService,
    UserAgentLayer, UserAgentService, calculate_backoff,
};
pub use model::{Method, ProxyDirective, RequestSpec, ResponseResult, TlsOptions};
pub use proxy::{ProxyConnector, ProxyEnv, ProxyResolver};
pub use request::build_request;
pub use response::{ResponseBody, parse_retry_after, read_response};
