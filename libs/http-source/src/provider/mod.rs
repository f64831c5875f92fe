//! Tool-facing surfaces: the data source, the resource and the ephemeral
//! resource, plus the provider configuration they share.
//!
//! Every surface turns its configuration into a [`RequestSpec`], runs the
//! request pipeline and reports an [`Outcome`] instead of returning errors.
//!
//! [`Outcome`]: crate::diagnostics::Outcome

pub mod data_source;
pub mod ephemeral;
pub mod resource;
mod state;

pub use resource::{ResourceConfig, ResourceState, When};
pub use state::ResponseState;

use crate::client;
use crate::config::{HttpClientConfig, RequestConfig, header_map};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::HttpError;
use crate::model::RequestSpec;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub host: Option<HostConfig>,
}

/// Headers added to every request aimed at one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Hostname the headers apply to, compared with the request URL host
    pub name: Option<String>,
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
}

/// Configured provider handed to every surface operation.
#[derive(Debug, Clone, Default)]
pub struct HttpProvider {
    client: HttpClientConfig,
    hostname: Option<String>,
    host_headers: HeaderMap,
}

impl HttpProvider {
    /// Validate the provider configuration.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for host
    /// headers that cannot be sent.
    pub fn configure(config: &ProviderConfig) -> Result<Self, HttpError> {
        let Some(host) = &config.host else {
            tracing::debug!("No host configuration detected; using provider defaults");
            return Ok(Self::default());
        };

        let provider = Self {
            client: HttpClientConfig::default(),
            hostname: host.name.clone(),
            host_headers: header_map(&host.request_headers)?,
        };
        tracing::debug!(
            hostname = provider.hostname.as_deref(),
            headers = provider.host_headers.len(),
            "Provider configured"
        );
        Ok(provider)
    }

    /// Replace the client settings used for every request.
    #[must_use]
    pub fn with_client_config(mut self, client: HttpClientConfig) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn client_config(&self) -> &HttpClientConfig {
        &self.client
    }

    /// Validate `config` and add the host headers when the URL targets the
    /// configured hostname. Request-level headers win.
    ///
    /// # Errors
    /// Returns the validation error of [`RequestConfig::validate`].
    pub fn prepare(&self, config: &RequestConfig) -> Result<RequestSpec, HttpError> {
        let spec = config.validate()?;
        match &self.hostname {
            Some(name) if spec.uri().host() == Some(name.as_str()) => {
                Ok(spec.with_default_headers(&self.host_headers))
            }
            _ => Ok(spec),
        }
    }

    /// Run one request and turn the result into outputs.
    ///
    /// Errors land in `diagnostics` as error entries and yield `None`; a
    /// non-UTF-8 body adds a warning next to the outputs.
    pub(crate) async fn perform(
        &self,
        config: &RequestConfig,
        diagnostics: &mut Diagnostics,
    ) -> Option<ResponseState> {
        let spec = match self.prepare(config) {
            Ok(spec) => spec,
            Err(err) => {
                diagnostics.add_http_error(&err);
                return None;
            }
        };

        match client::execute(&self.client, &spec).await {
            Ok(result) => {
                if !result.body_is_utf8 {
                    diagnostics.push(Diagnostic::non_utf8_body());
                }
                Some(ResponseState::from_result(spec.url(), result))
            }
            Err(err) => {
                tracing::debug!(url = spec.url(), error = %err, "Request failed");
                diagnostics.add_http_error(&err);
                None
            }
        }
    }
}
