//! Request definitions and their layered loading.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use http_source::provider::{ProviderConfig, ResourceConfig, When};
use http_source::{HttpClientConfig, RequestConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding definition keys, e.g.
/// `HTTP_SOURCE__REQUEST__URL`.
pub const ENV_PREFIX: &str = "HTTP_SOURCE__";

/// Everything one evaluation needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definition {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub client: HttpClientConfig,
    pub request: RequestConfig,
    #[serde(default)]
    pub when: When,
}

impl Definition {
    #[must_use]
    pub fn resource(&self) -> ResourceConfig {
        ResourceConfig {
            request: self.request.clone(),
            when: self.when,
        }
    }
}

/// Command-line values that take precedence over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub method: Option<String>,
}

/// Layered loading: YAML file (if any) -> `HTTP_SOURCE__*` env -> CLI overrides.
///
/// # Errors
/// Fails when the file cannot be read or parsed, or when the merged layers do
/// not form a valid definition (for example no `request.url` anywhere).
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Definition> {
    let env = Env::prefixed(ENV_PREFIX).split("__");
    extract(layers(path, overrides).merge(env).merge(cli_layer(overrides)))
}

fn layers(path: Option<&Path>, overrides: &Overrides) -> Figment {
    let mut figment = Figment::new();
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    tracing::debug!(
        file = path.map(|p| p.display().to_string()),
        url_override = overrides.url.is_some(),
        method_override = overrides.method.is_some(),
        "Loading request definition"
    );
    figment
}

fn cli_layer(overrides: &Overrides) -> Figment {
    let mut figment = Figment::new();
    if let Some(url) = &overrides.url {
        figment = figment.merge(Serialized::default("request.url", url));
    }
    if let Some(method) = &overrides.method {
        figment = figment.merge(Serialized::default("request.method", method));
    }
    figment
}

fn extract(figment: Figment) -> Result<Definition> {
    figment
        .extract()
        .context("failed to load request definition")
}
