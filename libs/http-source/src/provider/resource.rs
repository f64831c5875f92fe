//! The `http` resource: a request tied to the create/update or the destroy
//! step of the resource lifecycle.
//!
//! | operation | request sent when | state without a request |
//! |-----------|-------------------|-------------------------|
//! | create    | `when = apply`    | placeholder outputs     |
//! | read      | never             | null outputs filled     |
//! | update    | `when = apply`    | prior outputs kept      |
//! | delete    | `when = destroy`  | none                    |

use super::{HttpProvider, ResponseState};
use crate::config::RequestConfig;
use crate::diagnostics::{Diagnostics, Outcome};
use serde::{Deserialize, Serialize};

/// Lifecycle step that sends the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum When {
    /// Sent on create and update
    #[default]
    Apply,
    /// Sent on delete only
    Destroy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    pub request: RequestConfig,
    #[serde(default)]
    pub when: When,
}

/// Stored resource state: the configuration plus the computed outputs.
///
/// `outputs` is `None` when they were never computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceState {
    pub config: ResourceConfig,
    #[serde(default)]
    pub outputs: Option<ResponseState>,
}

impl ResourceState {
    fn url(&self) -> &str {
        &self.config.request.url
    }
}

pub async fn create(provider: &HttpProvider, plan: &ResourceConfig) -> Outcome<ResourceState> {
    let mut diagnostics = Diagnostics::new();
    let outputs = match plan.when {
        When::Apply => match provider.perform(&plan.request, &mut diagnostics).await {
            Some(outputs) => outputs,
            None => return Outcome::failed(diagnostics),
        },
        When::Destroy => {
            if let Err(diagnostics) = validate_deferred(provider, &plan.request) {
                return Outcome::failed(diagnostics);
            }
            tracing::debug!(url = %plan.request.url, "Request deferred to destroy");
            ResponseState::placeholder(&plan.request.url)
        }
    };

    Outcome::ok(
        ResourceState {
            config: plan.clone(),
            outputs: Some(outputs),
        },
        diagnostics,
    )
}

/// Refresh without network I/O; missing outputs get their defaults.
#[must_use]
pub fn read(prior: &ResourceState) -> Outcome<ResourceState> {
    let mut state = prior.clone();
    let url = prior.url().to_owned();
    let outputs = state
        .outputs
        .get_or_insert_with(|| ResponseState::placeholder(&url));
    if outputs.id.is_empty() {
        outputs.id = url;
    }
    Outcome::ok(state, Diagnostics::new())
}

pub async fn update(
    provider: &HttpProvider,
    plan: &ResourceConfig,
    prior: &ResourceState,
) -> Outcome<ResourceState> {
    let mut diagnostics = Diagnostics::new();
    let outputs = match plan.when {
        When::Apply => match provider.perform(&plan.request, &mut diagnostics).await {
            Some(outputs) => Some(outputs),
            None => return Outcome::failed(diagnostics),
        },
        When::Destroy => {
            if let Err(diagnostics) = validate_deferred(provider, &plan.request) {
                return Outcome::failed(diagnostics);
            }
            prior.outputs.clone()
        }
    };

    Outcome::ok(
        ResourceState {
            config: plan.clone(),
            outputs,
        },
        diagnostics,
    )
}

/// Sends the request only for `when = destroy`; returns the diagnostics.
pub async fn delete(provider: &HttpProvider, prior: &ResourceState) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    if prior.config.when == When::Destroy
        && provider
            .perform(&prior.config.request, &mut diagnostics)
            .await
            .is_none()
    {
        tracing::debug!(url = %prior.url(), "Destroy request produced no outputs");
    }
    diagnostics
}

/// Report an invalid request at plan time even though it is sent on destroy.
fn validate_deferred(provider: &HttpProvider, request: &RequestConfig) -> Result<(), Diagnostics> {
    provider
        .prepare(request)
        .map(drop)
        .map_err(|err| Diagnostics::from(&err))
}
