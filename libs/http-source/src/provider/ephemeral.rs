use super::{HttpProvider, ResponseState};
use crate::config::RequestConfig;
use crate::diagnostics::{Diagnostics, Outcome};

/// Ephemeral resource open.
///
/// Same request and outputs as the data source read; the caller must not
/// persist the returned state.
pub async fn open(provider: &HttpProvider, config: &RequestConfig) -> Outcome<ResponseState> {
    let mut diagnostics = Diagnostics::new();
    let state = provider.perform(config, &mut diagnostics).await;
    tracing::debug!(
        url = %config.url,
        opened = state.is_some(),
        "Ephemeral HTTP resource opened"
    );
    match state {
        Some(state) => Outcome::ok(state, diagnostics),
        None => Outcome::failed(diagnostics),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_open_returns_outputs() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token").body("grant");
            then.status(200).body(r#"{"token":"abc"}"#);
        });

        let config = RequestConfig {
            method: Some("POST".to_owned()),
            request_body: Some("grant".to_owned()),
            ..RequestConfig::get(server.url("/token"))
        };
        let outcome = open(&HttpProvider::default(), &config).await;

        let state = outcome.state.unwrap();
        assert_eq!(state.status_code, 200);
        assert_eq!(state.response_body, r#"{"token":"abc"}"#);
        mock.assert();
    }

    #[tokio::test]
    async fn test_open_reports_unsupported_scheme() {
        let outcome = open(&HttpProvider::default(), &RequestConfig::get("ftp://example.com/")).await;

        assert!(outcome.state.is_none());
        let diagnostic = outcome.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.summary, "Error creating request");
        assert!(diagnostic.detail.contains("ftp"));
    }
}
