use super::{HttpProvider, ResponseState};
use crate::config::RequestConfig;
use crate::diagnostics::{Diagnostics, Outcome};

/// Data source read: validate, send the request and populate the outputs.
pub async fn read(provider: &HttpProvider, config: &RequestConfig) -> Outcome<ResponseState> {
    let mut diagnostics = Diagnostics::new();
    match provider.perform(config, &mut diagnostics).await {
        Some(state) => Outcome::ok(state, diagnostics),
        None => Outcome::failed(diagnostics),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::RetryBlock;
    use crate::diagnostics::Severity;
    use crate::provider::{HostConfig, ProviderConfig};
    use httpmock::prelude::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_read_populates_outputs() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/get");
            then.status(200)
                .header("Content-Type", "text/plain")
                .header("X-Single", "foobar")
                .body("1.0.0");
        });

        let url = server.url("/get");
        let outcome = read(&HttpProvider::default(), &RequestConfig::get(url.clone())).await;

        assert!(outcome.diagnostics.is_empty());
        let state = outcome.state.unwrap();
        assert_eq!(state.id, url);
        assert_eq!(state.status_code, 200);
        assert_eq!(state.response_body, "1.0.0");
        assert_eq!(state.body, "1.0.0");
        assert_eq!(state.response_body_base64, "MS4wLjA=");
        assert_eq!(state.response_headers["X-Single"], "foobar");
    }

    #[tokio::test]
    async fn test_read_non_2xx_is_not_an_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not found");
        });

        let outcome = read(&HttpProvider::default(), &RequestConfig::get(server.url("/missing"))).await;
        assert!(!outcome.has_error());
        assert_eq!(outcome.state.unwrap().status_code, 404);
    }

    #[tokio::test]
    async fn test_read_binary_body_warns() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/image");
            then.status(200).body([0xff_u8, 0xfe, 0xfd]);
        });

        let outcome = read(&HttpProvider::default(), &RequestConfig::get(server.url("/image"))).await;

        let warnings: Vec<_> = outcome.diagnostics.iter().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert_eq!(warnings[0].summary, "Response body is not recognized as UTF-8");
        assert_eq!(outcome.state.unwrap().response_body_base64, "//79");
    }

    #[tokio::test]
    async fn test_read_sends_provider_host_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/auth")
                .header("authorization", "Bearer provider")
                .header("x-request", "1");
            then.status(200);
        });

        let provider = HttpProvider::configure(&ProviderConfig {
            host: Some(HostConfig {
                name: Some("127.0.0.1".to_owned()),
                request_headers: BTreeMap::from([(
                    "Authorization".to_owned(),
                    "Bearer provider".to_owned(),
                )]),
            }),
        })
        .unwrap();
        let mut config = RequestConfig::get(server.url("/auth"));
        config
            .request_headers
            .insert("X-Request".to_owned(), "1".to_owned());

        let outcome = read(&provider, &config).await;
        assert!(!outcome.has_error(), "{:?}", outcome.diagnostics);
        mock.assert();
    }

    #[tokio::test]
    async fn test_read_invalid_method_fails_before_network() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.any_request();
            then.status(200);
        });

        let config = RequestConfig {
            method: Some("PUT".to_owned()),
            ..RequestConfig::get(server.url("/"))
        };
        let outcome = read(&HttpProvider::default(), &config).await;

        assert!(outcome.state.is_none());
        let diagnostic = outcome.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.summary, "Error creating request");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_read_invalid_retry_bounds_fail_before_network() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.any_request();
            then.status(200);
        });

        let config = RequestConfig {
            retry: Some(RetryBlock {
                attempts: Some(1),
                min_delay_ms: Some(500),
                max_delay_ms: Some(100),
            }),
            ..RequestConfig::get(server.url("/"))
        };
        let outcome = read(&HttpProvider::default(), &config).await;

        assert!(outcome.has_error());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_read_insecure_with_ca_fails_before_network() {
        let config = RequestConfig {
            insecure: Some(true),
            ca_cert_pem: Some(crate::testing::CA_PEM.to_owned()),
            ..RequestConfig::get("https://localhost/")
        };
        let outcome = read(&HttpProvider::default(), &config).await;

        let diagnostic = outcome.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.summary, "Error configuring TLS client");
        assert!(outcome.state.is_none());
    }

    #[tokio::test]
    async fn test_read_exhausted_retries_report_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/down");
            then.status(503);
        });

        let config = RequestConfig {
            retry: Some(RetryBlock {
                attempts: Some(1),
                min_delay_ms: Some(1),
                max_delay_ms: Some(1),
            }),
            ..RequestConfig::get(server.url("/down"))
        };
        let outcome = read(&HttpProvider::default(), &config).await;

        let diagnostic = outcome.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.summary, "Error making request");
        assert!(diagnostic.detail.contains("giving up after 2 attempt(s)"));
        assert!(outcome.state.is_none());
    }
}
