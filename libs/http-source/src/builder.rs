use crate::client::{HttpClient, InnerService};
use crate::config::{HttpClientConfig, RetryConfig, TlsRootConfig};
use crate::error::HttpError;
use crate::layers::{ContentDecodingService, RedirectPolicy, RetryLayer, RetryPolicy, UserAgentLayer};
use crate::model::{ProxyDirective, RequestSpec, TlsOptions};
use crate::proxy::{ProxyConnector, ProxyEnv, ProxyResolver};
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::{Request, Response, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

/// Builder for the per-invocation [`HttpClient`].
///
/// Every invocation builds its own client: TLS material, proxy routing and
/// retry policy belong to the request, so nothing is shared between two
/// invocations. Building performs no network I/O.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    tls: TlsOptions,
    proxy: ProxyDirective,
    proxy_env: Option<ProxyEnv>,
    retry: Box<dyn RetryPolicy>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            tls: TlsOptions::default(),
            proxy: ProxyDirective::default(),
            proxy_env: None,
            retry: Box::new(RetryConfig::default()),
        }
    }

    /// Builder carrying the TLS, proxy and retry settings of `spec`
    #[must_use]
    pub fn for_request(config: HttpClientConfig, spec: &RequestSpec) -> Self {
        Self::with_config(config)
            .tls(spec.tls().clone())
            .proxy(spec.proxy().clone())
            .retry(spec.retry().clone())
    }

    #[must_use]
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: ProxyDirective) -> Self {
        self.proxy = proxy;
        self
    }

    /// Resolve [`ProxyDirective::FromEnvironment`] against `env` instead of
    /// the process environment read at build time
    #[must_use]
    pub fn proxy_env(mut self, env: ProxyEnv) -> Self {
        self.proxy_env = Some(env);
        self
    }

    /// Use a different retry strategy than [`RetryConfig`]
    #[must_use]
    pub fn retry<P: RetryPolicy>(mut self, policy: P) -> Self {
        self.retry = Box::new(policy);
        self
    }

    /// Set the `User-Agent` sent when the request has none
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum number of redirects to follow (0 disables following)
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Build the HTTP client with all configured layers
    ///
    /// # Errors
    /// Returns a TLS configuration error for unusable trust material or client
    /// identity, and `HttpError::InvalidHeaderValue` for a bad user agent or
    /// proxy credentials.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let tls_config = tls::client_config(self.config.tls_roots, &self.tls)?;
        let proxy_env = self.proxy_env.unwrap_or_else(ProxyEnv::from_process);
        let resolver = Arc::new(ProxyResolver::from_directive(&self.proxy, &proxy_env)?);
        if !matches!(*resolver, ProxyResolver::Direct) {
            tracing::debug!(proxy = ?resolver, "Routing connections through proxy resolver");
        }

        // HTTP/1.1 only: a caller-supplied Host header has no HTTP/2 equivalent
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(ProxyConnector::new(Arc::clone(&resolver)));

        // Connections live only as long as the invocation
        let hyper_client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build::<_, Full<Bytes>>(https);

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;

        // Request flow (outer → inner):
        //   RetryLayer → UserAgent → ContentDecoding → [Decompression] →
        //   FollowRedirect → ProxyAuth → ErrorMapping → hyper_client
        //
        // Decompression applies only when the caller left Accept-Encoding
        // unset. Proxy credentials are attached per hop, after the redirect
        // policy has stripped sensitive headers.
        let forward_auth = Arc::clone(&resolver);
        let redirecting = ServiceBuilder::new()
            .layer(FollowRedirectLayer::with_policy(RedirectPolicy::new(
                self.config.max_redirects,
            )))
            .map_request(move |mut req: Request<Full<Bytes>>| {
                if let Some(auth) = forward_auth.forward_auth(req.uri()) {
                    req.headers_mut().insert(header::PROXY_AUTHORIZATION, auth);
                }
                req
            })
            .service(hyper_client.map_err(HttpError::from));

        let decoding: InnerService = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .service(redirecting.clone())
            .map_response(box_response_body)
            .boxed_clone();
        let passthrough: InnerService = redirecting.map_response(box_response_body).boxed_clone();

        let service: InnerService = ServiceBuilder::new()
            .layer(RetryLayer::new(self.retry))
            .layer(ua_layer)
            .service(ContentDecodingService::new(decoding, passthrough))
            .boxed_clone();

        Ok(HttpClient { service })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Box the (possibly decompressing) body into [`ResponseBody`].
fn box_response_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::error::ConfigBlock;

    #[tokio::test]
    async fn test_builder_default() {
        assert!(HttpClientBuilder::new().build().is_ok());
    }

    #[tokio::test]
    async fn test_builder_for_request() {
        let mut config = RequestConfig::get("https://example.com/");
        config.insecure = Some(true);
        config.proxy = Some(crate::config::ProxyBlock {
            url: Some("http://proxy.local:3128".to_owned()),
            username: Some("user".to_owned()),
            ..Default::default()
        });
        let spec = config.validate().unwrap();

        let builder = HttpClientBuilder::for_request(HttpClientConfig::default(), &spec);
        assert!(builder.tls.insecure);
        assert!(matches!(builder.proxy, ProxyDirective::Explicit { .. }));
        assert!(builder.build().is_ok());
    }

    #[tokio::test]
    async fn test_builder_invalid_user_agent() {
        let result = HttpClientBuilder::new().user_agent("bad\nagent").build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_ca() {
        let result = HttpClientBuilder::new()
            .tls(TlsOptions {
                ca_cert_pem: Some("nope".to_owned()),
                ..Default::default()
            })
            .build();
        assert!(matches!(
            result,
            Err(HttpError::InvalidConfig {
                block: ConfigBlock::Tls,
                ..
            })
        ));
    }
}
