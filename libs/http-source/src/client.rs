use crate::builder::HttpClientBuilder;
use crate::config::HttpClientConfig;
use crate::error::HttpError;
use crate::model::{RequestSpec, ResponseResult};
use crate::request::build_request;
use crate::response::{ResponseBody, read_response};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use tower::ServiceExt;
use tower::util::BoxCloneService;

/// Type-erased service stack a client sends requests through.
pub type InnerService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// HTTP client for a single invocation.
///
/// Wraps the tower stack assembled by [`HttpClientBuilder`]: retry, user
/// agent, decompression, redirect following and the hyper client underneath.
/// Cloning is cheap and shares nothing mutable.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: InnerService,
}

impl HttpClient {
    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Send `spec` and read the whole response.
    ///
    /// Retries happen inside the client stack. The request timeout, when set,
    /// bounds everything: connecting, every attempt, the backoff sleeps between
    /// them and reading the body.
    ///
    /// # Errors
    /// Returns `HttpError::Timeout` when the timeout elapses, the terminal
    /// retry error when attempts run out, and `HttpError::Body` when the body
    /// cannot be read to the end.
    pub fn execute(
        &self,
        spec: &RequestSpec,
    ) -> impl Future<Output = Result<ResponseResult, HttpError>> + Send + 'static {
        let service = self.service.clone();
        let request = build_request(spec);
        let timeout = spec.timeout();
        let method = spec.method();
        let url = spec.url().to_owned();

        async move {
            let request = request?;
            tracing::debug!(method = %method, url = %url, "Sending request");

            let exchange = async move {
                let response = service.oneshot(request).await?;
                read_response(response).await
            };

            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .map_err(|_| HttpError::Timeout(limit))?,
                None => exchange.await,
            };

            match &result {
                Ok(response) => tracing::debug!(
                    method = %method,
                    url = %url,
                    status = response.status_code,
                    "Request completed"
                ),
                Err(err) => tracing::debug!(method = %method, url = %url, error = %err, "Request failed"),
            }
            result
        }
    }
}

/// Build a client for `spec` and send it.
///
/// # Errors
/// Returns the client build error (a configuration error) or the execution
/// error of [`HttpClient::execute`].
pub async fn execute(
    config: &HttpClientConfig,
    spec: &RequestSpec,
) -> Result<ResponseResult, HttpError> {
    let client = HttpClientBuilder::for_request(config.clone(), spec).build()?;
    client.execute(spec).await
}
