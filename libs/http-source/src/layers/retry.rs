use crate::config::{ExponentialBackoff, RetryTrigger};
use crate::error::HttpError;
use crate::response::{ResponseBody, parse_retry_after};
use bytes::Bytes;
use http::{Request, Response, StatusCode, Uri};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};

/// Strategy deciding whether and when a failed attempt is repeated.
///
/// Sending one attempt is the job of the service wrapped by [`RetryLayer`];
/// the policy only classifies outcomes and spaces the attempts.
pub trait RetryPolicy: Send + Sync + 'static {
    /// Retries allowed after the first attempt
    fn max_retries(&self) -> usize;

    /// Whether an attempt that ended with `trigger` should be repeated
    fn should_retry(&self, trigger: RetryTrigger) -> bool;

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `retry_after` carries the server's `Retry-After` hint on 429 and 503.
    fn next_delay(&self, attempt: usize, retry_after: Option<Duration>) -> Duration;
}

impl RetryPolicy for Box<dyn RetryPolicy> {
    fn max_retries(&self) -> usize {
        (**self).max_retries()
    }

    fn should_retry(&self, trigger: RetryTrigger) -> bool {
        (**self).should_retry(trigger)
    }

    fn next_delay(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        (**self).next_delay(attempt, retry_after)
    }
}

/// Tower layer that repeats failed attempts according to a [`RetryPolicy`]
pub struct RetryLayer<P> {
    policy: Arc<P>,
}

impl<P> Clone for RetryLayer<P> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<P: RetryPolicy> RetryLayer<P> {
    /// Create a new `RetryLayer` with the specified policy
    #[must_use]
    pub fn new(policy: P) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S, P> Layer<S> for RetryLayer<P> {
    type Service = RetryService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

/// Service that implements retry logic with bounded backoff
///
/// Retries on both `Err(HttpError)` and `Ok(Response)` based on status codes.
/// When the budget runs out the last outcome is surfaced as an error:
/// [`HttpError::GaveUp`] wrapping the transport failure, or
/// [`HttpError::RetriesExhausted`] naming the last retryable status.
/// Non-retryable statuses (2xx, 3xx, 4xx other than 429, 501) pass through
/// as `Ok(Response)`.
pub struct RetryService<S, P> {
    inner: S,
    policy: Arc<P>,
}

impl<S: Clone, P> Clone for RetryService<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S, P> Service<Request<Full<Bytes>>> for RetryService<S, P>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    P: RetryPolicy,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let policy = Arc::clone(&self.policy);

        let (parts, body) = req.into_parts();
        let http_version = parts.version;
        let extensions = parts.extensions.clone();
        let parts = Arc::new(parts);

        Box::pin(async move {
            let method = parts.method.clone();
            let url = redact_url(&parts.uri);
            let max_retries = policy.max_retries();

            let mut attempt = 0usize;
            loop {
                let mut req = Request::from_parts((*parts).clone(), body.clone());
                *req.version_mut() = http_version;
                *req.extensions_mut() = extensions.clone();

                let mut svc = inner.clone();
                svc.ready().await?;

                match svc.call(req).await {
                    Ok(resp) => {
                        let status = resp.status();
                        if !policy.should_retry(RetryTrigger::Status(status.as_u16())) {
                            return Ok(resp);
                        }

                        if attempt >= max_retries {
                            tracing::debug!(
                                attempts = attempt + 1,
                                status = status.as_u16(),
                                method = %method,
                                url = %url,
                                "Giving up after retryable status code"
                            );
                            return Err(HttpError::RetriesExhausted {
                                method,
                                url,
                                attempts: attempt + 1,
                                status,
                            });
                        }

                        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS
                            || status == StatusCode::SERVICE_UNAVAILABLE
                        {
                            parse_retry_after(resp.headers())
                        } else {
                            None
                        };
                        let backoff = policy.next_delay(attempt, retry_after);
                        // Idle connections are not pooled, dropping closes this one
                        drop(resp);

                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries,
                            status = status.as_u16(),
                            method = %method,
                            url = %url,
                            backoff_ms = backoff.as_millis(),
                            retry_after_used = retry_after.is_some(),
                            "Retrying request after status code"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        let trigger = get_retry_trigger(&err);
                        if !policy.should_retry(trigger) {
                            return Err(err);
                        }

                        if attempt >= max_retries {
                            return Err(HttpError::GaveUp {
                                method,
                                url,
                                attempts: attempt + 1,
                                source: Box::new(err),
                            });
                        }

                        let backoff = policy.next_delay(attempt, None);
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries,
                            error = %err,
                            method = %method,
                            url = %url,
                            backoff_ms = backoff.as_millis(),
                            "Retrying request after error"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}

/// Extract retry trigger from an error
fn get_retry_trigger(err: &HttpError) -> RetryTrigger {
    match err {
        HttpError::Transport(_) => RetryTrigger::TransportError,
        // Certificate rejections, configuration and body errors never heal on retry
        _ => RetryTrigger::NonRetryable,
    }
}

/// Render the URL for messages with any password replaced.
fn redact_url(uri: &Uri) -> String {
    let rendered = uri.to_string();
    let Some(authority) = uri.authority() else {
        return rendered;
    };
    let Some((userinfo, _)) = authority.as_str().rsplit_once('@') else {
        return rendered;
    };
    match userinfo.split_once(':') {
        Some((user, _)) => rendered.replacen(userinfo, &format!("{user}:xxxxx"), 1),
        None => rendered,
    }
}

/// Delay before retry `attempt` (0-based): `initial * 2^attempt`, capped at `max`.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    u32::try_from(attempt)
        .ok()
        .and_then(|n| 2u32.checked_pow(n))
        .and_then(|factor| backoff.initial.checked_mul(factor))
        .map_or(backoff.max, |delay| delay.min(backoff.max))
}
