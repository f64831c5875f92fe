use http::Request;
use http::header::ACCEPT_ENCODING;
use std::task::{Context, Poll};
use tower::Service;
use tower::util::{Oneshot, ServiceExt};

/// Routes each request to a decoding or a pass-through stack.
///
/// A request that already carries `Accept-Encoding` negotiated its own
/// encoding, so its response body is handed back exactly as received. All
/// other requests go through `decoding`, which advertises and undoes the
/// encodings it supports.
#[derive(Clone)]
pub struct ContentDecodingService<S> {
    decoding: S,
    passthrough: S,
}

impl<S> ContentDecodingService<S> {
    #[must_use]
    pub fn new(decoding: S, passthrough: S) -> Self {
        Self {
            decoding,
            passthrough,
        }
    }
}

impl<S, B> Service<Request<B>> for ContentDecodingService<S>
where
    S: Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Oneshot<S, Request<B>>;

    // Readiness is checked on the chosen stack inside the oneshot
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let inner = if req.headers().contains_key(ACCEPT_ENCODING) {
            self.passthrough.clone()
        } else {
            self.decoding.clone()
        };
        inner.oneshot(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::service_fn;

    fn stacks() -> ContentDecodingService<
        tower::util::BoxCloneService<Request<()>, &'static str, Infallible>,
    > {
        let decoding = service_fn(|_req: Request<()>| async { Ok::<_, Infallible>("decoding") });
        let passthrough =
            service_fn(|_req: Request<()>| async { Ok::<_, Infallible>("passthrough") });
        ContentDecodingService::new(
            tower::util::BoxCloneService::new(decoding),
            tower::util::BoxCloneService::new(passthrough),
        )
    }

    #[tokio::test]
    async fn test_request_without_accept_encoding_is_decoded() {
        let req = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(stacks().oneshot(req).await.unwrap(), "decoding");
    }

    #[tokio::test]
    async fn test_caller_accept_encoding_passes_through() {
        let req = Request::builder()
            .uri("/")
            .header(ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();
        assert_eq!(stacks().oneshot(req).await.unwrap(), "passthrough");
    }

    #[tokio::test]
    async fn test_identity_is_still_a_caller_choice() {
        let req = Request::builder()
            .uri("/")
            .header(ACCEPT_ENCODING, "identity")
            .body(())
            .unwrap();
        assert_eq!(stacks().oneshot(req).await.unwrap(), "passthrough");
    }
}
