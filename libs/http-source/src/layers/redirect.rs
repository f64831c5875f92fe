//! Redirect policy for the request pipeline
//!
//! Redirects are followed across hosts and schemes, up to a fixed number of
//! hops. Credentials are only forwarded to the original host or one of its
//! subdomains:
//! - `Authorization`, `Cookie`, `Proxy-Authorization` and `WWW-Authenticate`
//!   are removed once a hop leaves that host family
//! - a caller-supplied `Host` override is only kept while the hop targets the
//!   original authority
//!
//! Each hop is rebuilt from the original request headers, so a chain that
//! returns to the original host sends the credentials again.

use crate::error::HttpError;
use http::{Method, Request, Uri, header};
use http_body::Body;
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

/// Headers that are only sent to the original host and its subdomains
const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
    header::WWW_AUTHENTICATE,
];

/// Follows redirects up to `max_redirects` hops.
///
/// A chain longer than the limit fails with [`HttpError::TooManyRedirects`].
/// A limit of zero disables following: the 3xx response is returned as is.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    max_redirects: usize,
    /// Resets per-request via Clone
    redirect_count: usize,
    /// URI of the first request in the chain, recorded by `on_request`
    origin: Option<Uri>,
}

impl RedirectPolicy {
    #[must_use]
    pub fn new(max_redirects: usize) -> Self {
        Self {
            max_redirects,
            redirect_count: 0,
            origin: None,
        }
    }

    /// Whether credentials may travel from `origin` to `target`
    fn forwards_credentials(origin: &Uri, target: &Uri) -> bool {
        let (Some(origin_host), Some(target_host)) = (origin.host(), target.host()) else {
            return false;
        };
        let origin_host = origin_host.to_ascii_lowercase();
        let target_host = target_host.to_ascii_lowercase();

        target_host == origin_host
            || target_host
                .strip_suffix(origin_host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    fn same_authority(origin: &Uri, target: &Uri) -> bool {
        let origin_scheme = origin.scheme_str().unwrap_or("http");
        let target_scheme = target.scheme_str().unwrap_or("http");

        origin.host().map(str::to_ascii_lowercase) == target.host().map(str::to_ascii_lowercase)
            && origin
                .port_u16()
                .unwrap_or_else(|| default_port(origin_scheme))
                == target
                    .port_u16()
                    .unwrap_or_else(|| default_port(target_scheme))
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "https" => 443,
        _ => 80,
    }
}

impl<B> Policy<B, HttpError> for RedirectPolicy
where
    B: Body + Clone,
{
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, HttpError> {
        if self.max_redirects == 0 {
            return Ok(Action::Stop);
        }

        self.redirect_count += 1;
        if self.redirect_count > self.max_redirects {
            tracing::debug!(
                count = self.redirect_count,
                max = self.max_redirects,
                "Redirect limit reached"
            );
            return Err(HttpError::TooManyRedirects(self.max_redirects));
        }

        tracing::debug!(
            status = attempt.status().as_u16(),
            from = %attempt.previous(),
            to = %attempt.location(),
            "Following redirect"
        );
        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        let Some(origin) = &self.origin else {
            self.origin = Some(request.uri().clone());
            return;
        };

        let target = request.uri().clone();
        let headers = request.headers_mut();

        if !Self::forwards_credentials(origin, &target) {
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "Stripped sensitive header on cross-host redirect");
                }
            }
        }
        if !Self::same_authority(origin, &target) {
            headers.remove(header::HOST);
        }

        // 301/302/303 rewrite POST to GET with an empty body
        let bodiless = request.body().size_hint().exact() == Some(0);
        if bodiless && matches!(*request.method(), Method::GET | Method::HEAD) {
            request.headers_mut().remove(header::CONTENT_LENGTH);
            request.headers_mut().remove(header::CONTENT_TYPE);
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 resend the original body
        Some(body.clone())
    }
}
