//! Proxy routing for outbound connections.
//!
//! [`ProxyResolver`] decides per target URI whether a proxy is used and with
//! which credentials. Environment proxies come from a [`ProxyEnv`] snapshot
//! taken when the client is built. [`ProxyConnector`] sits below the TLS connector and
//! either dials the target, opens a `CONNECT` tunnel for `https` targets, or
//! dials the proxy itself for plain `http` targets (the request is then sent
//! in absolute form).

use crate::error::HttpError;
use crate::model::ProxyDirective;
use base64::Engine;
use http::uri::Scheme;
use http::{HeaderValue, Uri};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::proxy::matcher::Matcher;
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tower::{Service, ServiceExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Snapshot of the proxy environment variables.
///
/// Upper-case names win over lower-case ones and empty values count as
/// unset. `HTTP_PROXY` is ignored when `REQUEST_METHOD` is set, since under
/// CGI it can be injected through a request's `Proxy` header.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProxyEnv {
    http: Option<String>,
    https: Option<String>,
    all: Option<String>,
    no: Option<String>,
}

impl ProxyEnv {
    /// Read the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from `(name, value)` pairs laid out like the process environment.
    #[must_use]
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: [&str; 2]| {
            names
                .into_iter()
                .find_map(|name| lookup(name).filter(|value| !value.is_empty()))
        };
        let cgi = lookup("REQUEST_METHOD").is_some();

        Self {
            http: if cgi {
                None
            } else {
                first(["HTTP_PROXY", "http_proxy"])
            },
            https: first(["HTTPS_PROXY", "https_proxy"]),
            all: first(["ALL_PROXY", "all_proxy"]),
            no: first(["NO_PROXY", "no_proxy"]),
        }
    }

    fn matcher(&self) -> Matcher {
        let mut builder = Matcher::builder();
        if let Some(value) = &self.all {
            builder = builder.all(value.clone());
        }
        if let Some(value) = &self.http {
            builder = builder.http(value.clone());
        }
        if let Some(value) = &self.https {
            builder = builder.https(value.clone());
        }
        if let Some(value) = &self.no {
            builder = builder.no(value.clone());
        }
        builder.build()
    }
}

impl std::fmt::Debug for ProxyEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Proxy URLs may carry credentials
        f.debug_struct("ProxyEnv")
            .field("http", &self.http.is_some())
            .field("https", &self.https.is_some())
            .field("all", &self.all.is_some())
            .field("no", &self.no)
            .finish()
    }
}

/// Where a connection for a given target goes.
#[derive(Clone)]
pub enum ProxyResolver {
    Direct,
    /// Every target goes through this proxy
    Fixed {
        uri: Uri,
        auth: Option<HeaderValue>,
    },
    /// Proxy chosen per target from `HTTP_PROXY`, `HTTPS_PROXY`, `ALL_PROXY`
    /// and `NO_PROXY` (either case)
    Environment(Arc<Matcher>),
}

impl std::fmt::Debug for ProxyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("Direct"),
            Self::Fixed { uri, auth } => f
                .debug_struct("Fixed")
                .field("uri", uri)
                .field("auth", &auth.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Environment(_) => f.write_str("Environment"),
        }
    }
}

impl ProxyResolver {
    /// `env` is consulted only for [`ProxyDirective::FromEnvironment`].
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the credentials cannot be
    /// encoded into a header.
    pub fn from_directive(directive: &ProxyDirective, env: &ProxyEnv) -> Result<Self, HttpError> {
        match directive {
            ProxyDirective::None => Ok(Self::Direct),
            ProxyDirective::FromEnvironment => Ok(Self::Environment(Arc::new(env.matcher()))),
            ProxyDirective::Explicit {
                url,
                username,
                password,
            } => {
                let auth = username
                    .as_deref()
                    .map(|user| basic_auth(user, password.as_deref().unwrap_or_default()))
                    .transpose()?;
                Ok(Self::Fixed {
                    uri: url.clone(),
                    auth,
                })
            }
        }
    }

    /// Proxy URI and credentials for `target`, or `None` to connect directly.
    #[must_use]
    pub fn resolve(&self, target: &Uri) -> Option<(Uri, Option<HeaderValue>)> {
        match self {
            Self::Direct => None,
            Self::Fixed { uri, auth } => Some((uri.clone(), auth.clone())),
            Self::Environment(matcher) => {
                // Environment proxies never apply to the local machine
                if is_loopback(target) {
                    return None;
                }
                let intercept = matcher.intercept(target)?;
                let proxy = intercept.uri();
                // Only plain-HTTP proxies can be dialed
                if proxy.scheme() != Some(&Scheme::HTTP) {
                    tracing::warn!(
                        proxy_scheme = proxy.scheme_str().unwrap_or_default(),
                        proxy_host = proxy.host().unwrap_or_default(),
                        target = %target,
                        "Unsupported environment proxy scheme, connecting directly"
                    );
                    return None;
                }
                Some((proxy.clone(), intercept.basic_auth().cloned()))
            }
        }
    }

    /// `Proxy-Authorization` to send with a plain-HTTP request to `target`.
    ///
    /// `https` targets authenticate on the `CONNECT` request instead.
    #[must_use]
    pub fn forward_auth(&self, target: &Uri) -> Option<HeaderValue> {
        if target.scheme() != Some(&Scheme::HTTP) {
            return None;
        }
        self.resolve(target).and_then(|(_, auth)| auth)
    }
}

fn basic_auth(username: &str, password: &str) -> Result<HeaderValue, HttpError> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
    value.set_sensitive(true);
    Ok(value)
}

fn is_loopback(target: &Uri) -> bool {
    let Some(host) = target.host() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

/// Connector applying a [`ProxyResolver`] on top of a TCP connector.
#[derive(Clone)]
pub struct ProxyConnector {
    http: HttpConnector,
    resolver: Arc<ProxyResolver>,
}

impl ProxyConnector {
    #[must_use]
    pub fn new(resolver: Arc<ProxyResolver>) -> Self {
        let mut http = HttpConnector::new();
        // TLS is layered on top by the caller
        http.enforce_http(false);
        Self { http, resolver }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxiedIo<TokioIo<TcpStream>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let http = self.http.clone();
        let route = self.resolver.resolve(&dst);

        Box::pin(async move {
            match route {
                None => {
                    let io = http.oneshot(dst).await?;
                    Ok(ProxiedIo::new(io, false))
                }
                Some((proxy, auth)) if dst.scheme() == Some(&Scheme::HTTPS) => {
                    tracing::debug!(proxy = %proxy, target = %dst, "Opening CONNECT tunnel through proxy");
                    let mut tunnel = Tunnel::new(proxy, http);
                    if let Some(auth) = auth {
                        tunnel = tunnel.with_auth(auth);
                    }
                    let io = tunnel.oneshot(dst).await?;
                    Ok(ProxiedIo::new(io, false))
                }
                Some((proxy, _)) => {
                    tracing::debug!(proxy = %proxy, target = %dst, "Forwarding request through proxy");
                    let io = http.oneshot(proxy).await?;
                    Ok(ProxiedIo::new(io, true))
                }
            }
        })
    }
}

pin_project! {
    /// Connection that tells the client whether it talks to a forwarding proxy,
    /// which switches requests to absolute form.
    pub struct ProxiedIo<T> {
        #[pin]
        inner: T,
        forwarding: bool,
    }
}

impl<T> ProxiedIo<T> {
    fn new(inner: T, forwarding: bool) -> Self {
        Self { inner, forwarding }
    }
}

impl<T: Connection> Connection for ProxiedIo<T> {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.forwarding)
    }
}

impl<T: Read> Read for ProxiedIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<T: Write> Write for ProxiedIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }
}
