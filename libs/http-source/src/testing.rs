//! Scripted HTTP/1.1 servers for tests that need the exact bytes on the wire.

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

pub(crate) const CA_PEM: &str = include_str!("../testdata/ca.pem");
pub(crate) const SERVER_PEM: &str = include_str!("../testdata/server.pem");
pub(crate) const SERVER_KEY_PEM: &str = include_str!("../testdata/server-key.pem");
pub(crate) const CLIENT_PEM: &str = include_str!("../testdata/client.pem");
pub(crate) const CLIENT_KEY_PEM: &str = include_str!("../testdata/client-key.pem");

/// One request as received by a [`RawServer`].
#[derive(Debug, Clone)]
pub(crate) struct Captured {
    pub at: Instant,
    /// Request line and headers, without the final blank line
    pub head: String,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// First value of `name`, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.eq_ignore_ascii_case(name).then_some(v.trim())
        })
    }
}

/// Server answering connection `n` with the `n`-th scripted response (the
/// last one repeats) and closing the connection afterwards.
pub(crate) struct RawServer {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
    handshake_failures: Arc<Mutex<usize>>,
}

pub(crate) enum Transport {
    Plain,
    Tls(tokio_rustls::TlsAcceptor),
}

impl RawServer {
    pub async fn start(responses: Vec<String>) -> Self {
        Self::start_with(Transport::Plain, responses).await
    }

    pub async fn start_tls(client_auth: bool, responses: Vec<String>) -> Self {
        Self::start_with(Transport::Tls(tls_acceptor(client_auth)), responses).await
    }

    async fn start_with(transport: Transport, responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let handshake_failures = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&captured);
        let failures = Arc::clone(&handshake_failures);
        tokio::spawn(async move {
            let mut served = 0usize;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let response = responses[served.min(responses.len() - 1)].clone().into_bytes();
                served += 1;
                match &transport {
                    Transport::Plain => serve(stream, &response, &sink).await,
                    Transport::Tls(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls) => serve(tls, &response, &sink).await,
                        Err(_) => *failures.lock().unwrap() += 1,
                    },
                }
            }
        });

        Self {
            addr,
            captured,
            handshake_failures,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn https_url(&self, path: &str) -> String {
        format!("https://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn handshake_failures(&self) -> usize {
        *self.handshake_failures.lock().unwrap()
    }
}

async fn serve<S>(mut stream: S, response: &[u8], sink: &Mutex<Vec<Captured>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut captured = Captured {
        at: Instant::now(),
        head,
        body: Vec::new(),
    };
    let content_length = captured
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }
    captured.body = body;
    sink.lock().unwrap().push(captured);

    let _ = stream.write_all(response).await;
    let _ = stream.shutdown().await;
}

fn tls_acceptor(client_auth: bool) -> tokio_rustls::TlsAcceptor {
    let provider = crate::tls::crypto_provider();
    let chain = CertificateDer::pem_slice_iter(SERVER_PEM.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = PrivateKeyDer::from_pem_slice(SERVER_KEY_PEM.as_bytes()).unwrap();

    let builder = rustls::ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap();
    let config = if client_auth {
        let mut roots = rustls::RootCertStore::empty();
        for cert in CertificateDer::pem_slice_iter(CA_PEM.as_bytes()) {
            roots.add(cert.unwrap()).unwrap();
        }
        let verifier =
            rustls::server::WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .unwrap();
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .unwrap()
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .unwrap()
    };

    tokio_rustls::TlsAcceptor::from(Arc::new(config))
}

/// `HTTP/1.1` response with `Connection: close` and a `Content-Length` body.
pub(crate) fn response(status_line: &str, headers: &[&str], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status_line}\r\n");
    for header in headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    out
}
