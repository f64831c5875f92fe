//! TLS client configuration.
//!
//! Builds the rustls `ClientConfig` for one request from its [`TlsOptions`]:
//! default roots (webpki or the OS store), a caller-supplied CA bundle, an
//! optional client certificate, or no verification at all.

use crate::config::TlsRootConfig;
use crate::error::{ConfigBlock, HttpError};
use crate::model::TlsOptions;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::sync::{Arc, OnceLock};

/// Cached native root certificates.
/// Always stores Ok; empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();

    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Native root certificates, loaded from the OS store on first use.
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// Get the crypto provider for TLS connections.
///
/// Uses the process-wide default when one is installed, otherwise an
/// aws-lc-rs provider that is not installed globally.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build the TLS client configuration for one request.
///
/// # Errors
/// Returns `HttpError::InvalidConfig` (TLS block) when the CA bundle holds no
/// certificate or the client certificate and key cannot be used together, and
/// `HttpError::Tls` when no root store can be assembled.
pub fn client_config(roots: TlsRootConfig, opts: &TlsOptions) -> Result<ClientConfig, HttpError> {
    let provider = crypto_provider();

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?;

    let builder = if opts.insecure {
        tracing::warn!("TLS certificate verification is disabled for this request");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
    } else {
        let root_store = match opts.ca_cert_pem.as_deref() {
            Some(pem) => ca_root_store(pem)?,
            None => default_root_store(roots)?,
        };
        builder.with_root_certificates(root_store)
    };

    match (&opts.client_cert_pem, &opts.client_key_pem) {
        (Some(cert_pem), Some(key_pem)) => {
            let (chain, key) = client_identity(cert_pem, key_pem)?;
            builder.with_client_auth_cert(chain, key).map_err(|e| {
                HttpError::config(
                    ConfigBlock::Tls,
                    format!("error creating x509 key pair: {e}"),
                )
            })
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

fn ca_root_store(pem: &str) -> Result<RootCertStore, HttpError> {
    let invalid = || {
        HttpError::config(
            ConfigBlock::Tls,
            "Can't add the CA certificate to certificate pool. Only PEM encoded certificates are supported.",
        )
    };

    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs);
    if ignored > 0 {
        tracing::warn!(added, ignored, "some CA certificates could not be parsed");
    }
    if added == 0 {
        return Err(invalid());
    }
    Ok(store)
}

fn default_root_store(roots: TlsRootConfig) -> Result<RootCertStore, HttpError> {
    match roots {
        TlsRootConfig::WebPki => Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        }),
        TlsRootConfig::Native => {
            let certs = native_root_certs();
            let mut store = RootCertStore::empty();
            let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());
            if ignored > 0 {
                tracing::warn!(added, ignored, "some native root certificates could not be parsed");
            }
            if added == 0 {
                return Err(HttpError::Tls(
                    format!(
                        "no valid native root CA certificates (found {}, {} failed to parse)",
                        certs.len(),
                        ignored
                    )
                    .into(),
                ));
            }
            Ok(store)
        }
    }
}

fn client_identity(
    cert_pem: &str,
    key_pem: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), HttpError> {
    let chain = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            HttpError::config(
                ConfigBlock::Tls,
                format!("error creating x509 key pair: invalid client certificate: {e}"),
            )
        })?;
    if chain.is_empty() {
        return Err(HttpError::config(
            ConfigBlock::Tls,
            "error creating x509 key pair: failed to find any PEM data in certificate input",
        ));
    }

    let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes()).map_err(|e| {
        HttpError::config(
            ConfigBlock::Tls,
            format!("error creating x509 key pair: invalid client key: {e}"),
        )
    })?;

    Ok((chain, key))
}

/// Accepts any server certificate; signatures are still checked so the
/// handshake itself stays well-formed.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
