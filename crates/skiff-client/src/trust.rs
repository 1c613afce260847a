//! TLS trust context for the tunnel session.

use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use skiff_config::ResolvedClient;
use skiff_core::defaults::DEFAULT_ALPN;
use tracing::{debug, warn};

use crate::error::TrustError;

/// Client TLS configuration plus the name presented in SNI.
#[derive(Debug, Clone)]
pub struct TrustContext {
    pub tls: rustls::ClientConfig,
    pub server_name: String,
}

/// Build the TLS 1.3-only trust context for `config`.
///
/// A configured CA bundle replaces the bundled Mozilla roots rather than
/// extending them, and must yield at least one certificate.
pub fn build_trust(config: &ResolvedClient) -> Result<TrustContext, TrustError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let roots = load_roots(config.ca.as_deref())?;

    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let mut tls = if config.skip_verify {
        warn!("certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier(provider)))
            .with_no_client_auth()
    } else {
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    tls.alpn_protocols = vec![DEFAULT_ALPN.as_bytes().to_vec()];

    let server_name = resolve_sni(config.sni.as_deref(), &config.server)?;
    Ok(TrustContext { tls, server_name })
}

fn load_roots(ca: Option<&Path>) -> Result<RootCertStore, TrustError> {
    let mut roots = RootCertStore::empty();
    let Some(path) = ca else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(roots);
    };

    let pem = std::fs::read(path).map_err(|source| TrustError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem.as_slice())
        .filter_map(Result::ok)
        .collect();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TrustError::Parse {
            path: path.to_path_buf(),
            ignored,
        });
    }
    debug!(path = %path.display(), added, ignored, "loaded custom trust anchors");
    Ok(roots)
}

/// Pick the SNI name: explicit override, else the host part of `remote`.
pub fn resolve_sni(sni: Option<&str>, remote: &str) -> Result<String, TrustError> {
    let host = match sni {
        Some(sni) if !sni.is_empty() => sni.to_string(),
        _ => extract_host(remote),
    };
    ServerName::try_from(host.as_str())
        .map_err(|e| TrustError::ServerName(format!("{host}: {e}")))?;
    Ok(host)
}

fn extract_host(remote: &str) -> String {
    if let Some(stripped) = remote.strip_prefix('[')
        && let Some(end) = stripped.find(']')
    {
        return stripped[..end].to_string();
    }
    match remote.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host.to_string(),
        _ => remote.to_string(),
    }
}

/// Accepts any server certificate. Signatures are still checked against
/// the provider's algorithms.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
