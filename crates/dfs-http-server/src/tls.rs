//! TLS acceptor construction from PEM material.

use std::sync::Arc;

use dfs_http_core::{Domain, Error, ErrorCode, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsFiles;

fn tls_error(message: impl Into<String>) -> Error {
    Error::invalid_argument(message).with_domain(Domain::Security)
}

/// Reads the certificate chain and key files and builds an acceptor.
///
/// # Errors
///
/// `InvalidArgument` when a file cannot be read or holds no usable PEM.
pub fn load_acceptor(files: &TlsFiles) -> Result<TlsAcceptor> {
    let read = |path: &std::path::Path| {
        std::fs::read(path).map_err(|e| {
            Error::wrap(e, ErrorCode::InvalidArgument, format!("cannot read {}", path.display()))
                .with_domain(Domain::Security)
        })
    };
    acceptor_from_pem(&read(&files.cert)?, &read(&files.key)?)
}

/// Builds an acceptor from in-memory PEM data. HTTP/1.1 is advertised over ALPN.
///
/// # Errors
///
/// `InvalidArgument` when the PEM holds no certificate or key, or the key
/// does not match the certificate.
pub fn acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_pem)?;
    let key = load_key(key_pem)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(format!("unsupported TLS versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| tls_error(format!("invalid certificate or key: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("malformed certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(tls_error("no certificates found in PEM"));
    }
    Ok(certs)
}

fn load_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| tls_error(format!("malformed key PEM: {e}")))?
        .ok_or_else(|| tls_error("no private key found in PEM"))
}
