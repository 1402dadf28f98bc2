//! TLS configuration and certificate loading.
//!
//! Every SSL listen address gets one rustls config holding the certificates
//! of all routes bound to it. The certificate is picked per connection from
//! the SNI host name.

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::routing::{Route, TlsKeyPair};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("no certificates configured for SSL address '{0}'")]
    NoCertificates(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no private key found in '{0}'")]
    MissingKey(PathBuf),

    #[error("no certificate found in '{0}'")]
    MissingCertificate(PathBuf),

    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Crypto provider shared by the listeners and the upstream client.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Host name → certificate index used for SNI selection.
///
/// Clients that send no SNI, or an unknown name, get the first certificate.
#[derive(Debug)]
pub struct CertificateIndex {
    by_name: HashMap<String, Arc<CertifiedKey>>,
    fallback: Arc<CertifiedKey>,
}

impl CertificateIndex {
    pub fn lookup(&self, server_name: Option<&str>) -> Arc<CertifiedKey> {
        server_name
            .and_then(|name| self.by_name.get(&name.to_lowercase()))
            .unwrap_or(&self.fallback)
            .clone()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

impl ResolvesServerCert for CertificateIndex {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.lookup(client_hello.server_name()))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a PEM certificate chain and private key into a signing-ready key.
pub fn load_key_pair(pair: &TlsKeyPair, provider: &CryptoProvider) -> Result<Arc<CertifiedKey>, TlsError> {
    let cert_bytes = read_file(&pair.cert)?;
    let key_bytes = read_file(&pair.key)?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_bytes.as_slice()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|source| TlsError::Io {
            path: pair.cert.clone(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::MissingCertificate(pair.cert.clone()));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_bytes.as_slice()))
        .map_err(|source| TlsError::Io {
            path: pair.key.clone(),
            source,
        })?
        .ok_or_else(|| TlsError::MissingKey(pair.key.clone()))?;

    let signing_key = provider.key_provider.load_private_key(key)?;
    Ok(Arc::new(CertifiedKey::new(certs, signing_key)))
}

/// Build the certificate index for one SSL listen address.
///
/// Fails with [`TlsError::NoCertificates`] when no route bound to the
/// address carries a cert/key pair.
pub fn bind_certificates(
    address: &str,
    routes: &[Arc<Route>],
    provider: &CryptoProvider,
) -> Result<CertificateIndex, TlsError> {
    let mut by_name = HashMap::new();
    let mut fallback = None;

    for route in routes.iter().filter(|r| r.has_interface(address)) {
        let Some(pair) = &route.tls else {
            continue;
        };

        tracing::debug!(
            address = %address,
            cert = %pair.cert.display(),
            key = %pair.key.display(),
            "Loading certificate"
        );
        let key = load_key_pair(pair, provider)?;

        for name in &route.server_names {
            by_name.entry(name.clone()).or_insert_with(|| key.clone());
        }
        fallback.get_or_insert(key);
    }

    let fallback = fallback.ok_or_else(|| TlsError::NoCertificates(address.to_string()))?;
    Ok(CertificateIndex { by_name, fallback })
}

/// Wrap a certificate index into a server config usable by `axum-server`.
pub fn server_config(index: CertificateIndex, provider: Arc<CryptoProvider>) -> Result<RustlsConfig, TlsError> {
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(index));
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(config)))
}
