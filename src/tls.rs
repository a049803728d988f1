//! TLS support for the relay listener
//!
//! Loads a PEM certificate chain and private key into a rustls server
//! configuration used when both paths are configured.

use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use rustls_pemfile::{certs, private_key};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};

/// Errors raised while building the TLS configuration
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to open {kind} file {path}: {source}")]
    Open {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse certificates: {0}")]
    Certificates(#[source] std::io::Error),

    #[error("failed to read private key: {0}")]
    PrivateKey(#[source] std::io::Error),

    #[error("no private key found")]
    MissingPrivateKey,

    #[error("no certificates found")]
    MissingCertificates,

    #[error("failed to create TLS config: {0}")]
    Config(#[from] rustls::Error),
}

/// TLS configuration for the HTTPS listener
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Build a TLS configuration from certificate and key files (PEM)
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, TlsError> {
        let certs = load_certs(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;

        Self::from_pem_parts(certs, key)
    }

    /// Build a TLS configuration from PEM bytes
    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let certs = parse_certs(cert_pem)?;
        let key = parse_private_key(key_pem)?;

        Self::from_pem_parts(certs, key)
    }

    fn from_pem_parts(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TlsError> {
        if certs.is_empty() {
            return Err(TlsError::MissingCertificates);
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            server_config: Arc::new(config),
        })
    }
}

fn open(kind: &'static str, path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Open {
        kind,
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open("certificate", path)?;
    certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(TlsError::Certificates)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open("key", path)?;
    private_key(&mut reader)
        .map_err(TlsError::PrivateKey)?
        .ok_or(TlsError::MissingPrivateKey)
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(pem);
    certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(TlsError::Certificates)
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(pem);
    private_key(&mut reader)
        .map_err(TlsError::PrivateKey)?
        .ok_or(TlsError::MissingPrivateKey)
}
