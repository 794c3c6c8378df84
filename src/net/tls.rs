//! TLS configuration and certificate loading.
//!
//! The served chain is the listener certificate followed by every certificate
//! found in `ca_files`. Everything is read and checked before any socket binds.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM data in {path:?}: {source}")]
    InvalidPem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0:?}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),

    #[error("listener on port {0} is not a TLS listener")]
    NotTls(u16),
}

/// Crypto provider used for every rustls config built by this crate.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Build the rustls server configuration for a TLS listener.
pub fn load_tls_config(listener: &ListenerConfig) -> Result<RustlsConfig, TlsError> {
    let ListenerConfig::Tls {
        private_key,
        certificate,
        ca_files,
        ..
    } = listener
    else {
        return Err(TlsError::NotTls(listener.port()));
    };

    let chain = served_chain(certificate, ca_files)?;
    let key = read_private_key(private_key)?;

    let mut config = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::debug!(
        certificate = %certificate.display(),
        ca_files = ca_files.len(),
        "TLS material loaded"
    );
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

/// Certificate chain presented to clients: the listener certificate, then
/// the CA files in configured order.
pub fn served_chain(
    certificate: &Path,
    ca_files: &[PathBuf],
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut chain = read_certificates(certificate)?;
    for ca in ca_files {
        chain.extend(read_certificates(ca)?);
    }
    Ok(chain)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// All certificates in a PEM file; at least one is required.
pub fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::InvalidPem {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// First private key (PKCS#1, PKCS#8 or SEC1) in a PEM file.
pub fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::InvalidPem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pem_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn tls_listener(key: &Path, cert: &Path) -> ListenerConfig {
        ListenerConfig::Tls {
            port: 8443,
            private_key: key.to_path_buf(),
            certificate: cert.to_path_buf(),
            ca_files: Vec::new(),
        }
    }

    #[test]
    fn missing_files_are_read_errors() {
        let err = load_tls_config(&tls_listener(
            Path::new("/nonexistent/key.pem"),
            Path::new("/nonexistent/cert.pem"),
        ))
        .unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
    }

    #[test]
    fn file_without_certificates() {
        let file = pem_file("not a certificate\n");
        let err = read_certificates(file.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificate(_)));
    }

    #[test]
    fn file_without_private_key() {
        let file = pem_file("");
        let err = read_private_key(file.path()).unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)));
    }

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/tls")
            .join(name)
    }

    #[test]
    fn fixture_listener_loads_with_ca_chain() {
        let listener = ListenerConfig::Tls {
            port: 8443,
            private_key: fixture("server.key"),
            certificate: fixture("server.pem"),
            ca_files: vec![fixture("ca.pem")],
        };
        assert!(load_tls_config(&listener).is_ok());

        let chain = served_chain(&fixture("server.pem"), &[fixture("ca.pem")]).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], read_certificates(&fixture("server.pem")).unwrap()[0]);
        assert_eq!(chain[1], read_certificates(&fixture("ca.pem")).unwrap()[0]);
    }

    #[test]
    fn chain_without_ca_files_is_the_certificate_alone() {
        let chain = served_chain(&fixture("server.pem"), &[]).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn unreadable_ca_file_fails_the_listener() {
        let listener = ListenerConfig::Tls {
            port: 8443,
            private_key: fixture("server.key"),
            certificate: fixture("server.pem"),
            ca_files: vec![fixture("missing-ca.pem")],
        };
        let err = load_tls_config(&listener).unwrap_err();
        assert!(matches!(&err, TlsError::Read { path, .. } if path.ends_with("missing-ca.pem")));
    }

    #[test]
    fn plain_listener_is_not_tls() {
        let err = load_tls_config(&ListenerConfig::Plain { port: 80 }).unwrap_err();
        assert!(matches!(err, TlsError::NotTls(80)));
    }
}
