//! TLS termination for the listener.
//!
//! Certificate and key are loaded once, before the listener binds, so bad
//! material stops the process at start rather than on the first handshake.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsPaths;
use crate::error::{ServerError, ServerResult};

/// Builds an acceptor from PEM files, advertising `http/1.1` over ALPN.
pub fn load_acceptor(paths: &TlsPaths) -> ServerResult<TlsAcceptor> {
    let certs = load_certs(&paths.cert)?;
    let key = load_key(&paths.key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("certificate and key rejected: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> ServerResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::Tls(format!("reading {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("parsing {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| ServerError::Tls(format!("parsing {}: {e}", path.display())))?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {}", path.display())))
}
