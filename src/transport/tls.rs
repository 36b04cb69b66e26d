use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{DnsError, Result};

/// Load a rustls server config from PEM certificate chain and key files.
pub fn load_server_config(cert_path: &str, key_path: &str) -> Result<Arc<ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
            .collect::<std::io::Result<_>>()?;
    if certs.is_empty() {
        return Err(DnsError::Config(format!(
            "no certificates found in {}",
            cert_path
        )));
    }

    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
            .ok_or_else(|| DnsError::Config(format!("no private key found in {}", key_path)))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| DnsError::Config(format!("bad TLS material: {}", e)))?;

    Ok(Arc::new(config))
}
