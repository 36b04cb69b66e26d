//! DNS-over-TLS listener (RFC 7858): a TLS handshake in front of the
//! same length-framed stream protocol the TCP listener speaks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{info, trace};

use crate::error::Result;
use crate::handler::Handler;
use crate::server::serve_stream;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_dot(
    bind: SocketAddr,
    tls_config: Arc<rustls::ServerConfig>,
    handler: Arc<Handler>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(tls_config);
    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "DoT listener ready");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let handler = handler.clone();

        tokio::spawn(async move {
            let tls = match timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => tls,
                Ok(Err(err)) => {
                    trace!(%peer, %err, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    trace!(%peer, "TLS handshake timed out");
                    return;
                }
            };
            if let Err(err) = serve_stream(tls, handler).await {
                trace!(%peer, %err, "DoT connection closed");
            }
        });
    }
}
