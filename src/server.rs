use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::constants::MIN_MSG_SIZE;
use crate::dns::DnsPacket;
use crate::error::Result;
use crate::exchange::Transport;
use crate::handler::Handler;

const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// UDP listener: one task per datagram, responses truncated to the
/// client's advertised EDNS size.
pub async fn run_udp(bind: SocketAddr, handler: Arc<Handler>) -> Result<()> {
    let socket = Arc::new(UdpSocket::bind(bind).await?);
    info!(%bind, "UDP listener ready");

    loop {
        let mut buf = vec![0u8; 4096];
        let (len, peer) = socket.recv_from(&mut buf).await?;
        buf.truncate(len);

        let socket = socket.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let req = match DnsPacket::parse(&buf) {
                Ok(req) => req,
                Err(err) => {
                    trace!(%peer, %err, "dropping unparseable datagram");
                    return;
                }
            };

            let limit = req
                .edns
                .as_ref()
                .map(|opt| opt.udp_size as usize)
                .unwrap_or(MIN_MSG_SIZE)
                .max(MIN_MSG_SIZE);

            let resp = handler.handle_safe(Transport::Udp, req).await;
            let bytes = match resp.serialize() {
                Ok(bytes) if bytes.len() > limit => match resp.truncated().serialize() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(%err, "failed to serialize truncated response");
                        return;
                    }
                },
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%err, "failed to serialize response");
                    return;
                }
            };
            if let Err(err) = socket.send_to(&bytes, peer).await {
                debug!(%peer, %err, "failed to send UDP response");
            }
        });
    }
}

/// TCP listener with standard two-byte length framing and an idle
/// timeout per connection.
pub async fn run_tcp(bind: SocketAddr, handler: Arc<Handler>) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "TCP listener ready");

    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_stream(stream, handler).await {
                trace!(%peer, %err, "TCP connection closed");
            }
        });
    }
}

/// Serve length-framed DNS messages on any byte stream; shared by the
/// TCP and DoT paths.
pub async fn serve_stream<S>(mut stream: S, handler: Arc<Handler>) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let mut len_buf = [0u8; 2];
        match timeout(TCP_IDLE_TIMEOUT, stream.read_exact(&mut len_buf)).await {
            Ok(Ok(_)) => {}
            _ => return Ok(()),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Ok(());
        }

        let mut buf = vec![0u8; len];
        timeout(TCP_IDLE_TIMEOUT, stream.read_exact(&mut buf))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;

        let req = match DnsPacket::parse(&buf) {
            Ok(req) => req,
            Err(_) => return Ok(()),
        };

        let resp = handler.handle_safe(Transport::Tcp, req).await;
        let bytes = resp.serialize()?;

        let mut framed = Vec::with_capacity(bytes.len() + 2);
        framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        framed.extend_from_slice(&bytes);
        stream.write_all(&framed).await?;
        stream.flush().await?;
    }
}
