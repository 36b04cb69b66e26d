use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rand::prelude::IndexedRandom;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::dns::{DnsPacket, Rcode};
use crate::error::{DnsError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Sends one query to one authoritative server, honoring the configured
/// connect/read/write timeouts. Truncated responses are returned as-is;
/// the resolver decides whether to retry over TCP.
pub struct Exchanger {
    connect_timeout: Duration,
    io_timeout: Duration,
    outbound_v4: Vec<IpAddr>,
    outbound_v6: Vec<IpAddr>,
}

impl Exchanger {
    pub fn new(
        connect_timeout: Duration,
        io_timeout: Duration,
        outbound_ips: Vec<IpAddr>,
    ) -> Self {
        let (outbound_v4, outbound_v6) = outbound_ips.into_iter().partition(|ip| ip.is_ipv4());
        Self {
            connect_timeout,
            io_timeout,
            outbound_v4,
            outbound_v6,
        }
    }

    /// One exchange with EDNS fallback: a FORMERR answer to a query that
    /// carried OPT is retried once with EDNS stripped.
    pub async fn exchange(
        &self,
        server: SocketAddr,
        req: &DnsPacket,
        transport: Transport,
    ) -> Result<DnsPacket> {
        let resp = self.exchange_once(server, req, transport).await?;

        if resp.rcode() == Rcode::FormErr && req.edns.is_some() {
            debug!(%server, "FORMERR with OPT present, retrying without EDNS");
            let mut stripped = req.clone();
            stripped.edns = None;
            return self.exchange_once(server, &stripped, transport).await;
        }

        Ok(resp)
    }

    async fn exchange_once(
        &self,
        server: SocketAddr,
        req: &DnsPacket,
        transport: Transport,
    ) -> Result<DnsPacket> {
        match transport {
            Transport::Udp => match self.exchange_udp(server, req).await {
                Err(DnsError::Io(err)) if is_unreachable(&err) => {
                    debug!(%server, %err, "UDP unreachable, retrying over TCP");
                    self.exchange_tcp(server, req).await
                }
                other => other,
            },
            Transport::Tcp => self.exchange_tcp(server, req).await,
        }
    }

    /// Outbound source address for `server`'s family, picked uniformly at
    /// random per exchange. The configured list is never mutated.
    fn bind_addr(&self, server: SocketAddr) -> SocketAddr {
        let pool = if server.is_ipv4() {
            &self.outbound_v4
        } else {
            &self.outbound_v6
        };
        let ip = pool.choose(&mut rand::rng()).copied().unwrap_or(match server {
            SocketAddr::V4(_) => IpAddr::from([0, 0, 0, 0]),
            SocketAddr::V6(_) => IpAddr::from([0u16; 8]),
        });
        SocketAddr::new(ip, 0)
    }

    async fn exchange_udp(&self, server: SocketAddr, req: &DnsPacket) -> Result<DnsPacket> {
        let bytes = req.serialize()?;
        let socket = UdpSocket::bind(self.bind_addr(server)).await?;
        socket.connect(server).await?;

        timeout(self.io_timeout, socket.send(&bytes))
            .await
            .map_err(|_| DnsError::Timeout(server.to_string()))??;

        let limit = req
            .edns
            .as_ref()
            .map(|opt| opt.udp_size as usize)
            .unwrap_or(crate::constants::MIN_MSG_SIZE)
            .max(crate::constants::MIN_MSG_SIZE);
        let mut buf = vec![0u8; limit];

        // Datagrams with a foreign id are stray answers to earlier
        // queries; skip them until the deadline runs out.
        let deadline = tokio::time::Instant::now() + self.io_timeout;
        loop {
            let len = tokio::time::timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| DnsError::Timeout(server.to_string()))??;
            let resp = match DnsPacket::parse(&buf[..len]) {
                Ok(resp) => resp,
                Err(err) => {
                    trace!(%server, %err, "dropping unparseable datagram");
                    continue;
                }
            };
            if resp.header.id != req.header.id {
                trace!(%server, "dropping datagram with mismatched id");
                continue;
            }
            return Ok(resp);
        }
    }

    async fn exchange_tcp(&self, server: SocketAddr, req: &DnsPacket) -> Result<DnsPacket> {
        let bytes = req.serialize()?;

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(server))
            .await
            .map_err(|_| DnsError::Timeout(server.to_string()))??;

        let mut framed = Vec::with_capacity(bytes.len() + 2);
        framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        framed.extend_from_slice(&bytes);
        timeout(self.io_timeout, stream.write_all(&framed))
            .await
            .map_err(|_| DnsError::Timeout(server.to_string()))??;

        let mut len_buf = [0u8; 2];
        timeout(self.io_timeout, stream.read_exact(&mut len_buf))
            .await
            .map_err(|_| DnsError::Timeout(server.to_string()))??;
        let len = u16::from_be_bytes(len_buf) as usize;

        let mut buf = vec![0u8; len];
        timeout(self.io_timeout, stream.read_exact(&mut buf))
            .await
            .map_err(|_| DnsError::Timeout(server.to_string()))??;

        let resp = DnsPacket::parse(&buf)?;
        if resp.header.id != req.header.id {
            return Err(DnsError::Parse(crate::dns::ParseError::BitStream(
                "mismatched message id over TCP".to_string(),
            )));
        }
        Ok(resp)
    }
}

fn is_unreachable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::HostUnreachable
            | std::io::ErrorKind::NetworkUnreachable
            | std::io::ErrorKind::ConnectionRefused
    ) || err.to_string().contains("no route to host")
}
