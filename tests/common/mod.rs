use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ratatoskr::dns::DnsPacket;
use tokio::net::UdpSocket;

/// Spawn a scripted authoritative server on an ephemeral UDP port. The
/// callback builds a full response for every parsed query; `delay`
/// widens race windows for concurrency tests.
pub async fn spawn_udp_auth<F>(delay: Duration, respond: F) -> SocketAddr
where
    F: Fn(&DnsPacket) -> DnsPacket + Send + Sync + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let socket = Arc::new(socket);
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(req) = DnsPacket::parse(&buf[..len]) else {
                continue;
            };
            let socket = socket.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let resp = respond(&req);
                let _ = socket.send_to(&resp.serialize().unwrap(), peer).await;
            });
        }
    });

    addr
}
