use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ratatoskr::config::Config;
use ratatoskr::dns::enums::{Rcode, RecordClass, RecordType};
use ratatoskr::dns::{DnsPacket, OptRecord};
use ratatoskr::handler::Handler;
use ratatoskr::resolver::Resolver;
use ratatoskr::server::serve_stream;

fn handler() -> Arc<Handler> {
    let config = Config::default();
    Handler::new(Arc::new(Resolver::new(&config).unwrap()))
}

async fn roundtrip(req: &DnsPacket) -> DnsPacket {
    let (mut client, server_end) = tokio::io::duplex(8192);
    let handler = handler();
    tokio::spawn(async move {
        let _ = serve_stream(server_end, handler).await;
    });

    let bytes = req.serialize().unwrap();
    let mut framed = Vec::with_capacity(bytes.len() + 2);
    framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    framed.extend_from_slice(&bytes);
    client.write_all(&framed).await.unwrap();

    let mut len_buf = [0u8; 2];
    client.read_exact(&mut len_buf).await.unwrap();
    let mut body = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    client.read_exact(&mut body).await.unwrap();
    DnsPacket::parse(&body).unwrap()
}

#[tokio::test]
async fn refuses_chaos_class_over_stream() {
    let mut req = DnsPacket::query("version.bind", RecordType::TXT);
    req.questions[0].qclass = RecordClass::CH;

    let resp = roundtrip(&req).await;
    assert_eq!(resp.rcode(), Rcode::Refused);
    assert_eq!(resp.header.id, req.header.id);
    assert!(resp.header.qr);
}

#[tokio::test]
async fn answers_badvers_for_future_edns_version() {
    let mut req = DnsPacket::query("example.com", RecordType::A);
    req.edns = Some(OptRecord {
        version: 3,
        ..Default::default()
    });

    let resp = roundtrip(&req).await;
    let opt = resp.edns.expect("OPT present in BADVERS reply");
    assert_eq!(opt.ext_rcode, 1);
    assert_eq!(resp.header.rcode, 0);
}

#[tokio::test]
async fn formerr_for_questionless_query() {
    let mut req = DnsPacket::query("example.com", RecordType::A);
    req.questions.clear();

    let resp = roundtrip(&req).await;
    assert_eq!(resp.rcode(), Rcode::FormErr);
}
