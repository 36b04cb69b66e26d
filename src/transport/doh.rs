//! DNS-over-HTTPS listener (RFC 8484) with the common JSON API on the
//! side: wire format via GET `?dns=` or POST, JSON via GET `?name=`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, trace};

use crate::dns::{DnsPacket, DnsRecord, OptRecord, RecordType};
use crate::error::Result;
use crate::exchange::Transport;
use crate::handler::Handler;

const WIRE_CONTENT_TYPE: &str = "application/dns-message";
const JSON_CONTENT_TYPE: &str = "application/dns-json";

pub fn router(handler: Arc<Handler>) -> Router {
    Router::new()
        .route("/dns-query", get(query_get).post(query_post))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(handler)
}

/// Serve DoH, over TLS when a server config is given, plain HTTP
/// otherwise (e.g. behind a terminating proxy).
pub async fn run_doh(
    bind: SocketAddr,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    handler: Arc<Handler>,
) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let acceptor = tls_config.map(TlsAcceptor::from);
    info!(%bind, tls = acceptor.is_some(), "DoH listener ready");

    let service = TowerToHyperService::new(router(handler));

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let service = service.clone();

        tokio::spawn(async move {
            let builder = ConnBuilder::new(TokioExecutor::new());
            let served = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls) => {
                        builder
                            .serve_connection_with_upgrades(TokioIo::new(tls), service)
                            .await
                    }
                    Err(err) => {
                        trace!(%peer, %err, "DoH TLS handshake failed");
                        return;
                    }
                },
                None => {
                    builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .await
                }
            };
            if let Err(err) = served {
                trace!(%peer, %err, "DoH connection closed");
            }
        });
    }
}

async fn query_get(
    State(handler): State<Arc<Handler>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(dns) = params.get("dns") {
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(dns) else {
            return (StatusCode::BAD_REQUEST, "invalid dns parameter").into_response();
        };
        return wire_query(&handler, &bytes).await;
    }

    if params.contains_key("name") {
        return json_query(&handler, &params, &headers).await;
    }

    (StatusCode::BAD_REQUEST, "missing dns or name parameter").into_response()
}

async fn query_post(
    State(handler): State<Arc<Handler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let wire_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(WIRE_CONTENT_TYPE));
    if !wire_type {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected dns-message").into_response();
    }
    wire_query(&handler, &body).await
}

async fn wire_query(handler: &Handler, bytes: &[u8]) -> Response {
    let Ok(req) = DnsPacket::parse(bytes) else {
        return (StatusCode::BAD_REQUEST, "malformed DNS message").into_response();
    };

    let resp = handler.handle_safe(Transport::Tcp, req).await;
    let max_age = resp.min_ttl(0);
    match resp.serialize() {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, WIRE_CONTENT_TYPE.to_string()),
                (header::CACHE_CONTROL, format!("max-age={}", max_age)),
            ],
            body,
        )
            .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialization failed").into_response(),
    }
}

async fn json_query(
    handler: &Handler,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Response {
    let name = params.get("name").expect("checked by caller");
    let qtype = params
        .get("type")
        .map(|t| RecordType::from_mnemonic(t))
        .unwrap_or(Some(RecordType::A));
    let Some(qtype) = qtype else {
        return (StatusCode::BAD_REQUEST, "unknown type").into_response();
    };
    let dnssec_ok = params.get("do").is_some_and(|v| v == "1" || v == "true");
    let checking_disabled = params.get("cd").is_some_and(|v| v == "1" || v == "true");
    // edns_client_subnet is accepted for interface compatibility; the
    // resolver sends no client subnet upstream.

    let mut req = DnsPacket::query(name, qtype);
    req.header.rd = true;
    req.header.cd = checking_disabled;
    req.edns = Some(OptRecord::with_do(dnssec_ok));

    let resp = handler.handle_safe(Transport::Tcp, req).await;

    let question = json!([{
        "name": format!("{}.", resp.qname().unwrap_or_default().trim_end_matches('.')),
        "type": u16::from(qtype),
    }]);
    let answers: Vec<_> = resp
        .answers
        .iter()
        .filter(|rr| rr.rtype != RecordType::RRSIG || dnssec_ok)
        .map(|rr| {
            json!({
                "name": format!("{}.", rr.name().trim_end_matches('.')),
                "type": u16::from(rr.rtype),
                "TTL": rr.ttl,
                "data": render_rdata(rr),
            })
        })
        .collect();

    let body = json!({
        "Status": resp.header.rcode,
        "TC": resp.header.tc,
        "RD": resp.header.rd,
        "RA": resp.header.ra,
        "AD": resp.header.ad,
        "CD": resp.header.cd,
        "Question": question,
        "Answer": answers,
    });

    // Browsers asking for text/html get the legacy javascript type.
    let accept_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    let content_type = if accept_html {
        "application/x-javascript"
    } else {
        JSON_CONTENT_TYPE
    };

    ([(header::CONTENT_TYPE, content_type)], body.to_string()).into_response()
}

/// Presentation form of the common rdata types; anything else is hex.
fn render_rdata(rr: &DnsRecord) -> String {
    if let Some(ip) = rr.as_a() {
        return ip.to_string();
    }
    if let Some(ip) = rr.as_aaaa() {
        return ip.to_string();
    }
    if let Some(target) = rr.target_name() {
        return format!("{}.", target.trim_end_matches('.'));
    }
    match rr.rtype {
        RecordType::TXT => {
            let mut out = String::new();
            let mut rest = rr.rdata.as_slice();
            while let Some((&len, tail)) = rest.split_first() {
                let len = len as usize;
                if len > tail.len() {
                    break;
                }
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push('"');
                out.push_str(&String::from_utf8_lossy(&tail[..len]));
                out.push('"');
                rest = &tail[len..];
            }
            out
        }
        RecordType::MX if rr.rdata.len() > 2 => {
            let pref = u16::from_be_bytes([rr.rdata[0], rr.rdata[1]]);
            let target = crate::dns::codec::read_name_at(&rr.rdata, 2)
                .map(|(labels, _)| crate::dns::util::name_from_labels(&labels))
                .unwrap_or_default();
            format!("{} {}.", pref, target.trim_end_matches('.'))
        }
        _ => hex::encode(&rr.rdata),
    }
}
