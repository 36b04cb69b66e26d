use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::cache::CacheKey;
use crate::constants::{CNAME_HOP_LIMIT, DEFAULT_MSG_SIZE};
use crate::dns::{DnsPacket, OptRecord, Rcode, RecordClass, RecordType};
use crate::error::Result;
use crate::exchange::Transport;
use crate::resolver::Resolver;

/// The front door every listener dispatches into: request validation,
/// single-flight coordination, cache consultation, CNAME stitching, and
/// error-to-SERVFAIL conversion.
pub struct Handler {
    resolver: Arc<Resolver>,
}

impl Handler {
    pub fn new(resolver: Arc<Resolver>) -> Arc<Self> {
        Arc::new(Self { resolver })
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Handle one query, converting any panic below into SERVFAIL so a
    /// malformed packet can never take the process down.
    pub async fn handle_safe(&self, transport: Transport, req: DnsPacket) -> DnsPacket {
        let fallback = DnsPacket::error_response(&req, Rcode::ServFail);
        match std::panic::AssertUnwindSafe(self.handle(transport, req))
            .catch_unwind()
            .await
        {
            Ok(resp) => resp,
            Err(_) => {
                warn!("query handler panicked, answering SERVFAIL");
                fallback
            }
        }
    }

    pub async fn handle(&self, transport: Transport, req: DnsPacket) -> DnsPacket {
        if req.header.opcode != 0 {
            return DnsPacket::error_response(&req, Rcode::NotImp);
        }
        if req.header.qr || req.questions.len() != 1 {
            return DnsPacket::error_response(&req, Rcode::FormErr);
        }
        if let Some(opt) = &req.edns {
            if opt.version != 0 {
                return DnsPacket::error_response(&req, Rcode::BadVers);
            }
        }
        if req.questions[0].qclass != RecordClass::IN {
            return DnsPacket::error_response(&req, Rcode::Refused);
        }

        let key = CacheKey::from_question(&req.questions[0], req.dnssec_ok(), req.header.cd);

        // Late arrivals for an in-flight identical question park here and
        // then find the answer the leader just cached.
        self.resolver
            .flights
            .wait(key.hash_value(), self.resolver.query_timeout())
            .await;

        if let Ok((resp, limiter)) = self.resolver.answers.get(&key) {
            if let Some(limiter) = limiter {
                if limiter.check().is_err() {
                    debug!(name = %key.name, "per-entry rate limit hit");
                    return DnsPacket::error_response(&req, Rcode::Refused);
                }
            }
            return self.finalize(&req, resp);
        }

        if self.resolver.errors.get(&key).is_ok() {
            debug!(name = %key.name, "error cache hit");
            return DnsPacket::error_response(&req, Rcode::ServFail);
        }

        // Simultaneous cold arrivals race to add(); everyone who isn't
        // first backs off, waits for the leader, and re-probes the cache
        // the leader just filled.
        if self.resolver.flights.add(key.hash_value()) > 1 {
            self.resolver.flights.done(key.hash_value());
            self.resolver
                .flights
                .wait(key.hash_value(), self.resolver.query_timeout())
                .await;

            if let Ok((resp, _)) = self.resolver.answers.get(&key) {
                return self.finalize(&req, resp);
            }
            if self.resolver.errors.get(&key).is_ok() {
                return DnsPacket::error_response(&req, Rcode::ServFail);
            }
            // The leader failed without a memo; run our own walk.
            self.resolver.flights.add(key.hash_value());
        }

        let result = self.query_upstream(transport, &req).await;

        // Memoize before signaling: released waiters go straight to the
        // caches and must find what the walk produced.
        match &result {
            Ok(resp) => {
                if !resp.header.tc {
                    // CapacityFull just means this answer isn't cached.
                    let _ = self.resolver.answers.set(&key, resp.clone());
                }
            }
            Err(err) => {
                if err.is_cacheable() {
                    self.resolver.errors.set(&key);
                }
            }
        }
        self.resolver.flights.done(key.hash_value());

        match result {
            Ok(resp) => self.finalize(&req, resp),
            Err(err) => {
                warn!(name = %key.name, %err, "resolution failed");
                DnsPacket::error_response(&req, Rcode::ServFail)
            }
        }
    }

    /// Run the recursive walk, retrying over TCP on truncation, then
    /// chase any CNAME chain the answer ends on.
    async fn query_upstream(&self, transport: Transport, req: &DnsPacket) -> Result<DnsPacket> {
        let mut query = DnsPacket::query("", RecordType::A);
        query.questions = req.questions.clone();
        query.header.cd = req.header.cd;
        query.edns = Some(OptRecord::with_do(true));

        let resp = self.resolve_with_tcp_retry(transport, &query).await?;
        self.follow_cnames(transport, req, resp).await
    }

    async fn resolve_with_tcp_retry(
        &self,
        transport: Transport,
        query: &DnsPacket,
    ) -> Result<DnsPacket> {
        let resp = self.resolver.resolve_from_root(transport, query).await?;
        if resp.header.tc && transport == Transport::Udp {
            debug!("truncated response, retrying walk over TCP");
            return self.resolver.resolve_from_root(Transport::Tcp, query).await;
        }
        Ok(resp)
    }

    /// When the answer carries a CNAME but not the requested type, chase
    /// the target through the cache or a fresh walk, stitching each hop
    /// into the original response.
    async fn follow_cnames(
        &self,
        transport: Transport,
        req: &DnsPacket,
        mut resp: DnsPacket,
    ) -> Result<DnsPacket> {
        let qtype = req.qtype().unwrap_or(RecordType::A);
        if qtype == RecordType::CNAME || qtype == RecordType::ANY {
            return Ok(resp);
        }

        for _ in 0..CNAME_HOP_LIMIT {
            if resp.answers.iter().any(|rr| rr.rtype == qtype) {
                break;
            }
            let Some(target) = resp
                .answers
                .iter()
                .filter(|rr| rr.rtype == RecordType::CNAME)
                .filter_map(|rr| rr.target_name())
                .last()
            else {
                break;
            };

            debug!(%target, "following CNAME");
            let mut hop_query = DnsPacket::query(&target, qtype);
            hop_query.header.cd = req.header.cd;
            hop_query.edns = Some(OptRecord::with_do(true));
            let key = CacheKey::from_question(&hop_query.questions[0], true, req.header.cd);

            let hop = match self.resolver.answers.get(&key) {
                Ok((cached, _)) => cached,
                Err(_) => {
                    let hop = self.resolve_with_tcp_retry(transport, &hop_query).await?;
                    if !hop.header.tc {
                        let _ = self.resolver.answers.set(&key, hop.clone());
                    }
                    hop
                }
            };

            resp.header.rcode = hop.header.rcode;
            resp.header.ad = resp.header.ad && hop.header.ad;
            let seen = resp.answers.clone();
            resp.answers
                .extend(hop.answers.into_iter().filter(|rr| !seen.contains(rr)));

            if resp.header.rcode != Rcode::NoError.to_u8() {
                break;
            }
        }

        Ok(resp)
    }

    /// Shape the resolver's answer for this client: restore the id and
    /// question, mirror the flags, and echo EDNS only when offered.
    fn finalize(&self, req: &DnsPacket, mut resp: DnsPacket) -> DnsPacket {
        resp.header.id = req.header.id;
        resp.header.qr = true;
        resp.header.ra = true;
        resp.header.aa = false;
        resp.header.rd = req.header.rd;
        resp.header.cd = req.header.cd;
        resp.questions = req.questions.clone();

        resp.edns = req.edns.as_ref().map(|client_opt| OptRecord {
            udp_size: DEFAULT_MSG_SIZE,
            dnssec_ok: client_opt.dnssec_ok,
            ..Default::default()
        });

        resp
    }
}
