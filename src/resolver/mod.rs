pub mod root;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::cache::{AnswerCache, CacheKey, DelegationCache, ErrorCache};
use crate::config::Config;
use crate::dns::rdata::{Dnskey, Ds, Rrsig};
use crate::dns::{DnsPacket, OptRecord, Rcode, RecordType, util};
use crate::dnssec::{DnssecError, Nsec3Set, TrustAnchorSet, Validator};
use crate::error::{DnsError, Result};
use crate::exchange::{Exchanger, Transport};
use crate::pool::AuthServers;
use crate::singleflight::SingleFlight;

/// A DS RRset together with the child zone name it authenticates. An
/// empty record set means the zone is verified insecure.
#[derive(Clone, Debug, Default)]
pub struct DsSet {
    pub zone: String,
    pub records: Vec<Ds>,
}

impl DsSet {
    pub fn new(zone: &str, records: Vec<Ds>) -> Self {
        Self {
            zone: util::normalize(zone),
            records,
        }
    }

    pub fn insecure(zone: &str) -> Self {
        Self::new(zone, Vec::new())
    }

    pub fn is_signed(&self) -> bool {
        !self.records.is_empty()
    }
}

/// The iterative resolution engine: walks the hierarchy from the root
/// zone to an authoritative answer, validating the DNSSEC chain of trust
/// and populating the shared caches along the way.
pub struct Resolver {
    exchanger: Exchanger,
    pub answers: Arc<AnswerCache>,
    pub delegations: Arc<DelegationCache>,
    pub errors: Arc<ErrorCache>,
    pub flights: Arc<SingleFlight>,
    validator: Validator,
    anchors: TrustAnchorSet,
    roots: Arc<AuthServers>,
    root_ds: Vec<Ds>,
    fallback: Vec<SocketAddr>,
    maxdepth: u32,
    query_timeout: Duration,
    queries: AtomicU64,
    failures: AtomicU64,
}

impl Resolver {
    pub fn new(config: &Config) -> Result<Self> {
        let anchors = TrustAnchorSet::from_config(&config.rootkeys)
            .map_err(|e| DnsError::Config(e.to_string()))?;
        if anchors.is_empty() {
            return Err(DnsError::Config("empty root trust anchor set".to_string()));
        }
        let root_ds = anchors.ds_set();

        let mut root_addrs = config.root_addrs()?;
        root_addrs.extend(config.root6_addrs()?);
        if root_addrs.is_empty() {
            return Err(DnsError::Config("no root servers configured".to_string()));
        }

        Ok(Self {
            exchanger: Exchanger::new(
                Duration::from_secs(config.connecttimeout),
                Duration::from_secs(config.timeout),
                config.outbound_addrs()?,
            ),
            answers: Arc::new(AnswerCache::new(config.cachesize, config.ratelimit)),
            delegations: Arc::new(DelegationCache::new()),
            errors: Arc::new(ErrorCache::new(config.expire)),
            flights: Arc::new(SingleFlight::new()),
            validator: Validator::new(),
            anchors,
            roots: AuthServers::new(root_addrs),
            root_ds,
            fallback: config.fallback_addrs()?,
            maxdepth: config.maxdepth,
            query_timeout: Duration::from_secs(config.timeout),
            queries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn max_depth(&self) -> u32 {
        self.maxdepth
    }

    pub fn roots(&self) -> Arc<AuthServers> {
        self.roots.clone()
    }

    pub fn anchors(&self) -> &TrustAnchorSet {
        &self.anchors
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.queries.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }

    /// Entry point used by the handler: starts at the closest cached
    /// delegation and runs the full walk.
    pub async fn resolve_from_root(&self, transport: Transport, req: &DnsPacket) -> Result<DnsPacket> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let result = self
            .resolve(
                transport,
                req,
                self.roots.clone(),
                true,
                self.maxdepth,
                0,
                false,
                DsSet::new(".", self.root_ds.clone()),
            )
            .await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// One step of the iterative walk against one delegation's servers.
    ///
    /// `root` marks an entry call that should probe the delegation cache;
    /// `level` is the label count of the zone `servers` is authoritative
    /// for; `nsl` is set inside nameserver-address sub-lookups, where
    /// glue chasing must not recurse further.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve(
        &self,
        transport: Transport,
        req: &DnsPacket,
        servers: Arc<AuthServers>,
        root: bool,
        depth: u32,
        level: usize,
        nsl: bool,
        parent_ds: DsSet,
    ) -> Result<DnsPacket> {
        if depth == 0 {
            return Err(DnsError::MaxDepth);
        }

        let qname = req.qname().ok_or_else(|| {
            DnsError::Parse(crate::dns::ParseError::BitStream("empty question".to_string()))
        })?;
        let qtype = req.qtype().unwrap_or(RecordType::A);

        // DS must be asked at the parent, so a DS query skips the probe;
        // its caller already picked the parent's servers.
        let (servers, level, parent_ds) = if root && qtype != RecordType::DS {
            match self.delegations.closest(&qname) {
                Ok(entry) => {
                    let level = util::label_count(&entry.zone);
                    let ds = DsSet::new(&entry.zone, entry.ds.clone());
                    trace!(zone = %entry.zone, "starting from cached delegation");
                    (entry.servers, level, ds)
                }
                Err(_) => (servers, level, parent_ds),
            }
        } else {
            (servers, level, parent_ds)
        };

        // Checking-disabled queries bypass validation entirely.
        let parent_ds = if req.header.cd {
            DsSet::insecure(&parent_ds.zone)
        } else {
            parent_ds
        };

        let resp = self.lookup(req, &servers, transport).await?;

        if resp.header.tc {
            debug!(%qname, "truncated response, leaving retry to the caller");
            return Ok(resp);
        }

        if resp.rcode() == Rcode::NxDomain {
            return self.finish_nxdomain(resp, &qname, &parent_ds, depth, transport).await;
        }

        if !resp.answers.is_empty() {
            return self
                .finish_answer(resp, &qname, &parent_ds, depth, transport)
                .await;
        }

        if resp
            .authorities
            .iter()
            .any(|rr| rr.rtype == RecordType::NS)
        {
            return Box::pin(self.follow_referral(
                transport, req, resp, servers, depth, level, nsl, &parent_ds,
            ))
            .await;
        }

        // Nothing to say: an empty NOERROR response.
        let mut empty = DnsPacket::response_to(req);
        empty.header.rcode = Rcode::NoError.to_u8();
        Ok(empty)
    }

    /// Pick servers in RTT order and exchange until one answers sanely.
    async fn lookup(
        &self,
        req: &DnsPacket,
        servers: &AuthServers,
        transport: Transport,
    ) -> Result<DnsPacket> {
        let qname = req.qname().unwrap_or_default();
        let mut last_err = DnsError::Timeout(qname.clone());

        for server in servers.sorted() {
            let started = Instant::now();
            match self.exchanger.exchange(server.addr, req, transport).await {
                Ok(resp) => {
                    server.note_rtt(started.elapsed());
                    match resp.rcode() {
                        Rcode::NoError | Rcode::NxDomain => return Ok(resp),
                        rcode => {
                            trace!(server = %server.addr, ?rcode, "lame response, trying next server");
                            last_err = DnsError::Timeout(qname.clone());
                        }
                    }
                }
                Err(err) => {
                    trace!(server = %server.addr, %err, "exchange failed, trying next server");
                    server.note_failure();
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    /// NXDOMAIN: when the zone is signed, check the NSEC3 Name Error
    /// proof. A bad proof is logged but, matching the tolerant policy,
    /// does not fail the query; it only costs the AD bit.
    async fn finish_nxdomain(
        &self,
        mut resp: DnsPacket,
        qname: &str,
        parent_ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> Result<DnsPacket> {
        if parent_ds.is_signed() {
            match Nsec3Set::from_records(&resp.authorities) {
                Ok(set) => {
                    let mut authenticated = self
                        .verify_section_signatures(&resp, qname, parent_ds, depth, transport)
                        .await;
                    if let Err(err) = set.verify_name_error(qname) {
                        warn!(%qname, %err, "NSEC3 name error proof failed");
                        authenticated = false;
                    }
                    resp.header.ad = authenticated;
                }
                Err(err) => {
                    debug!(%qname, %err, "signed zone answered NXDOMAIN without usable NSEC3");
                }
            }
        }
        Ok(resp)
    }

    /// Authenticate the signatures over a negative response's authority
    /// section. Soft-fails on missing keys per the tolerant policy.
    async fn verify_section_signatures(
        &self,
        resp: &DnsPacket,
        qname: &str,
        parent_ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> bool {
        let signer = match first_authority_signer(resp) {
            Some(signer) => signer,
            None => return false,
        };

        let ds = if signer == parent_ds.zone {
            parent_ds.clone()
        } else {
            match Box::pin(self.lookup_ds(&signer, depth, transport)).await {
                Ok(records) => DsSet::new(&signer, records),
                Err(err) => {
                    debug!(%signer, %err, "DS lookup for negative proof failed");
                    return false;
                }
            }
        };
        if !ds.is_signed() {
            return false;
        }

        let keys = match Box::pin(self.fetch_keys(&signer, &ds, depth, transport)).await {
            Ok(keys) => keys,
            Err(err) => {
                debug!(%signer, %err, "DNSKEY fetch for negative proof failed");
                return false;
            }
        };

        // The denial records are what is signed here, not the qname.
        let owner = resp
            .authorities
            .iter()
            .find(|rr| rr.rtype == RecordType::SOA)
            .map(|rr| rr.name())
            .unwrap_or_else(|| signer.clone());
        match self.validator.verify_message(&owner, resp, &keys, &signer) {
            Ok(()) => true,
            Err(err) => {
                warn!(%qname, %err, "negative response signature verification failed");
                false
            }
        }
    }

    /// An answer is present: reconcile the signer with the DS chain,
    /// validate, then strip authority and additional sections.
    async fn finish_answer(
        &self,
        mut resp: DnsPacket,
        qname: &str,
        parent_ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> Result<DnsPacket> {
        let signer = resp
            .answers
            .iter()
            .filter(|rr| rr.rtype == RecordType::RRSIG && rr.name() == qname)
            .filter_map(|rr| Rrsig::parse(rr).ok())
            .map(|rrsig| rrsig.signer)
            .next();

        let mut authenticated = false;

        match signer {
            Some(signer) => {
                let ds = self
                    .reconcile_signer_ds(&signer, parent_ds, depth, transport)
                    .await?;
                if ds.is_signed() {
                    // A DNSKEY answer carries its own keys; fetching
                    // them separately would recurse into this query.
                    if resp.qtype() == Some(RecordType::DNSKEY) && signer == qname {
                        let keys = self
                            .validator
                            .verify_dnskeys(&signer, &resp.answers, &ds.records)?;
                        self.validator.verify_message(qname, &resp, &keys, &signer)?;
                        authenticated = true;
                    } else {
                        match Box::pin(self.fetch_keys(&signer, &ds, depth, transport)).await {
                            Ok(keys) => {
                                self.validator.verify_message(qname, &resp, &keys, &signer)?;
                                authenticated = true;
                            }
                            Err(DnsError::NoDnskey(zone)) => {
                                // Transient key-fetch failures leave the
                                // answer usable but unauthenticated.
                                warn!(%zone, "DNSKEY lookup empty, serving unvalidated answer");
                            }
                            Err(err) => return Err(err),
                        }
                    }
                }
            }
            None => {
                if parent_ds.is_signed() {
                    self.verify_insecure_island(qname, parent_ds, depth, transport)
                        .await?;
                }
            }
        }

        resp.header.ad = authenticated;
        resp.authorities.clear();
        resp.resources.clear();
        Ok(resp)
    }

    /// Map the RRSIG signer onto a DS set we can trust: the root anchors,
    /// the DS we already hold, or a fresh DS lookup for the signer.
    async fn reconcile_signer_ds(
        &self,
        signer: &str,
        parent_ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> Result<DsSet> {
        if signer == "." {
            return Ok(DsSet::new(".", self.root_ds.clone()));
        }
        if signer == parent_ds.zone {
            return Ok(parent_ds.clone());
        }
        let records = Box::pin(self.lookup_ds(signer, depth, transport)).await?;
        Ok(DsSet::new(signer, records))
    }

    /// No signer below a signed zone: walk down label by label looking
    /// for the delegation that went insecure. Finding DS all the way to
    /// the query name means signatures were stripped.
    async fn verify_insecure_island(
        &self,
        qname: &str,
        parent_ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> Result<()> {
        let labels = util::labels_from_name(qname);
        let anchor_count = util::label_count(&parent_ds.zone);

        for take in (anchor_count + 1)..=labels.len() {
            let candidate = labels[labels.len() - take..].join(".");
            let records = match Box::pin(self.lookup_ds(&candidate, depth, transport)).await {
                Ok(records) => records,
                // "No answer" from the parent is how an insecure
                // delegation looks from here.
                Err(DnsError::NoAnswer(_)) => Vec::new(),
                Err(err) => return Err(err),
            };
            if records.is_empty() {
                trace!(zone = %candidate, "insecure delegation found, unsigned answer accepted");
                return Ok(());
            }
        }

        Err(DnsError::Dnssec(DnssecError::MissingRrsig(
            qname.to_string(),
        )))
    }

    /// Referral: build the child zone's server pool from the NS RRset
    /// and glue, settle its DS status, cache the delegation, descend.
    #[allow(clippy::too_many_arguments)]
    async fn follow_referral(
        &self,
        transport: Transport,
        req: &DnsPacket,
        resp: DnsPacket,
        servers: Arc<AuthServers>,
        depth: u32,
        level: usize,
        nsl: bool,
        parent_ds: &DsSet,
    ) -> Result<DnsPacket> {
        let ns_records = resp.authorities_of(RecordType::NS);
        let child = ns_records[0].name();
        let child_level = util::label_count(&child);

        if child == "." && level > 0 {
            return Err(DnsError::RootServersDetection);
        }
        if child_level < level {
            return Err(DnsError::ParentDetection);
        }

        // A cached delegation for the child that names the same servers
        // we are already querying would recurse forever.
        if let Ok(cached) = self.delegations.get(&child) {
            if cached.servers.same_set(&servers) {
                return Err(DnsError::LoopDetection(child));
            }
            debug!(zone = %child, "descending into cached delegation");
            let ds = DsSet::new(&child, cached.ds.clone());
            return Box::pin(self.resolve(
                transport,
                req,
                cached.servers,
                false,
                depth - 1,
                child_level,
                nsl,
                ds,
            ))
            .await;
        }

        let ns_names: Vec<String> = ns_records
            .iter()
            .filter_map(|rr| rr.target_name())
            .collect();
        let ns_ttl = ns_records.iter().map(|rr| rr.ttl).min().unwrap_or(0);

        let mut addrs: Vec<SocketAddr> = Vec::new();
        for rr in &resp.resources {
            let owner = rr.name();
            if !ns_names.iter().any(|ns| *ns == owner) {
                continue;
            }
            if let Some(ip) = rr.as_a() {
                addrs.push(SocketAddr::new(ip.into(), 53));
            } else if let Some(ip) = rr.as_aaaa() {
                addrs.push(SocketAddr::new(ip.into(), 53));
            }
        }

        // Glueless delegation: resolve the nameserver names, unless this
        // walk is itself a nameserver-address lookup.
        if addrs.is_empty() && !nsl {
            for ns in &ns_names {
                match Box::pin(self.lookup_ns_addr(ns, depth, transport)).await {
                    Ok(found) => addrs.extend(found),
                    Err(err) => trace!(%ns, %err, "nameserver address lookup failed"),
                }
                if !addrs.is_empty() {
                    break;
                }
            }
        }
        if addrs.is_empty() {
            return Err(DnsError::NsAddrNotFound(child));
        }

        let child_ds = self
            .settle_child_ds(&resp, &child, parent_ds, depth, transport)
            .await?;

        let pool = AuthServers::new(addrs);
        self.delegations
            .set(&child, child_ds.records.clone(), ns_ttl, pool.clone());

        Box::pin(self.resolve(
            transport,
            req,
            pool,
            false,
            depth - 1,
            child_level,
            nsl,
            child_ds,
        ))
        .await
    }

    /// DS status of a referral's child zone: records in the authority
    /// section, an NSEC3 opt-out proof of an unsigned child, or a fresh
    /// DS lookup when the parent is signed but sent neither.
    async fn settle_child_ds(
        &self,
        resp: &DnsPacket,
        child: &str,
        parent_ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> Result<DsSet> {
        let ds_records: Vec<Ds> = resp
            .authorities
            .iter()
            .filter(|rr| rr.rtype == RecordType::DS && rr.name() == child)
            .filter_map(|rr| Ds::parse(rr).ok())
            .collect();

        if !ds_records.is_empty() {
            return Ok(DsSet::new(child, ds_records));
        }
        if !parent_ds.is_signed() {
            return Ok(DsSet::insecure(child));
        }

        if resp
            .authorities
            .iter()
            .any(|rr| rr.rtype == RecordType::NSEC3)
        {
            match Nsec3Set::from_records(&resp.authorities) {
                Ok(set) => {
                    if let Err(err) = set.verify_delegation(child) {
                        warn!(%child, %err, "NSEC3 delegation proof failed");
                    }
                }
                Err(err) => warn!(%child, %err, "unusable NSEC3 set in referral"),
            }
            return Ok(DsSet::insecure(child));
        }

        match Box::pin(self.lookup_ds(child, depth, transport)).await {
            Ok(records) => Ok(DsSet::new(child, records)),
            Err(err) => {
                debug!(%child, %err, "DS lookup during referral failed");
                Ok(DsSet::insecure(child))
            }
        }
    }

    /// Address lookup for a nameserver name, collapsed through the
    /// single-flight queue and backed by the answer cache. Falls back to
    /// the configured recursive forwarders when the walk fails.
    pub async fn lookup_ns_addr(
        &self,
        ns_name: &str,
        depth: u32,
        transport: Transport,
    ) -> Result<Vec<SocketAddr>> {
        if depth == 0 {
            return Err(DnsError::MaxDepth);
        }

        let mut query = DnsPacket::query(ns_name, RecordType::A);
        query.edns = Some(OptRecord::with_do(true));
        let key = CacheKey::from_question(&query.questions[0], true, false);

        self.flights.wait(key.hash_value(), self.query_timeout).await;
        if let Ok((cached, _)) = self.answers.get(&key) {
            return extract_addrs(&cached, ns_name);
        }

        self.flights.add(key.hash_value());
        let result = self.resolve_ns_query(&query, depth, transport).await;
        // Cache before signaling so released waiters find the answer.
        if let Ok(resp) = &result {
            if !resp.header.tc {
                let _ = self.answers.set(&key, resp.clone());
            }
        }
        self.flights.done(key.hash_value());

        extract_addrs(&result?, ns_name)
    }

    async fn resolve_ns_query(
        &self,
        query: &DnsPacket,
        depth: u32,
        transport: Transport,
    ) -> Result<DnsPacket> {
        let walk = Box::pin(self.resolve(
            transport,
            query,
            self.roots.clone(),
            true,
            depth - 1,
            0,
            true,
            DsSet::new(".", self.root_ds.clone()),
        ))
        .await;

        let walk = match walk {
            // A truncated answer gets one retry over TCP with fresh depth.
            Ok(resp) if resp.header.tc => {
                Box::pin(self.resolve(
                    Transport::Tcp,
                    query,
                    self.roots.clone(),
                    true,
                    self.maxdepth,
                    0,
                    true,
                    DsSet::new(".", self.root_ds.clone()),
                ))
                .await
            }
            other => other,
        };

        match walk {
            Ok(resp) if !resp.answers.is_empty() => Ok(resp),
            _ if !self.fallback.is_empty() => {
                debug!("nameserver walk failed, trying fallback servers");
                let mut fallback_query = query.clone();
                fallback_query.header.rd = true;
                let pool = AuthServers::new(self.fallback.clone());
                self.lookup(&fallback_query, &pool, transport).await
            }
            other => other,
        }
    }

    /// DS lookup at the parent zone, memoized through the error cache.
    /// A response with neither answer nor authority counts as "no
    /// answer", which callers treat as an insecure delegation.
    pub async fn lookup_ds(
        &self,
        zone: &str,
        depth: u32,
        transport: Transport,
    ) -> Result<Vec<Ds>> {
        if depth == 0 {
            return Err(DnsError::MaxDepth);
        }

        let mut query = DnsPacket::query(zone, RecordType::DS);
        query.edns = Some(OptRecord::with_do(true));
        let key = CacheKey::from_question(&query.questions[0], true, false);

        if self.errors.get(&key).is_ok() {
            return Err(DnsError::Timeout(zone.to_string()));
        }
        if let Ok((cached, _)) = self.answers.get(&key) {
            return Ok(parse_ds_answers(&cached, zone));
        }

        let parent = util::parent_name(zone).unwrap_or_else(|| ".".to_string());
        let (servers, level, ds) = self.delegation_for(&parent);

        let result = Box::pin(self.resolve(
            transport, &query, servers, true, depth - 1, level, false, ds,
        ))
        .await;

        let resp = match result {
            Ok(resp) if resp.header.tc => {
                let (servers, level, ds) = self.delegation_for(&parent);
                Box::pin(self.resolve(
                    Transport::Tcp,
                    &query,
                    servers,
                    true,
                    self.maxdepth,
                    level,
                    false,
                    ds,
                ))
                .await
            }
            other => other,
        }
        .inspect_err(|_| self.errors.set(&key))?;

        if resp.answers.is_empty() && resp.authorities.is_empty() {
            return Err(DnsError::NoAnswer(zone.to_string()));
        }

        let _ = self.answers.set(&key, resp.clone());
        Ok(parse_ds_answers(&resp, zone))
    }

    /// Fetch and authenticate the DNSKEY RRset of `zone` against `ds`.
    /// The verified RRset is cached like any other answer.
    pub async fn fetch_keys(
        &self,
        zone: &str,
        ds: &DsSet,
        depth: u32,
        transport: Transport,
    ) -> Result<HashMap<u16, Dnskey>> {
        if depth == 0 {
            return Err(DnsError::MaxDepth);
        }

        let mut query = DnsPacket::query(zone, RecordType::DNSKEY);
        query.edns = Some(OptRecord::with_do(true));
        let key = CacheKey::from_question(&query.questions[0], true, false);

        let resp = match self.answers.get(&key) {
            Ok((cached, _)) => cached,
            Err(_) => {
                let (servers, level, zone_ds) = self.delegation_for(zone);
                let resp = Box::pin(self.resolve(
                    transport, &query, servers, true, depth - 1, level, false, zone_ds,
                ))
                .await?;
                if resp.answers_of(RecordType::DNSKEY).is_empty() {
                    return Err(DnsError::NoDnskey(zone.to_string()));
                }
                resp
            }
        };

        let keys = self
            .validator
            .verify_dnskeys(zone, &resp.answers, &ds.records)?;
        // The RRset must also be self-signed by an authenticated key.
        self.validator.verify_message(zone, &resp, &keys, zone)?;

        let _ = self.answers.set(&key, resp);
        Ok(keys)
    }

    /// Closest cached delegation for `name`, or the root pool.
    fn delegation_for(&self, name: &str) -> (Arc<AuthServers>, usize, DsSet) {
        match self.delegations.closest(name) {
            Ok(entry) => {
                let level = util::label_count(&entry.zone);
                let ds = DsSet::new(&entry.zone, entry.ds.clone());
                (entry.servers, level, ds)
            }
            Err(_) => (
                self.roots.clone(),
                0,
                DsSet::new(".", self.root_ds.clone()),
            ),
        }
    }
}

/// Signer of the first RRSIG in the authority section.
fn first_authority_signer(resp: &DnsPacket) -> Option<String> {
    resp.authorities
        .iter()
        .filter(|rr| rr.rtype == RecordType::RRSIG)
        .filter_map(|rr| Rrsig::parse(rr).ok())
        .map(|rrsig| rrsig.signer)
        .next()
}

fn extract_addrs(resp: &DnsPacket, ns_name: &str) -> Result<Vec<SocketAddr>> {
    let owner = util::normalize(ns_name);
    let addrs: Vec<SocketAddr> = resp
        .answers
        .iter()
        .filter(|rr| rr.name() == owner)
        .filter_map(|rr| {
            rr.as_a()
                .map(std::net::IpAddr::from)
                .or_else(|| rr.as_aaaa().map(std::net::IpAddr::from))
        })
        .map(|ip| SocketAddr::new(ip, 53))
        .collect();

    if addrs.is_empty() {
        return Err(DnsError::NsAddrNotFound(ns_name.to_string()));
    }
    Ok(addrs)
}

fn parse_ds_answers(resp: &DnsPacket, zone: &str) -> Vec<Ds> {
    let zone = util::normalize(zone);
    resp.answers
        .iter()
        .filter(|rr| rr.rtype == RecordType::DS && rr.name() == zone)
        .filter_map(|rr| Ds::parse(rr).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsRecord;

    #[test]
    fn ds_set_signed_flag() {
        assert!(!DsSet::insecure("example.com").is_signed());
        let ds = Ds {
            key_tag: 1,
            algorithm: 13,
            digest_type: 2,
            digest: vec![0; 32],
        };
        assert!(DsSet::new("example.com", vec![ds]).is_signed());
    }

    #[test]
    fn extract_addrs_filters_by_owner() {
        let mut resp = DnsPacket::default();
        resp.answers.push(DnsRecord::new(
            "ns1.example.com",
            RecordType::A,
            300,
            vec![192, 0, 2, 1],
        ));
        resp.answers.push(DnsRecord::new(
            "other.example.com",
            RecordType::A,
            300,
            vec![192, 0, 2, 2],
        ));

        let addrs = extract_addrs(&resp, "NS1.example.com").unwrap();
        assert_eq!(addrs, vec![SocketAddr::from(([192, 0, 2, 1], 53))]);
        assert!(extract_addrs(&resp, "missing.example.com").is_err());
    }

    #[test]
    fn parse_ds_answers_ignores_foreign_owners() {
        let ds_rdata = {
            let mut out = vec![0x4E, 0x2A, 13, 2];
            out.extend_from_slice(&[0x55; 32]);
            out
        };
        let mut resp = DnsPacket::default();
        resp.answers.push(DnsRecord::new(
            "example.com",
            RecordType::DS,
            3600,
            ds_rdata.clone(),
        ));
        resp.answers.push(DnsRecord::new(
            "other.org",
            RecordType::DS,
            3600,
            ds_rdata,
        ));

        let parsed = parse_ds_answers(&resp, "example.com");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].key_tag, 0x4E2A);
    }
}
