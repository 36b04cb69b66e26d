//! Root priming: the root NS set and its glue are refreshed hourly from
//! the roots themselves, so the compiled-in hints only matter at boot.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::Resolver;
use crate::constants::HOURLY;
use crate::dns::{DnsPacket, OptRecord, RecordType};
use crate::error::Result;
use crate::exchange::Transport;

impl Resolver {
    /// One priming round: ask the current root pool for `NS .` and
    /// replace the pool with the glue from the additional section.
    pub async fn prime_roots(&self) -> Result<usize> {
        let mut query = DnsPacket::query(".", RecordType::NS);
        query.edns = Some(OptRecord::with_do(true));

        let roots = self.roots();
        let resp = self.lookup(&query, &roots, Transport::Udp).await?;

        let ns_names: Vec<String> = resp
            .answers_of(RecordType::NS)
            .iter()
            .filter(|rr| rr.name() == ".")
            .filter_map(|rr| rr.target_name())
            .collect();

        let addrs: Vec<SocketAddr> = resp
            .resources
            .iter()
            .filter(|rr| ns_names.iter().any(|ns| *ns == rr.name()))
            .filter_map(|rr| {
                rr.as_a()
                    .map(std::net::IpAddr::from)
                    .or_else(|| rr.as_aaaa().map(std::net::IpAddr::from))
            })
            .map(|ip| SocketAddr::new(ip, 53))
            .collect();

        if !addrs.is_empty() {
            debug!(servers = addrs.len(), "root server set refreshed");
            roots.replace(addrs);
        }
        Ok(roots.len())
    }

    /// Bootstrap self-check: fetch the root DNSKEY RRset and verify it
    /// carries every configured trust anchor. A failure here means the
    /// anchors are wrong or the network is lying; boot must not proceed.
    pub async fn verify_root_anchors(&self) -> Result<()> {
        let mut query = DnsPacket::query(".", RecordType::DNSKEY);
        query.edns = Some(OptRecord::with_do(true));

        let roots = self.roots();
        let mut resp = self.lookup(&query, &roots, Transport::Udp).await?;
        if resp.header.tc {
            resp = self.lookup(&query, &roots, Transport::Tcp).await?;
        }

        let keys: Vec<_> = resp
            .answers_of(RecordType::DNSKEY)
            .iter()
            .filter(|rr| rr.name() == ".")
            .filter_map(|rr| crate::dns::rdata::Dnskey::parse(rr).ok())
            .collect();

        self.anchors().verify_root_keys(&keys)?;
        info!(keys = keys.len(), "root DNSKEY set verified against trust anchors");
        Ok(())
    }
}

/// Hourly priming task. Failures keep the existing set and are retried
/// on the next tick.
pub fn spawn_priming(resolver: Arc<Resolver>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOURLY);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            match resolver.prime_roots().await {
                Ok(count) => debug!(servers = count, "root priming complete"),
                Err(err) => warn!(%err, "root priming failed, keeping current set"),
            }
            ticker.tick().await;
        }
    })
}

/// Hourly cache sweeper for all three caches.
pub fn spawn_sweeper(resolver: Arc<Resolver>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOURLY);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            resolver.answers.purge_expired();
            resolver.delegations.purge_expired();
            resolver.errors.purge_expired();
        }
    })
}
