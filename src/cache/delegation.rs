use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{CacheError, Clock};
use crate::dns::rdata::Ds;
use crate::dns::util;
use crate::pool::AuthServers;

/// A cached delegation: the authoritative servers of a zone plus the DS
/// RRset its parent handed down. An empty DS set is meaningful; it marks
/// a verified insecure (unsigned) zone.
#[derive(Clone)]
pub struct DelegationEntry {
    pub zone: String,
    pub servers: Arc<AuthServers>,
    pub ds: Vec<Ds>,
    ttl: u32,
    updated: u64,
}

/// Zone name to delegation map with the same decrement-on-read TTL
/// semantics as the answer cache. Server pools are shared by pointer so
/// RTT accounting survives across queries. The root entry never expires.
pub struct DelegationCache {
    entries: RwLock<HashMap<String, DelegationEntry>>,
    clock: Clock,
}

impl DelegationCache {
    pub fn new() -> Self {
        Self::with_clock(Clock::System)
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn get(&self, zone: &str) -> Result<DelegationEntry, CacheError> {
        let zone = util::normalize(zone);
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let entry = entries.get_mut(&zone).ok_or(CacheError::NotFound)?;

        if zone != "." {
            let elapsed = now.saturating_sub(entry.updated) as u32;
            if entry.ttl < elapsed {
                entries.remove(&zone);
                return Err(CacheError::Expired);
            }
            entry.ttl -= elapsed;
            entry.updated = now;
        }

        Ok(entries.get(&zone).expect("checked above").clone())
    }

    pub fn set(&self, zone: &str, ds: Vec<Ds>, ttl: u32, servers: Arc<AuthServers>) {
        let zone = util::normalize(zone);
        debug!(%zone, servers = servers.len(), ds = ds.len(), ttl, "caching delegation");
        self.entries.write().insert(
            zone.clone(),
            DelegationEntry {
                zone,
                servers,
                ds,
                ttl,
                updated: self.clock.now(),
            },
        );
    }

    pub fn remove(&self, zone: &str) {
        self.entries.write().remove(&util::normalize(zone));
    }

    pub fn exists(&self, zone: &str) -> bool {
        self.entries.read().contains_key(&util::normalize(zone))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Walk from `name` toward the root and return the closest enclosing
    /// cached delegation. The root entry guarantees a hit once primed.
    pub fn closest(&self, name: &str) -> Result<DelegationEntry, CacheError> {
        let mut candidate = util::normalize(name);
        loop {
            match self.get(&candidate) {
                Ok(entry) => return Ok(entry),
                Err(_) => match util::parent_name(&candidate) {
                    Some(parent) => candidate = parent,
                    None => return Err(CacheError::NotFound),
                },
            }
        }
    }

    /// Hourly sweep; the root entry is exempt.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|zone, entry| {
            zone == "." || entry.ttl as u64 >= now.saturating_sub(entry.updated)
        });
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, remaining = entries.len(), "delegation cache sweep");
        }
    }
}

impl Default for DelegationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::Ordering;

    fn servers(last: u8) -> Arc<AuthServers> {
        AuthServers::new(vec![SocketAddr::from(([192, 0, 2, last], 53))])
    }

    #[test]
    fn closest_walks_up_to_the_root() {
        let cache = DelegationCache::new();
        cache.set(".", Vec::new(), 0, servers(1));
        cache.set("com", Vec::new(), 172800, servers(2));

        let entry = cache.closest("www.example.com").unwrap();
        assert_eq!(entry.zone, "com");
        let entry = cache.closest("example.net").unwrap();
        assert_eq!(entry.zone, ".");
    }

    #[test]
    fn ttl_expiry_removes_entry() {
        let (clock, time) = Clock::manual(0);
        let cache = DelegationCache::with_clock(clock);
        cache.set("example.com", Vec::new(), 30, servers(1));

        time.store(31, Ordering::Relaxed);
        assert!(matches!(
            cache.get("example.com"),
            Err(CacheError::Expired)
        ));
        assert!(!cache.exists("example.com"));
    }

    #[test]
    fn root_never_expires() {
        let (clock, time) = Clock::manual(0);
        let cache = DelegationCache::with_clock(clock);
        cache.set(".", Vec::new(), 0, servers(1));

        time.store(1_000_000, Ordering::Relaxed);
        assert!(cache.get(".").is_ok());
        cache.purge_expired();
        assert!(cache.exists("."));
    }

    #[test]
    fn pool_is_shared_by_pointer() {
        let cache = DelegationCache::new();
        let pool = servers(1);
        cache.set("example.com", Vec::new(), 300, pool.clone());

        let entry = cache.get("example.com").unwrap();
        entry.servers.sorted()[0].note_failure();

        // A second caller observes the recorded failure.
        let again = cache.get("example.com").unwrap();
        assert_eq!(
            again.servers.sorted()[0].mean_rtt(),
            crate::constants::PUNITIVE_RTT_NS
        );
    }

    #[test]
    fn case_insensitive_zones() {
        let cache = DelegationCache::new();
        cache.set("Example.COM", Vec::new(), 300, servers(1));
        assert!(cache.exists("example.com"));
        assert!(cache.get("EXAMPLE.com").is_ok());
    }
}
