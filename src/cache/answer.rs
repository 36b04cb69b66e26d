use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use governor::{Quota, RateLimiter};
use parking_lot::RwLock;
use tracing::debug;

use super::{CacheError, CacheKey, Clock};
use crate::dns::DnsPacket;

pub type EntryLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct AnswerEntry {
    response: DnsPacket,
    limiter: Option<Arc<EntryLimiter>>,
    updated: u64,
}

/// Response cache keyed by question fingerprint. Entries keep the TTLs
/// they were inserted with; reads subtract the elapsed whole seconds and
/// drop the entry as soon as any answer or authority TTL would underflow.
pub struct AnswerCache {
    entries: RwLock<HashMap<u64, AnswerEntry>>,
    max_entries: usize,
    qps: u32,
    clock: Clock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnswerCache {
    pub fn new(max_entries: usize, qps: u32) -> Self {
        Self::with_clock(max_entries, qps, Clock::System)
    }

    pub fn with_clock(max_entries: usize, qps: u32, clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            qps,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch the cached response with decremented TTLs plus the entry's
    /// rate limiter. Mutates the entry's last-update stamp, so a steady
    /// stream of hits keeps subtracting only newly elapsed seconds.
    pub fn get(
        &self,
        key: &CacheKey,
    ) -> Result<(DnsPacket, Option<Arc<EntryLimiter>>), CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let entry = match entries.get_mut(&key.hash_value()) {
            Some(entry) => entry,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Err(CacheError::NotFound);
            }
        };

        let elapsed = now.saturating_sub(entry.updated) as u32;
        entry.updated = now;

        let expired = entry
            .response
            .answers
            .iter()
            .chain(entry.response.authorities.iter())
            .any(|rr| rr.ttl < elapsed);
        if expired {
            entries.remove(&key.hash_value());
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::Expired);
        }

        let entry = entries.get_mut(&key.hash_value()).expect("checked above");
        for rr in entry
            .response
            .answers
            .iter_mut()
            .chain(entry.response.authorities.iter_mut())
        {
            rr.ttl -= elapsed;
        }
        for rr in entry.response.resources.iter_mut() {
            rr.ttl = rr.ttl.saturating_sub(elapsed);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok((entry.response.clone(), entry.limiter.clone()))
    }

    /// Insert a response. Refuses new keys when the cache is at capacity;
    /// the resolver treats that as "don't cache", not as a failure.
    pub fn set(&self, key: &CacheKey, response: DnsPacket) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key.hash_value()) {
            return Err(CacheError::CapacityFull);
        }

        let limiter = NonZeroU32::new(self.qps)
            .map(|qps| Arc::new(RateLimiter::direct(Quota::per_second(qps))));

        entries.insert(
            key.hash_value(),
            AnswerEntry {
                response,
                limiter,
                updated: self.clock.now(),
            },
        );
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.write().remove(&key.hash_value());
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(&key.hash_value())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn full(&self) -> bool {
        self.len() >= self.max_entries
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Hourly sweep: drop entries whose age exceeds their shortest
    /// answer/authority TTL.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            let elapsed = now.saturating_sub(entry.updated) as u32;
            entry
                .response
                .answers
                .iter()
                .chain(entry.response.authorities.iter())
                .all(|rr| rr.ttl >= elapsed)
        });
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, remaining = entries.len(), "answer cache sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::{RecordClass, RecordType};
    use crate::dns::{DnsPacket, DnsRecord};

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name, RecordType::A, RecordClass::IN, false, false)
    }

    fn response(name: &str, ttl: u32) -> DnsPacket {
        let mut packet = DnsPacket::query(name, RecordType::A);
        packet.header.qr = true;
        packet
            .answers
            .push(DnsRecord::new(name, RecordType::A, ttl, vec![192, 0, 2, 7]));
        packet
    }

    #[test]
    fn ttl_decays_and_expires() {
        let (clock, time) = Clock::manual(1_000);
        let cache = AnswerCache::with_clock(16, 0, clock);
        let key = key("example.com");
        cache.set(&key, response("example.com", 10)).unwrap();

        time.store(1_005, Ordering::Relaxed);
        let (resp, _) = cache.get(&key).unwrap();
        assert_eq!(resp.answers[0].ttl, 5);

        time.store(1_011, Ordering::Relaxed);
        assert!(matches!(cache.get(&key), Err(CacheError::Expired)));
        assert!(!cache.exists(&key));
    }

    #[test]
    fn repeated_reads_only_subtract_new_elapsed_time() {
        let (clock, time) = Clock::manual(0);
        let cache = AnswerCache::with_clock(16, 0, clock);
        let key = key("example.com");
        cache.set(&key, response("example.com", 10)).unwrap();

        time.store(4, Ordering::Relaxed);
        let (resp, _) = cache.get(&key).unwrap();
        assert_eq!(resp.answers[0].ttl, 6);

        time.store(8, Ordering::Relaxed);
        let (resp, _) = cache.get(&key).unwrap();
        assert_eq!(resp.answers[0].ttl, 2);
    }

    #[test]
    fn capacity_bound_rejects_new_keys() {
        let cache = AnswerCache::new(1, 0);
        cache.set(&key("a.example"), response("a.example", 60)).unwrap();
        assert_eq!(
            cache.set(&key("b.example"), response("b.example", 60)),
            Err(CacheError::CapacityFull)
        );
        // Existing keys may still be refreshed.
        cache.set(&key("a.example"), response("a.example", 30)).unwrap();
        assert!(cache.full());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let cache = AnswerCache::new(16, 0);
        cache
            .set(&key("Example.COM"), response("example.com", 60))
            .unwrap();
        assert!(cache.get(&key("example.com")).is_ok());
    }

    #[test]
    fn rate_limiter_attached_when_configured() {
        let cache = AnswerCache::new(16, 2);
        let key = key("example.com");
        cache.set(&key, response("example.com", 60)).unwrap();
        let (_, limiter) = cache.get(&key).unwrap();
        let limiter = limiter.expect("limiter configured");
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let (clock, time) = Clock::manual(0);
        let cache = AnswerCache::with_clock(16, 0, clock);
        cache.set(&key("a.example"), response("a.example", 5)).unwrap();
        cache.set(&key("b.example"), response("b.example", 500)).unwrap();

        time.store(60, Ordering::Relaxed);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert!(cache.exists(&key("b.example")));
    }
}
