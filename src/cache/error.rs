use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{CacheError, CacheKey, Clock};

/// Negative memo of recently failed lookups. A hit short-circuits the
/// resolver into SERVFAIL so dead zones don't trigger retry storms.
pub struct ErrorCache {
    entries: RwLock<HashMap<u64, u64>>,
    expire: u32,
    clock: Clock,
}

impl ErrorCache {
    pub fn new(expire: u32) -> Self {
        Self::with_clock(expire, Clock::System)
    }

    pub fn with_clock(expire: u32, clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expire,
            clock,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let stamp = *entries.get(&key.hash_value()).ok_or(CacheError::NotFound)?;
        if now.saturating_sub(stamp) > self.expire as u64 {
            entries.remove(&key.hash_value());
            return Err(CacheError::Expired);
        }
        Ok(())
    }

    pub fn set(&self, key: &CacheKey) {
        self.entries
            .write()
            .insert(key.hash_value(), self.clock.now());
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.write().remove(&key.hash_value());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let expire = self.expire as u64;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, stamp| now.saturating_sub(*stamp) <= expire);
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, remaining = entries.len(), "error cache sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::{RecordClass, RecordType};
    use std::sync::atomic::Ordering;

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name, RecordType::A, RecordClass::IN, true, false)
    }

    #[test]
    fn memo_expires_after_global_ttl() {
        let (clock, time) = Clock::manual(0);
        let cache = ErrorCache::with_clock(600, clock);
        let key = key("broken.example");

        assert_eq!(cache.get(&key), Err(CacheError::NotFound));
        cache.set(&key);
        assert_eq!(cache.get(&key), Ok(()));

        time.store(601, Ordering::Relaxed);
        assert_eq!(cache.get(&key), Err(CacheError::Expired));
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_retains_fresh_entries() {
        let (clock, time) = Clock::manual(0);
        let cache = ErrorCache::with_clock(600, clock);
        cache.set(&key("old.example"));

        time.store(500, Ordering::Relaxed);
        cache.set(&key("new.example"));

        time.store(700, Ordering::Relaxed);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("new.example")), Ok(()));
    }
}
