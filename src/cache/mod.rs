pub mod answer;
pub mod delegation;
pub mod error;

pub use answer::AnswerCache;
pub use delegation::{DelegationCache, DelegationEntry};
pub use error::ErrorCache;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::dns::question::DnsQuestion;
use crate::dns::{RecordClass, RecordType, util};

/// Cache control-flow outcomes. These never surface to clients; the
/// handler and resolver translate them into fresh lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("not in cache")]
    NotFound,
    #[error("entry expired")]
    Expired,
    #[error("cache full")]
    CapacityFull,
}

/// Question fingerprint: a stable hash over the lowercased name, type,
/// class, and the DO/CD flags. Two questions with the same fingerprint
/// are cache-equivalent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,
    pub dnssec_ok: bool,
    pub checking_disabled: bool,
    hash: u64,
}

impl CacheKey {
    pub fn new(
        name: &str,
        qtype: RecordType,
        qclass: RecordClass,
        dnssec_ok: bool,
        checking_disabled: bool,
    ) -> Self {
        let name = util::normalize(name);
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        u16::from(qtype).hash(&mut hasher);
        u16::from(qclass).hash(&mut hasher);
        dnssec_ok.hash(&mut hasher);
        checking_disabled.hash(&mut hasher);
        let hash = hasher.finish();

        Self {
            name,
            qtype,
            qclass,
            dnssec_ok,
            checking_disabled,
            hash,
        }
    }

    pub fn from_question(question: &DnsQuestion, dnssec_ok: bool, checking_disabled: bool) -> Self {
        Self::new(
            &question.name(),
            question.qtype,
            question.qclass,
            dnssec_ok,
            checking_disabled,
        )
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Wall clock truncated to whole seconds, injectable for tests so TTL
/// decay is deterministic. Truncation matters: sub-second polling must
/// not silently extend apparent freshness.
#[derive(Clone, Debug)]
pub enum Clock {
    System,
    Manual(Arc<AtomicU64>),
}

impl Clock {
    pub fn now(&self) -> u64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            Clock::Manual(secs) => secs.load(Ordering::Relaxed),
        }
    }

    /// A manual clock plus the handle that advances it.
    pub fn manual(start: u64) -> (Self, Arc<AtomicU64>) {
        let secs = Arc::new(AtomicU64::new(start));
        (Clock::Manual(secs.clone()), secs)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::System
    }
}
