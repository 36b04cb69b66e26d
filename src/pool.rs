use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::constants::{POOL_RESORT_INTERVAL, PUNITIVE_RTT_NS};

/// One authoritative server with its accumulated round-trip history.
#[derive(Debug)]
pub struct AuthServer {
    pub addr: SocketAddr,
    /// Accumulated RTT in nanoseconds across `count` samples.
    rtt: AtomicU64,
    count: AtomicU64,
}

impl AuthServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            // Seed with a neutral sample so fresh servers sort between
            // proven-fast and punished ones.
            rtt: AtomicU64::new(Duration::from_secs(1).as_nanos() as u64),
            count: AtomicU64::new(1),
        }
    }

    pub fn mean_rtt(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed).max(1);
        self.rtt.load(Ordering::Relaxed) / count
    }

    pub fn note_rtt(&self, rtt: Duration) {
        self.rtt.fetch_add(rtt.as_nanos() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Charge a failed exchange so the pool deprioritizes this server.
    pub fn note_failure(&self) {
        self.rtt.store(PUNITIVE_RTT_NS, Ordering::Relaxed);
        self.count.store(1, Ordering::Relaxed);
    }

    /// Collapse history into a single averaged sample.
    fn decay(&self) {
        let mean = self.mean_rtt();
        self.rtt.store(mean, Ordering::Relaxed);
        self.count.store(1, Ordering::Relaxed);
    }
}

/// The authoritative servers of one delegation, ordered by measured RTT.
/// Shared by pointer between the delegation cache and in-flight queries,
/// so RTT updates recorded anywhere persist for every caller.
#[derive(Debug)]
pub struct AuthServers {
    list: RwLock<Vec<Arc<AuthServer>>>,
    calls: AtomicU64,
}

impl AuthServers {
    pub fn new(addrs: Vec<SocketAddr>) -> Arc<Self> {
        let mut seen = Vec::new();
        let list = addrs
            .into_iter()
            .filter(|addr| {
                if seen.contains(addr) {
                    false
                } else {
                    seen.push(*addr);
                    true
                }
            })
            .map(|addr| Arc::new(AuthServer::new(addr)))
            .collect();
        Arc::new(Self {
            list: RwLock::new(list),
            calls: AtomicU64::new(0),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.list.read().iter().map(|s| s.addr).collect()
    }

    /// Replace the server list wholesale; used by the priming loop.
    pub fn replace(&self, addrs: Vec<SocketAddr>) {
        let fresh: Vec<_> = addrs
            .into_iter()
            .map(|addr| Arc::new(AuthServer::new(addr)))
            .collect();
        if fresh.is_empty() {
            return;
        }
        *self.list.write() = fresh;
    }

    /// Servers in ascending mean-RTT order. Every ~20 calls the history is
    /// averaged down to one sample and the shared list re-sorted, so stale
    /// measurements decay instead of pinning the order forever.
    pub fn sorted(&self) -> Vec<Arc<AuthServer>> {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % POOL_RESORT_INTERVAL == 0 {
            let mut list = self.list.write();
            for server in list.iter() {
                server.decay();
            }
            list.sort_by_key(|s| s.mean_rtt());
            return list.clone();
        }

        let mut list = self.list.read().clone();
        list.sort_by_key(|s| s.mean_rtt());
        list
    }

    /// Order-insensitive comparison, used for delegation loop detection.
    pub fn same_set(&self, other: &AuthServers) -> bool {
        let mut ours = self.addrs();
        let mut theirs = other.addrs();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}
