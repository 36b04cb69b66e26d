use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

/// One in-flight upstream resolution. Waiters park on the notify handle;
/// the last `done` call flips the flag and wakes everyone.
struct Flight {
    notify: Notify,
    finished: AtomicBool,
    dups: AtomicU32,
}

/// Collapses concurrent identical queries: the first caller for a
/// fingerprint resolves upstream while late arrivals wait for its signal
/// and then re-probe the (now populated) answer cache.
#[derive(Default)]
pub struct SingleFlight {
    flights: Mutex<HashMap<u64, Arc<Flight>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`, creating the flight when absent.
    /// Returns the number of callers currently sharing it.
    pub fn add(&self, key: u64) -> u32 {
        let mut flights = self.flights.lock();
        if let Some(flight) = flights.get(&key) {
            return flight.dups.fetch_add(1, Ordering::AcqRel) + 1;
        }
        flights.insert(
            key,
            Arc::new(Flight {
                notify: Notify::new(),
                finished: AtomicBool::new(false),
                dups: AtomicU32::new(1),
            }),
        );
        1
    }

    /// Callers currently sharing `key`, without blocking.
    pub fn get(&self, key: u64) -> u32 {
        self.flights
            .lock()
            .get(&key)
            .map(|flight| flight.dups.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Block until the flight for `key` completes or `timeout` elapses.
    /// Returns immediately when nothing is in flight. A timed-out waiter
    /// falls through to its own lookup, which usually hits the cache the
    /// leader populated.
    pub async fn wait(&self, key: u64, timeout: Duration) {
        let flight = match self.flights.lock().get(&key) {
            Some(flight) => flight.clone(),
            None => return,
        };

        let notified = flight.notify.notified();
        if flight.finished.load(Ordering::Acquire) {
            return;
        }
        if tokio::time::timeout(timeout, notified).await.is_err() {
            trace!(key, "single-flight wait timed out");
        }
    }

    /// Drop one caller's interest. The final caller signals all waiters
    /// and removes the flight.
    pub fn done(&self, key: u64) {
        let mut flights = self.flights.lock();
        let Some(flight) = flights.get(&key) else {
            return;
        };
        if flight.dups.fetch_sub(1, Ordering::AcqRel) == 1 {
            let flight = flights.remove(&key).expect("present under lock");
            flight.finished.store(true, Ordering::Release);
            flight.notify.notify_waiters();
        }
    }

    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_done_track_dups() {
        let flights = SingleFlight::new();
        assert_eq!(flights.add(7), 1);
        assert_eq!(flights.add(7), 2);
        assert_eq!(flights.get(7), 2);

        flights.done(7);
        assert_eq!(flights.get(7), 1);
        flights.done(7);
        assert_eq!(flights.get(7), 0);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let flights = SingleFlight::new();
        flights.wait(42, Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn waiters_are_released_on_done() {
        let flights = Arc::new(SingleFlight::new());
        flights.add(1);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            tasks.push(tokio::spawn(async move {
                flights.wait(1, Duration::from_secs(5)).await;
            }));
        }

        // Give the waiters a moment to park before signaling.
        tokio::time::sleep(Duration::from_millis(20)).await;
        flights.done(1);

        for task in tasks {
            tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("waiter released")
                .unwrap();
        }
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn wait_times_out_when_leader_stalls() {
        let flights = SingleFlight::new();
        flights.add(9);
        let started = std::time::Instant::now();
        flights.wait(9, Duration::from_millis(50)).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        flights.done(9);
    }
}
