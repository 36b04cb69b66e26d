use std::sync::atomic::Ordering;

use ratatoskr::cache::{AnswerCache, CacheError, CacheKey, Clock};
use ratatoskr::dns::enums::{RecordClass, RecordType};
use ratatoskr::dns::{DnsPacket, DnsRecord};

fn cached_response(name: &str, ttl: u32) -> DnsPacket {
    let mut resp = DnsPacket::query(name, RecordType::A);
    resp.header.qr = true;
    resp.answers
        .push(DnsRecord::new(name, RecordType::A, ttl, vec![192, 0, 2, 1]));
    resp
}

fn key_for(name: &str) -> CacheKey {
    CacheKey::new(name, RecordType::A, RecordClass::IN, false, false)
}

/// Cache-hit TTL decay: TTL 10 at t0 serves 5 at t0+5 and is gone at
/// t0+11.
#[test]
fn ttl_decay_scenario() {
    let (clock, time) = Clock::manual(1_000_000);
    let cache = AnswerCache::with_clock(1024, 0, clock);
    let key = key_for("ttl.example.com");

    cache.set(&key, cached_response("ttl.example.com", 10)).unwrap();

    time.store(1_000_005, Ordering::Relaxed);
    let (resp, _) = cache.get(&key).unwrap();
    assert_eq!(resp.answers[0].ttl, 5);

    time.store(1_000_011, Ordering::Relaxed);
    assert!(matches!(cache.get(&key), Err(CacheError::Expired)));
    assert!(!cache.exists(&key));
}

/// TTL monotonicity: a later read never reports a larger TTL.
#[test]
fn ttl_never_grows() {
    let (clock, time) = Clock::manual(0);
    let cache = AnswerCache::with_clock(1024, 0, clock);
    let key = key_for("mono.example.com");
    cache.set(&key, cached_response("mono.example.com", 300)).unwrap();

    let mut last = u32::MAX;
    for now in [3u64, 10, 10, 47, 200] {
        time.store(now, Ordering::Relaxed);
        let (resp, _) = cache.get(&key).unwrap();
        let ttl = resp.answers[0].ttl;
        assert!(ttl <= last, "ttl grew from {} to {}", last, ttl);
        last = ttl;
    }
}

/// Sub-second polling must not extend freshness: the clock is truncated
/// to whole seconds, so repeated reads within one second subtract zero
/// but never add anything back.
#[test]
fn repeated_same_second_reads_are_stable() {
    let (clock, time) = Clock::manual(500);
    let cache = AnswerCache::with_clock(1024, 0, clock);
    let key = key_for("same.example.com");
    cache.set(&key, cached_response("same.example.com", 60)).unwrap();

    time.store(503, Ordering::Relaxed);
    for _ in 0..5 {
        let (resp, _) = cache.get(&key).unwrap();
        assert_eq!(resp.answers[0].ttl, 57);
    }
}

/// Case-insensitivity invariant across insert and lookup.
#[test]
fn mixed_case_lookups_are_equivalent() {
    let cache = AnswerCache::new(1024, 0);
    cache
        .set(
            &key_for("CaSe.ExAmPlE.cOm"),
            cached_response("case.example.com", 60),
        )
        .unwrap();

    for variant in ["case.example.com", "CASE.EXAMPLE.COM", "case.EXAMPLE.com"] {
        assert!(cache.get(&key_for(variant)).is_ok(), "miss for {}", variant);
    }

    // Flag variants are distinct entries, not aliases.
    let do_key = CacheKey::new(
        "case.example.com",
        RecordType::A,
        RecordClass::IN,
        true,
        false,
    );
    assert!(cache.get(&do_key).is_err());
}
