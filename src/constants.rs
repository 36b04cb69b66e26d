/// EDNS0 UDP payload size advertised on upstream queries.
pub const DEFAULT_MSG_SIZE: u16 = 1536;

/// Classic DNS message size limit when no OPT record is present.
pub const MIN_MSG_SIZE: usize = 512;

pub const EDNS_VERSION: u8 = 0;

/// Maximum CNAME indirections the handler will chase.
pub const CNAME_HOP_LIMIT: usize = 5;

/// RTT charged to a server whose exchange failed, so the pool
/// deprioritizes it until a later success averages it back down.
pub const PUNITIVE_RTT_NS: u64 = 3_600_000_000_000;

/// Pool calls between RTT history collapses.
pub const POOL_RESORT_INTERVAL: u64 = 20;

/// Interval of the cache sweeper and the root priming task.
pub const HOURLY: std::time::Duration = std::time::Duration::from_secs(3600);
