pub mod cache;
pub mod config;
pub mod constants;
pub mod dns;
pub mod dnssec;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod pool;
pub mod resolver;
pub mod server;
pub mod singleflight;
pub mod transport;

pub use dns::DnsPacket;
pub use error::{DnsError, Result};
