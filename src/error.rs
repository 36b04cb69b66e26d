use std::sync::Arc;
use thiserror::Error;

use crate::dns::ParseError;
use crate::dnssec::DnssecError;

pub type Result<T> = std::result::Result<T, DnsError>;

/// Unified error type for the resolver.
///
/// Cloneable so a single result can be fanned out to every waiter of a
/// collapsed in-flight query; io::Error is kept behind an Arc for that.
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("all nameservers for {0} timed out")]
    Timeout(String),

    #[error("recursion depth exhausted")]
    MaxDepth,

    #[error("referral points above the current zone")]
    ParentDetection,

    #[error("referral points back at the root zone")]
    RootServersDetection,

    #[error("delegation loop detected for {0}")]
    LoopDetection(String),

    #[error("no address found for nameserver {0}")]
    NsAddrNotFound(String),

    #[error("DNSKEY lookup for {0} returned no keys")]
    NoDnskey(String),

    #[error("neither answer nor authority in response for {0}")]
    NoAnswer(String),

    #[error("dnssec validation failed: {0}")]
    Dnssec(#[from] DnssecError),
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(Arc::new(err))
    }
}

impl DnsError {
    /// Errors worth memoizing in the error cache to dampen retry storms.
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self,
            DnsError::MaxDepth | DnsError::Timeout(_) | DnsError::Dnssec(_)
        )
    }
}
