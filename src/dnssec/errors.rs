use thiserror::Error;

pub type Result<T> = std::result::Result<T, DnssecError>;

/// Failures of the DNSSEC chain of trust. Hard failures surface to the
/// client as SERVFAIL; the resolver decides which ones are tolerable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnssecError {
    #[error("no DNSKEY matches a DS record at {0}")]
    MissingKsk(String),

    #[error("DS digest does not match DNSKEY {key_tag} at {zone}")]
    MismatchingDs { zone: String, key_tag: u16 },

    #[error("no DNSKEY with key tag {0} for signer {1}")]
    MissingDnskey(u16, String),

    #[error("RRSIG covers {0} but no such RRset is present")]
    MissingSigned(String),

    #[error("no RRSIG over {0}")]
    MissingRrsig(String),

    #[error("signature verification failed for {0}")]
    SignatureFailed(String),

    #[error("signature outside its validity period ({inception}..{expiration})")]
    InvalidSignaturePeriod { inception: u32, expiration: u32 },

    #[error("unsupported DNSSEC algorithm {0}")]
    UnsupportedAlgorithm(u8),

    #[error("unsupported DS digest type {0}")]
    UnsupportedDigest(u8),

    #[error("malformed DNSKEY public key")]
    InvalidPublicKey,

    #[error("NSEC3 denial proof failed: {0}")]
    DenialProofFailed(&'static str),

    #[error("invalid NSEC3 parameters")]
    InvalidNsec3Parameters,

    #[error("malformed trust anchor: {0}")]
    InvalidTrustAnchor(String),
}
