pub mod algorithm;
pub mod denial;
pub mod digest;
pub mod errors;
pub mod key_tag;
pub mod trust_anchor;
pub mod validator;

pub use algorithm::SigningAlgorithm;
pub use denial::Nsec3Set;
pub use digest::DigestType;
pub use errors::DnssecError;
pub use key_tag::calculate_key_tag;
pub use trust_anchor::{TrustAnchor, TrustAnchorSet};
pub use validator::Validator;

/// Maximum NSEC3 iterations we are willing to compute (RFC 9276 caps
/// legitimate zones far below this).
pub const MAX_NSEC3_ITERATIONS: u16 = 2500;
