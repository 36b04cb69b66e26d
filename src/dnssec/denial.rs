//! NSEC3 denial-of-existence proofs (RFC 5155): Name Error, NODATA at a
//! delegation point, and opt-out delegations to unsigned children.

use ring::digest;
use tracing::trace;

use super::MAX_NSEC3_ITERATIONS;
use super::errors::{DnssecError, Result};
use crate::dns::rdata::Nsec3;
use crate::dns::{DnsRecord, RecordType, util};

/// An NSEC3 record with its owner hash decoded out of the first label.
struct HashedNsec3 {
    owner_hash: Vec<u8>,
    zone: String,
    rdata: Nsec3,
}

/// The NSEC3 records of one authority section, ready for matching and
/// cover checks against hashed names.
pub struct Nsec3Set {
    records: Vec<HashedNsec3>,
}

impl Nsec3Set {
    /// Collect the NSEC3 RRset out of an authority section. Records with
    /// unknown hash algorithms or absurd iteration counts are dropped.
    pub fn from_records(records: &[DnsRecord]) -> Result<Self> {
        let mut parsed = Vec::new();
        for rr in records {
            if rr.rtype != RecordType::NSEC3 {
                continue;
            }
            let rdata = Nsec3::parse(rr).map_err(|_| DnssecError::InvalidNsec3Parameters)?;
            if rdata.hash_algorithm != 1 {
                trace!(algorithm = rdata.hash_algorithm, "skipping NSEC3 with unknown hash");
                continue;
            }
            if rdata.iterations > MAX_NSEC3_ITERATIONS {
                return Err(DnssecError::InvalidNsec3Parameters);
            }

            let labels = &rr.labels;
            if labels.is_empty() {
                continue;
            }
            let owner_hash = base32::decode(
                base32::Alphabet::Rfc4648Hex { padding: false },
                &labels[0].to_uppercase(),
            )
            .ok_or(DnssecError::InvalidNsec3Parameters)?;
            parsed.push(HashedNsec3 {
                owner_hash,
                zone: util::name_from_labels(&labels[1..]),
                rdata,
            });
        }
        if parsed.is_empty() {
            return Err(DnssecError::DenialProofFailed("no NSEC3 records"));
        }
        Ok(Self { records: parsed })
    }

    fn hash(&self, name: &str) -> Vec<u8> {
        let params = &self.records[0].rdata;
        nsec3_hash(name, &params.salt, params.iterations)
    }

    fn matching(&self, hash: &[u8]) -> Option<&Nsec3> {
        self.records
            .iter()
            .find(|rec| rec.owner_hash == hash)
            .map(|rec| &rec.rdata)
    }

    fn covering(&self, hash: &[u8]) -> Option<&Nsec3> {
        self.records
            .iter()
            .find(|rec| {
                let owner = rec.owner_hash.as_slice();
                let next = rec.rdata.next_hashed.as_slice();
                if owner < next {
                    owner < hash && hash < next
                } else {
                    // Wrap-around at the end of the hash ring.
                    hash > owner || hash < next
                }
            })
            .map(|rec| &rec.rdata)
    }

    /// Closest provable encloser of `qname`: the nearest ancestor whose
    /// hash has a matching NSEC3, plus the next-closer name beneath it.
    fn closest_encloser(&self, qname: &str) -> Option<(String, String)> {
        let mut candidate = util::normalize(qname);
        let mut next_closer = None;
        loop {
            if self.matching(&self.hash(&candidate)).is_some() {
                return next_closer.map(|nc| (candidate, nc));
            }
            next_closer = Some(candidate.clone());
            candidate = util::parent_name(&candidate)?;
        }
    }

    /// NXDOMAIN proof (RFC 5155 §8.4): a matching closest encloser, a
    /// covered next-closer, and a covered wildcard at the encloser.
    pub fn verify_name_error(&self, qname: &str) -> Result<()> {
        let (encloser, next_closer) = self
            .closest_encloser(qname)
            .ok_or(DnssecError::DenialProofFailed("no closest encloser"))?;

        if self.covering(&self.hash(&next_closer)).is_none() {
            return Err(DnssecError::DenialProofFailed("next closer not covered"));
        }

        let wildcard = format!("*.{}", encloser);
        if self.covering(&self.hash(&wildcard)).is_none() {
            return Err(DnssecError::DenialProofFailed("wildcard not covered"));
        }

        trace!(%qname, %encloser, "NSEC3 name error proof verified");
        Ok(())
    }

    /// NODATA proof for `qtype` at `qname`, as used for DS queries at
    /// delegation points (RFC 5155 §8.5/§8.6).
    pub fn verify_nodata(&self, qname: &str, qtype: RecordType) -> Result<()> {
        if let Some(nsec3) = self.matching(&self.hash(qname)) {
            if nsec3.covers_type(qtype) || nsec3.covers_type(RecordType::CNAME) {
                return Err(DnssecError::DenialProofFailed("type present in bitmap"));
            }
            return Ok(());
        }

        // No exact match: only acceptable through an opt-out span over
        // the next-closer name.
        let (_, next_closer) = self
            .closest_encloser(qname)
            .ok_or(DnssecError::DenialProofFailed("no closest encloser"))?;
        let covering = self
            .covering(&self.hash(&next_closer))
            .ok_or(DnssecError::DenialProofFailed("next closer not covered"))?;
        if !covering.opt_out() {
            return Err(DnssecError::DenialProofFailed("covering span lacks opt-out"));
        }
        Ok(())
    }

    /// Proof that a delegation to `child` is legitimately unsigned
    /// (RFC 5155 §8.9): either a matching NSEC3 with NS but no DS/SOA,
    /// or an opt-out span covering the next-closer name.
    pub fn verify_delegation(&self, child: &str) -> Result<()> {
        if let Some(nsec3) = self.matching(&self.hash(child)) {
            if !nsec3.covers_type(RecordType::NS) {
                return Err(DnssecError::DenialProofFailed("delegation lacks NS in bitmap"));
            }
            if nsec3.covers_type(RecordType::DS) || nsec3.covers_type(RecordType::SOA) {
                return Err(DnssecError::DenialProofFailed("delegation bitmap has DS or SOA"));
            }
            return Ok(());
        }

        let (_, next_closer) = self
            .closest_encloser(child)
            .ok_or(DnssecError::DenialProofFailed("no closest encloser"))?;
        let covering = self
            .covering(&self.hash(&next_closer))
            .ok_or(DnssecError::DenialProofFailed("next closer not covered"))?;
        if !covering.opt_out() {
            return Err(DnssecError::DenialProofFailed("covering span lacks opt-out"));
        }
        Ok(())
    }

    pub fn zone(&self) -> &str {
        &self.records[0].zone
    }
}

/// The iterated SHA-1 hash of RFC 5155 §5 over the canonical wire name.
pub fn nsec3_hash(name: &str, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut input = util::canonical_wire_name(name);
    input.extend_from_slice(salt);
    let mut hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &input)
        .as_ref()
        .to_vec();

    for _ in 0..iterations {
        let mut next = hash;
        next.extend_from_slice(salt);
        hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &next)
            .as_ref()
            .to_vec();
    }
    hash
}

/// Lowercase base32hex form, as it appears in NSEC3 owner labels.
pub fn nsec3_hash_label(name: &str, salt: &[u8], iterations: u16) -> String {
    base32::encode(
        base32::Alphabet::Rfc4648Hex { padding: false },
        &nsec3_hash(name, salt, iterations),
    )
    .to_lowercase()
}
