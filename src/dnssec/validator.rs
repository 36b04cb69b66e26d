use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use super::algorithm::SigningAlgorithm;
use super::digest::DigestType;
use super::errors::{DnssecError, Result};
use super::key_tag;
use crate::dns::rdata::{Dnskey, Ds, Rrsig};
use crate::dns::{DnsPacket, DnsRecord, RecordType, util};

/// Verifies the two links of the chain of trust: parent DS against the
/// child DNSKEY RRset, and RRSIGs against a verified DNSKEY.
pub struct Validator {
    now_override: Option<u32>,
}

impl Validator {
    pub fn new() -> Self {
        Self { now_override: None }
    }

    /// Fixed-clock validator for tests with stored signatures.
    pub fn at_time(now: u32) -> Self {
        Self {
            now_override: Some(now),
        }
    }

    fn now(&self) -> u32 {
        self.now_override.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as u32
        })
    }

    /// Check a DNSKEY RRset against the DS set from the parent zone.
    /// Passes when any DS authenticates a key; returns the full key map
    /// (by key tag) for subsequent RRSIG verification.
    pub fn verify_dnskeys(
        &self,
        zone: &str,
        keys_rrset: &[DnsRecord],
        ds_set: &[Ds],
    ) -> Result<HashMap<u16, Dnskey>> {
        let zone = util::normalize(zone);
        let mut keys = HashMap::new();
        for rr in keys_rrset {
            if rr.rtype != RecordType::DNSKEY || rr.name() != zone {
                continue;
            }
            let Ok(key) = Dnskey::parse(rr) else { continue };
            if !key.is_zone_key() || key.protocol != 3 {
                continue;
            }
            keys.insert(key_tag::key_tag(&key), key);
        }

        if keys.is_empty() {
            return Err(DnssecError::MissingKsk(zone));
        }

        let mut tag_matched = None;
        for ds in ds_set {
            let Some(key) = keys.get(&ds.key_tag) else {
                continue;
            };
            if key.algorithm != ds.algorithm {
                continue;
            }
            tag_matched = Some(ds.key_tag);

            let Some(digest_type) = DigestType::from_u8(ds.digest_type) else {
                trace!(zone = %zone, digest = ds.digest_type, "skipping DS with unsupported digest");
                continue;
            };
            let mut data = util::canonical_wire_name(&zone);
            data.extend_from_slice(&key.rdata());
            if digest_type.digest(&data) == ds.digest {
                debug!(zone = %zone, key_tag = ds.key_tag, "DNSKEY authenticated by parent DS");
                return Ok(keys);
            }
        }

        match tag_matched {
            Some(tag) => Err(DnssecError::MismatchingDs {
                zone,
                key_tag: tag,
            }),
            None => Err(DnssecError::MissingKsk(zone)),
        }
    }

    /// Verify every RRSIG in the answer and authority sections signed by
    /// `zone`, requiring at least one verified signature whose owner is
    /// `signed_name`.
    pub fn verify_message(
        &self,
        signed_name: &str,
        msg: &DnsPacket,
        keys: &HashMap<u16, Dnskey>,
        zone: &str,
    ) -> Result<()> {
        let signed_name = util::normalize(signed_name);
        let zone = util::normalize(zone);
        let mut verified_target = false;

        for rr in msg.answers.iter().chain(msg.authorities.iter()) {
            if rr.rtype != RecordType::RRSIG {
                continue;
            }
            let rrsig = Rrsig::parse(rr).map_err(|_| {
                DnssecError::SignatureFailed("unparseable RRSIG".to_string())
            })?;
            if rrsig.signer != zone {
                trace!(signer = %rrsig.signer, expected = %zone, "skipping RRSIG by foreign signer");
                continue;
            }

            let owner = rr.name();
            if !util::is_subdomain(&owner, &rrsig.signer) {
                return Err(DnssecError::SignatureFailed(owner));
            }

            let key = keys
                .get(&rrsig.key_tag)
                .ok_or_else(|| DnssecError::MissingDnskey(rrsig.key_tag, rrsig.signer.clone()))?;

            let rrset = msg.rrset(&owner, rrsig.type_covered);
            if rrset.is_empty() {
                return Err(DnssecError::MissingSigned(owner));
            }

            self.check_validity_period(&rrsig)?;
            self.verify_rrset(&rrsig, key, &owner, &rrset)?;

            if owner == signed_name {
                verified_target = true;
            }
        }

        if verified_target {
            Ok(())
        } else {
            Err(DnssecError::MissingRrsig(signed_name))
        }
    }

    fn check_validity_period(&self, rrsig: &Rrsig) -> Result<()> {
        let now = self.now();
        if now < rrsig.inception || now > rrsig.expiration {
            return Err(DnssecError::InvalidSignaturePeriod {
                inception: rrsig.inception,
                expiration: rrsig.expiration,
            });
        }
        Ok(())
    }

    fn verify_rrset(
        &self,
        rrsig: &Rrsig,
        key: &Dnskey,
        owner: &str,
        rrset: &[&DnsRecord],
    ) -> Result<()> {
        if key.algorithm != rrsig.algorithm {
            return Err(DnssecError::MissingDnskey(rrsig.key_tag, rrsig.signer.clone()));
        }
        let algorithm = SigningAlgorithm::from_u8(rrsig.algorithm)
            .ok_or(DnssecError::UnsupportedAlgorithm(rrsig.algorithm))?;

        let signed = build_signed_data(rrsig, owner, rrset);
        algorithm.verify(&key.public_key, &signed, &rrsig.signature)?;
        trace!(%owner, covered = %rrsig.type_covered, "RRSIG verified");
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// The byte string an RRSIG signs: its own rdata up to the signer name,
/// then the covered RRset in canonical form (RFC 4034 §3.1.8.1).
fn build_signed_data(rrsig: &Rrsig, owner: &str, rrset: &[&DnsRecord]) -> Vec<u8> {
    let mut data = rrsig.rdata_without_signature();

    // A label count below the owner's means the RRset was synthesized
    // from a wildcard; the signature is over the source of synthesis.
    let owner_labels = util::label_count(owner);
    let signed_owner = if (rrsig.labels as usize) < owner_labels {
        let labels = util::labels_from_name(owner);
        let keep = labels.len() - rrsig.labels as usize;
        format!("*.{}", labels[keep..].join("."))
    } else {
        owner.to_string()
    };
    let owner_wire = util::canonical_wire_name(&signed_owner);

    let mut rdatas: Vec<Vec<u8>> = rrset
        .iter()
        .map(|rr| canonical_rdata(rr.rtype, &rr.rdata))
        .collect();
    rdatas.sort();
    rdatas.dedup();

    for rdata in rdatas {
        data.extend_from_slice(&owner_wire);
        data.extend_from_slice(&u16::from(rrset[0].rtype).to_be_bytes());
        data.extend_from_slice(&u16::from(rrset[0].rclass).to_be_bytes());
        data.extend_from_slice(&rrsig.original_ttl.to_be_bytes());
        data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        data.extend_from_slice(&rdata);
    }

    data
}

/// Lowercase the domain names embedded in rdata for signing (RFC 4034
/// §6.2). Works on whole byte ranges: label length octets are below 0x41
/// so ASCII-lowercasing a pure-name region only touches letters.
fn canonical_rdata(rtype: RecordType, rdata: &[u8]) -> Vec<u8> {
    let mut out = rdata.to_vec();
    let (start, end) = match rtype {
        RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::DNAME => (0, out.len()),
        RecordType::MX => (2.min(out.len()), out.len()),
        RecordType::SRV => (6.min(out.len()), out.len()),
        RecordType::SOA => (0, out.len().saturating_sub(20)),
        _ => return out,
    };
    out[start..end].make_ascii_lowercase();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::codec;

    fn dnskey_record(zone: &str, key: &Dnskey) -> DnsRecord {
        DnsRecord::new(zone, RecordType::DNSKEY, 3600, key.rdata())
    }

    fn test_key(algorithm: u8) -> Dnskey {
        Dnskey {
            flags: 257,
            protocol: 3,
            algorithm,
            public_key: vec![0xAB; 32],
        }
    }

    fn ds_for(zone: &str, key: &Dnskey) -> Ds {
        let mut data = util::canonical_wire_name(zone);
        data.extend_from_slice(&key.rdata());
        Ds {
            key_tag: key_tag::key_tag(key),
            algorithm: key.algorithm,
            digest_type: 2,
            digest: DigestType::Sha256.digest(&data),
        }
    }

    #[test]
    fn dnskey_verification_accepts_matching_ds() {
        let key = test_key(13);
        let validator = Validator::new();
        let keys = validator
            .verify_dnskeys(
                "example.com",
                &[dnskey_record("example.com", &key)],
                &[ds_for("example.com", &key)],
            )
            .unwrap();
        assert!(keys.contains_key(&key_tag::key_tag(&key)));
    }

    #[test]
    fn dnskey_verification_rejects_digest_mismatch() {
        let key = test_key(13);
        let mut ds = ds_for("example.com", &key);
        ds.digest[0] ^= 0xFF;

        let err = Validator::new()
            .verify_dnskeys("example.com", &[dnskey_record("example.com", &key)], &[ds])
            .unwrap_err();
        assert!(matches!(err, DnssecError::MismatchingDs { .. }));
    }

    #[test]
    fn dnskey_verification_requires_tag_match() {
        let key = test_key(13);
        let mut ds = ds_for("example.com", &key);
        ds.key_tag = ds.key_tag.wrapping_add(1);

        let err = Validator::new()
            .verify_dnskeys("example.com", &[dnskey_record("example.com", &key)], &[ds])
            .unwrap_err();
        assert!(matches!(err, DnssecError::MissingKsk(_)));
    }

    #[test]
    fn validity_period_is_enforced() {
        let rrsig = Rrsig {
            type_covered: RecordType::A,
            algorithm: 13,
            labels: 2,
            original_ttl: 300,
            expiration: 2_000,
            inception: 1_000,
            key_tag: 42,
            signer: "example.com".to_string(),
            signature: Vec::new(),
        };

        assert!(Validator::at_time(1_500).check_validity_period(&rrsig).is_ok());
        assert!(matches!(
            Validator::at_time(999).check_validity_period(&rrsig),
            Err(DnssecError::InvalidSignaturePeriod { .. })
        ));
        assert!(matches!(
            Validator::at_time(2_001).check_validity_period(&rrsig),
            Err(DnssecError::InvalidSignaturePeriod { .. })
        ));
    }

    #[test]
    fn signed_data_uses_wildcard_owner() {
        let rrsig = Rrsig {
            type_covered: RecordType::A,
            algorithm: 13,
            labels: 2,
            original_ttl: 300,
            expiration: 0,
            inception: 0,
            key_tag: 1,
            signer: "example.com".to_string(),
            signature: Vec::new(),
        };
        let rr = DnsRecord::new("a.b.example.com", RecordType::A, 300, vec![192, 0, 2, 1]);
        let data = build_signed_data(&rrsig, "a.b.example.com", &[&rr]);

        let mut wildcard = Vec::new();
        codec::write_name_str(&mut wildcard, "*.example.com");
        let prefix = rrsig.rdata_without_signature();
        assert_eq!(&data[prefix.len()..prefix.len() + wildcard.len()], &wildcard[..]);
    }

    #[test]
    fn canonical_rdata_lowercases_names_only() {
        let mut ns_rdata = Vec::new();
        codec::write_name_str(&mut ns_rdata, "NS1.Example.COM");
        let canonical = canonical_rdata(RecordType::NS, &ns_rdata);
        let mut expected = Vec::new();
        codec::write_name_str(&mut expected, "ns1.example.com");
        assert_eq!(canonical, expected);

        // A record bytes must pass through untouched.
        let a_rdata = vec![0x41, 0x42, 0x43, 0x44];
        assert_eq!(canonical_rdata(RecordType::A, &a_rdata), a_rdata);
    }

    #[test]
    fn signed_data_sorts_rrset_canonically() {
        let rrsig = Rrsig {
            type_covered: RecordType::A,
            algorithm: 13,
            labels: 2,
            original_ttl: 300,
            expiration: 0,
            inception: 0,
            key_tag: 1,
            signer: "example.com".to_string(),
            signature: Vec::new(),
        };
        let low = DnsRecord::new("h.example.com", RecordType::A, 300, vec![10, 0, 0, 1]);
        let high = DnsRecord::new("h.example.com", RecordType::A, 300, vec![192, 0, 2, 1]);

        let forward = build_signed_data(&rrsig, "h.example.com", &[&low, &high]);
        let reverse = build_signed_data(&rrsig, "h.example.com", &[&high, &low]);
        assert_eq!(forward, reverse);
    }
}
