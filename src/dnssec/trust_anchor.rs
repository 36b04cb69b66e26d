use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::info;

use super::digest::DigestType;
use super::errors::{DnssecError, Result};
use super::key_tag;
use crate::dns::rdata::{Dnskey, Ds};
use crate::dns::util;

/// A trusted DNSKEY, normally the root KSK, loaded from configuration.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub zone: String,
    pub dnskey: Dnskey,
    pub key_tag: u16,
}

impl TrustAnchor {
    /// Parse a zone-file style DNSKEY line as found in the configuration:
    /// `. 172800 IN DNSKEY 257 3 8 AwEAA...` (TTL and class optional).
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let type_pos = tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case("DNSKEY"))
            .ok_or_else(|| DnssecError::InvalidTrustAnchor(line.to_string()))?;

        if tokens.len() < type_pos + 5 || type_pos == 0 {
            return Err(DnssecError::InvalidTrustAnchor(line.to_string()));
        }

        let parse_num = |s: &str| {
            s.parse::<u16>()
                .map_err(|_| DnssecError::InvalidTrustAnchor(line.to_string()))
        };
        let flags = parse_num(tokens[type_pos + 1])?;
        let protocol = parse_num(tokens[type_pos + 2])? as u8;
        let algorithm = parse_num(tokens[type_pos + 3])? as u8;
        let public_key = BASE64
            .decode(tokens[type_pos + 4..].concat())
            .map_err(|_| DnssecError::InvalidTrustAnchor(line.to_string()))?;

        let dnskey = Dnskey {
            flags,
            protocol,
            algorithm,
            public_key,
        };
        let key_tag = key_tag::key_tag(&dnskey);

        Ok(Self {
            zone: util::normalize(tokens[0]),
            dnskey,
            key_tag,
        })
    }

    /// Synthesize the DS record this anchor implies.
    pub fn to_ds(&self, digest_type: DigestType) -> Ds {
        let mut data = util::canonical_wire_name(&self.zone);
        data.extend_from_slice(&self.dnskey.rdata());
        Ds {
            key_tag: self.key_tag,
            algorithm: self.dnskey.algorithm,
            digest_type: digest_type.to_u8(),
            digest: digest_type.digest(&data),
        }
    }
}

/// The root trust anchors, loaded once at boot and never evicted.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchorSet {
    pub fn from_config(lines: &[String]) -> Result<Self> {
        let anchors = lines
            .iter()
            .map(|line| TrustAnchor::parse(line))
            .collect::<Result<Vec<_>>>()?;
        for anchor in &anchors {
            info!(zone = %anchor.zone, key_tag = anchor.key_tag, "loaded trust anchor");
        }
        Ok(Self { anchors })
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// DS set synthesized from the anchors, seeding the chain of trust at
    /// the root. SHA-256 is used as the digest (the anchors themselves
    /// are DNSKEYs and carry none).
    pub fn ds_set(&self) -> Vec<Ds> {
        self.anchors
            .iter()
            .map(|anchor| anchor.to_ds(DigestType::Sha256))
            .collect()
    }

    /// Bootstrap self-check: every anchor's key tag must appear in the
    /// fetched root DNSKEY RRset with matching key material.
    pub fn verify_root_keys(&self, keys: &[Dnskey]) -> Result<()> {
        for anchor in &self.anchors {
            let found = keys
                .iter()
                .any(|key| key_tag::key_tag(key) == anchor.key_tag && *key == anchor.dnskey);
            if !found {
                return Err(DnssecError::MissingKsk(anchor.zone.clone()));
            }
        }
        Ok(())
    }
}
