//! Typed views over the rdata of the DNSSEC-bearing record types. Parsing
//! is offset-based over the canonical (uncompressed) rdata bytes held by
//! [`DnsRecord`](super::DnsRecord).

use super::codec::{self, PacketReader};
use super::enums::RecordType;
use super::{DnsRecord, ParseError, util};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rrsig {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer: String,
    pub signature: Vec<u8>,
}

impl Rrsig {
    pub fn parse(rr: &DnsRecord) -> Result<Self, ParseError> {
        if rr.rtype != RecordType::RRSIG || rr.rdata.len() < 18 {
            return Err(ParseError::MalformedRdata("RRSIG"));
        }
        let mut reader = PacketReader::new(&rr.rdata);
        let type_covered = RecordType::from(reader.read_u16()?);
        let algorithm = reader.read_u8()?;
        let labels = reader.read_u8()?;
        let original_ttl = reader.read_u32()?;
        let expiration = reader.read_u32()?;
        let inception = reader.read_u32()?;
        let key_tag = reader.read_u16()?;
        let signer_labels = reader.read_name()?;
        let signature = reader.take(reader.remaining())?.to_vec();
        Ok(Self {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer: util::name_from_labels(&signer_labels),
            signature,
        })
    }

    /// The RRSIG rdata up to and including the signer name, as signed over.
    pub fn rdata_without_signature(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.signer.len() + 2);
        codec::put_u16(&mut out, self.type_covered.into());
        out.push(self.algorithm);
        out.push(self.labels);
        codec::put_u32(&mut out, self.original_ttl);
        codec::put_u32(&mut out, self.expiration);
        codec::put_u32(&mut out, self.inception);
        codec::put_u16(&mut out, self.key_tag);
        out.extend_from_slice(&util::canonical_wire_name(&self.signer));
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

pub const DNSKEY_FLAG_ZONE: u16 = 0x0100;
pub const DNSKEY_FLAG_SEP: u16 = 0x0001;

impl Dnskey {
    pub fn parse(rr: &DnsRecord) -> Result<Self, ParseError> {
        if rr.rtype != RecordType::DNSKEY || rr.rdata.len() < 4 {
            return Err(ParseError::MalformedRdata("DNSKEY"));
        }
        Ok(Self {
            flags: u16::from_be_bytes([rr.rdata[0], rr.rdata[1]]),
            protocol: rr.rdata[2],
            algorithm: rr.rdata[3],
            public_key: rr.rdata[4..].to_vec(),
        })
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & DNSKEY_FLAG_ZONE != 0
    }

    pub fn is_sep(&self) -> bool {
        self.flags & DNSKEY_FLAG_SEP != 0
    }

    pub fn rdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.public_key.len());
        codec::put_u16(&mut out, self.flags);
        out.push(self.protocol);
        out.push(self.algorithm);
        out.extend_from_slice(&self.public_key);
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

impl Ds {
    pub fn parse(rr: &DnsRecord) -> Result<Self, ParseError> {
        if !matches!(rr.rtype, RecordType::DS | RecordType::CDS) || rr.rdata.len() < 4 {
            return Err(ParseError::MalformedRdata("DS"));
        }
        Ok(Self {
            key_tag: u16::from_be_bytes([rr.rdata[0], rr.rdata[1]]),
            algorithm: rr.rdata[2],
            digest_type: rr.rdata[3],
            digest: rr.rdata[4..].to_vec(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3 {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub type_bitmap: Vec<RecordType>,
}

pub const NSEC3_FLAG_OPT_OUT: u8 = 0x01;

impl Nsec3 {
    pub fn parse(rr: &DnsRecord) -> Result<Self, ParseError> {
        if rr.rtype != RecordType::NSEC3 {
            return Err(ParseError::MalformedRdata("NSEC3"));
        }
        let mut reader = PacketReader::new(&rr.rdata);
        let hash_algorithm = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let iterations = reader.read_u16()?;
        let salt_len = reader.read_u8()? as usize;
        let salt = reader.take(salt_len)?.to_vec();
        let hash_len = reader.read_u8()? as usize;
        let next_hashed = reader.take(hash_len)?.to_vec();
        let type_bitmap = parse_type_bitmap(&mut reader)?;
        Ok(Self {
            hash_algorithm,
            flags,
            iterations,
            salt,
            next_hashed,
            type_bitmap,
        })
    }

    pub fn opt_out(&self) -> bool {
        self.flags & NSEC3_FLAG_OPT_OUT != 0
    }

    pub fn covers_type(&self, rtype: RecordType) -> bool {
        self.type_bitmap.contains(&rtype)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec {
    pub next_domain: String,
    pub type_bitmap: Vec<RecordType>,
}

impl Nsec {
    pub fn parse(rr: &DnsRecord) -> Result<Self, ParseError> {
        if rr.rtype != RecordType::NSEC {
            return Err(ParseError::MalformedRdata("NSEC"));
        }
        let mut reader = PacketReader::new(&rr.rdata);
        let next_labels = reader.read_name()?;
        let type_bitmap = parse_type_bitmap(&mut reader)?;
        Ok(Self {
            next_domain: util::name_from_labels(&next_labels),
            type_bitmap,
        })
    }
}

/// RFC 4034 §4.1.2 windowed type bitmap, shared by NSEC and NSEC3.
fn parse_type_bitmap(reader: &mut PacketReader<'_>) -> Result<Vec<RecordType>, ParseError> {
    let mut types = Vec::new();
    while reader.remaining() >= 2 {
        let window = reader.read_u8()? as u16;
        let len = reader.read_u8()? as usize;
        if len == 0 || len > 32 {
            return Err(ParseError::MalformedRdata("type bitmap"));
        }
        let bits = reader.take(len)?;
        for (octet, &byte) in bits.iter().enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    let value = window * 256 + (octet as u16) * 8 + bit as u16;
                    types.push(RecordType::from(value));
                }
            }
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_bytes(types: &[u16]) -> Vec<u8> {
        // Single-window encoder, enough for test fixtures.
        let mut bits = [0u8; 32];
        let mut max_octet = 0;
        for &value in types {
            assert!(value < 256);
            let octet = (value / 8) as usize;
            bits[octet] |= 0x80 >> (value % 8);
            max_octet = max_octet.max(octet);
        }
        let mut out = vec![0, (max_octet + 1) as u8];
        out.extend_from_slice(&bits[..=max_octet]);
        out
    }

    #[test]
    fn type_bitmap_parses() {
        let bytes = bitmap_bytes(&[2, 6, 46]); // NS SOA RRSIG
        let mut reader = PacketReader::new(&bytes);
        let types = parse_type_bitmap(&mut reader).unwrap();
        assert_eq!(
            types,
            vec![RecordType::NS, RecordType::SOA, RecordType::RRSIG]
        );
    }

    #[test]
    fn nsec3_parse() {
        let mut rdata = vec![1, 1, 0, 10, 4, 0xAA, 0xBB, 0xCC, 0xDD, 20];
        rdata.extend_from_slice(&[0x11; 20]);
        rdata.extend_from_slice(&bitmap_bytes(&[2, 43])); // NS DS
        let rr = DnsRecord::new("hash.example", RecordType::NSEC3, 300, rdata);
        let nsec3 = Nsec3::parse(&rr).unwrap();
        assert_eq!(nsec3.hash_algorithm, 1);
        assert!(nsec3.opt_out());
        assert_eq!(nsec3.iterations, 10);
        assert_eq!(nsec3.salt, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(nsec3.next_hashed.len(), 20);
        assert!(nsec3.covers_type(RecordType::DS));
        assert!(!nsec3.covers_type(RecordType::SOA));
    }

    #[test]
    fn rrsig_parse_and_reencode() {
        let mut rdata = Vec::new();
        codec::put_u16(&mut rdata, RecordType::A.into());
        rdata.push(8); // RSASHA256
        rdata.push(2);
        codec::put_u32(&mut rdata, 3600);
        codec::put_u32(&mut rdata, 1_700_086_400);
        codec::put_u32(&mut rdata, 1_700_000_000);
        codec::put_u16(&mut rdata, 20326);
        codec::write_name_str(&mut rdata, "example.com");
        rdata.extend_from_slice(&[0x5A; 64]);

        let rr = DnsRecord::new("www.example.com", RecordType::RRSIG, 3600, rdata.clone());
        let rrsig = Rrsig::parse(&rr).unwrap();
        assert_eq!(rrsig.type_covered, RecordType::A);
        assert_eq!(rrsig.signer, "example.com");
        assert_eq!(rrsig.key_tag, 20326);
        assert_eq!(rrsig.labels, 2);
        assert_eq!(
            rrsig.rdata_without_signature(),
            rdata[..rdata.len() - 64].to_vec()
        );
    }
}
