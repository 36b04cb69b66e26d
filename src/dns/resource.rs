use std::net::{Ipv4Addr, Ipv6Addr};

use super::codec::{self, PacketReader};
use super::enums::{RecordClass, RecordType};
use super::{ParseError, util};

/// A resource record with its rdata held in canonical wire form: any
/// compression pointers inside the rdata are expanded at parse time, so
/// the bytes can be hashed, signed over, or re-serialized as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsRecord {
    pub labels: Vec<String>,
    pub rtype: RecordType,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl DnsRecord {
    pub fn new(name: &str, rtype: RecordType, ttl: u32, rdata: Vec<u8>) -> Self {
        Self {
            labels: util::labels_from_name(name),
            rtype,
            rclass: RecordClass::IN,
            ttl,
            rdata,
        }
    }

    /// Lowercase dotted owner name; "." for the root.
    pub fn name(&self) -> String {
        util::name_from_labels(&self.labels)
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, ParseError> {
        let labels = reader.read_name()?;
        let rtype = RecordType::from(reader.read_u16()?);
        let rclass = RecordClass::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()? as usize;

        let rdata_start = reader.pos();
        let raw = reader.take(rdlength)?;
        let rdata = decompress_rdata(reader, rtype, rdata_start, raw)?;

        Ok(Self {
            labels,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        codec::write_name(buf, &self.labels);
        codec::put_u16(buf, self.rtype.into());
        codec::put_u16(buf, self.rclass.into());
        codec::put_u32(buf, self.ttl);
        codec::put_u16(buf, self.rdata.len() as u16);
        buf.extend_from_slice(&self.rdata);
    }

    pub fn as_a(&self) -> Option<Ipv4Addr> {
        if self.rtype == RecordType::A && self.rdata.len() == 4 {
            let octets: [u8; 4] = self.rdata[..4].try_into().ok()?;
            return Some(Ipv4Addr::from(octets));
        }
        None
    }

    pub fn as_aaaa(&self) -> Option<Ipv6Addr> {
        if self.rtype == RecordType::AAAA && self.rdata.len() == 16 {
            let octets: [u8; 16] = self.rdata[..16].try_into().ok()?;
            return Some(Ipv6Addr::from(octets));
        }
        None
    }

    /// Target of an NS, CNAME, PTR, or DNAME record.
    pub fn target_name(&self) -> Option<String> {
        match self.rtype {
            RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::DNAME => {
                let (labels, _) = codec::read_name_at(&self.rdata, 0).ok()?;
                Some(util::name_from_labels(&labels))
            }
            _ => None,
        }
    }
}

/// Rewrite name-bearing rdata without compression pointers. `reader` still
/// owns the whole message buffer, which pointer targets refer into.
fn decompress_rdata(
    reader: &PacketReader<'_>,
    rtype: RecordType,
    rdata_start: usize,
    raw: &[u8],
) -> Result<Vec<u8>, ParseError> {
    let buf = reader.buffer();
    let end = rdata_start + raw.len();

    let expand_name = |out: &mut Vec<u8>, at: usize| -> Result<usize, ParseError> {
        let (labels, next) = codec::read_name_at(buf, at)?;
        codec::write_name(out, &labels);
        Ok(next)
    };

    match rtype {
        RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::DNAME => {
            let mut out = Vec::with_capacity(raw.len());
            expand_name(&mut out, rdata_start)?;
            Ok(out)
        }
        RecordType::MX => {
            if raw.len() < 2 {
                return Err(ParseError::MalformedRdata("MX"));
            }
            let mut out = raw[..2].to_vec();
            expand_name(&mut out, rdata_start + 2)?;
            Ok(out)
        }
        RecordType::SRV => {
            if raw.len() < 6 {
                return Err(ParseError::MalformedRdata("SRV"));
            }
            let mut out = raw[..6].to_vec();
            expand_name(&mut out, rdata_start + 6)?;
            Ok(out)
        }
        RecordType::SOA => {
            let mut out = Vec::with_capacity(raw.len());
            let after_mname = expand_name(&mut out, rdata_start)?;
            let after_rname = expand_name(&mut out, after_mname)?;
            if after_rname + 20 > end {
                return Err(ParseError::MalformedRdata("SOA"));
            }
            out.extend_from_slice(&buf[after_rname..after_rname + 20]);
            Ok(out)
        }
        _ => Ok(raw.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(rr: &DnsRecord) -> Vec<u8> {
        let mut buf = Vec::new();
        rr.write(&mut buf);
        buf
    }

    #[test]
    fn a_record_roundtrip() {
        let rr = DnsRecord::new("example.com", RecordType::A, 300, vec![93, 184, 216, 34]);
        let buf = record_bytes(&rr);
        let mut reader = PacketReader::new(&buf);
        let parsed = DnsRecord::read(&mut reader).unwrap();
        assert_eq!(parsed.as_a(), Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(parsed.ttl, 300);
    }

    #[test]
    fn compressed_ns_rdata_is_expanded() {
        // Owner "example.com" followed by an NS record whose rdata is
        // "ns1" + pointer back to the owner name at offset 0.
        let mut buf = Vec::new();
        codec::write_name_str(&mut buf, "example.com");
        codec::put_u16(&mut buf, RecordType::NS.into());
        codec::put_u16(&mut buf, RecordClass::IN.into());
        codec::put_u32(&mut buf, 3600);
        codec::put_u16(&mut buf, 6);
        buf.push(3);
        buf.extend_from_slice(b"ns1");
        buf.push(0xC0);
        buf.push(0);

        let mut reader = PacketReader::new(&buf);
        let parsed = DnsRecord::read(&mut reader).unwrap();
        assert_eq!(parsed.target_name().as_deref(), Some("ns1.example.com"));

        let mut canonical = Vec::new();
        codec::write_name_str(&mut canonical, "ns1.example.com");
        assert_eq!(parsed.rdata, canonical);
    }
}
