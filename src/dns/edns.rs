use super::codec::{self, PacketReader};
use super::enums::RecordType;
use super::{DnsRecord, ParseError};

const DO_FLAG: u16 = 0x8000;

/// EDNS0 OPT pseudo-record (RFC 6891). Kept out of the additional section
/// so record counts and TTL accounting never have to special-case it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptRecord {
    pub udp_size: u16,
    pub ext_rcode: u8,
    pub version: u8,
    pub dnssec_ok: bool,
    pub z: u16,
    pub options: Vec<EdnsOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl Default for OptRecord {
    fn default() -> Self {
        Self {
            udp_size: crate::constants::DEFAULT_MSG_SIZE,
            ext_rcode: 0,
            version: crate::constants::EDNS_VERSION,
            dnssec_ok: false,
            z: 0,
            options: Vec::new(),
        }
    }
}

impl OptRecord {
    pub fn with_do(dnssec_ok: bool) -> Self {
        Self {
            dnssec_ok,
            ..Default::default()
        }
    }

    /// Reinterpret a parsed additional-section record as OPT. The class
    /// field carries the UDP size and the TTL packs flags and version.
    pub fn from_record(rr: &DnsRecord) -> Result<Self, ParseError> {
        if rr.rtype != RecordType::OPT {
            return Err(ParseError::MalformedRdata("OPT"));
        }
        let ttl = rr.ttl;
        let mut options = Vec::new();
        let mut reader = PacketReader::new(&rr.rdata);
        while reader.remaining() >= 4 {
            let code = reader.read_u16()?;
            let len = reader.read_u16()? as usize;
            let data = reader.take(len)?.to_vec();
            options.push(EdnsOption { code, data });
        }
        Ok(Self {
            udp_size: u16::from(rr.rclass),
            ext_rcode: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            dnssec_ok: ttl as u16 & DO_FLAG != 0,
            z: ttl as u16 & !DO_FLAG,
            options,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.push(0); // root owner
        codec::put_u16(buf, RecordType::OPT.into());
        codec::put_u16(buf, self.udp_size);
        let mut flags = self.z;
        if self.dnssec_ok {
            flags |= DO_FLAG;
        }
        let ttl = (self.ext_rcode as u32) << 24 | (self.version as u32) << 16 | flags as u32;
        codec::put_u32(buf, ttl);
        let mut rdata = Vec::new();
        for option in &self.options {
            codec::put_u16(&mut rdata, option.code);
            codec::put_u16(&mut rdata, option.data.len() as u16);
            rdata.extend_from_slice(&option.data);
        }
        codec::put_u16(buf, rdata.len() as u16);
        buf.extend_from_slice(&rdata);
    }

    /// Set the full 12-bit extended rcode (e.g. 16 for BADVERS); the low
    /// four bits stay in the header.
    pub fn set_extended_rcode(&mut self, rcode: u16) {
        self.ext_rcode = (rcode >> 4) as u8;
    }
}
