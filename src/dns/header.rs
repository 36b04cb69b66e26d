use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

use super::ParseError;

/// DNS message header (RFC 1035 §4.1.1 plus the AD/CD bits of RFC 4035).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

pub const HEADER_LEN: usize = 12;

impl DnsHeader {
    pub fn read(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < HEADER_LEN {
            return Err(ParseError::UnexpectedEnd(buf.len()));
        }
        let mut reader = BitReader::endian(&buf[..HEADER_LEN], BigEndian);
        let mut header = DnsHeader {
            id: reader.read_var::<u16>(16)?,
            ..Default::default()
        };
        header.qr = reader.read_var::<u8>(1)? == 1;
        header.opcode = reader.read_var::<u8>(4)?;
        header.aa = reader.read_var::<u8>(1)? == 1;
        header.tc = reader.read_var::<u8>(1)? == 1;
        header.rd = reader.read_var::<u8>(1)? == 1;
        header.ra = reader.read_var::<u8>(1)? == 1;
        header.z = reader.read_var::<u8>(1)? == 1;
        header.ad = reader.read_var::<u8>(1)? == 1;
        header.cd = reader.read_var::<u8>(1)? == 1;
        header.rcode = reader.read_var::<u8>(4)?;
        header.qdcount = reader.read_var::<u16>(16)?;
        header.ancount = reader.read_var::<u16>(16)?;
        header.nscount = reader.read_var::<u16>(16)?;
        header.arcount = reader.read_var::<u16>(16)?;
        Ok(header)
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), ParseError> {
        let mut writer = BitWriter::endian(&mut *buf, BigEndian);
        writer.write_var::<u16>(16, self.id)?;
        writer.write_var::<u8>(1, self.qr as u8)?;
        writer.write_var::<u8>(4, self.opcode)?;
        writer.write_var::<u8>(1, self.aa as u8)?;
        writer.write_var::<u8>(1, self.tc as u8)?;
        writer.write_var::<u8>(1, self.rd as u8)?;
        writer.write_var::<u8>(1, self.ra as u8)?;
        writer.write_var::<u8>(1, self.z as u8)?;
        writer.write_var::<u8>(1, self.ad as u8)?;
        writer.write_var::<u8>(1, self.cd as u8)?;
        writer.write_var::<u8>(4, self.rcode)?;
        writer.write_var::<u16>(16, self.qdcount)?;
        writer.write_var::<u16>(16, self.ancount)?;
        writer.write_var::<u16>(16, self.nscount)?;
        writer.write_var::<u16>(16, self.arcount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = DnsHeader {
            id: 0xBEEF,
            qr: true,
            opcode: 0,
            aa: false,
            tc: true,
            rd: true,
            ra: true,
            z: false,
            ad: true,
            cd: false,
            rcode: 3,
            qdcount: 1,
            ancount: 2,
            nscount: 3,
            arcount: 4,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        let parsed = DnsHeader::read(&buf).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn ad_cd_bits_are_distinct() {
        let mut header = DnsHeader::default();
        header.cd = true;
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        // CD is bit 4 of the flags low byte.
        assert_eq!(buf[3] & 0x10, 0x10);
        assert_eq!(buf[3] & 0x20, 0);
    }
}
