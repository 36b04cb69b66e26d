use super::codec::PacketReader;
use super::edns::OptRecord;
use super::enums::{Rcode, RecordType};
use super::header::DnsHeader;
use super::question::DnsQuestion;
use super::resource::DnsRecord;
use super::{ParseError, util};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub resources: Vec<DnsRecord>,
    pub edns: Option<OptRecord>,
}

impl DnsPacket {
    /// Build an upstream query for one question, RD off (iterative mode).
    pub fn query(name: &str, qtype: RecordType) -> Self {
        let mut packet = DnsPacket::default();
        packet.header.id = rand::random::<u16>();
        packet.questions.push(DnsQuestion::new(name, qtype));
        packet
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let header = DnsHeader::read(buf)?;
        let mut reader = PacketReader::new(buf);
        reader.seek(super::header::HEADER_LEN);

        let mut packet = DnsPacket {
            header,
            ..Default::default()
        };

        for _ in 0..packet.header.qdcount {
            packet.questions.push(DnsQuestion::read(&mut reader)?);
        }
        for _ in 0..packet.header.ancount {
            packet.answers.push(DnsRecord::read(&mut reader)?);
        }
        for _ in 0..packet.header.nscount {
            packet.authorities.push(DnsRecord::read(&mut reader)?);
        }
        for _ in 0..packet.header.arcount {
            let rr = DnsRecord::read(&mut reader)?;
            if rr.rtype == RecordType::OPT {
                // Last OPT wins; duplicates are a protocol violation we
                // tolerate rather than reject.
                packet.edns = Some(OptRecord::from_record(&rr)?);
            } else {
                packet.resources.push(rr);
            }
        }

        Ok(packet)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.resources.len() as u16 + self.edns.is_some() as u16;

        let mut buf = Vec::with_capacity(512);
        header.write(&mut buf)?;
        for question in &self.questions {
            question.write(&mut buf);
        }
        for rr in &self.answers {
            rr.write(&mut buf);
        }
        for rr in &self.authorities {
            rr.write(&mut buf);
        }
        for rr in &self.resources {
            rr.write(&mut buf);
        }
        if let Some(edns) = &self.edns {
            edns.write(&mut buf);
        }
        if buf.len() > u16::MAX as usize {
            return Err(ParseError::Oversize);
        }
        Ok(buf)
    }

    /// First (and in practice only) question name, lowercased.
    pub fn qname(&self) -> Option<String> {
        self.questions.first().map(|q| q.name())
    }

    pub fn qtype(&self) -> Option<RecordType> {
        self.questions.first().map(|q| q.qtype)
    }

    /// DO bit of the client's OPT record, off when EDNS is absent.
    pub fn dnssec_ok(&self) -> bool {
        self.edns.as_ref().is_some_and(|opt| opt.dnssec_ok)
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from_u8(self.header.rcode)
    }

    /// Skeleton reply mirroring id, question, RD, and CD.
    pub fn response_to(req: &DnsPacket) -> Self {
        let mut resp = DnsPacket::default();
        resp.header.id = req.header.id;
        resp.header.qr = true;
        resp.header.opcode = req.header.opcode;
        resp.header.rd = req.header.rd;
        resp.header.cd = req.header.cd;
        resp.header.ra = true;
        resp.questions = req.questions.clone();
        resp
    }

    pub fn error_response(req: &DnsPacket, rcode: Rcode) -> Self {
        let mut resp = Self::response_to(req);
        resp.header.rcode = rcode.to_u8();
        if req.edns.is_some() {
            let mut opt = OptRecord::with_do(req.dnssec_ok());
            if rcode == Rcode::BadVers {
                opt.set_extended_rcode(16);
            }
            resp.edns = Some(opt);
        }
        resp
    }

    /// Records of one type from the answer section.
    pub fn answers_of(&self, rtype: RecordType) -> Vec<&DnsRecord> {
        self.answers.iter().filter(|rr| rr.rtype == rtype).collect()
    }

    pub fn authorities_of(&self, rtype: RecordType) -> Vec<&DnsRecord> {
        self.authorities
            .iter()
            .filter(|rr| rr.rtype == rtype)
            .collect()
    }

    /// The RRset (owner, type) across answer and authority sections.
    pub fn rrset(&self, owner: &str, rtype: RecordType) -> Vec<&DnsRecord> {
        let owner = util::normalize(owner);
        self.answers
            .iter()
            .chain(self.authorities.iter())
            .filter(|rr| rr.rtype == rtype && rr.name() == owner)
            .collect()
    }

    /// Smallest TTL across answer and authority, used as the cache TTL.
    pub fn min_ttl(&self, default: u32) -> u32 {
        self.answers
            .iter()
            .chain(self.authorities.iter())
            .map(|rr| rr.ttl)
            .min()
            .unwrap_or(default)
    }

    /// Truncate for a UDP client that can take at most `limit` bytes:
    /// drop the payload sections and set TC so it retries over TCP.
    pub fn truncated(&self) -> Self {
        let mut resp = self.clone();
        resp.header.tc = true;
        resp.answers.clear();
        resp.authorities.clear();
        resp.resources.clear();
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::RecordClass;

    #[test]
    fn packet_roundtrip() {
        let mut packet = DnsPacket::query("www.example.com", RecordType::A);
        packet.header.rd = true;
        packet.edns = Some(OptRecord::with_do(true));
        packet.answers.push(DnsRecord::new(
            "www.example.com",
            RecordType::A,
            60,
            vec![192, 0, 2, 1],
        ));

        let bytes = packet.serialize().unwrap();
        let parsed = DnsPacket::parse(&bytes).unwrap();

        assert_eq!(parsed.qname().as_deref(), Some("www.example.com"));
        assert_eq!(parsed.qtype(), Some(RecordType::A));
        assert_eq!(parsed.answers.len(), 1);
        assert_eq!(parsed.questions[0].qclass, RecordClass::IN);
        assert!(parsed.dnssec_ok());
        assert_eq!(parsed.header.ancount, 1);
        assert_eq!(parsed.header.arcount, 1);
        assert!(parsed.resources.is_empty());
    }

    #[test]
    fn response_skeleton_mirrors_request() {
        let mut req = DnsPacket::query("example.com", RecordType::MX);
        req.header.rd = true;
        req.header.cd = true;
        let resp = DnsPacket::response_to(&req);
        assert!(resp.header.qr);
        assert!(resp.header.ra);
        assert!(resp.header.rd);
        assert!(resp.header.cd);
        assert_eq!(resp.header.id, req.header.id);
        assert_eq!(resp.questions, req.questions);
    }

    #[test]
    fn badvers_response() {
        let mut req = DnsPacket::query("example.com", RecordType::A);
        req.edns = Some(OptRecord {
            version: 1,
            ..Default::default()
        });
        let resp = DnsPacket::error_response(&req, Rcode::BadVers);
        assert_eq!(resp.header.rcode, 0);
        assert_eq!(resp.edns.as_ref().unwrap().ext_rcode, 1);
    }

    #[test]
    fn min_ttl_spans_sections() {
        let mut packet = DnsPacket::default();
        packet
            .answers
            .push(DnsRecord::new("a.example", RecordType::A, 300, vec![0; 4]));
        packet.authorities.push(DnsRecord::new(
            "example",
            RecordType::SOA,
            60,
            Vec::new(),
        ));
        assert_eq!(packet.min_ttl(600), 60);
        assert_eq!(DnsPacket::default().min_ttl(600), 600);
    }
}
