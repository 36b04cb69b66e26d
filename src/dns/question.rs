use super::codec::{self, PacketReader};
use super::enums::{RecordClass, RecordType};
use super::{ParseError, util};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsQuestion {
    pub labels: Vec<String>,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl DnsQuestion {
    pub fn new(name: &str, qtype: RecordType) -> Self {
        Self {
            labels: util::labels_from_name(name),
            qtype,
            qclass: RecordClass::IN,
        }
    }

    /// Lowercase dotted owner name; "." for the root.
    pub fn name(&self) -> String {
        util::name_from_labels(&self.labels)
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, ParseError> {
        let labels = reader.read_name()?;
        let qtype = RecordType::from(reader.read_u16()?);
        let qclass = RecordClass::from(reader.read_u16()?);
        Ok(Self {
            labels,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        codec::write_name(buf, &self.labels);
        codec::put_u16(buf, self.qtype.into());
        codec::put_u16(buf, self.qclass.into());
    }
}
