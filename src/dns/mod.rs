pub mod codec;
pub mod edns;
pub mod enums;
pub mod header;
pub mod packet;
pub mod question;
pub mod rdata;
pub mod resource;
pub mod util;

pub use edns::OptRecord;
pub use enums::{Rcode, RecordClass, RecordType};
pub use header::DnsHeader;
pub use packet::DnsPacket;
pub use question::DnsQuestion;
pub use resource::DnsRecord;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("packet ends early at offset {0}")]
    UnexpectedEnd(usize),

    #[error("invalid DNS label")]
    InvalidLabel,

    #[error("compression pointer loop")]
    PointerLoop,

    #[error("invalid bit stream: {0}")]
    BitStream(String),

    #[error("malformed {0} rdata")]
    MalformedRdata(&'static str),

    #[error("message exceeds 64KiB")]
    Oversize,
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::BitStream(err.to_string())
    }
}
