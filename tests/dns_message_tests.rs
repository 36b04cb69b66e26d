use ratatoskr::dns::enums::{Rcode, RecordClass, RecordType};
use ratatoskr::dns::{DnsPacket, DnsRecord, OptRecord, codec};

#[test]
fn response_roundtrips_through_wire_format() {
    let mut packet = DnsPacket::query("WWW.Example.COM", RecordType::A);
    packet.header.qr = true;
    packet.header.rd = true;
    packet.header.ra = true;
    packet.header.ad = true;
    packet.edns = Some(OptRecord::with_do(true));
    packet.answers.push(DnsRecord::new(
        "www.example.com",
        RecordType::A,
        287,
        vec![93, 184, 216, 34],
    ));
    packet.authorities.push(DnsRecord::new(
        "example.com",
        RecordType::NS,
        3600,
        {
            let mut rdata = Vec::new();
            codec::write_name_str(&mut rdata, "ns1.example.com");
            rdata
        },
    ));

    let bytes = packet.serialize().unwrap();
    let parsed = DnsPacket::parse(&bytes).unwrap();

    assert_eq!(parsed.qname().as_deref(), Some("www.example.com"));
    assert_eq!(parsed.qtype(), Some(RecordType::A));
    assert_eq!(parsed.rcode(), Rcode::NoError);
    assert_eq!(parsed.answers, packet.answers);
    assert_eq!(parsed.authorities, packet.authorities);
    assert!(parsed.header.ad);
    assert!(parsed.dnssec_ok());

    // Serving a cached copy must produce the same wire bytes again.
    assert_eq!(parsed.serialize().unwrap(), bytes);
}

#[test]
fn parses_compressed_referral() {
    // Hand-built message: question for www.example.com, authority NS
    // record whose owner and rdata both use compression pointers.
    let mut buf = Vec::new();
    let header = ratatoskr::dns::DnsHeader {
        id: 0x7777,
        qr: true,
        qdcount: 1,
        nscount: 1,
        ..Default::default()
    };
    header.write(&mut buf).unwrap();

    let qname_offset = buf.len();
    codec::write_name_str(&mut buf, "www.example.com");
    codec::put_u16(&mut buf, RecordType::A.into());
    codec::put_u16(&mut buf, RecordClass::IN.into());

    // Authority owner: pointer to "example.com" inside the question.
    buf.push(0xC0);
    buf.push((qname_offset + 4) as u8);
    codec::put_u16(&mut buf, RecordType::NS.into());
    codec::put_u16(&mut buf, RecordClass::IN.into());
    codec::put_u32(&mut buf, 172800);
    codec::put_u16(&mut buf, 6); // "ns1" + pointer
    buf.push(3);
    buf.extend_from_slice(b"ns1");
    buf.push(0xC0);
    buf.push((qname_offset + 4) as u8);

    let parsed = DnsPacket::parse(&buf).unwrap();
    assert_eq!(parsed.header.id, 0x7777);
    let ns = &parsed.authorities[0];
    assert_eq!(ns.name(), "example.com");
    assert_eq!(ns.target_name().as_deref(), Some("ns1.example.com"));

    // Re-serialization is uncompressed but semantically identical.
    let reparsed = DnsPacket::parse(&parsed.serialize().unwrap()).unwrap();
    assert_eq!(reparsed.authorities[0].target_name(), ns.target_name());
}

#[test]
fn opt_record_survives_roundtrip_separately_from_additionals() {
    let mut packet = DnsPacket::query("example.com", RecordType::MX);
    packet.edns = Some(OptRecord::with_do(false));
    packet.resources.push(DnsRecord::new(
        "mail.example.com",
        RecordType::A,
        60,
        vec![192, 0, 2, 25],
    ));

    let parsed = DnsPacket::parse(&packet.serialize().unwrap()).unwrap();
    assert_eq!(parsed.resources.len(), 1);
    let opt = parsed.edns.expect("OPT preserved");
    assert!(!opt.dnssec_ok);
    assert_eq!(opt.udp_size, 1536);
    assert_eq!(parsed.header.arcount, 2);
}

#[test]
fn oversized_message_is_rejected_on_serialize() {
    let mut packet = DnsPacket::query("example.com", RecordType::TXT);
    for _ in 0..300 {
        packet.answers.push(DnsRecord::new(
            "example.com",
            RecordType::TXT,
            60,
            vec![0xAA; 255],
        ));
    }
    assert!(packet.serialize().is_err());
}
