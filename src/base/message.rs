//! A DNS message.
//!
//! This module defines [`Message`], an owned DNS message with a header, a
//! question section and three record sections, all with typed content.
//!
//! The section counts of the wire format header are not kept. When parsing,
//! they determine how many entries are read, and any difference between
//! the counts and the data is an error. When composing, they are derived
//! from the length of the sections and thus always correct.

use super::header::{Header, HeaderCounts};
use super::iana::{Opcode, OptRcode, Rtype};
use super::name::Name;
use super::opt::{Edns, DEFAULT_UDP_PAYLOAD_SIZE};
use super::question::Question;
use super::record::Record;
use super::wire::{ComposeError, Composer, ParseError, Parser};
use crate::rdata::Soa;
use core::fmt;
use std::vec::Vec;

//------------ Message -------------------------------------------------------

/// A DNS message.
///
/// All sections are accessible directly. Because records are owned values,
/// a message can be built up or taken apart freely.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub question: Vec<Question>,
    pub answer: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

/// # Creation
///
impl Message {
    /// Creates a new, empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a single question with a random ID.
    pub fn query(question: Question) -> Self {
        let mut res = Self::new();
        res.header.set_random_id();
        res.question.push(question);
        res
    }

    /// Creates a response for this message.
    ///
    /// The response has the same ID, opcode and question and has the QR bit
    /// set. The RD bit is copied. All record sections are empty.
    pub fn make_response(&self) -> Self {
        let mut res = Self::new();
        res.header.set_id(self.header.id());
        res.header.set_qr(true);
        res.header.set_opcode(self.header.opcode());
        res.header.set_rd(self.header.rd());
        res.question = self.question.clone();
        res
    }
}

/// # Access to Content
///
impl Message {
    /// Returns the first question if there is one.
    pub fn first_question(&self) -> Option<&Question> {
        self.question.first()
    }

    /// Returns whether this is a NOTIFY message.
    pub fn is_notify(&self) -> bool {
        self.header.opcode() == Opcode::NOTIFY
    }

    /// Returns the SOA record data of the first record of the answer
    /// section if it is an SOA record.
    pub fn answer_soa(&self) -> Option<&Soa> {
        self.answer.first().and_then(|record| record.data().as_soa())
    }

    /// Returns the EDNS information if the message has an OPT record.
    pub fn edns(&self) -> Option<Edns> {
        self.additional.iter().find_map(Edns::from_record)
    }

    /// Replaces the OPT record of the message.
    ///
    /// The new OPT record is placed before a TSIG record, if any.
    pub fn set_edns(&mut self, edns: &Edns) {
        self.remove_edns();
        let pos = match self.additional.last() {
            Some(last) if last.rtype() == Rtype::TSIG => {
                self.additional.len() - 1
            }
            _ => self.additional.len(),
        };
        self.additional.insert(pos, edns.to_record());
    }

    /// Removes the OPT record from the message.
    pub fn remove_edns(&mut self) {
        self.additional.retain(|record| record.rtype() != Rtype::OPT);
    }

    /// Returns the UDP payload size announced by the message.
    ///
    /// Without EDNS, this is 512.
    pub fn udp_payload_size(&self) -> u16 {
        self.edns()
            .map(|edns| edns.udp_payload_size())
            .unwrap_or(DEFAULT_UDP_PAYLOAD_SIZE)
    }

    /// Returns the full response code including the extended bits.
    pub fn extended_rcode(&self) -> OptRcode {
        let ext = self.edns().map(|edns| edns.ext_rcode()).unwrap_or(0);
        OptRcode::from_parts(self.header.rcode(), ext)
    }

    /// Returns the TSIG record if it is the last additional record.
    pub fn tsig(&self) -> Option<&Record> {
        self.additional
            .last()
            .filter(|record| record.rtype() == Rtype::TSIG)
    }

    /// Returns whether all names in the record sections are at or below
    /// `apex`.
    pub fn records_within(&self, apex: &Name) -> bool {
        self.answer
            .iter()
            .chain(self.authority.iter())
            .all(|record| record.owner().ends_with(apex))
    }
}

/// # Parsing
///
impl Message {
    /// Parses a message from its wire format.
    ///
    /// The header counts determine the number of entries in each section
    /// and the message must end right after the last of them. An OPT
    /// record may only appear once in the additional section and a TSIG
    /// record only as the last additional record.
    pub fn from_octets(octets: &[u8]) -> Result<Self, ParseError> {
        let mut parser = Parser::from_ref(octets);
        let header = Header::parse(&mut parser)?;
        let counts = HeaderCounts::parse(&mut parser)?;
        let mut res = Message {
            header,
            question: Vec::with_capacity(usize::from(counts.qdcount.min(16))),
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        for _ in 0..counts.qdcount {
            res.question.push(Question::parse(&mut parser)?);
        }
        for _ in 0..counts.ancount {
            res.answer.push(Self::parse_record(&mut parser, false)?);
        }
        for _ in 0..counts.nscount {
            res.authority.push(Self::parse_record(&mut parser, false)?);
        }
        for idx in 0..counts.arcount {
            let record = Self::parse_record(&mut parser, true)?;
            if record.rtype() == Rtype::TSIG && idx + 1 != counts.arcount {
                return Err(ParseError::form_error("TSIG record not last"));
            }
            if record.rtype() == Rtype::OPT
                && res.additional.iter().any(|r| r.rtype() == Rtype::OPT)
            {
                return Err(ParseError::form_error("multiple OPT records"));
            }
            res.additional.push(record);
        }
        if parser.remaining() != 0 {
            return Err(ParseError::form_error("trailing data"));
        }
        Ok(res)
    }

    fn parse_record(
        parser: &mut Parser,
        additional: bool,
    ) -> Result<Record, ParseError> {
        let record = Record::parse(parser)?;
        if !additional
            && matches!(record.rtype(), Rtype::OPT | Rtype::TSIG)
        {
            return Err(ParseError::form_error(
                "pseudo record outside additional section",
            ));
        }
        Ok(record)
    }
}

/// # Composing
///
impl Message {
    /// Returns the wire format of the message.
    ///
    /// Names are compressed where permitted.
    pub fn to_wire(&self) -> Result<Vec<u8>, ComposeError> {
        let mut target = Composer::with_compression();
        self.compose_head(&mut target)?;
        for record in self.records() {
            record.compose(&mut target)?;
        }
        Ok(target.finish())
    }

    /// Returns the wire format of the message limited to `limit` octets.
    ///
    /// If the complete message is too long, records are dropped from the
    /// end. Additional records are dropped first, then authority records,
    /// and answer records last. OPT and TSIG records are kept if there is
    /// room for them. Whenever records are dropped, the TC bit is set.
    ///
    /// Fails only if the header and question section don’t fit.
    pub fn to_wire_truncated(
        &self,
        limit: usize,
    ) -> Result<Vec<u8>, ComposeError> {
        let full = self.to_wire()?;
        if full.len() <= limit {
            return Ok(full);
        }

        let (mut pseudo, others): (Vec<&Record>, Vec<&Record>) = self
            .additional
            .iter()
            .partition(|record| {
                matches!(record.rtype(), Rtype::OPT | Rtype::TSIG)
            });
        let mut pseudo_len = 0;
        for record in &pseudo {
            let mut tmp = Composer::new();
            record.compose(&mut tmp)?;
            pseudo_len += tmp.len();
        }

        let mut target = Composer::with_compression();
        self.compose_head(&mut target)?;
        if target.len() > limit {
            return Err(ComposeError::ShortBuf);
        }
        if target.len() + pseudo_len > limit {
            pseudo.clear();
            pseudo_len = 0;
        }
        let room = limit - pseudo_len;

        let sections: [Vec<&Record>; 3] = [
            self.answer.iter().collect(),
            self.authority.iter().collect(),
            others,
        ];
        let mut counts = [0u16; 3];
        'sections: for (section, count) in sections.iter().zip(&mut counts) {
            for record in section {
                let pos = target.len();
                record.compose(&mut target)?;
                if target.len() > room {
                    target.truncate(pos);
                    break 'sections;
                }
                *count += 1;
            }
        }
        for record in &pseudo {
            record.compose(&mut target)?;
            counts[2] += 1;
        }

        let mut res = target.finish();
        let mut header = self.header;
        header.set_tc(true);
        res[..4].copy_from_slice(header.as_slice());
        HeaderCounts {
            qdcount: self.question.len() as u16,
            ancount: counts[0],
            nscount: counts[1],
            arcount: counts[2],
        }
        .write_to_message_slice(&mut res);
        Ok(res)
    }

    fn compose_head(&self, target: &mut Composer) -> Result<(), ComposeError> {
        let count = |len: usize| {
            u16::try_from(len).map_err(|_| ComposeError::LongData)
        };
        self.header.compose(target)?;
        HeaderCounts {
            qdcount: count(self.question.len())?,
            ancount: count(self.answer.len())?,
            nscount: count(self.authority.len())?,
            arcount: count(self.additional.len())?,
        }
        .compose(target)?;
        for question in &self.question {
            question.compose(target)?;
        }
        Ok(())
    }

    /// Returns an iterator over the records of all three sections.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.answer
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
    }
}

//--- Display

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let header = self.header;
        write!(
            f,
            ";; opcode: {}, status: {}, id: {}\n;; flags:",
            header.opcode(),
            self.extended_rcode(),
            header.id()
        )?;
        for (set, name) in [
            (header.qr(), "qr"),
            (header.aa(), "aa"),
            (header.tc(), "tc"),
            (header.rd(), "rd"),
            (header.ra(), "ra"),
            (header.ad(), "ad"),
            (header.cd(), "cd"),
        ] {
            if set {
                write!(f, " {}", name)?;
            }
        }
        writeln!(
            f,
            "; QUERY: {}, ANSWER: {}, AUTHORITY: {}, ADDITIONAL: {}",
            self.question.len(),
            self.answer.len(),
            self.authority.len(),
            self.additional.len()
        )?;
        if !self.question.is_empty() {
            writeln!(f, "\n;; QUESTION SECTION:")?;
            for question in &self.question {
                writeln!(f, ";{}", question)?;
            }
        }
        for (section, name) in [
            (&self.answer, "ANSWER"),
            (&self.authority, "AUTHORITY"),
            (&self.additional, "ADDITIONAL"),
        ] {
            if !section.is_empty() {
                writeln!(f, "\n;; {} SECTION:", name)?;
                for record in section {
                    writeln!(f, "{}", record)?;
                }
            }
        }
        Ok(())
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Class;
    use crate::base::serial::Serial;
    use crate::rdata::{Txt, A};
    use core::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn response_with(answers: usize, authority: usize, additional: usize) -> Message {
        let mut msg = Message::query(Question::new_in(
            name("example.com"),
            Rtype::A,
        ))
        .make_response();
        for i in 0..answers {
            msg.answer.push(Record::new(
                name("example.com"),
                Class::IN,
                60,
                A::new([192, 0, 2, i as u8].into()),
            ));
        }
        for i in 0..authority {
            msg.authority.push(Record::new(
                name("example.com"),
                Class::IN,
                60,
                crate::rdata::Ns::new(name(&format!("ns{}.example.com", i))),
            ));
        }
        for i in 0..additional {
            msg.additional.push(Record::new(
                name(&format!("ns{}.example.com", i)),
                Class::IN,
                60,
                A::new([198, 51, 100, i as u8].into()),
            ));
        }
        msg
    }

    #[test]
    fn round_trip_with_compression() {
        let mut msg = response_with(2, 2, 2);
        msg.set_edns(&Edns::new(1232));
        let wire = msg.to_wire().unwrap();
        // Every owner after the question is a single pointer.
        assert_eq!(wire[29..31], [0xc0, 0x0c]);
        assert_eq!(Message::from_octets(&wire).unwrap(), msg);
    }

    #[test]
    fn round_trip_all_types() {
        use crate::base::iana::{
            DigestAlg, Nsec3HashAlg, SecAlg, TsigRcode,
        };
        use crate::rdata::{
            Aaaa, Cname, Dnskey, Ds, Mx, Nsec3, Nsec3param, Ptr, Rrsig,
            RecordData, RtypeBitmap, Time48, Tsig, UnknownRecordData,
        };
        use bytes::Bytes;

        let apex = name("example.com");
        let record = |owner: &str, data: RecordData| {
            Record::new(name(owner), Class::IN, 3600, data)
        };
        let mut msg = response_with(1, 1, 0);
        msg.answer.extend([
            record(
                "example.com",
                Soa::new(
                    name("ns.example.com"),
                    name("admin.example.com"),
                    Serial(2024010101),
                    7200,
                    900,
                    1209600,
                    300,
                )
                .into(),
            ),
            record(
                "host.example.com",
                Aaaa::new("2001:db8::1".parse().unwrap()).into(),
            ),
            record(
                "www.example.com",
                Cname::new(name("host.example.com")).into(),
            ),
            record(
                "1.2.0.192.in-addr.arpa",
                Ptr::new(name("host.example.com")).into(),
            ),
            record(
                "example.com",
                Mx::new(10, name("mail.example.com")).into(),
            ),
            record(
                "example.com",
                Txt::new(vec![
                    Bytes::from_static(b"v=spf1 -all"),
                    Bytes::new(),
                ])
                .into(),
            ),
            record(
                "sub.example.com",
                Ds::new(
                    12345,
                    SecAlg::ED25519,
                    DigestAlg::SHA256,
                    Bytes::from_static(&[0xAB; 32]),
                )
                .into(),
            ),
            record(
                "example.com",
                Dnskey::new(
                    Dnskey::ZONE_KEY,
                    3,
                    SecAlg::ED25519,
                    Bytes::from_static(&[7; 32]),
                )
                .into(),
            ),
            record(
                "example.com",
                Rrsig::new(
                    Rtype::DNSKEY,
                    SecAlg::ED25519,
                    2,
                    3600,
                    Serial(1_700_086_400),
                    Serial(1_700_000_000),
                    12345,
                    apex.clone(),
                    Bytes::from_static(&[9; 64]),
                )
                .into(),
            ),
            record(
                "2t7b4g4vsa5smi47k61mv5bv1a22bojr.example.com",
                Nsec3::new(
                    Nsec3HashAlg::SHA1,
                    Nsec3::OPT_OUT,
                    12,
                    Bytes::from_static(&[0xAA, 0xBB, 0xCC, 0xDD]),
                    Bytes::from_static(&[0x55; 20]),
                    RtypeBitmap::from_types([
                        Rtype::A,
                        Rtype::RRSIG,
                        Rtype::DNSKEY,
                        Rtype::from_int(1234),
                    ]),
                )
                .into(),
            ),
            record(
                "example.com",
                Nsec3param::new(Nsec3HashAlg::SHA1, 0, 0, Bytes::new())
                    .into(),
            ),
            record(
                "example.com",
                UnknownRecordData::from_octets(
                    Rtype::from_int(65280),
                    Bytes::from_static(b"\x00opaque"),
                )
                .into(),
            ),
        ]);
        msg.set_edns(&Edns::new(1232));
        msg.additional.push(Record::new(
            name("xfr.example.com"),
            Class::ANY,
            0,
            Tsig::new(
                name("hmac-sha256"),
                Time48::from_u64(1_700_000_000),
                300,
                Bytes::from_static(&[0x42; 32]),
                msg.header.id(),
                TsigRcode::NOERROR,
                Bytes::new(),
            ),
        ));

        let wire = msg.to_wire().unwrap();
        let parsed = Message::from_octets(&wire).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.to_wire().unwrap(), wire);

        for len in 0..wire.len() {
            assert!(Message::from_octets(&wire[..len]).is_err(), "{}", len);
        }

        for limit in [wire.len() - 1, 512, 300, 100] {
            let short = msg.to_wire_truncated(limit).unwrap();
            assert!(short.len() <= limit, "{}", limit);
            let parsed = Message::from_octets(&short).unwrap();
            assert!(parsed.header.tc(), "{}", limit);
            assert_eq!(parsed.question, msg.question);
        }
    }

    #[test]
    fn count_mismatch() {
        let msg = response_with(2, 0, 0);
        let mut wire = msg.to_wire().unwrap();
        // Claim three answers.
        wire[7] = 3;
        assert_eq!(Message::from_octets(&wire), Err(ParseError::ShortInput));
        // Claim one answer, leaving trailing data.
        wire[7] = 1;
        assert!(matches!(
            Message::from_octets(&wire),
            Err(ParseError::Form(_))
        ));
    }

    #[test]
    fn truncate_at_every_position() {
        let mut msg = response_with(3, 2, 2);
        msg.answer.push(Record::new(
            name("example.com"),
            Class::IN,
            60,
            Txt::from_slice(b"some text"),
        ));
        let wire = msg.to_wire().unwrap();
        for len in 0..wire.len() {
            assert!(Message::from_octets(&wire[..len]).is_err(), "{}", len);
        }
    }

    #[test]
    fn truncated_response() {
        let mut msg = response_with(3, 2, 2);
        msg.set_edns(&Edns::new(512));
        let full = msg.to_wire().unwrap();
        assert_eq!(msg.to_wire_truncated(full.len()).unwrap(), full);

        // Not enough room for the last additional record.
        let wire = msg.to_wire_truncated(full.len() - 1).unwrap();
        assert!(wire.len() < full.len());
        let parsed = Message::from_octets(&wire).unwrap();
        assert!(parsed.header.tc());
        assert_eq!(parsed.answer, msg.answer);
        assert_eq!(parsed.authority, msg.authority);
        assert_eq!(parsed.additional.len(), 2);
        assert!(parsed.edns().is_some());

        // Only room for the question, two answers, and the OPT record.
        let wire = msg.to_wire_truncated(29 + 2 * 16 + 11).unwrap();
        let parsed = Message::from_octets(&wire).unwrap();
        assert!(parsed.header.tc());
        assert_eq!(parsed.answer.len(), 2);
        assert!(parsed.authority.is_empty());
        assert_eq!(parsed.additional.len(), 1);
        assert!(parsed.edns().is_some());

        // Not even the question fits.
        assert_eq!(msg.to_wire_truncated(20), Err(ComposeError::ShortBuf));
    }

    #[test]
    fn pseudo_records_placement() {
        let mut msg = response_with(1, 0, 0);
        msg.answer.push(Edns::new(1232).to_record());
        let wire = msg.to_wire().unwrap();
        assert!(Message::from_octets(&wire).is_err());

        let mut msg = response_with(0, 0, 0);
        msg.additional.push(Edns::new(1232).to_record());
        msg.additional.push(Edns::new(1232).to_record());
        let wire = msg.to_wire().unwrap();
        assert!(Message::from_octets(&wire).is_err());
    }

    #[test]
    fn too_many_records() {
        let mut msg = Message::new();
        let record = Record::new(
            Name::root(),
            Class::IN,
            0,
            A::new([192, 0, 2, 1].into()),
        );
        msg.answer = vec![record; 0x1_0000];
        assert_eq!(msg.to_wire(), Err(ComposeError::LongData));
    }

    #[test]
    fn answer_soa() {
        let mut msg = Message::new();
        msg.answer.push(Record::new(
            name("example.com"),
            Class::IN,
            0,
            Soa::new(
                name("ns.example.com"),
                name("admin.example.com"),
                Serial(5),
                0,
                0,
                0,
                0,
            ),
        ));
        assert_eq!(msg.answer_soa().map(Soa::serial), Some(Serial(5)));
    }
}
