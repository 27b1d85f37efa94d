//! Resource Records.
//!
//! This module defines [`Record`], a resource record with typed record
//! data. A record’s type is a function of its data, so it cannot be out
//! of sync with it.

use super::iana::{Class, Rtype};
use super::name::Name;
use super::wire::{parse_exact, ComposeError, Composer, ParseError, Parser};
use crate::rdata::RecordData;
use core::fmt;

//------------ Record --------------------------------------------------------

/// A DNS resource record.
///
/// All information available through the DNS is stored in resource records.
/// They have a three part key of a domain name as their owner, a record
/// type, and a class. In addition, they have a time-to-live value and the
/// actual record data.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Record {
    owner: Name,
    class: Class,
    ttl: u32,
    data: RecordData,
}

/// # Creation and Element Access
///
impl Record {
    /// Creates a new record from its parts.
    pub fn new(
        owner: Name,
        class: Class,
        ttl: u32,
        data: impl Into<RecordData>,
    ) -> Self {
        Record {
            owner,
            class,
            ttl,
            data: data.into(),
        }
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// Returns the record type.
    pub fn rtype(&self) -> Rtype {
        self.data.rtype()
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    pub fn into_data(self) -> RecordData {
        self.data
    }
}

/// # Parsing and Composing
///
impl Record {
    /// Parses a record.
    ///
    /// The record data has to take up exactly the length given in the
    /// record header.
    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let owner = Name::parse(parser)?;
        let rtype = Rtype::parse(parser)?;
        if !rtype.is_valid_record_type() {
            return Err(ParseError::form_error("invalid record type"));
        }
        let class = Class::parse(parser)?;
        if rtype != Rtype::OPT && !class.is_known() {
            return Err(ParseError::form_error("invalid record class"));
        }
        let ttl = parser.parse_u32_be()?;
        let rdlen = usize::from(parser.parse_u16_be()?);
        let data = parse_exact(parser, rdlen, |parser| {
            RecordData::parse(rtype, parser)
        })?;
        Ok(Record::new(owner, class, ttl, data))
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_compressed_name(&self.owner)?;
        self.rtype().compose(target)?;
        self.class.compose(target)?;
        target.append_slice(&self.ttl.to_be_bytes())?;
        target.length_prefixed(|target| self.data.compose_rdata(target))
    }
}

//--- Display

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.owner,
            self.ttl,
            self.class,
            self.rtype(),
            self.data
        )
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::rdata::A;
    use core::str::FromStr;

    #[test]
    fn rdlen_is_authoritative() {
        // An A record claiming five octets of data.
        let data = b"\x00\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x05\
                     \xc0\x00\x02\x01\x00";
        let mut parser = Parser::from_ref(data.as_ref());
        assert!(matches!(
            Record::parse(&mut parser),
            Err(ParseError::Form(_))
        ));

        // An A record claiming three octets of data.
        let data = b"\x00\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x03\
                     \xc0\x00\x02\x01";
        let mut parser = Parser::from_ref(data.as_ref());
        assert_eq!(Record::parse(&mut parser), Err(ParseError::ShortInput));
    }

    #[test]
    fn invalid_codes() {
        // Type ANY in a record.
        let data = b"\x00\x00\xff\x00\x01\x00\x00\x0e\x10\x00\x00";
        let mut parser = Parser::from_ref(data.as_ref());
        assert!(Record::parse(&mut parser).is_err());

        // Class 2 in an A record.
        let data = b"\x00\x00\x01\x00\x02\x00\x00\x0e\x10\x00\x04\
                     \xc0\x00\x02\x01";
        let mut parser = Parser::from_ref(data.as_ref());
        assert!(Record::parse(&mut parser).is_err());
    }

    #[test]
    fn display() {
        let record = Record::new(
            Name::from_str("www.example.com").unwrap(),
            Class::IN,
            3600,
            A::new([192, 0, 2, 1].into()),
        );
        assert_eq!(
            record.to_string(),
            "www.example.com.\t3600\tIN\tA\t192.0.2.1"
        );
    }
}
