//! Record data for OPT records and the EDNS information they carry.
//!
//! Since DNS message headers are relatively short, the amount of information
//! that can be conveyed through them is very limited. In order to provide an
//! extensible means to transmit additional information, [RFC 6891] introduces
//! a resource record called OPT that can be added to the additional section
//! of a message. The record data in turn consists of a sequence of options.
//!
//! Some of the information is kept in the record header: the class field
//! holds the requestor’s UDP payload size and the TTL field holds the upper
//! bits of the extended response code, the EDNS version and flags. The type
//! [`Edns`] collects all of it.
//!
//! [RFC 6891]: https://tools.ietf.org/html/rfc6891

use super::iana::{Class, OptRcode, Rcode};
use super::name::Name;
use super::record::Record;
use super::wire::{parse_slice, ComposeError, Composer, ParseError, Parser};
use crate::rdata::RecordData;
use bytes::Bytes;
use core::fmt;
use std::vec::Vec;

/// The UDP payload size assumed in the absence of EDNS.
pub const DEFAULT_UDP_PAYLOAD_SIZE: u16 = 512;

//------------ Opt -----------------------------------------------------------

/// OPT record data.
///
/// A sequence of options, each consisting of an option code and the option
/// data. The options are not interpreted.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Opt {
    options: Vec<EdnsOption>,
}

impl Opt {
    pub fn new(options: Vec<EdnsOption>) -> Self {
        Opt { options }
    }

    pub fn options(&self) -> &[EdnsOption] {
        &self.options
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut options = Vec::new();
        while parser.remaining() > 0 {
            let code = parser.parse_u16_be()?;
            let len = usize::from(parser.parse_u16_be()?);
            let data = Bytes::copy_from_slice(parse_slice(parser, len)?);
            options.push(EdnsOption { code, data });
        }
        Ok(Opt { options })
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        for option in &self.options {
            target.append_slice(&option.code.to_be_bytes())?;
            let len = u16::try_from(option.data.len())
                .map_err(|_| ComposeError::LongData)?;
            target.append_slice(&len.to_be_bytes())?;
            target.append_slice(&option.data)?;
        }
        Ok(())
    }
}

impl fmt::Display for Opt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for option in &self.options {
            write!(f, "{}:{} ", option.code, option.data.len())?;
        }
        Ok(())
    }
}

//------------ EdnsOption ----------------------------------------------------

/// A single option of an OPT record.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Bytes,
}

//------------ Edns ----------------------------------------------------------

/// The EDNS information of a message.
///
/// A value is created from the OPT record of a message via
/// [`from_record`][Self::from_record] and turned back into one via
/// [`to_record`][Self::to_record].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Edns {
    udp_payload_size: u16,
    ext_rcode: u8,
    version: u8,
    flags: u16,
    options: Vec<EdnsOption>,
}

impl Edns {
    /// The DNSSEC OK flag.
    pub const DO: u16 = 0x8000;

    /// Creates a new value with the given UDP payload size.
    pub fn new(udp_payload_size: u16) -> Self {
        Edns {
            udp_payload_size,
            ext_rcode: 0,
            version: 0,
            flags: 0,
            options: Vec::new(),
        }
    }

    /// Returns the EDNS information of an OPT record.
    ///
    /// Returns `None` if the record isn’t an OPT record.
    pub fn from_record(record: &Record) -> Option<Self> {
        let opt = match record.data() {
            RecordData::Opt(opt) => opt,
            _ => return None,
        };
        let ttl = record.ttl().to_be_bytes();
        Some(Edns {
            udp_payload_size: record.class().to_int(),
            ext_rcode: ttl[0],
            version: ttl[1],
            flags: u16::from_be_bytes([ttl[2], ttl[3]]),
            options: opt.options().to_vec(),
        })
    }

    /// Returns the OPT record for this information.
    pub fn to_record(&self) -> Record {
        let ttl = u32::from_be_bytes([
            self.ext_rcode,
            self.version,
            (self.flags >> 8) as u8,
            self.flags as u8,
        ]);
        Record::new(
            Name::root(),
            Class::from_int(self.udp_payload_size),
            ttl,
            RecordData::Opt(Opt::new(self.options.clone())),
        )
    }

    /// The requestor’s UDP payload size.
    ///
    /// Values below 512 are to be treated as 512.
    pub fn udp_payload_size(&self) -> u16 {
        self.udp_payload_size.max(DEFAULT_UDP_PAYLOAD_SIZE)
    }

    pub fn set_udp_payload_size(&mut self, size: u16) {
        self.udp_payload_size = size
    }

    /// The upper eight bits of the extended response code.
    pub fn ext_rcode(&self) -> u8 {
        self.ext_rcode
    }

    /// Returns the full response code given the header’s part.
    pub fn rcode(&self, header: Rcode) -> OptRcode {
        OptRcode::from_parts(header, self.ext_rcode)
    }

    /// Sets the upper bits of the response code.
    ///
    /// Returns the bits that go into the message header.
    pub fn set_rcode(&mut self, rcode: OptRcode) -> Rcode {
        self.ext_rcode = rcode.ext();
        rcode.rcode()
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn set_version(&mut self, version: u8) {
        self.version = version
    }

    /// Returns whether the DNSSEC OK bit is set.
    pub fn dnssec_ok(&self) -> bool {
        self.flags & Self::DO != 0
    }

    pub fn set_dnssec_ok(&mut self, value: bool) {
        if value {
            self.flags |= Self::DO
        } else {
            self.flags &= !Self::DO
        }
    }

    pub fn options(&self) -> &[EdnsOption] {
        &self.options
    }

    pub fn push_option(&mut self, code: u16, data: Bytes) {
        self.options.push(EdnsOption { code, data })
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_conversion() {
        let mut edns = Edns::new(1232);
        edns.set_dnssec_ok(true);
        edns.set_version(0);
        let header = edns.set_rcode(OptRcode::BADVERS);
        assert_eq!(header, Rcode::NOERROR);
        edns.push_option(10, Bytes::from_static(b"cookie42"));

        let record = edns.to_record();
        assert_eq!(record.owner(), &Name::root());
        assert_eq!(record.class().to_int(), 1232);
        assert_eq!(record.ttl(), 0x0100_8000);

        let back = Edns::from_record(&record).unwrap();
        assert_eq!(back, edns);
        assert!(back.dnssec_ok());
        assert_eq!(back.rcode(Rcode::NOERROR), OptRcode::BADVERS);
    }

    #[test]
    fn small_payload_size() {
        assert_eq!(Edns::new(100).udp_payload_size(), 512);
    }
}
