//! Record data for types this crate doesn’t know about.

use crate::base::iana::Rtype;
use crate::base::wire::{
    parse_remaining, ComposeError, Composer, ParseError, Parser,
};
use crate::utils::base16;
use bytes::Bytes;
use core::fmt;

//------------ UnknownRecordData ---------------------------------------------

/// A type for parsing any type of record data.
///
/// This type accepts any record type and stores the plain, unparsed record
/// data as an octets sequence. Because some record types allow compressed
/// domain names in their record data, this type cannot be used safely with
/// these record types. For these record types, the structure of the content
/// needs to be known. [RFC 3597] limits the types for which compressed
/// names are allowed in the record data to those defined in [RFC 1035]
/// itself. Since all of these have types of their own, this type can be
/// used for everything else.
///
/// [RFC 1035]: https://tools.ietf.org/html/rfc1035
/// [RFC 3597]: https://tools.ietf.org/html/rfc3597
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnknownRecordData {
    /// The record type of this data.
    rtype: Rtype,

    /// The record data.
    data: Bytes,
}

impl UnknownRecordData {
    /// Creates generic record data from a bytes value contain the data.
    pub fn from_octets(rtype: Rtype, data: Bytes) -> Self {
        UnknownRecordData { rtype, data }
    }

    /// Returns the record type this data is for.
    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    /// Returns a reference to the record data.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn parse(rtype: Rtype, parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::from_octets(
            rtype,
            Bytes::copy_from_slice(parse_remaining(parser)?),
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.data)
    }
}

impl fmt::Display for UnknownRecordData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\\# {}", self.data.len())?;
        if !self.data.is_empty() {
            f.write_str(" ")?;
            base16::display(&self.data, f)?;
        }
        Ok(())
    }
}
