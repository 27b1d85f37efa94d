//! Record data from [RFC 1035]: initial record types.
//!
//! This RFC defines the initial set of record types. Of those, only the
//! ones still relevant for authoritative data are implemented here.
//!
//! [RFC 1035]: https://tools.ietf.org/html/rfc1035

use crate::base::name::Name;
use crate::base::serial::Serial;
use crate::base::wire::{
    parse_slice, ComposeError, Composer, ParseError, Parser,
};
use bytes::Bytes;
use core::fmt;
use std::net::Ipv4Addr;
use std::vec::Vec;

//------------ A -------------------------------------------------------------

/// A record data.
///
/// A records convey the IPv4 address of a host.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct A {
    addr: Ipv4Addr,
}

impl A {
    pub fn new(addr: Ipv4Addr) -> A {
        A { addr }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut buf = [0u8; 4];
        parser.parse_buf(&mut buf)?;
        Ok(A::new(buf.into()))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.addr.octets())
    }
}

impl fmt::Display for A {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.addr.fmt(f)
    }
}

//------------ Single name types ---------------------------------------------

macro_rules! name_type {
    ( $(#[$attr:meta])* $target:ident, $field:ident ) => {
        $(#[$attr])*
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub struct $target {
            $field: Name,
        }

        impl $target {
            pub fn new($field: Name) -> Self {
                $target { $field }
            }

            pub fn $field(&self) -> &Name {
                &self.$field
            }

            pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
                Name::parse(parser).map(Self::new)
            }

            pub fn compose_rdata(
                &self,
                target: &mut Composer,
            ) -> Result<(), ComposeError> {
                target.append_compressed_name(&self.$field)
            }

            pub fn compose_canonical_rdata(
                &self,
                target: &mut Composer,
            ) -> Result<(), ComposeError> {
                target.append_canonical_name(&self.$field)
            }
        }

        impl fmt::Display for $target {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                self.$field.fmt(f)
            }
        }
    }
}

name_type! {
    /// NS record data.
    ///
    /// NS records specify hosts that are authoritative for a class and
    /// domain.
    Ns, nsdname
}

name_type! {
    /// CNAME record data.
    ///
    /// The CNAME record specifies the canonical or primary name for domain
    /// name alias.
    Cname, cname
}

name_type! {
    /// PTR record data.
    ///
    /// PRT records are used in special domains to point to some other
    /// location in the domain space.
    Ptr, ptrdname
}

//------------ Mx ------------------------------------------------------------

/// Mx record data.
///
/// The Mx record specifies a host willing to serve as a mail exchange for
/// the owner name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Mx {
    preference: u16,
    exchange: Name,
}

impl Mx {
    pub fn new(preference: u16, exchange: Name) -> Self {
        Mx {
            preference,
            exchange,
        }
    }

    pub fn preference(&self) -> u16 {
        self.preference
    }

    pub fn exchange(&self) -> &Name {
        &self.exchange
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::new(parser.parse_u16_be()?, Name::parse(parser)?))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.preference.to_be_bytes())?;
        target.append_compressed_name(&self.exchange)
    }

    pub fn compose_canonical_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.preference.to_be_bytes())?;
        target.append_canonical_name(&self.exchange)
    }
}

impl fmt::Display for Mx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.preference, self.exchange)
    }
}

//------------ Soa -----------------------------------------------------------

/// Soa record data.
///
/// SOA records mark the top of a zone and contain information pertinent to
/// name server maintenance operations. The serial is what secondary
/// servers compare to decide whether a zone transfer is necessary.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Soa {
    mname: Name,
    rname: Name,
    serial: Serial,
    refresh: u32,
    retry: u32,
    expire: u32,
    minimum: u32,
}

impl Soa {
    pub fn new(
        mname: Name,
        rname: Name,
        serial: Serial,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    ) -> Self {
        Soa {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        }
    }

    /// The name of the primary name server for this zone.
    pub fn mname(&self) -> &Name {
        &self.mname
    }

    /// The mailbox of the person responsible for this zone.
    pub fn rname(&self) -> &Name {
        &self.rname
    }

    /// The serial number of the original copy of the zone.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn refresh(&self) -> u32 {
        self.refresh
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    pub fn expire(&self) -> u32 {
        self.expire
    }

    pub fn minimum(&self) -> u32 {
        self.minimum
    }

    /// Returns a copy of the data with a different serial.
    pub fn with_serial(&self, serial: Serial) -> Self {
        Soa {
            serial,
            ..self.clone()
        }
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::new(
            Name::parse(parser)?,
            Name::parse(parser)?,
            Serial::parse(parser)?,
            parser.parse_u32_be()?,
            parser.parse_u32_be()?,
            parser.parse_u32_be()?,
            parser.parse_u32_be()?,
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_compressed_name(&self.mname)?;
        target.append_compressed_name(&self.rname)?;
        self.compose_tail(target)
    }

    pub fn compose_canonical_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_canonical_name(&self.mname)?;
        target.append_canonical_name(&self.rname)?;
        self.compose_tail(target)
    }

    fn compose_tail(&self, target: &mut Composer) -> Result<(), ComposeError> {
        self.serial.compose(target)?;
        for value in [self.refresh, self.retry, self.expire, self.minimum] {
            target.append_slice(&value.to_be_bytes())?;
        }
        Ok(())
    }
}

impl fmt::Display for Soa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname,
            self.rname,
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.minimum
        )
    }
}

//------------ Txt -----------------------------------------------------------

/// Txt record data.
///
/// Txt records hold descriptive text as a sequence of character strings
/// of up to 255 octets each. Longer strings can be placed in a value but
/// fail to compose.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Txt {
    strings: Vec<Bytes>,
}

impl Txt {
    pub fn new(strings: Vec<Bytes>) -> Self {
        Txt { strings }
    }

    /// Creates record data holding a single string.
    pub fn from_slice(text: &[u8]) -> Self {
        Txt::new(vec![Bytes::copy_from_slice(text)])
    }

    /// Returns an iterator over the character strings.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.strings.iter().map(AsRef::as_ref)
    }

    /// Returns the concatenated text of all strings.
    pub fn text(&self) -> Vec<u8> {
        self.iter().flatten().copied().collect()
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut strings = Vec::new();
        while parser.remaining() > 0 {
            let len = usize::from(parser.parse_u8()?);
            strings.push(Bytes::copy_from_slice(parse_slice(parser, len)?));
        }
        Ok(Txt::new(strings))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        for item in &self.strings {
            let len =
                u8::try_from(item.len()).map_err(|_| ComposeError::LongData)?;
            target.append_slice(&[len])?;
            target.append_slice(item)?;
        }
        Ok(())
    }
}

impl fmt::Display for Txt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, item) in self.strings.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            f.write_str("\"")?;
            for &ch in item.as_ref() {
                if ch == b'"' || ch == b'\\' {
                    write!(f, "\\{}", ch as char)?;
                } else if !(0x20..0x7F).contains(&ch) {
                    write!(f, "\\{:03}", ch)?;
                } else {
                    write!(f, "{}", ch as char)?;
                }
            }
            f.write_str("\"")?;
        }
        Ok(())
    }
}

//============ Testing =======================================================
