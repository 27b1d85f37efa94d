//! Resource record data.
//!
//! Each resource record type has its own definition of the content and
//! formatting of its data. This module provides the data types for the
//! record types used by zone transfers and their authentication, arranged
//! in sub-modules according to the RFC that defined them and re-exported
//! here, as well as [`RecordData`], the enum over all of them.
//!
//! Record data of any other type is kept as an opaque octets sequence in
//! [`UnknownRecordData`].

pub use self::aaaa::Aaaa;
pub use self::dnssec::{Dnskey, Ds, Rrsig, RtypeBitmap};
pub use self::generic::UnknownRecordData;
pub use self::nsec3::{Nsec3, Nsec3param};
pub use self::rfc1035::{Cname, Mx, Ns, Ptr, Soa, Txt, A};
pub use self::tsig::{Time48, Tsig};
pub use crate::base::opt::Opt;

pub mod aaaa;
pub mod dnssec;
pub mod generic;
pub mod nsec3;
pub mod rfc1035;
pub mod tsig;

use crate::base::iana::Rtype;
use crate::base::wire::{ComposeError, Composer, ParseError, Parser};
use core::fmt;

//------------ RecordData ----------------------------------------------------

macro_rules! record_data {
    ( $( $(#[$attr:meta])* $variant:ident($ty:ty) => $rtype:ident, )* ) => {
        /// The data of a resource record.
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub enum RecordData {
            $(
                $(#[$attr])*
                $variant($ty),
            )*

            /// Data of any other record type.
            Unknown(UnknownRecordData),
        }

        impl RecordData {
            /// Returns the record type of the data.
            pub fn rtype(&self) -> Rtype {
                match *self {
                    $(
                        RecordData::$variant(_) => Rtype::$rtype,
                    )*
                    RecordData::Unknown(ref data) => data.rtype(),
                }
            }

            /// Parses record data of the given type.
            ///
            /// The parser must be limited to the record data.
            pub fn parse(
                rtype: Rtype,
                parser: &mut Parser,
            ) -> Result<Self, ParseError> {
                match rtype {
                    $(
                        Rtype::$rtype => {
                            <$ty>::parse(parser).map(RecordData::$variant)
                        }
                    )*
                    _ => {
                        UnknownRecordData::parse(rtype, parser)
                            .map(RecordData::Unknown)
                    }
                }
            }

            /// Appends the wire format of the record data.
            ///
            /// Domain names in the data of the record types defined in
            /// RFC 1035 are compressed if the composer compresses.
            pub fn compose_rdata(
                &self,
                target: &mut Composer,
            ) -> Result<(), ComposeError> {
                match *self {
                    $(
                        RecordData::$variant(ref data) => {
                            data.compose_rdata(target)
                        }
                    )*
                    RecordData::Unknown(ref data) => {
                        data.compose_rdata(target)
                    }
                }
            }
        }

        $(
            impl From<$ty> for RecordData {
                fn from(data: $ty) -> Self {
                    RecordData::$variant(data)
                }
            }
        )*

        impl From<UnknownRecordData> for RecordData {
            fn from(data: UnknownRecordData) -> Self {
                RecordData::Unknown(data)
            }
        }

        //--- Display

        impl fmt::Display for RecordData {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match *self {
                    $(
                        RecordData::$variant(ref data) => {
                            fmt::Display::fmt(data, f)
                        }
                    )*
                    RecordData::Unknown(ref data) => {
                        fmt::Display::fmt(data, f)
                    }
                }
            }
        }
    }
}

record_data! {
    A(A) => A,
    Ns(Ns) => NS,
    Cname(Cname) => CNAME,
    Soa(Soa) => SOA,
    Ptr(Ptr) => PTR,
    Mx(Mx) => MX,
    Txt(Txt) => TXT,
    Aaaa(Aaaa) => AAAA,
    Ds(Ds) => DS,
    Rrsig(Rrsig) => RRSIG,
    Dnskey(Dnskey) => DNSKEY,
    Nsec3(Nsec3) => NSEC3,
    Nsec3param(Nsec3param) => NSEC3PARAM,
    Tsig(Tsig) => TSIG,
    Opt(Opt) => OPT,
}

impl RecordData {
    /// Appends the canonical wire format of the record data.
    ///
    /// This is the format used when calculating DNSSEC signatures: domain
    /// names are never compressed and embedded names of the types listed
    /// in section 6.2 of RFC 4034 are lowercased.
    pub fn compose_canonical_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        match *self {
            RecordData::Ns(ref data) => data.compose_canonical_rdata(target),
            RecordData::Cname(ref data) => {
                data.compose_canonical_rdata(target)
            }
            RecordData::Soa(ref data) => data.compose_canonical_rdata(target),
            RecordData::Ptr(ref data) => data.compose_canonical_rdata(target),
            RecordData::Mx(ref data) => data.compose_canonical_rdata(target),
            RecordData::Rrsig(ref data) => {
                data.compose_canonical_rdata(target)
            }
            _ => {
                let mut plain = Composer::new();
                self.compose_rdata(&mut plain)?;
                target.append_slice(plain.as_slice())
            }
        }
    }

    /// Returns the SOA data if this is an SOA record.
    pub fn as_soa(&self) -> Option<&Soa> {
        match *self {
            RecordData::Soa(ref soa) => Some(soa),
            _ => None,
        }
    }

    pub fn as_rrsig(&self) -> Option<&Rrsig> {
        match *self {
            RecordData::Rrsig(ref rrsig) => Some(rrsig),
            _ => None,
        }
    }

    pub fn as_dnskey(&self) -> Option<&Dnskey> {
        match *self {
            RecordData::Dnskey(ref dnskey) => Some(dnskey),
            _ => None,
        }
    }

    pub fn as_nsec3(&self) -> Option<&Nsec3> {
        match *self {
            RecordData::Nsec3(ref nsec3) => Some(nsec3),
            _ => None,
        }
    }

    pub fn as_tsig(&self) -> Option<&Tsig> {
        match *self {
            RecordData::Tsig(ref tsig) => Some(tsig),
            _ => None,
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::name::Name;
    use core::str::FromStr;

    #[test]
    fn canonical_lowercases_names() {
        let data = RecordData::from(Mx::new(
            10,
            Name::from_str("Mail.Example.COM").unwrap(),
        ));
        let mut target = Composer::with_compression();
        data.compose_canonical_rdata(&mut target).unwrap();
        assert_eq!(target.as_slice(), b"\x00\x0a\x04mail\x07example\x03com\x00");
    }

    #[test]
    fn unknown_types() {
        let mut parser = Parser::from_ref(b"\x01\x02\x03".as_ref());
        let data =
            RecordData::parse(Rtype::from_int(65280), &mut parser).unwrap();
        assert_eq!(data.rtype(), Rtype::from_int(65280));
        assert_eq!(data.to_string(), "\\# 3 010203");
    }
}
