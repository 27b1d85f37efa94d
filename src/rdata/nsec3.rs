//! Record data from [RFC 5155]: NSEC3 and NSEC3PARAM records.
//!
//! [RFC 5155]: https://tools.ietf.org/html/rfc5155

use super::dnssec::{compose_u8_prefixed, parse_u8_prefixed, RtypeBitmap};
use crate::base::iana::Nsec3HashAlg;
use crate::base::wire::{ComposeError, Composer, ParseError, Parser};
use crate::utils::{base16, base32};
use bytes::Bytes;
use core::fmt;

//------------ Nsec3 ---------------------------------------------------------

/// Nsec3 record data.
///
/// An NSEC3 record states that no names exist whose hash falls between the
/// hash encoded in the record’s owner name and the next hashed owner name.
/// It also lists the types present at the owner.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Nsec3 {
    hash_algorithm: Nsec3HashAlg,
    flags: u8,
    iterations: u16,
    salt: Bytes,
    next_owner: Bytes,
    types: RtypeBitmap,
}

impl Nsec3 {
    /// The opt-out flag.
    pub const OPT_OUT: u8 = 0x01;

    pub fn new(
        hash_algorithm: Nsec3HashAlg,
        flags: u8,
        iterations: u16,
        salt: Bytes,
        next_owner: Bytes,
        types: RtypeBitmap,
    ) -> Self {
        Nsec3 {
            hash_algorithm,
            flags,
            iterations,
            salt,
            next_owner,
            types,
        }
    }

    pub fn hash_algorithm(&self) -> Nsec3HashAlg {
        self.hash_algorithm
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn opt_out(&self) -> bool {
        self.flags & Self::OPT_OUT != 0
    }

    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    pub fn salt(&self) -> &Bytes {
        &self.salt
    }

    /// The unencoded hash of the next owner name in hash order.
    pub fn next_owner(&self) -> &Bytes {
        &self.next_owner
    }

    pub fn types(&self) -> &RtypeBitmap {
        &self.types
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let hash_algorithm = Nsec3HashAlg::parse(parser)?;
        let flags = parser.parse_u8()?;
        let iterations = parser.parse_u16_be()?;
        let salt = parse_u8_prefixed(parser)?;
        let next_owner = parse_u8_prefixed(parser)?;
        if next_owner.is_empty() {
            return Err(ParseError::form_error("empty NSEC3 next owner"));
        }
        let types = RtypeBitmap::parse(parser)?;
        Ok(Self::new(
            hash_algorithm,
            flags,
            iterations,
            salt,
            next_owner,
            types,
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        self.hash_algorithm.compose(target)?;
        target.append_slice(&[self.flags])?;
        target.append_slice(&self.iterations.to_be_bytes())?;
        compose_u8_prefixed(&self.salt, target)?;
        compose_u8_prefixed(&self.next_owner, target)?;
        self.types.compose(target)
    }
}

impl fmt::Display for Nsec3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} ",
            self.hash_algorithm.to_int(),
            self.flags,
            self.iterations
        )?;
        display_salt(&self.salt, f)?;
        f.write_str(" ")?;
        base32::display_hex(&self.next_owner, f)?;
        if !self.types.as_slice().is_empty() {
            write!(f, " {}", self.types)?;
        }
        Ok(())
    }
}

//------------ Nsec3param ----------------------------------------------------

/// Nsec3param record data.
///
/// The record is placed at the apex of a zone and gives the parameters the
/// authoritative servers use for hashing names.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Nsec3param {
    hash_algorithm: Nsec3HashAlg,
    flags: u8,
    iterations: u16,
    salt: Bytes,
}

impl Nsec3param {
    pub fn new(
        hash_algorithm: Nsec3HashAlg,
        flags: u8,
        iterations: u16,
        salt: Bytes,
    ) -> Self {
        Nsec3param {
            hash_algorithm,
            flags,
            iterations,
            salt,
        }
    }

    pub fn hash_algorithm(&self) -> Nsec3HashAlg {
        self.hash_algorithm
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    pub fn salt(&self) -> &Bytes {
        &self.salt
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::new(
            Nsec3HashAlg::parse(parser)?,
            parser.parse_u8()?,
            parser.parse_u16_be()?,
            parse_u8_prefixed(parser)?,
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        self.hash_algorithm.compose(target)?;
        target.append_slice(&[self.flags])?;
        target.append_slice(&self.iterations.to_be_bytes())?;
        compose_u8_prefixed(&self.salt, target)
    }
}

impl fmt::Display for Nsec3param {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} ",
            self.hash_algorithm.to_int(),
            self.flags,
            self.iterations
        )?;
        display_salt(&self.salt, f)
    }
}

fn display_salt(salt: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    if salt.is_empty() {
        f.write_str("-")
    } else {
        base16::display(salt, f)
    }
}

//============ Test ==========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Rtype;

    #[test]
    fn nsec3_display() {
        let nsec3 = Nsec3::new(
            Nsec3HashAlg::SHA1,
            1,
            12,
            Bytes::from_static(b"\xaa\xbb\xcc\xdd"),
            Bytes::from(
                base32::decode_hex("2vptu5timamqttgl4luu9kg21e0aor3s")
                    .unwrap(),
            ),
            RtypeBitmap::from_types([Rtype::A, Rtype::RRSIG]),
        );
        assert!(nsec3.opt_out());
        assert_eq!(
            nsec3.to_string(),
            "1 1 12 AABBCCDD 2vptu5timamqttgl4luu9kg21e0aor3s A RRSIG"
        );
    }

    #[test]
    fn nsec3_long_salt() {
        let nsec3 = Nsec3::new(
            Nsec3HashAlg::SHA1,
            0,
            0,
            Bytes::from(vec![0u8; 256]),
            Bytes::from_static(b"\x01"),
            RtypeBitmap::default(),
        );
        let mut target = Composer::new();
        assert_eq!(
            nsec3.compose_rdata(&mut target),
            Err(ComposeError::LongData)
        );
    }

    #[test]
    fn nsec3param_parse() {
        let mut parser = Parser::from_ref(b"\x01\x00\x00\x0a\x00".as_ref());
        let param = Nsec3param::parse(&mut parser).unwrap();
        assert_eq!(param.iterations(), 10);
        assert!(param.salt().is_empty());
        assert_eq!(param.to_string(), "1 0 10 -");
    }
}
