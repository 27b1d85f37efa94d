//! Record data from [RFC 4034]: DS, DNSKEY, and RRSIG records.
//!
//! This RFC defines the record types for DNSSEC. The NSEC3 family lives in
//! the sibling module [`nsec3`][super::nsec3], together with the type
//! bitmap both NSEC and NSEC3 use, which is defined here.
//!
//! [RFC 4034]: https://tools.ietf.org/html/rfc4034

use crate::base::iana::{DigestAlg, Rtype, SecAlg};
use crate::base::name::Name;
use crate::base::serial::Serial;
use crate::base::wire::{
    parse_remaining, parse_slice, ComposeError, Composer, ParseError, Parser,
};
use crate::utils::{base16, base64};
use bytes::Bytes;
use core::fmt;
use std::collections::BTreeSet;
use std::vec::Vec;

//------------ Dnskey --------------------------------------------------------

/// Dnskey record data.
///
/// The DNSKEY record holds a public key used for verifying RRSIG records
/// of a zone. Keys are found at the apex of the zone they sign.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Dnskey {
    flags: u16,
    protocol: u8,
    algorithm: SecAlg,
    public_key: Bytes,
}

impl Dnskey {
    /// The flag for a key that signs zone data.
    pub const ZONE_KEY: u16 = 0x0100;

    /// The flag for a key that has been revoked.
    pub const REVOKED: u16 = 0x0080;

    /// The flag for a secure entry point, a.k.a. key signing key.
    pub const SECURE_ENTRY_POINT: u16 = 0x0001;

    pub fn new(
        flags: u16,
        protocol: u8,
        algorithm: SecAlg,
        public_key: Bytes,
    ) -> Self {
        Dnskey {
            flags,
            protocol,
            algorithm,
            public_key,
        }
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn algorithm(&self) -> SecAlg {
        self.algorithm
    }

    pub fn public_key(&self) -> &Bytes {
        &self.public_key
    }

    /// Returns whether the ZONE flag is set.
    ///
    /// Only keys with this flag may be used to verify signatures over zone
    /// data.
    pub fn is_zone_key(&self) -> bool {
        self.flags & Self::ZONE_KEY != 0
    }

    pub fn is_revoked(&self) -> bool {
        self.flags & Self::REVOKED != 0
    }

    pub fn is_secure_entry_point(&self) -> bool {
        self.flags & Self::SECURE_ENTRY_POINT != 0
    }

    /// Returns the key tag for this key.
    ///
    /// The key tag is a sort of checksum over the record data and is given
    /// in RRSIG and DS records to help find the key that was used. It is
    /// calculated as described in Appendix B of RFC 4034.
    pub fn key_tag(&self) -> u16 {
        let key = self.public_key.as_ref();
        if self.algorithm == SecAlg::RSAMD5 {
            // The third-to-last and second-to-last octets of the key.
            return match key.len() {
                len if len > 2 => {
                    u16::from_be_bytes([key[len - 3], key[len - 2]])
                }
                _ => 0,
            };
        }
        let mut res = u32::from(self.flags);
        res += u32::from(self.protocol) << 8;
        res += u32::from(self.algorithm.to_int());
        for pair in key.chunks(2) {
            res += u32::from(pair[0]) << 8;
            if let Some(&low) = pair.get(1) {
                res += u32::from(low);
            }
        }
        res += (res >> 16) & 0xFFFF;
        (res & 0xFFFF) as u16
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::new(
            parser.parse_u16_be()?,
            parser.parse_u8()?,
            SecAlg::parse(parser)?,
            Bytes::copy_from_slice(parse_remaining(parser)?),
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.flags.to_be_bytes())?;
        target.append_slice(&[self.protocol])?;
        self.algorithm.compose(target)?;
        target.append_slice(&self.public_key)
    }
}

impl fmt::Display for Dnskey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} ", self.flags, self.protocol, self.algorithm)?;
        base64::display(&self.public_key, f)
    }
}

//------------ Rrsig ---------------------------------------------------------

/// Rrsig record data.
///
/// An RRSIG record holds the signature over a record set, i.e., all
/// records of a certain owner, class and type, together with what is
/// needed to find the key and to check the signature’s validity period.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Rrsig {
    type_covered: Rtype,
    algorithm: SecAlg,
    labels: u8,
    original_ttl: u32,
    expiration: Serial,
    inception: Serial,
    key_tag: u16,
    signer_name: Name,
    signature: Bytes,
}

impl Rrsig {
    #[allow(clippy::too_many_arguments)] // XXX Consider changing.
    pub fn new(
        type_covered: Rtype,
        algorithm: SecAlg,
        labels: u8,
        original_ttl: u32,
        expiration: Serial,
        inception: Serial,
        key_tag: u16,
        signer_name: Name,
        signature: Bytes,
    ) -> Self {
        Rrsig {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer_name,
            signature,
        }
    }

    pub fn type_covered(&self) -> Rtype {
        self.type_covered
    }

    pub fn algorithm(&self) -> SecAlg {
        self.algorithm
    }

    /// The number of labels of the original owner name.
    ///
    /// The root and a leading asterisk label are not counted. If the value
    /// is smaller than the number of labels of the owner of the records,
    /// they were synthesized from a wildcard.
    pub fn labels(&self) -> u8 {
        self.labels
    }

    pub fn original_ttl(&self) -> u32 {
        self.original_ttl
    }

    pub fn expiration(&self) -> Serial {
        self.expiration
    }

    pub fn inception(&self) -> Serial {
        self.inception
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn signer_name(&self) -> &Name {
        &self.signer_name
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn set_signature(&mut self, signature: Bytes) {
        self.signature = signature
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::new(
            Rtype::parse(parser)?,
            SecAlg::parse(parser)?,
            parser.parse_u8()?,
            parser.parse_u32_be()?,
            Serial::parse(parser)?,
            Serial::parse(parser)?,
            parser.parse_u16_be()?,
            Name::parse(parser)?,
            Bytes::copy_from_slice(parse_remaining(parser)?),
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        self.compose_head(target, false)?;
        target.append_slice(&self.signature)
    }

    pub fn compose_canonical_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        self.compose_head(target, true)?;
        target.append_slice(&self.signature)
    }

    /// Composes all fields but the signature.
    ///
    /// With `canonical`, the signer name is lowercased. This is the first
    /// part of the data the signature is calculated over.
    pub fn compose_head(
        &self,
        target: &mut Composer,
        canonical: bool,
    ) -> Result<(), ComposeError> {
        self.type_covered.compose(target)?;
        self.algorithm.compose(target)?;
        target.append_slice(&[self.labels])?;
        target.append_slice(&self.original_ttl.to_be_bytes())?;
        self.expiration.compose(target)?;
        self.inception.compose(target)?;
        target.append_slice(&self.key_tag.to_be_bytes())?;
        if canonical {
            target.append_canonical_name(&self.signer_name)
        } else {
            target.append_name(&self.signer_name)
        }
    }
}

impl fmt::Display for Rrsig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} ",
            self.type_covered,
            self.algorithm.to_int(),
            self.labels,
            self.original_ttl,
            self.expiration,
            self.inception,
            self.key_tag,
            self.signer_name
        )?;
        base64::display(&self.signature, f)
    }
}

//------------ Ds -----------------------------------------------------------

/// Ds record data.
///
/// A DS record is placed in the parent zone and refers to a DNSKEY of the
/// child zone via a digest.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Ds {
    key_tag: u16,
    algorithm: SecAlg,
    digest_type: DigestAlg,
    digest: Bytes,
}

impl Ds {
    pub fn new(
        key_tag: u16,
        algorithm: SecAlg,
        digest_type: DigestAlg,
        digest: Bytes,
    ) -> Self {
        Ds {
            key_tag,
            algorithm,
            digest_type,
            digest,
        }
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn algorithm(&self) -> SecAlg {
        self.algorithm
    }

    pub fn digest_type(&self) -> DigestAlg {
        self.digest_type
    }

    pub fn digest(&self) -> &Bytes {
        &self.digest
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Self::new(
            parser.parse_u16_be()?,
            SecAlg::parse(parser)?,
            DigestAlg::parse(parser)?,
            Bytes::copy_from_slice(parse_remaining(parser)?),
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.key_tag.to_be_bytes())?;
        self.algorithm.compose(target)?;
        self.digest_type.compose(target)?;
        target.append_slice(&self.digest)
    }
}

impl fmt::Display for Ds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} ",
            self.key_tag,
            self.algorithm.to_int(),
            self.digest_type.to_int()
        )?;
        base16::display(&self.digest, f)
    }
}

//------------ RtypeBitmap ---------------------------------------------------

/// The type bitmap of NSEC and NSEC3 records.
///
/// The bitmap lists the record types present at a name. It is kept in its
/// wire format: a sequence of windows, each consisting of the window
/// number, the length of the window’s bitmap, and the bitmap itself.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct RtypeBitmap(Bytes);

impl RtypeBitmap {
    /// Creates a bitmap for the given types.
    pub fn from_types<I: IntoIterator<Item = Rtype>>(types: I) -> Self {
        let types: BTreeSet<u16> =
            types.into_iter().map(Rtype::to_int).collect();
        let mut res = Vec::new();
        let mut window: Option<(u8, [u8; 32], usize)> = None;
        for rtype in types {
            let (high, low) = ((rtype >> 8) as u8, (rtype & 0xFF) as usize);
            match window {
                Some((num, _, _)) if num == high => {}
                _ => {
                    if let Some((num, bits, len)) = window.take() {
                        Self::push_window(&mut res, num, &bits[..len]);
                    }
                    window = Some((high, [0; 32], 0));
                }
            }
            if let Some((_, ref mut bits, ref mut len)) = window {
                bits[low >> 3] |= 0x80 >> (low & 0x07);
                *len = (low >> 3) + 1;
            }
        }
        if let Some((num, bits, len)) = window {
            Self::push_window(&mut res, num, &bits[..len]);
        }
        RtypeBitmap(res.into())
    }

    fn push_window(target: &mut Vec<u8>, num: u8, bits: &[u8]) {
        target.push(num);
        target.push(bits.len() as u8);
        target.extend_from_slice(bits);
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Returns whether the bitmap contains the given type.
    pub fn contains(&self, rtype: Rtype) -> bool {
        self.iter().any(|item| item == rtype)
    }

    /// Returns an iterator over the types in the bitmap.
    pub fn iter(&self) -> impl Iterator<Item = Rtype> + '_ {
        self.windows().flat_map(|(num, bits)| {
            bits.iter().enumerate().flat_map(move |(idx, &octet)| {
                (0..8).filter(move |bit| octet & (0x80 >> bit) != 0).map(
                    move |bit| {
                        Rtype::from_int(
                            u16::from(num) << 8 | (idx * 8 + bit) as u16,
                        )
                    },
                )
            })
        })
    }

    fn windows(&self) -> impl Iterator<Item = (u8, &[u8])> + '_ {
        let mut data = self.as_slice();
        core::iter::from_fn(move || {
            let (&num, rest) = data.split_first()?;
            let (&len, rest) = rest.split_first()?;
            let (bits, rest) = rest.split_at(usize::from(len));
            data = rest;
            Some((num, bits))
        })
    }

    /// Parses a bitmap taking up the rest of the parser.
    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let data = parse_remaining(parser)?;
        let mut rest = data;
        let mut last: Option<u8> = None;
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(ParseError::ShortInput);
            }
            let (num, len) = (rest[0], usize::from(rest[1]));
            if last.map(|last| num <= last).unwrap_or(false) {
                return Err(ParseError::form_error(
                    "type bitmap windows out of order",
                ));
            }
            if len == 0 || len > 32 {
                return Err(ParseError::form_error(
                    "invalid type bitmap window length",
                ));
            }
            rest = rest.get(2 + len..).ok_or(ParseError::ShortInput)?;
            last = Some(num);
        }
        Ok(RtypeBitmap(Bytes::copy_from_slice(data)))
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_slice(self.as_slice())
    }
}

impl fmt::Display for RtypeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, rtype) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", rtype)?;
        }
        Ok(())
    }
}

/// Takes a sequence of octets preceded by its length in a single octet.
pub(super) fn parse_u8_prefixed(
    parser: &mut Parser,
) -> Result<Bytes, ParseError> {
    let len = usize::from(parser.parse_u8()?);
    Ok(Bytes::copy_from_slice(parse_slice(parser, len)?))
}

/// Appends a sequence of octets preceded by its length in a single octet.
pub(super) fn compose_u8_prefixed(
    data: &[u8],
    target: &mut Composer,
) -> Result<(), ComposeError> {
    let len = u8::try_from(data.len()).map_err(|_| ComposeError::LongData)?;
    target.append_slice(&[len])?;
    target.append_slice(data)
}

//============ Test ==========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::base64;

    #[test]
    fn dnskey_key_tag() {
        // The KSK of the root zone from 2017, key tag 20326.
        let key = base64::decode(
            "AwEAAaz/tAm8yTn4Mfeh5eyI96WSVexTBAvkMgJzkKTOiW1vkIbzxeF3\
             +/4RgWOq7HrxRixHlFlExOLAJr5emLvN7SWXgnLh4+B5xQlNVz8Og8kv\
             ArMtNROxVQuCaSnIDdD5LKyWbRd2n9WGe2R8PzgCmr3EgVLrjyBxWezF\
             0jLHwVN8efS3rCj/EWgvIWgb9tarpVUDK/b58Da+sqqls3eNbuv7pr+e\
             oZG+SrDK6nWeL3c6H5Apxz7LjVc1uTIdsIXxuOLYA4/ilBmSVIzuDWfd\
             RUfhHdY6+cn8HFRm+2hM8AnXGXws9555KrUB5qihylGa8subX2Nn6UwN\
             R1AkUTV74bU=",
        )
        .unwrap();
        let dnskey = Dnskey::new(257, 3, SecAlg::RSASHA256, key.into());
        assert_eq!(dnskey.key_tag(), 20326);
        assert!(dnskey.is_zone_key());
        assert!(dnskey.is_secure_entry_point());
        assert!(!dnskey.is_revoked());
    }

    #[test]
    fn bitmap_round_trip() {
        let bitmap = RtypeBitmap::from_types([
            Rtype::A,
            Rtype::MX,
            Rtype::RRSIG,
            Rtype::NSEC3PARAM,
            Rtype::from_int(1234),
        ]);
        // Example from RFC 4034, section 4.3, extended by a second window.
        assert_eq!(
            bitmap.as_slice(),
            b"\x00\x07\x40\x01\x00\x00\x00\x02\x10\
              \x04\x1b\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
              \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
              \x20"
        );
        let types: Vec<_> = bitmap.iter().collect();
        assert_eq!(
            types,
            [
                Rtype::A,
                Rtype::MX,
                Rtype::RRSIG,
                Rtype::NSEC3PARAM,
                Rtype::from_int(1234)
            ]
        );
        assert!(bitmap.contains(Rtype::MX));
        assert!(!bitmap.contains(Rtype::AAAA));

        let mut parser = Parser::from_ref(bitmap.as_slice());
        assert_eq!(RtypeBitmap::parse(&mut parser).unwrap(), bitmap);
    }

    #[test]
    fn bitmap_bad_windows() {
        let mut parser = Parser::from_ref(b"\x01\x01\x40\x00\x01\x40".as_ref());
        assert!(RtypeBitmap::parse(&mut parser).is_err());
        let mut parser = Parser::from_ref(b"\x00\x00".as_ref());
        assert!(RtypeBitmap::parse(&mut parser).is_err());
        let mut parser = Parser::from_ref(b"\x00\x02\x40".as_ref());
        assert_eq!(
            RtypeBitmap::parse(&mut parser),
            Err(ParseError::ShortInput)
        );
    }
}
