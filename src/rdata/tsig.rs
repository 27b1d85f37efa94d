//! Record data from [RFC 8945]: TSIG records.
//!
//! This RFC defines the TSIG record type used for signing DNS messages.
//! The processing of these records lives in [`crate::tsig`].
//!
//! [RFC 8945]: https://tools.ietf.org/html/rfc8945

use crate::base::iana::TsigRcode;
use crate::base::name::Name;
use crate::base::wire::{
    parse_slice, ComposeError, Composer, ParseError, Parser,
};
use crate::utils::base64;
use bytes::Bytes;
use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

//------------ Tsig ----------------------------------------------------------

/// Tsig record data.
///
/// The TSIG record is always the last record of a message’s additional
/// section. Its owner is the name of the key, its class ANY and its TTL
/// zero.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tsig {
    /// The signature algorithm as a domain name.
    algorithm: Name,

    /// The Unix epoch time at which the signature was created.
    time_signed: Time48,

    /// Seconds of error perimitted in time signed.
    fudge: u16,

    /// MAC.
    mac: Bytes,

    /// Original message ID.
    original_id: u16,

    /// TSIG response code.
    error: TsigRcode,

    /// Other.
    ///
    /// For a BADTIME error, this contains the server’s current time.
    other: Bytes,
}

impl Tsig {
    pub fn new(
        algorithm: Name,
        time_signed: Time48,
        fudge: u16,
        mac: Bytes,
        original_id: u16,
        error: TsigRcode,
        other: Bytes,
    ) -> Self {
        Tsig {
            algorithm,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other,
        }
    }

    pub fn algorithm(&self) -> &Name {
        &self.algorithm
    }

    pub fn time_signed(&self) -> Time48 {
        self.time_signed
    }

    pub fn fudge(&self) -> u16 {
        self.fudge
    }

    pub fn mac(&self) -> &Bytes {
        &self.mac
    }

    pub fn original_id(&self) -> u16 {
        self.original_id
    }

    pub fn error(&self) -> TsigRcode {
        self.error
    }

    pub fn other(&self) -> &Bytes {
        &self.other
    }

    /// Returns the server time carried in a BADTIME response.
    pub fn other_time(&self) -> Option<Time48> {
        if self.error == TsigRcode::BADTIME && self.other.len() == 6 {
            Some(Time48::from_slice(&self.other))
        } else {
            None
        }
    }

    /// Returns whether the record was signed within `fudge` of `now`.
    pub fn is_valid_at(&self, now: Time48) -> bool {
        now.eq_fudged(self.time_signed, self.fudge.into())
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let algorithm = Name::parse(parser)?;
        let time_signed = Time48::parse(parser)?;
        let fudge = parser.parse_u16_be()?;
        let mac_len = usize::from(parser.parse_u16_be()?);
        let mac = Bytes::copy_from_slice(parse_slice(parser, mac_len)?);
        let original_id = parser.parse_u16_be()?;
        let error = TsigRcode::parse(parser)?;
        let other_len = usize::from(parser.parse_u16_be()?);
        let other = Bytes::copy_from_slice(parse_slice(parser, other_len)?);
        Ok(Self::new(
            algorithm,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other,
        ))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_name(&self.algorithm)?;
        self.time_signed.compose(target)?;
        target.append_slice(&self.fudge.to_be_bytes())?;
        compose_u16_prefixed(&self.mac, target)?;
        target.append_slice(&self.original_id.to_be_bytes())?;
        self.error.compose(target)?;
        compose_u16_prefixed(&self.other, target)
    }
}

fn compose_u16_prefixed(
    data: &[u8],
    target: &mut Composer,
) -> Result<(), ComposeError> {
    let len = u16::try_from(data.len()).map_err(|_| ComposeError::LongData)?;
    target.append_slice(&len.to_be_bytes())?;
    target.append_slice(data)
}

impl fmt::Display for Tsig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} ",
            self.algorithm, self.time_signed, self.fudge
        )?;
        base64::display(&self.mac, f)?;
        write!(f, " {} {}", self.original_id, self.error)
    }
}

//------------ Time48 --------------------------------------------------------

/// A 48-bit Unix timestamp.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Time48(u64);

impl Time48 {
    /// Returns the timestamp of the current moment.
    ///
    /// A clock set before the Unix epoch results in the epoch.
    pub fn now() -> Time48 {
        Time48(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|value| value.as_secs() & 0xFFFF_FFFF_FFFF)
                .unwrap_or(0),
        )
    }

    /// Creates a value from a 64 bit integer.
    ///
    /// The upper 16 bits of the arument must be zero or else this function
    /// panics. This is also why we don’t implement `From`.
    pub fn from_u64(value: u64) -> Self {
        assert!(value & 0xFFFF_0000_0000_0000 == 0);
        Time48(value)
    }

    /// Creates a value from the six octets of its wire format.
    fn from_slice(slice: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf[2..].copy_from_slice(&slice[..6]);
        Time48(u64::from_be_bytes(buf))
    }

    /// Returns the octets of the encoded value in network byte order.
    pub fn into_octets(self) -> [u8; 6] {
        let mut res = [0u8; 6];
        res.copy_from_slice(&self.0.to_be_bytes()[2..]);
        res
    }

    /// Returns whether the time is within a given period.
    ///
    /// Returns `true` iff `other` is at most `fudge` seconds before or after
    /// this value’s time.
    pub fn eq_fudged(self, other: Self, fudge: u64) -> bool {
        self.0.abs_diff(other.0) <= fudge
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut buf = [0u8; 6];
        parser.parse_buf(&mut buf)?;
        Ok(Time48::from_slice(&buf))
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_slice(&self.into_octets())
    }
}

//--- From

impl From<Time48> for u64 {
    fn from(value: Time48) -> u64 {
        value.0
    }
}

//--- Display

impl fmt::Display for Time48 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn time48_octets() {
        let time = Time48::from_u64(0x0102_0304_0506);
        assert_eq!(time.into_octets(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(Time48::from_slice(&[1, 2, 3, 4, 5, 6]), time);
    }

    #[test]
    fn fudge() {
        let now = Time48::from_u64(1000);
        assert!(now.eq_fudged(Time48::from_u64(700), 300));
        assert!(now.eq_fudged(Time48::from_u64(1300), 300));
        assert!(!now.eq_fudged(Time48::from_u64(699), 300));
        assert!(!now.eq_fudged(Time48::from_u64(1301), 300));
    }
}
