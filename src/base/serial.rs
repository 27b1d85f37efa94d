//! Serial numbers.
//!
//! DNS uses 32 bit serial numbers for zone versions and for the validity
//! period of signatures. They are viewed as the 32 bit modulus of a larger
//! number space and therefore need the special rules of [RFC 1982] for
//! comparison and addition. This module provides the type [`Serial`] that
//! implements these rules.
//!
//! [RFC 1982]: https://tools.ietf.org/html/rfc1982

use super::wire::{Compose, ComposeError, Composer, Parse, ParseError, Parser};
use core::cmp::Ordering;
use core::{fmt, str};
use std::time::{SystemTime, UNIX_EPOCH};
use time::{Date, Month, PrimitiveDateTime, Time};

//------------ Serial --------------------------------------------------------

/// A 32 bit number compared in serial number arithmetic.
///
/// The type is used both for the serial of a zone’s SOA record and for
/// the inception and expiration times of RRSIG records, which are seconds
/// since the Unix epoch modulo 2^32.
///
/// Addition is limited to values of up to `2^31 - 1`, so there is no
/// `Add` impl but a dedicated [`add`][Self::add] method.
///
/// Serial numbers only have a partial ordering: for two values exactly
/// 2^31 apart neither is larger. `PartialOrd` expresses exactly that.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Serial(pub u32);

impl Serial {
    /// The current Unix time as a serial.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Returns a serial number for the given point in time.
    ///
    /// Times before the Unix epoch are mapped to the epoch.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_secs())
            .unwrap_or(0);
        Serial(secs as u32)
    }

    /// The raw integer.
    pub fn into_int(self) -> u32 {
        self.0
    }

    /// Adds `other`, wrapping around.
    ///
    /// Panics if `other` exceeds `2^31 - 1`.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: u32) -> Self {
        assert!(other <= 0x7FFF_FFFF);
        Serial(self.0.wrapping_add(other))
    }

    /// Returns whether `self` is strictly newer than `other`.
    ///
    /// Pairs of serials without a defined order are not newer.
    pub fn is_newer_than(self, other: Serial) -> bool {
        self.partial_cmp(&other) == Some(Ordering::Greater)
    }

    /// Parses an RRSIG time given as integer or as `YYYYMMDDHHmmSS`.
    pub fn rrsig_from_str(src: &str) -> Result<Self, IllegalSignatureTime> {
        if !src.is_ascii() {
            return Err(IllegalSignatureTime);
        }
        if src.len() != 14 {
            return src.parse().map_err(|_| IllegalSignatureTime);
        }
        let num = |range: core::ops::Range<usize>| {
            src[range].parse::<u16>().map_err(|_| IllegalSignatureTime)
        };
        let month = Month::try_from(num(4..6)? as u8)
            .map_err(|_| IllegalSignatureTime)?;
        let date = Date::from_calendar_date(
            i32::from(num(0..4)?),
            month,
            num(6..8)? as u8,
        )
        .map_err(|_| IllegalSignatureTime)?;
        let time = Time::from_hms(
            num(8..10)? as u8,
            num(10..12)? as u8,
            num(12..14)? as u8,
        )
        .map_err(|_| IllegalSignatureTime)?;
        Ok(Serial(
            PrimitiveDateTime::new(date, time)
                .assume_utc()
                .unix_timestamp() as u32,
        ))
    }
}

/// # Wire Format
///
impl Serial {
    pub const COMPOSE_LEN: u16 = u32::COMPOSE_LEN;

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        u32::parse(parser).map(Into::into)
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        self.0.compose(target)
    }
}

//--- From and FromStr

impl From<u32> for Serial {
    fn from(value: u32) -> Serial {
        Serial(value)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> u32 {
        serial.0
    }
}

impl str::FromStr for Serial {
    type Err = <u32 as str::FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <u32 as str::FromStr>::from_str(s).map(Into::into)
    }
}

//--- Display

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--- PartialOrd

impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Serial) -> Option<Ordering> {
        // The distance going forward from other to self decides: less than
        // half the number space means self is ahead.
        match self.0.wrapping_sub(other.0) {
            0 => Some(Ordering::Equal),
            0x8000_0000 => None,
            diff if diff < 0x8000_0000 => Some(Ordering::Greater),
            _ => Some(Ordering::Less),
        }
    }
}

//============ Error Types ===================================================

/// A signature time string could not be parsed.
#[derive(Clone, Copy, Debug)]
pub struct IllegalSignatureTime;

impl fmt::Display for IllegalSignatureTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("illegal signature time")
    }
}

impl std::error::Error for IllegalSignatureTime {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn good_addition() {
        assert_eq!(Serial(0).add(4), Serial(4));
        assert_eq!(Serial(0xFFFF_FFFF).add(2), Serial(1));
    }

    #[test]
    #[should_panic]
    fn bad_addition() {
        let _ = Serial(0).add(0x8000_0000);
    }

    #[test]
    fn comparison() {
        use core::cmp::Ordering::*;

        assert_eq!(Serial(12).partial_cmp(&Serial(12)), Some(Equal));
        assert_eq!(Serial(12).partial_cmp(&Serial(13)), Some(Less));
        assert_eq!(Serial(13).partial_cmp(&Serial(12)), Some(Greater));

        // Wrapping around the end of the number space.
        assert_eq!(
            Serial(3_000_000_012).partial_cmp(&Serial(12)),
            Some(Less)
        );
        assert_eq!(
            Serial(12).partial_cmp(&Serial(3_000_000_012)),
            Some(Greater)
        );

        assert_eq!(Serial(1).partial_cmp(&Serial(0x8000_0001)), None);
        assert_eq!(Serial(0x8000_0001).partial_cmp(&Serial(1)), None);
    }

    #[test]
    fn newer() {
        assert!(Serial(5).is_newer_than(Serial(3)));
        assert!(!Serial(3).is_newer_than(Serial(3)));
        assert!(!Serial(3).is_newer_than(Serial(5)));
        assert!(Serial(2).is_newer_than(Serial(0xFFFF_FFF0)));
        assert!(!Serial(1).is_newer_than(Serial(0x8000_0001)));
    }

    #[test]
    fn rrsig_time() {
        assert_eq!(
            Serial::rrsig_from_str("20300101000000").unwrap(),
            Serial(1_893_456_000)
        );
        assert_eq!(
            Serial::rrsig_from_str("1893456000").unwrap(),
            Serial(1_893_456_000)
        );
        assert!(Serial::rrsig_from_str("20301301000000").is_err());
    }
}
