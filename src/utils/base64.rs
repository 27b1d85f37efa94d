//! Decoding and encoding of Base 64.
//!
//! The Base 64 encoding is defined in [RFC 4648]. The DNS uses only the
//! original *base64* variant with padding, so this is what is implemented
//! by the module. It is used for the presentation of keys and signatures
//! and for TSIG secrets in configuration.
//!
//! [RFC 4648]: https://tools.ietf.org/html/rfc4648

use core::fmt;
use std::string::String;
use std::vec::Vec;

const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const PAD: u8 = b'=';

//------------ Convenience Functions -----------------------------------------

/// Decodes a string with *base64* encoded data.
///
/// White space is ignored so that keys split over several lines can be
/// decoded directly.
pub fn decode(s: &str) -> Result<Vec<u8>, DecodeError> {
    let mut res = Vec::with_capacity(s.len() * 3 / 4);
    let mut acc = 0u32;
    let mut bits = 0;
    let mut padding = 0;
    let mut symbols = 0;
    for ch in s.chars() {
        if ch.is_whitespace() {
            continue;
        }
        symbols += 1;
        if ch == PAD as char {
            padding += 1;
            continue;
        }
        if padding > 0 {
            return Err(DecodeError::TrailingInput);
        }
        let value = ALPHABET
            .iter()
            .position(|&sym| sym as char == ch)
            .ok_or(DecodeError::IllegalChar(ch))?;
        acc = (acc << 6) | value as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            res.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    if symbols % 4 != 0 || padding > 2 {
        return Err(DecodeError::ShortInput);
    }
    if acc != 0 {
        return Err(DecodeError::TrailingInput);
    }
    Ok(res)
}

/// Encodes binary data in *base64* and writes it into a format stream.
pub fn display<W: fmt::Write>(bytes: &[u8], f: &mut W) -> fmt::Result {
    for chunk in bytes.chunks(3) {
        let mut buf = [0u8; 3];
        buf[..chunk.len()].copy_from_slice(chunk);
        let value = u32::from(buf[0]) << 16
            | u32::from(buf[1]) << 8
            | u32::from(buf[2]);
        for i in 0..4 {
            if i <= chunk.len() {
                let idx = (value >> (18 - 6 * i)) & 0x3F;
                f.write_char(ALPHABET[idx as usize] as char)?;
            } else {
                f.write_char(PAD as char)?;
            }
        }
    }
    Ok(())
}

/// Encodes binary data in *base64* and returns the encoded data as a string.
pub fn encode_string(bytes: &[u8]) -> String {
    let mut res = String::with_capacity((bytes.len() + 2) / 3 * 4);
    // Writing into a string never fails.
    let _ = display(bytes, &mut res);
    res
}

//------------ serde ---------------------------------------------------------

/// Helper for serializing binary data as *base64* strings with serde.
///
/// Use it via `#[serde(with = "crate::utils::base64::serde")]`.
pub mod serde {
    use std::string::String;
    use std::vec::Vec;

    pub fn serialize<S>(octets: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::Serializer,
    {
        serializer.serialize_str(&super::encode_string(octets))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: ::serde::Deserializer<'de>,
    {
        let s = <String as ::serde::Deserialize>::deserialize(deserializer)?;
        super::decode(&s).map_err(::serde::de::Error::custom)
    }
}

//============ Error Types ===================================================

//------------ DecodeError ---------------------------------------------------

/// An error happened while decoding a base 16, 32 or 64 encoded string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// A character was pushed that isn’t allowed in the encoding.
    IllegalChar(char),

    /// There was trailing data after the encoded data ended.
    TrailingInput,

    /// The input ended in the middle of a group.
    ShortInput,
}

//--- Display and Error

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DecodeError::IllegalChar(ch) => {
                write!(f, "illegal character '{}'", ch)
            }
            DecodeError::TrailingInput => f.write_str("trailing input"),
            DecodeError::ShortInput => f.write_str("incomplete input"),
        }
    }
}

impl std::error::Error for DecodeError {}

//============ Test ==========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vectors() {
        let vectors: &[(&[u8], &str)] = &[
            (b"", ""),
            (b"f", "Zg=="),
            (b"fo", "Zm8="),
            (b"foo", "Zm9v"),
            (b"foob", "Zm9vYg=="),
            (b"fooba", "Zm9vYmE="),
            (b"foobar", "Zm9vYmFy"),
        ];
        for (bin, text) in vectors {
            assert_eq!(encode_string(bin), *text);
            assert_eq!(decode(text).unwrap(), *bin);
        }
    }

    #[test]
    fn bad_input() {
        assert_eq!(decode("Zg="), Err(DecodeError::ShortInput));
        assert_eq!(decode("Zh=="), Err(DecodeError::TrailingInput));
        assert_eq!(decode("Z!=="), Err(DecodeError::IllegalChar('!')));
        assert_eq!(decode("Zg==Zg=="), Err(DecodeError::TrailingInput));
    }

    #[test]
    fn whitespace() {
        assert_eq!(decode("Zm9v\n YmFy").unwrap(), b"foobar");
    }
}
