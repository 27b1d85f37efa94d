//! Decoding and encoding of Base 32 with extended hex alphabet.
//!
//! NSEC3 records use the *base32hex* variant of [RFC 4648] for the hashed
//! owner names, both as the first label of the owner name and as the
//! presentation format of the next hashed owner. Unlike the RFC, DNS
//! never uses padding.
//!
//! [RFC 4648]: https://tools.ietf.org/html/rfc4648

use super::base64::DecodeError;
use core::fmt;
use std::string::String;
use std::vec::Vec;

const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

//------------ Convenience Functions -----------------------------------------

/// Decodes a string with *base32hex* encoded data.
///
/// Upper and lower case letters are both accepted. The string must not
/// contain padding.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    decode_hex_slice(s.as_bytes())
}

/// Decodes *base32hex* encoded data given as octets.
///
/// This is used for the first label of NSEC3 owner names.
pub fn decode_hex_slice(s: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut res = Vec::with_capacity(s.len() * 5 / 8);
    let mut acc = 0u32;
    let mut bits = 0;
    for &ch in s {
        let value = match ch {
            b'0'..=b'9' => ch - b'0',
            b'a'..=b'v' => ch - b'a' + 10,
            b'A'..=b'V' => ch - b'A' + 10,
            _ => return Err(DecodeError::IllegalChar(ch as char)),
        };
        acc = (acc << 5) | u32::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            res.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    // Left-over bits must be zero and fewer than a full symbol.
    if bits >= 5 || acc != 0 {
        return Err(DecodeError::TrailingInput);
    }
    Ok(res)
}

/// Encodes binary data in *base32hex* and writes it into a format stream.
pub fn display_hex<W: fmt::Write>(bytes: &[u8], f: &mut W) -> fmt::Result {
    let mut acc = 0u32;
    let mut bits = 0;
    for &ch in bytes {
        acc = (acc << 8) | u32::from(ch);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            f.write_char(ALPHABET[((acc >> bits) & 0x1F) as usize] as char)?;
        }
        acc &= (1 << bits) - 1;
    }
    if bits > 0 {
        f.write_char(ALPHABET[((acc << (5 - bits)) & 0x1F) as usize] as char)?;
    }
    Ok(())
}

/// Encodes binary data in *base32hex* and returns the encoded data as a
/// string.
pub fn encode_string_hex(bytes: &[u8]) -> String {
    let mut res = String::with_capacity((bytes.len() * 8 + 4) / 5);
    // Writing into a string never fails.
    let _ = display_hex(bytes, &mut res);
    res
}

//============ Test ==========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vectors() {
        // From RFC 4648, section 10, without padding.
        let vectors: &[(&[u8], &str)] = &[
            (b"", ""),
            (b"f", "co"),
            (b"fo", "cpng"),
            (b"foo", "cpnmu"),
            (b"foob", "cpnmuog"),
            (b"fooba", "cpnmuoj1"),
            (b"foobar", "cpnmuoj1e8"),
        ];
        for (bin, text) in vectors {
            assert_eq!(encode_string_hex(bin), *text);
            assert_eq!(decode_hex(text).unwrap(), *bin);
            assert_eq!(decode_hex(&text.to_uppercase()).unwrap(), *bin);
        }
    }

    #[test]
    fn bad_input() {
        assert!(decode_hex("w").is_err());
        assert!(decode_hex("c").is_err());
        assert!(decode_hex("cp").is_err());
    }
}
