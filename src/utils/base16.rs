//! Encoding of Base 16, i.e., hexadecimal.
//!
//! Record data without a textual representation of its own, such as
//! digests or the data of unknown record types, is presented in Base 16.

use core::fmt;
use std::string::String;

/// Encodes binary data in Base 16 and writes it into a format stream.
pub fn display<W: fmt::Write>(bytes: &[u8], f: &mut W) -> fmt::Result {
    for ch in bytes {
        write!(f, "{:02X}", ch)?;
    }
    Ok(())
}

/// Encodes binary data in Base 16 and returns the encoded data as a string.
pub fn encode_string(bytes: &[u8]) -> String {
    let mut res = String::with_capacity(bytes.len() * 2);
    // Writing into a string never fails.
    let _ = display(bytes, &mut res);
    res
}

/// Decodes a string of Base 16 encoded data.
///
/// Both upper and lower case digits are accepted.
pub fn decode(s: &str) -> Result<std::vec::Vec<u8>, super::base64::DecodeError> {
    if s.len() % 2 != 0 {
        return Err(super::base64::DecodeError::ShortInput);
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let high = (pair[0] as char).to_digit(16);
            let low = (pair[1] as char).to_digit(16);
            match (high, low) {
                (Some(high), Some(low)) => Ok((high << 4 | low) as u8),
                _ => Err(super::base64::DecodeError::IllegalChar(
                    pair[0] as char,
                )),
            }
        })
        .collect()
}

//============ Test ==========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        assert_eq!(encode_string(b"\x00\x1f\xab"), "001FAB");
        assert_eq!(decode("001fAB").unwrap(), b"\x00\x1f\xab");
        assert!(decode("0").is_err());
        assert!(decode("0g").is_err());
    }
}
