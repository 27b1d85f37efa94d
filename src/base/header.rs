//! The header of a DNS message.
//!
//! The twelve octets at the start of every message hold the ID, the
//! flags, opcode and rcode, followed by four record counts. See section
//! 4.1.1 of [RFC 1035].
//!
//! Only the first four octets are represented by [`Header`]. The section
//! counts are derived from the section contents when composing a message
//! and are read into [`HeaderCounts`] only while parsing.
//!
//! [RFC 1035]: https://tools.ietf.org/html/rfc1035

use super::iana::{Opcode, Rcode};
use super::wire::{ComposeError, Composer, ParseError, Parser};

//------------ Header --------------------------------------------------------

/// ID, flags, opcode and rcode of a message.
///
/// The four octets are kept exactly as they appear on the wire:
///
/// ```text
///                                 1  1  1  1  1  1
///   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                      ID                       |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |QR|   Opcode  |AA|TC|RD|RA|Z |AD|CD|   RCODE   |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Header {
    inner: [u8; 4],
}

/// # Creation
///
impl Header {
    /// Returns an all-zero header.
    ///
    /// All fields are zero or false. Thus, the opcode will be
    /// [`Opcode::QUERY`] and the response code will be [`Rcode::NOERROR`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the header’s wire format.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }
}

/// # Fields
///
impl Header {
    /// The message ID.
    pub fn id(self) -> u16 {
        u16::from_be_bytes([self.inner[0], self.inner[1]])
    }

    pub fn set_id(&mut self, value: u16) {
        self.inner[..2].copy_from_slice(&value.to_be_bytes())
    }

    /// Sets the ID field to a randomly chosen number.
    pub fn set_random_id(&mut self) {
        self.set_id(rand::random())
    }

    /// Returns whether the QR bit is set, i.e., the message is a response.
    pub fn qr(self) -> bool {
        self.get_bit(2, 7)
    }

    pub fn set_qr(&mut self, set: bool) {
        self.set_bit(2, 7, set)
    }

    pub fn opcode(self) -> Opcode {
        Opcode::from_int((self.inner[2] >> 3) & 0x0F)
    }

    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.inner[2] = self.inner[2] & 0x87 | ((opcode.to_int() & 0x0F) << 3);
    }

    /// Authoritative answer.
    pub fn aa(self) -> bool {
        self.get_bit(2, 2)
    }

    pub fn set_aa(&mut self, set: bool) {
        self.set_bit(2, 2, set)
    }

    /// Truncation.
    pub fn tc(self) -> bool {
        self.get_bit(2, 1)
    }

    pub fn set_tc(&mut self, set: bool) {
        self.set_bit(2, 1, set)
    }

    /// Recursion desired.
    pub fn rd(self) -> bool {
        self.get_bit(2, 0)
    }

    pub fn set_rd(&mut self, set: bool) {
        self.set_bit(2, 0, set)
    }

    /// Recursion available.
    pub fn ra(self) -> bool {
        self.get_bit(3, 7)
    }

    pub fn set_ra(&mut self, set: bool) {
        self.set_bit(3, 7, set)
    }

    /// The reserved Z bit. Must be zero in queries.
    pub fn z(self) -> bool {
        self.get_bit(3, 6)
    }

    pub fn set_z(&mut self, set: bool) {
        self.set_bit(3, 6, set)
    }

    /// Authentic data.
    pub fn ad(self) -> bool {
        self.get_bit(3, 5)
    }

    pub fn set_ad(&mut self, set: bool) {
        self.set_bit(3, 5, set)
    }

    /// Checking disabled.
    pub fn cd(self) -> bool {
        self.get_bit(3, 4)
    }

    pub fn set_cd(&mut self, set: bool) {
        self.set_bit(3, 4, set)
    }

    /// Returns the four bit response code of the header.
    pub fn rcode(self) -> Rcode {
        Rcode::from_int(self.inner[3] & 0x0F)
    }

    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.inner[3] = self.inner[3] & 0xF0 | (rcode.to_int() & 0x0F);
    }

    fn get_bit(self, offset: usize, bit: usize) -> bool {
        self.inner[offset] & (1 << bit) != 0
    }

    fn set_bit(&mut self, offset: usize, bit: usize, set: bool) {
        if set {
            self.inner[offset] |= 1 << bit
        } else {
            self.inner[offset] &= !(1 << bit)
        }
    }
}

/// # Wire Format
///
impl Header {
    pub const COMPOSE_LEN: u16 = 4;

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut res = Self::default();
        parser.parse_buf(&mut res.inner)?;
        Ok(res)
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_slice(&self.inner)
    }
}

//------------ HeaderCounts --------------------------------------------------

/// The record counts of a parsed header.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeaderCounts {
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl HeaderCounts {
    pub const COMPOSE_LEN: u16 = 8;

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(HeaderCounts {
            qdcount: parser.parse_u16_be()?,
            ancount: parser.parse_u16_be()?,
            nscount: parser.parse_u16_be()?,
            arcount: parser.parse_u16_be()?,
        })
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        for count in [self.qdcount, self.ancount, self.nscount, self.arcount] {
            target.append_slice(&count.to_be_bytes())?;
        }
        Ok(())
    }

    /// Reads the counts from the wire format of a complete message.
    pub fn for_message_slice(message: &[u8]) -> Option<Self> {
        let mut parser = Parser::from_ref(message.get(4..12)?);
        Self::parse(&mut parser).ok()
    }

    /// Overwrites the counts in the wire format of a complete message.
    pub fn write_to_message_slice(&self, message: &mut [u8]) {
        if let Some(slice) = message.get_mut(4..12) {
            slice[0..2].copy_from_slice(&self.qdcount.to_be_bytes());
            slice[2..4].copy_from_slice(&self.ancount.to_be_bytes());
            slice[4..6].copy_from_slice(&self.nscount.to_be_bytes());
            slice[6..8].copy_from_slice(&self.arcount.to_be_bytes());
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn getters_and_setters() {
        let mut header = Header::new();
        header.set_id(0x1234);
        header.set_qr(true);
        header.set_opcode(Opcode::NOTIFY);
        header.set_aa(true);
        header.set_rcode(Rcode::NOTAUTH);
        assert_eq!(header.as_slice(), &[0x12, 0x34, 0xA4, 0x09]);
        assert_eq!(header.id(), 0x1234);
        assert!(header.qr());
        assert_eq!(header.opcode(), Opcode::NOTIFY);
        assert!(header.aa());
        assert!(!header.tc());
        assert_eq!(header.rcode(), Rcode::NOTAUTH);

        header.set_qr(false);
        header.set_tc(true);
        header.set_cd(true);
        assert!(!header.qr());
        assert!(header.tc());
        assert!(header.cd());
        assert_eq!(header.opcode(), Opcode::NOTIFY);
    }

    #[test]
    fn counts_in_message() {
        let mut msg = [0u8; 12];
        let counts = HeaderCounts {
            qdcount: 1,
            ancount: 2,
            nscount: 3,
            arcount: 0x0104,
        };
        counts.write_to_message_slice(&mut msg);
        assert_eq!(&msg[4..], &[0, 1, 0, 2, 0, 3, 1, 4]);
        assert_eq!(HeaderCounts::for_message_slice(&msg), Some(counts));
        assert_eq!(HeaderCounts::for_message_slice(&msg[..11]), None);
    }
}
