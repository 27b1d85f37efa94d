//! Record data from [RFC 3596]: AAAA records.
//!
//! [RFC 3596]: https://tools.ietf.org/html/rfc3596

use crate::base::wire::{ComposeError, Composer, ParseError, Parser};
use core::fmt;
use std::net::Ipv6Addr;

//------------ Aaaa ---------------------------------------------------------

/// Aaaa record data.
///
/// Aaaa records convey the IPv6 address of a host.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Aaaa {
    addr: Ipv6Addr,
}

impl Aaaa {
    pub fn new(addr: Ipv6Addr) -> Aaaa {
        Aaaa { addr }
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut buf = [0u8; 16];
        parser.parse_buf(&mut buf)?;
        Ok(Self::new(buf.into()))
    }

    pub fn compose_rdata(
        &self,
        target: &mut Composer,
    ) -> Result<(), ComposeError> {
        target.append_slice(&self.addr.octets())
    }
}

impl fmt::Display for Aaaa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
