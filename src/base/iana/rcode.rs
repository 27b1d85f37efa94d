//! DNS response codes and extended response codes.
//!
//! The original DNS specification in [RFC 1035] specified four bits of the
//! message header as response code. EDNS in [RFC 6891] adds another eight
//! bits kept in the OPT record and TSIG in [RFC 8945] uses a sixteen bit
//! error field of its own. There are three types here: [`Rcode`] for the
//! four header bits, [`OptRcode`] for the combined twelve bits, and
//! [`TsigRcode`] for the values found in TSIG records.
//!
//! [RFC 1035]: https://tools.ietf.org/html/rfc1035
//! [RFC 6891]: https://tools.ietf.org/html/rfc6891
//! [RFC 8945]: https://tools.ietf.org/html/rfc8945

//------------ Rcode ---------------------------------------------------------

int_enum! {
    /// DNS Response Codes.
    ///
    /// The response code of a response indicates what happend on the
    /// server when trying to answer the query. Only the lower four bits
    /// are ever used. See [`OptRcode`] for the extended value.
    =>
    Rcode, u8, "RCODE";

    /// No error condition.
    (NOERROR => 0, "NOERROR")

    /// Format error.
    ///
    /// The name server was unable to interpret the query.
    (FORMERR => 1, "FORMERR")

    /// Server failure.
    (SERVFAIL => 2, "SERVFAIL")

    /// Name error.
    ///
    /// The domain name given in the query does not exist at the name server.
    (NXDOMAIN => 3, "NXDOMAIN")

    /// Not implemented.
    (NOTIMP => 4, "NOTIMP")

    /// Query refused.
    (REFUSED => 5, "REFUSED")

    /// Name exists when it should not.
    (YXDOMAIN => 6, "YXDOMAIN")

    /// RR set exists when it should not.
    (YXRRSET => 7, "YXRRSET")

    /// RR set that should exist does not.
    (NXRRSET => 8, "NXRRSET")

    /// Server not authoritative for zone or client not authorized.
    (NOTAUTH => 9, "NOTAUTH")

    /// Name not contained in zone.
    (NOTZONE => 10, "NOTZONE")
}

//------------ OptRcode ------------------------------------------------------

int_enum! {
    /// Extended DNS Response Codes for OPT records.
    ///
    /// The value combines the upper eight bits from the OPT record with
    /// the lower four bits from the header, giving twelve bits.
    =>
    OptRcode, u16, "RCODE";

    (NOERROR => 0, "NOERROR")
    (FORMERR => 1, "FORMERR")
    (SERVFAIL => 2, "SERVFAIL")
    (NXDOMAIN => 3, "NXDOMAIN")
    (NOTIMP => 4, "NOTIMP")
    (REFUSED => 5, "REFUSED")
    (NOTAUTH => 9, "NOTAUTH")

    /// Bad OPT version.
    ///
    /// A name server does not implement the EDNS version requested in the
    /// OPT record.
    (BADVERS => 16, "BADVERS")

    /// Bad or missing server cookie.
    (BADCOOKIE => 23, "BADCOOKIE")
}

impl OptRcode {
    /// Creates a value from the header and OPT parts.
    pub fn from_parts(rcode: Rcode, ext: u8) -> Self {
        OptRcode((u16::from(ext) << 4) | u16::from(rcode.to_int() & 0x0F))
    }

    /// Returns the four bits kept in the message header.
    pub fn rcode(self) -> Rcode {
        Rcode::from_int((self.0 & 0x0F) as u8)
    }

    /// Returns the eight bits kept in the OPT record.
    pub fn ext(self) -> u8 {
        (self.0 >> 4) as u8
    }
}

//------------ TsigRcode -----------------------------------------------------

int_enum! {
    /// Response codes for transaction authentication (TSIG).
    ///
    /// TSIG records contain a sixteen bit error code. The values from
    /// [`Rcode`] apply with their meaning, the values defined below are
    /// specific to TSIG.
    =>
    TsigRcode, u16, "RCODE";

    (NOERROR => 0, "NOERROR")
    (FORMERR => 1, "FORMERR")
    (SERVFAIL => 2, "SERVFAIL")
    (NOTAUTH => 9, "NOTAUTH")

    /// TSIG signature failure.
    (BADSIG => 16, "BADSIG")

    /// Key not recognized.
    (BADKEY => 17, "BADKEY")

    /// Signature out of time window.
    (BADTIME => 18, "BADTIME")

    /// Bad TKEY mode.
    (BADMODE => 19, "BADMODE")

    /// Duplicate key name.
    (BADNAME => 20, "BADNAME")

    /// Algorithm not supported.
    (BADALG => 21, "BADALG")

    /// Bad truncation.
    (BADTRUNC => 22, "BADTRUNC")
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opt_rcode_parts() {
        let rcode = OptRcode::BADVERS;
        assert_eq!(rcode.rcode(), Rcode::NOERROR);
        assert_eq!(rcode.ext(), 1);
        assert_eq!(OptRcode::from_parts(Rcode::NOERROR, 1), rcode);
        assert_eq!(
            OptRcode::from_parts(Rcode::REFUSED, 0),
            OptRcode::REFUSED
        );
    }
}
