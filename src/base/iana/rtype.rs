//! Resource Record (RR) TYPEs

//------------ Rtype ---------------------------------------------------------

int_enum! {
    /// Resource Record Types.
    ///
    /// Each resource records has a 16 bit type value indicating what kind
    /// of information is represented by the record. Normal query includes
    /// the type of record information is requested for. A few aditional
    /// types, called query types, are defined as well and can only be used
    /// in questions.
    ///
    /// Only the types this crate knows something about are given
    /// constants. All other values are carried as generic record data.
    ///
    /// For the currently registered values see the [IANA registration].
    ///
    /// [IANA registration]: http://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
    =>
    Rtype, u16, "TYPE";

    /// A host address.
    (A => 1, "A")

    /// An authoritative name server.
    (NS => 2, "NS")

    /// The canonical name for an alias.
    (CNAME => 5, "CNAME")

    /// Marks the start of a zone of authority.
    (SOA => 6, "SOA")

    /// A domain name pointer.
    (PTR => 12, "PTR")

    /// Host information.
    (HINFO => 13, "HINFO")

    /// Mail exchange.
    (MX => 15, "MX")

    /// Text strings.
    (TXT => 16, "TXT")

    /// IPv6 address.
    (AAAA => 28, "AAAA")

    /// Server selection.
    (SRV => 33, "SRV")

    /// OPT pseudo-record for EDNS.
    (OPT => 41, "OPT")

    /// Delegation signer.
    (DS => 43, "DS")

    /// RRSIG.
    (RRSIG => 46, "RRSIG")

    /// NSEC.
    (NSEC => 47, "NSEC")

    /// DNSKEY.
    (DNSKEY => 48, "DNSKEY")

    /// NSEC3.
    (NSEC3 => 50, "NSEC3")

    /// NSEC3PARAM.
    (NSEC3PARAM => 51, "NSEC3PARAM")

    /// Transaction key.
    (TKEY => 249, "TKEY")

    /// Transaction signature.
    (TSIG => 250, "TSIG")

    /// Incremental transfer.
    (IXFR => 251, "IXFR")

    /// Transfer of entire zone.
    (AXFR => 252, "AXFR")

    /// Mailbox-related RRs (MB, MG, or MR).
    (MAILB => 253, "MAILB")

    /// Mail agent RRs (obsolete).
    (MAILA => 254, "MAILA")

    /// A request for all records the server/cache has available.
    (ANY => 255, "ANY")
}

impl Rtype {
    /// Returns whether the type may only appear in questions.
    pub fn is_query_only(self) -> bool {
        matches!(
            self,
            Rtype::IXFR | Rtype::AXFR | Rtype::MAILB | Rtype::MAILA | Rtype::ANY
        )
    }

    /// Returns whether the type can be the type of a record.
    pub fn is_valid_record_type(self) -> bool {
        self.to_int() != 0 && !self.is_query_only()
    }

    /// Returns whether the type is a pseudo type only used in messages.
    pub fn is_pseudo(self) -> bool {
        matches!(self, Rtype::OPT | Rtype::TSIG | Rtype::TKEY)
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::Rtype;

    #[test]
    fn record_types() {
        assert!(Rtype::A.is_valid_record_type());
        assert!(Rtype::from_int(65280).is_valid_record_type());
        assert!(!Rtype::from_int(0).is_valid_record_type());
        assert!(!Rtype::AXFR.is_valid_record_type());
        assert_eq!(Rtype::from_int(65280).to_string(), "TYPE65280");
        assert_eq!(format!("{:?}", Rtype::NSEC3), "Rtype::NSEC3");
    }
}
