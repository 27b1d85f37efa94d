//! DNS CLASSes.

//------------ Class ---------------------------------------------------------

int_enum! {
    /// DNS CLASSes.
    ///
    /// The domain name space is partitioned into separate classes for
    /// different network types. In practice, only [`Class::IN`] is used
    /// for data. [`Class::NONE`] and [`Class::ANY`] appear in dynamic
    /// updates and transaction signatures.
    ///
    /// For the currently registered values see the [IANA registration].
    ///
    /// [IANA registration]: http://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-2
    =>
    Class, u16, "CLASS";

    /// Internet (IN).
    (IN => 1, "IN")

    /// Chaosnet (CH).
    (CH => 3, "CH")

    /// Hesiod (HS).
    (HS => 4, "HS")

    /// Query class None.
    ///
    /// Used in dynamic updates to delete record sets, see RFC 2136.
    (NONE => 0xFE, "NONE")

    /// Query class * (ANY).
    ///
    /// This class can be used in a query to indicate that records for the
    /// given name from any class are requested. TSIG records use it, too.
    (ANY => 0xFF, "ANY")
}

impl Class {
    /// Returns whether the class is one this crate accepts on the wire.
    pub fn is_known(self) -> bool {
        self.to_mnemonic_str().is_some()
    }
}

//============ Tests =========================================================
