//! DNS OpCodes

//------------ Opcode --------------------------------------------------------

int_enum! {
    /// DNS OpCodes.
    ///
    /// The opcode specifies the kind of query to be performed. It occupies
    /// four bits of the message header, values above 15 cannot be
    /// represented.
    ///
    /// For the currently registered values see the [IANA registration].
    ///
    /// [IANA registration]: http://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-5
    =>
    Opcode, u8, "OPCODE";

    /// A standard query (0).
    (QUERY => 0, "QUERY")

    /// An inverse query (IQUERY) (1, obsolete).
    (IQUERY => 1, "IQUERY")

    /// A server status request (2).
    (STATUS => 2, "STATUS")

    /// A NOTIFY query (4).
    ///
    /// NOTIFY messages inform secondary servers about changes to a zone.
    /// See RFC 1996.
    (NOTIFY => 4, "NOTIFY")

    /// An UPDATE query (5).
    (UPDATE => 5, "UPDATE")

    /// DNS Stateful Operations (DSO) (6).
    (DSO => 6, "DSO")
}
