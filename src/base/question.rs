//! A single question in a DNS message.
//!
//! This module defines the type [`Question`] which represents an entry in
//! the question section of a DNS message.

use super::iana::{Class, Rtype};
use super::name::Name;
use super::wire::{ComposeError, Composer, ParseError, Parser};
use core::fmt;

//------------ Question ------------------------------------------------------

/// A question in a DNS message.
///
/// In DNS, a question describes what is requested in a query. It consists
/// of three elements: a domain name, a record type, and a class. Unlike
/// record types, the query types AXFR, IXFR and ANY are allowed here.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    qname: Name,
    qtype: Rtype,
    qclass: Class,
}

/// # Creation and Conversion
///
impl Question {
    /// Creates a new question from its three componets.
    pub fn new(qname: Name, qtype: Rtype, qclass: Class) -> Self {
        Question {
            qname,
            qtype,
            qclass,
        }
    }

    /// Creates a new question from a name and record type, assuming class IN.
    pub fn new_in(qname: Name, qtype: Rtype) -> Self {
        Self::new(qname, qtype, Class::IN)
    }
}

/// # Field Access
///
impl Question {
    /// Returns a reference to the domain nmae in the question,
    pub fn qname(&self) -> &Name {
        &self.qname
    }

    /// Returns the record type of the question.
    pub fn qtype(&self) -> Rtype {
        self.qtype
    }

    /// Returns the class of the question.
    pub fn qclass(&self) -> Class {
        self.qclass
    }
}

/// # Parsing and Composing
///
impl Question {
    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let qname = Name::parse(parser)?;
        let qtype = Rtype::parse(parser)?;
        if qtype.to_int() == 0 {
            return Err(ParseError::form_error("invalid question type"));
        }
        let qclass = Class::parse(parser)?;
        if !qclass.is_known() {
            return Err(ParseError::form_error("invalid question class"));
        }
        Ok(Question::new(qname, qtype, qclass))
    }

    pub fn compose(&self, target: &mut Composer) -> Result<(), ComposeError> {
        target.append_compressed_name(&self.qname)?;
        self.qtype.compose(target)?;
        self.qclass.compose(target)
    }
}

//--- Display

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.qname, self.qclass, self.qtype)
    }
}

//============ Testing =======================================================
