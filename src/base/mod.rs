//! Basics.
//!
//! This module provides types for working with DNS data. The types allow
//! creating such data from scratch and processing it. Crucially, the
//! module provides means to extract the data from wire-format DNS messages
//! and assemble such messages.
//!
//! ## Parsing and Composing Messages
//!
//! In order to easily distinguish the process of creating and dissecting
//! wire-format messages from other forms of representation conversion, we
//! use the term *parsing* for extracting data from a wire-format
//! representation and *composing* for producing such a representation.
//!
//! Both parsing and composing happen on buffers holding a complete DNS
//! message. This seems to be a reasonable choice given the limited
//! size of DNS messages and the complexities introduced by compressing
//! domain names in messages by referencing other parts of the message.
//! The fundamental types for parsing and composing live in the [wire]
//! module.
//!
//! Unlike the wire format, a [`Message`] is a fully decoded value: all
//! names are decompressed and all record data is typed. It is created from
//! wire format via [`Message::from_octets`] and turned back into it via
//! [`Message::to_wire`].
//!
//! # Types for DNS Data
//!
//! The module contains a number of types for DNS data, both fundamental
//! and composed. They are arranged in submodules:
//!
//! * [header] for the header of DNS messages,
//! * [name] for domain names,
//! * [opt] for the record data of OPT records used in EDNS,
//! * [question] for questions,
//! * [serial] for serial numbers of zones, and
//! * [record] for DNS resource records.
//!
//! The data of the individual record types lives in [crate::rdata].

pub use self::header::{Header, HeaderCounts};
pub use self::message::Message;
pub use self::name::Name;
pub use self::opt::Edns;
pub use self::question::Question;
pub use self::record::Record;
pub use self::serial::Serial;
pub use self::wire::{ComposeError, ParseError};

pub mod header;
pub mod iana;
pub mod message;
pub mod name;
pub mod opt;
pub mod question;
pub mod record;
pub mod serial;
pub mod wire;
