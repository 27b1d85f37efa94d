//! IANA Definitions for DNS.
//!
//! This module contains types for parameters defined in IANA registries
//! that are relevant for this crate.
//!
//! All types defined hereunder follow the same basic structure. They are
//! newtypes around the raw integer with associated constants for all the
//! well-defined values. Since we cannot restrict that integer to only the
//! defined values, the full set of possible values is allowed.
//!
//! There are two methods `from_int()` and `to_int()` to convert from and
//! to raw integer values as well as implementations of the `From` trait
//! for these. Types also implement a `parse()` function for creation from
//! wire format and a `compose()` method for composing into wire format.
//!
//! While each parameter type has a module of its own, they are all
//! re-exported here.

pub use self::class::Class;
pub use self::digestalg::DigestAlg;
pub use self::nsec3::Nsec3HashAlg;
pub use self::opcode::Opcode;
pub use self::rcode::{OptRcode, Rcode, TsigRcode};
pub use self::rtype::Rtype;
pub use self::secalg::SecAlg;

#[macro_use]
mod macros;

pub mod class;
pub mod digestalg;
pub mod nsec3;
pub mod opcode;
pub mod rcode;
pub mod rtype;
pub mod secalg;
