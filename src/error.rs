//! The crate-wide error type.
//!
//! The individual modules have their own, more specific error types. The
//! [`Error`] type collects them into the four kinds of failure the crate
//! distinguishes, which is handy when processing a message passes through
//! several of the modules.

use crate::base::wire::{ComposeError, ParseError};
use crate::net::server::ProtocolViolation;
use crate::net::xfr::TransferError;
use crate::tsig::ValidationError;
use crate::validate::nsec3::DenialError;
use crate::validate::DnssecError;
use std::{error, fmt};

//------------ Error ---------------------------------------------------------

/// Something went wrong.
#[derive(Debug)]
pub enum Error {
    /// Wire-format data could not be parsed or composed.
    Format(FormatError),

    /// Authentication of a message or zone data failed.
    Authentication(AuthError),

    /// A zone transfer failed.
    Transfer(TransferError),

    /// A peer violated the protocol.
    Protocol(ProtocolViolation),
}

//--- From

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Format(FormatError::Parse(err))
    }
}

impl From<ComposeError> for Error {
    fn from(err: ComposeError) -> Self {
        Error::Format(FormatError::Compose(err))
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Authentication(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Authentication(err.into())
    }
}

impl From<DnssecError> for Error {
    fn from(err: DnssecError) -> Self {
        Error::Authentication(err.into())
    }
}

impl From<DenialError> for Error {
    fn from(err: DenialError) -> Self {
        Error::Authentication(err.into())
    }
}

impl From<TransferError> for Error {
    fn from(err: TransferError) -> Self {
        Error::Transfer(err)
    }
}

impl From<ProtocolViolation> for Error {
    fn from(err: ProtocolViolation) -> Self {
        Error::Protocol(err)
    }
}

//--- Display and Error

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Format(err) => write!(f, "format error: {}", err),
            Error::Authentication(err) => {
                write!(f, "authentication error: {}", err)
            }
            Error::Transfer(err) => write!(f, "transfer error: {}", err),
            Error::Protocol(err) => write!(f, "protocol violation: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Format(err) => Some(err),
            Error::Authentication(err) => Some(err),
            Error::Transfer(err) => Some(err),
            Error::Protocol(err) => Some(err),
        }
    }
}

//------------ FormatError ---------------------------------------------------

/// Wire-format data could not be processed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormatError {
    Parse(ParseError),
    Compose(ComposeError),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormatError::Parse(err) => err.fmt(f),
            FormatError::Compose(err) => err.fmt(f),
        }
    }
}

impl error::Error for FormatError {}

//------------ AuthError -----------------------------------------------------

/// Authentication failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthError {
    /// A TSIG signature was missing, wrong or stale.
    Tsig(ValidationError),

    /// A DNSSEC signature was invalid, expired, or made by an untrusted key.
    Dnssec(DnssecError),

    /// An NSEC3 proof of non-existence was invalid.
    Denial(DenialError),
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        AuthError::Tsig(err)
    }
}

impl From<DnssecError> for AuthError {
    fn from(err: DnssecError) -> Self {
        AuthError::Dnssec(err)
    }
}

impl From<DenialError> for AuthError {
    fn from(err: DenialError) -> Self {
        AuthError::Denial(err)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::Tsig(err) => write!(f, "TSIG: {}", err),
            AuthError::Dnssec(err) => write!(f, "DNSSEC: {}", err),
            AuthError::Denial(err) => write!(f, "NSEC3: {}", err),
        }
    }
}

impl error::Error for AuthError {}

//============ Testing =======================================================
