//! Zone transfers.
//!
//! This module keeps secondary zones in sync with their primaries and
//! serves the zones to others.
//!
//! The [`TransferEngine`] reacts to NOTIFY messages by transferring the
//! zone from the notifying primary via AXFR or IXFR ([RFC 5936], [RFC
//! 1995]). The responses of the primary are fed to an
//! [`XfrResponseInterpreter`] that collects the new contents of the zone.
//! Before the new contents become visible, they are checked by the
//! [`ZoneVerifier`] and, if the zone is signed, validated via DNSSEC. Each
//! transfer passes through the states of [`XfrState`].
//!
//! In the other direction, [`XfrServer`] produces the responses to AXFR
//! and IXFR requests for a zone.
//!
//! [RFC 1995]: https://tools.ietf.org/html/rfc1995
//! [RFC 5936]: https://tools.ietf.org/html/rfc5936

pub use self::engine::{
    NotifyAction, TransferEngine, TransferOutcome, XfrZone,
};
pub use self::interpreter::{XfrOutcome, XfrResponseInterpreter, XfrType};
pub use self::server::XfrServer;
pub use self::verify::ZoneVerifier;

mod engine;
mod interpreter;
mod server;
mod verify;

use crate::base::iana::Rcode;
use crate::base::serial::Serial;
use crate::base::wire::{ComposeError, ParseError};
use crate::error::AuthError;
use crate::tsig::ValidationError;
use crate::validate::DnssecError;
use crate::zonetree::ZoneError;
use std::sync::Arc;
use std::{error, fmt, io};

//------------ XfrState ------------------------------------------------------

/// The state of the transfer of a zone.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum XfrState {
    /// No transfer is happening.
    #[default]
    Idle,

    /// A NOTIFY asking for a transfer has been received.
    NotifyReceived,

    /// The transfer request has been sent to a primary.
    TransferRequested,

    /// Response messages are being received.
    Streaming,

    /// The received zone is being checked.
    Verifying,

    /// The new zone has been stored.
    Committed,

    /// The transfer failed.
    Aborted,
}

impl fmt::Display for XfrState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            XfrState::Idle => "idle",
            XfrState::NotifyReceived => "notify received",
            XfrState::TransferRequested => "transfer requested",
            XfrState::Streaming => "streaming",
            XfrState::Verifying => "verifying",
            XfrState::Committed => "committed",
            XfrState::Aborted => "aborted",
        })
    }
}

//============ Error Types ===================================================

//------------ TransferError -------------------------------------------------

/// A zone transfer failed.
#[derive(Clone, Debug)]
pub enum TransferError {
    /// Connecting to or talking with the primary failed.
    Io(Arc<io::Error>),

    /// The primary didn’t answer in time.
    Timeout,

    /// The primary closed the connection before the transfer was complete.
    Incomplete,

    /// The zone has more records than allowed.
    Overflow { capacity: usize },

    /// The transferred zone isn’t newer than the one we have.
    NotNewer { local: Serial, remote: Serial },

    /// The primary answered with an error.
    Rcode(Rcode),

    /// A response message could not be parsed.
    Parse(ParseError),

    /// The request message could not be created.
    Compose(ComposeError),

    /// The responses don’t form a valid transfer.
    Malformed(&'static str),

    /// The received zone isn’t a valid zone.
    Zone(ZoneError),

    /// A response or the zone data failed authentication.
    Authentication(AuthError),

    /// There is no primary to transfer the zone from.
    NoPrimary,

    /// The zone isn’t known.
    UnknownZone,

    /// The transfer was aborted because the server is shutting down.
    Shutdown,
}

//--- From

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        TransferError::Io(Arc::new(err))
    }
}

impl From<ParseError> for TransferError {
    fn from(err: ParseError) -> Self {
        TransferError::Parse(err)
    }
}

impl From<ComposeError> for TransferError {
    fn from(err: ComposeError) -> Self {
        TransferError::Compose(err)
    }
}

impl From<ZoneError> for TransferError {
    fn from(err: ZoneError) -> Self {
        match err {
            ZoneError::Overflow { capacity } => {
                TransferError::Overflow { capacity }
            }
            err => TransferError::Zone(err),
        }
    }
}

impl From<ValidationError> for TransferError {
    fn from(err: ValidationError) -> Self {
        TransferError::Authentication(err.into())
    }
}

impl From<DnssecError> for TransferError {
    fn from(err: DnssecError) -> Self {
        TransferError::Authentication(err.into())
    }
}

//--- Display and Error

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransferError::Io(err) => write!(f, "{}", err),
            TransferError::Timeout => f.write_str("timeout"),
            TransferError::Incomplete => f.write_str("incomplete transfer"),
            TransferError::Overflow { capacity } => {
                write!(f, "zone exceeds capacity of {} records", capacity)
            }
            TransferError::NotNewer { local, remote } => {
                write!(f, "serial {} not newer than {}", remote, local)
            }
            TransferError::Rcode(rcode) => write!(f, "primary answered {}", rcode),
            TransferError::Parse(err) => write!(f, "{}", err),
            TransferError::Compose(err) => write!(f, "{}", err),
            TransferError::Malformed(msg) => {
                write!(f, "malformed transfer: {}", msg)
            }
            TransferError::Zone(err) => write!(f, "{}", err),
            TransferError::Authentication(err) => write!(f, "{}", err),
            TransferError::NoPrimary => f.write_str("no primary"),
            TransferError::UnknownZone => f.write_str("unknown zone"),
            TransferError::Shutdown => f.write_str("shutting down"),
        }
    }
}

impl error::Error for TransferError {}
