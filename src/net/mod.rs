//! Sending and receiving DNS messages.
//!
//! This module provides the network side of the crate:
//!
//! * [server] receives DNS messages over UDP and TCP and hands them to a
//!   [`Service`][server::Service] for processing,
//! * [xfr] keeps secondary zones up to date via AXFR and IXFR and serves
//!   them to others.
//!
//! The [stream] module contains the framing of messages on stream
//! transports shared by both.

pub mod server;
pub mod stream;
pub mod xfr;
