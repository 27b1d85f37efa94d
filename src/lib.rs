//! A secondary DNS server toolkit.
//!
//! This crate provides the building blocks of a server that keeps
//! secondary copies of DNS zones up to date via zone transfers, verifies
//! what it receives and serves the result to others.
//!
//! # Modules
//!
//! The fundamental types live in two modules:
//!
//! * [base] contains the wire format of DNS messages: domain names,
//!   the message header, questions, resource records, EDNS, and the
//!   encoding and decoding of complete messages, and
//! * [rdata] contains the record data of the record types the crate
//!   understands.
//!
//! Authentication of messages and data is provided by
//!
//! * [tsig] for signing and verifying messages with shared secrets, and
//! * [validate] for DNSSEC signatures over record sets, the set of
//!   trusted keys and NSEC3 denial of existence.
//!
//! Zones are kept in [zonetree] as immutable snapshots that are replaced
//! atomically. The [net] module contains the network side: the transfer
//! engine that keeps zones up to date in [net::xfr] and the UDP and TCP
//! servers in [net::server]. Outgoing queries other than zone transfers
//! go through the [resolv] module.
//!
//! [config] collects the settings of a complete server, [error] the
//! crate-wide error type and [logging] the setup of diagnostic output.
//!
//! # Example
//!
//! A minimal server, leaving out error handling:
//!
//! ```no_run
//! use std::sync::Arc;
//! use zonewarden::config::ServerConfig;
//! use zonewarden::net::server::{Server, ShutdownHandle};
//!
//! # async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
//! zonewarden::logging::init_logging();
//! let shutdown = ShutdownHandle::new();
//! let engine = Arc::new(config.build_engine(shutdown.subscribe())?);
//! let service = Arc::new(config.build_service(engine)?);
//! let server = Server::bind(&config.listen, service, &shutdown).await?;
//! for handle in server.spawn() {
//!     handle.await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod config;
pub mod error;
pub mod logging;
pub mod net;
pub mod rdata;
pub mod resolv;
pub mod tsig;
pub mod utils;
pub mod validate;
pub mod zonetree;
