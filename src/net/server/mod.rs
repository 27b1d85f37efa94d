//! Receiving and answering DNS messages.
//!
//! This module provides servers for receiving DNS messages via UDP and
//! TCP based on the [Tokio](https://tokio.rs/) async runtime. Received
//! messages are passed to a [`Service`] which produces the responses.
//!
//! # Architecture
//!
//! ```text
//!    --> network source          - reads bytes from the client
//!           --> server           - decodes requests, drops responses
//!              --> service       - processes requests &
//!              <--                 generates responses
//!           <-- server           - sends responses
//!    <-- network source          - writes bytes to the client
//! ```
//!
//! [`DgramServer`] receives messages on a UDP socket, [`StreamServer`]
//! accepts TCP connections and runs each of them as a task of its own. A
//! [`Server`] binds both for a set of addresses.
//!
//! The [`XfrService`] is the service for a secondary server. It hands
//! NOTIFY messages to the transfer engine, answers transfer requests and
//! SOA queries for its zones and passes everything else to a
//! [`Pipeline`].
//!
//! All servers observe a [`ShutdownHandle`]. Once shutdown has been
//! requested, they stop accepting new messages.

pub use self::dgram::DgramServer;
pub use self::message::{Request, TransportContext};
pub use self::pipeline::{Action, Combine, Direction, Pipeline, Stage};
pub use self::service::{Service, ServiceError, ServiceResult, XfrService};
pub use self::stream::StreamServer;

pub mod dgram;
pub mod message;
pub mod pipeline;
pub mod service;
pub mod stream;

use crate::base::iana::Rcode;
use crate::base::message::Message;
use crate::utils::base16;
use core::future;
use std::net::SocketAddr;
use std::string::String;
use std::sync::Arc;
use std::vec::Vec;
use std::{error, fmt, io};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

//------------ ShutdownHandle ------------------------------------------------

/// Requests all servers and transfers to stop.
///
/// Servers and the transfer engine receive a watch receiver via
/// [`subscribe`][Self::subscribe]. Calling [`shutdown`][Self::shutdown]
/// makes them stop at their next wait.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        ShutdownHandle { tx: Arc::new(tx) }
    }

    /// Returns a receiver that observes shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Requests shutdown.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

//--- Default

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown has been requested.
///
/// If the sending side has gone away without requesting shutdown, never
/// resolves.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            future::pending::<()>().await
        }
    }
}

//------------ Server --------------------------------------------------------

/// A UDP and TCP server for a set of addresses.
pub struct Server<Svc> {
    dgram: Vec<Arc<DgramServer<Svc>>>,
    stream: Vec<Arc<StreamServer<Svc>>>,
}

impl<Svc: Service> Server<Svc> {
    /// Binds UDP and TCP sockets for all addresses.
    ///
    /// This is the only place where network errors are returned to the
    /// caller. Binding to port 0 results in the same port for UDP and TCP
    /// only by chance, so use the addresses returned by
    /// [`udp_addrs`][Self::udp_addrs] and [`tcp_addrs`][Self::tcp_addrs].
    pub async fn bind(
        addrs: &[SocketAddr],
        service: Arc<Svc>,
        shutdown: &ShutdownHandle,
    ) -> Result<Self, io::Error> {
        let mut dgram = Vec::new();
        let mut stream = Vec::new();
        for addr in addrs {
            let sock = UdpSocket::bind(addr).await?;
            dgram.push(Arc::new(DgramServer::new(
                sock,
                service.clone(),
                shutdown.subscribe(),
            )));
            let listener = TcpListener::bind(addr).await?;
            stream.push(Arc::new(StreamServer::new(
                listener,
                service.clone(),
                shutdown.subscribe(),
            )));
        }
        Ok(Server { dgram, stream })
    }

    /// Spawns all servers onto the runtime.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let mut res = Vec::new();
        for server in &self.dgram {
            info!("listening on UDP {:?}", server.local_addr());
            res.push(tokio::spawn(server.clone().run()));
        }
        for server in &self.stream {
            info!("listening on TCP {:?}", server.local_addr());
            res.push(tokio::spawn(server.clone().run()));
        }
        res
    }

    pub fn udp_addrs(&self) -> Vec<SocketAddr> {
        self.dgram
            .iter()
            .filter_map(|server| server.local_addr().ok())
            .collect()
    }

    pub fn tcp_addrs(&self) -> Vec<SocketAddr> {
        self.stream
            .iter()
            .filter_map(|server| server.local_addr().ok())
            .collect()
    }
}

//----------- error_response() ----------------------------------------------

/// Creates an empty response with the given response code.
pub(crate) fn error_response(request: &Message, rcode: Rcode) -> Message {
    let mut res = request.make_response();
    res.header.set_rcode(rcode);
    res
}

//----------- to_pcap_text() -------------------------------------------------

/// Formats a message for the text import of packet analyzers.
pub(crate) fn to_pcap_text(bytes: &[u8]) -> String {
    let mut formatted = String::from("000000");
    let hex_encoded = base16::encode_string(bytes);
    let mut chars = hex_encoded.chars();
    while let (Some(a), Some(b)) = (chars.next(), chars.next()) {
        formatted.push(' ');
        formatted.push(a);
        formatted.push(b);
    }
    formatted
}

//============ Error Types ===================================================

//------------ ProtocolViolation ---------------------------------------------

/// A received message broke the rules of the protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolViolation {
    /// A response was received where a request was expected.
    ResponseAsQuery,

    /// A zone transfer was requested via UDP.
    XfrOverUdp,
}

//--- Display and Error

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ProtocolViolation::ResponseAsQuery => "response received as query",
            ProtocolViolation::XfrOverUdp => "zone transfer over UDP",
        })
    }
}

impl error::Error for ProtocolViolation {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pcap_text() {
        assert_eq!(to_pcap_text(&[0x12, 0xab, 0x00]), "000000 12 AB 00");
        assert_eq!(to_pcap_text(&[]), "000000");
    }

    #[tokio::test]
    async fn shutdown_handle() {
        let handle = ShutdownHandle::new();
        let mut rx = handle.subscribe();
        assert!(!handle.is_shutdown());
        handle.shutdown();
        shutdown_requested(&mut rx).await;
        assert!(handle.is_shutdown());

        // A late subscriber sees it, too.
        shutdown_requested(&mut handle.subscribe()).await;
    }
}
