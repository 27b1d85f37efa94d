//! Received requests and their context.

use crate::base::message::Message;
use std::net::SocketAddr;
use std::vec::Vec;
use tokio::time::Instant;

//------------ TransportContext ----------------------------------------------

/// Information about the transport a request was received over.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportContext {
    /// The request arrived via UDP.
    Udp {
        /// The limit the server suggests for the size of the response.
        max_response_size: u16,
    },

    /// The request arrived via TCP.
    Tcp,
}

impl TransportContext {
    pub fn is_udp(self) -> bool {
        matches!(self, TransportContext::Udp { .. })
    }
}

//------------ Request -------------------------------------------------------

/// A DNS message received by a server together with its context.
///
/// The wire format is kept alongside the decoded message since TSIG
/// verification needs it.
#[derive(Clone, Debug)]
pub struct Request {
    message: Message,
    wire: Vec<u8>,
    client_addr: SocketAddr,
    transport: TransportContext,
    received_at: Instant,
}

impl Request {
    pub fn new(
        message: Message,
        wire: Vec<u8>,
        client_addr: SocketAddr,
        transport: TransportContext,
    ) -> Self {
        Request {
            message,
            wire,
            client_addr,
            transport,
            received_at: Instant::now(),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the octets the message was decoded from.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn transport(&self) -> TransportContext {
        self.transport
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Returns the maximum size of a response to this request.
    ///
    /// Over UDP, this is the smaller of the payload size announced by the
    /// client and the server’s limit but never less than 512. Over TCP, it
    /// is the maximum message size.
    pub fn max_response_size(&self) -> usize {
        match self.transport {
            TransportContext::Udp { max_response_size } => usize::from(
                self.message
                    .udp_payload_size()
                    .clamp(512, max_response_size.max(512)),
            ),
            TransportContext::Tcp => usize::from(u16::MAX),
        }
    }

    pub fn into_parts(self) -> (Message, Vec<u8>) {
        (self.message, self.wire)
    }
}
