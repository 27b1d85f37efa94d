//! Support for datagram based server transports.
//!
//! A [`DgramServer`] receives requests on a UDP socket and spawns a task
//! for each of them that calls the service and sends back the first
//! response it produces.

use super::message::{Request, TransportContext};
use super::service::Service;
use super::{shutdown_requested, to_pcap_text, ProtocolViolation};
use crate::base::message::Message;
use crate::utils::config::DefMinMax;
use core::time::Duration;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, enabled, error, trace, warn, Level};

/// Limit the time to wait for a complete message to be written to the client.
///
/// The value has to be between 1ms and 60 seconds. The default value is 5
/// seconds.
const WRITE_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(5),
    Duration::from_millis(1),
    Duration::from_secs(60),
);

/// Limit suggested for the maximum response size to create.
///
/// The value has to be between 512 and 4,096 per [RFC 6891]. The default
/// value is 1232 per the [2020 DNS Flag Day].
///
/// [2020 DNS Flag Day]: http://www.dnsflagday.net/2020/
/// [RFC 6891]: https://datatracker.ietf.org/doc/html/rfc6891#section-6.2.5
const MAX_RESPONSE_SIZE: DefMinMax<u16> = DefMinMax::new(1232, 512, 4096);

/// The size of the receive buffer.
const RECV_BUF_SIZE: usize = 65_535;

//------------ Config --------------------------------------------------------

/// Configuration for a datagram server.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Limit on the size of responses.
    max_response_size: u16,

    /// Limit the time to wait for a complete message to be written to the client.
    write_timeout: Duration,
}

impl Config {
    /// Creates a new, default config.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the limit on the size of responses.
    ///
    /// The value has to be between 512 and 4,096. The default value is
    /// 1232.
    pub fn set_max_response_size(&mut self, value: u16) {
        self.max_response_size = MAX_RESPONSE_SIZE.limit(value);
    }

    /// Sets the time to wait for a complete message to be written to the
    /// client.
    ///
    /// The value has to be between 1ms and 60 seconds. The default value is
    /// 5 seconds.
    pub fn set_write_timeout(&mut self, value: Duration) {
        self.write_timeout = WRITE_TIMEOUT.limit(value);
    }

    pub fn max_response_size(&self) -> u16 {
        self.max_response_size
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

//--- Default

impl Default for Config {
    fn default() -> Self {
        Self {
            max_response_size: MAX_RESPONSE_SIZE.default(),
            write_timeout: WRITE_TIMEOUT.default(),
        }
    }
}

//------------ DgramServer ---------------------------------------------------

/// A server for DNS over UDP.
pub struct DgramServer<Svc> {
    sock: Arc<UdpSocket>,
    service: Arc<Svc>,
    config: Config,
    shutdown: watch::Receiver<bool>,
}

impl<Svc: Service> DgramServer<Svc> {
    /// Creates a new server for a bound socket.
    pub fn new(
        sock: UdpSocket,
        service: Arc<Svc>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        DgramServer {
            sock: Arc::new(sock),
            service,
            config: Config::default(),
            shutdown,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.sock.local_addr()
    }

    /// Receives requests until shutdown is requested.
    ///
    /// Errors while receiving are logged. A failing socket does not end
    /// the server.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        let mut buf = vec![0u8; RECV_BUF_SIZE];
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    debug!("UDP server shutting down");
                    return;
                }

                res = self.sock.recv_from(&mut buf) => {
                    match res {
                        Ok((len, addr)) => self.received(&buf[..len], addr),
                        Err(err) => {
                            warn!("error while receiving message: {}", err);
                        }
                    }
                }
            }
        }
    }

    /// Processes a received datagram.
    fn received(self: &Arc<Self>, bytes: &[u8], addr: SocketAddr) {
        if enabled!(Level::TRACE) {
            let pcap_text = to_pcap_text(bytes);
            trace!(%addr, pcap_text, "Received message");
        }
        let message = match Message::from_octets(bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!("Failed while parsing request message: {}", err);
                return;
            }
        };
        if message.header.qr() {
            debug!(%addr, "dropping message: {}", ProtocolViolation::ResponseAsQuery);
            return;
        }
        let request = Request::new(
            message,
            bytes.to_vec(),
            addr,
            TransportContext::Udp {
                max_response_size: self.config.max_response_size,
            },
        );
        let server = self.clone();
        tokio::spawn(async move { server.dispatch(request, addr).await });
    }

    /// Calls the service and sends the response.
    async fn dispatch(&self, request: Request, addr: SocketAddr) {
        let id = request.message().header.id();
        trace!("Calling service for request id {}", id);
        let responses = match self.service.call(request).await {
            Ok(responses) => responses,
            Err(err) => {
                debug!(%addr, "no response for request id {}: {}", id, err);
                return;
            }
        };
        // A datagram only ever carries a single response.
        let response = match responses.first() {
            Some(response) => response,
            None => return,
        };
        if enabled!(Level::TRACE) {
            let pcap_text = to_pcap_text(response);
            trace!(%addr, pcap_text, "Sending response");
        }
        match timeout(
            self.config.write_timeout,
            self.sock.send_to(response, addr),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!(%addr, "Failed to send response: {}", err),
            Err(_) => error!(%addr, "Write timed out"),
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::{Rcode, Rtype};
    use crate::base::name::Name;
    use crate::base::question::Question;
    use crate::net::server::ServiceResult;
    use futures_util::future::BoxFuture;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers everything with NXDOMAIN and counts calls.
    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Service for Counting {
        fn call(&self, request: Request) -> BoxFuture<'_, ServiceResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let mut response = request.message().make_response();
                response.header.set_rcode(Rcode::NXDOMAIN);
                let res: ServiceResult =
                    response.to_wire().map(|wire| vec![wire]).map_err(Into::into);
                res
            })
        }
    }

    async fn server() -> (Arc<DgramServer<Counting>>, watch::Sender<bool>) {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let server = Arc::new(DgramServer::new(
            sock,
            Arc::new(Counting::default()),
            rx,
        ));
        (server, tx)
    }

    #[tokio::test]
    async fn answers_queries_only() {
        let (server, tx) = server().await;
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.clone().run());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut response = Message::query(Question::new_in(
            Name::from_str("example.com").unwrap(),
            Rtype::A,
        ));
        response.header.set_qr(true);
        client
            .send_to(&response.to_wire().unwrap(), addr)
            .await
            .unwrap();
        client.send_to(b"garbage", addr).await.unwrap();

        let query = Message::query(Question::new_in(
            Name::from_str("example.com").unwrap(),
            Rtype::A,
        ));
        client.send_to(&query.to_wire().unwrap(), addr).await.unwrap();
        let mut buf = vec![0u8; 512];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        let answer = Message::from_octets(&buf[..len]).unwrap();
        assert_eq!(answer.header.id(), query.header.id());
        assert_eq!(answer.header.rcode(), Rcode::NXDOMAIN);

        // Neither the response nor the garbage reached the service.
        assert_eq!(server.service.0.load(Ordering::SeqCst), 1);

        tx.send_replace(true);
        handle.await.unwrap();
    }

    #[test]
    fn config_limits() {
        let mut config = Config::new();
        assert_eq!(config.max_response_size(), 1232);
        config.set_max_response_size(100);
        assert_eq!(config.max_response_size(), 512);
        config.set_write_timeout(Duration::from_secs(600));
        assert_eq!(config.write_timeout(), Duration::from_secs(60));
    }
}
