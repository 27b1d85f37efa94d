//! Support for stream based server transports.
//!
//! A [`StreamServer`] accepts TCP connections and runs each of them in a
//! task of its own. Requests on a connection are processed one after the
//! other. All responses produced for a request are written before the
//! next request is read which keeps the messages of a zone transfer
//! together.

use super::message::{Request, TransportContext};
use super::service::Service;
use super::{shutdown_requested, to_pcap_text, ProtocolViolation};
use crate::base::message::Message;
use crate::net::stream::{read_message, write_message};
use crate::utils::config::DefMinMax;
use core::time::Duration;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, enabled, trace, warn, Level};

/// Limit on the amount of time to allow between client requests.
///
/// The value has to be between 200ms and 30 days. The default is 30
/// seconds.
const IDLE_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(30),
    Duration::from_millis(200),
    Duration::from_secs(30 * 24 * 60 * 60),
);

/// Limit the time to wait for a complete message to be written to the client.
///
/// The value has to be between 1ms and 1 hour. The default is 30 seconds.
const RESPONSE_WRITE_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(30),
    Duration::from_millis(1),
    Duration::from_secs(60 * 60),
);

//----------- Config ---------------------------------------------------------

/// Configuration for a stream server connection.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    idle_timeout: Duration,
    response_write_timeout: Duration,
}

impl Config {
    /// Creates a new, default config.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the time a connection may be idle before it is closed.
    ///
    /// The value has to be between 200ms and 30 days.
    pub fn set_idle_timeout(&mut self, value: Duration) {
        self.idle_timeout = IDLE_TIMEOUT.limit(value);
    }

    /// Sets the time to wait for a response to be written.
    ///
    /// The value has to be between 1ms and 1 hour.
    pub fn set_response_write_timeout(&mut self, value: Duration) {
        self.response_write_timeout = RESPONSE_WRITE_TIMEOUT.limit(value);
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn response_write_timeout(&self) -> Duration {
        self.response_write_timeout
    }
}

//--- Default

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_timeout: IDLE_TIMEOUT.default(),
            response_write_timeout: RESPONSE_WRITE_TIMEOUT.default(),
        }
    }
}

//------------ StreamServer --------------------------------------------------

/// A server for DNS over TCP.
pub struct StreamServer<Svc> {
    listener: TcpListener,
    service: Arc<Svc>,
    config: Config,
    shutdown: watch::Receiver<bool>,
}

impl<Svc: Service> StreamServer<Svc> {
    pub fn new(
        listener: TcpListener,
        service: Arc<Svc>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        StreamServer {
            listener,
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
        self.listener.local_addr()
    }

    /// Accepts connections until shutdown is requested.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    debug!("TCP server shutting down");
                    return;
                }

                res = self.listener.accept() => {
                    match res {
                        Ok((stream, addr)) => {
                            trace!(%addr, "accepted connection");
                            let connection = Connection {
                                stream,
                                addr,
                                service: self.service.clone(),
                                config: self.config,
                                shutdown: self.shutdown.clone(),
                            };
                            tokio::spawn(connection.run());
                        }
                        Err(err) => {
                            warn!("error while accepting connection: {}", err);
                        }
                    }
                }
            }
        }
    }
}

//------------ Connection ----------------------------------------------------

/// A single client connection.
struct Connection<Svc> {
    stream: TcpStream,
    addr: SocketAddr,
    service: Arc<Svc>,
    config: Config,
    shutdown: watch::Receiver<bool>,
}

impl<Svc: Service> Connection<Svc> {
    async fn run(mut self) {
        match self.run_until_error().await {
            Ok(()) => trace!(addr = %self.addr, "connection closed"),
            Err(err) => debug!(addr = %self.addr, "connection failed: {}", err),
        }
    }

    async fn run_until_error(&mut self) -> Result<(), io::Error> {
        loop {
            let read = tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown) => return Ok(()),
                res = timeout(
                    self.config.idle_timeout,
                    read_message(&mut self.stream),
                ) => res,
            };
            let bytes = match read {
                Ok(Ok(Some(bytes))) => bytes,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    trace!(addr = %self.addr, "idle timeout");
                    return Ok(());
                }
            };
            if enabled!(Level::TRACE) {
                let pcap_text = to_pcap_text(&bytes);
                trace!(addr = %self.addr, pcap_text, "Received message");
            }
            let message = match Message::from_octets(&bytes) {
                Ok(message) => message,
                Err(err) => {
                    warn!("Failed while parsing request message: {}", err);
                    continue;
                }
            };
            if message.header.qr() {
                debug!(
                    addr = %self.addr,
                    "dropping message: {}",
                    ProtocolViolation::ResponseAsQuery
                );
                continue;
            }
            let id = message.header.id();
            let request =
                Request::new(message, bytes, self.addr, TransportContext::Tcp);
            let responses = match self.service.call(request).await {
                Ok(responses) => responses,
                Err(err) => {
                    debug!(addr = %self.addr, "no response for request id {}: {}", id, err);
                    continue;
                }
            };
            for response in &responses {
                if enabled!(Level::TRACE) {
                    let pcap_text = to_pcap_text(response);
                    trace!(addr = %self.addr, pcap_text, "Sending response");
                }
                timeout(
                    self.config.response_write_timeout,
                    write_message(&mut self.stream, response),
                )
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "write timed out")
                })??;
            }
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
    use crate::net::server::{ServiceError, ServiceResult};
    use futures_util::future::BoxFuture;
    use std::str::FromStr;

    /// Answers each request with three responses.
    struct Triple;

    impl Service for Triple {
        fn call(&self, request: Request) -> BoxFuture<'_, ServiceResult> {
            Box::pin(async move {
                let mut res = Vec::new();
                for rcode in [Rcode::NOERROR, Rcode::NXDOMAIN, Rcode::REFUSED] {
                    let mut response = request.message().make_response();
                    response.header.set_rcode(rcode);
                    res.push(response.to_wire()?);
                }
                Ok::<_, ServiceError>(res)
            })
        }
    }

    fn query() -> Message {
        Message::query(Question::new_in(
            Name::from_str("example.com").unwrap(),
            Rtype::A,
        ))
    }

    #[tokio::test]
    async fn all_responses_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let server = Arc::new(StreamServer::new(listener, Arc::new(Triple), rx));
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.run());

        let mut sock = TcpStream::connect(addr).await.unwrap();

        // Responses are ignored.
        let mut response = query();
        response.header.set_qr(true);
        write_message(&mut sock, &response.to_wire().unwrap())
            .await
            .unwrap();

        let query = query();
        write_message(&mut sock, &query.to_wire().unwrap())
            .await
            .unwrap();
        for rcode in [Rcode::NOERROR, Rcode::NXDOMAIN, Rcode::REFUSED] {
            let bytes = read_message(&mut sock).await.unwrap().unwrap();
            let answer = Message::from_octets(&bytes).unwrap();
            assert_eq!(answer.header.id(), query.header.id());
            assert_eq!(answer.header.rcode(), rcode);
        }

        tx.send_replace(true);
        handle.await.unwrap();
        // The open connection notices the shutdown, too.
        assert_eq!(read_message(&mut sock).await.unwrap(), None);
    }
}
