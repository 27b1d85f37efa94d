//! Sending queries to upstream servers.
//!
//! A [`Resolver`] is a cheap handle to a background worker. Queries are
//! handed to the worker over a channel and the worker runs each exchange
//! as a task of its own, so the caller never blocks anybody else while
//! waiting for an answer. The answer travels back on a oneshot channel.
//!
//! Queries are sent over UDP first. If the answer is truncated, the query
//! is repeated over TCP. Each server is tried the configured number of
//! attempts, each waiting at most the configured timeout.

pub use self::conf::ResolvConf;

pub mod conf;

use crate::base::message::Message;
use crate::base::question::Question;
use crate::base::wire::{ComposeError, ParseError};
use crate::net::stream::{read_message, write_message};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::vec::Vec;
use std::{error, fmt, io};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace};

/// The size of the queue of the worker.
const QUEUE_LEN: usize = 128;

/// The size of the receive buffer for UDP answers.
const RECV_SIZE: usize = 65535;

//------------ Resolver ------------------------------------------------------

/// A handle for sending queries to upstream servers.
///
/// Cloning the resolver is cheap. All clones share the same worker. The
/// worker ends once the last clone is dropped.
#[derive(Clone, Debug)]
pub struct Resolver {
    conf: Arc<ResolvConf>,
    queries: mpsc::Sender<Query>,
}

impl Resolver {
    /// Creates a new resolver and spawns its worker.
    ///
    /// This must be called from within a Tokio runtime.
    pub fn new(conf: ResolvConf) -> Self {
        let conf = Arc::new(conf.finalized());
        let (tx, rx) = mpsc::channel(QUEUE_LEN);
        tokio::spawn(Worker::new(conf.clone()).run(rx));
        Resolver { conf, queries: tx }
    }

    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Asks the configured servers a question.
    pub async fn query(&self, question: Question) -> Result<Message, Error> {
        let mut request = Message::query(question);
        request.header.set_rd(true);
        self.request(request).await
    }

    /// Sends a request message to the configured servers.
    ///
    /// The message is sent as is, including its ID.
    pub async fn request(&self, request: Message) -> Result<Message, Error> {
        self.send(request, None).await
    }

    /// Sends a request message to a specific server.
    pub async fn request_to(
        &self,
        server: SocketAddr,
        request: Message,
    ) -> Result<Message, Error> {
        self.send(request, Some(server)).await
    }

    async fn send(
        &self,
        request: Message,
        server: Option<SocketAddr>,
    ) -> Result<Message, Error> {
        let (tx, rx) = oneshot::channel();
        self.queries
            .send(Query {
                request,
                server,
                reply: tx,
            })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }
}

//------------ Query ---------------------------------------------------------

/// A query waiting to be processed by the worker.
struct Query {
    request: Message,
    server: Option<SocketAddr>,
    reply: oneshot::Sender<Result<Message, Error>>,
}

//------------ Worker --------------------------------------------------------

/// The worker processing queries.
struct Worker {
    conf: Arc<ResolvConf>,

    /// Index of the server to use first if rotating.
    next: AtomicUsize,
}

impl Worker {
    fn new(conf: Arc<ResolvConf>) -> Self {
        Worker {
            conf,
            next: AtomicUsize::new(0),
        }
    }

    async fn run(self, mut queries: mpsc::Receiver<Query>) {
        while let Some(query) = queries.recv().await {
            let servers = match query.server {
                Some(server) => vec![server],
                None => self.servers(),
            };
            let conf = self.conf.clone();
            tokio::spawn(async move {
                let res = exchange(&conf, &servers, &query.request).await;
                // The caller may have gone away in the meantime.
                let _ = query.reply.send(res);
            });
        }
        debug!("resolver worker finished");
    }

    /// Returns the servers in the order they should be tried.
    fn servers(&self) -> Vec<SocketAddr> {
        let mut servers = self.conf.servers.clone();
        if self.conf.rotate && !servers.is_empty() {
            let start = self.next.fetch_add(1, Ordering::Relaxed);
            servers.rotate_left(start % self.conf.servers.len());
        }
        servers
    }
}

//------------ Exchanges -----------------------------------------------------

/// Performs a complete exchange trying all servers.
async fn exchange(
    conf: &ResolvConf,
    servers: &[SocketAddr],
    request: &Message,
) -> Result<Message, Error> {
    if servers.is_empty() {
        return Err(Error::NoServers);
    }
    let wire = request.to_wire()?;
    let mut last_err = Error::Timeout;
    for _ in 0..conf.attempts {
        for server in servers {
            match exchange_with(conf, *server, request, &wire).await {
                Ok(answer) => return Ok(answer),
                Err(err) => {
                    debug!("query to {} failed: {}", server, err);
                    last_err = err;
                }
            }
        }
    }
    Err(last_err)
}

/// Performs an exchange with a single server.
async fn exchange_with(
    conf: &ResolvConf,
    server: SocketAddr,
    request: &Message,
    wire: &[u8],
) -> Result<Message, Error> {
    let answer = timeout(conf.timeout, udp_exchange(server, request, wire))
        .await
        .map_err(|_| Error::Timeout)??;
    if !answer.header.tc() {
        return Ok(answer);
    }
    trace!("truncated answer from {}, retrying over TCP", server);
    timeout(conf.timeout, tcp_exchange(server, request, wire))
        .await
        .map_err(|_| Error::Timeout)?
}

async fn udp_exchange(
    server: SocketAddr,
    request: &Message,
    wire: &[u8],
) -> Result<Message, Error> {
    let local = match server {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let sock = UdpSocket::bind(local).await?;
    sock.connect(server).await?;
    sock.send(wire).await?;
    let mut buf = vec![0u8; RECV_SIZE];
    loop {
        let len = sock.recv(&mut buf).await?;
        match Message::from_octets(&buf[..len]) {
            Ok(answer) if is_answer(request, &answer) => return Ok(answer),
            Ok(_) => trace!("ignoring unrelated message from {}", server),
            Err(err) => trace!("ignoring broken message from {}: {}", server, err),
        }
    }
}

async fn tcp_exchange(
    server: SocketAddr,
    request: &Message,
    wire: &[u8],
) -> Result<Message, Error> {
    let mut sock = TcpStream::connect(server).await?;
    write_message(&mut sock, wire).await?;
    let answer = match read_message(&mut sock).await? {
        Some(answer) => Message::from_octets(&answer)?,
        None => return Err(Error::BadAnswer),
    };
    if is_answer(request, &answer) {
        Ok(answer)
    } else {
        Err(Error::BadAnswer)
    }
}

/// Returns whether `answer` is an answer to `request`.
fn is_answer(request: &Message, answer: &Message) -> bool {
    answer.header.qr()
        && answer.header.id() == request.header.id()
        && answer.question == request.question
}

//============ Error Types ===================================================

//------------ Error ---------------------------------------------------------

/// An outbound query failed.
#[derive(Clone, Debug)]
pub enum Error {
    /// Talking to the server failed.
    Io(Arc<io::Error>),

    /// No server answered in time.
    Timeout,

    /// There are no servers to ask.
    NoServers,

    /// The request could not be composed.
    Compose(ComposeError),

    /// The answer could not be parsed.
    Parse(ParseError),

    /// The server sent something that isn’t an answer to the request.
    BadAnswer,

    /// The worker has gone away.
    Closed,
}

//--- From

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<ComposeError> for Error {
    fn from(err: ComposeError) -> Self {
        Error::Compose(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

//--- Display and Error

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::Timeout => f.write_str("timeout"),
            Error::NoServers => f.write_str("no servers configured"),
            Error::Compose(err) => write!(f, "{}", err),
            Error::Parse(err) => write!(f, "{}", err),
            Error::BadAnswer => f.write_str("bad answer"),
            Error::Closed => f.write_str("resolver closed"),
        }
    }
}

impl error::Error for Error {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::{Rcode, Rtype};
    use crate::base::name::Name;
    use std::str::FromStr;
    use std::time::Duration;

    fn question() -> Question {
        Question::new_in(Name::from_str("example.com").unwrap(), Rtype::SOA)
    }

    /// Answers a single query on `sock`, optionally truncated.
    async fn answer_one(sock: &UdpSocket, truncate: bool) {
        let mut buf = vec![0u8; 512];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        let request = Message::from_octets(&buf[..len]).unwrap();
        let mut answer = request.make_response();
        answer.header.set_rcode(Rcode::NXDOMAIN);
        answer.header.set_tc(truncate);
        sock.send_to(&answer.to_wire().unwrap(), peer).await.unwrap();
    }

    #[tokio::test]
    async fn udp_query() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut conf = ResolvConf::new();
        conf.servers.push(sock.local_addr().unwrap());
        let resolver = Resolver::new(conf);
        let (answer, _) =
            tokio::join!(resolver.query(question()), answer_one(&sock, false));
        let answer = answer.unwrap();
        assert_eq!(answer.header.rcode(), Rcode::NXDOMAIN);
        assert_eq!(answer.question, [question()]);
    }

    #[tokio::test]
    async fn tcp_fallback() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let resolver = Resolver::new(ResolvConf::new());
        let tcp = async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let wire = read_message(&mut stream).await.unwrap().unwrap();
            let request = Message::from_octets(&wire).unwrap();
            let answer = request.make_response();
            write_message(&mut stream, &answer.to_wire().unwrap())
                .await
                .unwrap();
        };
        let (answer, _, _) = tokio::join!(
            resolver.request_to(addr, Message::query(question())),
            answer_one(&sock, true),
            tcp,
        );
        let answer = answer.unwrap();
        assert!(!answer.header.tc());
        assert_eq!(answer.header.rcode(), Rcode::NOERROR);
    }

    #[tokio::test]
    async fn no_answer() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut conf = ResolvConf::new();
        conf.servers.push(sock.local_addr().unwrap());
        conf.attempts = 1;
        conf.timeout = Duration::from_secs(1);
        let resolver = Resolver::new(conf);
        let res = resolver.query(question()).await;
        assert!(matches!(res, Err(Error::Timeout)), "{:?}", res);
    }

    #[tokio::test]
    async fn no_servers() {
        let resolver = Resolver::new(ResolvConf::new());
        let res = tokio::time::timeout(
            Duration::from_secs(1),
            resolver.query(question()),
        )
        .await
        .unwrap();
        assert!(matches!(res, Err(Error::NoServers)), "{:?}", res);
    }

    #[test]
    fn rotate() {
        let mut conf = ResolvConf::new();
        conf.servers.push("192.0.2.1:53".parse().unwrap());
        conf.servers.push("192.0.2.2:53".parse().unwrap());
        conf.rotate = true;
        let worker = Worker::new(Arc::new(conf));
        let first = worker.servers();
        let second = worker.servers();
        assert_eq!(first[0], second[1]);
        assert_eq!(first[1], second[0]);
    }
}
