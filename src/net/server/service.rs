//! Processing requests.

use super::message::{Request, TransportContext};
use super::pipeline::Pipeline;
use super::{error_response, ProtocolViolation};
use crate::base::iana::{Opcode, Rcode, Rtype};
use crate::base::message::Message;
use crate::base::name::Name;
use crate::base::opt::Edns;
use crate::base::wire::ComposeError;
use crate::net::xfr::{TransferEngine, XfrServer};
use crate::rdata::Time48;
use crate::resolv::Resolver;
use crate::tsig::{Algorithm, Key, ServerSequence, ServerTransaction};
use crate::zonetree::{ZoneStore, ZoneTree};
use futures_util::future::BoxFuture;
use std::boxed::Box;
use std::collections::HashMap;
use std::sync::Arc;
use std::vec::Vec;
use std::{error, fmt};
use tracing::{debug, trace, warn};

/// The keys a service accepts for signed requests.
pub type KeyMap = HashMap<(Name, Algorithm), Arc<Key>>;

/// The result of processing a request.
///
/// On success, this is the wire format of the responses in the order they
/// are to be sent. Over UDP, only the first response is used.
pub type ServiceResult = Result<Vec<Vec<u8>>, ServiceError>;

//------------ Service -------------------------------------------------------

/// A type that processes requests.
///
/// Servers call the service for every request they receive that is a
/// valid DNS request. Requests with the QR bit set never reach the
/// service.
pub trait Service: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'_, ServiceResult>;
}

impl<T: Service> Service for Arc<T> {
    fn call(&self, request: Request) -> BoxFuture<'_, ServiceResult> {
        (**self).call(request)
    }
}

//------------ XfrService ----------------------------------------------------

/// The service of a secondary server.
///
/// The service routes requests as follows:
///
/// * NOTIFY messages are handed to the transfer engine,
/// * AXFR and IXFR requests for known zones are answered via
///   [`XfrServer`] if they arrived via TCP and refused otherwise,
/// * SOA queries for the apex of known zones are answered from the
///   current zone,
/// * all other queries are passed to the [`Pipeline`].
///
/// Requests signed with TSIG are verified first using the configured keys.
/// Responses to signed requests are signed in turn.
pub struct XfrService {
    engine: Arc<TransferEngine>,
    zones: ZoneTree,
    keys: KeyMap,
    xfr_server: XfrServer,
    pipeline: Pipeline,
    resolver: Option<Resolver>,
}

impl XfrService {
    /// Creates a new service for the zones of the engine.
    pub fn new(engine: Arc<TransferEngine>) -> Self {
        let mut zones = ZoneTree::new();
        for zone in engine.zones() {
            if let Err(err) = zones.insert_zone(zone.store().clone()) {
                warn!("cannot serve zone {}: {}", zone.apex(), err);
            }
        }
        XfrService {
            engine,
            zones,
            keys: KeyMap::new(),
            xfr_server: XfrServer::new(),
            pipeline: Pipeline::new(),
            resolver: None,
        }
    }

    /// Adds a key for verifying signed requests.
    pub fn with_key(mut self, key: Arc<Key>) -> Self {
        self.keys
            .insert((key.name().clone(), key.algorithm()), key);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sets the resolver the pipeline forwards requests to.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_xfr_server(mut self, xfr_server: XfrServer) -> Self {
        self.xfr_server = xfr_server;
        self
    }

    pub fn engine(&self) -> &Arc<TransferEngine> {
        &self.engine
    }

    pub fn zones(&self) -> &ZoneTree {
        &self.zones
    }

    async fn handle(&self, request: Request) -> ServiceResult {
        let client = request.client_addr();
        let transport = request.transport();
        let limit = request.max_response_size();
        let (mut message, wire) = request.into_parts();
        let is_xfr = message.header.opcode() == Opcode::QUERY
            && message
                .first_question()
                .map(|q| matches!(q.qtype(), Rtype::AXFR | Rtype::IXFR))
                .unwrap_or(false);

        let signer = if message.tsig().is_some() {
            match self.verify(&mut message, &wire, is_xfr) {
                Ok(signer) => signer,
                Err(response) => {
                    warn!("TSIG verification of request from {} failed", client);
                    return Ok(vec![response?]);
                }
            }
        } else {
            Signer::Unsigned
        };

        let mut responses = match message.header.opcode() {
            Opcode::NOTIFY => {
                let (action, response) =
                    self.engine.handle_notify(&message, client);
                debug!("NOTIFY from {}: {:?}", client, action);
                vec![response]
            }
            Opcode::QUERY if is_xfr => {
                if transport.is_udp() {
                    debug!(
                        "refusing request from {}: {}",
                        client,
                        ProtocolViolation::XfrOverUdp
                    );
                    vec![error_response(&message, Rcode::REFUSED)]
                } else {
                    match self.find_apex(&message) {
                        Some(store) => {
                            self.xfr_server.answer(&message, &store.load())
                        }
                        None => vec![error_response(&message, Rcode::NOTAUTH)],
                    }
                }
            }
            Opcode::QUERY => match self.soa_query(&message) {
                Some(store) => vec![answer_soa(&message, store)],
                None => {
                    match self
                        .pipeline
                        .process(&message, self.resolver.as_ref())
                        .await
                    {
                        Some(response) => vec![response],
                        None => return Err(ServiceError::Dropped),
                    }
                }
            },
            _ => vec![error_response(&message, Rcode::NOTIMP)],
        };

        if let (Some(_), TransportContext::Udp { max_response_size }) =
            (message.edns(), transport)
        {
            for response in &mut responses {
                response.set_edns(&Edns::new(max_response_size));
            }
        }
        trace!("{} responses for {}", responses.len(), client);
        signer.finish(responses, transport, limit)
    }

    /// Verifies the TSIG record of a request.
    ///
    /// On failure returns the wire format of the error response.
    fn verify(
        &self,
        message: &mut Message,
        wire: &[u8],
        is_xfr: bool,
    ) -> Result<Signer, Result<Vec<u8>, ServiceError>> {
        let original = message.clone();
        let now = Time48::now();
        let res = if is_xfr {
            ServerSequence::request(&self.keys, message, wire, now)
                .map(|seq| seq.map(Signer::Sequence))
        } else {
            ServerTransaction::request(&self.keys, message, wire, now)
                .map(|tran| tran.map(Signer::Transaction))
        };
        match res {
            Ok(Some(signer)) => Ok(signer),
            Ok(None) => Ok(Signer::Unsigned),
            Err(err) => {
                debug!("TSIG error: {}", err);
                Err(err.build_message(&original).map_err(Into::into))
            }
        }
    }

    /// Returns the zone whose apex is the question of a request.
    fn find_apex(&self, message: &Message) -> Option<&Arc<ZoneStore>> {
        let question = message.first_question()?;
        self.zones.get_zone(question.qname(), question.qclass())
    }

    /// Returns the zone if the request is an SOA query for its apex.
    fn soa_query(&self, message: &Message) -> Option<&Arc<ZoneStore>> {
        match message.question.as_slice() {
            [question] if question.qtype() == Rtype::SOA => self.find_apex(message),
            _ => None,
        }
    }
}

impl Service for XfrService {
    fn call(&self, request: Request) -> BoxFuture<'_, ServiceResult> {
        Box::pin(self.handle(request))
    }
}

/// Answers an SOA query from the current version of a zone.
fn answer_soa(request: &Message, store: &ZoneStore) -> Message {
    let snapshot = store.load();
    match snapshot.soa_record() {
        Some(soa) if snapshot.is_correct() => {
            let mut response = request.make_response();
            response.header.set_aa(true);
            response.answer.push(soa.clone());
            response
        }
        _ => error_response(request, Rcode::SERVFAIL),
    }
}

//------------ Signer --------------------------------------------------------

/// Produces the wire format of responses, signing them if necessary.
enum Signer {
    Unsigned,
    Transaction(ServerTransaction<Arc<Key>>),
    Sequence(ServerSequence<Arc<Key>>),
}

impl Signer {
    fn finish(
        self,
        responses: Vec<Message>,
        transport: TransportContext,
        limit: usize,
    ) -> ServiceResult {
        let now = Time48::now();
        let mut res = Vec::with_capacity(responses.len());
        match self {
            Signer::Unsigned => {
                for response in &responses {
                    res.push(match transport {
                        TransportContext::Udp { .. } => {
                            response.to_wire_truncated(limit)?
                        }
                        TransportContext::Tcp => response.to_wire()?,
                    });
                }
            }
            Signer::Transaction(transaction) => {
                if let Some(response) = responses.first() {
                    res.push(transaction.answer_truncated(response, limit, now)?);
                }
            }
            Signer::Sequence(mut sequence) => {
                for response in &responses {
                    res.push(sequence.answer(response, now)?);
                }
            }
        }
        Ok(res)
    }
}

//============ Error Types ===================================================

//------------ ServiceError --------------------------------------------------

/// A request could not be answered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceError {
    /// The request is to be dropped without an answer.
    Dropped,

    /// The request violated the protocol.
    Protocol(ProtocolViolation),

    /// The response could not be composed.
    Compose(ComposeError),
}

//--- From

impl From<ComposeError> for ServiceError {
    fn from(err: ComposeError) -> Self {
        ServiceError::Compose(err)
    }
}

impl From<ProtocolViolation> for ServiceError {
    fn from(err: ProtocolViolation) -> Self {
        ServiceError::Protocol(err)
    }
}

//--- Display and Error

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::Dropped => f.write_str("request dropped"),
            ServiceError::Protocol(err) => write!(f, "{}", err),
            ServiceError::Compose(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for ServiceError {}

//============ Testing =======================================================
