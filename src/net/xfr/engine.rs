//! Keeping secondary zones up to date.

use super::interpreter::{XfrOutcome, XfrResponseInterpreter};
use super::verify::ZoneVerifier;
use super::{TransferError, XfrState};
use crate::base::iana::{Opcode, Rcode, Rtype};
use crate::base::message::Message;
use crate::base::name::Name;
use crate::base::question::Question;
use crate::base::serial::Serial;
use crate::net::server::shutdown_requested;
use crate::net::stream::{read_message, write_message};
use crate::rdata::Time48;
use crate::resolv::{ResolvConf, Resolver};
use crate::tsig::{ClientSequence, Key};
use crate::validate::KeyState;
use crate::zonetree::{ZoneError, ZoneStore};
use core::future::Future;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::vec::Vec;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

//------------ XfrZone -------------------------------------------------------

/// A secondary zone kept up to date by the transfer engine.
#[derive(Debug)]
pub struct XfrZone {
    store: Arc<ZoneStore>,

    /// The servers we may transfer the zone from.
    primaries: Vec<SocketAddr>,

    /// The TSIG key to sign transfer requests with.
    key: Option<Arc<Key>>,

    /// The servers to notify after the zone has changed.
    notify: Vec<SocketAddr>,

    state: Mutex<XfrState>,
}

impl XfrZone {
    pub fn new(store: Arc<ZoneStore>) -> Self {
        XfrZone {
            store,
            primaries: Vec::new(),
            key: None,
            notify: Vec::new(),
            state: Mutex::new(XfrState::Idle),
        }
    }

    /// Adds a primary to transfer the zone from.
    pub fn with_primary(mut self, primary: SocketAddr) -> Self {
        self.primaries.push(primary);
        self
    }

    /// Sets the TSIG key for transfer requests.
    pub fn with_key(mut self, key: Arc<Key>) -> Self {
        self.key = Some(key);
        self
    }

    /// Adds a server to notify after a transfer.
    pub fn with_notify(mut self, target: SocketAddr) -> Self {
        self.notify.push(target);
        self
    }

    pub fn apex(&self) -> &Name {
        self.store.apex()
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    pub fn primaries(&self) -> &[SocketAddr] {
        &self.primaries
    }

    pub fn key(&self) -> Option<&Arc<Key>> {
        self.key.as_ref()
    }

    pub fn notify_targets(&self) -> &[SocketAddr] {
        &self.notify
    }

    /// Returns the state of the most recent transfer.
    pub fn state(&self) -> XfrState {
        *self.state.lock()
    }

    fn set_state(&self, state: XfrState) {
        let mut current = self.state.lock();
        trace!("zone {}: {} -> {}", self.apex(), *current, state);
        *current = state;
    }

    /// Returns the configured primary with the address of `source`.
    fn primary_for(&self, source: SocketAddr) -> Option<SocketAddr> {
        self.primaries
            .iter()
            .find(|primary| primary.ip() == source.ip())
            .copied()
    }
}

//------------ NotifyAction --------------------------------------------------

/// What the engine did with a NOTIFY message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyAction {
    /// The zone is current. Nothing needs doing.
    UpToDate,

    /// A transfer has been started.
    Transfer,

    /// A transfer is already in progress.
    Coalesced,

    /// The zone isn’t known to us.
    NotAuth,

    /// The NOTIFY didn’t come from a primary of the zone.
    Refused,

    /// The NOTIFY is malformed.
    FormErr,
}

impl NotifyAction {
    /// Returns the response code to answer the NOTIFY with.
    pub fn rcode(self) -> Rcode {
        match self {
            NotifyAction::UpToDate
            | NotifyAction::Transfer
            | NotifyAction::Coalesced => Rcode::NOERROR,
            NotifyAction::NotAuth => Rcode::NOTAUTH,
            NotifyAction::Refused => Rcode::REFUSED,
            NotifyAction::FormErr => Rcode::FORMERR,
        }
    }
}

//------------ TransferOutcome -----------------------------------------------

/// The result of a successful refresh of a zone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferOutcome {
    /// A new version of the zone has been committed.
    Committed(Serial),

    /// The zone was already current.
    UpToDate(Serial),

    /// Another transfer of the zone was already in progress.
    Coalesced,
}

//------------ TransferEngine ------------------------------------------------

/// Drives the transfers of secondary zones.
///
/// The engine reacts to NOTIFY messages via
/// [`handle_notify`][Self::handle_notify] and can be asked to refresh a
/// zone via [`refresh`][Self::refresh]. Only one transfer per zone runs at
/// any time. Transferred zones are only committed to the zone store once
/// they have passed verification. If verification results in new trusted
/// keys for a zone, these are written to the key state file if one is
/// configured.
///
/// All network operations are limited by the timeout of the resolver
/// configuration and are abandoned when shutdown is requested.
#[derive(Debug)]
pub struct TransferEngine {
    zones: HashMap<Name, XfrZone>,

    /// The zones with a transfer in progress.
    in_progress: Mutex<HashSet<Name>>,

    /// The trusted DNSSEC keys.
    key_state: Mutex<KeyState>,

    /// Where to persist the key state.
    key_state_path: Option<PathBuf>,

    conf: ResolvConf,

    /// The resolver for sending NOTIFY messages.
    resolver: Option<Resolver>,

    shutdown: watch::Receiver<bool>,

    /// Counter for rotating primaries.
    next_primary: AtomicUsize,
}

impl TransferEngine {
    pub fn new(conf: ResolvConf, shutdown: watch::Receiver<bool>) -> Self {
        TransferEngine {
            zones: HashMap::new(),
            in_progress: Mutex::new(HashSet::new()),
            key_state: Mutex::new(KeyState::new()),
            key_state_path: None,
            conf: conf.finalized(),
            resolver: None,
            shutdown,
            next_primary: AtomicUsize::new(0),
        }
    }

    /// Adds a zone.
    ///
    /// A zone added a second time replaces the first one.
    pub fn add_zone(&mut self, zone: XfrZone) {
        self.zones.insert(zone.apex().clone(), zone);
    }

    /// Sets the initial key state and the file to save changes to.
    pub fn set_key_state(&mut self, state: KeyState, path: Option<PathBuf>) {
        self.key_state = Mutex::new(state);
        self.key_state_path = path;
    }

    /// Sets the resolver used to send NOTIFY messages.
    pub fn set_resolver(&mut self, resolver: Resolver) {
        self.resolver = Some(resolver);
    }

    pub fn zone(&self, apex: &Name) -> Option<&XfrZone> {
        self.zones.get(apex)
    }

    pub fn zones(&self) -> impl Iterator<Item = &XfrZone> {
        self.zones.values()
    }

    /// Returns a copy of the current key state.
    pub fn key_state(&self) -> KeyState {
        self.key_state.lock().clone()
    }

    /// Returns whether a transfer of the zone is in progress.
    pub fn is_in_progress(&self, apex: &Name) -> bool {
        self.in_progress.lock().contains(apex)
    }
}

/// # Handling NOTIFY
///
impl TransferEngine {
    /// Processes a NOTIFY message received from `source`.
    ///
    /// Returns what was done about it and the response to send back. If a
    /// transfer is necessary, it is spawned onto the runtime and this
    /// method returns right away.
    pub fn handle_notify(
        self: &Arc<Self>,
        request: &Message,
        source: SocketAddr,
    ) -> (NotifyAction, Message) {
        let action = self.notify_action(request, source);
        let mut response = request.make_response();
        response.header.set_aa(true);
        response.header.set_rcode(action.rcode());
        (action, response)
    }

    fn notify_action(
        self: &Arc<Self>,
        request: &Message,
        source: SocketAddr,
    ) -> NotifyAction {
        let question = match request.question.as_slice() {
            [question] if question.qtype() == Rtype::SOA => question,
            _ => {
                debug!("malformed NOTIFY from {}", source);
                return NotifyAction::FormErr;
            }
        };
        let apex = question.qname();
        let zone = match self.zones.get(apex) {
            Some(zone) if zone.store.class() == question.qclass() => zone,
            _ => {
                warn!("NOTIFY from {} for unknown zone {}", source, apex);
                return NotifyAction::NotAuth;
            }
        };
        let primary = match zone.primary_for(source) {
            Some(primary) => primary,
            None => {
                warn!("NOTIFY for {} from non-primary {}", apex, source);
                return NotifyAction::Refused;
            }
        };

        let current = zone.store.load();
        if let (Some(remote), Some(local)) = (
            request.answer_soa().map(|soa| soa.serial()),
            current.serial().filter(|_| current.is_correct()),
        ) {
            if !remote.is_newer_than(local) {
                info!(
                    "NOTIFY for {} with serial {}: up to date at {}",
                    apex, remote, local
                );
                return NotifyAction::UpToDate;
            }
        }

        if !self.in_progress.lock().insert(apex.clone()) {
            info!("NOTIFY for {}: transfer already in progress", apex);
            return NotifyAction::Coalesced;
        }
        info!("NOTIFY for {} from {}: starting transfer", apex, source);
        zone.set_state(XfrState::NotifyReceived);
        let engine = self.clone();
        let apex = apex.clone();
        tokio::spawn(async move {
            let _claim = Claim::adopt(&engine.in_progress, apex.clone());
            if let Some(zone) = engine.zones.get(&apex) {
                let _ = engine.transfer(zone, Some(primary)).await;
            }
        });
        NotifyAction::Transfer
    }
}

/// # Transferring Zones
///
impl TransferEngine {
    /// Refreshes a zone from its primaries.
    ///
    /// If a transfer of the zone is already in progress, returns
    /// [`TransferOutcome::Coalesced`] right away.
    pub async fn refresh(
        &self,
        apex: &Name,
    ) -> Result<TransferOutcome, TransferError> {
        let zone = self.zones.get(apex).ok_or(TransferError::UnknownZone)?;
        let _claim = match Claim::new(&self.in_progress, apex) {
            Some(claim) => claim,
            None => return Ok(TransferOutcome::Coalesced),
        };
        self.transfer(zone, None).await
    }

    /// Transfers a zone, preferring the given primary.
    async fn transfer(
        &self,
        zone: &XfrZone,
        preferred: Option<SocketAddr>,
    ) -> Result<TransferOutcome, TransferError> {
        let res = self.try_primaries(zone, preferred).await;
        match res {
            Ok(TransferOutcome::Committed(serial)) => {
                info!("zone {} updated to serial {}", zone.apex(), serial);
                zone.set_state(XfrState::Committed);
            }
            Ok(TransferOutcome::UpToDate(serial)) => {
                debug!("zone {} is up to date at {}", zone.apex(), serial);
                zone.set_state(XfrState::Idle);
            }
            Ok(TransferOutcome::Coalesced) => {}
            Err(ref err) => {
                warn!("transfer of zone {} failed: {}", zone.apex(), err);
                zone.set_state(XfrState::Aborted);
            }
        }
        res
    }

    async fn try_primaries(
        &self,
        zone: &XfrZone,
        preferred: Option<SocketAddr>,
    ) -> Result<TransferOutcome, TransferError> {
        let primaries = self.primary_order(zone, preferred);
        let mut last_err = TransferError::NoPrimary;
        for _ in 0..self.conf.attempts {
            for primary in &primaries {
                match self.fetch(zone, *primary).await {
                    Ok(outcome) => return self.finish(zone, outcome),
                    Err(TransferError::Shutdown) => {
                        return Err(TransferError::Shutdown)
                    }
                    Err(err) => {
                        debug!(
                            "transfer of {} from {} failed: {}",
                            zone.apex(),
                            primary,
                            err
                        );
                        last_err = err;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// Returns the primaries of the zone in the order to try them.
    fn primary_order(
        &self,
        zone: &XfrZone,
        preferred: Option<SocketAddr>,
    ) -> Vec<SocketAddr> {
        let mut res = zone.primaries.clone();
        if self.conf.rotate && !res.is_empty() {
            let start = self.next_primary.fetch_add(1, Ordering::Relaxed);
            res.rotate_left(start % zone.primaries.len());
        }
        if let Some(preferred) = preferred {
            res.retain(|primary| *primary != preferred);
            res.insert(0, preferred);
        }
        res
    }

    /// Fetches the zone from a primary.
    ///
    /// Uses IXFR if we have a verified version of the zone and AXFR
    /// otherwise.
    async fn fetch(
        &self,
        zone: &XfrZone,
        primary: SocketAddr,
    ) -> Result<XfrOutcome, TransferError> {
        let store = &zone.store;
        let current = store.load();
        let base_soa = current
            .soa_record()
            .filter(|_| current.is_correct())
            .cloned();
        let mut interpreter = match base_soa {
            Some(_) => XfrResponseInterpreter::ixfr(current, store.capacity()),
            None => XfrResponseInterpreter::axfr(
                store.apex().clone(),
                store.class(),
                store.capacity(),
            ),
        };
        let mut request = Message::query(Question::new(
            store.apex().clone(),
            interpreter.xfr_type().rtype(),
            store.class(),
        ));
        request.authority.extend(base_soa);

        zone.set_state(XfrState::TransferRequested);
        debug!(
            "requesting {:?} of {} from {}",
            interpreter.xfr_type(),
            store.apex(),
            primary
        );
        let mut sock = self.wait(TcpStream::connect(primary)).await??;
        let (wire, mut sequence) = match zone.key.as_ref() {
            Some(key) => {
                let (wire, sequence) =
                    ClientSequence::request(key.clone(), &request, Time48::now())?;
                (wire, Some(sequence))
            }
            None => (request.to_wire()?, None),
        };
        self.wait(write_message(&mut sock, &wire)).await??;

        zone.set_state(XfrState::Streaming);
        loop {
            let wire = match self.wait(read_message(&mut sock)).await?? {
                Some(wire) => wire,
                None => return Err(TransferError::Incomplete),
            };
            let response = match sequence.as_mut() {
                Some(sequence) => sequence.answer(&wire, Time48::now())?,
                None => Message::from_octets(&wire)?,
            };
            if response.header.id() != request.header.id() {
                return Err(TransferError::Malformed("message ID mismatch"));
            }
            if interpreter.interpret_response(&response)? {
                break;
            }
        }
        if let Some(sequence) = sequence {
            sequence.done()?;
        }
        interpreter.into_outcome()
    }

    /// Verifies and commits the result of a transfer.
    fn finish(
        &self,
        zone: &XfrZone,
        outcome: XfrOutcome,
    ) -> Result<TransferOutcome, TransferError> {
        let buffer = match outcome {
            XfrOutcome::UpToDate(serial) => {
                return Ok(TransferOutcome::UpToDate(serial))
            }
            XfrOutcome::Zone(buffer) => buffer,
        };
        zone.set_state(XfrState::Verifying);
        let store = &zone.store;
        let snapshot =
            buffer.into_snapshot(store.apex().clone(), store.class())?;
        let remote = snapshot.serial().ok_or(ZoneError::MissingSoa)?;
        let current = store.load();
        if let Some(local) = current.serial().filter(|_| current.is_correct()) {
            if !remote.is_newer_than(local) {
                return Err(TransferError::NotNewer { local, remote });
            }
        }

        let mut key_state = self.key_state.lock().clone();
        let keys_changed =
            ZoneVerifier::new(&mut key_state, Serial::now()).verify(&snapshot)?;
        store.commit(snapshot.into_verified())?;
        if keys_changed {
            self.update_keys(store.apex(), &key_state);
        }
        self.send_notify(zone, remote);
        Ok(TransferOutcome::Committed(remote))
    }

    /// Takes over the keys for `apex` and saves the key state.
    fn update_keys(&self, apex: &Name, verified: &KeyState) {
        let state = {
            let mut state = self.key_state.lock();
            state.update_zone(apex, verified);
            state.clone()
        };
        info!("trusted keys for {} changed", apex);
        if let Some(path) = self.key_state_path.as_ref() {
            if let Err(err) = state.save(path) {
                error!("failed to save key state to {}: {}", path.display(), err);
            }
        }
    }

    /// Sends NOTIFY messages for a zone to its notify targets.
    fn send_notify(&self, zone: &XfrZone, serial: Serial) {
        if zone.notify.is_empty() {
            return;
        }
        let resolver = match self.resolver.as_ref() {
            Some(resolver) => resolver,
            None => {
                warn!("cannot notify for {}: no resolver", zone.apex());
                return;
            }
        };
        let snapshot = zone.store.load();
        let mut notify = Message::query(Question::new(
            zone.apex().clone(),
            Rtype::SOA,
            zone.store.class(),
        ));
        notify.header.set_opcode(Opcode::NOTIFY);
        notify.header.set_aa(true);
        notify.answer.extend(snapshot.soa_record().cloned());
        for target in &zone.notify {
            let resolver = resolver.clone();
            let notify = notify.clone();
            let target = *target;
            let apex = zone.apex().clone();
            tokio::spawn(async move {
                match resolver.request_to(target, notify).await {
                    Ok(response) => debug!(
                        "NOTIFY for {} serial {} to {}: {}",
                        apex,
                        serial,
                        target,
                        response.header.rcode()
                    ),
                    Err(err) => warn!(
                        "NOTIFY for {} to {} failed: {}",
                        apex, target, err
                    ),
                }
            });
        }
    }

    /// Waits for a future limited by timeout and shutdown.
    async fn wait<F: Future>(
        &self,
        fut: F,
    ) -> Result<F::Output, TransferError> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                Err(TransferError::Shutdown)
            }
            res = tokio::time::timeout(self.conf.timeout, fut) => {
                res.map_err(|_| TransferError::Timeout)
            }
        }
    }
}

//------------ Claim ---------------------------------------------------------

/// Marks a zone as having a transfer in progress.
///
/// The mark is removed when the value is dropped.
struct Claim<'a> {
    in_progress: &'a Mutex<HashSet<Name>>,
    apex: Name,
}

impl<'a> Claim<'a> {
    /// Claims a zone if it isn’t claimed already.
    fn new(in_progress: &'a Mutex<HashSet<Name>>, apex: &Name) -> Option<Self> {
        if in_progress.lock().insert(apex.clone()) {
            Some(Self::adopt(in_progress, apex.clone()))
        } else {
            None
        }
    }

    /// Takes over a zone that has been claimed already.
    fn adopt(in_progress: &'a Mutex<HashSet<Name>>, apex: Name) -> Self {
        Claim { in_progress, apex }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_progress.lock().remove(&self.apex);
    }
}

//============ Testing =======================================================
