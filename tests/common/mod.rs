//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ring::signature::{Ed25519KeyPair, KeyPair};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::trace;

use zonewarden::base::iana::{Class, SecAlg};
use zonewarden::base::{Message, Name, Record, Serial};
use zonewarden::net::stream::{read_message, write_message};
use zonewarden::net::xfr::{TransferEngine, XfrServer, XfrZone};
use zonewarden::rdata::{Dnskey, Rrsig, Soa, Time48, A};
use zonewarden::resolv::ResolvConf;
use zonewarden::validate::{signed_data, KeyState};
use zonewarden::tsig::{Algorithm, Key, ServerSequence};
use zonewarden::zonetree::{ZoneSnapshot, ZoneStore};

pub fn init() {
    zonewarden::logging::init_logging();
}

pub fn name(s: &str) -> Name {
    Name::from_str(s).unwrap()
}

pub fn apex() -> Name {
    name("example.com")
}

pub fn soa(serial: u32) -> Record {
    Record::new(
        apex(),
        Class::IN,
        3600,
        Soa::new(
            name("ns.example.com"),
            name("admin.example.com"),
            Serial(serial),
            3600,
            600,
            86400,
            300,
        ),
    )
}

/// Returns the records of version `serial` of example.com.
pub fn zone_records(serial: u32, hosts: usize) -> Vec<Record> {
    let mut res = vec![soa(serial)];
    for i in 0..hosts {
        res.push(Record::new(
            name(&format!("host{}.example.com", i)),
            Class::IN,
            3600,
            A::new([192, 0, 2, (i % 250) as u8 + 1].into()),
        ));
    }
    res
}

pub fn verified(serial: u32, hosts: usize) -> ZoneSnapshot {
    ZoneSnapshot::new(apex(), Class::IN, zone_records(serial, hosts))
        .unwrap()
        .into_verified()
}

/// Creates a store for example.com, optionally at a verified serial.
pub fn store(serial: Option<u32>) -> Arc<ZoneStore> {
    let store = Arc::new(ZoneStore::new(apex(), Class::IN, 10_000));
    if let Some(serial) = serial {
        store.commit(verified(serial, 1)).unwrap();
    }
    store
}

pub fn tsig_key() -> Arc<Key> {
    Arc::new(
        Key::new(
            Algorithm::Sha256,
            b"shared between primary and secondary",
            name("xfr.example.com"),
            None,
            None,
        )
        .unwrap(),
    )
}

/// Creates an engine for a single zone.
pub fn engine(zone: XfrZone) -> (Arc<TransferEngine>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let mut conf = ResolvConf::new();
    conf.attempts = 1;
    conf.timeout = Duration::from_secs(2);
    let mut engine = TransferEngine::new(conf, rx);
    engine.add_zone(zone);
    (Arc::new(engine), tx)
}

/// Creates an engine for a single zone with the given trusted keys.
pub fn engine_with_keys(
    zone: XfrZone,
    keys: KeyState,
    path: Option<PathBuf>,
) -> (Arc<TransferEngine>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let mut conf = ResolvConf::new();
    conf.attempts = 1;
    conf.timeout = Duration::from_secs(2);
    let mut engine = TransferEngine::new(conf, rx);
    engine.set_key_state(keys, path);
    engine.add_zone(zone);
    (Arc::new(engine), tx)
}

/// Waits until a condition becomes true.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..250 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

//------------ ZoneKey -------------------------------------------------------

/// An Ed25519 key derived from a fixed seed.
pub struct ZoneKey {
    pair: Ed25519KeyPair,
    dnskey: Dnskey,
}

impl ZoneKey {
    /// A key signing key.
    pub fn ksk(seed: u8) -> Self {
        Self::new(seed, 257)
    }

    /// A zone signing key.
    pub fn zsk(seed: u8) -> Self {
        Self::new(seed, 256)
    }

    fn new(seed: u8, flags: u16) -> Self {
        let pair = Ed25519KeyPair::from_seed_unchecked(&[seed; 32]).unwrap();
        let dnskey = Dnskey::new(
            flags,
            3,
            SecAlg::ED25519,
            Bytes::copy_from_slice(pair.public_key().as_ref()),
        );
        ZoneKey { pair, dnskey }
    }

    pub fn dnskey(&self) -> &Dnskey {
        &self.dnskey
    }

    /// Signs a record set, valid from `inception` to `expiration`.
    pub fn sign(
        &self,
        rrset: &[Record],
        inception: Serial,
        expiration: Serial,
    ) -> Record {
        let first = &rrset[0];
        let mut rrsig = Rrsig::new(
            first.rtype(),
            SecAlg::ED25519,
            first.owner().label_count() as u8,
            first.ttl(),
            expiration,
            inception,
            self.dnskey.key_tag(),
            apex(),
            Bytes::new(),
        );
        let data = signed_data(&rrsig, rrset).unwrap();
        rrsig.set_signature(Bytes::copy_from_slice(
            self.pair.sign(&data).as_ref(),
        ));
        Record::new(first.owner().clone(), first.class(), first.ttl(), rrsig)
    }
}

/// Returns a validity period around the current time.
///
/// A negative `offset` in hours moves the whole period into the past.
pub fn validity(offset: i64) -> (Serial, Serial) {
    let now = i64::from(Serial::now().into_int()) + offset * 3600;
    (
        Serial((now - 3600) as u32),
        Serial((now + 86400) as u32),
    )
}

/// Returns a signed version `serial` of example.com.
///
/// The DNSKEY set holds the public keys of `dnskey_signer` and `zsk`.
/// It is signed by `dnskey_signer`, everything else by `zsk`.
pub fn signed_zone(
    serial: u32,
    hosts: usize,
    dnskey_signer: &ZoneKey,
    zsk: &ZoneKey,
    (inception, expiration): (Serial, Serial),
) -> ZoneSnapshot {
    let mut rrsets: BTreeMap<(Name, u16), Vec<Record>> = BTreeMap::new();
    for record in zone_records(serial, hosts) {
        rrsets
            .entry((record.owner().clone(), record.rtype().to_int()))
            .or_default()
            .push(record);
    }
    let mut records = Vec::new();
    for rrset in rrsets.into_values() {
        records.push(zsk.sign(&rrset, inception, expiration));
        records.extend(rrset);
    }
    let dnskeys: Vec<Record> = [dnskey_signer, zsk]
        .iter()
        .map(|key| Record::new(apex(), Class::IN, 3600, key.dnskey().clone()))
        .collect();
    records.push(dnskey_signer.sign(&dnskeys, inception, expiration));
    records.extend(dnskeys);
    ZoneSnapshot::new(apex(), Class::IN, records)
        .unwrap()
        .into_verified()
}

/// Returns a key state trusting `key` for example.com.
pub fn trusting(key: &ZoneKey) -> KeyState {
    let mut state = KeyState::new();
    state.add_trust_anchor(apex(), key.dnskey().clone());
    state
}

//------------ FakePrimary ---------------------------------------------------

/// How the fake primary misbehaves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Behavior {
    /// Sends the complete transfer.
    Complete,

    /// Closes the connection after the first message.
    Interrupt,

    /// Sends the last message of a signed transfer without TSIG record.
    UnsignedLast,
}

/// A primary serving a fixed zone via TCP on loopback.
pub struct FakePrimary {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl FakePrimary {
    pub async fn start(
        zone: ZoneSnapshot,
        behavior: Behavior,
        key: Option<Arc<Key>>,
        delay: Duration,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let zone = Arc::new(zone);
        let counter = connections.clone();
        tokio::spawn(async move {
            loop {
                let (mut sock, peer) = match listener.accept().await {
                    Ok(res) => res,
                    Err(_) => return,
                };
                trace!("fake primary: connection from {}", peer);
                counter.fetch_add(1, Ordering::SeqCst);
                let zone = zone.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let wire = match read_message(&mut sock).await {
                        Ok(Some(wire)) => wire,
                        _ => return,
                    };
                    let mut request = Message::from_octets(&wire).unwrap();
                    let mut sequence = match key {
                        Some(key) => ServerSequence::request(
                            &key,
                            &mut request,
                            &wire,
                            Time48::now(),
                        )
                        .unwrap(),
                        None => None,
                    };
                    tokio::time::sleep(delay).await;
                    let responses = XfrServer::new()
                        .with_max_message_size(512)
                        .answer(&request, &zone);
                    let count = responses.len();
                    for (i, response) in responses.iter().enumerate() {
                        let last = i + 1 == count;
                        let wire = match sequence.as_mut() {
                            Some(_) if last && behavior == Behavior::UnsignedLast => {
                                response.to_wire().unwrap()
                            }
                            Some(sequence) => {
                                sequence.answer(response, Time48::now()).unwrap()
                            }
                            None => response.to_wire().unwrap(),
                        };
                        if write_message(&mut sock, &wire).await.is_err() {
                            return;
                        }
                        if behavior == Behavior::Interrupt {
                            return;
                        }
                    }
                });
            }
        });
        FakePrimary { addr, connections }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}
