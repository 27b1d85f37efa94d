//! Configuration of a secondary server.
//!
//! [`ServerConfig`] collects everything needed to set up the transfer
//! engine and the service answering requests. It can be deserialized via
//! serde from whatever format the application prefers. This crate never
//! reads a configuration file itself.
//!
//! ```text
//! {
//!     "listen": ["127.0.0.1:5353"],
//!     "zones": [{
//!         "apex": "example.com",
//!         "primaries": ["192.0.2.1:53"],
//!         "tsig-key": "xfr.example.com",
//!         "notify": ["192.0.2.5:53"]
//!     }],
//!     "keys": [{
//!         "name": "xfr.example.com",
//!         "algorithm": "hmac-sha256",
//!         "secret": "c2VjcmV0IGtleSBtYXRlcmlhbA=="
//!     }],
//!     "key-state": "/var/lib/zonewarden/keys"
//! }
//! ```

use crate::base::iana::{Class, SecAlg};
use crate::base::name::Name;
use crate::net::server::XfrService;
use crate::net::xfr::{TransferEngine, XfrZone};
use crate::rdata::Dnskey;
use crate::resolv::{ResolvConf, Resolver};
use crate::tsig::{Algorithm, Key, NewKeyError};
use crate::validate::KeyState;
use crate::zonetree::ZoneStore;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::vec::Vec;
use std::{error, fmt, io};
use tokio::sync::watch;
use tracing::{debug, info};

/// The default number of records a zone may have.
const DEFAULT_CAPACITY: usize = 1_000_000;

//------------ ServerConfig --------------------------------------------------

/// The configuration of a secondary server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// The addresses to listen on for both UDP and TCP.
    pub listen: Vec<SocketAddr>,

    /// The secondary zones.
    pub zones: Vec<ZoneConfig>,

    /// The TSIG keys.
    pub keys: Vec<KeyConfig>,

    /// The initially trusted DNSKEYs.
    pub trust_anchors: Vec<TrustAnchorConfig>,

    /// The file the key state is loaded from and saved to.
    pub key_state: Option<PathBuf>,

    /// Options for outgoing queries.
    pub resolver: ResolvConf,
}

impl ServerConfig {
    /// Creates the TSIG keys, indexed by their name.
    pub fn tsig_keys(&self) -> Result<HashMap<Name, Arc<Key>>, ConfigError> {
        let mut res = HashMap::new();
        for key in &self.keys {
            let tsig = Key::new(
                key.algorithm,
                &key.secret,
                key.name.clone(),
                None,
                None,
            )
            .map_err(|err| ConfigError::BadKey(key.name.clone(), err))?;
            if res.insert(key.name.clone(), Arc::new(tsig)).is_some() {
                return Err(ConfigError::DuplicateKey(key.name.clone()));
            }
        }
        Ok(res)
    }

    /// Creates the initial key state.
    ///
    /// If a key state file is configured and exists, the state is loaded
    /// from it. The configured trust anchors are added in any case.
    pub fn initial_key_state(&self) -> Result<KeyState, ConfigError> {
        let mut state = match self.key_state.as_ref() {
            Some(path) => match KeyState::load(path) {
                Ok(state) => {
                    debug!("loaded key state from {}", path.display());
                    state
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    KeyState::new()
                }
                Err(err) => return Err(ConfigError::KeyState(Arc::new(err))),
            },
            None => KeyState::new(),
        };
        for anchor in &self.trust_anchors {
            state.add_trust_anchor(anchor.apex.clone(), anchor.to_dnskey());
        }
        Ok(state)
    }

    /// Creates the transfer engine for the configured zones.
    ///
    /// If any zone has NOTIFY targets, a resolver is started which
    /// requires a Tokio runtime.
    pub fn build_engine(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<TransferEngine, ConfigError> {
        let keys = self.tsig_keys()?;
        let mut engine = TransferEngine::new(self.resolver.clone(), shutdown);
        let mut seen = Vec::new();
        for zone in &self.zones {
            if seen.contains(&zone.apex) {
                return Err(ConfigError::DuplicateZone(zone.apex.clone()));
            }
            seen.push(zone.apex.clone());
            let store = Arc::new(ZoneStore::new(
                zone.apex.clone(),
                Class::IN,
                zone.capacity,
            ));
            let mut xfr_zone = XfrZone::new(store);
            for primary in &zone.primaries {
                xfr_zone = xfr_zone.with_primary(*primary);
            }
            for target in &zone.notify {
                xfr_zone = xfr_zone.with_notify(*target);
            }
            if let Some(name) = zone.tsig_key.as_ref() {
                let key = keys
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownKey(name.clone()))?;
                xfr_zone = xfr_zone.with_key(key.clone());
            }
            engine.add_zone(xfr_zone);
        }
        engine.set_key_state(self.initial_key_state()?, self.key_state.clone());
        if self.zones.iter().any(|zone| !zone.notify.is_empty()) {
            engine.set_resolver(Resolver::new(self.resolver.clone()));
        }
        info!("configured {} zones", self.zones.len());
        Ok(engine)
    }

    /// Creates the service for an engine.
    ///
    /// The service accepts requests signed with any of the configured
    /// keys. If upstream servers are configured, it uses them to forward
    /// requests which requires a Tokio runtime.
    pub fn build_service(
        &self,
        engine: Arc<TransferEngine>,
    ) -> Result<XfrService, ConfigError> {
        let mut service = XfrService::new(engine);
        for key in self.tsig_keys()?.into_values() {
            service = service.with_key(key);
        }
        if !self.resolver.servers.is_empty() {
            service = service.with_resolver(Resolver::new(self.resolver.clone()));
        }
        Ok(service)
    }
}

//------------ ZoneConfig ----------------------------------------------------

/// The configuration of a secondary zone.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneConfig {
    pub apex: Name,

    #[serde(default)]
    pub primaries: Vec<SocketAddr>,

    /// The name of the TSIG key for transfers from the primaries.
    #[serde(default)]
    pub tsig_key: Option<Name>,

    /// The maximum number of records of the zone.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// The servers to notify after the zone has been updated.
    #[serde(default)]
    pub notify: Vec<SocketAddr>,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

//------------ KeyConfig -----------------------------------------------------

/// A TSIG key.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeyConfig {
    pub name: Name,
    pub algorithm: Algorithm,

    /// The secret in base 64.
    #[serde(with = "crate::utils::base64::serde")]
    pub secret: Vec<u8>,
}

//------------ TrustAnchorConfig ---------------------------------------------

/// A trusted DNSKEY for a zone.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrustAnchorConfig {
    pub apex: Name,
    pub flags: u16,

    #[serde(default = "default_protocol")]
    pub protocol: u8,

    /// The algorithm number.
    pub algorithm: u8,

    /// The public key in base 64.
    #[serde(with = "crate::utils::base64::serde")]
    pub public_key: Vec<u8>,
}

impl TrustAnchorConfig {
    pub fn to_dnskey(&self) -> Dnskey {
        Dnskey::new(
            self.flags,
            self.protocol,
            SecAlg::from_int(self.algorithm),
            Bytes::copy_from_slice(&self.public_key),
        )
    }
}

fn default_protocol() -> u8 {
    3
}

//============ Error Types ===================================================

//------------ ConfigError ---------------------------------------------------

/// The configuration cannot be used.
#[derive(Clone, Debug)]
pub enum ConfigError {
    /// A TSIG key could not be created.
    BadKey(Name, NewKeyError),

    /// A TSIG key name was used twice.
    DuplicateKey(Name),

    /// A zone refers to a TSIG key that isn’t configured.
    UnknownKey(Name),

    /// A zone was configured twice.
    DuplicateZone(Name),

    /// The key state file could not be read.
    KeyState(Arc<io::Error>),
}

//--- Display and Error

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::BadKey(name, err) => {
                write!(f, "bad TSIG key {}: {}", name, err)
            }
            ConfigError::DuplicateKey(name) => {
                write!(f, "duplicate TSIG key {}", name)
            }
            ConfigError::UnknownKey(name) => {
                write!(f, "unknown TSIG key {}", name)
            }
            ConfigError::DuplicateZone(name) => {
                write!(f, "duplicate zone {}", name)
            }
            ConfigError::KeyState(err) => {
                write!(f, "cannot load key state: {}", err)
            }
        }
    }
}

impl error::Error for ConfigError {}

//============ Testing =======================================================
