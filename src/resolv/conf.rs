//! Resolver configuration.
//!
//! The configuration is a plain value. It is normally created from
//! whatever configuration source the application uses, typically through
//! serde, and handed to [`Resolver::new`][super::Resolver::new]. Reading
//! a system configuration file is left to the application.

use crate::base::name::Name;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use std::vec::Vec;

//------------ ResolvConf ----------------------------------------------------

/// Resolver configuration.
///
/// This type collects all information necessary to configure how outbound
/// queries are sent to upstream servers.
///
/// The type follows the builder pattern. After creating a value with
/// `ResolvConf::new()` you can manipulate the members. Once you are happy
/// with them, you call `finalize()` to make sure the configuration is
/// valid.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolvConf {
    /// Addresses of servers to query.
    pub servers: Vec<SocketAddr>,

    /// Search list for host-name lookup.
    pub search: Vec<Name>,

    /// Number of dots before an initial absolute query is made.
    pub ndots: usize,

    /// Timeout to wait for a response.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Number of attempts for each server before giving up.
    pub attempts: usize,

    /// Use round-robin selection of name servers.
    pub rotate: bool,
}

/// # Management
///
impl ResolvConf {
    /// Creates a new configuration with default options and no servers.
    pub fn new() -> Self {
        ResolvConf {
            servers: Vec::new(),
            search: Vec::new(),
            ndots: 1,
            timeout: Duration::from_secs(5),
            attempts: 2,
            rotate: false,
        }
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, adds `127.0.0.1:53`. If `search` is empty,
    /// adds the root domain. Options that must be at least one are raised
    /// to one.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            let addr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
            self.servers.push(SocketAddr::new(addr, 53));
        }
        if self.search.is_empty() {
            self.search.push(Name::root())
        }
        self.ndots = self.ndots.max(1);
        self.attempts = self.attempts.max(1);
        if self.timeout < Duration::from_secs(1) {
            self.timeout = Duration::from_secs(1)
        }
    }

    /// Returns a finalized copy of the configuration.
    pub fn finalized(mut self) -> Self {
        self.finalize();
        self
    }
}

//--- Default

impl Default for ResolvConf {
    fn default() -> Self {
        Self::new()
    }
}

//------------ duration_secs -------------------------------------------------

/// Serde helper for durations given in whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn defaults() {
        let conf = ResolvConf::default();
        assert_eq!(conf.ndots, 1);
        assert_eq!(conf.timeout, Duration::from_secs(5));
        assert_eq!(conf.attempts, 2);
        assert!(!conf.rotate);
        assert!(conf.servers.is_empty());
    }

    #[test]
    fn finalize() {
        let mut conf = ResolvConf::new();
        conf.ndots = 0;
        conf.attempts = 0;
        conf.timeout = Duration::from_millis(10);
        conf.finalize();
        assert_eq!(conf.servers, ["127.0.0.1:53".parse().unwrap()]);
        assert_eq!(conf.search, [Name::root()]);
        assert_eq!(conf.ndots, 1);
        assert_eq!(conf.attempts, 1);
        assert_eq!(conf.timeout, Duration::from_secs(1));
    }

    #[test]
    fn deserialize() {
        let conf: ResolvConf = serde_json::from_str(
            r#"{
                "servers": ["192.0.2.53:53", "[2001:db8::53]:5353"],
                "search": ["example.com"],
                "timeout": 2,
                "rotate": true
            }"#,
        )
        .unwrap();
        assert_eq!(conf.servers.len(), 2);
        assert_eq!(conf.search, [Name::from_str("example.com").unwrap()]);
        assert_eq!(conf.timeout, Duration::from_secs(2));
        assert_eq!(conf.attempts, 2);
        assert!(conf.rotate);

        let json = serde_json::to_string(&conf).unwrap();
        assert_eq!(serde_json::from_str::<ResolvConf>(&json).unwrap(), conf);
    }
}
