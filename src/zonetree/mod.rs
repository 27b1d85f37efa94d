//! In-memory storage of zones.
//!
//! A zone is kept as an immutable [`ZoneSnapshot`]. The current snapshot
//! of each zone lives in a [`ZoneStore`] which allows replacing it
//! atomically: readers always see either the complete old or the complete
//! new contents of the zone, never anything in between.
//!
//! New contents are collected in a [`ZoneBuffer`] that limits the number
//! of records it accepts. Only once the buffer has been completely filled
//! and checked is it turned into a snapshot and committed to the store.
//!
//! The [`ZoneTree`] finally holds the stores of all the zones a server
//! knows about.

pub use self::buffer::ZoneBuffer;
pub use self::snapshot::{Trust, ZoneSnapshot};
pub use self::store::ZoneStore;

mod buffer;
mod snapshot;
mod store;

use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use std::collections::HashMap;
use std::sync::Arc;
use std::{error, fmt};

//------------ ZoneTree ------------------------------------------------------

/// The set of zones we know about.
#[derive(Clone, Debug, Default)]
pub struct ZoneTree {
    zones: HashMap<(Name, Class), Arc<ZoneStore>>,
}

impl ZoneTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zone to the tree.
    ///
    /// Returns an error if there already is a zone with the same apex
    /// and class.
    pub fn insert_zone(
        &mut self,
        store: Arc<ZoneStore>,
    ) -> Result<(), ZoneError> {
        let key = (store.apex().clone(), store.class());
        if self.zones.contains_key(&key) {
            return Err(ZoneError::ZoneExists);
        }
        self.zones.insert(key, store);
        Ok(())
    }

    /// Returns the zone with exactly the given apex.
    pub fn get_zone(&self, apex: &Name, class: Class) -> Option<&Arc<ZoneStore>> {
        self.zones.get(&(apex.clone(), class))
    }

    /// Returns the zone a name belongs to.
    ///
    /// This is the zone with the longest apex the name ends with.
    pub fn find_zone(&self, qname: &Name, class: Class) -> Option<&Arc<ZoneStore>> {
        let mut name = Some(qname.clone());
        while let Some(candidate) = name {
            if let Some(store) = self.get_zone(&candidate, class) {
                return Some(store);
            }
            name = candidate.parent();
        }
        None
    }

    pub fn iter_zones(&self) -> impl Iterator<Item = &Arc<ZoneStore>> {
        self.zones.values()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

//============ Error Types ===================================================

//------------ ZoneError -----------------------------------------------------

/// Zone contents could not be accepted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ZoneError {
    /// Accepting a record would exceed the capacity of the zone.
    Overflow { capacity: usize },

    /// There is no SOA record at the apex.
    MissingSoa,

    /// There is more than one SOA record at the apex.
    MultipleSoa,

    /// A record’s owner is not within the zone.
    OutOfZone(Name),

    /// A record has the wrong class.
    ClassMismatch(Class, Rtype),

    /// The snapshot is for a different zone.
    WrongZone,

    /// A zone with this apex and class already exists.
    ZoneExists,
}

//--- Display and Error

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ZoneError::Overflow { capacity } => {
                write!(f, "zone exceeds capacity of {} records", capacity)
            }
            ZoneError::MissingSoa => f.write_str("missing SOA record"),
            ZoneError::MultipleSoa => f.write_str("multiple SOA records"),
            ZoneError::OutOfZone(name) => {
                write!(f, "record {} outside of zone", name)
            }
            ZoneError::ClassMismatch(class, rtype) => {
                write!(f, "{} record of class {} in zone", rtype, class)
            }
            ZoneError::WrongZone => f.write_str("snapshot for wrong zone"),
            ZoneError::ZoneExists => f.write_str("zone already exists"),
        }
    }
}

impl error::Error for ZoneError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn find_zone() {
        let mut tree = ZoneTree::new();
        let com = Name::from_str("example.com").unwrap();
        let sub = Name::from_str("sub.example.com").unwrap();
        tree.insert_zone(Arc::new(ZoneStore::new(com.clone(), Class::IN, 10)))
            .unwrap();
        tree.insert_zone(Arc::new(ZoneStore::new(sub.clone(), Class::IN, 10)))
            .unwrap();
        assert_eq!(
            tree.insert_zone(Arc::new(ZoneStore::new(com.clone(), Class::IN, 10))),
            Err(ZoneError::ZoneExists)
        );

        let find = |name: &str| {
            tree.find_zone(&Name::from_str(name).unwrap(), Class::IN)
                .map(|store| store.apex().clone())
        };
        assert_eq!(find("www.example.com"), Some(com.clone()));
        assert_eq!(find("EXAMPLE.com"), Some(com));
        assert_eq!(find("a.b.sub.example.com"), Some(sub));
        assert_eq!(find("example.org"), None);
        assert!(tree
            .find_zone(&Name::from_str("example.com").unwrap(), Class::CH)
            .is_none());
    }
}
