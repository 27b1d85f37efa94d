//! The current contents of a zone.

use super::{ZoneError, ZoneSnapshot};
use crate::base::iana::Class;
use crate::base::name::Name;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

//------------ ZoneStore -----------------------------------------------------

/// Holds the current snapshot of a zone.
///
/// The snapshot is replaced in a single atomic step. Readers that loaded
/// the previous snapshot keep it alive for as long as they need it.
#[derive(Debug)]
pub struct ZoneStore {
    apex: Name,
    class: Class,
    capacity: usize,
    current: ArcSwap<ZoneSnapshot>,
}

impl ZoneStore {
    /// Creates a store holding an empty zone.
    ///
    /// The zone will never accept more than `capacity` records.
    pub fn new(apex: Name, class: Class, capacity: usize) -> Self {
        ZoneStore {
            current: ArcSwap::from_pointee(ZoneSnapshot::empty(
                apex.clone(),
                class,
            )),
            apex,
            class,
            capacity,
        }
    }

    pub fn apex(&self) -> &Name {
        &self.apex
    }

    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the maximum number of records of the zone.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<ZoneSnapshot> {
        self.current.load_full()
    }

    /// Replaces the current snapshot.
    ///
    /// The snapshot must be for this zone and fit into its capacity.
    pub fn commit(&self, snapshot: ZoneSnapshot) -> Result<(), ZoneError> {
        if *snapshot.apex() != self.apex || snapshot.class() != self.class {
            return Err(ZoneError::WrongZone);
        }
        if snapshot.len() > self.capacity {
            return Err(ZoneError::Overflow {
                capacity: self.capacity,
            });
        }
        debug!(
            "committing zone {} with serial {:?} ({} records)",
            self.apex,
            snapshot.serial(),
            snapshot.len()
        );
        self.current.store(Arc::new(snapshot));
        Ok(())
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::record::Record;
    use crate::base::serial::Serial;
    use crate::rdata::Soa;
    use std::str::FromStr;

    fn snapshot(apex: &str, serial: u32) -> ZoneSnapshot {
        let apex = Name::from_str(apex).unwrap();
        ZoneSnapshot::new(
            apex.clone(),
            Class::IN,
            vec![Record::new(
                apex.clone(),
                Class::IN,
                3600,
                Soa::new(apex.clone(), apex, Serial(serial), 1, 2, 3, 4),
            )],
        )
        .unwrap()
    }

    #[test]
    fn commit() {
        let store =
            ZoneStore::new(Name::from_str("example.com").unwrap(), Class::IN, 1);
        let old = store.load();
        assert_eq!(old.serial(), None);

        store.commit(snapshot("example.com", 5).into_verified()).unwrap();
        assert_eq!(store.load().serial(), Some(Serial(5)));
        assert!(store.load().is_correct());

        // The old snapshot stays valid for whoever holds it.
        assert_eq!(old.serial(), None);

        assert_eq!(
            store.commit(snapshot("example.org", 6)),
            Err(ZoneError::WrongZone)
        );
        assert_eq!(store.load().serial(), Some(Serial(5)));
    }

    #[test]
    fn commit_over_capacity() {
        let store =
            ZoneStore::new(Name::from_str("example.com").unwrap(), Class::IN, 0);
        assert_eq!(
            store.commit(snapshot("example.com", 5)),
            Err(ZoneError::Overflow { capacity: 0 })
        );
        assert!(store.load().is_empty());
    }
}
