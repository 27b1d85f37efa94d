//! Collecting new zone contents.

use super::{ZoneError, ZoneSnapshot};
use crate::base::iana::Class;
use crate::base::name::Name;
use crate::base::record::Record;
use crate::base::serial::Serial;
use std::vec::Vec;

//------------ ZoneBuffer ----------------------------------------------------

/// A bounded collection of records for a zone.
///
/// The buffer is where a zone transfer collects the records of the new
/// zone. It never holds more than its capacity and refuses additional
/// records with [`ZoneError::Overflow`].
#[derive(Clone, Debug)]
pub struct ZoneBuffer {
    records: Vec<Record>,
    capacity: usize,
}

impl ZoneBuffer {
    /// Creates a new, empty buffer.
    pub fn new(capacity: usize) -> Self {
        ZoneBuffer {
            records: Vec::new(),
            capacity,
        }
    }

    /// Creates a buffer with a copy of the records of a snapshot.
    pub fn from_snapshot(
        snapshot: &ZoneSnapshot,
        capacity: usize,
    ) -> Result<Self, ZoneError> {
        if snapshot.len() > capacity {
            return Err(ZoneError::Overflow { capacity });
        }
        Ok(ZoneBuffer {
            records: snapshot.records().to_vec(),
            capacity,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the serial of the SOA record in the buffer, if any.
    pub fn serial(&self) -> Option<Serial> {
        self.records
            .iter()
            .find_map(|record| record.data().as_soa())
            .map(|soa| soa.serial())
    }

    /// Adds a record.
    pub fn push(&mut self, record: Record) -> Result<(), ZoneError> {
        if self.records.len() >= self.capacity {
            return Err(ZoneError::Overflow {
                capacity: self.capacity,
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Removes a record.
    ///
    /// The TTL of the record is ignored. Returns whether the record was
    /// present.
    pub fn remove(&mut self, record: &Record) -> bool {
        let pos = self.records.iter().position(|item| {
            item.owner() == record.owner()
                && item.class() == record.class()
                && item.data() == record.data()
        });
        match pos {
            Some(pos) => {
                self.records.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Converts the buffer into an unverified snapshot.
    pub fn into_snapshot(
        self,
        apex: Name,
        class: Class,
    ) -> Result<ZoneSnapshot, ZoneError> {
        ZoneSnapshot::new(apex, class, self.records)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::rdata::{Soa, A};
    use std::str::FromStr;

    fn a(owner: &str, ttl: u32) -> Record {
        Record::new(
            Name::from_str(owner).unwrap(),
            Class::IN,
            ttl,
            A::new([192, 0, 2, 1].into()),
        )
    }

    #[test]
    fn capacity() {
        let mut buf = ZoneBuffer::new(2);
        buf.push(a("a.example.com", 10)).unwrap();
        buf.push(a("b.example.com", 10)).unwrap();
        assert_eq!(
            buf.push(a("c.example.com", 10)),
            Err(ZoneError::Overflow { capacity: 2 })
        );
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn remove_ignores_ttl() {
        let mut buf = ZoneBuffer::new(2);
        buf.push(a("a.example.com", 10)).unwrap();
        assert!(!buf.remove(&a("b.example.com", 10)));
        assert!(buf.remove(&a("A.example.com", 3600)));
        assert!(buf.is_empty());
    }

    #[test]
    fn into_snapshot() {
        let apex = Name::from_str("example.com").unwrap();
        let mut buf = ZoneBuffer::new(10);
        buf.push(a("a.example.com", 10)).unwrap();
        assert_eq!(
            buf.clone().into_snapshot(apex.clone(), Class::IN),
            Err(ZoneError::MissingSoa)
        );
        buf.push(Record::new(
            apex.clone(),
            Class::IN,
            10,
            Soa::new(apex.clone(), apex.clone(), Serial(3), 1, 2, 3, 4),
        ))
        .unwrap();
        assert_eq!(buf.serial(), Some(Serial(3)));
        let snapshot = buf.into_snapshot(apex, Class::IN).unwrap();
        assert_eq!(snapshot.serial(), Some(Serial(3)));
        assert!(!snapshot.is_correct());
    }
}
