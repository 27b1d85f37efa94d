//! Immutable zone contents.

use super::ZoneError;
use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::rdata::Soa;
use std::vec::Vec;

//------------ Trust ---------------------------------------------------------

/// Whether the contents of a zone have been verified.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Trust {
    /// The zone hasn’t been checked.
    #[default]
    Unverified,

    /// The zone is complete and, if signed, its signatures are valid.
    Verified,
}

//------------ ZoneSnapshot --------------------------------------------------

/// The contents of a zone at one point in time.
///
/// A snapshot never changes. New contents are always a new snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneSnapshot {
    apex: Name,
    class: Class,
    serial: Option<Serial>,
    records: Vec<Record>,
    trust: Trust,
}

impl ZoneSnapshot {
    /// Creates an empty snapshot.
    ///
    /// This is what a zone looks like before it was first transferred.
    pub fn empty(apex: Name, class: Class) -> Self {
        ZoneSnapshot {
            apex,
            class,
            serial: None,
            records: Vec::new(),
            trust: Trust::Unverified,
        }
    }

    /// Creates a snapshot from a set of records.
    ///
    /// The records must contain exactly one SOA record for the apex which
    /// provides the serial. All records must be of `class` and within the
    /// zone.
    pub fn new(
        apex: Name,
        class: Class,
        records: Vec<Record>,
    ) -> Result<Self, ZoneError> {
        let mut soa = None;
        for record in &records {
            if !record.owner().ends_with(&apex) {
                return Err(ZoneError::OutOfZone(record.owner().clone()));
            }
            if record.class() != class {
                return Err(ZoneError::ClassMismatch(
                    record.class(),
                    record.rtype(),
                ));
            }
            if let Some(data) = record.data().as_soa() {
                if *record.owner() != apex || soa.is_some() {
                    return Err(ZoneError::MultipleSoa);
                }
                soa = Some(data.serial());
            }
        }
        let serial = soa.ok_or(ZoneError::MissingSoa)?;
        Ok(ZoneSnapshot {
            apex,
            class,
            serial: Some(serial),
            records,
            trust: Trust::Unverified,
        })
    }

    /// Returns the snapshot marked as verified.
    pub fn into_verified(self) -> Self {
        ZoneSnapshot {
            trust: Trust::Verified,
            ..self
        }
    }
}

impl ZoneSnapshot {
    pub fn apex(&self) -> &Name {
        &self.apex
    }

    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the serial of the zone or `None` for an empty zone.
    pub fn serial(&self) -> Option<Serial> {
        self.serial
    }

    pub fn trust(&self) -> Trust {
        self.trust
    }

    /// Returns whether the zone has been verified.
    pub fn is_correct(&self) -> bool {
        self.trust == Trust::Verified
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the SOA record of the zone.
    pub fn soa_record(&self) -> Option<&Record> {
        self.records.iter().find(|record| {
            record.rtype() == Rtype::SOA && *record.owner() == self.apex
        })
    }

    /// Returns the SOA data of the zone.
    pub fn soa(&self) -> Option<&Soa> {
        self.soa_record().and_then(|record| record.data().as_soa())
    }

    /// Returns an iterator over the records with the given owner and type.
    pub fn rrset<'a>(
        &'a self,
        owner: &'a Name,
        rtype: Rtype,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |record| {
            record.rtype() == rtype && record.owner() == owner
        })
    }

    /// Returns whether the zone is signed.
    ///
    /// A zone is considered signed if it has DNSKEY records at the apex.
    pub fn is_signed(&self) -> bool {
        self.rrset(&self.apex, Rtype::DNSKEY).next().is_some()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::rdata::{Ns, A};
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn soa(serial: u32) -> Record {
        Record::new(
            name("example.com"),
            Class::IN,
            3600,
            Soa::new(
                name("ns.example.com"),
                name("hostmaster.example.com"),
                Serial(serial),
                3600,
                600,
                86400,
                300,
            ),
        )
    }

    #[test]
    fn new_snapshot() {
        let apex = name("example.com");
        let snapshot = ZoneSnapshot::new(
            apex.clone(),
            Class::IN,
            vec![
                soa(7),
                Record::new(apex.clone(), Class::IN, 3600, Ns::new(name("ns.example.com"))),
                Record::new(
                    name("ns.example.com"),
                    Class::IN,
                    3600,
                    A::new([192, 0, 2, 1].into()),
                ),
            ],
        )
        .unwrap();
        assert_eq!(snapshot.serial(), Some(Serial(7)));
        assert_eq!(snapshot.trust(), Trust::Unverified);
        assert!(!snapshot.is_correct());
        assert!(!snapshot.is_signed());
        assert_eq!(snapshot.rrset(&apex, Rtype::NS).count(), 1);
        assert!(snapshot.into_verified().is_correct());

        let empty = ZoneSnapshot::empty(apex, Class::IN);
        assert_eq!(empty.serial(), None);
        assert!(empty.soa().is_none());
    }

    #[test]
    fn bad_snapshots() {
        let apex = name("example.com");
        assert_eq!(
            ZoneSnapshot::new(apex.clone(), Class::IN, vec![]),
            Err(ZoneError::MissingSoa)
        );
        assert_eq!(
            ZoneSnapshot::new(apex.clone(), Class::IN, vec![soa(1), soa(2)]),
            Err(ZoneError::MultipleSoa)
        );
        assert_eq!(
            ZoneSnapshot::new(
                apex.clone(),
                Class::IN,
                vec![
                    soa(1),
                    Record::new(
                        name("example.org"),
                        Class::IN,
                        3600,
                        A::new([192, 0, 2, 1].into())
                    )
                ]
            ),
            Err(ZoneError::OutOfZone(name("example.org")))
        );
        assert_eq!(
            ZoneSnapshot::new(apex, Class::CH, vec![soa(1)]),
            Err(ZoneError::ClassMismatch(Class::IN, Rtype::SOA))
        );
    }
}
