//! Checking transferred zones.

use super::TransferError;
use crate::base::iana::Rtype;
use crate::base::name::Name;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::rdata::Rrsig;
use crate::validate::{DnssecError, KeyState};
use crate::zonetree::{ZoneError, ZoneSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::vec::Vec;
use tracing::{debug, warn};

//------------ ZoneVerifier --------------------------------------------------

/// Checks the contents of a zone before it is committed.
///
/// Every zone must have an SOA record at its apex and all records must be
/// within the zone. If the zone is signed or there are trusted keys for
/// it, it must also pass DNSSEC validation: the DNSKEY record set at the
/// apex must be signed by a trusted key and then replaces the trusted keys
/// of the zone. All other authoritative record sets must be signed by one
/// of those keys.
///
/// The verifier updates the key state it is given. Callers should hand it
/// a copy and keep the changes only if the zone is committed.
pub struct ZoneVerifier<'a> {
    key_state: &'a mut KeyState,
    now: Serial,
}

impl<'a> ZoneVerifier<'a> {
    pub fn new(key_state: &'a mut KeyState, now: Serial) -> Self {
        ZoneVerifier { key_state, now }
    }

    /// Verifies a zone.
    ///
    /// Returns whether the trusted keys of the zone have changed.
    pub fn verify(
        &mut self,
        snapshot: &ZoneSnapshot,
    ) -> Result<bool, TransferError> {
        let apex = snapshot.apex();
        if snapshot.soa_record().is_none() {
            return Err(ZoneError::MissingSoa.into());
        }
        if let Some(record) = snapshot
            .records()
            .iter()
            .find(|record| !record.owner().ends_with(apex))
        {
            return Err(ZoneError::OutOfZone(record.owner().clone()).into());
        }

        if !snapshot.is_signed() && !self.key_state.has_keys(apex) {
            debug!("zone {} is unsigned", apex);
            return Ok(false);
        }
        self.verify_dnssec(snapshot).map_err(|err| {
            warn!("DNSSEC validation of {} failed: {}", apex, err);
            err.into()
        })
    }

    fn verify_dnssec(
        &mut self,
        snapshot: &ZoneSnapshot,
    ) -> Result<bool, DnssecError> {
        let apex = snapshot.apex();
        let mut rrsets: BTreeMap<(Name, Rtype), Vec<Record>> = BTreeMap::new();
        let mut rrsigs: HashMap<(Name, Rtype), Vec<Rrsig>> = HashMap::new();
        for record in snapshot.records() {
            match record.data().as_rrsig() {
                Some(rrsig) => rrsigs
                    .entry((record.owner().clone(), rrsig.type_covered()))
                    .or_default()
                    .push(rrsig.clone()),
                None => rrsets
                    .entry((record.owner().clone(), record.rtype()))
                    .or_default()
                    .push(record.clone()),
            }
        }
        let dnskeys = rrsets
            .get(&(apex.clone(), Rtype::DNSKEY))
            .ok_or(DnssecError::Unsigned)?;
        let changed = self.key_state.accept_dnskeys(
            apex,
            dnskeys,
            rrsigs_for(&rrsigs, apex, Rtype::DNSKEY),
            self.now,
        )?;

        let cuts: Vec<&Name> = rrsets
            .keys()
            .filter(|(owner, rtype)| *rtype == Rtype::NS && owner != apex)
            .map(|(owner, _)| owner)
            .collect();

        for ((owner, rtype), rrset) in &rrsets {
            if owner == apex && *rtype == Rtype::DNSKEY {
                continue;
            }
            if !is_authoritative(owner, *rtype, &cuts) {
                continue;
            }
            self.key_state
                .verify_rrset(
                    apex,
                    rrset,
                    rrsigs_for(&rrsigs, owner, *rtype),
                    self.now,
                )?;
        }
        debug!("zone {} passed DNSSEC validation", apex);
        Ok(changed)
    }
}

/// Returns the signatures covering a record set.
fn rrsigs_for<'a>(
    rrsigs: &'a HashMap<(Name, Rtype), Vec<Rrsig>>,
    owner: &Name,
    rtype: Rtype,
) -> &'a [Rrsig] {
    rrsigs
        .get(&(owner.clone(), rtype))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Returns whether a record set is authoritative data of the zone.
///
/// Record sets at a zone cut other than DS and everything below a zone
/// cut are not signed.
fn is_authoritative(owner: &Name, rtype: Rtype, cuts: &[&Name]) -> bool {
    for cut in cuts {
        if owner == *cut {
            if rtype != Rtype::DS {
                return false;
            }
        } else if owner.ends_with(cut) {
            return false;
        }
    }
    true
}

//============ Testing =======================================================
