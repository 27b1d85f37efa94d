//! Authenticated denial of existence via NSEC3.
//!
//! NSEC3 records prove that a name doesn’t exist without listing the names
//! that do. Instead of names, the records form a chain of hashes: each
//! record’s owner carries the hash of an existing name in its first label
//! and the record data the next hash in the zone. A name whose hash falls
//! strictly between the two doesn’t exist.
//!
//! The records need to have been validated via [`KeyState`] before their
//! statements can be relied upon.
//!
//! [`KeyState`]: super::KeyState

use crate::base::iana::Nsec3HashAlg;
use crate::base::name::Name;
use crate::base::record::Record;
use crate::rdata::Nsec3;
use crate::utils::base32;
use ring::digest;
use std::vec::Vec;
use std::{error, fmt};
use tracing::trace;

//------------ nsec3_hash ----------------------------------------------------

/// Calculates the NSEC3 hash of a name.
///
/// The hash is calculated over the canonical wire format of the name
/// followed by the salt and then repeated `iterations` times over the
/// previous hash followed by the salt as described in [RFC 5155, section
/// 5].
///
/// [RFC 5155, section 5]: https://tools.ietf.org/html/rfc5155#section-5
pub fn nsec3_hash(
    name: &Name,
    algorithm: Nsec3HashAlg,
    iterations: u16,
    salt: &[u8],
) -> Result<Vec<u8>, DenialError> {
    if algorithm != Nsec3HashAlg::SHA1 {
        return Err(DenialError::UnsupportedAlgorithm);
    }

    let mut buf = name.to_canonical().as_slice().to_vec();
    buf.extend_from_slice(salt);
    let mut hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &buf);

    for _ in 0..iterations {
        buf.clear();
        buf.extend_from_slice(hash.as_ref());
        buf.extend_from_slice(salt);
        hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &buf);
    }

    Ok(hash.as_ref().to_vec())
}

//------------ verify_denial -------------------------------------------------

/// Checks that NSEC3 records prove the non-existence of a name.
///
/// The hash of `qname` is calculated with the parameters of the first
/// record. Then the records are searched for one whose interval covers
/// this hash. The interval of the last record in the chain wraps around
/// to the first hash of the zone.
///
/// All records must be NSEC3 records owned by a single label below `apex`
/// and use the same hash parameters. Names outside the zone can’t be
/// denied by its records.
pub fn verify_denial(
    qname: &Name,
    apex: &Name,
    records: &[Record],
) -> Result<(), DenialError> {
    if !qname.ends_with(apex) {
        return Err(DenialError::OutOfZone);
    }
    let chain = records
        .iter()
        .map(|record| owner_hash(record, apex))
        .collect::<Result<Vec<_>, _>>()?;
    let (_, first) = chain.first().ok_or(DenialError::NotCovered)?;
    if chain.iter().any(|(_, nsec3)| {
        nsec3.hash_algorithm() != first.hash_algorithm()
            || nsec3.iterations() != first.iterations()
            || nsec3.salt() != first.salt()
    }) {
        return Err(DenialError::Malformed);
    }

    let hash = nsec3_hash(
        qname,
        first.hash_algorithm(),
        first.iterations(),
        first.salt(),
    )?;

    for (owner, nsec3) in &chain {
        if *owner == hash {
            return Err(DenialError::Exists);
        }
        if in_range(&hash, owner, nsec3.next_owner()) {
            trace!("NSEC3 record for {} covers {}", apex, qname);
            return Ok(());
        }
    }
    Err(DenialError::NotCovered)
}

/// Returns the owner hash and data of an NSEC3 record.
fn owner_hash<'a>(
    record: &'a Record,
    apex: &Name,
) -> Result<(Vec<u8>, &'a Nsec3), DenialError> {
    let nsec3 = record.data().as_nsec3().ok_or(DenialError::Malformed)?;
    let owner = record.owner();
    if owner.parent().as_ref() != Some(apex) {
        return Err(DenialError::Malformed);
    }
    let hash = base32::decode_hex_slice(owner.first_label())
        .map_err(|_| DenialError::Malformed)?;
    if hash.len() != nsec3.next_owner().len() {
        return Err(DenialError::Malformed);
    }
    Ok((hash, nsec3))
}

/// Returns whether `target` is strictly between `owner` and `next`.
fn in_range(target: &[u8], owner: &[u8], next: &[u8]) -> bool {
    if next > owner {
        owner < target && target < next
    } else {
        // The last record of the chain wraps around.
        owner < target || target < next
    }
}

//============ Error Types ===================================================

//------------ DenialError ---------------------------------------------------

/// The NSEC3 records do not prove the non-existence of a name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DenialError {
    /// No record covers the hash of the name.
    NotCovered,

    /// A record states that the name exists.
    Exists,

    /// The name isn’t within the zone.
    OutOfZone,

    /// The hash algorithm isn’t supported.
    UnsupportedAlgorithm,

    /// The records are not a usable NSEC3 chain.
    Malformed,
}

//--- Display and Error

impl fmt::Display for DenialError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DenialError::NotCovered => f.write_str("name not covered"),
            DenialError::Exists => f.write_str("name exists"),
            DenialError::OutOfZone => f.write_str("name outside of zone"),
            DenialError::UnsupportedAlgorithm => {
                f.write_str("unsupported NSEC3 hash algorithm")
            }
            DenialError::Malformed => f.write_str("malformed NSEC3 records"),
        }
    }
}

impl error::Error for DenialError {}

//============ Testing =======================================================
